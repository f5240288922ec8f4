use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Distance metric a vector index was created with.
///
/// Scores are only comparable with the metric that produced the distance,
/// so the conversion to a similarity is keyed by the metric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
    InnerProduct,
}

impl DistanceMetric {
    /// Cosine and inner product distances are `1 - x`; euclidean maps onto `(0, 1]`.
    pub fn similarity_from_distance(self, distance: f64) -> f64 {
        match self {
            Self::Cosine | Self::InnerProduct => 1.0 - distance,
            Self::Euclidean => 1.0 / (1.0 + distance.max(0.0)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::InnerProduct => "inner_product",
        }
    }

    /// Distance between two vectors under this metric.
    ///
    /// Inner product assumes normalised vectors; a dot product above one
    /// clamps to zero distance.
    pub fn distance(self, left: &[f32], right: &[f32]) -> f64 {
        match self {
            Self::Cosine => (1.0 - cosine_similarity(left, right)).clamp(0.0, 2.0),
            Self::InnerProduct => (1.0 - dot(left, right)).max(0.0),
            Self::Euclidean => left
                .iter()
                .zip(right)
                .map(|(a, b)| {
                    let delta = f64::from(*a) - f64::from(*b);
                    delta * delta
                })
                .sum::<f64>()
                .sqrt(),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            "inner_product" | "ip" | "dot" => Ok(Self::InnerProduct),
            other => Err(format!("unknown distance metric: {other}")),
        }
    }
}

/// Rounds a score to four decimal places.
pub fn round_score(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn dot(left: &[f32], right: &[f32]) -> f64 {
    left.iter()
        .zip(right)
        .map(|(a, b)| f64::from(*a) * f64::from(*b))
        .sum()
}

/// Returns 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    let norm_left = dot(left, left).sqrt();
    let norm_right = dot(right, right).sqrt();
    if norm_left == 0.0 || norm_right == 0.0 {
        return 0.0;
    }
    dot(left, right) / (norm_left * norm_right)
}
