use crate::models::{Document, Metadata};
use crate::traits::CorpusSource;
use crate::RetrievalError;
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Rows past this limit are ignored to keep the corpus bounded.
pub const DEFAULT_ROW_LIMIT: usize = 303;

#[derive(Debug, Clone, PartialEq)]
pub struct MovieQuote {
    pub id: usize,
    pub quote: String,
    pub movie: String,
    pub year: i64,
    pub kind: String,
}

#[derive(Debug, Deserialize)]
struct QuoteRow {
    quote: String,
    movie: String,
    #[serde(default)]
    year: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

impl MovieQuote {
    fn from_row(id: usize, row: QuoteRow) -> Self {
        let year = row.year.trim();
        let year = if !year.is_empty() && year.chars().all(|c| c.is_ascii_digit()) {
            year.parse().unwrap_or(0)
        } else {
            0
        };

        Self {
            id,
            quote: row.quote,
            movie: row.movie,
            year,
            kind: row.kind.unwrap_or_else(|| "movie".to_string()),
        }
    }

    pub fn into_document(self) -> Document {
        let text = format_quote_for_embedding(&self);
        let mut metadata = Metadata::new();
        metadata.insert("movie".to_string(), self.movie.into());
        metadata.insert("year".to_string(), self.year.into());
        metadata.insert("type".to_string(), self.kind.into());
        metadata.insert("original_quote".to_string(), self.quote.into());

        Document {
            id: self.id.to_string(),
            text,
            metadata,
        }
    }
}

/// Renders a quote as the text that gets embedded: quote, then movie and year, then type.
pub fn format_quote_for_embedding(quote: &MovieQuote) -> String {
    format!(
        "Quote: \"{}\"\nMovie: {} ({})\nType: {}",
        quote.quote, quote.movie, quote.year, quote.kind
    )
}

/// Reads `quote,movie,year,type` rows, numbering them from 1.
pub fn read_quotes<R: Read>(reader: R, limit: usize) -> Result<Vec<MovieQuote>, RetrievalError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut quotes = Vec::new();

    for (offset, row) in csv_reader.deserialize::<QuoteRow>().enumerate() {
        if offset >= limit {
            break;
        }
        quotes.push(MovieQuote::from_row(offset + 1, row?));
    }

    Ok(quotes)
}

pub struct CsvQuoteCorpus {
    path: PathBuf,
    row_limit: usize,
}

impl CsvQuoteCorpus {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }

    pub fn with_row_limit(mut self, row_limit: usize) -> Self {
        self.row_limit = row_limit;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn quotes(&self) -> Result<Vec<MovieQuote>, RetrievalError> {
        let file = std::fs::File::open(&self.path)?;
        read_quotes(file, self.row_limit)
    }
}

impl CorpusSource for CsvQuoteCorpus {
    fn load_corpus(&self) -> Result<Vec<Document>, RetrievalError> {
        Ok(self
            .quotes()?
            .into_iter()
            .map(MovieQuote::into_document)
            .collect())
    }
}
