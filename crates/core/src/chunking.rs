use crate::config::RetrievalConfig;
use crate::models::{Chunk, Document, MetadataValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl From<&RetrievalConfig> for ChunkingConfig {
    fn from(value: &RetrievalConfig) -> Self {
        Self {
            chunk_size: value.chunk_size,
            overlap: value.chunk_overlap,
        }
    }
}

impl ChunkingConfig {
    /// Distance between the starts of consecutive windows.
    ///
    /// An overlap that would stall the window is ignored.
    fn stride(&self) -> usize {
        let size = self.chunk_size.max(1);
        if self.overlap >= size {
            size
        } else {
            size - self.overlap
        }
    }
}

/// Splits `text` into windows of `chunk_size` characters, each starting
/// `chunk_size - overlap` characters after the previous one.
///
/// Text that already fits is returned whole, including the empty string.
/// The last window may be shorter than `chunk_size`.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let size = config.chunk_size.max(1);

    if chars.len() <= size {
        return vec![text.to_string()];
    }

    let stride = config.stride();
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        pieces.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += stride;
    }

    pieces
}

pub fn chunk_document(document: &Document, config: ChunkingConfig) -> Vec<Chunk> {
    let pieces = split_text(&document.text, config);
    let total = pieces.len();

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let mut metadata = document.metadata.clone();
            metadata.insert("chunk_index".to_string(), MetadataValue::from(index));
            metadata.insert("total_chunks".to_string(), MetadataValue::from(total));
            metadata.insert(
                "original_doc_id".to_string(),
                MetadataValue::from(document.id.as_str()),
            );

            Chunk {
                id: make_chunk_id(&document.id, index),
                text,
                metadata,
            }
        })
        .collect()
}

/// Chunks every document, keeping input order within and across documents.
pub fn chunk_documents(documents: &[Document], config: ChunkingConfig) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|document| chunk_document(document, config))
        .collect()
}

fn make_chunk_id(document_id: &str, index: usize) -> String {
    format!("{document_id}_chunk_{index}")
}
