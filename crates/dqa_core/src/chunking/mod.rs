use serde::Serialize;

use crate::domain::{Chunk, Document};
use crate::error::{AppError, CONFIG_INVALID};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Split points, tried outer-to-inner. A hard cut is the final fallback.
pub const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Validated window configuration. Sizes are in characters.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ChunkingConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, AppError> {
        if chunk_size == 0 {
            return Err(AppError::new(CONFIG_INVALID, "chunk_size must be greater than zero"));
        }
        if chunk_overlap >= chunk_size {
            return Err(
                AppError::new(CONFIG_INVALID, "chunk_overlap must be less than chunk_size")
                    .with_details(format!("chunk_size={chunk_size}; chunk_overlap={chunk_overlap}")),
            );
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// One window of a text, with its character offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub start_char: usize,
    pub text: String,
}

/// Split `text` into overlapping windows of at most `chunk_size` characters.
///
/// Consecutive spans overlap by exactly `chunk_overlap` characters. Each span ends at
/// the last preferred separator in its window that still lies past the overlap, or is
/// cut hard at the window size when no separator qualifies.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<TextSpan> {
    // Byte offset of every char, plus the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = bounds.len() - 1;
    if total == 0 {
        return Vec::new();
    }

    let size = config.chunk_size;
    let overlap = config.chunk_overlap;
    let mut out = Vec::new();
    let mut start = 0usize;

    loop {
        if total - start <= size {
            out.push(TextSpan {
                start_char: start,
                text: text[bounds[start]..].to_string(),
            });
            break;
        }

        let hard_end = start + size;
        let end = separator_end(text, &bounds, start, start + overlap + 1, hard_end).unwrap_or(hard_end);
        out.push(TextSpan {
            start_char: start,
            text: text[bounds[start]..bounds[end]].to_string(),
        });
        start = end - overlap;
    }

    out
}

fn separator_end(text: &str, bounds: &[usize], start: usize, min_end: usize, max_end: usize) -> Option<usize> {
    let window = &text[bounds[start]..bounds[max_end]];
    for sep in SEPARATORS {
        let Some(pos) = window.rfind(sep) else { continue };
        let end_byte = bounds[start] + pos + sep.len();
        // Separators are ASCII, so the match end is always a char boundary.
        let Ok(end) = bounds.binary_search(&end_byte) else { continue };
        if end >= min_end {
            return Some(end);
        }
    }
    None
}

/// Split every document into chunks, preserving document order and metadata.
pub fn split_documents(documents: &[Document], config: &ChunkingConfig) -> Vec<Chunk> {
    let mut out = Vec::new();
    for doc in documents {
        if doc.content.trim().is_empty() {
            continue;
        }
        for (ordinal, span) in split_text(&doc.content, config).into_iter().enumerate() {
            out.push(Chunk::new(
                doc.metadata.clone(),
                ordinal.min(u32::MAX as usize) as u32,
                span.start_char.min(u32::MAX as usize) as u32,
                span.text,
            ));
        }
    }

    tracing::info!(
        documents = documents.len(),
        chunks = out.len(),
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        "split documents into chunks"
    );
    out
}
