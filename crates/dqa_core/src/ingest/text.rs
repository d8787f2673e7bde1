use std::path::Path;

use crate::domain::{Document, DocumentMetadata, SourceFormat};
use crate::error::{AppError, LOADER_FAILED};

use super::DocumentLoader;

/// Plain UTF-8 text; one document per file.
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn format(&self) -> SourceFormat {
        SourceFormat::Text
    }

    fn load(&self, path: &Path) -> Result<Vec<Document>, AppError> {
        let text = read_utf8(path)?;
        Ok(vec![Document::new(
            text,
            DocumentMetadata::new(source_label(path), SourceFormat::Text),
        )])
    }
}

pub(crate) fn read_utf8(path: &Path) -> Result<String, AppError> {
    let bytes = std::fs::read(path).map_err(|e| {
        AppError::new(LOADER_FAILED, "Failed to read file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    String::from_utf8(bytes).map_err(|e| {
        AppError::new(LOADER_FAILED, "File is not valid UTF-8")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

pub(crate) fn source_label(path: &Path) -> String {
    path.display().to_string()
}
