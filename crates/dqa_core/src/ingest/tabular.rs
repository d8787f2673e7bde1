use std::path::Path;

use crate::domain::{Document, DocumentMetadata, SourceFormat};
use crate::error::{AppError, LOADER_FAILED};

use super::text::{read_utf8, source_label};
use super::DocumentLoader;

/// One document per CSV data row, rendered as `header: value` lines.
pub struct CsvLoader;

impl DocumentLoader for CsvLoader {
    fn format(&self) -> SourceFormat {
        SourceFormat::Csv
    }

    fn load(&self, path: &Path) -> Result<Vec<Document>, AppError> {
        let text = read_utf8(path)?;
        let source = source_label(path);
        parse_csv_rows(&text, &source)
    }
}

pub fn parse_csv_rows(csv_text: &str, source: &str) -> Result<Vec<Document>, AppError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|e| {
            AppError::new(LOADER_FAILED, "Failed to read CSV headers")
                .with_details(format!("source={source}; err={e}"))
        })?
        .iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();

    let mut out = Vec::new();
    for (row_idx, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| {
            AppError::new(LOADER_FAILED, "Failed to parse CSV row")
                .with_details(format!("source={source}; row={row_idx}; err={e}"))
        })?;

        let lines = record
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let header = headers.get(i).map(|h| h.as_str()).unwrap_or("");
                format!("{header}: {}", value.trim())
            })
            .collect::<Vec<_>>();

        out.push(Document::new(
            lines.join("\n"),
            DocumentMetadata::new(source, SourceFormat::Csv).with_row(row_idx as u32),
        ));
    }
    Ok(out)
}

/// A top-level array yields one document per element; any other value is one document.
pub struct JsonLoader;

impl DocumentLoader for JsonLoader {
    fn format(&self) -> SourceFormat {
        SourceFormat::Json
    }

    fn load(&self, path: &Path) -> Result<Vec<Document>, AppError> {
        let text = read_utf8(path)?;
        let source = source_label(path);
        parse_json_documents(&text, &source)
    }
}

pub fn parse_json_documents(json_text: &str, source: &str) -> Result<Vec<Document>, AppError> {
    let value: serde_json::Value = serde_json::from_str(json_text).map_err(|e| {
        AppError::new(LOADER_FAILED, "Failed to parse JSON")
            .with_details(format!("source={source}; err={e}"))
    })?;

    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                Ok(Document::new(
                    render_json(item, source)?,
                    DocumentMetadata::new(source, SourceFormat::Json).with_row(i as u32),
                ))
            })
            .collect(),
        other => Ok(vec![Document::new(
            render_json(&other, source)?,
            DocumentMetadata::new(source, SourceFormat::Json),
        )]),
    }
}

fn render_json(value: &serde_json::Value, source: &str) -> Result<String, AppError> {
    match value {
        serde_json::Value::String(s) => Ok(s.clone()),
        other => serde_json::to_string_pretty(other).map_err(|e| {
            AppError::new(LOADER_FAILED, "Failed to render JSON value")
                .with_details(format!("source={source}; err={e}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_rows_keep_their_leading_columns() {
        let docs = parse_csv_rows("name,team,role\nada,core\n", "people.csv").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "name: ada\nteam: core");
        assert_eq!(docs[0].metadata.row, Some(0));
    }

    #[test]
    fn json_scalar_is_a_single_document() {
        let docs = parse_json_documents("\"just text\"", "note.json").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "just text");
        assert_eq!(docs[0].metadata.row, None);
    }
}
