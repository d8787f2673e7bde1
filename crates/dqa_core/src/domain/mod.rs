use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Input formats the loader aggregator knows about.
///
/// Declaration order is the aggregation order: file formats first (in the order
/// they are discovered and concatenated), web pages last.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Pdf,
    Text,
    Word,
    Csv,
    Excel,
    PowerPoint,
    Json,
    Web,
}

impl SourceFormat {
    pub const FILE_FORMATS: [SourceFormat; 7] = [
        SourceFormat::Pdf,
        SourceFormat::Text,
        SourceFormat::Word,
        SourceFormat::Csv,
        SourceFormat::Excel,
        SourceFormat::PowerPoint,
        SourceFormat::Json,
    ];

    /// File extension (without the dot) discovered for this format. `None` for web pages.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            SourceFormat::Pdf => Some("pdf"),
            SourceFormat::Text => Some("txt"),
            SourceFormat::Word => Some("docx"),
            SourceFormat::Csv => Some("csv"),
            SourceFormat::Excel => Some("xlsx"),
            SourceFormat::PowerPoint => Some("pptx"),
            SourceFormat::Json => Some("json"),
            SourceFormat::Web => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SourceFormat::Pdf => "PDF",
            SourceFormat::Text => "TEXT",
            SourceFormat::Word => "WORD",
            SourceFormat::Csv => "CSV",
            SourceFormat::Excel => "EXCEL",
            SourceFormat::PowerPoint => "PPTX",
            SourceFormat::Json => "JSON",
            SourceFormat::Web => "WEBPAGE",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Typed metadata carried by every document and inherited unchanged by its chunks.
///
/// `source` and `format` are always present. `page` is 1-based (PDF page, PPTX slide);
/// `row` is 0-based (CSV data row, JSON array element).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub source: String,
    pub format: SourceFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl DocumentMetadata {
    pub fn new(source: impl Into<String>, format: SourceFormat) -> Self {
        Self {
            source: source.into(),
            format,
            page: None,
            row: None,
            sheet: None,
            title: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_row(mut self, row: u32) -> Self {
        self.row = Some(row);
        self
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Short human-readable location, e.g. `report.pdf (page 3)`.
    pub fn citation_label(&self) -> String {
        let mut label = self.source.clone();
        if let Some(sheet) = self.sheet.as_deref() {
            label.push_str(&format!(" [{sheet}]"));
        }
        if let Some(page) = self.page {
            label.push_str(&format!(" (page {page})"));
        }
        if let Some(row) = self.row {
            label.push_str(&format!(" (row {row})"));
        }
        label
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }
}

/// A window of one document's content.
///
/// `start_char` and the window length are measured in characters, not bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_id: String,
    pub ordinal: u32,
    pub start_char: u32,
    pub content: String,
    pub text_sha256: String,
    pub metadata: DocumentMetadata,
}

impl Chunk {
    pub fn new(metadata: DocumentMetadata, ordinal: u32, start_char: u32, content: String) -> Self {
        let text_sha256 = sha256_hex(content.as_bytes());
        let payload = format!(
            "source={}|page={}|row={}|sheet={}|ordinal={}|start={}|text={}",
            metadata.source,
            metadata.page.map(|p| p.to_string()).unwrap_or_default(),
            metadata.row.map(|r| r.to_string()).unwrap_or_default(),
            metadata.sheet.as_deref().unwrap_or(""),
            ordinal,
            start_char,
            text_sha256
        );
        Self {
            chunk_id: sha256_hex(payload.as_bytes()),
            ordinal,
            start_char,
            content,
            text_sha256,
            metadata,
        }
    }

    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// How the retriever ranks candidates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Similarity,
    #[default]
    Mmr,
}

impl SearchType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "similarity" => Some(SearchType::Similarity),
            "mmr" | "max_marginal_relevance" | "max-marginal-relevance" => Some(SearchType::Mmr),
            _ => None,
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
