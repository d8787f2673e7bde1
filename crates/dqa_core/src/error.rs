use serde::{Deserialize, Serialize};
use std::fmt;

pub const LOADER_FAILED: &str = "LOADER_FAILED";
pub const INGEST_FAILURE_RATIO_EXCEEDED: &str = "INGEST_FAILURE_RATIO_EXCEEDED";
pub const EMPTY_CORPUS: &str = "RAG_EMPTY_CORPUS";
pub const INDEX_NOT_FOUND: &str = "RAG_INDEX_NOT_FOUND";
pub const INDEX_CORRUPT: &str = "RAG_INDEX_CORRUPT";
pub const INDEX_WRITE_FAILED: &str = "RAG_INDEX_WRITE_FAILED";
pub const INDEX_DIMS_MISMATCH: &str = "RAG_INDEX_DIMS_MISMATCH";
pub const INDEX_MODEL_MISMATCH: &str = "RAG_INDEX_MODEL_MISMATCH";
pub const EMBEDDINGS_FAILED: &str = "RAG_EMBEDDINGS_FAILED";
pub const RETRIEVAL_FAILED: &str = "RAG_RETRIEVAL_FAILED";
pub const QUESTION_EMPTY: &str = "RAG_QUESTION_EMPTY";
pub const PIPELINE_NOT_READY: &str = "RAG_PIPELINE_NOT_READY";
pub const MODEL_INVOCATION_FAILED: &str = "RAG_MODEL_INVOCATION_FAILED";
pub const REMOTE_NOT_ALLOWED: &str = "AI_REMOTE_NOT_ALLOWED";
pub const CONFIG_INVALID: &str = "CONFIG_INVALID";
pub const CONFIG_MISSING_CREDENTIAL: &str = "CONFIG_MISSING_CREDENTIAL";

/// Single structured error shape shared by the core, AI and shell layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }

    /// Message plus details on one line, for terminal output and logs.
    pub fn describe(&self) -> String {
        match self.details.as_deref() {
            Some(d) if !d.is_empty() => format!("{} ({d})", self.message),
            _ => self.message.clone(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}
