pub mod chunking;
pub mod config;
pub mod domain;
pub mod error;
pub mod ingest;

#[cfg(test)]
mod tests {
    use super::error::AppError;

    #[test]
    fn app_error_is_structured() {
        let err = AppError::new("RAG_TEST", "index failed")
            .with_details("path=/tmp/x")
            .with_retryable(false);
        assert_eq!(err.code, "RAG_TEST");
        assert_eq!(err.message, "index failed");
        assert_eq!(err.retryable, false);
        assert_eq!(err.describe(), "index failed (path=/tmp/x)");
        assert_eq!(err.to_string(), "[RAG_TEST] index failed");
    }
}
