use dqa_core::error::{AppError, CONFIG_MISSING_CREDENTIAL, REMOTE_NOT_ALLOWED};

/// Hosted chat-completions endpoint. Only `https://` base URLs are accepted.
#[derive(Clone)]
pub struct GroqClient {
    base_url: String,
    api_key: String,
}

impl GroqClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, AppError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        let host = base_url.strip_prefix("https://").unwrap_or("");
        if host.is_empty() || host.starts_with('/') || host.contains('@') {
            return Err(AppError::new(
                REMOTE_NOT_ALLOWED,
                "Groq base URL must be an https:// endpoint",
            )
            .with_details(format!("base_url={base_url}")));
        }

        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(AppError::new(
                CONFIG_MISSING_CREDENTIAL,
                "GROQ_API_KEY not found; set it in the environment or a .env file",
            ));
        }

        Ok(Self {
            base_url,
            api_key: api_key.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn authorization(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

impl std::fmt::Debug for GroqClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}
