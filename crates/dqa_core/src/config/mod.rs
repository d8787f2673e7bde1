use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::chunking::{ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::domain::SearchType;
use crate::error::{AppError, CONFIG_INVALID, CONFIG_MISSING_CREDENTIAL};

pub const DEFAULT_DATA_DIR: &str = "data/";
pub const DEFAULT_INDEX_PATH: &str = "faiss_index";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_LLM_MODEL: &str = "openai/gpt-oss-120b";
pub const DEFAULT_LLM_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Groq,
    Ollama,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub search_type: SearchType,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            search_type: SearchType::Mmr,
        }
    }
}

#[derive(Clone, PartialEq)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: String,
    pub temperature: f32,
    pub api_key: Option<String>,
    pub groq_base_url: String,
}

// Keeps the credential out of logs.
impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("groq_base_url", &self.groq_base_url)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub urls: Vec<String>,
    pub index_path: PathBuf,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalSettings,
    pub llm: LlmSettings,
    pub ollama_url: String,
    pub embed_model: String,
    pub max_failed_ratio: Option<f32>,
}

impl Settings {
    /// Read settings from the process environment. Call after `.env` has been loaded.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let chunk_size = parse_number(&get, "DOCQA_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let chunk_overlap = parse_number(&get, "DOCQA_CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?;
        let chunking = ChunkingConfig::new(chunk_size, chunk_overlap)?;

        let top_k = parse_number(&get, "DOCQA_TOP_K", DEFAULT_TOP_K)?;
        if top_k == 0 {
            return Err(AppError::new(CONFIG_INVALID, "DOCQA_TOP_K must be greater than zero"));
        }
        let search_type = match get("DOCQA_SEARCH_TYPE") {
            None => SearchType::Mmr,
            Some(raw) => SearchType::parse(&raw).ok_or_else(|| {
                AppError::new(CONFIG_INVALID, "DOCQA_SEARCH_TYPE must be mmr or similarity")
                    .with_details(format!("value={raw}"))
            })?,
        };

        let provider = match get("DOCQA_LLM_PROVIDER").map(|v| v.to_ascii_lowercase()) {
            None => LlmProvider::Groq,
            Some(v) if v == "groq" => LlmProvider::Groq,
            Some(v) if v == "ollama" => LlmProvider::Ollama,
            Some(v) => {
                return Err(
                    AppError::new(CONFIG_INVALID, "DOCQA_LLM_PROVIDER must be groq or ollama")
                        .with_details(format!("value={v}")),
                )
            }
        };
        let temperature = parse_number(&get, "DOCQA_LLM_TEMPERATURE", DEFAULT_LLM_TEMPERATURE)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(
                AppError::new(CONFIG_INVALID, "DOCQA_LLM_TEMPERATURE must be between 0 and 2")
                    .with_details(format!("value={temperature}")),
            );
        }
        let api_key = get("GROQ_API_KEY");
        if provider == LlmProvider::Groq && api_key.is_none() {
            return Err(AppError::new(
                CONFIG_MISSING_CREDENTIAL,
                "GROQ_API_KEY not found; set it in the environment or a .env file",
            ));
        }

        let max_failed_ratio = match get("DOCQA_MAX_FAILED_RATIO") {
            None => None,
            Some(raw) => {
                let v: f32 = raw.parse().map_err(|_| {
                    AppError::new(CONFIG_INVALID, "DOCQA_MAX_FAILED_RATIO must be a number")
                        .with_details(format!("value={raw}"))
                })?;
                if !(0.0..=1.0).contains(&v) {
                    return Err(
                        AppError::new(CONFIG_INVALID, "DOCQA_MAX_FAILED_RATIO must be between 0 and 1")
                            .with_details(format!("value={v}")),
                    );
                }
                Some(v)
            }
        };

        Ok(Self {
            data_dir: PathBuf::from(get("DOCQA_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            urls: get("DOCQA_URLS").map(|raw| parse_url_list(&raw)).unwrap_or_default(),
            index_path: PathBuf::from(get("DOCQA_INDEX_PATH").unwrap_or_else(|| DEFAULT_INDEX_PATH.to_string())),
            chunking,
            retrieval: RetrievalSettings { top_k, search_type },
            llm: LlmSettings {
                provider,
                model: get("DOCQA_LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                temperature,
                api_key,
                groq_base_url: get("DOCQA_GROQ_BASE_URL").unwrap_or_else(|| DEFAULT_GROQ_BASE_URL.to_string()),
            },
            ollama_url: get("DOCQA_OLLAMA_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            embed_model: get("DOCQA_EMBED_MODEL").unwrap_or_else(|| DEFAULT_EMBED_MODEL.to_string()),
            max_failed_ratio,
        })
    }
}

/// Split a comma- or newline-separated URL list, dropping blanks.
pub fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c == '\n')
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .map(|u| u.to_string())
        .collect()
}

fn parse_number<T, G>(get: &G, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| {
            AppError::new(CONFIG_INVALID, format!("{key} must be a number"))
                .with_details(format!("value={raw}"))
        }),
    }
}
