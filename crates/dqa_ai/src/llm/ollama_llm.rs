use dqa_core::error::{AppError, MODEL_INVOCATION_FAILED};
use serde::{Deserialize, Serialize};

use crate::ollama::OllamaClient;
use super::Llm;

#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
    temperature: f32,
}

impl OllamaLlm {
    pub fn new(client: OllamaClient, temperature: f32) -> Self {
        Self { client, temperature }
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl Llm for OllamaLlm {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError> {
        let url = format!("{}/api/generate", self.client.base_url());
        let req = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let resp = ureq::post(&url)
            .timeout(std::time::Duration::from_secs(60))
            .send_json(serde_json::to_value(req).map_err(|e| {
                AppError::new(MODEL_INVOCATION_FAILED, "Failed to encode generate request")
                    .with_details(e.to_string())
            })?);

        match resp {
            Ok(r) if r.status() == 200 => {
                let v: GenerateResponse = r.into_json().map_err(|e| {
                    AppError::new(MODEL_INVOCATION_FAILED, "Failed to decode generate response")
                        .with_details(e.to_string())
                })?;
                if v.response.trim().is_empty() {
                    return Err(AppError::new(MODEL_INVOCATION_FAILED, "Model response was empty")
                        .with_details(format!("model={model}")));
                }
                Ok(v.response)
            }
            Ok(r) => Err(
                AppError::new(MODEL_INVOCATION_FAILED, "Generate request failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(ureq::Error::Status(code, _)) => Err(
                AppError::new(MODEL_INVOCATION_FAILED, "Generate request failed")
                    .with_details(format!("status={code}; model={model}")),
            ),
            Err(e) => Err(
                AppError::new(MODEL_INVOCATION_FAILED, "Failed to call generate endpoint")
                    .with_details(e.to_string())
                    .with_retryable(true),
            ),
        }
    }
}
