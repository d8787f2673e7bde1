use dqa_core::error::{AppError, MODEL_INVOCATION_FAILED};
use serde::{Deserialize, Serialize};

use crate::groq::GroqClient;
use super::Llm;

/// OpenAI-compatible chat completion against the Groq API; one user message per call.
#[derive(Debug, Clone)]
pub struct GroqLlm {
    client: GroqClient,
    temperature: f32,
}

impl GroqLlm {
    pub fn new(client: GroqClient, temperature: f32) -> Self {
        Self { client, temperature }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl Llm for GroqLlm {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError> {
        let url = format!("{}/chat/completions", self.client.base_url());
        let req = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            stream: false,
        };

        let resp = ureq::post(&url)
            .timeout(std::time::Duration::from_secs(60))
            .set("Authorization", &self.client.authorization())
            .send_json(serde_json::to_value(req).map_err(|e| {
                AppError::new(MODEL_INVOCATION_FAILED, "Failed to encode chat request")
                    .with_details(e.to_string())
            })?);

        match resp {
            Ok(r) if r.status() == 200 => {
                let v: ChatResponse = r.into_json().map_err(|e| {
                    AppError::new(MODEL_INVOCATION_FAILED, "Failed to decode chat response")
                        .with_details(e.to_string())
                })?;
                let content = v
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default();
                if content.trim().is_empty() {
                    return Err(AppError::new(MODEL_INVOCATION_FAILED, "Model response was empty")
                        .with_details(format!("model={model}")));
                }
                Ok(content)
            }
            Ok(r) => Err(
                AppError::new(MODEL_INVOCATION_FAILED, "Chat request failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(ureq::Error::Status(code, r)) => {
                let body = r.into_string().unwrap_or_default();
                Err(AppError::new(MODEL_INVOCATION_FAILED, "Chat request failed")
                    .with_details(format!("status={code}; model={model}; body={}", snippet(&body, 300)))
                    .with_retryable(code == 429 || code >= 500))
            }
            Err(e) => Err(
                AppError::new(MODEL_INVOCATION_FAILED, "Failed to call chat endpoint")
                    .with_details(e.to_string())
                    .with_retryable(true),
            ),
        }
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    let t = text.trim();
    match t.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &t[..cut]),
        None => t.to_string(),
    }
}
