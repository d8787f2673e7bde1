pub mod answer;
pub mod embeddings;
pub mod groq;
pub mod index;
pub mod llm;
pub mod ollama;
pub mod retrieve;
pub mod session;

#[cfg(test)]
mod tests {
    use super::groq::GroqClient;
    use super::ollama::OllamaClient;
    use super::answer::prompts::{grounded_answer_prompt, FALLBACK_ANSWER};

    #[test]
    fn enforces_localhost_only_base_url() {
        assert!(OllamaClient::new("http://127.0.0.1:11434").is_ok());
        assert!(OllamaClient::new("http://127.0.0.1").is_ok());

        assert!(OllamaClient::new("http://localhost:11434").is_err());
        assert!(OllamaClient::new("http://0.0.0.0:11434").is_err());
        assert!(OllamaClient::new("http://[::1]:11434").is_err());
        assert!(OllamaClient::new("https://example.com").is_err());

        // Harden against prefix-based bypasses.
        assert!(OllamaClient::new("http://127.0.0.1.evil.com:11434").is_err());
        assert!(OllamaClient::new("http://127.0.0.1@evil.com:11434").is_err());
        assert!(OllamaClient::new("http://127.0.0.1:").is_err());
        assert!(OllamaClient::new("http://127.0.0.1:0").is_err());
        assert!(OllamaClient::new("http://127.0.0.1:99999").is_err());
        assert!(OllamaClient::new("http://127.0.0.1:11434/").is_ok()); // trailing slash is trimmed
        assert!(OllamaClient::new("http://127.0.0.1:11434/api").is_err());

        let err = OllamaClient::new("http://10.0.0.5:11434").unwrap_err();
        assert_eq!(err.code, "AI_REMOTE_NOT_ALLOWED");
    }

    #[test]
    fn groq_requires_https_and_a_key() {
        assert!(GroqClient::new("https://api.groq.com/openai/v1/", "gsk-test").is_ok());
        assert_eq!(
            GroqClient::new("http://api.groq.com/openai/v1", "gsk-test").unwrap_err().code,
            "AI_REMOTE_NOT_ALLOWED"
        );
        assert!(GroqClient::new("https://", "gsk-test").is_err());
        assert_eq!(
            GroqClient::new("https://api.groq.com/openai/v1", "  ").unwrap_err().code,
            "CONFIG_MISSING_CREDENTIAL"
        );

        let client = GroqClient::new("https://api.groq.com/openai/v1", "gsk-secret").expect("client");
        assert_eq!(client.base_url(), "https://api.groq.com/openai/v1");
        assert!(!format!("{client:?}").contains("gsk-secret"));
    }

    #[test]
    fn prompt_embeds_context_and_question_verbatim() {
        let prompt = grounded_answer_prompt("alpha\n\nbeta", "  What is alpha? ");
        assert!(prompt.contains("<context>\nalpha\n\nbeta\n</context>"));
        assert!(prompt.contains("Question:   What is alpha? \n"));
        assert!(prompt.contains(FALLBACK_ANSWER));
    }
}
