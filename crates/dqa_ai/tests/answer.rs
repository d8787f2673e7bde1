use std::sync::Mutex;

use dqa_ai::answer::{answer_question, AnswerPipeline, FALLBACK_ANSWER};
use dqa_ai::embeddings::Embedder;
use dqa_ai::index::VectorIndex;
use dqa_ai::llm::Llm;
use dqa_core::config::RetrievalSettings;
use dqa_core::domain::{Chunk, DocumentMetadata, SearchType, SourceFormat};
use dqa_core::error::AppError;
use pretty_assertions::assert_eq;

const TOPICS: [&str; 4] = ["billing", "search", "deploy", "paging"];

/// One dimension per known topic word, plus a constant so no vector has zero norm.
struct TopicEmbedder;

impl Embedder for TopicEmbedder {
    fn embed(&self, _model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let lower = input.to_lowercase();
        let mut v: Vec<f32> = TOPICS
            .iter()
            .map(|t| if lower.contains(t) { 1.0 } else { 0.0 })
            .collect();
        v.push(0.1);
        Ok(v)
    }
}

struct RecordingLlm {
    reply: Result<String, AppError>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl RecordingLlm {
    fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing(err: AppError) -> Self {
        Self {
            reply: Err(err),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.prompts.lock().expect("lock").clone()
    }
}

impl Llm for RecordingLlm {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError> {
        self.prompts
            .lock()
            .expect("lock")
            .push((model.to_string(), prompt.to_string()));
        self.reply.clone()
    }
}

fn pipeline(k: usize) -> AnswerPipeline {
    let chunks: Vec<Chunk> = [
        ("team.txt", "The billing service is owned by team Alpha."),
        ("team.txt", "Search relevance is owned by team Beta."),
        ("ops.txt", "Deploys go out every Tuesday."),
        ("ops.txt", "Billing invoices are generated nightly."),
    ]
    .iter()
    .enumerate()
    .map(|(i, (src, text))| {
        Chunk::new(
            DocumentMetadata::new(*src, SourceFormat::Text),
            i as u32,
            0,
            text.to_string(),
        )
    })
    .collect();
    let index = VectorIndex::build(&chunks, &TopicEmbedder, "embed-mock", "2026-02-10T00:00:00Z").expect("build");
    let settings = RetrievalSettings {
        top_k: k,
        search_type: SearchType::Similarity,
    };
    AnswerPipeline::new(index, &settings, "llm-mock")
}

#[test]
fn answers_verbatim_with_retrieved_sources() {
    let p = pipeline(2);
    let llm = RecordingLlm::replying("Team Alpha owns billing.");

    let answer = p.answer(&TopicEmbedder, &llm, "Who owns billing?").expect("answer");
    assert_eq!(answer.answer, "Team Alpha owns billing.");

    let sources: Vec<&str> = answer.sources.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(
        sources,
        vec![
            "The billing service is owned by team Alpha.",
            "Billing invoices are generated nightly.",
        ]
    );

    let calls = llm.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "llm-mock");
    let prompt = &calls[0].1;
    assert!(prompt.contains(
        "<context>\nThe billing service is owned by team Alpha.\n\nBilling invoices are generated nightly.\n</context>"
    ));
    assert!(prompt.contains("Question: Who owns billing?"));
    assert!(prompt.contains(FALLBACK_ANSWER));
}

#[test]
fn fallback_reply_is_passed_through() {
    let p = pipeline(3);
    let llm = RecordingLlm::replying(FALLBACK_ANSWER);
    let answer = p.answer(&TopicEmbedder, &llm, "What is the capital of France?").expect("answer");
    assert_eq!(answer.answer, FALLBACK_ANSWER);
    assert_eq!(answer.sources.len(), 3);
}

#[test]
fn missing_pipeline_is_not_ready() {
    let llm = RecordingLlm::replying("unused");
    let err = answer_question(None, &TopicEmbedder, &llm, "Who owns billing?").unwrap_err();
    assert_eq!(err.code, "RAG_PIPELINE_NOT_READY");
    assert_eq!(err.message, "Please initialize the pipeline first!");
    assert!(llm.calls().is_empty());
}

#[test]
fn blank_question_never_reaches_the_model() {
    let p = pipeline(3);
    let llm = RecordingLlm::replying("unused");
    let err = answer_question(Some(&p), &TopicEmbedder, &llm, "   ").unwrap_err();
    assert_eq!(err.code, "RAG_QUESTION_EMPTY");
    assert!(llm.calls().is_empty());
}

#[test]
fn model_failures_keep_the_retryable_flag() {
    let p = pipeline(3);
    let llm = RecordingLlm::failing(
        AppError::new("RAG_MODEL_INVOCATION_FAILED", "Failed to call chat endpoint").with_retryable(true),
    );
    let err = p.answer(&TopicEmbedder, &llm, "When do deploys go out?").unwrap_err();
    assert_eq!(err.code, "RAG_MODEL_INVOCATION_FAILED");
    assert!(err.retryable);
    assert_eq!(llm.calls().len(), 1);
}
