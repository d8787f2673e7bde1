use dqa_core::config::RetrievalSettings;
use dqa_core::domain::Chunk;
use dqa_core::error::{AppError, MODEL_INVOCATION_FAILED, PIPELINE_NOT_READY, QUESTION_EMPTY};
use serde::{Deserialize, Serialize};

use crate::embeddings::Embedder;
use crate::index::VectorIndex;
use crate::llm::Llm;
use crate::retrieve::{retrieve_for_question, SearchHit};

pub mod prompts;

pub use prompts::FALLBACK_ANSWER;

pub const NOT_READY_MESSAGE: &str = "Please initialize the pipeline first!";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Chunk>,
}

/// Retrieval over one index plus the generation model that answers from it.
#[derive(Debug, Clone)]
pub struct AnswerPipeline {
    index: VectorIndex,
    retrieval: RetrievalSettings,
    llm_model: String,
}

impl AnswerPipeline {
    pub fn new(index: VectorIndex, retrieval: &RetrievalSettings, llm_model: &str) -> Self {
        Self {
            index,
            retrieval: *retrieval,
            llm_model: llm_model.to_string(),
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn into_index(self) -> VectorIndex {
        self.index
    }

    pub fn retrieve(&self, embedder: &dyn Embedder, question: &str) -> Result<Vec<SearchHit>, AppError> {
        retrieve_for_question(&self.index, embedder, question, &self.retrieval)
    }

    /// Retrieve context, fill the prompt, and call the model once.
    pub fn answer(&self, embedder: &dyn Embedder, llm: &dyn Llm, question: &str) -> Result<Answer, AppError> {
        if question.trim().is_empty() {
            return Err(AppError::new(QUESTION_EMPTY, "Question must not be empty"));
        }

        let hits = self.retrieve(embedder, question)?;
        let context = hits
            .iter()
            .map(|h| h.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = prompts::grounded_answer_prompt(&context, question);

        let answer = llm.generate(&self.llm_model, &prompt).map_err(|e| {
            AppError::new(MODEL_INVOCATION_FAILED, "Language model call failed")
                .with_details(format!("model={}; err={}", self.llm_model, e.describe()))
                .with_retryable(e.retryable)
        })?;

        tracing::info!(sources = hits.len(), answer_chars = answer.chars().count(), "answered question");
        Ok(Answer {
            answer,
            sources: hits.into_iter().map(|h| h.chunk).collect(),
        })
    }
}

/// Answer with `pipeline`, or fail with the not-ready error when there is none.
pub fn answer_question(
    pipeline: Option<&AnswerPipeline>,
    embedder: &dyn Embedder,
    llm: &dyn Llm,
    question: &str,
) -> Result<Answer, AppError> {
    let Some(pipeline) = pipeline else {
        return Err(AppError::new(PIPELINE_NOT_READY, NOT_READY_MESSAGE));
    };
    pipeline.answer(embedder, llm, question)
}
