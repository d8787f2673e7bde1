//! Conversation session: owns the pipeline state, the chat history and the collaborators
//! used to (re)build the index.
//!
//! `initialize` either fully succeeds or leaves the session exactly as it was.

use std::fmt;
use std::path::PathBuf;

use dqa_core::chunking::{split_documents, ChunkingConfig};
use dqa_core::config::{RetrievalSettings, Settings};
use dqa_core::domain::Chunk;
use dqa_core::error::{AppError, EMPTY_CORPUS, MODEL_INVOCATION_FAILED, PIPELINE_NOT_READY, QUESTION_EMPTY};
use dqa_core::ingest::{LoadReport, LoaderRegistry};
use serde::{Deserialize, Serialize};

use crate::answer::{answer_question, Answer, AnswerPipeline, NOT_READY_MESSAGE};
use crate::embeddings::Embedder;
use crate::index::{IndexMode, IndexStore, VectorIndex};
use crate::llm::Llm;

pub const MODEL_FAILURE_ANSWER: &str = "The language model could not produce an answer. Please try again.";
pub const RETRIEVAL_FAILURE_ANSWER: &str = "The question could not be answered from the index. Please try again.";

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub index_path: PathBuf,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalSettings,
    pub embed_model: String,
    pub llm_model: String,
    pub max_failed_ratio: Option<f32>,
}

impl SessionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            index_path: settings.index_path.clone(),
            chunking: settings.chunking,
            retrieval: settings.retrieval,
            embed_model: settings.embed_model.clone(),
            llm_model: settings.llm.model.clone(),
            max_failed_ratio: settings.max_failed_ratio,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Uninitialized,
    Building,
    Ready,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Chunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AppError>,
}

impl Turn {
    fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
            sources: Vec::new(),
            error: None,
        }
    }

    fn assistant(answer: &Answer) -> Self {
        Self {
            role: Role::Assistant,
            content: answer.answer.clone(),
            sources: answer.sources.clone(),
            error: None,
        }
    }

    fn diagnostic(content: &str, error: AppError) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
            sources: Vec::new(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    LoadDocuments,
    SplitChunks,
    BuildIndex,
    ConstructPipeline,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildStage::LoadDocuments => "load documents",
            BuildStage::SplitChunks => "split chunks",
            BuildStage::BuildIndex => "build index",
            BuildStage::ConstructPipeline => "construct pipeline",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeRequest {
    pub data_dir: PathBuf,
    pub urls: Vec<String>,
    pub mode: IndexMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitializeReport {
    pub mode: IndexMode,
    pub total_documents: usize,
    pub total_chunks: usize,
    pub total_vectors: usize,
    pub vector_dimension: u32,
    pub skipped: Vec<LoadReport>,
}

/// A failed `initialize`, naming the stage that stopped it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeError {
    pub stage: BuildStage,
    pub error: AppError,
}

impl InitializeError {
    fn at(stage: BuildStage) -> impl FnOnce(AppError) -> Self {
        move |error| Self { stage, error }
    }
}

impl fmt::Display for InitializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "initialization failed at stage '{}': {}", self.stage, self.error)
    }
}

impl std::error::Error for InitializeError {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineStatus {
    pub phase: Phase,
    pub ready: bool,
    pub total_documents: usize,
    pub total_chunks: usize,
    pub vector_dimension: Option<u32>,
    pub total_vectors: usize,
}

struct Built {
    pipeline: AnswerPipeline,
    report: InitializeReport,
}

pub struct Session {
    config: SessionConfig,
    loaders: LoaderRegistry,
    embedder: Box<dyn Embedder>,
    llm: Box<dyn Llm>,
    store: IndexStore,
    phase: Phase,
    total_documents: usize,
    total_chunks: usize,
    pipeline: Option<AnswerPipeline>,
    history: Vec<Turn>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        loaders: LoaderRegistry,
        embedder: Box<dyn Embedder>,
        llm: Box<dyn Llm>,
    ) -> Self {
        let store = IndexStore::open(config.index_path.clone());
        Self {
            config,
            loaders,
            embedder,
            llm,
            store,
            phase: Phase::Uninitialized,
            total_documents: 0,
            total_chunks: 0,
            pipeline: None,
            history: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready && self.pipeline.is_some()
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn initialize(&mut self, req: InitializeRequest) -> Result<InitializeReport, InitializeError> {
        let prior_phase = self.phase;
        self.phase = Phase::Building;
        tracing::info!(mode = ?req.mode, data_dir = %req.data_dir.display(), urls = req.urls.len(), "initializing pipeline");

        match self.build(&req) {
            Ok(built) => {
                self.total_documents = built.report.total_documents;
                self.total_chunks = built.report.total_chunks;
                self.pipeline = Some(built.pipeline);
                self.history.clear();
                self.phase = Phase::Ready;
                tracing::info!(
                    documents = built.report.total_documents,
                    chunks = built.report.total_chunks,
                    vectors = built.report.total_vectors,
                    dims = built.report.vector_dimension,
                    "pipeline ready"
                );
                Ok(built.report)
            }
            Err(e) => {
                self.phase = prior_phase;
                tracing::warn!(stage = %e.stage, error = %e.error, details = ?e.error.details, "initialization failed");
                Err(e)
            }
        }
    }

    // Reads session state but never mutates it; only the persisted index may change.
    fn build(&self, req: &InitializeRequest) -> Result<Built, InitializeError> {
        let outcome = self.loaders.load_all(&req.data_dir, &req.urls);
        if let Some(max) = self.config.max_failed_ratio {
            outcome
                .enforce_failure_ratio(max)
                .map_err(InitializeError::at(BuildStage::LoadDocuments))?;
        }
        let tolerate_empty = req.mode == IndexMode::LoadExisting;
        if outcome.documents.is_empty() && !tolerate_empty {
            return Err(InitializeError {
                stage: BuildStage::LoadDocuments,
                error: AppError::new(EMPTY_CORPUS, "No documents were loaded")
                    .with_details(format!("data_dir={}; urls={}", req.data_dir.display(), req.urls.len())),
            });
        }

        let chunks = split_documents(&outcome.documents, &self.config.chunking);
        if chunks.is_empty() && !tolerate_empty {
            return Err(InitializeError {
                stage: BuildStage::SplitChunks,
                error: AppError::new(EMPTY_CORPUS, "Documents produced no chunks")
                    .with_details(format!("documents={}", outcome.documents.len())),
            });
        }

        let index = self
            .obtain_index(req.mode, &chunks)
            .map_err(InitializeError::at(BuildStage::BuildIndex))?;

        if index.is_empty() {
            return Err(InitializeError {
                stage: BuildStage::ConstructPipeline,
                error: AppError::new(EMPTY_CORPUS, "Index has no vectors"),
            });
        }
        let report = InitializeReport {
            mode: req.mode,
            total_documents: outcome.documents.len(),
            total_chunks: chunks.len(),
            total_vectors: index.len(),
            vector_dimension: index.dims(),
            skipped: outcome.skipped().cloned().collect(),
        };
        let pipeline = AnswerPipeline::new(index, &self.config.retrieval, &self.config.llm_model);
        Ok(Built { pipeline, report })
    }

    fn obtain_index(&self, mode: IndexMode, chunks: &[Chunk]) -> Result<VectorIndex, AppError> {
        let model = self.config.embed_model.as_str();
        match mode {
            IndexMode::CreateNew => self.store.create(chunks, self.embedder.as_ref(), model),
            IndexMode::LoadExisting => {
                let index = self.store.load()?;
                index.ensure_model(model)?;
                Ok(index)
            }
            IndexMode::ExtendExisting => {
                // A pipeline only exists once a previous initialize succeeded.
                let base = match self.pipeline.as_ref() {
                    Some(p) => p.index().clone(),
                    None => self.store.load()?,
                };
                base.ensure_model(model)?;
                self.store.add(&base, chunks, self.embedder.as_ref())
            }
        }
    }

    /// Answer one question and record the exchange. Per-question failures become a
    /// diagnostic answer and leave the session ready.
    pub fn ask(&mut self, question: &str) -> Result<Answer, AppError> {
        if !self.is_ready() {
            return Err(AppError::new(PIPELINE_NOT_READY, NOT_READY_MESSAGE));
        }
        if question.trim().is_empty() {
            return Err(AppError::new(QUESTION_EMPTY, "Question must not be empty"));
        }

        self.history.push(Turn::user(question));
        let result = answer_question(
            self.pipeline.as_ref(),
            self.embedder.as_ref(),
            self.llm.as_ref(),
            question,
        );

        match result {
            Ok(answer) => {
                self.history.push(Turn::assistant(&answer));
                Ok(answer)
            }
            Err(e) => {
                let diagnostic = if e.is(MODEL_INVOCATION_FAILED) {
                    MODEL_FAILURE_ANSWER
                } else {
                    RETRIEVAL_FAILURE_ANSWER
                };
                tracing::warn!(error = %e, details = ?e.details, retryable = e.retryable, "question failed");
                self.history.push(Turn::diagnostic(diagnostic, e));
                Ok(Answer {
                    answer: diagnostic.to_string(),
                    sources: Vec::new(),
                })
            }
        }
    }

    pub fn reset_history(&mut self) {
        self.history.clear();
    }

    /// Delete the persisted index and drop back to `Uninitialized`.
    pub fn rebuild_index(&mut self) -> Result<bool, AppError> {
        let removed = self.store.delete()?;
        self.pipeline = None;
        self.total_documents = 0;
        self.total_chunks = 0;
        self.history.clear();
        self.phase = Phase::Uninitialized;
        Ok(removed)
    }

    pub fn status(&self) -> PipelineStatus {
        let index = self.pipeline.as_ref().map(|p| p.index());
        PipelineStatus {
            phase: self.phase,
            ready: self.is_ready(),
            total_documents: self.total_documents,
            total_chunks: self.total_chunks,
            vector_dimension: index.map(|i| i.dims()),
            total_vectors: index.map(|i| i.len()).unwrap_or(0),
        }
    }
}
