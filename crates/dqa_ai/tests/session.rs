use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dqa_ai::embeddings::Embedder;
use dqa_ai::index::IndexMode;
use dqa_ai::llm::Llm;
use dqa_ai::session::{
    BuildStage, InitializeRequest, Phase, Role, Session, SessionConfig, MODEL_FAILURE_ANSWER,
    RETRIEVAL_FAILURE_ANSWER,
};
use dqa_core::chunking::ChunkingConfig;
use dqa_core::config::RetrievalSettings;
use dqa_core::domain::{Document, SearchType};
use dqa_core::error::AppError;
use dqa_core::ingest::{LoaderRegistry, PageFetcher};
use pretty_assertions::assert_eq;

const TOPICS: [&str; 4] = ["billing", "search", "deploy", "paging"];

struct TopicEmbedder {
    offline: Arc<AtomicBool>,
}

impl Embedder for TopicEmbedder {
    fn embed(&self, _model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::new("RAG_EMBEDDINGS_FAILED", "embedder offline").with_retryable(true));
        }
        let lower = input.to_lowercase();
        let mut v: Vec<f32> = TOPICS
            .iter()
            .map(|t| if lower.contains(t) { 1.0 } else { 0.0 })
            .collect();
        v.push(0.1);
        Ok(v)
    }
}

struct EchoLlm {
    down: Arc<AtomicBool>,
}

impl Llm for EchoLlm {
    fn generate(&self, _model: &str, prompt: &str) -> Result<String, AppError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(AppError::new("RAG_MODEL_INVOCATION_FAILED", "Failed to call chat endpoint")
                .with_retryable(true));
        }
        Ok(format!("answered from {} chars of prompt", prompt.len()))
    }
}

struct NoWeb;

impl PageFetcher for NoWeb {
    fn fetch(&self, url: &str) -> Result<Vec<Document>, AppError> {
        Err(AppError::new("LOADER_FAILED", "network disabled in tests").with_details(format!("url={url}")))
    }
}

struct Harness {
    session: Session,
    embed_offline: Arc<AtomicBool>,
    llm_down: Arc<AtomicBool>,
    dir: tempfile::TempDir,
    data_dir: std::path::PathBuf,
}

fn harness_with(embed_model: &str, max_failed_ratio: Option<f32>) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path().join("data");
    fs::create_dir_all(&data_dir).expect("mkdir");
    fs::write(data_dir.join("team.txt"), "The billing service is owned by team Alpha.").expect("write");
    fs::write(
        data_dir.join("ops.csv"),
        "topic,detail\ndeploy,Deploys go out every Tuesday\npaging,Pages route to the on-call\n",
    )
    .expect("write");

    let config = SessionConfig {
        index_path: dir.path().join("faiss_index"),
        chunking: ChunkingConfig::default(),
        retrieval: RetrievalSettings {
            top_k: 2,
            search_type: SearchType::Mmr,
        },
        embed_model: embed_model.to_string(),
        llm_model: "llm-mock".to_string(),
        max_failed_ratio,
    };
    let embed_offline = Arc::new(AtomicBool::new(false));
    let llm_down = Arc::new(AtomicBool::new(false));
    let session = Session::new(
        config,
        LoaderRegistry::with_file_loaders(Box::new(NoWeb)),
        Box::new(TopicEmbedder {
            offline: embed_offline.clone(),
        }),
        Box::new(EchoLlm {
            down: llm_down.clone(),
        }),
    );
    Harness {
        session,
        embed_offline,
        llm_down,
        dir,
        data_dir,
    }
}

fn harness() -> Harness {
    harness_with("embed-mock", None)
}

fn request(data_dir: &Path, mode: IndexMode) -> InitializeRequest {
    InitializeRequest {
        data_dir: data_dir.to_path_buf(),
        urls: Vec::new(),
        mode,
    }
}

#[test]
fn ask_before_initialize_is_refused_without_touching_history() {
    let mut h = harness();
    let err = h.session.ask("Who owns billing?").unwrap_err();
    assert_eq!(err.code, "RAG_PIPELINE_NOT_READY");
    assert_eq!(err.message, "Please initialize the pipeline first!");
    assert!(h.session.history().is_empty());
    assert_eq!(h.session.status().phase, Phase::Uninitialized);
}

#[test]
fn initialize_then_ask_records_the_exchange() {
    let mut h = harness();
    let report = h
        .session
        .initialize(request(&h.data_dir, IndexMode::CreateNew))
        .expect("initialize");
    assert_eq!(report.total_documents, 3);
    assert_eq!(report.total_chunks, 3);
    assert_eq!(report.total_vectors, 3);
    assert_eq!(report.vector_dimension, 5);
    assert!(report.skipped.is_empty());
    assert!(h.session.store().exists());

    let status = h.session.status();
    assert!(status.ready);
    assert_eq!(status.phase, Phase::Ready);
    assert_eq!(status.vector_dimension, Some(5));
    assert_eq!(status.total_vectors, 3);

    let answer = h.session.ask("Who owns billing?").expect("ask");
    assert!(answer.answer.starts_with("answered from"));
    assert_eq!(answer.sources[0].content, "The billing service is owned by team Alpha.");

    let history = h.session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].content, "Who owns billing?");
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].sources, answer.sources);
    assert_eq!(history[1].error, None);
}

#[test]
fn blank_question_is_rejected_without_history() {
    let mut h = harness();
    h.session
        .initialize(request(&h.data_dir, IndexMode::CreateNew))
        .expect("initialize");
    let err = h.session.ask(" \t ").unwrap_err();
    assert_eq!(err.code, "RAG_QUESTION_EMPTY");
    assert!(h.session.history().is_empty());
}

#[test]
fn per_question_failures_become_diagnostics_and_keep_the_session_ready() {
    let mut h = harness();
    h.session
        .initialize(request(&h.data_dir, IndexMode::CreateNew))
        .expect("initialize");

    h.llm_down.store(true, Ordering::SeqCst);
    let answer = h.session.ask("When do deploys go out?").expect("ask");
    assert_eq!(answer.answer, MODEL_FAILURE_ANSWER);
    assert!(answer.sources.is_empty());
    h.llm_down.store(false, Ordering::SeqCst);

    h.embed_offline.store(true, Ordering::SeqCst);
    let answer = h.session.ask("Who gets paged?").expect("ask");
    assert_eq!(answer.answer, RETRIEVAL_FAILURE_ANSWER);
    h.embed_offline.store(false, Ordering::SeqCst);

    let history = h.session.history();
    assert_eq!(history.len(), 4);
    assert_eq!(
        history[1].error.as_ref().map(|e| e.code.as_str()),
        Some("RAG_MODEL_INVOCATION_FAILED")
    );
    assert_eq!(
        history[3].error.as_ref().map(|e| e.code.as_str()),
        Some("RAG_RETRIEVAL_FAILED")
    );
    assert!(h.session.is_ready());
    assert!(h.session.ask("Who owns billing?").is_ok());
}

#[test]
fn failed_initialize_leaves_a_ready_session_untouched() {
    let mut h = harness();
    h.session
        .initialize(request(&h.data_dir, IndexMode::CreateNew))
        .expect("initialize");
    h.session.ask("Who owns billing?").expect("ask");
    let before = h.session.status();

    let empty = h.dir.path().join("empty");
    fs::create_dir_all(&empty).expect("mkdir");
    let err = h
        .session
        .initialize(request(&empty, IndexMode::CreateNew))
        .unwrap_err();
    assert_eq!(err.stage, BuildStage::LoadDocuments);
    assert_eq!(err.error.code, "RAG_EMPTY_CORPUS");

    assert_eq!(h.session.status(), before);
    assert_eq!(h.session.history().len(), 2);
    assert!(h.session.ask("Who owns billing?").is_ok());
}

#[test]
fn load_existing_tolerates_an_empty_corpus() {
    let mut h = harness();
    h.session
        .initialize(request(&h.data_dir, IndexMode::CreateNew))
        .expect("initialize");
    h.session.ask("Who owns billing?").expect("ask");

    let empty = h.dir.path().join("empty");
    fs::create_dir_all(&empty).expect("mkdir");
    let report = h
        .session
        .initialize(request(&empty, IndexMode::LoadExisting))
        .expect("load");
    assert_eq!(report.total_documents, 0);
    assert_eq!(report.total_vectors, 3);
    assert!(h.session.history().is_empty());
    assert!(h.session.is_ready());
}

#[test]
fn extend_existing_appends_to_the_ready_index() {
    let mut h = harness();
    h.session
        .initialize(request(&h.data_dir, IndexMode::CreateNew))
        .expect("initialize");

    let more = h.dir.path().join("more");
    fs::create_dir_all(&more).expect("mkdir");
    fs::write(more.join("search.txt"), "Search relevance is owned by team Beta.").expect("write");
    let report = h
        .session
        .initialize(request(&more, IndexMode::ExtendExisting))
        .expect("extend");
    assert_eq!(report.total_chunks, 1);
    assert_eq!(report.total_vectors, 4);
    assert_eq!(h.session.status().total_vectors, 4);
    assert_eq!(h.session.store().load().expect("load").len(), 4);

    let answer = h.session.ask("Who owns search?").expect("ask");
    assert_eq!(answer.sources[0].content, "Search relevance is owned by team Beta.");
}

#[test]
fn load_without_a_persisted_index_fails_at_build_index() {
    let mut h = harness();
    let err = h
        .session
        .initialize(request(&h.data_dir, IndexMode::LoadExisting))
        .unwrap_err();
    assert_eq!(err.stage, BuildStage::BuildIndex);
    assert_eq!(err.error.code, "RAG_INDEX_NOT_FOUND");
    assert_eq!(h.session.phase(), Phase::Uninitialized);
}

#[test]
fn load_with_a_different_embedding_model_is_refused() {
    let mut h = harness();
    h.session
        .initialize(request(&h.data_dir, IndexMode::CreateNew))
        .expect("initialize");

    let mut config = h.session.config().clone();
    config.embed_model = "other-embed".to_string();
    let mut other = Session::new(
        config,
        LoaderRegistry::with_file_loaders(Box::new(NoWeb)),
        Box::new(TopicEmbedder {
            offline: h.embed_offline.clone(),
        }),
        Box::new(EchoLlm {
            down: h.llm_down.clone(),
        }),
    );
    let err = other
        .initialize(request(&h.data_dir, IndexMode::LoadExisting))
        .unwrap_err();
    assert_eq!(err.stage, BuildStage::BuildIndex);
    assert_eq!(err.error.code, "RAG_INDEX_MODEL_MISMATCH");
    assert!(!other.is_ready());
}

#[test]
fn rebuild_resets_to_uninitialized_and_removes_the_index() {
    let mut h = harness();
    h.session
        .initialize(request(&h.data_dir, IndexMode::CreateNew))
        .expect("initialize");
    h.session.ask("Who owns billing?").expect("ask");

    assert!(h.session.rebuild_index().expect("rebuild"));
    let status = h.session.status();
    assert_eq!(status.phase, Phase::Uninitialized);
    assert!(!status.ready);
    assert_eq!((status.total_documents, status.total_chunks, status.total_vectors), (0, 0, 0));
    assert!(h.session.history().is_empty());
    assert_eq!(h.session.store().load().unwrap_err().code, "RAG_INDEX_NOT_FOUND");
    assert_eq!(h.session.ask("Who owns billing?").unwrap_err().code, "RAG_PIPELINE_NOT_READY");
}

#[test]
fn reset_history_keeps_the_pipeline() {
    let mut h = harness();
    h.session
        .initialize(request(&h.data_dir, IndexMode::CreateNew))
        .expect("initialize");
    h.session.ask("Who owns billing?").expect("ask");
    h.session.reset_history();
    assert!(h.session.history().is_empty());
    assert!(h.session.is_ready());
}

#[test]
fn failure_ratio_policy_stops_loading() {
    let mut h = harness_with("embed-mock", Some(0.2));
    fs::write(h.data_dir.join("broken.pdf"), b"not a pdf").expect("write");
    let err = h
        .session
        .initialize(request(&h.data_dir, IndexMode::CreateNew))
        .unwrap_err();
    assert_eq!(err.stage, BuildStage::LoadDocuments);
    assert_eq!(err.error.code, "INGEST_FAILURE_RATIO_EXCEEDED");
}
