use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use dqa_ai::answer::Answer;
use dqa_ai::embeddings::ollama_embed::OllamaEmbedder;
use dqa_ai::embeddings::Embedder;
use dqa_ai::groq::GroqClient;
use dqa_ai::index::{IndexMode, IndexStore};
use dqa_ai::llm::groq_llm::GroqLlm;
use dqa_ai::llm::ollama_llm::OllamaLlm;
use dqa_ai::llm::Llm;
use dqa_ai::ollama::OllamaClient;
use dqa_ai::session::{InitializeReport, InitializeRequest, Session, SessionConfig};
use dqa_core::config::{LlmProvider, Settings, DEFAULT_INDEX_PATH};
use dqa_core::error::{AppError, CONFIG_INVALID, CONFIG_MISSING_CREDENTIAL};
use dqa_core::ingest::{ItemStatus, LoaderRegistry};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "docqa", version, about = "Ask questions about a folder of documents")]
pub struct Cli {
    /// Directory scanned for pdf, txt, docx, csv, xlsx, pptx and json files.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Web page to ingest; repeat for several pages.
    #[arg(long = "url", global = true)]
    pub urls: Vec<String>,

    /// Directory holding the persisted vector index.
    #[arg(long, global = true)]
    pub index_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = IndexModeArg::Auto, global = true)]
    pub index_mode: IndexModeArg,

    /// Log at debug level (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Read environment variables from this file instead of `./.env`.
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Interactive question loop (default).
    Chat,
    /// Initialize, answer one question and exit.
    Ask { question: String },
    /// Print the persisted index dimension and vector count.
    Status,
    /// Delete the persisted index.
    Rebuild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IndexModeArg {
    /// Load a persisted index when present, otherwise create one.
    Auto,
    Create,
    Load,
    Extend,
}

impl IndexModeArg {
    fn resolve(self, store: &IndexStore) -> IndexMode {
        match self {
            IndexModeArg::Auto => IndexMode::auto_for(store),
            IndexModeArg::Create => IndexMode::CreateNew,
            IndexModeArg::Load => IndexMode::LoadExisting,
            IndexModeArg::Extend => IndexMode::ExtendExisting,
        }
    }
}

/// One line typed into the chat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Exit,
    Reset,
    Rebuild,
    Init,
    Extend,
    Status,
    Help,
    Question(String),
    Blank,
}

pub fn parse_chat_line(line: &str) -> ChatCommand {
    let trimmed = line.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" => ChatCommand::Blank,
        "exit" | "quit" => ChatCommand::Exit,
        ":reset" => ChatCommand::Reset,
        ":rebuild" => ChatCommand::Rebuild,
        ":init" => ChatCommand::Init,
        ":extend" => ChatCommand::Extend,
        ":status" => ChatCommand::Status,
        ":help" => ChatCommand::Help,
        _ => ChatCommand::Question(trimmed.to_string()),
    }
}

const CHAT_HELP: &str = "\
Type a question and press enter.
  :init     build or load the index
  :extend   add the current documents to the persisted index
  :status   show pipeline totals
  :reset    clear the conversation
  :rebuild  delete the persisted index
  exit      leave";

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    // `.env` may carry RUST_LOG, so it is read before the subscriber is installed.
    let env_error = load_env_file(cli.env_file.as_deref());
    init_tracing(cli.verbose);
    if let Some((path, err)) = env_error {
        tracing::warn!(path = %path.display(), error = %err, "could not read env file");
    }

    match dispatch(&cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(code = %e.code, details = ?e.details, "{}", e.message);
            eprintln!("error: {e}");
            if e.is(CONFIG_INVALID) || e.is(CONFIG_MISSING_CREDENTIAL) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_new(filter_directives(verbose)).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn filter_directives(verbose: bool) -> String {
    if verbose {
        return "debug".to_string();
    }
    std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}

/// Returns the explicit env file that could not be read, if any. A missing `./.env` is fine.
fn load_env_file(path: Option<&Path>) -> Option<(PathBuf, dotenvy::Error)> {
    match path {
        Some(p) => dotenvy::from_path(p).err().map(|e| (p.to_path_buf(), e)),
        None => {
            dotenvy::dotenv().ok();
            None
        }
    }
}

fn dispatch(cli: &Cli) -> Result<ExitCode, AppError> {
    match cli.command.clone().unwrap_or(Command::Chat) {
        Command::Status => print_index_status(&resolve_index_path(cli)),
        Command::Rebuild => {
            let store = IndexStore::open(resolve_index_path(cli));
            if store.delete()? {
                println!("Deleted index at {}", store.root().display());
            } else {
                println!("No index at {}", store.root().display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Ask { question } => {
            let settings = load_settings(cli)?;
            let mut session = build_session(&settings)?;
            let req = initialize_request(cli, &settings, session.store(), None);
            let report = session
                .initialize(req)
                .map_err(|e| {
                    let details = match e.error.details.as_deref() {
                        Some(d) => format!("stage={}; {d}", e.stage),
                        None => format!("stage={}", e.stage),
                    };
                    e.error.with_details(details)
                })?;
            print_report(&report);
            let answer = session.ask(&question)?;
            print_answer(&answer);
            Ok(match last_turn_error(&session) {
                Some(_) => ExitCode::FAILURE,
                None => ExitCode::SUCCESS,
            })
        }
        Command::Chat => {
            let settings = load_settings(cli)?;
            let session = build_session(&settings)?;
            chat_loop(cli, &settings, session)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Index location for commands that never talk to a model.
fn resolve_index_path(cli: &Cli) -> PathBuf {
    cli.index_path
        .clone()
        .or_else(|| {
            std::env::var("DOCQA_INDEX_PATH")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_PATH))
}

fn load_settings(cli: &Cli) -> Result<Settings, AppError> {
    let mut settings = Settings::from_env()?;
    if let Some(dir) = &cli.data_dir {
        settings.data_dir = dir.clone();
    }
    if !cli.urls.is_empty() {
        settings.urls = cli.urls.clone();
    }
    if let Some(path) = &cli.index_path {
        settings.index_path = path.clone();
    }
    tracing::debug!(settings = ?settings, "settings resolved");
    Ok(settings)
}

fn build_models(settings: &Settings) -> Result<(Box<dyn Embedder>, Box<dyn Llm>), AppError> {
    let embedder = OllamaEmbedder::new(OllamaClient::new(&settings.ollama_url)?);
    let llm: Box<dyn Llm> = match settings.llm.provider {
        LlmProvider::Groq => {
            let key = settings.llm.api_key.as_deref().unwrap_or_default();
            let client = GroqClient::new(&settings.llm.groq_base_url, key)?;
            Box::new(GroqLlm::new(client, settings.llm.temperature))
        }
        LlmProvider::Ollama => {
            let client = OllamaClient::new(&settings.ollama_url)?;
            Box::new(OllamaLlm::new(client, settings.llm.temperature))
        }
    };
    Ok((Box::new(embedder), llm))
}

fn build_session(settings: &Settings) -> Result<Session, AppError> {
    let (embedder, llm) = build_models(settings)?;
    Ok(Session::new(
        SessionConfig::from_settings(settings),
        LoaderRegistry::with_defaults(),
        embedder,
        llm,
    ))
}

fn initialize_request(
    cli: &Cli,
    settings: &Settings,
    store: &IndexStore,
    forced: Option<IndexMode>,
) -> InitializeRequest {
    InitializeRequest {
        data_dir: settings.data_dir.clone(),
        urls: settings.urls.clone(),
        mode: forced.unwrap_or_else(|| cli.index_mode.resolve(store)),
    }
}

fn chat_loop(cli: &Cli, settings: &Settings, mut session: Session) -> Result<(), AppError> {
    println!("docqa: ask questions about {}", settings.data_dir.display());
    println!("{CHAT_HELP}");
    // Set after `:rebuild`; the next initialize must build from scratch.
    let mut force_create = false;

    let first = initialize_request(cli, settings, session.store(), None);
    initialize_in_chat(&mut session, first);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush().ok();
        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                return Err(AppError::new("CLI_STDIN_FAILED", "Failed to read from stdin").with_details(e.to_string()))
            }
            None => break,
        };

        match parse_chat_line(&line) {
            ChatCommand::Blank => {}
            ChatCommand::Exit => break,
            ChatCommand::Help => println!("{CHAT_HELP}"),
            ChatCommand::Reset => {
                session.reset_history();
                println!("Conversation cleared.");
            }
            ChatCommand::Rebuild => match session.rebuild_index() {
                Ok(_) => {
                    force_create = true;
                    println!("Index deleted. Run :init to build a new one.");
                }
                Err(e) => eprintln!("error: {e} {}", e.details.as_deref().unwrap_or_default()),
            },
            ChatCommand::Init => {
                let forced = force_create.then_some(IndexMode::CreateNew);
                let req = initialize_request(cli, settings, session.store(), forced);
                if initialize_in_chat(&mut session, req) {
                    force_create = false;
                }
            }
            ChatCommand::Extend => {
                let req = initialize_request(cli, settings, session.store(), Some(IndexMode::ExtendExisting));
                initialize_in_chat(&mut session, req);
            }
            ChatCommand::Status => {
                let s = session.status();
                println!(
                    "phase={:?} documents={} chunks={} vectors={} dimension={}",
                    s.phase,
                    s.total_documents,
                    s.total_chunks,
                    s.total_vectors,
                    s.vector_dimension.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
                );
            }
            ChatCommand::Question(q) => match session.ask(&q) {
                Ok(answer) => {
                    print_answer(&answer);
                    if let Some(err) = last_turn_error(&session) {
                        eprintln!("({})", err.describe());
                    }
                }
                Err(e) => println!("{}", e.message),
            },
        }
    }
    Ok(())
}

fn initialize_in_chat(session: &mut Session, req: InitializeRequest) -> bool {
    match session.initialize(req) {
        Ok(report) => {
            print_report(&report);
            true
        }
        Err(e) => {
            eprintln!("error: {e}");
            if let Some(d) = e.error.details.as_deref() {
                eprintln!("  {d}");
            }
            false
        }
    }
}

fn last_turn_error(session: &Session) -> Option<&AppError> {
    session.history().last().and_then(|t| t.error.as_ref())
}

fn print_report(report: &InitializeReport) {
    eprintln!(
        "Ready ({:?}): {} documents, {} chunks, {} vectors of dimension {}",
        report.mode, report.total_documents, report.total_chunks, report.total_vectors, report.vector_dimension
    );
    for skipped in &report.skipped {
        if let ItemStatus::Skipped { reason } = &skipped.status {
            eprintln!("  skipped {}: {reason}", skipped.item);
        }
    }
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.answer);
    if answer.sources.is_empty() {
        return;
    }
    println!();
    println!("Sources:");
    for (i, chunk) in answer.sources.iter().enumerate() {
        println!("  [{}] {}", i + 1, chunk.metadata.citation_label());
    }
}

fn print_index_status(index_path: &Path) -> Result<ExitCode, AppError> {
    let store = IndexStore::open(index_path);
    let index = store.load()?;
    println!("index: {}", store.root().display());
    println!("model: {}", index.model());
    println!("dimension: {}", index.dims());
    println!("vectors: {}", index.len());
    println!("updated_at: {}", index.updated_at());
    Ok(ExitCode::SUCCESS)
}
