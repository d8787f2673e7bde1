use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{Document, SourceFormat};
use crate::error::{AppError, INGEST_FAILURE_RATIO_EXCEEDED, LOADER_FAILED};

pub mod office;
pub mod pdf;
pub mod tabular;
pub mod text;
pub mod web;

/// Parses one discovered file into documents.
pub trait DocumentLoader {
    fn format(&self) -> SourceFormat;
    fn load(&self, path: &Path) -> Result<Vec<Document>, AppError>;
}

/// Fetches one URL into documents.
pub trait PageFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<Document>, AppError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Loaded { documents: usize },
    Skipped { reason: String },
}

/// Outcome for one file or URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadReport {
    pub item: String,
    pub format: SourceFormat,
    #[serde(flatten)]
    pub status: ItemStatus,
}

impl LoadReport {
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, ItemStatus::Skipped { .. })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadOutcome {
    pub documents: Vec<Document>,
    pub reports: Vec<LoadReport>,
}

impl LoadOutcome {
    pub fn skipped(&self) -> impl Iterator<Item = &LoadReport> {
        self.reports.iter().filter(|r| r.is_skipped())
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped().count()
    }

    /// Share of items that were skipped; 0.0 when nothing was attempted.
    pub fn failure_ratio(&self) -> f32 {
        if self.reports.is_empty() {
            return 0.0;
        }
        self.skipped_count() as f32 / self.reports.len() as f32
    }

    pub fn enforce_failure_ratio(&self, max_ratio: f32) -> Result<(), AppError> {
        let ratio = self.failure_ratio();
        if ratio > max_ratio {
            return Err(AppError::new(
                INGEST_FAILURE_RATIO_EXCEEDED,
                "Too many inputs failed to load",
            )
            .with_details(format!(
                "skipped={}; attempted={}; ratio={ratio:.2}; max={max_ratio:.2}",
                self.skipped_count(),
                self.reports.len()
            )));
        }
        Ok(())
    }
}

/// Per-format loaders plus the web fetcher, run in a fixed format order.
pub struct LoaderRegistry {
    loaders: BTreeMap<SourceFormat, Box<dyn DocumentLoader>>,
    fetcher: Box<dyn PageFetcher>,
}

impl LoaderRegistry {
    pub fn new(fetcher: Box<dyn PageFetcher>) -> Self {
        Self {
            loaders: BTreeMap::new(),
            fetcher,
        }
    }

    /// Every shipped format loader and the HTTP page fetcher.
    pub fn with_defaults() -> Self {
        Self::with_file_loaders(Box::new(web::HttpPageFetcher::default()))
    }

    /// Every shipped format loader, paired with the given fetcher.
    pub fn with_file_loaders(fetcher: Box<dyn PageFetcher>) -> Self {
        let mut reg = Self::new(fetcher);
        reg.register(Box::new(pdf::PdfLoader));
        reg.register(Box::new(text::TextLoader));
        reg.register(Box::new(office::WordLoader));
        reg.register(Box::new(tabular::CsvLoader));
        reg.register(Box::new(office::ExcelLoader));
        reg.register(Box::new(office::PowerPointLoader));
        reg.register(Box::new(tabular::JsonLoader));
        reg
    }

    /// Replaces any loader already registered for the same format.
    pub fn register(&mut self, loader: Box<dyn DocumentLoader>) {
        self.loaders.insert(loader.format(), loader);
    }

    pub fn formats(&self) -> Vec<SourceFormat> {
        self.loaders.keys().copied().collect()
    }

    pub fn load_all(&self, root: &Path, urls: &[String]) -> LoadOutcome {
        let mut out = LoadOutcome::default();

        if !root.is_dir() {
            tracing::warn!(root = %root.display(), "data directory does not exist; no files loaded");
        }

        for (format, loader) in self.loaders.iter() {
            let Some(ext) = format.extension() else { continue };
            let files = if root.is_dir() { discover_files(root, ext) } else { Vec::new() };
            tracing::info!(format = %format, found = files.len(), "discovered files");

            let before = out.documents.len();
            for file in files {
                let item = file.display().to_string();
                run_item(&mut out, item, *format, || loader.load(&file));
            }
            tracing::info!(
                format = %format,
                documents = out.documents.len() - before,
                "documents loaded for format"
            );
        }

        if !urls.is_empty() {
            tracing::info!(found = urls.len(), "web pages to process");
            for url in urls {
                run_item(&mut out, url.clone(), SourceFormat::Web, || self.fetcher.fetch(url));
            }
        }

        tracing::info!(
            documents = out.documents.len(),
            skipped = out.skipped_count(),
            "total documents loaded from all sources"
        );
        out
    }
}

fn run_item<F>(out: &mut LoadOutcome, item: String, format: SourceFormat, load: F)
where
    F: FnOnce() -> Result<Vec<Document>, AppError>,
{
    // Parsers for hostile formats can panic; that costs the item, never the batch.
    let result = panic::catch_unwind(AssertUnwindSafe(load)).unwrap_or_else(|payload| {
        Err(AppError::new(LOADER_FAILED, "Loader panicked").with_details(panic_message(payload.as_ref())))
    });
    match result {
        Ok(docs) => {
            tracing::debug!(item = %item, documents = docs.len(), "loaded");
            out.reports.push(LoadReport {
                item,
                format,
                status: ItemStatus::Loaded {
                    documents: docs.len(),
                },
            });
            out.documents.extend(docs);
        }
        Err(e) => {
            tracing::warn!(item = %item, error = %e, details = ?e.details, "skipping input that failed to load");
            out.reports.push(LoadReport {
                item,
                format,
                status: ItemStatus::Skipped { reason: e.describe() },
            });
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Recursively find files under `root` with the given extension (case-insensitive),
/// sorted lexicographically.
pub fn discover_files(root: &Path, extension: &str) -> Vec<PathBuf> {
    let pattern = format!(
        "{}/**/*.{}",
        glob::Pattern::escape(&root.to_string_lossy()).trim_end_matches('/'),
        extension
    );
    let options = glob::MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    let entries = match glob::glob_with(&pattern, options) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "invalid discovery pattern");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(error = %e, "unreadable path during discovery");
                None
            }
        })
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files
}

/// Load every supported file under `root` plus the given URLs with the default loaders.
pub fn load_all_data(root: &Path, urls: &[String]) -> LoadOutcome {
    LoaderRegistry::with_defaults().load_all(root, urls)
}
