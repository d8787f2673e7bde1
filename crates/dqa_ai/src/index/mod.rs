use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use dqa_core::domain::{Chunk, SearchType};
use dqa_core::error::{
    AppError, EMBEDDINGS_FAILED, EMPTY_CORPUS, INDEX_CORRUPT, INDEX_DIMS_MISMATCH,
    INDEX_MODEL_MISMATCH, INDEX_NOT_FOUND, INDEX_WRITE_FAILED, RETRIEVAL_FAILED,
};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::embeddings::Embedder;
use crate::retrieve::{mmr_ranking, similarity_ranking, SearchHit, MMR_LAMBDA, MMR_MIN_FETCH_K};

pub const INDEX_FORMAT_VERSION: u32 = 1;
pub const INDEX_FILE_NAME: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Flat vector index. Entry identity is the entry's position; nothing is deduplicated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorIndex {
    format_version: u32,
    model: String,
    dims: u32,
    updated_at: String,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Embed every chunk in order. Fails on an empty corpus or inconsistent dimensions.
    pub fn build(
        chunks: &[Chunk],
        embedder: &dyn Embedder,
        model: &str,
        updated_at: &str,
    ) -> Result<Self, AppError> {
        if chunks.is_empty() {
            return Err(AppError::new(
                EMPTY_CORPUS,
                "No chunks available; nothing to index",
            ));
        }
        let (entries, dims) = embed_chunks(chunks, embedder, model, None)?;
        Ok(Self {
            format_version: INDEX_FORMAT_VERSION,
            model: model.to_string(),
            dims,
            updated_at: updated_at.to_string(),
            entries,
        })
    }

    /// A copy of this index with `chunks` appended. `self` is never modified.
    pub fn with_added(
        &self,
        chunks: &[Chunk],
        embedder: &dyn Embedder,
        updated_at: &str,
    ) -> Result<Self, AppError> {
        let (new_entries, _) = embed_chunks(chunks, embedder, &self.model, Some(self.dims))?;
        let mut next = self.clone();
        next.entries.extend(new_entries);
        next.updated_at = updated_at.to_string();
        Ok(next)
    }

    pub fn search(&self, query: &[f32], k: usize, search_type: SearchType) -> Result<Vec<SearchHit>, AppError> {
        if query.len() as u32 != self.dims {
            return Err(AppError::new(
                RETRIEVAL_FAILED,
                "Query vector dims do not match index dims",
            )
            .with_details(format!("index_dims={}; query_dims={}", self.dims, query.len())));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let vectors: Vec<&[f32]> = self.entries.iter().map(|e| e.vector.as_slice()).collect();
        let ranked = match search_type {
            SearchType::Similarity => similarity_ranking(&vectors, query, k),
            SearchType::Mmr => mmr_ranking(&vectors, query, k, MMR_MIN_FETCH_K.max(k), MMR_LAMBDA),
        };

        Ok(ranked
            .into_iter()
            .map(|r| SearchHit {
                position: r.position,
                distance: r.distance,
                chunk: self.entries[r.position].chunk.clone(),
            })
            .collect())
    }

    pub fn ensure_model(&self, model: &str) -> Result<(), AppError> {
        if self.model != model {
            return Err(AppError::new(
                INDEX_MODEL_MISMATCH,
                "Persisted index was built with a different embedding model",
            )
            .with_details(format!("index_model={}; configured_model={}", self.model, model)));
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), String> {
        if self.format_version != INDEX_FORMAT_VERSION {
            return Err(format!(
                "unsupported format_version={}; expected={}",
                self.format_version, INDEX_FORMAT_VERSION
            ));
        }
        if self.dims == 0 {
            return Err("dims=0".to_string());
        }
        if self.entries.is_empty() {
            return Err("index has no entries".to_string());
        }
        for (i, e) in self.entries.iter().enumerate() {
            if e.vector.len() as u32 != self.dims {
                return Err(format!(
                    "entry={i}; chunk_id={}; expected={}; got={}",
                    e.chunk.chunk_id,
                    self.dims,
                    e.vector.len()
                ));
            }
        }
        Ok(())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> u32 {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn updated_at(&self) -> &str {
        &self.updated_at
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }
}

fn embed_chunks(
    chunks: &[Chunk],
    embedder: &dyn Embedder,
    model: &str,
    expected_dims: Option<u32>,
) -> Result<(Vec<IndexEntry>, u32), AppError> {
    let mut dims = expected_dims;
    let mut out = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        let v = embedder.embed(model, &chunk.content).map_err(|e| {
            AppError::new(EMBEDDINGS_FAILED, "Failed to compute embeddings")
                .with_details(format!("chunk_id={}; err={}", chunk.chunk_id, e.describe()))
                .with_retryable(e.retryable)
        })?;
        let this_dims = v.len() as u32;
        if this_dims == 0 {
            return Err(AppError::new(INDEX_DIMS_MISMATCH, "Embedding vector was empty")
                .with_details(format!("chunk_id={}", chunk.chunk_id)));
        }
        match dims {
            Some(d) if d != this_dims => {
                return Err(AppError::new(
                    INDEX_DIMS_MISMATCH,
                    "Embedding dimension mismatch across chunks",
                )
                .with_details(format!(
                    "expected={}; got={}; chunk_id={}",
                    d, this_dims, chunk.chunk_id
                )));
            }
            Some(_) => {}
            None => dims = Some(this_dims),
        }
        out.push(IndexEntry {
            chunk: chunk.clone(),
            vector: v,
        });
    }

    Ok((out, dims.unwrap_or(0)))
}

/// How `initialize` obtains its index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
    CreateNew,
    LoadExisting,
    ExtendExisting,
}

impl IndexMode {
    /// Load when an index is persisted, otherwise create one.
    pub fn auto_for(store: &IndexStore) -> Self {
        if store.exists() {
            IndexMode::LoadExisting
        } else {
            IndexMode::CreateNew
        }
    }
}

/// Persists one `VectorIndex` as `<root>/index.json`.
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE_NAME)
    }

    fn tmp_path(&self) -> PathBuf {
        self.index_path().with_extension("json.tmp")
    }

    pub fn exists(&self) -> bool {
        self.index_path().is_file()
    }

    fn ensure_dirs(&self) -> Result<(), AppError> {
        fs::create_dir_all(&self.root).map_err(|e| {
            AppError::new(INDEX_WRITE_FAILED, "Failed to create index directory")
                .with_details(format!("path={}; err={}", self.root.display(), e))
        })
    }

    /// Build from `chunks` and persist, replacing any previous artifact.
    pub fn create(&self, chunks: &[Chunk], embedder: &dyn Embedder, model: &str) -> Result<VectorIndex, AppError> {
        let index = VectorIndex::build(chunks, embedder, model, &now_rfc3339_utc())?;
        self.save(&index)?;
        tracing::info!(
            path = %self.root.display(),
            vectors = index.len(),
            dims = index.dims(),
            "created vector index"
        );
        Ok(index)
    }

    pub fn load(&self) -> Result<VectorIndex, AppError> {
        let path = self.index_path();
        if !path.is_file() {
            return Err(AppError::new(INDEX_NOT_FOUND, "No persisted index found")
                .with_details(format!("path={}", path.display())));
        }
        let bytes = fs::read(&path).map_err(|e| {
            AppError::new(INDEX_CORRUPT, "Failed to read persisted index")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        let index: VectorIndex = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::new(INDEX_CORRUPT, "Failed to decode persisted index")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        index.validate().map_err(|reason| {
            AppError::new(INDEX_CORRUPT, "Persisted index failed validation")
                .with_details(format!("path={}; {}", path.display(), reason))
        })?;

        tracing::info!(
            path = %self.root.display(),
            vectors = index.len(),
            dims = index.dims(),
            "loaded vector index"
        );
        Ok(index)
    }

    /// Embed and append `chunks`, persist, and return the grown index.
    /// On failure `existing` and the artifact on disk are unchanged.
    pub fn add(&self, existing: &VectorIndex, chunks: &[Chunk], embedder: &dyn Embedder) -> Result<VectorIndex, AppError> {
        let next = existing.with_added(chunks, embedder, &now_rfc3339_utc())?;
        self.save(&next)?;
        tracing::info!(
            path = %self.root.display(),
            added = chunks.len(),
            vectors = next.len(),
            "extended vector index"
        );
        Ok(next)
    }

    /// Write to a temp file and rename over the artifact.
    pub fn save(&self, index: &VectorIndex) -> Result<(), AppError> {
        self.ensure_dirs()?;
        let path = self.index_path();
        let tmp = self.tmp_path();
        let json = serde_json::to_vec(index).map_err(|e| {
            AppError::new(INDEX_WRITE_FAILED, "Failed to encode index")
                .with_details(e.to_string())
        })?;
        fs::write(&tmp, &json).map_err(|e| {
            AppError::new(INDEX_WRITE_FAILED, "Failed to write index")
                .with_details(format!("path={}; err={}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            AppError::new(INDEX_WRITE_FAILED, "Failed to finalize index write")
                .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
        })?;
        Ok(())
    }

    /// Remove the index artifact. The root directory goes too, but only when nothing else
    /// is left in it. Returns whether an artifact was removed.
    pub fn delete(&self) -> Result<bool, AppError> {
        let mut removed = false;
        for path in [self.index_path(), self.tmp_path()] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(AppError::new(INDEX_WRITE_FAILED, "Failed to delete persisted index")
                        .with_details(format!("path={}; err={}", path.display(), e)))
                }
            }
        }

        let emptied = fs::read_dir(&self.root)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if emptied {
            if let Err(e) = fs::remove_dir(&self.root) {
                tracing::debug!(path = %self.root.display(), error = %e, "index directory left in place");
            }
        }
        if removed {
            tracing::info!(path = %self.root.display(), "deleted persisted index");
        }
        Ok(removed)
    }
}

pub fn now_rfc3339_utc() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
