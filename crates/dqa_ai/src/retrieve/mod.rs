use dqa_core::config::RetrievalSettings;
use dqa_core::domain::Chunk;
use dqa_core::error::{AppError, QUESTION_EMPTY, RETRIEVAL_FAILED};
use serde::{Deserialize, Serialize};

use crate::embeddings::Embedder;
use crate::index::VectorIndex;

pub mod similarity;

/// Candidate pool for maximal marginal relevance, before diversification.
pub const MMR_MIN_FETCH_K: usize = 20;
pub const MMR_LAMBDA: f32 = 0.5;

/// Position of an index entry plus its squared L2 distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranked {
    pub position: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub position: usize,
    pub distance: f32,
    pub chunk: Chunk,
}

/// Up to `k` nearest vectors by ascending L2 distance; ties keep index order.
pub fn similarity_ranking(vectors: &[&[f32]], query: &[f32], k: usize) -> Vec<Ranked> {
    let mut ranked: Vec<Ranked> = vectors
        .iter()
        .enumerate()
        .map(|(position, v)| Ranked {
            position,
            distance: similarity::l2_distance_sq(query, v),
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.position.cmp(&b.position))
    });
    ranked.truncate(k);
    ranked
}

/// Maximal marginal relevance over the `fetch_k` nearest candidates.
///
/// The first pick is the candidate most cosine-similar to the query. Each later pick
/// maximises `lambda * sim(query, c) - (1 - lambda) * max(sim(c, selected))`. Ties go
/// to the candidate closer by L2.
pub fn mmr_ranking(
    vectors: &[&[f32]],
    query: &[f32],
    k: usize,
    fetch_k: usize,
    lambda: f32,
) -> Vec<Ranked> {
    let candidates = similarity_ranking(vectors, query, fetch_k.max(k));
    let want = k.min(candidates.len());
    if want == 0 {
        return Vec::new();
    }

    let qnorm = similarity::l2_norm(query);
    let norms: Vec<f32> = candidates
        .iter()
        .map(|c| similarity::l2_norm(vectors[c.position]))
        .collect();
    let to_query: Vec<f32> = candidates
        .iter()
        .zip(norms.iter())
        .map(|(c, n)| similarity::cosine_similarity(query, vectors[c.position], qnorm, *n))
        .collect();

    let mut first = 0usize;
    for (i, score) in to_query.iter().enumerate() {
        if *score > to_query[first] {
            first = i;
        }
    }

    let mut selected: Vec<usize> = vec![first];
    // Highest similarity of each candidate to anything selected so far.
    let mut redundancy: Vec<f32> = vec![f32::NEG_INFINITY; candidates.len()];

    while selected.len() < want {
        let last = selected[selected.len() - 1];
        let last_vec = vectors[candidates[last].position];
        for (i, c) in candidates.iter().enumerate() {
            let sim = similarity::cosine_similarity(vectors[c.position], last_vec, norms[i], norms[last]);
            if sim > redundancy[i] {
                redundancy[i] = sim;
            }
        }

        let mut best: Option<(usize, f32)> = None;
        for i in 0..candidates.len() {
            if selected.contains(&i) {
                continue;
            }
            let score = lambda * to_query[i] - (1.0 - lambda) * redundancy[i];
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((i, score));
            }
        }
        match best {
            Some((i, _)) => selected.push(i),
            None => break,
        }
    }

    selected.into_iter().map(|i| candidates[i]).collect()
}

/// Embed `question` with the index model and return the hits the configured search yields.
pub fn retrieve_for_question(
    index: &VectorIndex,
    embedder: &dyn Embedder,
    question: &str,
    settings: &RetrievalSettings,
) -> Result<Vec<SearchHit>, AppError> {
    let q = question.trim();
    if q.is_empty() {
        return Err(AppError::new(QUESTION_EMPTY, "Question must not be empty"));
    }

    let qv = embedder.embed(index.model(), q).map_err(|e| {
        AppError::new(RETRIEVAL_FAILED, "Failed to embed the question")
            .with_details(format!("model={}; err={}", index.model(), e.describe()))
            .with_retryable(e.retryable)
    })?;
    if qv.len() as u32 != index.dims() {
        return Err(AppError::new(
            RETRIEVAL_FAILED,
            "Query embedding dims do not match index dims",
        )
        .with_details(format!("index_dims={}; query_dims={}", index.dims(), qv.len())));
    }

    let hits = index.search(&qv, settings.top_k, settings.search_type)?;
    tracing::debug!(
        hits = hits.len(),
        top_k = settings.top_k,
        search_type = ?settings.search_type,
        "retrieved context"
    );
    Ok(hits)
}
