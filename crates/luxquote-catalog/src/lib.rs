//! Product catalog with embedding-based similarity search.
//!
//! The catalog is loaded once from JSON, embedded once at startup, and then
//! queried read-only for the lifetime of the process. Each item is embedded
//! from `"{title}. {description}"` and the vector is unit-normalized, so the
//! L2 distance between two vectors is a monotone function of their cosine
//! similarity. Search scores are reported as `1 / (1 + distance)`, which maps
//! an exact match to 1.0 and decays toward 0 for distant items.
//!
//! Small catalogs are scanned exactly. Larger ones go through an HNSW graph
//! with an over-fetch ANN pass followed by an exact re-score, so approximate
//! neighbour order never leaks into the final ranking.

use hnsw_rs::prelude::{DistL2, Hnsw};
use luxquote_core::CatalogItem;
use luxquote_providers::{EmbeddingProvider, ProviderError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Tuning constants
// ============================================================================

/// Max connections per HNSW node.
const HNSW_M: usize = 16;
/// Candidate list size during HNSW construction.
const HNSW_EF_CONSTRUCTION: usize = 200;
/// Candidate list size during HNSW queries.
const HNSW_EF_SEARCH: usize = 64;
/// Catalogs smaller than this are scanned exactly; the graph buys nothing.
const HNSW_MIN_ITEMS: usize = 32;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to embed catalog item: {0}")]
    Embedding(#[from] ProviderError),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

// ============================================================================
// Search results
// ============================================================================

/// One catalog item returned from a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub price: f64,
    /// Similarity in `(0.0, 1.0]`, where 1.0 is an exact embedding match.
    pub score: f64,
}

// ============================================================================
// Catalog index
// ============================================================================

/// Immutable catalog plus its embedding index.
///
/// Built once at startup and shared behind an `Arc`; `search` takes `&self`
/// and is safe to call from concurrent match tasks.
pub struct CatalogIndex {
    items: Vec<CatalogItem>,
    vectors: Vec<Vec<f32>>,
    dimension: usize,
    hnsw: Option<Hnsw<'static, f32, DistL2>>,
}

impl CatalogIndex {
    /// Embed every item and build the index.
    ///
    /// Any embedding failure aborts the build: a partially embedded catalog
    /// would silently hide products from every later search. An empty item
    /// list is fine and yields an index whose searches return nothing.
    pub async fn build(
        items: Vec<CatalogItem>,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self, CatalogError> {
        let dimension = embedder.dimension();
        let mut vectors = Vec::with_capacity(items.len());
        for item in &items {
            let mut vector = embedder.embed(&embedding_text(item)).await?;
            if vector.len() != dimension {
                return Err(CatalogError::DimensionMismatch {
                    expected: dimension,
                    got: vector.len(),
                });
            }
            normalize_in_place(&mut vector);
            vectors.push(vector);
        }

        let hnsw = if items.len() >= HNSW_MIN_ITEMS {
            Some(build_hnsw(&vectors))
        } else {
            None
        };

        tracing::info!(
            items = items.len(),
            dimension,
            ann = hnsw.is_some(),
            "catalog index built"
        );

        Ok(Self {
            items,
            vectors,
            dimension,
            hnsw,
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    /// Return up to `top_k` items ranked by similarity to `query`, best first.
    ///
    /// The query is normalized here, so callers may pass raw embedder output.
    /// A query of the wrong dimension returns no hits rather than panicking;
    /// the caller treats an empty candidate list as "no match".
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<SearchHit> {
        if self.items.is_empty() || top_k == 0 {
            return Vec::new();
        }
        if query.len() != self.dimension {
            tracing::warn!(
                expected = self.dimension,
                got = query.len(),
                "query dimension mismatch, returning no hits"
            );
            return Vec::new();
        }

        let mut q = query.to_vec();
        normalize_in_place(&mut q);

        let mut scored: Vec<(f32, usize)> = match &self.hnsw {
            Some(hnsw) => {
                // Over-fetch from the ANN graph, then re-score exactly so the
                // final order does not depend on approximate distances.
                let k = top_k.saturating_mul(4).clamp(1, 200);
                hnsw.search(&q, k, HNSW_EF_SEARCH)
                    .into_iter()
                    .filter_map(|n| {
                        let idx = n.d_id;
                        if idx < self.vectors.len() {
                            Some((similarity(&q, &self.vectors[idx]), idx))
                        } else {
                            None
                        }
                    })
                    .collect()
            }
            None => self
                .vectors
                .iter()
                .enumerate()
                .map(|(idx, v)| (similarity(&q, v), idx))
                .collect(),
        };

        scored.sort_by(|(sa, ia), (sb, ib)| sb.total_cmp(sa).then_with(|| ia.cmp(ib)));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(score, idx)| {
                let item = &self.items[idx];
                SearchHit {
                    id: item.id,
                    title: item.title.clone(),
                    description: item.description.clone(),
                    category: item.category.clone(),
                    price: item.price,
                    score: score as f64,
                }
            })
            .collect()
    }
}

/// Load catalog items from a JSON array file.
pub fn load_items(path: impl AsRef<Path>) -> Result<Vec<CatalogItem>, CatalogError> {
    let raw = std::fs::read_to_string(path)?;
    let items: Vec<CatalogItem> = serde_json::from_str(&raw)?;
    Ok(items)
}

/// The text each catalog item is embedded from.
pub fn embedding_text(item: &CatalogItem) -> String {
    format!("{}. {}", item.title, item.description)
}

// ============================================================================
// Vector helpers
// ============================================================================

fn build_hnsw(vectors: &[Vec<f32>]) -> Hnsw<'static, f32, DistL2> {
    let nb_elem = vectors.len();
    let max_layer = 16.min((nb_elem as f32).ln().trunc() as usize).max(1);
    let hnsw = Hnsw::<f32, DistL2>::new(HNSW_M, nb_elem, max_layer, HNSW_EF_CONSTRUCTION, DistL2 {});
    for (i, v) in vectors.iter().enumerate() {
        hnsw.insert((&v[..], i));
    }
    hnsw
}

fn normalize_in_place(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

fn similarity(a: &[f32], b: &[f32]) -> f32 {
    1.0 / (1.0 + l2_distance(a, b))
}

// ============================================================================
// Tests
// ============================================================================
