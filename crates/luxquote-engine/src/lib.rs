//! Quotation pipeline orchestration.
//!
//! This crate wires the pure pieces from `luxquote-core` to the generation,
//! embedding, and catalog services:
//!
//! 1. [`extract`]: prompts the generation service for line items and maps
//!    whatever shape comes back into requirement records.
//! 2. [`matcher`]: embeds each requirement and binds it to its best catalog
//!    candidate plus alternates.
//! 3. [`assemble`]: totals, summary, header, and item-level updates.
//! 4. [`rerank`]: generation-service re-scoring for the recommendation
//!    path, with a lexical fallback.
//! 5. [`flow`]: the [`flow::QuoteFlow`] orchestrator tying it together and
//!    emitting [`events::QuoteEvent`]s for external audit logging.
//!
//! The only error that escapes a run is [`QuoteError::InputRejected`];
//! every service failure degrades into the returned quotation instead.

pub mod assemble;
pub mod events;
pub mod extract;
pub mod flow;
pub mod matcher;
pub mod rerank;

use luxquote_catalog::CatalogError;
use thiserror::Error;

/// Documents shorter than this (after trimming) are rejected before any
/// service call is made.
pub const MIN_DOCUMENT_CHARS: usize = 10;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum QuoteError {
    /// Input validation failure, the one error a quotation run propagates.
    #[error("document rejected: {0}")]
    InputRejected(String),

    /// Catalog loading or index construction failed at startup.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

// ============================================================================
// Configuration
// ============================================================================

/// Pipeline knobs, fixed for the lifetime of a [`flow::QuoteFlow`].
#[derive(Debug, Clone)]
pub struct QuoteConfig {
    /// Longest document prefix handed to extraction; text beyond it is
    /// never sent to the generation service.
    pub document_prefix_chars: usize,
    pub extraction_max_tokens: u32,
    pub summary_max_tokens: u32,
    /// Candidates fetched per requirement when matching.
    pub top_k: usize,
    /// Candidates fetched for the recommendation path before reranking.
    pub recommend_top_k: usize,
    /// Alternates kept alongside the primary match.
    pub max_alternates: usize,
    /// Concurrent in-flight match tasks per run.
    pub match_concurrency: usize,
    /// When false, the summary is always the templated statement and the
    /// generation service is never called for it.
    pub summarize_with_generation: bool,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            document_prefix_chars: 20_000,
            extraction_max_tokens: 4000,
            summary_max_tokens: 100,
            top_k: 5,
            recommend_top_k: 20,
            max_alternates: 2,
            match_concurrency: 4,
            summarize_with_generation: true,
        }
    }
}

pub use assemble::{apply_item_updates, ItemUpdate};
pub use events::{QuoteEvent, QuoteEventHandler};
pub use extract::ExtractionOutcome;
pub use flow::QuoteFlow;
pub use matcher::MatchOutcome;
