//! Luxquote core: the quotation data model and the pure algorithms around it.
//!
//! Everything here is deterministic and IO-free, so each heuristic piece of
//! the pipeline can be tested in isolation:
//!
//! 1. [`repair`]: turns malformed or truncated generator output back into
//!    parseable JSON.
//! 2. [`normalize`]: canonicalizes variant field names and mines missing
//!    attributes out of free-text descriptions.
//! 3. [`rank`]: blends scores, applies category boosts, and selects a
//!    diversified, display-normalized result set.
//!
//! Service calls (generation, embedding, search) live in
//! `luxquote-providers` and `luxquote-catalog`; orchestration lives in
//! `luxquote-engine`.

pub mod normalize;
pub mod rank;
pub mod records;
pub mod repair;

pub use rank::{category_weights, rank_candidates};
pub use records::{
    is_available, AlternateProduct, CatalogItem, InteractionEvent, MatchedProduct, Quotation,
    RankedCandidate, RequirementRecord, DEFAULT_CLIENT_NAME, DEFAULT_LLM_SCORE, DEFAULT_RFP_TITLE,
    DEFAULT_TERMS, NOT_AVAILABLE,
};
