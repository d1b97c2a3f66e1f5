//! Events emitted during quotation and recommendation runs.
//!
//! This is the audit boundary: persistence and activity logging live
//! outside this workspace and subscribe here. The pipeline only emits;
//! handlers must not block for long, they run inline on the pipeline task.

use serde::{Deserialize, Serialize};

/// Milestones and degradations observed during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QuoteEvent {
    /// Requirements parsed out of the document text
    RequirementsExtracted { count: usize },
    /// Extraction fell back to an empty requirement list
    ExtractionDegraded { reason: String },
    /// A requirement had no searchable text or no catalog candidates
    RequirementSkipped {
        requirement_id: String,
        reason: String,
    },
    /// A requirement was bound to a catalog product
    MatchResolved {
        requirement_id: String,
        product_id: i64,
        score: f64,
    },
    /// Embedding or search failed for a requirement
    MatchFailed {
        requirement_id: String,
        reason: String,
    },
    /// A quotation was assembled
    QuotationAssembled {
        requirement_count: usize,
        match_count: usize,
        total_price: f64,
    },
    /// The generated summary was replaced by the templated statement
    SummaryDegraded { reason: String },
    /// An existing quotation was rebuilt from edited requirements
    RematchCompleted {
        requirement_count: usize,
        match_count: usize,
        total_price: f64,
    },
}

/// Callback for quote events
pub type QuoteEventHandler = Box<dyn Fn(QuoteEvent) + Send + Sync>;
