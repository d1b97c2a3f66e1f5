//! Wire-level records shared across the quotation pipeline.
//!
//! Field names mirror the extraction schema the generation service is
//! prompted with (`Indoor_Outdoor`, `Wattage`, `IP_Rating`, ...), so a
//! record round-trips unchanged between the prompt contract, stored
//! quotation blobs, and user-edited rematch input. Deserialization is
//! lenient: generators emit numbers where strings are expected and vice
//! versa, and a requirement must survive that without dropping the line
//! item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Constants
// ============================================================================

/// Sentinel for attributes the source document never specified.
pub const NOT_AVAILABLE: &str = "N/A";

/// Header defaults for assembled quotations.
pub const DEFAULT_RFP_TITLE: &str = "Lighting Proposal";
pub const DEFAULT_CLIENT_NAME: &str = "Valued Client";
pub const DEFAULT_TERMS: &str = "Valid for 30 days. Warranty: 5 Years on LED drivers.";

/// Relevance assumed for a candidate the reranker never scored.
pub const DEFAULT_LLM_SCORE: f64 = 0.5;

/// True when a field value carries real content rather than the sentinel.
pub fn is_available(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case(NOT_AVAILABLE)
}

fn not_available() -> String {
    NOT_AVAILABLE.to_string()
}

fn default_quantity() -> f64 {
    1.0
}

fn default_requirement_category() -> String {
    "Lighting".to_string()
}

fn default_importance() -> String {
    "High".to_string()
}

fn default_item_category() -> String {
    "General".to_string()
}

fn default_llm_score() -> f64 {
    DEFAULT_LLM_SCORE
}

// ============================================================================
// Lenient deserialization
// ============================================================================

/// Accepts strings, numbers, and booleans; anything else collapses to the
/// sentinel. Absent keys are handled by `#[serde(default)]`, this covers
/// explicit nulls and structured values.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_text(&value).unwrap_or_else(not_available))
}

/// Same as [`lenient_string`] but collapses to empty, for the description
/// field whose absence means "no text" rather than "not specified".
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_text(&value).unwrap_or_default())
}

/// Quantity arrives as a number, a numeric string, or garbage. Parse
/// failures and non-positive values coerce to 1.0; a quantity is always a
/// positive number once the record exists.
fn lenient_quantity<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_quantity(&value))
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Lenient quantity coercion shared by deserialization and raw-record
/// conversion.
pub fn coerce_quantity(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(q) if q.is_finite() && q > 0.0 => q,
        _ => 1.0,
    }
}

// ============================================================================
// Requirement
// ============================================================================

/// One extracted line item and its canonical lighting attributes.
///
/// String attributes default to [`NOT_AVAILABLE`]; the description defaults
/// empty. Quantity is coerced to a positive number at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementRecord {
    /// Reference number from the document, e.g. "L1" or "F-07".
    #[serde(
        alias = "type_id",
        default = "not_available",
        deserialize_with = "lenient_string"
    )]
    pub id: String,
    #[serde(alias = "Description", default, deserialize_with = "lenient_text")]
    pub description: String,

    #[serde(
        rename = "Indoor_Outdoor",
        default = "not_available",
        deserialize_with = "lenient_string"
    )]
    pub indoor_outdoor: String,
    #[serde(
        rename = "Installation_Type",
        default = "not_available",
        deserialize_with = "lenient_string"
    )]
    pub installation_type: String,
    #[serde(
        rename = "Fixture_Type",
        default = "not_available",
        deserialize_with = "lenient_string"
    )]
    pub fixture_type: String,
    #[serde(
        rename = "Wattage",
        default = "not_available",
        deserialize_with = "lenient_string"
    )]
    pub wattage: String,
    #[serde(
        rename = "IP_Rating",
        default = "not_available",
        deserialize_with = "lenient_string"
    )]
    pub ip_rating: String,
    #[serde(
        rename = "Beam_Angle",
        default = "not_available",
        deserialize_with = "lenient_string"
    )]
    pub beam_angle: String,
    #[serde(
        rename = "Driver_Type",
        default = "not_available",
        deserialize_with = "lenient_string"
    )]
    pub driver_type: String,
    #[serde(
        rename = "Color_Temperature",
        default = "not_available",
        deserialize_with = "lenient_string"
    )]
    pub color_temperature: String,
    #[serde(
        rename = "Shape",
        default = "not_available",
        deserialize_with = "lenient_string"
    )]
    pub shape: String,
    #[serde(
        rename = "Dimension",
        default = "not_available",
        deserialize_with = "lenient_string"
    )]
    pub dimension: String,
    #[serde(
        rename = "Luminous_Flux",
        default = "not_available",
        deserialize_with = "lenient_string"
    )]
    pub luminous_flux: String,

    #[serde(
        rename = "Qty",
        default = "default_quantity",
        deserialize_with = "lenient_quantity"
    )]
    pub quantity: f64,

    #[serde(
        default = "default_requirement_category",
        deserialize_with = "lenient_string"
    )]
    pub category: String,
    #[serde(default = "default_importance", deserialize_with = "lenient_string")]
    pub importance: String,
}

impl Default for RequirementRecord {
    fn default() -> Self {
        Self {
            id: not_available(),
            description: String::new(),
            indoor_outdoor: not_available(),
            installation_type: not_available(),
            fixture_type: not_available(),
            wattage: not_available(),
            ip_rating: not_available(),
            beam_angle: not_available(),
            driver_type: not_available(),
            color_temperature: not_available(),
            shape: not_available(),
            dimension: not_available(),
            luminous_flux: not_available(),
            quantity: 1.0,
            category: default_requirement_category(),
            importance: default_importance(),
        }
    }
}

impl RequirementRecord {
    /// Converts one raw extracted item into a record. The map is normalized
    /// first (alias resolution + description mining), then deserialized
    /// leniently; if even that fails the line item becomes a placeholder
    /// instead of disappearing.
    pub fn from_raw(mut raw: Map<String, Value>) -> Self {
        crate::normalize::normalize_fields(&mut raw);
        match serde_json::from_value(Value::Object(raw)) {
            Ok(record) => record,
            Err(err) => Self::placeholder("ERR-01", format!("Unusable line item: {err}")),
        }
    }

    /// Record standing in for a line item that could not be extracted.
    pub fn placeholder(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            ..Self::default()
        }
    }
}

// ============================================================================
// Match and quotation
// ============================================================================

/// A catalog product offered in place of the primary match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternateProduct {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub score: f64,
}

/// The selected catalog product for one requirement, with line pricing and
/// up to two alternates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedProduct {
    pub requirement_id: String,
    pub product_id: i64,
    pub product_title: String,
    #[serde(default)]
    pub product_description: String,
    /// Similarity of the primary match, in [0, 1].
    pub match_score: f64,
    /// Templated justification naming the match, its score, and alternates.
    pub reasoning: String,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    #[serde(default)]
    pub unit_price: f64,
    /// Line price; always `unit_price * quantity`.
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub alternatives: Vec<AlternateProduct>,
}

/// The assembled quotation document.
///
/// Persistence identity and audit history live outside the core; this is
/// the `content` blob stored under that identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quotation {
    pub rfp_title: String,
    pub client_name: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub requirements: Vec<RequirementRecord>,
    pub matches: Vec<MatchedProduct>,
    /// Always the exact sum of match line prices.
    pub total_price: f64,
    pub summary: String,
    pub terms: String,
    /// Set when the run degraded (failed extraction, unusable generator
    /// output). The quotation itself stays valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Catalog and recommendation types
// ============================================================================

/// One product in the catalog. Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_item_category")]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub price: f64,
}

/// A recommendation candidate flowing through rerank and selection.
///
/// On input `score` is the generation-service relevance (0.5 when the
/// reranker never scored it); on output it is the display score. Blended
/// and boost values never appear here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_item_category")]
    pub category: String,
    #[serde(default = "default_llm_score")]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// One recorded subject action, the raw material for category weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub action: String,
    pub category: String,
}
