//! Quotation assembly: totals, header, summary text, item-level updates.

use chrono::Utc;
use luxquote_core::records::{MatchedProduct, Quotation, RequirementRecord};
use luxquote_core::{DEFAULT_CLIENT_NAME, DEFAULT_RFP_TITLE, DEFAULT_TERMS};
use serde::{Deserialize, Serialize};

/// Exact sum of match line prices. No intermediate rounding.
pub fn total_price(matches: &[MatchedProduct]) -> f64 {
    matches.iter().map(|m| m.price).sum()
}

/// Templated statement used when summary generation is disabled, fails, or
/// there is nothing to summarize.
pub fn fallback_summary(match_count: usize, total: f64) -> String {
    format!("Lighting quotation covering {match_count} matched items. Total: ${total:.2}.")
}

/// Prompt for the optional generated summary: item count, total cost, and
/// up to three distinct fixture titles.
pub fn summary_prompt(matches: &[MatchedProduct], total: f64) -> String {
    let mut titles: Vec<&str> = Vec::new();
    for matched in matches.iter().take(3) {
        if !titles.contains(&matched.product_title.as_str()) {
            titles.push(matched.product_title.as_str());
        }
    }
    format!(
        "Generate a professional lighting quotation summary. Total Items: {}. Cost: ${:.2}. Key Fixtures: {}.",
        matches.len(),
        total,
        titles.join(", ")
    )
}

/// Builds the final quotation record around the given lists.
pub fn assemble(
    requirements: Vec<RequirementRecord>,
    matches: Vec<MatchedProduct>,
    summary: String,
    error: Option<String>,
) -> Quotation {
    let total = total_price(&matches);
    Quotation {
        rfp_title: DEFAULT_RFP_TITLE.to_string(),
        client_name: Some(DEFAULT_CLIENT_NAME.to_string()),
        generated_at: Utc::now(),
        requirements,
        matches,
        total_price: total,
        summary,
        terms: DEFAULT_TERMS.to_string(),
        error,
    }
}

/// One price/quantity adjustment keyed by product id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub product_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
}

/// Applies updates to every match carrying the product id, recomputes the
/// affected line prices, then the quotation total. Non-finite, zero, or
/// negative quantities and negative prices are ignored so line prices stay
/// non-negative and equal to unit price times quantity.
pub fn apply_item_updates(quotation: &mut Quotation, updates: &[ItemUpdate]) {
    for update in updates {
        for matched in quotation
            .matches
            .iter_mut()
            .filter(|m| m.product_id == update.product_id)
        {
            if let Some(quantity) = update.quantity {
                if quantity.is_finite() && quantity > 0.0 {
                    matched.quantity = quantity;
                }
            }
            if let Some(unit_price) = update.unit_price {
                if unit_price.is_finite() && unit_price >= 0.0 {
                    matched.unit_price = unit_price;
                }
            }
            matched.price = matched.unit_price * matched.quantity;
        }
    }
    quotation.total_price = total_price(&quotation.matches);
}
