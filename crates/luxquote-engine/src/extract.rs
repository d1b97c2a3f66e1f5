//! Requirement extraction from raw document text.
//!
//! Extraction is total: service failures and unparseable responses degrade
//! to an empty requirement list with a reason, and un-mappable line items
//! become placeholder records rather than disappearing. The caller can
//! always assemble a quotation from whatever comes back.

use luxquote_core::repair::parse_or_repair;
use luxquote_core::RequirementRecord;
use luxquote_providers::{CompletionRequest, GenerationProvider};
use serde_json::{Map, Value};

use crate::QuoteConfig;

/// System prompt forcing bare JSON output from the generation service.
pub const JSON_SYSTEM_PROMPT: &str = "Output ONLY JSON. No markdown. No comments.";

/// Extraction result. `degraded` carries the reason when the list had to
/// fall back to empty; it becomes the quotation's error marker.
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub requirements: Vec<RequirementRecord>,
    pub degraded: Option<String>,
}

impl ExtractionOutcome {
    fn degraded(reason: String) -> Self {
        Self {
            requirements: Vec::new(),
            degraded: Some(reason),
        }
    }
}

/// Prompts the generation service with a bounded document prefix and maps
/// the response into requirement records. Never fails.
pub async fn extract_requirements(
    generation: &dyn GenerationProvider,
    document_text: &str,
    config: &QuoteConfig,
) -> ExtractionOutcome {
    let prefix: String = document_text
        .chars()
        .take(config.document_prefix_chars)
        .collect();
    let request = CompletionRequest::new(extraction_prompt(&prefix), config.extraction_max_tokens)
        .with_system(JSON_SYSTEM_PROMPT);

    let response = match generation.complete(request).await {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(error = %err, "generation service failed during extraction");
            return ExtractionOutcome::degraded(format!("generation failed: {err}"));
        }
    };

    let parsed = match parse_or_repair(&response) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "extraction response unparseable after repair");
            return ExtractionOutcome::degraded(format!("unparseable extraction response: {err}"));
        }
    };

    let requirements: Vec<RequirementRecord> = locate_items(parsed)
        .into_iter()
        .enumerate()
        .map(|(idx, item)| map_item(idx, item))
        .collect();
    tracing::debug!(count = requirements.len(), "requirements extracted");

    ExtractionOutcome {
        requirements,
        degraded: None,
    }
}

fn extraction_prompt(text: &str) -> String {
    format!(
        r#"You are an expert Lighting Specification Analyst. Given a document, extract the following information and organize it into a JSON object.

**Goal:** Extract lighting fixture line items.

**Output Schema (JSON):**
{{
  "requirements": [
    {{
      "type_id": "Ref number/ID/Code (e.g. L1, F1)",
      "Indoor_Outdoor": "Indoor or Outdoor",
      "Installation_Type": "Surface/Recessed/Pendant/Track",
      "Fixture_Type": "Floodlight/Spotlight/Downlight/Linear/etc",
      "Wattage": "Power in Watts (e.g. 10W)",
      "IP_Rating": "IP Rating (e.g. IP65)",
      "Beam_Angle": "Degrees",
      "Driver_Type": "DALI/ON-OFF/0-10V/Phase DIM",
      "Color_Temperature": "Kelvin value (e.g. 3000K)",
      "Luminous_Flux": "Lumen output (e.g. 1200lm)",
      "Shape": "Round/Square/Linear",
      "Description": "Full line item description",
      "Qty": "Quantity (number only)",
      "Dimension": "Size in mm"
    }}
  ]
}}

**Instructions:**
1. Extract information for each line item found in the text.
2. If an entity is not found, set value to "N/A".
3. For 'Indoor_Outdoor': If document says "INTERIOR", output "Indoor". If "EXTERIOR", output "Outdoor".
4. Ensure 'Qty' is a number if possible (default to 1).
5. Output ONLY valid JSON.
6. **CRITICAL:** Do not include trailing commas. Ensure all keys are in double quotes.

**TEXT TO ANALYZE:**
{text}..."#
    )
}

/// Maps the parsed response's shape to a list of raw items. Objects yield
/// the array under a documented key, else the first array-valued member,
/// else the whole object wrapped as a single item.
fn locate_items(parsed: Value) -> Vec<Value> {
    match parsed {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            for key in ["requirements", "line_item"] {
                if matches!(map.get(key), Some(Value::Array(_))) {
                    if let Some(Value::Array(items)) = map.remove(key) {
                        return items;
                    }
                }
            }
            let array_key = map
                .iter()
                .find_map(|(key, value)| value.is_array().then(|| key.clone()));
            if let Some(key) = array_key {
                if let Some(Value::Array(items)) = map.remove(&key) {
                    return items;
                }
            }
            vec![Value::Object(map)]
        }
        other => vec![other],
    }
}

/// One raw item to one record. Bare strings become description-only
/// records (the normalizer then mines attributes out of them); anything
/// else unrecognizable becomes a placeholder so the line item is never
/// silently dropped.
fn map_item(idx: usize, item: Value) -> RequirementRecord {
    match item {
        Value::Object(map) => RequirementRecord::from_raw(map),
        Value::String(text) => {
            let mut map = Map::new();
            map.insert("Description".to_string(), Value::String(text));
            RequirementRecord::from_raw(map)
        }
        other => RequirementRecord::placeholder(
            format!("ERR-{:02}", idx + 1),
            format!("Unrecognized line item shape: {other}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use luxquote_core::NOT_AVAILABLE;
    use luxquote_providers::ProviderError;
    use std::sync::Mutex;

    struct Scripted {
        response: String,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerationProvider for Scripted {
        async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
            self.prompts.lock().unwrap().push(request.prompt);
            Ok(self.response.clone())
        }
    }

    struct FailingGeneration;

    #[async_trait]
    impl GenerationProvider for FailingGeneration {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, ProviderError> {
            Err(ProviderError::Api("scripted outage".to_string()))
        }
    }

    fn config() -> QuoteConfig {
        QuoteConfig::default()
    }

    #[tokio::test]
    async fn clean_response_maps_requirements() {
        let provider = Scripted::new(
            r#"{"requirements": [
                {"type_id": "L1", "Fixture_Type": "Downlight", "Wattage": "12W", "Qty": 4,
                 "Description": "Recessed downlight"},
                {"type_id": "L2", "wattage": "30W", "Description": "Track spot"}
            ]}"#,
        );
        let outcome = extract_requirements(&provider, "Fixture schedule for level 2", &config()).await;

        assert!(outcome.degraded.is_none());
        assert_eq!(outcome.requirements.len(), 2);
        assert_eq!(outcome.requirements[0].id, "L1");
        assert_eq!(outcome.requirements[0].quantity, 4.0);
        // Alias-cased key resolved by normalization.
        assert_eq!(outcome.requirements[1].wattage, "30W");
    }

    #[tokio::test]
    async fn fenced_truncated_response_is_repaired() {
        let provider = Scripted::new(
            "```json\n{\"requirements\": [{\"type_id\": \"L1\", \"Wattage\": \"20W\"}, {\"type_id\": \"L2\", \"Watt",
        );
        let outcome = extract_requirements(&provider, "Corridor lighting schedule", &config()).await;

        assert!(outcome.degraded.is_none());
        assert_eq!(outcome.requirements.len(), 1);
        assert_eq!(outcome.requirements[0].id, "L1");
        assert_eq!(outcome.requirements[0].wattage, "20W");
    }

    #[tokio::test]
    async fn top_level_array_is_taken_directly() {
        let provider = Scripted::new(r#"[{"type_id": "F1"}, {"type_id": "F2"}]"#);
        let outcome = extract_requirements(&provider, "Facade fixture listing", &config()).await;
        assert_eq!(outcome.requirements.len(), 2);
        assert_eq!(outcome.requirements[1].id, "F2");
    }

    #[tokio::test]
    async fn unknown_key_falls_back_to_first_array_member() {
        let provider = Scripted::new(r#"{"items": [{"type_id": "X1"}], "note": "n"}"#);
        let outcome = extract_requirements(&provider, "Warehouse high bays", &config()).await;
        assert_eq!(outcome.requirements.len(), 1);
        assert_eq!(outcome.requirements[0].id, "X1");
    }

    #[tokio::test]
    async fn bare_object_wraps_as_single_item() {
        let provider = Scripted::new(r#"{"type_id": "S1", "Wattage": "7W"}"#);
        let outcome = extract_requirements(&provider, "Single stairwell fitting", &config()).await;
        assert_eq!(outcome.requirements.len(), 1);
        assert_eq!(outcome.requirements[0].wattage, "7W");
    }

    #[tokio::test]
    async fn string_items_become_mined_descriptions() {
        let provider = Scripted::new(r#"{"requirements": ["Downlight 12W 3000K IP44"]}"#);
        let outcome = extract_requirements(&provider, "Lobby ceiling fixture notes", &config()).await;

        assert_eq!(outcome.requirements.len(), 1);
        let record = &outcome.requirements[0];
        assert_eq!(record.description, "Downlight 12W 3000K IP44");
        assert_eq!(record.wattage, "12W");
        assert_eq!(record.ip_rating, "IP44");
        assert_eq!(record.id, NOT_AVAILABLE);
    }

    #[tokio::test]
    async fn unrecognizable_items_become_placeholders() {
        let provider = Scripted::new(r#"{"requirements": [{"type_id": "L1"}, 42]}"#);
        let outcome = extract_requirements(&provider, "Schedule with a stray number", &config()).await;

        assert_eq!(outcome.requirements.len(), 2);
        assert_eq!(outcome.requirements[1].id, "ERR-02");
        assert!(outcome.requirements[1].description.contains("42"));
    }

    #[tokio::test]
    async fn unparseable_response_degrades_to_empty() {
        let provider = Scripted::new("the fixtures are nice");
        let outcome = extract_requirements(&provider, "Impossible to parse source", &config()).await;
        assert!(outcome.requirements.is_empty());
        assert!(outcome.degraded.is_some());
    }

    #[tokio::test]
    async fn generation_failure_degrades_to_empty() {
        let outcome =
            extract_requirements(&FailingGeneration, "Any document text here", &config()).await;
        assert!(outcome.requirements.is_empty());
        let reason = outcome.degraded.unwrap();
        assert!(reason.contains("generation failed"));
    }

    #[tokio::test]
    async fn document_is_truncated_to_prefix() {
        let provider = Scripted::new(r#"{"requirements": []}"#);
        let config = QuoteConfig {
            document_prefix_chars: 24,
            ..QuoteConfig::default()
        };
        let long_text = "prefix-marker-here ".repeat(50);
        extract_requirements(&provider, &long_text, &config).await;

        let prompts = provider.prompts.lock().unwrap();
        let expected_prefix: String = long_text.chars().take(24).collect();
        assert!(prompts[0].contains(&expected_prefix));
        assert!(!prompts[0].contains(&long_text));
    }
}
