//! Per-requirement candidate matching.
//!
//! Each requirement is condensed into a search string, embedded, and bound
//! to its best catalog candidate plus up to two alternates. Requirements
//! without usable text or without candidates are skipped, embedding
//! failures drop the requirement after logging, and neither aborts the run.

use futures::stream::{self, StreamExt};
use luxquote_catalog::{CatalogIndex, SearchHit};
use luxquote_core::records::{AlternateProduct, MatchedProduct, RequirementRecord};
use luxquote_core::{is_available, NOT_AVAILABLE};
use luxquote_providers::EmbeddingProvider;

use crate::QuoteConfig;

/// Result of matching one requirement.
#[derive(Debug)]
pub enum MatchOutcome {
    Resolved(MatchedProduct),
    /// No searchable text or no candidates; the requirement is omitted.
    Skipped {
        requirement_id: String,
        reason: String,
    },
    /// Embedding or search failed; the requirement is omitted.
    Failed {
        requirement_id: String,
        reason: String,
    },
}

/// Builds the text a requirement is searched by.
///
/// Attribute fields and the description are joined in a fixed order. When
/// the joined text still contains the sentinel the attributes are unusable,
/// so the description alone is tried instead. `None` means nothing
/// searchable remains and the requirement should be skipped.
pub fn search_text(record: &RequirementRecord) -> Option<String> {
    let joined = [
        record.fixture_type.as_str(),
        record.installation_type.as_str(),
        record.wattage.as_str(),
        record.color_temperature.as_str(),
        record.ip_rating.as_str(),
        record.beam_angle.as_str(),
        record.luminous_flux.as_str(),
        record.description.as_str(),
    ]
    .join(" ");
    let joined = joined.trim();

    if joined.contains(NOT_AVAILABLE) {
        let description = record.description.trim();
        if is_available(description) {
            return Some(description.to_string());
        }
        return None;
    }
    if joined.is_empty() {
        return None;
    }
    Some(joined.to_string())
}

/// Matches one requirement against the catalog.
pub async fn match_requirement(
    embedding: &dyn EmbeddingProvider,
    catalog: &CatalogIndex,
    record: &RequirementRecord,
    config: &QuoteConfig,
) -> MatchOutcome {
    let Some(text) = search_text(record) else {
        return MatchOutcome::Skipped {
            requirement_id: record.id.clone(),
            reason: "no searchable text".to_string(),
        };
    };

    let vector = match embedding.embed(&text).await {
        Ok(vector) => vector,
        Err(err) => {
            tracing::warn!(requirement = %record.id, error = %err, "embedding failed, dropping requirement");
            return MatchOutcome::Failed {
                requirement_id: record.id.clone(),
                reason: format!("embedding failed: {err}"),
            };
        }
    };

    let hits = catalog.search(&vector, config.top_k);
    let Some(best) = hits.first() else {
        return MatchOutcome::Skipped {
            requirement_id: record.id.clone(),
            reason: "no catalog candidates".to_string(),
        };
    };

    let alternates: Vec<AlternateProduct> = hits
        .iter()
        .skip(1)
        .take(config.max_alternates)
        .map(|hit| AlternateProduct {
            id: hit.id,
            title: hit.title.clone(),
            description: hit.description.clone(),
            price: hit.price,
            score: hit.score,
        })
        .collect();

    MatchOutcome::Resolved(MatchedProduct {
        requirement_id: record.id.clone(),
        product_id: best.id,
        product_title: best.title.clone(),
        product_description: best.description.clone(),
        match_score: best.score,
        reasoning: reasoning_text(record, best, &alternates),
        quantity: record.quantity,
        unit_price: best.price,
        price: best.price * record.quantity,
        alternatives: alternates,
    })
}

/// Matches every requirement with bounded concurrency. Tasks are tagged
/// with their input index so output order matches document order no matter
/// which finishes first.
pub async fn match_requirements(
    embedding: &dyn EmbeddingProvider,
    catalog: &CatalogIndex,
    records: &[RequirementRecord],
    config: &QuoteConfig,
) -> Vec<MatchOutcome> {
    let concurrency = config.match_concurrency.max(1);
    let mut tagged: Vec<(usize, MatchOutcome)> = stream::iter(records.iter().enumerate())
        .map(|(idx, record)| async move {
            (idx, match_requirement(embedding, catalog, record, config).await)
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;
    tagged.sort_by_key(|(idx, _)| *idx);
    tagged.into_iter().map(|(_, outcome)| outcome).collect()
}

/// Deterministic justification string. Never a second generation call.
fn reasoning_text(
    record: &RequirementRecord,
    best: &SearchHit,
    alternates: &[AlternateProduct],
) -> String {
    let alt_text = alternates
        .iter()
        .map(|alt| format!("{} (${:.2})", alt.title, alt.price))
        .collect::<Vec<_>>()
        .join(" | ");
    format!(
        "Best Match: {} ({:.2}). Matches Specs: {} {}. Alternatives: {}",
        best.title, best.score, record.wattage, record.color_temperature, alt_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use luxquote_catalog::CatalogIndex;
    use luxquote_core::CatalogItem;
    use luxquote_providers::stub::TokenHashEmbedder;
    use luxquote_providers::ProviderError;

    fn item(id: i64, title: &str, description: &str, price: f64) -> CatalogItem {
        CatalogItem {
            id,
            title: title.to_string(),
            description: description.to_string(),
            category: "General".to_string(),
            tags: Vec::new(),
            price,
        }
    }

    async fn catalog(embedder: &TokenHashEmbedder) -> CatalogIndex {
        CatalogIndex::build(
            vec![
                item(1, "LED Downlight 12W", "Recessed downlight 3000K warm white", 35.0),
                item(2, "Track Spot 12W", "Adjustable 3000K track spotlight", 45.0),
                item(3, "Flood 100W", "Outdoor IP66 flood 5700K", 120.0),
            ],
            embedder,
        )
        .await
        .unwrap()
    }

    fn requirement(id: &str) -> RequirementRecord {
        RequirementRecord {
            id: id.to_string(),
            description: "Recessed downlight 3000K warm white".to_string(),
            fixture_type: "Downlight".to_string(),
            installation_type: "Recessed".to_string(),
            wattage: "12W".to_string(),
            color_temperature: "3000K".to_string(),
            ip_rating: "IP20".to_string(),
            beam_angle: "38°".to_string(),
            luminous_flux: "900lm".to_string(),
            quantity: 4.0,
            ..RequirementRecord::default()
        }
    }

    #[test]
    fn search_text_joins_fields_in_order() {
        let record = requirement("L1");
        let text = search_text(&record).unwrap();
        assert!(text.starts_with("Downlight Recessed 12W 3000K"));
        assert!(text.ends_with("Recessed downlight 3000K warm white"));
    }

    #[test]
    fn sentinel_in_joined_text_falls_back_to_description() {
        let record = RequirementRecord {
            description: "Garden bollard warm white".to_string(),
            fixture_type: "Bollard".to_string(),
            ..RequirementRecord::default()
        };
        assert_eq!(
            search_text(&record).unwrap(),
            "Garden bollard warm white"
        );
    }

    #[test]
    fn unusable_record_yields_no_search_text() {
        // All attributes sentinel, description empty.
        assert!(search_text(&RequirementRecord::default()).is_none());
    }

    #[tokio::test]
    async fn resolved_match_carries_price_and_alternates() {
        let embedder = TokenHashEmbedder::new(64);
        let catalog = catalog(&embedder).await;
        let record = requirement("L1");

        let outcome =
            match_requirement(&embedder, &catalog, &record, &QuoteConfig::default()).await;
        let MatchOutcome::Resolved(matched) = outcome else {
            panic!("expected a resolved match");
        };

        assert_eq!(matched.requirement_id, "L1");
        assert_eq!(matched.product_id, 1);
        assert_eq!(matched.quantity, 4.0);
        assert_eq!(matched.unit_price, 35.0);
        assert_eq!(matched.price, 140.0);
        assert!(matched.alternatives.len() <= 2);
        assert!(matched.reasoning.contains("Best Match: LED Downlight 12W"));
        assert!(matched.reasoning.contains("12W 3000K"));
    }

    #[tokio::test]
    async fn skipped_when_no_searchable_text() {
        let embedder = TokenHashEmbedder::new(64);
        let catalog = catalog(&embedder).await;
        let record = RequirementRecord {
            id: "L9".to_string(),
            ..RequirementRecord::default()
        };

        let outcome =
            match_requirement(&embedder, &catalog, &record, &QuoteConfig::default()).await;
        assert!(matches!(
            outcome,
            MatchOutcome::Skipped { requirement_id, .. } if requirement_id == "L9"
        ));
    }

    #[tokio::test]
    async fn skipped_when_catalog_is_empty() {
        let embedder = TokenHashEmbedder::new(64);
        let empty = CatalogIndex::build(Vec::new(), &embedder).await.unwrap();
        let record = requirement("L1");

        let outcome = match_requirement(&embedder, &empty, &record, &QuoteConfig::default()).await;
        assert!(matches!(
            outcome,
            MatchOutcome::Skipped { reason, .. } if reason.contains("no catalog candidates")
        ));
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Err(ProviderError::Network("scripted embed outage".to_string()))
        }

        fn dimension(&self) -> usize {
            64
        }
    }

    #[tokio::test]
    async fn embedding_failure_drops_requirement() {
        let embedder = TokenHashEmbedder::new(64);
        let catalog = catalog(&embedder).await;
        let record = requirement("L1");

        let outcome =
            match_requirement(&FailingEmbedder, &catalog, &record, &QuoteConfig::default()).await;
        assert!(matches!(
            outcome,
            MatchOutcome::Failed { requirement_id, .. } if requirement_id == "L1"
        ));
    }

    #[tokio::test]
    async fn concurrent_matching_preserves_document_order() {
        let embedder = TokenHashEmbedder::new(64);
        let catalog = catalog(&embedder).await;
        let records: Vec<RequirementRecord> =
            (0..9).map(|i| requirement(&format!("L{i}"))).collect();

        let outcomes =
            match_requirements(&embedder, &catalog, &records, &QuoteConfig::default()).await;

        assert_eq!(outcomes.len(), records.len());
        for (i, outcome) in outcomes.iter().enumerate() {
            let MatchOutcome::Resolved(matched) = outcome else {
                panic!("expected a resolved match at {i}");
            };
            assert_eq!(matched.requirement_id, format!("L{i}"));
        }
    }
}
