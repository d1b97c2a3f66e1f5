//! Generation-service reranking of similarity-search hits.
//!
//! The service is asked to score each hit against the query and return a
//! compact `{"ranked": [...]}` payload addressed by input index. Vector
//! similarity from the search is preserved on every candidate so ranking
//! can blend the two signals. Any service or parse failure falls back to
//! deterministic lexical overlap scoring; the recommendation path never
//! fails because of the reranker.

use luxquote_catalog::SearchHit;
use luxquote_core::repair::parse_or_repair;
use luxquote_core::{RankedCandidate, DEFAULT_LLM_SCORE};
use luxquote_providers::{CompletionRequest, GenerationProvider};
use serde_json::json;
use std::collections::BTreeSet;

const RERANK_MAX_TOKENS: u32 = 512;
const RERANK_SYSTEM_PROMPT: &str = "You are a precise reranker.";
/// Reasons longer than this are cut; they are display strings.
const REASON_MAX_CHARS: usize = 200;

/// Re-scores hits against the query. Output preserves input order; sorting
/// belongs to the ranking step downstream.
pub async fn rerank(
    generation: &dyn GenerationProvider,
    query: &str,
    hits: &[SearchHit],
) -> Vec<RankedCandidate> {
    if hits.is_empty() {
        return Vec::new();
    }

    let request = CompletionRequest::new(rerank_prompt(query, hits), RERANK_MAX_TOKENS)
        .with_system(RERANK_SYSTEM_PROMPT);
    let response = match generation.complete(request).await {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(error = %err, "rerank generation failed, using lexical fallback");
            return lexical_rerank(query, hits);
        }
    };

    let parsed = match parse_or_repair(&response) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "rerank response unparseable, using lexical fallback");
            return lexical_rerank(query, hits);
        }
    };

    let mut candidates = base_candidates(hits);
    if let Some(entries) = parsed["ranked"].as_array() {
        for entry in entries {
            let index = entry["index"]
                .as_u64()
                .map(|i| i as usize)
                .or_else(|| entry["index"].as_f64().map(|f| f as usize));
            let Some(candidate) = index.and_then(|i| candidates.get_mut(i)) else {
                continue;
            };
            if let Some(score) = entry["score"].as_f64() {
                candidate.score = score.clamp(0.0, 1.0);
            }
            if let Some(reason) = entry["reason"].as_str() {
                let reason: String = reason.trim().chars().take(REASON_MAX_CHARS).collect();
                if !reason.is_empty() {
                    candidate.explanation = Some(reason);
                }
            }
        }
    }
    candidates
}

fn rerank_prompt(query: &str, hits: &[SearchHit]) -> String {
    let payload: Vec<serde_json::Value> = hits
        .iter()
        .enumerate()
        .map(|(index, hit)| {
            json!({
                "index": index,
                "title": hit.title,
                "description": hit.description,
            })
        })
        .collect();
    format!(
        "Given the user query and a list of items (title and description), assign a relevance score 0-1 and a one-sentence reason. \
         Return ONLY JSON in the following format: \
         {{\"ranked\":[{{\"index\": <original_index>, \"score\": <float between 0 and 1>, \"reason\":\"<concise reason>\"}}]}} \
         Do not include any text outside the JSON. Keep each reason under 12 words and specific to the item.\n\n\
         Query: {query}\n\nItems:\n{}",
        serde_json::Value::Array(payload)
    )
}

fn base_candidates(hits: &[SearchHit]) -> Vec<RankedCandidate> {
    hits.iter()
        .map(|hit| RankedCandidate {
            id: hit.id,
            title: hit.title.clone(),
            description: hit.description.clone(),
            category: hit.category.clone(),
            score: DEFAULT_LLM_SCORE,
            similarity: Some(hit.score),
            explanation: None,
        })
        .collect()
}

/// Jaccard overlap between the query's and the item's token sets, mapped
/// into [0.4, 1.0].
fn lexical_rerank(query: &str, hits: &[SearchHit]) -> Vec<RankedCandidate> {
    let query_tokens = tokens(query);
    let mut candidates = base_candidates(hits);
    for (candidate, hit) in candidates.iter_mut().zip(hits) {
        let item_tokens = tokens(&format!("{} {}", hit.title, hit.description));
        let shared: Vec<String> = query_tokens.intersection(&item_tokens).cloned().collect();
        let union_size = query_tokens.union(&item_tokens).count().max(1);
        let jaccard = shared.len() as f64 / union_size as f64;
        candidate.score = (0.4 + 0.6 * jaccard).clamp(0.0, 1.0);
        if !shared.is_empty() {
            let keywords = shared[..shared.len().min(3)].join(", ");
            candidate.explanation = Some(format!("Shares keywords: {keywords}"));
        }
    }
    candidates
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use async_trait::async_trait;
    use luxquote_providers::ProviderError;

    struct Scripted(String);

    #[async_trait]
    impl GenerationProvider for Scripted {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, ProviderError> {
            Ok(self.0.clone())
        }
    }

    struct FailingGeneration;

    #[async_trait]
    impl GenerationProvider for FailingGeneration {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, ProviderError> {
            Err(ProviderError::RateLimited {
                retry_after_ms: 60_000,
            })
        }
    }

    fn hit(id: i64, title: &str, description: &str, score: f64) -> SearchHit {
        SearchHit {
            id,
            title: title.to_string(),
            description: description.to_string(),
            category: "General".to_string(),
            price: 50.0,
            score,
        }
    }

    #[tokio::test]
    async fn scores_map_back_by_index() {
        let provider = Scripted(
            r#"{"ranked":[{"index": 0, "score": 0.9, "reason": "strong fit"},
                          {"index": 2, "score": 3.5, "reason": ""}]}"#
                .to_string(),
        );
        let hits = vec![
            hit(10, "Panel", "ceiling panel", 0.8),
            hit(11, "Spot", "track spot", 0.7),
            hit(12, "Flood", "outdoor flood", 0.6),
        ];
        let out = rerank(&provider, "office ceiling lighting", &hits).await;

        assert_eq!(out.len(), 3);
        assert_relative_eq!(out[0].score, 0.9);
        assert_eq!(out[0].explanation.as_deref(), Some("strong fit"));
        // Unranked leftovers keep the neutral default.
        assert_relative_eq!(out[1].score, DEFAULT_LLM_SCORE);
        // Out-of-range scores clamp; empty reasons are dropped.
        assert_relative_eq!(out[2].score, 1.0);
        assert!(out[2].explanation.is_none());
        // Vector similarity survives on every candidate.
        assert_relative_eq!(out[1].similarity.unwrap(), 0.7);
    }

    #[tokio::test]
    async fn out_of_range_indexes_are_ignored() {
        let provider =
            Scripted(r#"{"ranked":[{"index": 7, "score": 0.9, "reason": "x"}]}"#.to_string());
        let hits = vec![hit(10, "Panel", "ceiling panel", 0.8)];
        let out = rerank(&provider, "panel", &hits).await;
        assert_relative_eq!(out[0].score, DEFAULT_LLM_SCORE);
    }

    #[tokio::test]
    async fn service_failure_uses_lexical_overlap() {
        let hits = vec![
            hit(1, "Outdoor flood light", "IP66 flood for facades", 0.9),
            hit(2, "Office panel", "recessed ceiling panel", 0.8),
        ];
        let out = rerank(&FailingGeneration, "outdoor flood light", &hits).await;

        assert!(out[0].score > out[1].score);
        assert!(out[0]
            .explanation
            .as_deref()
            .unwrap()
            .starts_with("Shares keywords:"));
        for candidate in &out {
            assert!((0.4..=1.0).contains(&candidate.score));
        }
    }

    #[tokio::test]
    async fn unparseable_response_uses_lexical_overlap() {
        let provider = Scripted("I would rank the flood light first.".to_string());
        let hits = vec![
            hit(1, "Flood light", "outdoor flood", 0.9),
            hit(2, "Panel", "ceiling panel", 0.8),
        ];
        let out = rerank(&provider, "flood light", &hits).await;
        assert!(out[0].score > out[1].score);
    }

    #[tokio::test]
    async fn empty_hits_rerank_to_empty() {
        let provider = Scripted("{}".to_string());
        assert!(rerank(&provider, "anything", &[]).await.is_empty());
    }

    #[test]
    fn tokens_split_on_non_alphanumerics() {
        let set = tokens("LED-Panel 600x600, IP44!");
        assert!(set.contains("led"));
        assert!(set.contains("panel"));
        assert!(set.contains("600x600"));
        assert!(set.contains("ip44"));
    }
}
