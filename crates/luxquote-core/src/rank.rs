//! Candidate ranking and diversity selection for the recommendation path.
//!
//! Candidates arrive already carrying a generation-service relevance score
//! and, usually, a vector-similarity score. Selection blends the two,
//! boosts categories the subject has shown interest in, breaks near-ties
//! deterministically, caps per-category counts, and finally rescales the
//! surviving scores into a bounded display range. Sort order is fully
//! decided before display rescaling; the rescaled value is presentation
//! only.

use crate::records::{InteractionEvent, RankedCandidate};
use std::collections::HashMap;

/// Blend weights for the generation-service score vs. vector similarity.
pub const LLM_WEIGHT: f64 = 0.7;
pub const SIMILARITY_WEIGHT: f64 = 0.3;

/// Maximum boost a fully-dominant category can contribute.
pub const CATEGORY_BOOST_CAP: f64 = 0.15;

/// Diversity cap per category and overall result limit.
pub const CATEGORY_CAP: usize = 4;
pub const RESULT_LIMIT: usize = 12;

/// Spread below which the selected set counts as near-tied.
const NEAR_TIE_EPSILON: f64 = 1e-3;
const NEAR_TIE_HIGH: f64 = 0.95;
const NEAR_TIE_LOW: f64 = 0.55;
/// Display score for a lone near-tied candidate.
const NEAR_TIE_SINGLE: f64 = 0.85;
const DISPLAY_FLOOR: f64 = 0.3;
const DISPLAY_SPAN: f64 = 0.7;

/// Per-action contribution to a category's interest weight.
const PURCHASE_WEIGHT: f64 = 3.0;
const SHORTLIST_WEIGHT: f64 = 2.0;
const VIEW_WEIGHT: f64 = 1.0;

/// Working entry during ranking. Blended and boosted values live only
/// here; the output candidates carry display scores alone.
struct ScoredCandidate {
    candidate: RankedCandidate,
    final_score: f64,
}

/// Ranks, diversifies, and display-normalizes a candidate list.
///
/// `weights` maps category names to aggregate interest weights, typically
/// from [`category_weights`]. Output is sorted descending, holds at most
/// [`CATEGORY_CAP`] entries per category and [`RESULT_LIMIT`] entries
/// overall, and carries display scores in [0.3, 1.0] (near-tied sets:
/// evenly spaced across [0.55, 0.95]).
pub fn rank_candidates(
    candidates: Vec<RankedCandidate>,
    weights: &HashMap<String, f64>,
) -> Vec<RankedCandidate> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let max_weight = weights.values().fold(0.0_f64, |acc, &w| acc.max(w));

    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .map(|candidate| {
            let llm_score = candidate.score;
            let similarity = candidate.similarity.unwrap_or(llm_score);
            let base = LLM_WEIGHT * llm_score + SIMILARITY_WEIGHT * similarity;
            let boost = if max_weight > 0.0 {
                let weight = weights.get(&candidate.category).copied().unwrap_or(0.0);
                CATEGORY_BOOST_CAP * weight / max_weight
            } else {
                0.0
            };
            // Stable string hash keeps ordering reproducible across runs;
            // the offset is < 0.001 and can only separate genuine ties.
            let tie_break = (fnv1a64(&candidate.title) % 1000) as f64 / 1_000_000.0;
            ScoredCandidate {
                final_score: base + boost + tie_break,
                candidate,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| a.candidate.id.cmp(&b.candidate.id))
    });

    let mut admitted_per_category: HashMap<String, usize> = HashMap::new();
    let mut selected: Vec<ScoredCandidate> = Vec::new();
    for entry in scored {
        if selected.len() >= RESULT_LIMIT {
            break;
        }
        let admitted = admitted_per_category
            .entry(entry.candidate.category.clone())
            .or_insert(0);
        if *admitted >= CATEGORY_CAP {
            continue;
        }
        *admitted += 1;
        selected.push(entry);
    }

    apply_display_scores(&mut selected);
    selected.into_iter().map(|entry| entry.candidate).collect()
}

/// Aggregates a subject's recorded actions into category interest weights.
/// Unknown actions count like views; events without a category land in
/// "General", the same bucket uncategorized candidates carry.
pub fn category_weights(events: &[InteractionEvent]) -> HashMap<String, f64> {
    let mut weights: HashMap<String, f64> = HashMap::new();
    for event in events {
        let contribution = match event.action.to_lowercase().as_str() {
            "purchase" => PURCHASE_WEIGHT,
            "shortlist" => SHORTLIST_WEIGHT,
            "view" => VIEW_WEIGHT,
            _ => VIEW_WEIGHT,
        };
        let category = if event.category.is_empty() {
            "General".to_string()
        } else {
            event.category.clone()
        };
        *weights.entry(category).or_insert(0.0) += contribution;
    }
    weights
}

/// Rescales final scores into the display range, by rank when the set is
/// near-tied so rounding cannot collapse the list into identical numbers.
fn apply_display_scores(selected: &mut [ScoredCandidate]) {
    if selected.is_empty() {
        return;
    }
    let min = selected
        .iter()
        .map(|e| e.final_score)
        .fold(f64::INFINITY, f64::min);
    let max = selected
        .iter()
        .map(|e| e.final_score)
        .fold(f64::NEG_INFINITY, f64::max);

    if max - min < NEAR_TIE_EPSILON {
        let n = selected.len();
        if n == 1 {
            selected[0].candidate.score = NEAR_TIE_SINGLE;
            return;
        }
        let step = (NEAR_TIE_HIGH - NEAR_TIE_LOW) / (n as f64 - 1.0);
        for (rank, entry) in selected.iter_mut().enumerate() {
            entry.candidate.score = round2(NEAR_TIE_HIGH - rank as f64 * step);
        }
    } else {
        for entry in selected.iter_mut() {
            let normalized = (entry.final_score - min) / (max - min);
            entry.candidate.score = round2(DISPLAY_FLOOR + DISPLAY_SPAN * normalized);
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn fnv1a64(s: &str) -> u64 {
    let mut hash: u64 = 14695981039346656037;
    for byte in s.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn candidate(id: i64, title: &str, category: &str, score: f64) -> RankedCandidate {
        RankedCandidate {
            id,
            title: title.to_string(),
            description: String::new(),
            category: category.to_string(),
            score,
            similarity: None,
            explanation: None,
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(rank_candidates(Vec::new(), &HashMap::new()).is_empty());
    }

    #[test]
    fn single_candidate_gets_fixed_display_score() {
        let out = rank_candidates(
            vec![candidate(1, "Track spot", "Spots", 0.8)],
            &HashMap::new(),
        );
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out[0].score, NEAR_TIE_SINGLE);
    }

    #[test]
    fn category_cap_and_result_limit_hold() {
        // 8 dominant-category candidates plus 4 in each of four others.
        let mut candidates = Vec::new();
        for i in 0..8 {
            candidates.push(candidate(i, &format!("A{i}"), "A", 0.9));
        }
        let mut id = 100;
        for cat in ["B", "C", "D", "E"] {
            for i in 0..4 {
                candidates.push(candidate(id, &format!("{cat}{i}"), cat, 0.5));
                id += 1;
            }
        }
        let weights = HashMap::from([("A".to_string(), 10.0), ("B".to_string(), 2.0)]);
        let out = rank_candidates(candidates, &weights);

        assert!(out.len() <= RESULT_LIMIT);
        for cat in ["A", "B", "C", "D", "E"] {
            let count = out.iter().filter(|c| c.category == cat).count();
            assert!(count <= CATEGORY_CAP, "category {cat} admitted {count}");
        }
        // The dominant category fills its cap but no more.
        assert_eq!(out.iter().filter(|c| c.category == "A").count(), 4);
        assert_eq!(out.len(), RESULT_LIMIT);
    }

    #[test]
    fn near_tied_scores_spread_across_band() {
        let candidates = vec![
            candidate(1, "Alpha", "A", 0.8),
            candidate(2, "Beta", "B", 0.8),
            candidate(3, "Gamma", "C", 0.8),
            candidate(4, "Delta", "D", 0.8),
            candidate(5, "Epsilon", "E", 0.8),
        ];
        let out = rank_candidates(candidates, &HashMap::new());
        assert_eq!(out.len(), 5);
        let scores: Vec<f64> = out.iter().map(|c| c.score).collect();
        assert_relative_eq!(scores[0], 0.95);
        assert_relative_eq!(scores[4], 0.55);
        for pair in scores.windows(2) {
            assert!(pair[0] > pair[1], "display scores must strictly descend");
        }
        for score in scores {
            assert!((0.55..=0.95).contains(&score));
        }
    }

    #[test]
    fn spread_scores_rescale_into_display_range() {
        let candidates = vec![
            candidate(1, "High", "A", 0.95),
            candidate(2, "Mid", "B", 0.6),
            candidate(3, "Low", "C", 0.2),
        ];
        let out = rank_candidates(candidates, &HashMap::new());
        assert_relative_eq!(out[0].score, 1.0);
        assert_relative_eq!(out[2].score, 0.3);
        for c in &out {
            assert!((0.3..=1.0).contains(&c.score));
        }
    }

    #[test]
    fn tie_break_never_reorders_material_differences() {
        let candidates = vec![
            candidate(1, "zzzz heavy hash title", "A", 0.6),
            candidate(2, "aaaa", "A", 0.9),
        ];
        let out = rank_candidates(candidates, &HashMap::new());
        assert_eq!(out[0].id, 2);
    }

    #[test]
    fn boost_prefers_interesting_categories() {
        let candidates = vec![
            candidate(1, "Plain", "A", 0.7),
            candidate(2, "Favored", "B", 0.7),
        ];
        let weights = HashMap::from([("B".to_string(), 9.0), ("A".to_string(), 1.0)]);
        let out = rank_candidates(candidates, &weights);
        assert_eq!(out[0].id, 2);
    }

    #[test]
    fn ranking_is_deterministic_across_calls() {
        let build = || {
            vec![
                candidate(1, "Linear batten", "Linear", 0.81),
                candidate(2, "Panel 600", "Panels", 0.81),
                candidate(3, "Track head", "Spots", 0.81),
            ]
        };
        let weights = HashMap::from([("Panels".to_string(), 4.0)]);
        let first = rank_candidates(build(), &weights);
        let second = rank_candidates(build(), &weights);
        assert_eq!(first, second);
    }

    #[test]
    fn similarity_defaults_to_llm_score() {
        let mut with_similarity = candidate(1, "Same", "A", 0.8);
        with_similarity.similarity = Some(0.8);
        let without = candidate(2, "Same", "A", 0.8);
        let a = rank_candidates(vec![with_similarity], &HashMap::new());
        let b = rank_candidates(vec![without], &HashMap::new());
        assert_relative_eq!(a[0].score, b[0].score);
    }

    #[test]
    fn interaction_weights_accumulate_per_category() {
        let events = vec![
            InteractionEvent {
                action: "view".to_string(),
                category: "Spots".to_string(),
            },
            InteractionEvent {
                action: "Purchase".to_string(),
                category: "Spots".to_string(),
            },
            InteractionEvent {
                action: "shortlist".to_string(),
                category: "Panels".to_string(),
            },
            InteractionEvent {
                action: "unknown-action".to_string(),
                category: "Panels".to_string(),
            },
        ];
        let weights = category_weights(&events);
        assert_relative_eq!(weights["Spots"], 4.0);
        assert_relative_eq!(weights["Panels"], 3.0);
    }

    #[test]
    fn uncategorized_interactions_count_toward_general() {
        let events = vec![InteractionEvent {
            action: "purchase".to_string(),
            category: String::new(),
        }];
        let weights = category_weights(&events);
        assert_relative_eq!(weights["General"], 3.0);
    }
}
