//! The quotation pipeline orchestrator.

use luxquote_catalog::CatalogIndex;
use luxquote_core::records::{
    InteractionEvent, MatchedProduct, Quotation, RankedCandidate, RequirementRecord,
};
use luxquote_core::{category_weights, rank_candidates, CatalogItem};
use luxquote_providers::{CompletionRequest, ProviderSet};

use crate::events::{QuoteEvent, QuoteEventHandler};
use crate::matcher::MatchOutcome;
use crate::{assemble, extract, matcher, rerank};
use crate::{QuoteConfig, QuoteError, MIN_DOCUMENT_CHARS};

/// Runs document → quotation, rematch, and recommendation flows against a
/// fixed provider pair and catalog index.
///
/// The flow holds no locks and no per-run state; one instance serves
/// concurrent runs. Callers that rematch the same stored quotation must
/// serialize their own writes.
pub struct QuoteFlow {
    providers: ProviderSet,
    catalog: CatalogIndex,
    config: QuoteConfig,
    event_handlers: Vec<QuoteEventHandler>,
}

impl QuoteFlow {
    /// Builds the flow, embedding the catalog up front.
    pub async fn build(
        providers: ProviderSet,
        items: Vec<CatalogItem>,
        config: QuoteConfig,
    ) -> Result<Self, QuoteError> {
        let catalog = CatalogIndex::build(items, providers.embedding.as_ref()).await?;
        Ok(Self::with_index(providers, catalog, config))
    }

    /// Builds the flow around an already-built catalog index.
    pub fn with_index(providers: ProviderSet, catalog: CatalogIndex, config: QuoteConfig) -> Self {
        Self {
            providers,
            catalog,
            config,
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler. Handlers run inline on the pipeline task.
    pub fn on_event(&mut self, handler: QuoteEventHandler) {
        self.event_handlers.push(handler);
    }

    fn emit(&self, event: QuoteEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    pub fn catalog(&self) -> &CatalogIndex {
        &self.catalog
    }

    /// Runs the full document → quotation pipeline.
    ///
    /// Rejects documents shorter than [`MIN_DOCUMENT_CHARS`] after
    /// trimming; every other failure degrades into the returned
    /// quotation's error marker instead of propagating.
    pub async fn quote(&self, document_text: &str) -> Result<Quotation, QuoteError> {
        let text = document_text.trim();
        let length = text.chars().count();
        if length < MIN_DOCUMENT_CHARS {
            return Err(QuoteError::InputRejected(format!(
                "document text too short: {length} chars, need at least {MIN_DOCUMENT_CHARS}"
            )));
        }

        // Step 1: extract requirements
        let outcome =
            extract::extract_requirements(self.providers.generation.as_ref(), text, &self.config)
                .await;
        if let Some(reason) = &outcome.degraded {
            self.emit(QuoteEvent::ExtractionDegraded {
                reason: reason.clone(),
            });
        }
        self.emit(QuoteEvent::RequirementsExtracted {
            count: outcome.requirements.len(),
        });
        tracing::info!(
            count = outcome.requirements.len(),
            degraded = outcome.degraded.is_some(),
            "extraction finished"
        );

        // Step 2: match requirements against the catalog
        let matches = self.resolve_matches(&outcome.requirements).await;

        // Step 3: assemble the quotation
        let total = assemble::total_price(&matches);
        let summary = self.summarize(&matches, total).await;
        let quotation = assemble::assemble(outcome.requirements, matches, summary, outcome.degraded);
        self.emit(QuoteEvent::QuotationAssembled {
            requirement_count: quotation.requirements.len(),
            match_count: quotation.matches.len(),
            total_price: quotation.total_price,
        });
        tracing::info!(
            matches = quotation.matches.len(),
            total = quotation.total_price,
            "quotation assembled"
        );
        Ok(quotation)
    }

    /// Re-runs matching and totals for an edited requirement list.
    ///
    /// Title, client, terms, the generation timestamp, and any error marker
    /// carry over from the original; requirements, matches, total, and
    /// summary are replaced.
    pub async fn rematch(
        &self,
        original: &Quotation,
        requirements: Vec<RequirementRecord>,
    ) -> Quotation {
        let matches = self.resolve_matches(&requirements).await;
        let total = assemble::total_price(&matches);
        let summary = self.summarize(&matches, total).await;

        let mut updated = original.clone();
        updated.requirements = requirements;
        updated.matches = matches;
        updated.total_price = total;
        updated.summary = summary;
        self.emit(QuoteEvent::RematchCompleted {
            requirement_count: updated.requirements.len(),
            match_count: updated.matches.len(),
            total_price: updated.total_price,
        });
        updated
    }

    /// Recommendation path: embed the query, search, rerank, and select a
    /// diversified result list weighted by the subject's interactions.
    /// Failures degrade to an empty list.
    pub async fn recommend(
        &self,
        query: &str,
        interactions: &[InteractionEvent],
        limit: usize,
    ) -> Vec<RankedCandidate> {
        let vector = match self.providers.embedding.embed(query).await {
            Ok(vector) => vector,
            Err(err) => {
                tracing::warn!(error = %err, "query embedding failed, returning no recommendations");
                return Vec::new();
            }
        };
        let hits = self.catalog.search(&vector, self.config.recommend_top_k);
        if hits.is_empty() {
            return Vec::new();
        }
        let candidates = rerank::rerank(self.providers.generation.as_ref(), query, &hits).await;
        let weights = category_weights(interactions);
        let mut ranked = rank_candidates(candidates, &weights);
        ranked.truncate(limit);
        ranked
    }

    async fn resolve_matches(&self, requirements: &[RequirementRecord]) -> Vec<MatchedProduct> {
        let outcomes = matcher::match_requirements(
            self.providers.embedding.as_ref(),
            &self.catalog,
            requirements,
            &self.config,
        )
        .await;

        let mut matches = Vec::new();
        for outcome in outcomes {
            match outcome {
                MatchOutcome::Resolved(matched) => {
                    self.emit(QuoteEvent::MatchResolved {
                        requirement_id: matched.requirement_id.clone(),
                        product_id: matched.product_id,
                        score: matched.match_score,
                    });
                    matches.push(matched);
                }
                MatchOutcome::Skipped {
                    requirement_id,
                    reason,
                } => {
                    tracing::debug!(requirement = %requirement_id, reason = %reason, "requirement skipped");
                    self.emit(QuoteEvent::RequirementSkipped {
                        requirement_id,
                        reason,
                    });
                }
                MatchOutcome::Failed {
                    requirement_id,
                    reason,
                } => {
                    self.emit(QuoteEvent::MatchFailed {
                        requirement_id,
                        reason,
                    });
                }
            }
        }
        matches
    }

    async fn summarize(&self, matches: &[MatchedProduct], total: f64) -> String {
        if !self.config.summarize_with_generation || matches.is_empty() {
            return assemble::fallback_summary(matches.len(), total);
        }
        let request = CompletionRequest::new(
            assemble::summary_prompt(matches, total),
            self.config.summary_max_tokens,
        );
        match self.providers.generation.complete(request).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                self.emit(QuoteEvent::SummaryDegraded {
                    reason: "empty summary response".to_string(),
                });
                assemble::fallback_summary(matches.len(), total)
            }
            Err(err) => {
                tracing::warn!(error = %err, "summary generation failed, using templated statement");
                self.emit(QuoteEvent::SummaryDegraded {
                    reason: format!("summary generation failed: {err}"),
                });
                assemble::fallback_summary(matches.len(), total)
            }
        }
    }
}
