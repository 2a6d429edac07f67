//! Meal classification pipeline
//!
//! One run per meal: extract items, link each item in extraction order,
//! then persist the whole set at once. A failure anywhere aborts the run;
//! nothing from that run is stored and any earlier stored set survives.
//!
//! Classification is best-effort. [`ClassificationPipeline::process_meal`]
//! never returns an error: a missing key or blank text yields an empty
//! list, and a failed run is logged and audited before returning empty.

use super::storage::{AuditSink, MealItemStore};
use crate::error::ClassifyResult;
use crate::models::ItemLinkResult;
use crate::services::{CategoryLinker, InferenceService, ItemExtractor, PROMPT_VERSION};
use crate::taxonomy::TaxonomyIndex;
use mealtax_common::events::{AuditEvent, AuditRecord};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Inference API key; a blank key disables classification
    pub api_key: String,
    pub model_extract: String,
    pub model_rerank: String,
}

impl PipelineConfig {
    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

pub struct ClassificationPipeline {
    config: PipelineConfig,
    extractor: ItemExtractor,
    linker: CategoryLinker,
    store: Arc<dyn MealItemStore>,
    audit: Arc<dyn AuditSink>,
}

impl ClassificationPipeline {
    pub fn new(
        config: PipelineConfig,
        index: Arc<TaxonomyIndex>,
        service: Arc<dyn InferenceService>,
        store: Arc<dyn MealItemStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            extractor: ItemExtractor::new(Arc::clone(&service), config.model_extract.clone()),
            linker: CategoryLinker::new(index, service, config.model_rerank.clone()),
            config,
            store,
            audit,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn index(&self) -> &TaxonomyIndex {
        self.linker.index()
    }

    /// Classify one meal; empty on missing input, missing key, or failure
    pub async fn process_meal(
        &self,
        user_id: &str,
        meal_id: &str,
        notes_text: &str,
        lang: &str,
    ) -> Vec<ItemLinkResult> {
        self.try_process_meal(user_id, meal_id, notes_text, lang)
            .await
            .unwrap_or_default()
    }

    /// Like [`process_meal`](Self::process_meal) but hands the failure back
    /// to the caller after it has been logged and audited
    pub async fn try_process_meal(
        &self,
        user_id: &str,
        meal_id: &str,
        notes_text: &str,
        lang: &str,
    ) -> ClassifyResult<Vec<ItemLinkResult>> {
        if !self.config.has_credentials() {
            debug!(meal_id, "No inference API key configured, skipping classification");
            return Ok(Vec::new());
        }
        if notes_text.trim().is_empty() {
            debug!(meal_id, "Empty meal text, skipping classification");
            return Ok(Vec::new());
        }

        match self.run(user_id, meal_id, notes_text, lang).await {
            Ok(results) => Ok(results),
            Err(e) => {
                error!(meal_id, error = %e, "Meal classification failed");
                self.emit(
                    user_id,
                    AuditEvent::MealTaxonomyFailed {
                        meal_id: meal_id.to_string(),
                        error: e.to_string(),
                        prompt_version: PROMPT_VERSION.to_string(),
                    },
                )
                .await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        user_id: &str,
        meal_id: &str,
        notes_text: &str,
        lang: &str,
    ) -> ClassifyResult<Vec<ItemLinkResult>> {
        self.emit(
            user_id,
            AuditEvent::MealTaxonomyStarted {
                meal_id: meal_id.to_string(),
            },
        )
        .await;

        let extraction = self.extractor.extract(notes_text, lang).await?;
        self.emit(
            user_id,
            AuditEvent::MealTaxonomyExtracted {
                meal_id: meal_id.to_string(),
                items: extraction.items.len(),
                prompt_version: PROMPT_VERSION.to_string(),
            },
        )
        .await;

        let mut results = Vec::with_capacity(extraction.items.len());
        let mut rerank_model = self.config.model_rerank.clone();
        for item in &extraction.items {
            let linking = self.linker.link(item, notes_text, lang).await?;
            rerank_model = linking.model;
            results.push(linking.result);
        }

        let llm_model = format!("{}|{}", extraction.model, rerank_model);
        self.store
            .replace_items(user_id, meal_id, &results, &llm_model, PROMPT_VERSION)
            .await?;

        let top1_scores: Vec<f64> = results.iter().map(ItemLinkResult::top1_score).collect();
        info!(meal_id, items = results.len(), "Meal classified");
        self.emit(
            user_id,
            AuditEvent::MealTaxonomyLinked {
                meal_id: meal_id.to_string(),
                items: results.len(),
                top1_scores,
                prompt_version: PROMPT_VERSION.to_string(),
            },
        )
        .await;

        Ok(results)
    }

    /// Audit writes never abort a run
    async fn emit(&self, user_id: &str, event: AuditEvent) {
        let event_type = event.event_type();
        if let Err(e) = self.audit.record(AuditRecord::new(user_id, event)).await {
            warn!(event_type, error = %e, "Failed to write audit record");
        }
    }
}
