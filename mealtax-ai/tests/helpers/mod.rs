//! Test Helper Utilities
//!
//! Shared utilities for testing mealtax-ai

#![allow(dead_code)]

pub mod db_utils;
pub mod fake_inference;
pub mod memory_store;
pub mod taxonomy_fixture;

pub use db_utils::{audit_types, create_test_db, item_names};
pub use fake_inference::{FakeInference, FAKE_MODEL};
pub use memory_store::MemoryStore;
pub use taxonomy_fixture::{fixture_index, write_fixture, FIXTURE_JSON};

use mealtax_ai::services::InferenceService;
use mealtax_ai::workflow::{AuditSink, ClassificationPipeline, MealItemStore, PipelineConfig};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        api_key: "sk-test".to_string(),
        model_extract: "extract-model".to_string(),
        model_rerank: "rerank-model".to_string(),
    }
}

pub fn build_pipeline(
    config: PipelineConfig,
    service: Arc<dyn InferenceService>,
    store: Arc<dyn MealItemStore>,
    audit: Arc<dyn AuditSink>,
) -> ClassificationPipeline {
    ClassificationPipeline::new(config, fixture_index(), service, store, audit)
}

/// Extraction reply for "tomatoes and green tea"
pub fn two_item_extraction() -> Value {
    json!({
        "items": [
            {
                "type": "ingredient",
                "text_span": "помидоры",
                "normalized_ru": "помидоры",
                "normalized_en": "tomatoes",
                "modifiers": ["fresh"],
                "confidence": 0.9
            },
            {
                "type": "drink",
                "text_span": "зелёный чай",
                "normalized_ru": "зелёный чай",
                "normalized_en": "green tea",
                "confidence": 0.8
            }
        ]
    })
}

pub fn rerank(id: &str, score: f64) -> Value {
    json!({
        "top_k": [{ "id": id, "score": score }],
        "abstain": false,
        "abstain_reason": null
    })
}
