//! In-memory storage fakes

use async_trait::async_trait;
use mealtax_ai::models::ItemLinkResult;
use mealtax_ai::workflow::{AuditSink, MealItemStore};
use mealtax_common::events::{AuditEvent, AuditRecord};
use mealtax_common::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// Items per meal plus every audit record, with optional write failures
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, Vec<ItemLinkResult>>>,
    audit: Mutex<Vec<AuditRecord>>,
    fail_items: bool,
    fail_audit: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `replace_items` call fails
    pub fn failing_items() -> Self {
        Self {
            fail_items: true,
            ..Self::default()
        }
    }

    /// Every audit write fails
    pub fn failing_audit() -> Self {
        Self {
            fail_audit: true,
            ..Self::default()
        }
    }

    pub fn items(&self, meal_id: &str) -> Vec<ItemLinkResult> {
        self.items
            .lock()
            .unwrap()
            .get(meal_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.audit
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.event.clone())
            .collect()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(AuditEvent::event_type).collect()
    }
}

#[async_trait]
impl MealItemStore for MemoryStore {
    async fn replace_items(
        &self,
        _user_id: &str,
        meal_id: &str,
        results: &[ItemLinkResult],
        _llm_model: &str,
        _prompt_version: &str,
    ) -> Result<()> {
        if self.fail_items {
            return Err(Error::Internal("disk full".to_string()));
        }
        self.items
            .lock()
            .unwrap()
            .insert(meal_id.to_string(), results.to_vec());
        Ok(())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn record(&self, record: AuditRecord) -> Result<()> {
        if self.fail_audit {
            return Err(Error::Internal("audit log unavailable".to_string()));
        }
        self.audit.lock().unwrap().push(record);
        Ok(())
    }
}
