//! Persistence and audit seams used by the pipeline
//!
//! The orchestrator only sees these traits. [`SqliteStore`] is the
//! production implementation; tests plug in-memory fakes in instead.

use crate::db;
use crate::models::{ItemLinkResult, Meal};
use async_trait::async_trait;
use mealtax_common::events::{AuditRecord, EventBus};
use mealtax_common::Result;
use sqlx::SqlitePool;

/// Meal note storage
#[async_trait]
pub trait MealStore: Send + Sync {
    async fn insert_meal(&self, meal: &Meal) -> Result<()>;
}

/// Classified item storage with replace semantics per meal
#[async_trait]
pub trait MealItemStore: Send + Sync {
    /// Atomically replace all stored items of `meal_id` with `results`
    async fn replace_items(
        &self,
        user_id: &str,
        meal_id: &str,
        results: &[ItemLinkResult],
        llm_model: &str,
        prompt_version: &str,
    ) -> Result<()>;
}

/// Audit log sink
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<()>;
}

/// SQLite-backed store for meals, items and audit records.
///
/// Audit records are also broadcast on the event bus after they are written.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    event_bus: EventBus,
    max_lock_wait_ms: u64,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, event_bus: EventBus) -> Self {
        Self {
            pool,
            event_bus,
            max_lock_wait_ms: crate::utils::DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    /// Build a store, taking the lock-retry budget from the settings table
    pub async fn from_settings(pool: SqlitePool, event_bus: EventBus) -> Result<Self> {
        let max_lock_wait_ms = db::settings::get_max_lock_wait_ms(&pool).await?;
        Ok(Self {
            pool,
            event_bus,
            max_lock_wait_ms,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl MealStore for SqliteStore {
    async fn insert_meal(&self, meal: &Meal) -> Result<()> {
        db::meals::insert_meal(&self.pool, meal).await
    }
}

#[async_trait]
impl MealItemStore for SqliteStore {
    async fn replace_items(
        &self,
        user_id: &str,
        meal_id: &str,
        results: &[ItemLinkResult],
        llm_model: &str,
        prompt_version: &str,
    ) -> Result<()> {
        db::meal_items::replace_meal_items(
            &self.pool,
            user_id,
            meal_id,
            results,
            llm_model,
            prompt_version,
            self.max_lock_wait_ms,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for SqliteStore {
    async fn record(&self, record: AuditRecord) -> Result<()> {
        db::audit::insert_audit(&self.pool, &record).await?;
        self.event_bus.emit_lossy(record);
        Ok(())
    }
}
