//! Database Test Utilities

use anyhow::Result;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Create a temporary database with the schema applied
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_mealtax.db");
    let pool = mealtax_common::db::init_database(&db_path).await?;
    Ok((temp_dir, pool))
}

/// Stored item names for a meal, in insertion order
pub async fn item_names(pool: &SqlitePool, meal_id: &str) -> Vec<String> {
    mealtax_ai::db::meal_items::list_meal_items(pool, meal_id)
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.normalized)
        .collect()
}

/// Audit event types recorded for a meal, oldest first
pub async fn audit_types(pool: &SqlitePool, meal_id: &str) -> Vec<&'static str> {
    mealtax_ai::db::audit::list_audit_for_meal(pool, meal_id)
        .await
        .unwrap()
        .iter()
        .map(|record| record.event.event_type())
        .collect()
}
