//! Classified item storage
//!
//! A meal's items are always written as a complete set: the previous items
//! and their category links are deleted and the new ones inserted inside a
//! single transaction, so a rerun never duplicates rows and a failed write
//! leaves the earlier set in place.

use super::meals::{format_timestamp, parse_timestamp};
use crate::models::ItemLinkResult;
use crate::utils::retry_on_lock;
use chrono::{DateTime, Utc};
use mealtax_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Extra item fields kept in `meal_items.modifiers_json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub modifiers: Vec<String>,
    pub normalized_secondary: Option<String>,
    pub abstain: bool,
    pub abstain_reason: Option<String>,
}

/// Extra link fields kept in `meal_item_categories.meta_json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMeta {
    pub label: String,
    pub level: u32,
}

/// Stored item as read back from the database
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMealItem {
    pub id: String,
    pub meal_id: String,
    pub user_id: String,
    pub item_type: String,
    pub text_span: String,
    pub normalized: String,
    pub details: ItemDetails,
    /// Percent, 0-100
    pub confidence: i64,
    pub llm_model: String,
    pub prompt_version: String,
    pub created_at: DateTime<Utc>,
    pub categories: Vec<StoredCategory>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredCategory {
    pub category_id: String,
    /// 1-3
    pub rank: i64,
    /// Percent, 0-100
    pub score: i64,
    pub meta: CategoryMeta,
}

/// Fraction in [0, 1] as a whole percentage
pub fn to_percent(value: f64) -> i64 {
    (value.clamp(0.0, 1.0) * 100.0).round() as i64
}

struct ItemRow {
    id: String,
    item_type: &'static str,
    text_span: String,
    normalized: String,
    details_json: String,
    confidence: i64,
    categories: Vec<CategoryRow>,
}

struct CategoryRow {
    id: String,
    category_id: String,
    rank: i64,
    score: i64,
    meta_json: String,
}

fn prepare_rows(results: &[ItemLinkResult]) -> Result<Vec<ItemRow>> {
    results
        .iter()
        .map(|r| {
            let details = ItemDetails {
                modifiers: r.item.modifiers.clone(),
                normalized_secondary: r.item.normalized_secondary.clone(),
                abstain: r.abstain,
                abstain_reason: r.abstain_reason.clone(),
            };
            let categories = r
                .top3
                .iter()
                .take(3)
                .enumerate()
                .map(|(i, c)| {
                    let meta = CategoryMeta {
                        label: c.label.clone(),
                        level: c.level,
                    };
                    Ok::<_, Error>(CategoryRow {
                        id: mealtax_common::uuid_utils::generate_string(),
                        category_id: c.category_id.clone(),
                        rank: i as i64 + 1,
                        score: to_percent(c.score),
                        meta_json: serde_json::to_string(&meta)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok::<_, Error>(ItemRow {
                id: mealtax_common::uuid_utils::generate_string(),
                item_type: r.item.item_type.as_str(),
                text_span: r.item.text_span.clone(),
                normalized: r.item.normalized_primary.clone(),
                details_json: serde_json::to_string(&details)?,
                confidence: to_percent(r.item.confidence),
                categories,
            })
        })
        .collect()
}

/// Replace every stored item of `meal_id` with `results`.
///
/// Returns the number of items written.
pub async fn replace_meal_items(
    pool: &SqlitePool,
    user_id: &str,
    meal_id: &str,
    results: &[ItemLinkResult],
    llm_model: &str,
    prompt_version: &str,
    max_lock_wait_ms: u64,
) -> Result<usize> {
    // Prepare all data before touching the database
    let rows = prepare_rows(results)?;
    let created_at = format_timestamp(&Utc::now());

    retry_on_lock("replace_meal_items", max_lock_wait_ms, || async {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM meal_item_categories
            WHERE meal_item_id IN (SELECT id FROM meal_items WHERE meal_id = ?)
            "#,
        )
        .bind(meal_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM meal_items WHERE meal_id = ?")
            .bind(meal_id)
            .execute(&mut *tx)
            .await?;

        for item in &rows {
            sqlx::query(
                r#"
                INSERT INTO meal_items (
                    id, meal_id, user_id, item_type, text_span, normalized,
                    modifiers_json, confidence, llm_model, prompt_version, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&item.id)
            .bind(meal_id)
            .bind(user_id)
            .bind(item.item_type)
            .bind(&item.text_span)
            .bind(&item.normalized)
            .bind(&item.details_json)
            .bind(item.confidence)
            .bind(llm_model)
            .bind(prompt_version)
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;

            for category in &item.categories {
                sqlx::query(
                    r#"
                    INSERT INTO meal_item_categories (
                        id, meal_item_id, category_id, rank, score, meta_json, created_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&category.id)
                .bind(&item.id)
                .bind(&category.category_id)
                .bind(category.rank)
                .bind(category.score)
                .bind(&category.meta_json)
                .bind(&created_at)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok::<usize, Error>(rows.len())
    })
    .await
}

/// Stored items of a meal in insertion order, with their categories by rank
pub async fn list_meal_items(pool: &SqlitePool, meal_id: &str) -> Result<Vec<StoredMealItem>> {
    let rows = sqlx::query(
        r#"
        SELECT id, meal_id, user_id, item_type, text_span, normalized, modifiers_json,
               confidence, llm_model, prompt_version, created_at
        FROM meal_items
        WHERE meal_id = ?
        ORDER BY rowid ASC
        "#,
    )
    .bind(meal_id)
    .fetch_all(pool)
    .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let id: String = row.get("id");
        let details_json: String = row.get("modifiers_json");
        let details: ItemDetails = serde_json::from_str(&details_json)
            .map_err(|e| Error::Internal(format!("Failed to parse modifiers_json: {}", e)))?;

        items.push(StoredMealItem {
            categories: list_item_categories(pool, &id).await?,
            id,
            meal_id: row.get("meal_id"),
            user_id: row.get("user_id"),
            item_type: row.get("item_type"),
            text_span: row.get("text_span"),
            normalized: row.get("normalized"),
            details,
            confidence: row.get("confidence"),
            llm_model: row.get("llm_model"),
            prompt_version: row.get("prompt_version"),
            created_at: parse_timestamp(row.get("created_at"), "created_at")?,
        });
    }

    Ok(items)
}

async fn list_item_categories(pool: &SqlitePool, meal_item_id: &str) -> Result<Vec<StoredCategory>> {
    let rows = sqlx::query(
        r#"
        SELECT category_id, rank, score, meta_json
        FROM meal_item_categories
        WHERE meal_item_id = ?
        ORDER BY rank ASC
        "#,
    )
    .bind(meal_item_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let meta_json: String = row.get("meta_json");
            let meta: CategoryMeta = serde_json::from_str(&meta_json)
                .map_err(|e| Error::Internal(format!("Failed to parse meta_json: {}", e)))?;
            Ok::<_, Error>(StoredCategory {
                category_id: row.get("category_id"),
                rank: row.get("rank"),
                score: row.get("score"),
                meta,
            })
        })
        .collect()
}

/// Number of stored items for a meal
pub async fn count_meal_items(pool: &SqlitePool, meal_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM meal_items WHERE meal_id = ?")
        .bind(meal_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}
