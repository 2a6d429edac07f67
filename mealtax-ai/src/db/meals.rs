//! Meal note storage

use crate::models::Meal;
use chrono::{DateTime, SecondsFormat, Utc};
use mealtax_common::{Error, Result};
use sqlx::{Row, SqlitePool};

pub async fn insert_meal(pool: &SqlitePool, meal: &Meal) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO meals (id, user_id, occurred_at, notes_text, language, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&meal.id)
    .bind(&meal.user_id)
    .bind(format_timestamp(&meal.occurred_at))
    .bind(&meal.notes_text)
    .bind(&meal.language)
    .bind(format_timestamp(&meal.created_at))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_meal(pool: &SqlitePool, meal_id: &str) -> Result<Option<Meal>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, occurred_at, notes_text, language, created_at
        FROM meals
        WHERE id = ?
        "#,
    )
    .bind(meal_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| meal_from_row(&r)).transpose()
}

/// Meals oldest-first, optionally limited. A limit of 0 means all meals.
pub async fn list_meals(pool: &SqlitePool, limit: Option<u32>) -> Result<Vec<Meal>> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, occurred_at, notes_text, language, created_at
        FROM meals
        ORDER BY occurred_at ASC, id ASC
        LIMIT ?
        "#,
    )
    .bind(limit.filter(|&n| n > 0).map(i64::from).unwrap_or(-1))
    .fetch_all(pool)
    .await?;

    rows.iter().map(meal_from_row).collect()
}

/// Whether any classified items are stored for the meal
pub async fn meal_has_items(pool: &SqlitePool, meal_id: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM meal_items WHERE meal_id = ?")
        .bind(meal_id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

fn meal_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Meal> {
    Ok(Meal {
        id: row.get("id"),
        user_id: row.get("user_id"),
        occurred_at: parse_timestamp(row.get("occurred_at"), "occurred_at")?,
        notes_text: row.get("notes_text"),
        language: row.get("language"),
        created_at: parse_timestamp(row.get("created_at"), "created_at")?,
    })
}

/// Fixed-width UTC timestamps so text ordering matches time ordering
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: String, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}
