//! Audit log table

use super::meals::{format_timestamp, parse_timestamp};
use mealtax_common::events::{AuditEvent, AuditRecord};
use mealtax_common::{Error, Result};
use sqlx::{Row, SqlitePool};

pub async fn insert_audit(pool: &SqlitePool, record: &AuditRecord) -> Result<()> {
    let payload = serde_json::to_string(&record.event.payload())?;

    sqlx::query(
        r#"
        INSERT INTO event_audit (user_id, event_type, payload_json, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&record.user_id)
    .bind(record.event.event_type())
    .bind(payload)
    .bind(format_timestamp(&record.timestamp))
    .execute(pool)
    .await?;

    Ok(())
}

/// Audit records for one meal, oldest first
pub async fn list_audit_for_meal(pool: &SqlitePool, meal_id: &str) -> Result<Vec<AuditRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT user_id, event_type, payload_json, created_at
        FROM event_audit
        WHERE json_extract(payload_json, '$.meal_id') = ?
        ORDER BY id ASC
        "#,
    )
    .bind(meal_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let event_type: String = row.get("event_type");
            let payload_json: String = row.get("payload_json");
            Ok::<_, Error>(AuditRecord {
                user_id: row.get("user_id"),
                event: decode_event(&event_type, &payload_json)?,
                timestamp: parse_timestamp(row.get("created_at"), "created_at")?,
            })
        })
        .collect()
}

fn decode_event(event_type: &str, payload_json: &str) -> Result<AuditEvent> {
    let mut value: serde_json::Value = serde_json::from_str(payload_json)?;
    let obj = value
        .as_object_mut()
        .ok_or_else(|| Error::Internal(format!("Audit payload for {} is not an object", event_type)))?;
    obj.insert(
        "event_type".to_string(),
        serde_json::Value::String(event_type.to_string()),
    );
    Ok(serde_json::from_value(value)?)
}
