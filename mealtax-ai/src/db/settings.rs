//! Settings table accessors (key-value)

use mealtax_common::{Error, Result};
use sqlx::{Pool, Sqlite};

/// Settings key holding the inference API key
pub const OPENAI_API_KEY_SETTING: &str = "openai_api_key";

/// Settings key overriding the lock-retry budget (milliseconds)
pub const MAX_LOCK_WAIT_SETTING: &str = "database_max_lock_wait_ms";

/// Inference API key stored in the database, if any
pub async fn get_openai_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, OPENAI_API_KEY_SETTING).await
}

pub async fn set_openai_api_key(db: &Pool<Sqlite>, key: &str) -> Result<()> {
    set_setting(db, OPENAI_API_KEY_SETTING, key).await
}

/// Lock-retry budget, defaulting when unset
pub async fn get_max_lock_wait_ms(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting(db, MAX_LOCK_WAIT_SETTING)
        .await
        .map(|opt| opt.unwrap_or(crate::utils::DEFAULT_MAX_LOCK_WAIT_MS))
}

/// Generic setting getter
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting {} failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter (upsert)
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> Pool<Sqlite> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        mealtax_common::db::create_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_api_key_roundtrip() {
        let db = setup_test_db().await;
        assert_eq!(get_openai_api_key(&db).await.unwrap(), None);

        set_openai_api_key(&db, "sk-first").await.unwrap();
        set_openai_api_key(&db, "sk-second").await.unwrap();
        assert_eq!(get_openai_api_key(&db).await.unwrap().as_deref(), Some("sk-second"));
    }

    #[tokio::test]
    async fn test_lock_wait_default_and_parse_error() {
        let db = setup_test_db().await;
        assert_eq!(get_max_lock_wait_ms(&db).await.unwrap(), 5000);

        set_setting(&db, MAX_LOCK_WAIT_SETTING, 250).await.unwrap();
        assert_eq!(get_max_lock_wait_ms(&db).await.unwrap(), 250);

        set_setting(&db, MAX_LOCK_WAIT_SETTING, "soon").await.unwrap();
        assert!(matches!(get_max_lock_wait_ms(&db).await, Err(Error::Config(_))));
    }
}
