//! Configuration resolution for mealtax-ai
//!
//! The inference API key is resolved Database → ENV → TOML. Everything else
//! comes from the TOML file with compiled defaults.

use crate::services::inference_client::{
    DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_REQUESTS_PER_SECOND, DEFAULT_TIMEOUT_SECS,
};
use crate::services::{InferenceSettings, RetryPolicy};
use crate::taxonomy::{DisconnectedPolicy, LoadOptions};
use crate::workflow::PipelineConfig;
use mealtax_common::config::TomlConfig;
use mealtax_common::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variables checked for the API key, in order
pub const API_KEY_ENV_VARS: [&str; 2] = ["MEALTAX_OPENAI_API_KEY", "OPENAI_API_KEY"];

/// Resolve the inference API key
///
/// **Priority:** Database → ENV → TOML
///
/// A missing key is not an error; classification is skipped without one.
pub async fn resolve_openai_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<Option<String>> {
    let db_key = crate::db::settings::get_openai_api_key(db)
        .await?
        .filter(|k| is_valid_key(k));
    let env_key = API_KEY_ENV_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|k| is_valid_key(k));
    let toml_key = toml_config
        .inference
        .api_key
        .clone()
        .filter(|k| is_valid_key(k));

    let sources: Vec<&str> = [
        db_key.as_ref().map(|_| "database"),
        env_key.as_ref().map(|_| "environment"),
        toml_key.as_ref().map(|_| "TOML"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if sources.len() > 1 {
        warn!(
            "Inference API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(source) = sources.first() {
        info!("Inference API key loaded from {}", source);
    }

    Ok(db_key.or(env_key).or(toml_key))
}

/// Non-empty, non-whitespace
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Store the API key in the database, then back it up into the TOML file.
///
/// The TOML write is best-effort once the database write has succeeded.
pub async fn store_api_key(db: &Pool<Sqlite>, key: &str, toml_path: &Path) -> Result<()> {
    if !is_valid_key(key) {
        return Err(Error::InvalidInput("API key must not be blank".to_string()));
    }
    crate::db::settings::set_openai_api_key(db, key.trim()).await?;

    let mut config = if toml_path.exists() {
        mealtax_common::config::load_toml_config(Some(toml_path))?
    } else {
        TomlConfig::default()
    };
    config.inference.api_key = Some(key.trim().to_string());

    match mealtax_common::config::write_toml_config(&config, toml_path) {
        Ok(()) => info!("API key synced to TOML: {}", toml_path.display()),
        Err(e) => warn!("TOML write failed (database write succeeded): {}", e),
    }
    Ok(())
}

/// Classifier settings derived from the TOML file
#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub model_extract: String,
    pub model_rerank: String,
    pub base_url: String,
    pub timeout: Duration,
    pub requests_per_second: u32,
    pub retry: RetryPolicy,
    pub load_options: LoadOptions,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            model_extract: DEFAULT_MODEL.to_string(),
            model_rerank: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            retry: RetryPolicy::default(),
            load_options: LoadOptions::default(),
        }
    }
}

impl ClassifierSettings {
    /// Apply TOML overrides on top of the defaults.
    ///
    /// Fails on an unknown `disconnected_nodes` value.
    pub fn from_toml(toml_config: &TomlConfig) -> Result<Self> {
        let mut settings = Self::default();
        let inference = &toml_config.inference;

        if let Some(model) = non_blank(&inference.model_extract) {
            settings.model_extract = model;
        }
        if let Some(model) = non_blank(&inference.model_rerank) {
            settings.model_rerank = model;
        }
        if let Some(url) = non_blank(&inference.base_url) {
            settings.base_url = url;
        }
        if let Some(secs) = inference.timeout_secs {
            settings.timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(rps) = inference.requests_per_second {
            settings.requests_per_second = rps.max(1);
        }
        if let Some(retries) = inference.max_retries {
            settings.retry = settings.retry.with_max_retries(retries);
        }
        if let Some(policy) = &toml_config.taxonomy.disconnected_nodes {
            let disconnected = policy
                .parse::<DisconnectedPolicy>()
                .map_err(Error::Config)?;
            settings.load_options = LoadOptions { disconnected };
        }

        Ok(settings)
    }

    pub fn inference_settings(&self, api_key: &str) -> InferenceSettings {
        InferenceSettings {
            api_key: api_key.to_string(),
            base_url: self.base_url.clone(),
            timeout: self.timeout,
            requests_per_second: self.requests_per_second,
            retry: self.retry.clone(),
        }
    }

    pub fn pipeline_config(&self, api_key: &str) -> PipelineConfig {
        PipelineConfig {
            api_key: api_key.to_string(),
            model_extract: self.model_extract.clone(),
            model_rerank: self.model_rerank.clone(),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mealtax_common::config::{InferenceConfig, TaxonomyConfig};
    use serial_test::serial;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> Pool<Sqlite> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        mealtax_common::db::create_schema(&pool).await.unwrap();
        pool
    }

    fn clear_env() {
        for var in API_KEY_ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_settings_defaults_and_overrides() {
        let defaults = ClassifierSettings::from_toml(&TomlConfig::default()).unwrap();
        assert_eq!(defaults.model_extract, "gpt-4o-mini");
        assert_eq!(defaults.retry.max_retries, 4);
        assert_eq!(defaults.load_options.disconnected, DisconnectedPolicy::LevelZero);

        let toml_config = TomlConfig {
            inference: InferenceConfig {
                model_rerank: Some("gpt-4o".to_string()),
                model_extract: Some("  ".to_string()),
                max_retries: Some(1),
                timeout_secs: Some(5),
                ..Default::default()
            },
            taxonomy: TaxonomyConfig {
                disconnected_nodes: Some("reject".to_string()),
            },
            ..Default::default()
        };
        let settings = ClassifierSettings::from_toml(&toml_config).unwrap();
        assert_eq!(settings.model_extract, "gpt-4o-mini");
        assert_eq!(settings.model_rerank, "gpt-4o");
        assert_eq!(settings.retry.max_retries, 1);
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert_eq!(settings.load_options.disconnected, DisconnectedPolicy::Reject);

        let pipeline = settings.pipeline_config("sk-test");
        assert_eq!(pipeline.model_rerank, "gpt-4o");
        assert!(pipeline.has_credentials());
    }

    #[test]
    fn test_unknown_disconnected_policy_is_config_error() {
        let toml_config = TomlConfig {
            taxonomy: TaxonomyConfig {
                disconnected_nodes: Some("sometimes".to_string()),
            },
            ..Default::default()
        };
        assert!(matches!(
            ClassifierSettings::from_toml(&toml_config),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    #[serial]
    async fn test_api_key_priority() {
        clear_env();
        let pool = memory_pool().await;
        let mut toml_config = TomlConfig::default();

        assert_eq!(resolve_openai_api_key(&pool, &toml_config).await.unwrap(), None);

        toml_config.inference.api_key = Some("toml-key".to_string());
        assert_eq!(
            resolve_openai_api_key(&pool, &toml_config).await.unwrap().as_deref(),
            Some("toml-key")
        );

        std::env::set_var("OPENAI_API_KEY", "env-key");
        assert_eq!(
            resolve_openai_api_key(&pool, &toml_config).await.unwrap().as_deref(),
            Some("env-key")
        );

        crate::db::settings::set_openai_api_key(&pool, "db-key").await.unwrap();
        assert_eq!(
            resolve_openai_api_key(&pool, &toml_config).await.unwrap().as_deref(),
            Some("db-key")
        );
        clear_env();
    }

    #[tokio::test]
    #[serial]
    async fn test_blank_keys_are_ignored() {
        clear_env();
        std::env::set_var("MEALTAX_OPENAI_API_KEY", "   ");
        let pool = memory_pool().await;
        let mut toml_config = TomlConfig::default();
        toml_config.inference.api_key = Some(String::new());

        assert_eq!(resolve_openai_api_key(&pool, &toml_config).await.unwrap(), None);
        clear_env();
    }

    #[tokio::test]
    async fn test_store_api_key_writes_database_and_toml() {
        let pool = memory_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("config.toml");

        store_api_key(&pool, " sk-new ", &toml_path).await.unwrap();

        let stored = crate::db::settings::get_openai_api_key(&pool).await.unwrap();
        assert_eq!(stored.as_deref(), Some("sk-new"));
        let written = mealtax_common::config::load_toml_config(Some(&toml_path)).unwrap();
        assert_eq!(written.inference.api_key.as_deref(), Some("sk-new"));

        assert!(store_api_key(&pool, "  ", &toml_path).await.is_err());
    }
}
