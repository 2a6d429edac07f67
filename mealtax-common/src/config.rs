//! Configuration loading and root folder resolution
//!
//! Resolution order for every path setting:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the root folder
pub const ROOT_ENV_VAR: &str = "MEALTAX_ROOT";

/// Environment variable naming the taxonomy definition file
pub const TAXONOMY_ENV_VAR: &str = "MEALTAX_TAXONOMY";

/// File name of the taxonomy definition inside the root folder
pub const DEFAULT_TAXONOMY_FILE: &str = "categories.json";

/// File name of the SQLite database inside the root folder
pub const DATABASE_FILE: &str = "mealtax.db";

/// TOML configuration file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Root folder for the database and default taxonomy file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,

    /// Explicit taxonomy definition path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxonomy_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
}

/// Logging section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset (e.g. "info", "mealtax_ai=debug")
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Semantic inference service section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InferenceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_extract: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_rerank: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_second: Option<u32>,
}

/// Taxonomy loading section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaxonomyConfig {
    /// "level_zero" (default) or "reject"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disconnected_nodes: Option<String>,
}

/// Load TOML config from an explicit path, or from the platform default location.
///
/// A missing default file is not an error: defaults are returned. A missing
/// explicit file, or a file that fails to parse, is a configuration error.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(p) => {
            if !p.exists() {
                return Err(Error::Config(format!("Config file not found: {}", p.display())));
            }
            p.to_path_buf()
        }
        None => match default_config_file() {
            Some(p) => p,
            None => return Ok(TomlConfig::default()),
        },
    };

    let content = std::fs::read_to_string(&path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML {} failed: {}", path.display(), e)))
}

/// Write TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, target: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = target.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp, target)?;
    Ok(())
}

/// Resolve the root folder (CLI → ENV → TOML → OS default)
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    get_default_root_folder()
}

/// Resolve the taxonomy definition path (CLI → ENV → TOML → `<root>/categories.json`)
pub fn resolve_taxonomy_path(
    cli_arg: Option<&Path>,
    toml_config: &TomlConfig,
    root_folder: &Path,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(TAXONOMY_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.taxonomy_path {
        return path.clone();
    }

    root_folder.join(DEFAULT_TAXONOMY_FILE)
}

/// Database file location inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE)
}

/// User-Agent header used by outbound HTTP clients
pub fn get_user_agent() -> String {
    format!("mealtax/{}", env!("CARGO_PKG_VERSION"))
}

/// Platform config file path, if one exists on disk
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("mealtax").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/mealtax/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Path where `set-api-key` writes the TOML backup
pub fn user_config_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("mealtax").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("mealtax"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/mealtax"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("mealtax"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/mealtax"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("mealtax"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\mealtax"))
    } else {
        PathBuf::from("./mealtax_data")
    }
}
