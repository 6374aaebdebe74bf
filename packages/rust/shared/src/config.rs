//! Application configuration for BioKB Enrich.
//!
//! User config lives at `~/.biokb/biokb.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BioKbError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "biokb.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".biokb";

// ---------------------------------------------------------------------------
// Config structs (matching biokb.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Query defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the BiomarkerKB API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout in seconds for list-creation requests.
    #[serde(default = "default_create_timeout")]
    pub create_timeout_secs: u64,

    /// Timeout in seconds for list-download requests (payloads can be large).
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            create_timeout_secs: default_create_timeout(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.biomarkerkb.org".into()
}
fn default_create_timeout() -> u64 {
    60
}
fn default_download_timeout() -> u64 {
    300
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Starting page-size hint for single-entity lookups.
    #[serde(default = "default_entity_size")]
    pub entity_initial_size: u64,

    /// Starting page-size hint for broad record-type/specimen scans.
    #[serde(default = "default_scan_size")]
    pub scan_initial_size: u64,

    /// Upper bound on size-escalation rounds per query.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            entity_initial_size: default_entity_size(),
            scan_initial_size: default_scan_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_entity_size() -> u64 {
    10_000
}
fn default_scan_size() -> u64 {
    50_000
}
fn default_max_attempts() -> u32 {
    4
}

// ---------------------------------------------------------------------------
// Fetch config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime client configuration — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Base URL of the BiomarkerKB API.
    pub base_url: String,
    /// Timeout for list-creation requests.
    pub create_timeout: Duration,
    /// Timeout for list-download requests.
    pub download_timeout: Duration,
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.api.base_url.clone(),
            create_timeout: Duration::from_secs(config.api.create_timeout_secs),
            download_timeout: Duration::from_secs(config.api.download_timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.biokb/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BioKbError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.biokb/biokb.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BioKbError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| BioKbError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BioKbError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BioKbError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BioKbError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
