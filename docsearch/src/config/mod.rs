//! Configuration management for docsearch
//!
//! Default config location: ~/.docsearch/config.toml

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default)]
    pub index: IndexSettings,
    #[serde(default)]
    pub aggregations: AggregationsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ElasticsearchConfig {
    #[serde(default = "default_url")]
    pub url: String,
    /// Whole-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Ceiling on a single response body (default: 250MB)
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_max_response_bytes() -> usize {
    250 * 1024 * 1024 // 250MB
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

/// Settings applied when an index is created
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexSettings {
    #[serde(default = "default_shards")]
    pub shards: u32,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    /// Raw index settings JSON; shard and replica counts are merged over it
    #[serde(default = "default_settings")]
    pub settings: String,
    /// Directory holding `<index>.json` mapping files
    #[serde(default)]
    pub mapping_dir: Option<PathBuf>,
}

fn default_shards() -> u32 {
    5
}

fn default_replicas() -> u32 {
    1
}

fn default_settings() -> String {
    "{}".to_string()
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            shards: default_shards(),
            replicas: default_replicas(),
            settings: default_settings(),
            mapping_dir: None,
        }
    }
}

impl IndexSettings {
    /// Create-index body: raw settings with shard and replica counts merged in.
    ///
    /// The raw settings may be the bare settings object or wrapped in
    /// `{"settings": {...}}`; other top-level keys (e.g. `mappings`) are kept.
    pub fn create_body(&self) -> Result<Value> {
        let raw = if self.settings.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str::<Value>(&self.settings)
                .map_err(|e| Error::Config(format!("Invalid index settings JSON: {e}")))?
        };
        let Value::Object(mut body) = raw else {
            return Err(Error::Config(
                "Index settings must be a JSON object".to_string(),
            ));
        };

        let mut settings = match body.remove("settings") {
            Some(Value::Object(s)) => s,
            Some(_) => {
                return Err(Error::Config(
                    "Index settings 'settings' entry must be an object".to_string(),
                ))
            }
            None => {
                // Bare settings object: everything except known body sections
                let keep = ["mappings", "aliases"];
                let (sections, settings): (Vec<_>, Vec<_>) = std::mem::take(&mut body)
                    .into_iter()
                    .partition(|(k, _)| keep.contains(&k.as_str()));
                body.extend(sections);
                settings.into_iter().collect()
            }
        };

        settings.insert("number_of_shards".to_string(), self.shards.into());
        settings.insert("number_of_replicas".to_string(), self.replicas.into());
        body.insert("settings".to_string(), Value::Object(settings));
        Ok(Value::Object(body))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AggregationsConfig {
    /// Active locales for localized aggregations
    #[serde(default)]
    pub locales: Vec<String>,
    /// Terms `min_doc_count`; negative leaves it to the engine default
    #[serde(default)]
    pub min_doc_count: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level filter string
    /// Override with RUST_LOG env var
    #[serde(default = "default_level")]
    pub level: String,
    /// Log output format: "pretty" or "json"
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

/// Default data directory (~/.docsearch)
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docsearch")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Config {
    /// Load config from a file path
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", config_path.display(), e)))?;
        config.expand_paths()?;
        Ok(config)
    }

    /// Load config from file path, or create default
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load(config_path)
        } else {
            let config = Config::default();
            // Unwritable location: run on defaults
            if let Err(e) = config.save(config_path) {
                warn!(
                    "Failed to write default config to {} - {}",
                    config_path.display(),
                    e
                );
            }
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Expand ~ in all paths
    fn expand_paths(&mut self) -> Result<()> {
        if let Some(ref dir) = self.index.mapping_dir {
            self.index.mapping_dir = Some(expand_tilde(dir)?);
        }
        Ok(())
    }
}
