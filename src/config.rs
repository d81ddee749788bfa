//! Configuration for hosting the engine.
//!
//! Loads engine and ingest settings from a TOML file with environment
//! variable substitution, and loads ruleset snapshot files (the JSON the
//! admin surface exports; how snapshots are stored upstream is out of scope
//! here).
//!
//! # Example
//!
//! ```toml
//! [engine]
//! on_missing_resolver = "skip"   # or "fail"
//! dispatch_timeout_ms = 10000
//!
//! [ingest]
//! api_url = "https://collect.tagsoft.io"
//! api_key = "${TAGSOFT_API_KEY}"
//! ```

use crate::executor::{ExecutorOptions, MissingResolverPolicy};
use crate::ruleset::ContainerVersionSnapshot;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to parse snapshot JSON: {0}")]
    ParseSnapshot(#[from] serde_json::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TagsoftConfig {
    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub ingest: IngestSettings,
}

/// Engine execution settings
#[derive(Debug, Deserialize, Clone)]
pub struct EngineSettings {
    #[serde(default)]
    pub on_missing_resolver: MissingResolverPolicy,

    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            on_missing_resolver: MissingResolverPolicy::default(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
        }
    }
}

fn default_dispatch_timeout_ms() -> u64 {
    10000
}

/// Ingest endpoint settings for the SDKs
#[derive(Debug, Deserialize, Clone, Default)]
pub struct IngestSettings {
    #[serde(default)]
    pub api_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,
}

impl TagsoftConfig {
    /// Load configuration from the default path or the `TAGSOFT_CONFIG`
    /// environment variable.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            env::var("TAGSOFT_CONFIG").unwrap_or_else(|_| "config/tagsoft.toml".to_string());
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path. A missing file yields the
    /// defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path)?;
        let content = substitute_env_vars(&content);

        debug!("Parsing TOML configuration");
        let config: TagsoftConfig = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.dispatch_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "engine.dispatch_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if let Some(url) = &self.ingest.api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "ingest.api_url must start with http:// or https:// (got '{url}')"
                )));
            }
        }

        Ok(())
    }

    /// The executor options this configuration describes.
    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            on_missing_resolver: self.engine.on_missing_resolver,
            dispatch_timeout: Duration::from_millis(self.engine.dispatch_timeout_ms),
        }
    }
}

/// Load a ruleset snapshot from a JSON file.
pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<ContainerVersionSnapshot, ConfigError> {
    let path = path.as_ref();
    info!(path = %path.display(), "Loading ruleset snapshot");
    let content = fs::read_to_string(path)?;
    let snapshot: ContainerVersionSnapshot = serde_json::from_str(&content)?;
    info!(
        version = snapshot.version,
        triggers = snapshot.triggers.len(),
        tags = snapshot.tags.len(),
        "Snapshot loaded"
    );
    Ok(snapshot)
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                debug!(var = %var_name, "Environment variable not set, keeping placeholder");
                caps[0].to_string()
            }
        }
    })
    .to_string()
}
