//! Configuration Loader
//!
//! Layers built-in defaults, an optional file named by `INDEXER_CONFIG_FILE`
//! and the process environment into [`IndexerSettings`].

use super::IndexerSettings;
use crate::constants::{defaults, settings};
use crate::error::{IndexerError, Result};
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Loads indexer settings from every configured source
pub struct ConfigManager;

impl ConfigManager {
    /// Load from the process environment, plus the file named by
    /// `INDEXER_CONFIG_FILE` when set
    pub fn load() -> Result<IndexerSettings> {
        let file = env::var(settings::CONFIG_FILE).ok().map(PathBuf::from);
        Self::load_from(file.as_deref(), None)
    }

    /// Load with an explicit file and an explicit environment map.
    ///
    /// Passing `Some(map)` replaces the process environment, which keeps
    /// tests independent of the host.
    pub fn load_from(
        file: Option<&Path>,
        environment: Option<HashMap<String, String>>,
    ) -> Result<IndexerSettings> {
        let mut builder = Config::builder()
            .set_default(
                "blob_amount_parallel",
                defaults::BLOB_AMOUNT_PARALLEL as i64,
            )
            .and_then(|b| b.set_default("search_index_name", defaults::SEARCH_INDEX_NAME))
            .and_then(|b| {
                b.set_default(
                    "max_number_of_attempts",
                    defaults::MAX_NUMBER_OF_ATTEMPTS as i64,
                )
            })
            .map_err(Self::config_error)?;

        if let Some(path) = file {
            debug!("Reading indexer configuration file: {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        let env_source = Environment::default().try_parsing(true);
        let env_source = match environment {
            Some(map) => env_source.source(Some(map.into_iter().collect())),
            None => env_source,
        };

        let loaded = builder
            .add_source(env_source)
            .build()
            .map_err(Self::config_error)?;
        let parsed: IndexerSettings = loaded.try_deserialize().map_err(Self::config_error)?;

        parsed.validate()?;

        debug!(
            "Configuration loaded: {}",
            serde_json::to_string(&Self::sanitize_for_logging(&parsed))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );
        info!(
            environment = %crate::logging::get_environment(),
            container = parsed.blob_container_name.as_deref().unwrap_or("<unset>"),
            parallel = ?parsed.blob_amount_parallel,
            "Indexer configuration loaded"
        );

        Ok(parsed)
    }

    /// JSON view of the settings with credential-like fields masked
    pub fn sanitize_for_logging(settings: &IndexerSettings) -> serde_json::Value {
        let mut value = serde_json::json!(settings);
        Self::sanitize_json_recursive(&mut value, &["password", "secret", "key", "token"]);
        if let Some(url) = value.get_mut("database_url") {
            if url.is_string() {
                *url = serde_json::Value::String("[MASKED]".to_string());
            }
        }
        value
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive {
                        if let serde_json::Value::String(s) = val {
                            let masked = if s.chars().count() > 4 {
                                let head: String = s.chars().take(2).collect();
                                format!("[MASKED: {head}***]")
                            } else {
                                "[MASKED]".to_string()
                            };
                            *val = serde_json::Value::String(masked);
                        }
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }

    fn config_error(err: config::ConfigError) -> IndexerError {
        IndexerError::configuration(err.to_string())
    }
}
