//! Configuration management

use anyhow::Context;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{env, str::FromStr};

use crate::{
    error::{IngestError, IngestResult},
    ingest::{FilterPreset, Limits},
    storage::StorageConfig,
};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub ingest: IngestConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: env::var("INTAKE_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env::var("INTAKE_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env::var("INTAKE_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            ingest: IngestConfig::from_env()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }

        self.ingest.validate()?;

        Ok(())
    }
}

/// Declarative description of an [`Ingestor`](crate::ingest::Ingestor)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub limits: Limits,
    #[serde(alias = "fileFilter")]
    pub file_filter: Option<FilterPreset>,
    pub storage: StorageConfig,
}

impl IngestConfig {
    /// Read ingestion settings from `INTAKE_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let limits = Limits {
            file_size: env_parse("INTAKE_LIMIT_FILE_SIZE")?,
            field_size: env_parse("INTAKE_LIMIT_FIELD_SIZE")?,
            files: env_parse("INTAKE_LIMIT_FILES")?,
            fields: env_parse("INTAKE_LIMIT_FIELDS")?,
            parts: env_parse("INTAKE_LIMIT_PARTS")?,
        };

        let file_filter = match env::var("INTAKE_FILE_FILTER") {
            Ok(name) => Some(FilterPreset::from_str(&name).map_err(anyhow::Error::msg)?),
            Err(_) => None,
        };

        Ok(Self {
            limits,
            file_filter,
            storage: StorageConfig::from_env()?,
        })
    }

    /// Parse loosely typed options, naming the offending option on failure.
    ///
    /// `storage` may be given as a bare engine name (`"disk"`) or as an
    /// object with an `engine` key. Unknown keys are ignored.
    pub fn from_value(value: Value) -> IngestResult<Self> {
        let Value::Object(mut options) = value else {
            return Err(IngestError::configuration("options", "must be an object"));
        };
        options.retain(|_, v| !v.is_null());

        if options.get("limits").is_some_and(|limits| !limits.is_object()) {
            return Err(IngestError::configuration("limits", "must be an object"));
        }

        for key in ["fileFilter", "file_filter"] {
            match options.get_mut(key) {
                None => {},
                Some(Value::String(name)) => {
                    FilterPreset::from_str(name)
                        .map_err(|message| IngestError::configuration(key, message))?;
                    *name = name.to_lowercase();
                },
                Some(_) => {
                    return Err(IngestError::configuration(
                        key,
                        "must be the name of a file filter",
                    ))
                },
            }
        }

        match options.get_mut("storage") {
            None => {},
            Some(Value::String(engine)) => {
                let engine = engine.to_lowercase();
                options.insert("storage".to_string(), serde_json::json!({ "engine": engine }));
            },
            Some(Value::Object(storage)) if storage.contains_key("engine") => {},
            Some(_) => {
                return Err(IngestError::configuration(
                    "storage",
                    "must be an engine name or an object with an `engine` key",
                ))
            },
        }

        let camel: Option<FilterPreset> = option(&mut options, "fileFilter")?;
        let snake: Option<FilterPreset> = option(&mut options, "file_filter")?;
        let config = Self {
            limits: option(&mut options, "limits")?,
            file_filter: camel.or(snake),
            storage: option(&mut options, "storage")?,
        };
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> IngestResult<()> {
        self.limits.validate()?;
        self.storage.validate()
    }
}

fn option<T>(options: &mut Map<String, Value>, key: &str) -> IngestResult<T>
where
    T: DeserializeOwned + Default,
{
    match options.remove(key) {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| IngestError::configuration(key, e.to_string())),
        None => Ok(T::default()),
    }
}

fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RelayConfig;
    use serde_json::json;
    use serial_test::serial;

    #[test]
    fn test_from_value_full() {
        let config = IngestConfig::from_value(json!({
            "limits": { "fileSize": 1024, "files": 2 },
            "fileFilter": "Images",
            "storage": { "engine": "relay", "host": "relay.internal", "port": 7000 },
            "preservePath": true
        }))
        .unwrap();

        assert_eq!(config.limits.file_size, Some(1024));
        assert_eq!(config.limits.files, Some(2));
        assert_eq!(config.file_filter, Some(FilterPreset::Images));
        assert_eq!(
            config.storage,
            StorageConfig::Relay(RelayConfig::new("relay.internal", 7000))
        );
    }

    #[test]
    fn test_from_value_snake_case_filter() {
        let config = IngestConfig::from_value(json!({ "file_filter": "documents" })).unwrap();
        assert_eq!(config.file_filter, Some(FilterPreset::Documents));

        let config =
            IngestConfig::from_value(json!({ "fileFilter": "images", "file_filter": "none" }))
                .unwrap();
        assert_eq!(config.file_filter, Some(FilterPreset::Images));
    }

    #[test]
    fn test_from_value_engine_name() {
        let config = IngestConfig::from_value(json!({ "storage": "Disk" })).unwrap();
        assert!(matches!(config.storage, StorageConfig::Disk(_)));

        let config = IngestConfig::from_value(json!({})).unwrap();
        assert_eq!(config, IngestConfig::default());
    }

    #[test]
    fn test_from_value_rejects_bad_shapes() {
        let cases = [
            (json!({ "limits": 5 }), "limits"),
            (json!({ "fileFilter": true }), "fileFilter"),
            (json!({ "fileFilter": "everything" }), "fileFilter"),
            (json!({ "storage": 3 }), "storage"),
            (json!({ "storage": { "host": "x" } }), "storage"),
            (json!({ "storage": "s3" }), "storage"),
            (json!({ "limits": { "fileSize": 0 } }), "limits.file_size"),
            (json!("memory"), "options"),
        ];

        for (value, option) in cases {
            match IngestConfig::from_value(value.clone()) {
                Err(IngestError::Configuration { option: got, .. }) => {
                    assert_eq!(got, option, "for {}", value)
                },
                other => panic!("expected configuration error for {}, got {:?}", value, other),
            }
        }
    }

    #[test]
    #[serial]
    fn test_load_from_env() {
        env::set_var("INTAKE_PORT", "9100");
        env::set_var("INTAKE_LIMIT_FILE_SIZE", "2048");
        env::set_var("INTAKE_FILE_FILTER", "images");

        let config = Config::load().unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.ingest.limits.file_size, Some(2048));
        assert_eq!(config.ingest.file_filter, Some(FilterPreset::Images));

        env::set_var("INTAKE_LIMIT_FILE_SIZE", "lots");
        assert!(Config::load().is_err());

        env::remove_var("INTAKE_PORT");
        env::remove_var("INTAKE_LIMIT_FILE_SIZE");
        env::remove_var("INTAKE_FILE_FILTER");
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());
        config.server.port = 0;
        assert!(config.validate().is_err());
    }
}
