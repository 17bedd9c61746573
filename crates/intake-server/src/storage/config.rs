use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf, time::Duration};

use crate::error::{IngestError, IngestResult};

/// Default directory for the disk engine.
pub const DEFAULT_UPLOAD_DIR: &str = "./uploads";

/// Default relay host.
pub const DEFAULT_RELAY_HOST: &str = "localhost";

/// Default relay port.
pub const DEFAULT_RELAY_PORT: u16 = 9999;

/// Default relay connect timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Default relay transfer timeout in milliseconds.
pub const DEFAULT_TRANSFER_TIMEOUT_MS: u64 = 30_000;

/// Which engine stores file parts, and how it is set up
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "lowercase")]
pub enum StorageConfig {
    #[default]
    Memory,
    Disk(DiskConfig),
    Relay(RelayConfig),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    pub destination: PathBuf,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            destination: PathBuf::from(DEFAULT_UPLOAD_DIR),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    #[serde(alias = "connectTimeout")]
    pub connect_timeout_ms: u64,
    #[serde(alias = "transferTimeout")]
    pub transfer_timeout_ms: u64,
}

impl RelayConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RELAY_HOST.to_string(),
            port: DEFAULT_RELAY_PORT,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            transfer_timeout_ms: DEFAULT_TRANSFER_TIMEOUT_MS,
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let engine = env::var("INTAKE_STORAGE").unwrap_or_else(|_| "memory".to_string());

        let config = match engine.to_lowercase().as_str() {
            "memory" => StorageConfig::Memory,
            "disk" => StorageConfig::Disk(DiskConfig {
                destination: env::var("INTAKE_UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            }),
            "relay" => StorageConfig::Relay(RelayConfig {
                host: env::var("INTAKE_RELAY_HOST")
                    .unwrap_or_else(|_| DEFAULT_RELAY_HOST.to_string()),
                port: env::var("INTAKE_RELAY_PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_RELAY_PORT),
                connect_timeout_ms: env::var("INTAKE_RELAY_CONNECT_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
                transfer_timeout_ms: env::var("INTAKE_RELAY_TRANSFER_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_TRANSFER_TIMEOUT_MS),
            }),
            other => anyhow::bail!("Unknown storage engine: {} (expected memory, disk or relay)", other),
        };

        Ok(config)
    }

    pub fn engine_name(&self) -> &'static str {
        match self {
            StorageConfig::Memory => "memory",
            StorageConfig::Disk(_) => "disk",
            StorageConfig::Relay(_) => "relay",
        }
    }

    /// Reject settings no engine could run with.
    pub fn validate(&self) -> IngestResult<()> {
        match self {
            StorageConfig::Memory => {},
            StorageConfig::Disk(disk) => {
                if disk.destination.as_os_str().is_empty() {
                    return Err(IngestError::configuration(
                        "storage.destination",
                        "cannot be empty",
                    ));
                }
            },
            StorageConfig::Relay(relay) => {
                if relay.host.is_empty() {
                    return Err(IngestError::configuration("storage.host", "cannot be empty"));
                }
                if relay.port == 0 {
                    return Err(IngestError::configuration(
                        "storage.port",
                        "must be greater than 0",
                    ));
                }
                if relay.connect_timeout_ms == 0 {
                    return Err(IngestError::configuration(
                        "storage.connect_timeout_ms",
                        "must be greater than 0",
                    ));
                }
                if relay.transfer_timeout_ms == 0 {
                    return Err(IngestError::configuration(
                        "storage.transfer_timeout_ms",
                        "must be greater than 0",
                    ));
                }
            },
        }
        Ok(())
    }
}
