//! Storage engines
//!
//! An engine receives each accepted file part exactly once, consumes its
//! stream, and reports where the bytes went. Three engines are provided:
//!
//! - [`MemoryStorage`] buffers the part in memory
//! - [`DiskStorage`] writes it under a resolved directory
//! - [`RelayStorage`] forwards it over a fresh TCP connection

use async_trait::async_trait;
use intake_common::StoredFile;
use std::{fmt, sync::Arc};
use tracing::info;

use crate::{
    error::IngestResult,
    ingest::{part::FilePart, RequestContext},
};

pub mod config;
pub mod disk;
pub mod memory;
pub mod relay;

pub use config::{DiskConfig, RelayConfig, StorageConfig};
pub use disk::{DiskStorage, DiskStorageBuilder};
pub use memory::MemoryStorage;
pub use relay::RelayStorage;

#[async_trait]
pub trait StorageEngine: Send + Sync + fmt::Debug {
    /// Consume `part` and describe where it was stored.
    ///
    /// The stream is read by this call only. On failure any partial artifact
    /// is cleaned up before returning.
    async fn store(&self, ctx: &RequestContext, part: FilePart) -> IngestResult<StoredFile>;

    /// Undo a previous successful [`store`](StorageEngine::store).
    async fn discard(&self, ctx: &RequestContext, file: &StoredFile) -> IngestResult<()>;
}

/// Build the engine described by `config`.
pub fn from_config(config: &StorageConfig) -> Arc<dyn StorageEngine> {
    info!(engine = config.engine_name(), "Initializing storage engine");

    match config {
        StorageConfig::Memory => Arc::new(MemoryStorage::new()),
        StorageConfig::Disk(disk) => Arc::new(DiskStorage::new(disk.destination.clone())),
        StorageConfig::Relay(relay) => Arc::new(RelayStorage::new(relay.clone())),
    }
}
