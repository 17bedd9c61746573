use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use intake_common::{Location, StoredFile};
use tracing::{debug, instrument};

use super::StorageEngine;
use crate::{
    error::{IngestResult, StorageError, StorageErrorKind},
    ingest::{part::FilePart, RequestContext},
};

/// Buffers each part into a single contiguous allocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStorage;

impl MemoryStorage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StorageEngine for MemoryStorage {
    #[instrument(skip_all, fields(field = %part.metadata().field_name, file = %part.metadata().file_name))]
    async fn store(&self, _ctx: &RequestContext, part: FilePart) -> IngestResult<StoredFile> {
        let (metadata, mut stream) = part.into_parts();
        let mut buffer = BytesMut::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                StorageError::new(StorageErrorKind::Memory, "Failed to buffer file in memory")
                    .with_filename(metadata.file_name.clone())
                    .with_cause(e)
            })?;
            buffer.extend_from_slice(&chunk);
        }

        let size = buffer.len() as u64;
        debug!(size, "Buffered file in memory");

        Ok(StoredFile::new(
            metadata,
            Location::Memory {
                buffer: buffer.freeze(),
                size,
            },
        ))
    }

    async fn discard(&self, _ctx: &RequestContext, file: &StoredFile) -> IngestResult<()> {
        debug!(file = %file.metadata.file_name, "Released in-memory file");
        Ok(())
    }
}
