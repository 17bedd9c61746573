//! Disk storage engine

use async_trait::async_trait;
use futures::StreamExt;
use intake_common::{Location, PartMetadata, StoredFile};
use std::{
    fmt, io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{config::DEFAULT_UPLOAD_DIR, StorageEngine};
use crate::{
    error::{IngestError, IngestResult, StorageError, StorageErrorKind},
    ingest::{
        part::{drain, FilePart},
        RequestContext,
    },
};

/// Resolves the directory a part is written into
pub type DestinationFn = Arc<dyn Fn(&RequestContext, &PartMetadata) -> PathBuf + Send + Sync>;

/// Resolves the name of the file a part is written to
pub type FilenameFn = Arc<dyn Fn(&RequestContext, &PartMetadata) -> String + Send + Sync>;

/// Writes each part to `<destination>/<filename>`.
///
/// The destination directory is created on demand (recursively, tolerating
/// concurrent creation). A part that fails mid-write leaves no file behind.
#[derive(Clone)]
pub struct DiskStorage {
    destination: DestinationFn,
    filename: FilenameFn,
}

impl DiskStorage {
    /// Store every part under a fixed directory with random filenames.
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self::builder().destination(destination).build()
    }

    pub fn builder() -> DiskStorageBuilder {
        DiskStorageBuilder::default()
    }
}

impl fmt::Debug for DiskStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskStorage").finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct DiskStorageBuilder {
    destination: Option<DestinationFn>,
    filename: Option<FilenameFn>,
}

impl DiskStorageBuilder {
    pub fn destination(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.destination = Some(Arc::new(move |_: &RequestContext, _: &PartMetadata| {
            path.clone()
        }));
        self
    }

    pub fn destination_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, &PartMetadata) -> PathBuf + Send + Sync + 'static,
    {
        self.destination = Some(Arc::new(f));
        self
    }

    pub fn filename_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, &PartMetadata) -> String + Send + Sync + 'static,
    {
        self.filename = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> DiskStorage {
        DiskStorage {
            destination: self
                .destination
                .unwrap_or_else(|| {
                    Arc::new(|_: &RequestContext, _: &PartMetadata| PathBuf::from(DEFAULT_UPLOAD_DIR))
                }),
            filename: self.filename.unwrap_or_else(|| Arc::new(random_filename)),
        }
    }
}

/// 32 random hex digits followed by the client file's extension, if any.
pub fn random_filename(_ctx: &RequestContext, metadata: &PartMetadata) -> String {
    let stem = Uuid::new_v4().simple().to_string();
    match metadata.extension() {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

fn disk_error(metadata: &PartMetadata, message: &str, cause: io::Error) -> IngestError {
    StorageError::new(StorageErrorKind::Disk, message)
        .with_filename(metadata.file_name.clone())
        .with_cause(cause)
        .into()
}

/// Removes a file on drop unless it was kept.
struct PartialFile {
    path: Option<PathBuf>,
}

impl PartialFile {
    fn new(path: &Path) -> Self {
        Self {
            path: Some(path.to_path_buf()),
        }
    }

    fn keep(mut self) {
        self.path = None;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Removed partial file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {},
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial file"),
            }
        }
    }
}

#[async_trait]
impl StorageEngine for DiskStorage {
    #[instrument(skip_all, fields(field = %part.metadata().field_name, file = %part.metadata().file_name))]
    async fn store(&self, ctx: &RequestContext, part: FilePart) -> IngestResult<StoredFile> {
        let (metadata, mut stream) = part.into_parts();

        let destination = (self.destination)(ctx, &metadata);
        let (created, filename) = tokio::join!(fs::create_dir_all(&destination), async {
            (self.filename)(ctx, &metadata)
        });

        if let Err(cause) = created {
            drain(&mut stream).await;
            return Err(IngestError::DirectoryCreation {
                path: destination,
                cause,
            });
        }

        let path = destination.join(&filename);
        let partial = PartialFile::new(&path);

        let mut file = match OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) => {
                drain(&mut stream).await;
                return Err(disk_error(&metadata, "Failed to write file to disk", e));
            },
        };

        let mut size = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| disk_error(&metadata, "Failed to read file stream", e))?;

            if let Err(e) = file.write_all(&chunk).await {
                drain(&mut stream).await;
                return Err(disk_error(&metadata, "Failed to write file to disk", e));
            }
            size += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| disk_error(&metadata, "Failed to write file to disk", e))?;
        drop(file);
        partial.keep();

        debug!(path = %path.display(), size, "Wrote file to disk");

        Ok(StoredFile::new(
            metadata,
            Location::Disk {
                destination,
                filename,
                path,
                size,
            },
        ))
    }

    async fn discard(&self, _ctx: &RequestContext, file: &StoredFile) -> IngestResult<()> {
        let Some(path) = file.path() else {
            debug!(file = %file.metadata.file_name, "Nothing on disk to discard");
            return Ok(());
        };

        match fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted stored file");
                Ok(())
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::new(
                StorageErrorKind::Deletion,
                "Failed to delete file from disk",
            )
            .with_filename(file.metadata.file_name.clone())
            .with_cause(e)
            .into()),
        }
    }
}
