//! Part and stored-file descriptors

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Media type assumed for file parts that declare none.
pub const DEFAULT_FILE_CONTENT_TYPE: &str = "application/octet-stream";

/// Transfer encoding assumed when a part carries no `Content-Transfer-Encoding`.
pub const DEFAULT_ENCODING: &str = "7bit";

/// Metadata of a single multipart part, fixed once the part begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartMetadata {
    /// Form field name the part was sent under.
    pub field_name: String,
    /// Client supplied filename. May be empty.
    pub file_name: String,
    /// Declared `Content-Transfer-Encoding`.
    pub encoding: String,
    /// Declared media type.
    pub content_type: String,
}

impl PartMetadata {
    pub fn new(field_name: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            file_name: file_name.into(),
            encoding: DEFAULT_ENCODING.to_string(),
            content_type: DEFAULT_FILE_CONTENT_TYPE.to_string(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Extension of the client filename, without the leading dot.
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
    }
}

/// Where a storage engine put the bytes of a file part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "storage", rename_all = "snake_case")]
pub enum Location {
    /// Held in a single contiguous buffer.
    Memory {
        #[serde(skip)]
        buffer: Bytes,
        size: u64,
    },
    /// Written to the local filesystem.
    Disk {
        destination: PathBuf,
        filename: String,
        path: PathBuf,
        size: u64,
    },
    /// Forwarded to a remote socket.
    Relay {
        host: String,
        port: u16,
        bytes_transferred: u64,
    },
}

impl Location {
    /// Number of bytes the engine accepted for the part.
    pub fn size(&self) -> u64 {
        match self {
            Location::Memory { size, .. } | Location::Disk { size, .. } => *size,
            Location::Relay {
                bytes_transferred, ..
            } => *bytes_transferred,
        }
    }
}

/// Descriptor produced once per successfully stored file part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    #[serde(flatten)]
    pub metadata: PartMetadata,
    #[serde(flatten)]
    pub location: Location,
}

impl StoredFile {
    pub fn new(metadata: PartMetadata, location: Location) -> Self {
        Self { metadata, location }
    }

    pub fn size(&self) -> u64 {
        self.location.size()
    }

    /// In-memory contents, when stored by the memory engine.
    pub fn buffer(&self) -> Option<&Bytes> {
        match &self.location {
            Location::Memory { buffer, .. } => Some(buffer),
            _ => None,
        }
    }

    /// Filesystem path, when stored by the disk engine.
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            Location::Disk { path, .. } => Some(path),
            _ => None,
        }
    }
}
