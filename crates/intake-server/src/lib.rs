//! Intake Server Library
//!
//! Request-time ingestion of `multipart/form-data` uploads.
//!
//! # Overview
//!
//! - **Ingestion**: [`ingest::Ingestor`] streams each part out of a request
//!   body, applies limits and an optional file filter, and produces one
//!   [`ingest::Upload`] or one [`IngestError`]
//! - **Storage Engines**: memory, disk and TCP relay behind the
//!   [`storage::StorageEngine`] trait
//! - **Middleware**: [`middleware::IngestLayer`] runs ingestion ahead of axum
//!   handlers and attaches the upload to the request
//! - **Configuration**: environment-based, see [`config::Config`]
//!
//! # Example
//!
//! ```no_run
//! use intake_server::{config::Config, ingest::Ingestor};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let ingestor = Arc::new(Ingestor::from_config(&config.ingest)?);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//!     axum::serve(listener, intake_server::app(ingestor)).await?;
//!     Ok(())
//! }
//! ```

use axum::Router;
use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod middleware;
pub mod storage;

// Re-export commonly used types
pub use error::{IngestError, IngestResult, StorageError, StorageErrorKind};
pub use ingest::{Ingestor, Processed, Upload};

/// Demo application with request tracing
pub fn app(ingestor: Arc<Ingestor>) -> Router {
    api::router(ingestor).layer(middleware::tracing_layer())
}
