//! Multipart ingestion
//!
//! [`Ingestor::process`] takes a request, and when it carries a
//! `multipart/form-data` body, streams every part out of it: text fields
//! are collected, file parts are checked against the optional
//! [`FileFilter`] and handed to the configured
//! [`StorageEngine`](crate::storage::StorageEngine). The result is one
//! [`Upload`] or one [`IngestError`], never both.
//!
//! ```ignore
//! let ingestor = Ingestor::builder()
//!     .limits(Limits::none().file_size(1024 * 1024))
//!     .storage(DiskStorage::new("./uploads"))
//!     .build()?;
//!
//! match ingestor.process(request).await? {
//!     Processed::Ingested { upload, .. } => println!("{} files", upload.file_count()),
//!     Processed::PassThrough(request) => forward(request).await,
//! }
//! ```

use axum::body::Body;
use http::{request, HeaderMap, Method, Request, Uri};
use std::{fmt, sync::Arc};
use tracing::{debug, instrument};

use crate::{
    config::IngestConfig,
    error::{IngestError, IngestResult},
    storage::{self, MemoryStorage, StorageEngine},
};

pub mod filter;
pub mod limits;
mod orchestrator;
pub mod part;
pub mod source;
pub mod upload;

pub use filter::{filter_fn, ExtensionFilter, FileFilter, FilterDecision, FilterPreset, MimeFilter};
pub use limits::Limits;
pub use part::FilePart;
pub use source::{MulterSource, PartEvent, PartSource, SourceError};
pub use upload::Upload;

/// Request data visible to filters and storage resolvers
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RequestContext {
    pub fn from_parts(parts: &request::Parts) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
        }
    }
}

/// What [`Ingestor::process`] did with a request
#[derive(Debug)]
pub enum Processed {
    /// Not multipart; the request is returned with its body unread.
    PassThrough(Request<Body>),
    /// The body was consumed. `parts` is everything but the body.
    Ingested {
        parts: request::Parts,
        upload: Upload,
    },
}

/// Immutable, shareable ingestion pipeline
#[derive(Clone)]
pub struct Ingestor {
    limits: Limits,
    filter: Option<Arc<dyn FileFilter>>,
    storage: Arc<dyn StorageEngine>,
}

impl Ingestor {
    pub fn builder() -> IngestorBuilder {
        IngestorBuilder::default()
    }

    /// Build an ingestor from declarative configuration.
    pub fn from_config(config: &IngestConfig) -> IngestResult<Self> {
        config.validate()?;

        let mut builder = Self::builder()
            .limits(config.limits)
            .shared_storage(storage::from_config(&config.storage));
        if let Some(filter) = config.file_filter.and_then(|preset| preset.build()) {
            builder = builder.shared_filter(filter);
        }
        builder.build()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn storage(&self) -> &Arc<dyn StorageEngine> {
        &self.storage
    }

    /// Consume a multipart request body, or hand a non-multipart request back untouched.
    #[instrument(skip_all, fields(method = %request.method(), uri = %request.uri()))]
    pub async fn process(&self, request: Request<Body>) -> IngestResult<Processed> {
        let boundary = match source::multipart_boundary(request.headers()) {
            Some(boundary) => boundary?,
            None => {
                debug!("Not a multipart request, passing through");
                return Ok(Processed::PassThrough(request));
            },
        };

        let (parts, body) = request.into_parts();
        let ctx = RequestContext::from_parts(&parts);
        let mut source = MulterSource::new(body.into_data_stream(), boundary, &self.limits);

        let upload = self.ingest(&ctx, &mut source).await?;
        Ok(Processed::Ingested { parts, upload })
    }

    /// Run the ingestion state machine over any part source.
    pub async fn ingest<S>(&self, ctx: &RequestContext, source: &mut S) -> IngestResult<Upload>
    where
        S: PartSource + ?Sized,
    {
        orchestrator::Run::new(
            ctx,
            &self.limits,
            self.filter.as_deref(),
            self.storage.as_ref(),
        )
        .execute(source)
        .await
    }
}

impl fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ingestor")
            .field("limits", &self.limits)
            .field("filter", &self.filter.is_some())
            .field("storage", &self.storage)
            .finish()
    }
}

/// Builder for [`Ingestor`]. Without an explicit engine, files are kept in memory.
#[derive(Default)]
pub struct IngestorBuilder {
    limits: Limits,
    filter: Option<Arc<dyn FileFilter>>,
    storage: Option<Arc<dyn StorageEngine>>,
}

impl IngestorBuilder {
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn file_filter(self, filter: impl FileFilter + 'static) -> Self {
        self.shared_filter(Arc::new(filter))
    }

    pub fn shared_filter(mut self, filter: Arc<dyn FileFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn storage(self, storage: impl StorageEngine + 'static) -> Self {
        self.shared_storage(Arc::new(storage))
    }

    pub fn shared_storage(mut self, storage: Arc<dyn StorageEngine>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn build(self) -> Result<Ingestor, IngestError> {
        self.limits.validate()?;

        Ok(Ingestor {
            limits: self.limits,
            filter: self.filter,
            storage: self
                .storage
                .unwrap_or_else(|| Arc::new(MemoryStorage::new())),
        })
    }
}
