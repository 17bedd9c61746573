//! Ingestion middleware
//!
//! Runs every request through an [`Ingestor`] before the wrapped service
//! sees it:
//! - Non-multipart requests are forwarded untouched
//! - Multipart requests are forwarded with an empty body and the resulting
//!   [`Upload`](crate::ingest::Upload) in their extensions
//! - Ingestion failures are answered directly with the JSON error envelope

use axum::{
    body::Body,
    extract::Request,
    response::{IntoResponse, Response},
};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::debug;

use crate::ingest::{Ingestor, Processed};

/// Ingestion layer
#[derive(Clone)]
pub struct IngestLayer {
    ingestor: Arc<Ingestor>,
}

impl IngestLayer {
    pub fn new(ingestor: Arc<Ingestor>) -> Self {
        Self { ingestor }
    }
}

impl<S> Layer<S> for IngestLayer {
    type Service = IngestMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IngestMiddleware {
            inner,
            ingestor: self.ingestor.clone(),
        }
    }
}

/// Ingestion middleware service
#[derive(Clone)]
pub struct IngestMiddleware<S> {
    inner: S,
    ingestor: Arc<Ingestor>,
}

impl<S> Service<Request> for IngestMiddleware<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // The clone may not be ready; keep the service that was polled.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let ingestor = self.ingestor.clone();

        Box::pin(async move {
            match ingestor.process(request).await {
                Ok(Processed::PassThrough(request)) => inner.call(request).await,
                Ok(Processed::Ingested { mut parts, upload }) => {
                    debug!(
                        fields = upload.fields().len(),
                        files = upload.file_count(),
                        "Upload attached to request"
                    );
                    parts.extensions.insert(upload);
                    inner.call(Request::from_parts(parts, Body::empty())).await
                },
                Err(err) => Ok(err.into_response()),
            }
        })
    }
}
