//! Common test utilities for intake server integration tests
//!
//! - [`MultipartBody`] builds raw `multipart/form-data` requests
//! - [`ScriptedSource`] feeds the orchestrator a fixed list of part events
//! - [`RecordingStorage`] counts engine calls around an inner engine

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use futures::stream;
use http::{header::CONTENT_TYPE, Request};
use http_body_util::BodyExt;
use intake_common::{PartMetadata, StoredFile};
use intake_server::{
    ingest::{part::FilePart, PartEvent, PartSource, RequestContext, SourceError},
    storage::StorageEngine,
    IngestResult, Processed, Upload,
};
use std::{
    collections::VecDeque,
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// Boundary used by every generated body
pub const BOUNDARY: &str = "intake-test-boundary";

/// Builder for raw multipart bodies
#[derive(Debug, Default)]
pub struct MultipartBody {
    raw: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.raw.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.raw.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, name, filename, content_type
            )
            .as_bytes(),
        );
        self.raw.extend_from_slice(data);
        self.raw.extend_from_slice(b"\r\n");
        self
    }

    pub fn content_type() -> String {
        format!("multipart/form-data; boundary={}", BOUNDARY)
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        self.raw
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        self.raw
    }

    pub fn request(self, uri: &str) -> Request<Body> {
        Request::post(uri)
            .header(CONTENT_TYPE, Self::content_type())
            .body(Body::from(self.into_bytes()))
            .unwrap()
    }
}

/// Unwrap the upload of an ingested request
pub fn ingested(processed: Processed) -> Upload {
    match processed {
        Processed::Ingested { upload, .. } => upload,
        Processed::PassThrough(_) => panic!("expected the request to be ingested"),
    }
}

pub async fn body_bytes(body: Body) -> Bytes {
    body.collect().await.unwrap().to_bytes()
}

pub async fn body_json(body: Body) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(body).await).unwrap()
}

/// A file part with its whole content in one chunk
pub fn file_part(field: &str, filename: &str, data: &'static [u8]) -> FilePart {
    FilePart::from_bytes(PartMetadata::new(field, filename), data)
}

/// A file part whose stream yields `data` and then fails with `err`
pub fn failing_part(field: &str, filename: &str, data: &'static [u8], err: SourceError) -> FilePart {
    FilePart::new(
        PartMetadata::new(field, filename),
        stream::iter(vec![
            Ok(Bytes::from_static(data)),
            Err(io::Error::new(io::ErrorKind::Other, err)),
        ]),
    )
}

/// Part source that replays a fixed list of events, then finishes.
pub struct ScriptedSource {
    events: VecDeque<Result<PartEvent, SourceError>>,
    pub pulled: usize,
}

impl ScriptedSource {
    pub fn new(events: Vec<Result<PartEvent, SourceError>>) -> Self {
        Self {
            events: events.into(),
            pulled: 0,
        }
    }
}

#[async_trait]
impl PartSource for ScriptedSource {
    async fn next_event(&mut self) -> Result<PartEvent, SourceError> {
        self.pulled += 1;
        self.events.pop_front().unwrap_or(Ok(PartEvent::Finish))
    }
}

pub fn field(name: &str, value: &str) -> Result<PartEvent, SourceError> {
    Ok(PartEvent::Field {
        name: name.to_string(),
        value: value.to_string(),
    })
}

pub fn file(part: FilePart) -> Result<PartEvent, SourceError> {
    Ok(PartEvent::File(part))
}

/// Engine wrapper counting `store` and `discard` calls
#[derive(Debug, Clone)]
pub struct RecordingStorage<E> {
    inner: E,
    pub stores: Arc<AtomicUsize>,
    pub discards: Arc<AtomicUsize>,
}

impl<E> RecordingStorage<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            stores: Arc::default(),
            discards: Arc::default(),
        }
    }

    pub fn stores(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    pub fn discards(&self) -> usize {
        self.discards.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<E: StorageEngine> StorageEngine for RecordingStorage<E> {
    async fn store(&self, ctx: &RequestContext, part: FilePart) -> IngestResult<StoredFile> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.inner.store(ctx, part).await
    }

    async fn discard(&self, ctx: &RequestContext, file: &StoredFile) -> IngestResult<()> {
        self.discards.fetch_add(1, Ordering::SeqCst);
        self.inner.discard(ctx, file).await
    }
}
