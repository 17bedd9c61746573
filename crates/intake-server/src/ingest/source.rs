//! Part event sources
//!
//! The orchestrator never sees multipart framing. It pulls [`PartEvent`]s
//! from a [`PartSource`]; [`MulterSource`] adapts a request body parsed by
//! `multer`, and tests drive the orchestrator with scripted sources.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use http::{header::CONTENT_TYPE, HeaderMap};
use intake_common::{
    types::{DEFAULT_ENCODING, DEFAULT_FILE_CONTENT_TYPE},
    PartMetadata,
};
use mime::Mime;
use std::io;
use thiserror::Error;
use tracing::trace;

use super::{limits::Limits, part::FilePart};
use crate::error::{BoxError, IngestError, LimitExceeded, LimitKind};

/// One step of a multipart body
#[derive(Debug)]
pub enum PartEvent {
    /// A text field and its complete value
    Field { name: String, value: String },
    /// A file part; its bytes are read from the contained stream
    File(FilePart),
    /// The body ended cleanly. Repeated calls keep returning `Finish`.
    Finish,
}

/// Failure reported by a part source, either between parts or inside a
/// file part's stream (wrapped in an `io::Error`).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request stream failed: {0}")]
    Transport(#[source] BoxError),

    #[error("malformed multipart body: {0}")]
    Malformed(#[source] BoxError),

    #[error(transparent)]
    Limit(#[from] LimitExceeded),
}

impl From<SourceError> for IngestError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Transport(cause) => IngestError::RequestStream(cause),
            SourceError::Malformed(cause) => IngestError::FormParsing(cause),
            SourceError::Limit(LimitExceeded {
                kind: LimitKind::FileSize,
                max,
                field,
            }) => IngestError::FileSizeLimit {
                filename: String::new(),
                field: field.unwrap_or_default(),
                limit: Some(max),
            },
            SourceError::Limit(limit) => IngestError::FormParsing(Box::new(limit)),
        }
    }
}

/// Producer of part events for one request
#[async_trait]
pub trait PartSource: Send {
    async fn next_event(&mut self) -> Result<PartEvent, SourceError>;
}

/// Boundary of a `multipart/form-data` body, or `None` when the request is
/// not multipart at all.
pub fn multipart_boundary(headers: &HeaderMap) -> Option<Result<String, SourceError>> {
    let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let mime: Mime = content_type.parse().ok()?;
    if mime.type_() != mime::MULTIPART || mime.subtype() != mime::FORM_DATA {
        return None;
    }

    Some(multer::parse_boundary(content_type).map_err(|e| SourceError::Malformed(Box::new(e))))
}

/// [`PartSource`] over a body parsed by `multer`.
///
/// Parts are produced strictly in order: the previous [`FilePart`] must be
/// dropped before the next event is requested.
pub struct MulterSource {
    multipart: multer::Multipart<'static>,
    field_size: Option<u64>,
    finished: bool,
}

impl MulterSource {
    pub fn new<S, O, E>(body: S, boundary: impl Into<String>, limits: &Limits) -> Self
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<BoxError> + 'static,
    {
        Self {
            multipart: multer::Multipart::new(body, boundary),
            field_size: limits.field_size,
            finished: false,
        }
    }
}

async fn read_value(
    mut field: multer::Field<'static>,
    name: &str,
    field_size: Option<u64>,
) -> Result<String, SourceError> {
    let mut value = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(classify)? {
        if let Some(max) = field_size {
            if (value.len() + chunk.len()) as u64 > max {
                return Err(SourceError::Limit(LimitExceeded {
                    kind: LimitKind::FieldSize,
                    max,
                    field: Some(name.to_string()),
                }));
            }
        }
        value.extend_from_slice(&chunk);
    }
    String::from_utf8(value.to_vec()).map_err(|e| SourceError::Malformed(Box::new(e)))
}

#[async_trait]
impl PartSource for MulterSource {
    async fn next_event(&mut self) -> Result<PartEvent, SourceError> {
        if self.finished {
            return Ok(PartEvent::Finish);
        }

        let Some(field) = self.multipart.next_field().await.map_err(classify)? else {
            self.finished = true;
            return Ok(PartEvent::Finish);
        };

        let name = field.name().unwrap_or_default().to_string();
        let encoding = field
            .headers()
            .get("content-transfer-encoding")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_ENCODING)
            .to_string();

        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field
                    .content_type()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| DEFAULT_FILE_CONTENT_TYPE.to_string());
                trace!(field = %name, file = %file_name, "File part started");

                let metadata = PartMetadata {
                    field_name: name,
                    file_name,
                    encoding,
                    content_type,
                };
                let stream = field.map(|item| item.map_err(|e| io::Error::other(classify(e))));
                Ok(PartEvent::File(FilePart::new(metadata, stream)))
            },
            None => {
                let value = read_value(field, &name, self.field_size).await?;
                trace!(field = %name, len = value.len(), "Field part read");
                Ok(PartEvent::Field { name, value })
            },
        }
    }
}

fn classify(err: multer::Error) -> SourceError {
    match err {
        multer::Error::StreamReadFailed(cause) => SourceError::Transport(cause),
        multer::Error::FieldSizeExceeded { limit, field_name } => {
            SourceError::Limit(LimitExceeded {
                kind: LimitKind::FileSize,
                max: limit,
                field: field_name,
            })
        },
        other => SourceError::Malformed(Box::new(other)),
    }
}
