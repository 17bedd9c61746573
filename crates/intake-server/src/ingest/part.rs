//! File parts and their byte streams

use bytes::Bytes;
use futures::{stream::BoxStream, Stream, StreamExt};
use intake_common::PartMetadata;
use std::{
    fmt, io,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
    task::{Context, Poll},
};
use tokio_util::sync::CancellationToken;

use super::source::SourceError;
use crate::error::{LimitExceeded, LimitKind};

/// Owned, single-consumer byte stream of one file part
pub type FileStream = BoxStream<'static, io::Result<Bytes>>;

/// A file part: metadata plus a stream that can be read exactly once.
///
/// `FilePart` is itself a [`Stream`] of chunks, so an engine can read it
/// directly while still consulting [`FilePart::metadata`].
pub struct FilePart {
    metadata: PartMetadata,
    stream: FileStream,
}

impl FilePart {
    pub fn new<S>(metadata: PartMetadata, stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            metadata,
            stream: stream.boxed(),
        }
    }

    /// A part whose whole content is already in memory
    pub fn from_bytes(metadata: PartMetadata, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self::new(metadata, futures::stream::iter([Ok(data)]))
    }

    pub fn metadata(&self) -> &PartMetadata {
        &self.metadata
    }

    pub fn into_parts(self) -> (PartMetadata, FileStream) {
        (self.metadata, self.stream)
    }

    /// Read the rest of the part and throw it away, returning the bytes skipped.
    pub async fn drain(self) -> u64 {
        let (_, mut stream) = self.into_parts();
        drain(&mut stream).await
    }
}

impl Stream for FilePart {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.poll_next_unpin(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.stream.size_hint()
    }
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Consume a stream until it ends or fails, so the producer is not left blocked.
pub async fn drain(stream: &mut FileStream) -> u64 {
    let mut skipped = 0u64;
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => skipped += chunk.len() as u64,
            Err(_) => break,
        }
    }
    skipped
}

/// Why a part was cut off while a storage engine was reading it
#[derive(Debug)]
pub(crate) enum Interruption {
    SizeLimit { limit: Option<u64> },
    Source(SourceError),
}

/// Observes a part's stream on behalf of the orchestrator.
///
/// The first limit breach or parser/transport failure seen in the stream is
/// recorded and trips a cancellation token, so the orchestrator can abandon
/// the in-flight store instead of trusting whatever the engine returns.
#[derive(Clone, Default)]
pub(crate) struct PartWatch {
    inner: Arc<WatchState>,
}

#[derive(Default)]
struct WatchState {
    tripped: CancellationToken,
    interruption: Mutex<Option<Interruption>>,
}

impl PartWatch {
    /// Wrap `part` so that reading past `file_size` bytes trips the watch.
    pub(crate) fn guard(part: FilePart, file_size: Option<u64>) -> (FilePart, PartWatch) {
        let watch = PartWatch::default();
        let tap = watch.clone();
        let (metadata, stream) = part.into_parts();
        let field = metadata.field_name.clone();
        let mut seen = 0u64;

        let guarded = stream.map(move |item| match item {
            Ok(chunk) => {
                seen += chunk.len() as u64;
                match file_size {
                    Some(max) if seen > max => {
                        tap.interrupt(Interruption::SizeLimit { limit: Some(max) });
                        Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            LimitExceeded {
                                kind: LimitKind::FileSize,
                                max,
                                field: Some(field.clone()),
                            },
                        ))
                    },
                    _ => Ok(chunk),
                }
            },
            Err(err) => Err(tap.absorb(err)),
        });

        (FilePart::new(metadata, guarded), watch)
    }

    pub(crate) async fn tripped(&self) {
        self.inner.tripped.cancelled().await
    }

    pub(crate) fn take(&self) -> Option<Interruption> {
        self.slot().take()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Interruption>> {
        match self.inner.interruption.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn interrupt(&self, interruption: Interruption) {
        let mut slot = self.slot();
        if slot.is_none() {
            *slot = Some(interruption);
            self.inner.tripped.cancel();
        }
    }

    /// Record a source-originated failure and hand the engine a plain error in its place.
    fn absorb(&self, err: io::Error) -> io::Error {
        let kind = err.kind();
        if !err.get_ref().is_some_and(|inner| inner.is::<SourceError>()) {
            return err;
        }

        match err.into_inner().map(|inner| inner.downcast::<SourceError>()) {
            Some(Ok(source)) => {
                let message = source.to_string();
                let interruption = match *source {
                    SourceError::Limit(LimitExceeded {
                        kind: LimitKind::FileSize,
                        max,
                        ..
                    }) => Interruption::SizeLimit { limit: Some(max) },
                    other => Interruption::Source(other),
                };
                self.interrupt(interruption);
                io::Error::new(kind, message)
            },
            Some(Err(other)) => io::Error::new(kind, other),
            None => io::Error::from(kind),
        }
    }
}
