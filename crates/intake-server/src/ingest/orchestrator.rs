//! Ingestion state machine
//!
//! One [`Run`] drives a single request from the first part event to its
//! terminal outcome. Failures short-circuit through `?`; the partially
//! built [`Upload`] is dropped with the run and never reaches the caller.

use intake_common::{PartMetadata, StoredFile};
use tracing::{debug, trace, warn};

use super::{
    filter::{FileFilter, FilterDecision},
    limits::{Limits, Tally},
    part::{FilePart, Interruption, PartWatch},
    source::{PartEvent, PartSource, SourceError},
    upload::Upload,
    RequestContext,
};
use crate::{
    error::{IngestError, IngestResult, LimitExceeded},
    storage::StorageEngine,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Parsing,
    Filtering,
    Storing,
    Finishing,
}

pub(super) struct Run<'a> {
    ctx: &'a RequestContext,
    limits: &'a Limits,
    filter: Option<&'a dyn FileFilter>,
    storage: &'a dyn StorageEngine,
    phase: Phase,
    tally: Tally,
    upload: Upload,
}

impl<'a> Run<'a> {
    pub(super) fn new(
        ctx: &'a RequestContext,
        limits: &'a Limits,
        filter: Option<&'a dyn FileFilter>,
        storage: &'a dyn StorageEngine,
    ) -> Self {
        Self {
            ctx,
            limits,
            filter,
            storage,
            phase: Phase::Idle,
            tally: Tally::default(),
            upload: Upload::default(),
        }
    }

    pub(super) async fn execute<S>(mut self, source: &mut S) -> IngestResult<Upload>
    where
        S: PartSource + ?Sized,
    {
        loop {
            self.enter(Phase::Parsing);

            match source.next_event().await? {
                PartEvent::Field { name, value } => {
                    self.tally
                        .count_field(self.limits, &name)
                        .map_err(limit_error)?;
                    trace!(field = %name, "Field received");
                    self.upload.set_field(name, value);
                },
                PartEvent::File(part) => self.on_file(part).await?,
                PartEvent::Finish => break,
            }
        }

        Ok(self.finish())
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            trace!(from = ?self.phase, to = ?phase, "Ingestion phase changed");
            self.phase = phase;
        }
    }

    fn finish(mut self) -> Upload {
        self.enter(Phase::Finishing);
        debug!(
            fields = self.upload.fields().len(),
            files = self.upload.file_count(),
            "Multipart body consumed"
        );
        self.upload
    }

    async fn on_file(&mut self, part: FilePart) -> IngestResult<()> {
        let metadata = part.metadata().clone();
        self.tally
            .count_file(self.limits, &metadata.field_name)
            .map_err(limit_error)?;

        if let Some(filter) = self.filter {
            self.enter(Phase::Filtering);

            match filter.check(self.ctx, &metadata).await {
                Ok(FilterDecision::Accept) => {},
                Ok(FilterDecision::Reject) => {
                    let skipped = skip(part).await?;
                    debug!(
                        field = %metadata.field_name,
                        file = %metadata.file_name,
                        skipped,
                        "File rejected by filter"
                    );
                    return Ok(());
                },
                Err(cause) => {
                    skip(part).await?;
                    return Err(IngestError::FileFilter {
                        filename: metadata.file_name,
                        field: metadata.field_name,
                        cause,
                    });
                },
            }
        }

        self.enter(Phase::Storing);
        let stored = self.store(part, &metadata).await?;
        self.upload.push_file(stored);
        Ok(())
    }

    /// Hand `part` to the engine while watching its stream for a limit
    /// breach or a source failure, either of which overrides the engine.
    async fn store(&self, part: FilePart, metadata: &PartMetadata) -> IngestResult<StoredFile> {
        let (part, watch) = PartWatch::guard(part, self.limits.file_size);

        let outcome = tokio::select! {
            biased;
            _ = watch.tripped() => None,
            result = self.storage.store(self.ctx, part) => Some(result),
        };

        match (watch.take(), outcome) {
            (None, Some(result)) => result,
            (Some(interruption), outcome) => {
                if let Some(Ok(stored)) = outcome {
                    self.discard(&stored).await;
                }
                Err(self.interrupted(interruption, metadata))
            },
            (None, None) => Err(IngestError::FileSizeLimit {
                filename: metadata.file_name.clone(),
                field: metadata.field_name.clone(),
                limit: self.limits.file_size,
            }),
        }
    }

    async fn discard(&self, stored: &StoredFile) {
        if let Err(e) = self.storage.discard(self.ctx, stored).await {
            warn!(
                file = %stored.metadata.file_name,
                error = %e,
                "Failed to discard truncated file"
            );
        }
    }

    fn interrupted(&self, interruption: Interruption, metadata: &PartMetadata) -> IngestError {
        match interruption {
            Interruption::SizeLimit { limit } => IngestError::FileSizeLimit {
                filename: metadata.file_name.clone(),
                field: metadata.field_name.clone(),
                limit: limit.or(self.limits.file_size),
            },
            Interruption::Source(err) => err.into(),
        }
    }
}

/// Drain a part nobody stores, surfacing transport or parser failures met on the way.
async fn skip(part: FilePart) -> IngestResult<u64> {
    let (part, watch) = PartWatch::guard(part, None);
    let skipped = part.drain().await;

    match watch.take() {
        Some(Interruption::Source(err)) => Err(err.into()),
        _ => Ok(skipped),
    }
}

fn limit_error(limit: LimitExceeded) -> IngestError {
    SourceError::Limit(limit).into()
}
