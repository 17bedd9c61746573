//! Network relay storage engine
//!
//! Each file part is streamed over its own TCP connection. The part counts
//! as stored once every byte was written, our side was shut down, and the
//! peer closed the connection.

use async_trait::async_trait;
use futures::StreamExt;
use intake_common::{Location, PartMetadata, StoredFile};
use std::{future::Future, io, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::{sleep, timeout},
};
use tracing::{debug, info, instrument, warn};

use super::{config::RelayConfig, StorageEngine};
use crate::{
    error::{IngestError, IngestResult, StorageError, StorageErrorKind},
    ingest::{
        part::{drain, FilePart, FileStream},
        RequestContext,
    },
};

#[derive(Debug, Clone)]
pub struct RelayStorage {
    config: RelayConfig,
}

impl RelayStorage {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    fn error(
        &self,
        kind: StorageErrorKind,
        message: String,
        metadata: &PartMetadata,
        cause: io::Error,
    ) -> IngestError {
        StorageError::new(kind, message)
            .with_filename(metadata.file_name.clone())
            .with_cause(cause)
            .into()
    }

    /// Await `connect` for at most the configured connect timeout.
    async fn connect_within<F>(
        &self,
        connect: F,
        metadata: &PartMetadata,
    ) -> IngestResult<TcpStream>
    where
        F: Future<Output = io::Result<TcpStream>>,
    {
        let cause = match timeout(self.config.connect_timeout(), connect).await {
            Ok(Ok(socket)) => return Ok(socket),
            Ok(Err(e)) => e,
            Err(_) => io::Error::new(
                io::ErrorKind::TimedOut,
                format!(
                    "connection not established within {} ms",
                    self.config.connect_timeout_ms
                ),
            ),
        };

        Err(self.error(
            StorageErrorKind::Connection,
            format!(
                "Failed to connect to relay at {}:{}",
                self.config.host, self.config.port
            ),
            metadata,
            cause,
        ))
    }
}

/// Close with a reset so the peer cannot mistake a cut-off transfer for a complete one.
#[allow(deprecated)]
fn abort(socket: TcpStream) {
    if let Err(e) = socket.set_linger(Some(Duration::ZERO)) {
        debug!(error = %e, "Failed to set zero linger on relay socket");
    }
    drop(socket);
}

/// How a transfer ended early
enum Failure {
    Read(io::Error),
    Write(io::Error),
    TimedOut,
}

/// Write the whole stream, half-close, then wait for the peer to close.
async fn pipe(
    socket: &mut TcpStream,
    stream: &mut FileStream,
    transferred: &mut u64,
) -> Result<(), Failure> {
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Failure::Read)?;
        socket.write_all(&chunk).await.map_err(Failure::Write)?;
        *transferred += chunk.len() as u64;
    }

    socket.shutdown().await.map_err(Failure::Write)?;

    let mut scratch = [0u8; 512];
    loop {
        match socket.read(&mut scratch).await {
            Ok(0) => return Ok(()),
            Ok(_) => continue,
            Err(e) => return Err(Failure::Write(e)),
        }
    }
}

#[async_trait]
impl StorageEngine for RelayStorage {
    #[instrument(
        skip_all,
        fields(
            host = %self.config.host,
            port = self.config.port,
            file = %part.metadata().file_name,
        )
    )]
    async fn store(&self, _ctx: &RequestContext, part: FilePart) -> IngestResult<StoredFile> {
        let (metadata, mut stream) = part.into_parts();
        let (host, port) = (self.config.host.as_str(), self.config.port);

        let mut socket = match self
            .connect_within(TcpStream::connect((host, port)), &metadata)
            .await
        {
            Ok(socket) => socket,
            Err(e) => {
                drain(&mut stream).await;
                return Err(e);
            },
        };
        debug!("Relay connection established");

        let mut transferred = 0u64;
        let outcome = {
            let transfer = pipe(&mut socket, &mut stream, &mut transferred);
            tokio::pin!(transfer);

            tokio::select! {
                result = &mut transfer => result,
                _ = sleep(self.config.transfer_timeout()) => Err(Failure::TimedOut),
            }
        };

        match outcome {
            Ok(()) => {
                info!(bytes = transferred, "Relayed file");
                Ok(StoredFile::new(
                    metadata,
                    Location::Relay {
                        host: host.to_string(),
                        port,
                        bytes_transferred: transferred,
                    },
                ))
            },
            Err(Failure::Read(e)) => {
                abort(socket);
                Err(self.error(
                    StorageErrorKind::RelayRead,
                    "Error reading file stream for relay transfer".to_string(),
                    &metadata,
                    e,
                ))
            },
            Err(Failure::Write(e)) => {
                abort(socket);
                drain(&mut stream).await;
                Err(self.error(
                    StorageErrorKind::RelayWrite,
                    "Relay socket error during file transfer".to_string(),
                    &metadata,
                    e,
                ))
            },
            Err(Failure::TimedOut) => {
                warn!(bytes = transferred, "Relay transfer timed out");
                abort(socket);
                drain(&mut stream).await;
                Err(self.error(
                    StorageErrorKind::RelayWrite,
                    "Relay socket error during file transfer".to_string(),
                    &metadata,
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!(
                            "transfer not finished within {} ms",
                            self.config.transfer_timeout_ms
                        ),
                    ),
                ))
            },
        }
    }

    async fn discard(&self, _ctx: &RequestContext, file: &StoredFile) -> IngestResult<()> {
        debug!(file = %file.metadata.file_name, "Relayed files cannot be discarded");
        Ok(())
    }
}
