//! Relay sink
//!
//! Accepts connections from the relay storage engine, counts what each one
//! sends, logs the total and closes the socket once the sender has finished.

use crate::Result;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, info, warn};

const READ_BUFFER: usize = 16 * 1024;

/// Bind `host:port` and serve until the process is stopped.
pub async fn run(host: &str, port: u16) -> Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    info!(address = %listener.local_addr()?, "Relay sink listening");
    eprintln!("Listening on {}:{}", host, port);
    serve(listener).await
}

/// Accept loop. Each connection is handled on its own task.
pub async fn serve(listener: TcpListener) -> Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        debug!(%peer, "Connection accepted");
        tokio::spawn(async move {
            match receive(socket).await {
                Ok(bytes) => info!(%peer, bytes, "Transfer complete"),
                Err(e) => warn!(%peer, error = %e, "Transfer failed"),
            }
        });
    }
}

/// Read the connection to EOF and return the number of bytes received.
/// Dropping the stream afterwards closes our side, which the relay engine
/// waits for before reporting success.
pub async fn receive(socket: TcpStream) -> std::io::Result<u64> {
    count(socket).await
}

async fn count<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<u64> {
    let mut buf = vec![0u8; READ_BUFFER];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        total += n as u64;
    }
}
