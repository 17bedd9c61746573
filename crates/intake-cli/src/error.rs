//! Error types for the intake CLI
//!
//! Messages are user-facing and say what to check next.

use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// Argument did not have the `key=value` shape
    #[error("Invalid argument '{0}'. Expected the form 'key=value'.")]
    InvalidPair(String),

    /// File to upload could not be read
    #[error("Cannot read '{path}': {source}. Verify the file exists and is readable.")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Socket or file system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("Network request failed: {0}. Check that the server is running and the URL is correct.")]
    Http(#[from] reqwest::Error),

    /// Server answered with something other than JSON
    #[error("Unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },
}
