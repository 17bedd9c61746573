//! Intake CLI Library
//!
//! Command-line companion for the intake server.
//!
//! - **Sink**: a TCP receiver for the relay storage engine (`intake sink`)
//! - **Upload**: send a multipart form to an intake endpoint (`intake upload`)

pub mod commands;
pub mod error;

pub use error::{CliError, Result};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// intake - multipart upload tooling
#[derive(Parser, Debug)]
#[command(name = "intake")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Receive relayed uploads and report their sizes
    Sink {
        /// Address to listen on
        #[arg(long, env = "INTAKE_RELAY_HOST", default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(long, env = "INTAKE_RELAY_PORT", default_value_t = 9999)]
        port: u16,
    },

    /// Send a multipart upload and print the JSON response
    Upload {
        /// Endpoint, e.g. http://127.0.0.1:8000/profile
        url: String,

        /// Text field as name=value (repeatable)
        #[arg(long = "field", value_parser = parse_pair)]
        fields: Vec<(String, String)>,

        /// File as field=path (repeatable)
        #[arg(long = "file", value_parser = parse_file)]
        files: Vec<(String, PathBuf)>,
    },
}

/// Split `key=value` on the first `=`. The key must be non-empty.
pub fn parse_pair(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(CliError::InvalidPair(raw.to_string())),
    }
}

fn parse_file(raw: &str) -> Result<(String, PathBuf)> {
    let (field, path) = parse_pair(raw)?;
    if path.is_empty() {
        return Err(CliError::InvalidPair(raw.to_string()));
    }
    Ok((field, PathBuf::from(path)))
}
