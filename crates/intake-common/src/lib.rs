//! Intake Common Library
//!
//! Shared types and logging setup for the Intake workspace.
//!
//! # Overview
//!
//! - **Types**: part metadata and stored-file descriptors exchanged between
//!   the ingestion core, its storage engines and API clients
//! - **Logging**: `tracing` subscriber configuration shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use intake_common::logging::{init_logging, LogConfig};
//! use tracing::info;
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     info!("ready");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod logging;
pub mod types;

pub use types::{Location, PartMetadata, StoredFile};
