//! Command implementations

pub mod sink;
pub mod upload;
