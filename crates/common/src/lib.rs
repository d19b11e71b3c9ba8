//! Framecut Common Utilities
//!
//! Shared infrastructure for all Framecut crates:
//! - Error types and result aliases
//! - The append-only export log and tracing initialization
//! - Configuration loading

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
pub use logging::{ExportLogger, LogEntry, LogLevel};
