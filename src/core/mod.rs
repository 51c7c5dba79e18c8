/// Core Module for sqlexec
///
/// This module contains the pieces the executor is assembled from: the
/// driver abstraction with its SQLite implementation, command and result
/// types, and the error types shared across the crate.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DriverError, ErrorKind, ExecError, Result};
