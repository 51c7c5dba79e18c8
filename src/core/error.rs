/// Error Module
///
/// Two layers of errors live here. `DriverError` is what a database driver
/// reports for a single primitive (open, prepare, step, commit). `ExecError`
/// is what the executor hands back to callers: the driver failure wrapped with
/// the caller's context message, tagged with an `ErrorKind`.
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a driver primitive.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Errors surfaced by SQLite itself
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored-procedure command named a procedure the driver does not know
    #[error("Unknown stored procedure: {0}")]
    UnknownProcedure(String),

    /// The command ran past the executor's timeout and was interrupted
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    /// The connection string could not be understood
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// The statement declares a parameter the command supplies no value for
    #[error("Missing value for parameter {0}")]
    MissingParameter(String),

    /// The command text holds more than one SQL statement
    #[error("Command contains multiple statements; send one statement per command")]
    MultipleStatements,

    /// Anything else a driver wants to report
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an `ExecError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Execution,
    Rollback,
    Config,
    Io,
}

/// Error returned by every executor operation.
///
/// The display form is `"<context> Details = <driver message>"`; a rollback
/// failure appends `" Rollback error = <rollback message>"` so both failures
/// are visible in one string.
#[derive(Error, Debug)]
pub enum ExecError {
    /// Opening, closing or pinging a connection failed
    #[error("{context} Details = {source}")]
    Connection { context: String, source: DriverError },

    /// The command itself failed (syntax, constraint, timeout, binding)
    #[error("{context} Details = {source}")]
    Execution { context: String, source: DriverError },

    /// The command failed and so did the rollback that followed it
    #[error("{context} Details = {source} Rollback error = {rollback}")]
    Rollback {
        context: String,
        source: DriverError,
        rollback: DriverError,
    },

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    pub fn connection(context: &str, source: DriverError) -> Self {
        ExecError::Connection {
            context: context.to_string(),
            source,
        }
    }

    pub fn execution(context: &str, source: DriverError) -> Self {
        ExecError::Execution {
            context: context.to_string(),
            source,
        }
    }

    pub fn rollback(context: &str, source: DriverError, rollback: DriverError) -> Self {
        ExecError::Rollback {
            context: context.to_string(),
            source,
            rollback,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::Connection { .. } => ErrorKind::Connection,
            ExecError::Execution { .. } => ErrorKind::Execution,
            ExecError::Rollback { .. } => ErrorKind::Rollback,
            ExecError::Config(_) => ErrorKind::Config,
            ExecError::Io(_) => ErrorKind::Io,
        }
    }

    /// The caller-supplied context message, if this error carries one.
    pub fn context(&self) -> Option<&str> {
        match self {
            ExecError::Connection { context, .. }
            | ExecError::Execution { context, .. }
            | ExecError::Rollback { context, .. } => Some(context),
            _ => None,
        }
    }

    /// The rollback failure that accompanied the original error, if any.
    pub fn rollback_error(&self) -> Option<&DriverError> {
        match self {
            ExecError::Rollback { rollback, .. } => Some(rollback),
            _ => None,
        }
    }
}

/// Type alias for Result to use ExecError as the error type.
pub type Result<T> = std::result::Result<T, ExecError>;
