/// Connection Management Module
///
/// This module provides connection-string parsing, the `Lease` abstraction
/// over connection ownership, and the scoped `TransactionGuard`.

use super::driver::{Driver, DriverConnection};
use crate::core::DriverError;
use rusqlite::OpenFlags;
use tracing::{debug, warn};

/// How a SQLite database file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
    /// Read-write, creating the file if it does not exist
    #[default]
    ReadWriteCreate,
    /// Private in-memory database; the data source is ignored
    Memory,
}

impl OpenMode {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "readonly" => Some(OpenMode::ReadOnly),
            "readwrite" => Some(OpenMode::ReadWrite),
            "readwritecreate" => Some(OpenMode::ReadWriteCreate),
            "memory" => Some(OpenMode::Memory),
            _ => None,
        }
    }
}

/// Parsed SQLite connection string.
///
/// Accepts either a bare path (including `:memory:` and `file:` URIs) or
/// `key=value` pairs separated by `;`:
///
/// ```
/// use sqlexec::core::db::{ConnectionString, OpenMode};
///
/// let cs = ConnectionString::parse("Data Source=app.db;Mode=ReadOnly;Foreign Keys=True").unwrap();
/// assert_eq!(cs.data_source, "app.db");
/// assert_eq!(cs.mode, OpenMode::ReadOnly);
/// assert_eq!(cs.foreign_keys, Some(true));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub data_source: String,
    pub mode: OpenMode,
    pub foreign_keys: Option<bool>,
}

impl ConnectionString {
    pub fn parse(input: &str) -> Result<Self, DriverError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(DriverError::InvalidConnectionString(
                "connection string is empty".to_string(),
            ));
        }

        if input.starts_with("file:") || !input.contains('=') {
            return Ok(ConnectionString {
                data_source: input.to_string(),
                mode: OpenMode::default(),
                foreign_keys: None,
            });
        }

        let mut data_source = None;
        let mut mode = OpenMode::default();
        let mut foreign_keys = None;

        for pair in input.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                DriverError::InvalidConnectionString(format!("expected key=value, got '{}'", pair))
            })?;
            let value = value.trim();

            match key.trim().to_ascii_lowercase().as_str() {
                "data source" | "datasource" | "filename" => {
                    data_source = Some(value.to_string());
                }
                "mode" => {
                    mode = OpenMode::parse(value).ok_or_else(|| {
                        DriverError::InvalidConnectionString(format!("unknown mode '{}'", value))
                    })?;
                }
                "foreign keys" => {
                    foreign_keys = Some(parse_bool(value).ok_or_else(|| {
                        DriverError::InvalidConnectionString(format!(
                            "expected True or False for Foreign Keys, got '{}'",
                            value
                        ))
                    })?);
                }
                other => {
                    return Err(DriverError::InvalidConnectionString(format!(
                        "unknown key '{}'",
                        other
                    )));
                }
            }
        }

        let data_source = match (data_source, mode) {
            (_, OpenMode::Memory) => ":memory:".to_string(),
            (Some(source), _) if !source.is_empty() => source,
            _ => {
                return Err(DriverError::InvalidConnectionString(
                    "missing Data Source".to_string(),
                ))
            }
        };

        Ok(ConnectionString {
            data_source,
            mode,
            foreign_keys,
        })
    }

    /// Open flags matching the requested mode.
    pub fn open_flags(&self) -> OpenFlags {
        let base = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        match self.mode {
            OpenMode::ReadOnly => base | OpenFlags::SQLITE_OPEN_READ_ONLY,
            OpenMode::ReadWrite => base | OpenFlags::SQLITE_OPEN_READ_WRITE,
            OpenMode::ReadWriteCreate => {
                base | OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
            OpenMode::Memory => {
                base | OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_MEMORY
            }
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Who owns the connection a call runs on.
///
/// An `Owned` lease opened its connection in `acquire` and closes it in
/// `release`, or on drop if `release` was never reached. A `Borrowed` lease
/// wraps a caller's handle; acquiring and releasing it are no-ops.
pub enum Lease<'a, D: Driver> {
    Owned {
        driver: &'a D,
        conn: Option<D::Conn>,
    },
    Borrowed(&'a mut D::Conn),
}

impl<'a, D: Driver> Lease<'a, D> {
    /// Opens a connection the lease will own.
    pub fn acquire(driver: &'a D, connection_string: &str) -> Result<Self, DriverError> {
        let conn = driver.open(connection_string)?;
        debug!("Opened connection");
        Ok(Lease::Owned {
            driver,
            conn: Some(conn),
        })
    }

    /// Wraps a caller-supplied connection.
    pub fn borrowed(conn: &'a mut D::Conn) -> Self {
        Lease::Borrowed(conn)
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Lease::Owned { .. })
    }

    pub fn conn(&mut self) -> &mut D::Conn {
        match self {
            Lease::Borrowed(conn) => &mut **conn,
            Lease::Owned {
                conn: Some(conn), ..
            } => conn,
            // `release` consumes the lease, so an owned lease always holds its connection
            Lease::Owned { conn: None, .. } => unreachable!("lease used after release"),
        }
    }

    /// Closes an owned connection; does nothing for a borrowed one.
    pub fn release(mut self) -> Result<(), DriverError> {
        if let Lease::Owned { driver, conn } = &mut self {
            if let Some(conn) = conn.take() {
                driver.close(conn)?;
                debug!("Closed connection");
            }
        }
        Ok(())
    }
}

impl<'a, D: Driver> Drop for Lease<'a, D> {
    fn drop(&mut self) {
        if let Lease::Owned { driver, conn } = self {
            if let Some(conn) = conn.take() {
                if let Err(e) = driver.close(conn) {
                    warn!("Failed to close connection during unwind: {}", e);
                }
            }
        }
    }
}

/// Represents database transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction in progress
    Active,
    Committed,
    RolledBack,
    /// Rollback was attempted and failed
    Failed,
}

/// Scoped transaction on a connection.
///
/// Must be finished with `commit` or `rollback`; a guard dropped while still
/// active rolls the transaction back.
pub struct TransactionGuard<'c, C: DriverConnection> {
    conn: &'c mut C,
    state: TransactionState,
}

impl<'c, C: DriverConnection> TransactionGuard<'c, C> {
    pub fn begin(conn: &'c mut C) -> Result<Self, DriverError> {
        conn.begin()?;
        debug!("Transaction started");
        Ok(TransactionGuard {
            conn,
            state: TransactionState::Active,
        })
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn conn(&mut self) -> &mut C {
        &mut *self.conn
    }

    /// Commits; on failure the transaction stays active so it can be rolled back.
    pub fn commit(&mut self) -> Result<(), DriverError> {
        self.ensure_active()?;
        self.conn.commit()?;
        self.state = TransactionState::Committed;
        debug!("Transaction committed");
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<(), DriverError> {
        self.ensure_active()?;
        match self.conn.rollback() {
            Ok(()) => {
                self.state = TransactionState::RolledBack;
                debug!("Transaction rolled back");
                Ok(())
            }
            Err(e) => {
                self.state = TransactionState::Failed;
                Err(e)
            }
        }
    }

    fn ensure_active(&self) -> Result<(), DriverError> {
        if self.state == TransactionState::Active {
            Ok(())
        } else {
            Err(DriverError::Other(format!(
                "No transaction in progress (state: {:?})",
                self.state
            )))
        }
    }
}

impl<'c, C: DriverConnection> Drop for TransactionGuard<'c, C> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            if let Err(e) = self.conn.rollback() {
                warn!("Failed to roll back abandoned transaction: {}", e);
            }
        }
    }
}
