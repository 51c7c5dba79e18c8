/// Driver Module
///
/// The executor never talks to a database directly. It goes through a
/// `Driver`, which opens and closes sessions, and the `DriverConnection` those
/// sessions implement. `SqliteDriver` is the shipped implementation; tests
/// substitute recording doubles.
use super::query::{Command, Table, Value};
use crate::core::DriverError;

/// Connection factory.
pub trait Driver {
    /// Live session type handed out by `open`.
    type Conn: DriverConnection;

    /// Opens a new session described by `connection_string`.
    fn open(&self, connection_string: &str) -> Result<Self::Conn, DriverError>;

    /// Closes a session previously returned by `open`.
    fn close(&self, conn: Self::Conn) -> Result<(), DriverError>;
}

/// Primitives the executor needs from a live session.
///
/// Every command carries the timeout the driver must enforce and the
/// command kind telling it whether `text` is SQL or a procedure name.
pub trait DriverConnection {
    /// Cheap round trip proving the session is usable.
    fn ping(&mut self) -> Result<(), DriverError>;

    /// Runs a command that returns no rows; yields the affected-row count.
    fn execute(&mut self, command: &Command) -> Result<u64, DriverError>;

    /// Runs a command and yields the first column of the first row, if any.
    fn query_scalar(&mut self, command: &Command) -> Result<Option<Value>, DriverError>;

    /// Runs a command and materializes every row it returns.
    fn query_table(&mut self, command: &Command) -> Result<Table, DriverError>;

    fn begin(&mut self) -> Result<(), DriverError>;
    fn commit(&mut self) -> Result<(), DriverError>;
    fn rollback(&mut self) -> Result<(), DriverError>;
}
