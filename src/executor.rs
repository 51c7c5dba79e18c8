//! Command executor: the facade callers use to run commands.
//!
//! Every operation comes in two flavours. The plain one (`execute_scalar`)
//! opens a connection for the call and closes it on every exit path. The `_on`
//! one (`execute_scalar_on`) runs on a connection the caller owns and never
//! opens or closes it. Both route through the same `Lease`-based code path.
//!
//! Failures come back as `ExecError`, carrying the caller's context message
//! alongside the driver's detail.
use crate::config::Config;
use crate::core::db::{
    Command, CommandKind, Driver, DriverConnection, Lease, SqliteDriver, Table,
    TransactionGuard, Value,
};
use crate::core::{DriverError, ExecError, Result};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Timeout applied when none is given at construction.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a connection check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCheck {
    Success,
    /// The underlying failure message
    Failed(String),
}

impl ConnectionCheck {
    pub fn is_success(&self) -> bool {
        matches!(self, ConnectionCheck::Success)
    }
}

impl fmt::Display for ConnectionCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionCheck::Success => write!(f, "Success"),
            ConnectionCheck::Failed(detail) => write!(f, "{}", detail),
        }
    }
}

/// Runs commands against databases reached through `D`.
///
/// Holds only immutable configuration, so one executor can serve many calls.
#[derive(Debug, Clone)]
pub struct Executor<D: Driver = SqliteDriver> {
    driver: D,
    connection_string: String,
    timeout: Duration,
}

impl Executor<SqliteDriver> {
    /// SQLite executor with no stored procedures and the default timeout.
    pub fn sqlite(connection_string: impl Into<String>) -> Self {
        Executor::new(SqliteDriver::new(), connection_string)
    }

    /// SQLite executor built from a loaded configuration file.
    pub fn from_config(config: &Config) -> Self {
        Executor::with_timeout(
            SqliteDriver::with_procedures(config.procedures.clone()),
            config.database.connection_string.clone(),
            config.timeout(),
        )
    }
}

impl<D: Driver> Executor<D> {
    pub fn new(driver: D, connection_string: impl Into<String>) -> Self {
        Executor::with_timeout(driver, connection_string, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(driver: D, connection_string: impl Into<String>, timeout: Duration) -> Self {
        Executor {
            driver,
            connection_string: connection_string.into(),
            timeout,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Opens a connection the caller will own, for use with the `_on` operations.
    pub fn open(&self) -> Result<D::Conn> {
        self.driver
            .open(&self.connection_string)
            .map_err(|e| ExecError::connection("Failed to open connection.", e))
    }

    /// Opens and immediately closes a connection.
    pub fn check_connection(&self) -> ConnectionCheck {
        let outcome = Lease::acquire(&self.driver, &self.connection_string).and_then(Lease::release);
        report_check(outcome)
    }

    /// Pings a caller-supplied connection.
    pub fn check_connection_on(&self, conn: &mut D::Conn) -> ConnectionCheck {
        report_check(conn.ping())
    }

    /// Runs an INSERT/UPDATE/DELETE-class command; returns rows affected.
    pub fn execute_non_query(&self, command: Command, context: &str) -> Result<u64> {
        let lease = self.acquire(context)?;
        self.run(lease, context, |conn| conn.execute(&self.stamp(command)))
    }

    /// `execute_non_query` on a caller-owned connection, which stays open.
    pub fn execute_non_query_on(&self, conn: &mut D::Conn, command: Command, context: &str) -> Result<u64> {
        self.run(Lease::borrowed(conn), context, |conn| conn.execute(&self.stamp(command)))
    }

    /// Returns the first column of the first row, or `None` when there are no rows.
    pub fn execute_scalar(&self, command: Command, context: &str) -> Result<Option<Value>> {
        let lease = self.acquire(context)?;
        self.run(lease, context, |conn| conn.query_scalar(&self.stamp(command)))
    }

    /// `execute_scalar` on a caller-owned connection.
    pub fn execute_scalar_on(
        &self,
        conn: &mut D::Conn,
        command: Command,
        context: &str,
    ) -> Result<Option<Value>> {
        self.run(Lease::borrowed(conn), context, |conn| conn.query_scalar(&self.stamp(command)))
    }

    /// Materializes the full result set.
    pub fn execute_tabular(&self, command: Command, context: &str) -> Result<Table> {
        let lease = self.acquire(context)?;
        self.run(lease, context, |conn| conn.query_table(&self.stamp(command)))
    }

    /// `execute_tabular` on a caller-owned connection.
    pub fn execute_tabular_on(&self, conn: &mut D::Conn, command: Command, context: &str) -> Result<Table> {
        self.run(Lease::borrowed(conn), context, |conn| conn.query_table(&self.stamp(command)))
    }

    /// Runs one command inside a transaction, committing on success.
    ///
    /// On failure the transaction is rolled back. If the rollback fails too,
    /// the error is `ExecError::Rollback` carrying both failures.
    pub fn execute_transaction(&self, command: Command, context: &str) -> Result<u64> {
        self.execute_transaction_batch(std::iter::once(command), context)
    }

    /// `execute_transaction` on a caller-owned connection; the transaction
    /// is always finished before returning, the connection is left open.
    pub fn execute_transaction_on(&self, conn: &mut D::Conn, command: Command, context: &str) -> Result<u64> {
        self.execute_transaction_batch_on(conn, std::iter::once(command), context)
    }

    /// Runs several commands inside one transaction; returns total rows affected.
    pub fn execute_transaction_batch(
        &self,
        commands: impl IntoIterator<Item = Command>,
        context: &str,
    ) -> Result<u64> {
        let lease = self.acquire(context)?;
        self.transact(lease, commands, context)
    }

    /// `execute_transaction_batch` on a caller-owned connection.
    pub fn execute_transaction_batch_on(
        &self,
        conn: &mut D::Conn,
        commands: impl IntoIterator<Item = Command>,
        context: &str,
    ) -> Result<u64> {
        self.transact(Lease::borrowed(conn), commands, context)
    }

    /// Same as `execute_non_query`, with the command kind forced to stored procedure.
    pub fn execute_stored_procedure(&self, command: Command, context: &str) -> Result<u64> {
        self.execute_non_query(command.with_kind(CommandKind::StoredProcedure), context)
    }

    /// `execute_stored_procedure` on a caller-owned connection.
    pub fn execute_stored_procedure_on(
        &self,
        conn: &mut D::Conn,
        command: Command,
        context: &str,
    ) -> Result<u64> {
        self.execute_non_query_on(conn, command.with_kind(CommandKind::StoredProcedure), context)
    }

    fn stamp(&self, command: Command) -> Command {
        command.with_timeout(self.timeout)
    }

    fn acquire(&self, context: &str) -> Result<Lease<'_, D>> {
        Lease::acquire(&self.driver, &self.connection_string).map_err(|e| {
            error!("Failed to open connection: {}", e);
            ExecError::connection(context, e)
        })
    }

    /// Runs `op` on the leased connection, then releases the lease.
    ///
    /// A failure from `op` wins over a failure to close; the close failure is
    /// only reported when `op` succeeded.
    fn run<'a, T>(
        &self,
        mut lease: Lease<'a, D>,
        context: &str,
        op: impl FnOnce(&mut D::Conn) -> std::result::Result<T, DriverError>,
    ) -> Result<T> {
        let outcome = op(lease.conn()).map_err(|e| {
            debug!("Command failed: {}", e);
            ExecError::execution(context, e)
        });
        self.finish(lease, context, outcome)
    }

    fn transact<'a>(
        &self,
        mut lease: Lease<'a, D>,
        commands: impl IntoIterator<Item = Command>,
        context: &str,
    ) -> Result<u64> {
        let outcome = self.in_transaction(lease.conn(), commands, context);
        self.finish(lease, context, outcome)
    }

    fn in_transaction(
        &self,
        conn: &mut D::Conn,
        commands: impl IntoIterator<Item = Command>,
        context: &str,
    ) -> Result<u64> {
        let mut tx = TransactionGuard::begin(conn).map_err(|e| ExecError::execution(context, e))?;

        let work = || -> std::result::Result<u64, DriverError> {
            let mut affected = 0;
            for command in commands {
                affected += tx.conn().execute(&self.stamp(command))?;
            }
            tx.commit()?;
            Ok(affected)
        };

        match work() {
            Ok(affected) => Ok(affected),
            Err(cause) => match tx.rollback() {
                Ok(()) => Err(ExecError::execution(context, cause)),
                Err(rollback) => {
                    error!("Rollback failed after command failure: {}", rollback);
                    Err(ExecError::rollback(context, cause, rollback))
                }
            },
        }
    }

    fn finish<'a, T>(&self, lease: Lease<'a, D>, context: &str, outcome: Result<T>) -> Result<T> {
        match (outcome, lease.release()) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(ExecError::connection(context, e)),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(e)) => {
                warn!("Failed to close connection after error: {}", e);
                Err(err)
            }
        }
    }
}

fn report_check(outcome: std::result::Result<(), DriverError>) -> ConnectionCheck {
    match outcome {
        Ok(()) => ConnectionCheck::Success,
        Err(e) => ConnectionCheck::Failed(e.to_string()),
    }
}
