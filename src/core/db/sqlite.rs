/// SQLite Driver Module
///
/// `SqliteDriver` implements the driver traits on top of `rusqlite`.
///
/// SQLite has no server-side stored procedures, so the driver keeps a named
/// registry of SQL bodies; a `StoredProcedure` command is resolved against it
/// and then runs like any text command.
///
/// Each command runs under its own deadline: the command timeout becomes the
/// busy timeout, and a progress handler interrupts statements that outlive it.
use super::connection::ConnectionString;
use super::driver::{Driver, DriverConnection};
use super::query::{Command, CommandKind, Params, Table, Value};
use crate::core::DriverError;
use rusqlite::types::ToSql;
use rusqlite::{Batch, Connection, ErrorCode, Statement};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Number of SQLite VM instructions between deadline checks.
const PROGRESS_CHECK_OPS: i32 = 1000;

/// Largest busy timeout SQLite accepts (milliseconds in a C int).
const MAX_BUSY_TIMEOUT: Duration = Duration::from_millis(i32::MAX as u64);

/// Connection factory for SQLite databases.
#[derive(Debug, Clone, Default)]
pub struct SqliteDriver {
    procedures: Arc<HashMap<String, String>>,
}

impl SqliteDriver {
    pub fn new() -> Self {
        SqliteDriver::default()
    }

    /// Driver that resolves stored-procedure commands against `procedures`
    /// (procedure name to SQL body).
    pub fn with_procedures(procedures: HashMap<String, String>) -> Self {
        SqliteDriver {
            procedures: Arc::new(procedures),
        }
    }

    pub fn procedure(&self, name: &str) -> Option<&str> {
        self.procedures.get(name).map(String::as_str)
    }
}

impl Driver for SqliteDriver {
    type Conn = SqliteConnection;

    fn open(&self, connection_string: &str) -> Result<SqliteConnection, DriverError> {
        let cs = ConnectionString::parse(connection_string)?;
        let conn = Connection::open_with_flags(&cs.data_source, cs.open_flags())?;

        if let Some(enabled) = cs.foreign_keys {
            conn.pragma_update(None, "foreign_keys", enabled)?;
        }

        debug!("Opened SQLite database {}", cs.data_source);
        Ok(SqliteConnection {
            conn,
            procedures: Arc::clone(&self.procedures),
        })
    }

    fn close(&self, conn: SqliteConnection) -> Result<(), DriverError> {
        conn.conn.close().map_err(|(_, e)| DriverError::Sqlite(e))
    }
}

/// Live SQLite session handed out by `SqliteDriver`.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: Connection,
    procedures: Arc<HashMap<String, String>>,
}

impl SqliteConnection {
    /// The underlying `rusqlite` connection, for work outside the executor.
    pub fn raw(&self) -> &Connection {
        &self.conn
    }

    fn resolve<'c>(&'c self, command: &'c Command) -> Result<&'c str, DriverError> {
        match command.kind {
            CommandKind::Text => Ok(command.text.as_str()),
            CommandKind::StoredProcedure => self
                .procedures
                .get(&command.text)
                .map(String::as_str)
                .ok_or_else(|| DriverError::UnknownProcedure(command.text.clone())),
        }
    }

    /// Prepares the command's SQL, checks its bindings, and hands the
    /// statement plus bound parameters to `run` under the command deadline.
    fn with_statement<T>(
        &self,
        command: &Command,
        run: impl FnOnce(&mut Statement<'_>, &[(&str, &dyn ToSql)]) -> rusqlite::Result<T>,
    ) -> Result<T, DriverError> {
        let sql = self.resolve(command)?;
        debug!(
            "Executing {:?} command ({} params, timeout {:?})",
            command.kind,
            command.params.len(),
            command.timeout
        );

        let _deadline = Deadline::arm(&self.conn, command.timeout)?;
        let mut stmt = prepare_single(&self.conn, sql)?;
        check_bindings(&stmt, &command.params)?;

        let named: Vec<(&str, &dyn ToSql)> = command
            .params
            .iter()
            .map(|(name, value)| (name, value as &dyn ToSql))
            .collect();

        run(&mut stmt, &named).map_err(|e| classify(e, command.timeout))
    }
}

impl DriverConnection for SqliteConnection {
    fn ping(&mut self) -> Result<(), DriverError> {
        self.conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    fn execute(&mut self, command: &Command) -> Result<u64, DriverError> {
        let affected = self.with_statement(command, |stmt, params| stmt.execute(params))?;
        debug!("Command affected {} rows", affected);
        Ok(affected as u64)
    }

    fn query_scalar(&mut self, command: &Command) -> Result<Option<Value>, DriverError> {
        self.with_statement(command, |stmt, params| {
            let mut rows = stmt.query(params)?;
            match rows.next()? {
                Some(row) => Ok(Some(Value::from(row.get_ref(0)?))),
                None => Ok(None),
            }
        })
    }

    fn query_table(&mut self, command: &Command) -> Result<Table, DriverError> {
        let table = self.with_statement(command, |stmt, params| {
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let column_count = columns.len();
            let mut table = Table::new(columns);

            let mut rows = stmt.query(params)?;
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    values.push(Value::from(row.get_ref(i)?));
                }
                table.push(values);
            }
            Ok(table)
        })?;
        debug!("Query returned {} rows", table.len());
        Ok(table)
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        // SQLite ends the transaction itself after an interrupt, SQLITE_FULL, IOERR, BUSY or NOMEM
        if self.conn.is_autocommit() {
            debug!("Transaction already rolled back by SQLite");
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

/// Prepares the only statement in `sql`; trailing statements are refused
/// rather than silently skipped.
fn prepare_single<'c>(conn: &'c Connection, sql: &str) -> Result<Statement<'c>, DriverError> {
    let mut batch = Batch::new(conn, sql);
    let stmt = batch
        .next()?
        .ok_or_else(|| DriverError::Other("Command contains no SQL statement".to_string()))?;
    if batch.next()?.is_some() {
        return Err(DriverError::MultipleStatements);
    }
    Ok(stmt)
}

/// Every parameter the statement declares must have a value, and every
/// supplied value must name a parameter the statement declares.
fn check_bindings(stmt: &Statement<'_>, params: &Params) -> Result<(), DriverError> {
    for index in 1..=stmt.parameter_count() {
        match stmt.parameter_name(index) {
            Some(name) if !params.contains(name) => {
                return Err(DriverError::MissingParameter(name.to_string()));
            }
            Some(_) => {}
            None => {
                return Err(DriverError::Other(format!(
                    "Positional parameter ?{} cannot be bound by name",
                    index
                )));
            }
        }
    }

    for (name, _) in params.iter() {
        if stmt.parameter_index(name)?.is_none() {
            return Err(DriverError::Sqlite(rusqlite::Error::InvalidParameterName(
                name.to_string(),
            )));
        }
    }
    Ok(())
}

/// Turns SQLite's interruption into a timeout error.
fn classify(err: rusqlite::Error, timeout: Duration) -> DriverError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted => {
            DriverError::Timeout(timeout)
        }
        _ => DriverError::Sqlite(err),
    }
}

/// Deadline armed on a connection for the span of one command.
struct Deadline<'c> {
    conn: &'c Connection,
}

impl<'c> Deadline<'c> {
    fn arm(conn: &'c Connection, timeout: Duration) -> Result<Self, DriverError> {
        conn.busy_timeout(timeout.min(MAX_BUSY_TIMEOUT))?;
        // A deadline past the end of the clock is no deadline
        if let Some(expires) = Instant::now().checked_add(timeout) {
            conn.progress_handler(PROGRESS_CHECK_OPS, Some(move || Instant::now() >= expires));
        }
        Ok(Deadline { conn })
    }
}

impl Drop for Deadline<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}
