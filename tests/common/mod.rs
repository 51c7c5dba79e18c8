//! Shared test infrastructure: a driver double that records every lifecycle
//! call and can be told to fail at any step.
#![allow(dead_code)]

use sqlexec::{Command, Driver, DriverConnection, DriverError, Table, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Which primitives should fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub open: bool,
    pub execute: bool,
    pub commit: bool,
    pub rollback: bool,
    pub close: bool,
    pub panic_on_execute: bool,
}

/// Everything the driver and its connections were asked to do.
#[derive(Debug, Default)]
pub struct Journal {
    pub opened: Vec<usize>,
    pub closed: Vec<usize>,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    pub journal: Arc<Mutex<Journal>>,
    pub faults: Faults,
    pub affected: u64,
}

impl RecordingDriver {
    pub fn new(affected: u64) -> Self {
        RecordingDriver {
            affected,
            ..RecordingDriver::default()
        }
    }

    pub fn failing(faults: Faults) -> Self {
        RecordingDriver {
            faults,
            ..RecordingDriver::default()
        }
    }

    pub fn opened(&self) -> Vec<usize> {
        self.journal.lock().unwrap().opened.clone()
    }

    pub fn closed(&self) -> Vec<usize> {
        self.journal.lock().unwrap().closed.clone()
    }

    pub fn commits(&self) -> usize {
        self.journal.lock().unwrap().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.journal.lock().unwrap().rollbacks
    }

    pub fn last_timeout(&self) -> Option<Duration> {
        self.journal.lock().unwrap().commands.last().map(|c| c.timeout)
    }

    pub fn commands(&self) -> Vec<Command> {
        self.journal.lock().unwrap().commands.clone()
    }
}

#[derive(Debug)]
pub struct RecordingConnection {
    pub id: usize,
    journal: Arc<Mutex<Journal>>,
    faults: Faults,
    affected: u64,
}

impl Driver for RecordingDriver {
    type Conn = RecordingConnection;

    fn open(&self, _connection_string: &str) -> Result<RecordingConnection, DriverError> {
        if self.faults.open {
            return Err(DriverError::Other("unable to open database file".to_string()));
        }
        let mut journal = self.journal.lock().unwrap();
        let id = journal.opened.len();
        journal.opened.push(id);
        Ok(RecordingConnection {
            id,
            journal: Arc::clone(&self.journal),
            faults: self.faults,
            affected: self.affected,
        })
    }

    fn close(&self, conn: RecordingConnection) -> Result<(), DriverError> {
        self.journal.lock().unwrap().closed.push(conn.id);
        if self.faults.close {
            return Err(DriverError::Other("close failed".to_string()));
        }
        Ok(())
    }
}

impl RecordingConnection {
    fn record(&self, command: &Command) -> Result<(), DriverError> {
        self.journal.lock().unwrap().commands.push(command.clone());
        if self.faults.panic_on_execute {
            panic!("driver blew up");
        }
        if self.faults.execute {
            return Err(DriverError::Other("constraint violated".to_string()));
        }
        Ok(())
    }
}

impl DriverConnection for RecordingConnection {
    fn ping(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn execute(&mut self, command: &Command) -> Result<u64, DriverError> {
        self.record(command)?;
        Ok(self.affected)
    }

    fn query_scalar(&mut self, command: &Command) -> Result<Option<Value>, DriverError> {
        self.record(command)?;
        Ok(Some(Value::Integer(self.affected as i64)))
    }

    fn query_table(&mut self, command: &Command) -> Result<Table, DriverError> {
        self.record(command)?;
        let mut table = Table::new(vec!["n".to_string()]);
        table.push(vec![Value::Integer(self.affected as i64)]);
        Ok(table)
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        self.journal.lock().unwrap().begins += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        if self.faults.commit {
            return Err(DriverError::Other("database is locked".to_string()));
        }
        self.journal.lock().unwrap().commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        if self.faults.rollback {
            return Err(DriverError::Other("cannot rollback - no transaction is active".to_string()));
        }
        self.journal.lock().unwrap().rollbacks += 1;
        Ok(())
    }
}
