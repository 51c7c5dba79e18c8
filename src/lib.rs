// Core infrastructure modules
pub mod core;

// Feature-specific modules
pub mod config;
pub mod executor;

pub use crate::core::db::{
    Command, CommandKind, ConnectionString, Driver, DriverConnection, OpenMode, Params, Row,
    SqliteConnection, SqliteDriver, Table, Value,
};
pub use crate::core::{DriverError, ErrorKind, ExecError, Result};
pub use config::{load_config, Config};
pub use executor::{ConnectionCheck, Executor, DEFAULT_TIMEOUT};
