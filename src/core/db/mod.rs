/// Database Module
///
/// This module provides the database layer the executor orchestrates,
/// organized into focused submodules.
///
/// ## Architecture
///
/// - **Driver** (`driver.rs`): The traits a database client implements to be driven by the executor
/// - **Connection Management** (`connection.rs`): Connection strings, connection leases and transaction guards
/// - **Commands and Results** (`query.rs`): Command specs, parameters, values and result tables
/// - **SQLite** (`sqlite.rs`): The `rusqlite`-backed driver
///
/// ## Error Handling
///
/// Driver primitives report `DriverError`; the executor wraps those into `ExecError`
/// together with the caller's context message.
pub mod connection;
pub mod driver;
pub mod query;
pub mod sqlite;

pub use connection::*;
pub use driver::*;
pub use query::*;
pub use sqlite::*;
