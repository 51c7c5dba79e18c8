//! Connection and transaction lifecycle accounting, checked with a recording
//! driver double.

mod common;

use common::{Faults, RecordingDriver};
use sqlexec::{Command, CommandKind, ConnectionCheck, Driver, ErrorKind, Executor};
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

fn update() -> Command {
    Command::text("UPDATE t SET x = 1 WHERE id = @id").param("@id", 5)
}

#[test]
fn test_self_managed_calls_close_every_connection() {
    let driver = RecordingDriver::new(1);
    let executor = Executor::new(driver.clone(), "test");

    executor.execute_non_query(update(), "update failed").unwrap();
    executor.execute_scalar(update(), "scalar failed").unwrap();
    executor.execute_tabular(update(), "tabular failed").unwrap();
    executor.execute_transaction(update(), "transaction failed").unwrap();
    executor.execute_stored_procedure(Command::procedure("p"), "procedure failed").unwrap();
    assert!(executor.check_connection().is_success());

    assert_eq!(driver.opened().len(), 6);
    assert_eq!(driver.opened(), driver.closed());
}

#[test]
fn test_self_managed_calls_close_on_failure() {
    let driver = RecordingDriver::failing(Faults {
        execute: true,
        ..Faults::default()
    });
    let executor = Executor::new(driver.clone(), "test");

    assert!(executor.execute_non_query(update(), "update failed").is_err());
    assert!(executor.execute_scalar(update(), "scalar failed").is_err());
    assert!(executor.execute_tabular(update(), "tabular failed").is_err());
    assert!(executor.execute_transaction(update(), "transaction failed").is_err());

    assert_eq!(driver.opened().len(), 4);
    assert_eq!(driver.opened(), driver.closed());
}

#[test]
fn test_self_managed_call_closes_on_rollback_failure() {
    let driver = RecordingDriver::failing(Faults {
        execute: true,
        rollback: true,
        ..Faults::default()
    });
    let executor = Executor::new(driver.clone(), "test");

    let err = executor.execute_transaction(update(), "transfer failed").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Rollback);
    assert_eq!(driver.opened(), driver.closed());
    assert_eq!(driver.commits(), 0);
}

#[test]
fn test_self_managed_call_closes_when_driver_panics() {
    let driver = RecordingDriver::failing(Faults {
        panic_on_execute: true,
        ..Faults::default()
    });
    let executor = Executor::new(driver.clone(), "test");

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _ = executor.execute_non_query(update(), "update failed");
    }));
    assert!(result.is_err());
    assert_eq!(driver.opened().len(), 1);
    assert_eq!(driver.opened(), driver.closed());
}

#[test]
fn test_transaction_panic_rolls_back_and_closes() {
    let driver = RecordingDriver::failing(Faults {
        panic_on_execute: true,
        ..Faults::default()
    });
    let executor = Executor::new(driver.clone(), "test");

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _ = executor.execute_transaction(update(), "transaction failed");
    }));
    assert!(result.is_err());
    assert_eq!(driver.commits(), 0);
    assert_eq!(driver.rollbacks(), 1);
    assert_eq!(driver.opened(), driver.closed());
}

#[test]
fn test_caller_supplied_connection_is_never_closed() {
    let driver = RecordingDriver::new(2);
    let executor = Executor::new(driver.clone(), "test");
    let mut conn = driver.open("test").unwrap();

    assert_eq!(executor.execute_non_query_on(&mut conn, update(), "update failed").unwrap(), 2);
    executor.execute_scalar_on(&mut conn, update(), "scalar failed").unwrap();
    executor.execute_tabular_on(&mut conn, update(), "tabular failed").unwrap();
    executor.execute_transaction_on(&mut conn, update(), "transaction failed").unwrap();
    executor
        .execute_stored_procedure_on(&mut conn, Command::procedure("p"), "procedure failed")
        .unwrap();
    assert_eq!(executor.check_connection_on(&mut conn), ConnectionCheck::Success);

    assert_eq!(driver.opened().len(), 1);
    assert!(driver.closed().is_empty());
}

#[test]
fn test_caller_supplied_connection_is_never_closed_on_failure() {
    let driver = RecordingDriver::failing(Faults {
        execute: true,
        rollback: true,
        ..Faults::default()
    });
    let executor = Executor::new(driver.clone(), "test");
    let mut conn = driver.open("test").unwrap();

    assert!(executor.execute_non_query_on(&mut conn, update(), "update failed").is_err());
    assert!(executor.execute_transaction_on(&mut conn, update(), "transaction failed").is_err());

    assert!(driver.closed().is_empty());
}

#[test]
fn test_open_failure_is_a_connection_error() {
    let driver = RecordingDriver::failing(Faults {
        open: true,
        ..Faults::default()
    });
    let executor = Executor::new(driver.clone(), "test");

    let err = executor.execute_non_query(update(), "update failed").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(err.to_string(), "update failed Details = unable to open database file");

    let check = executor.check_connection();
    assert_eq!(check, ConnectionCheck::Failed("unable to open database file".to_string()));
    assert!(driver.closed().is_empty());
}

#[test]
fn test_close_failure_after_success_is_reported() {
    let driver = RecordingDriver::failing(Faults {
        close: true,
        ..Faults::default()
    });
    let executor = Executor::new(driver.clone(), "test");

    let err = executor.execute_non_query(update(), "update failed").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.to_string().contains("close failed"));
    assert!(!executor.check_connection().is_success());
}

#[test]
fn test_close_failure_does_not_mask_execution_error() {
    let driver = RecordingDriver::failing(Faults {
        execute: true,
        close: true,
        ..Faults::default()
    });
    let executor = Executor::new(driver.clone(), "test");

    let err = executor.execute_non_query(update(), "update failed").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert_eq!(err.to_string(), "update failed Details = constraint violated");
}

#[test]
fn test_transaction_failure_rolls_back_without_commit() {
    let driver = RecordingDriver::failing(Faults {
        execute: true,
        ..Faults::default()
    });
    let executor = Executor::new(driver.clone(), "test");

    let err = executor.execute_transaction(update(), "transfer failed").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert_eq!(driver.commits(), 0);
    assert_eq!(driver.rollbacks(), 1);
}

#[test]
fn test_rollback_failure_reports_both_errors() {
    let driver = RecordingDriver::failing(Faults {
        execute: true,
        rollback: true,
        ..Faults::default()
    });
    let executor = Executor::new(driver.clone(), "test");
    let mut conn = driver.open("test").unwrap();

    let err = executor
        .execute_transaction_on(&mut conn, update(), "transfer failed")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Rollback);
    let msg = err.to_string();
    assert!(msg.starts_with("transfer failed Details = constraint violated"), "{}", msg);
    assert!(msg.contains("Rollback error = cannot rollback"), "{}", msg);
}

#[test]
fn test_commit_failure_triggers_rollback() {
    let driver = RecordingDriver::failing(Faults {
        commit: true,
        ..Faults::default()
    });
    let executor = Executor::new(driver.clone(), "test");

    let err = executor.execute_transaction(update(), "transfer failed").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert!(err.to_string().contains("database is locked"));
    assert_eq!(driver.rollbacks(), 1);
    assert_eq!(driver.opened(), driver.closed());
}

#[test]
fn test_timeout_and_kind_are_applied_to_commands() {
    let driver = RecordingDriver::new(0);
    let executor = Executor::with_timeout(driver.clone(), "test", Duration::from_secs(7));

    executor
        .execute_non_query(update().with_timeout(Duration::from_secs(1)), "update failed")
        .unwrap();
    assert_eq!(driver.last_timeout(), Some(Duration::from_secs(7)));

    executor
        .execute_stored_procedure(Command::text("archive_orders"), "procedure failed")
        .unwrap();
    let last = driver.commands().pop().unwrap();
    assert_eq!(last.kind, CommandKind::StoredProcedure);
    assert_eq!(last.text, "archive_orders");
}

#[test]
fn test_batch_transaction_sums_affected_rows() {
    let driver = RecordingDriver::new(3);
    let executor = Executor::new(driver.clone(), "test");

    let affected = executor
        .execute_transaction_batch(vec![update(), update(), update()], "batch failed")
        .unwrap();
    assert_eq!(affected, 9);
    assert_eq!(driver.commits(), 1);
    assert_eq!(driver.commands().len(), 3);
}
