//! Shared `SQLite` infrastructure for storage backends.
//!
//! The persistence, index and history backends each own a connection,
//! possibly to the same database file. This module holds what they share:
//!
//! - [`connection`]: lock acquisition, connection setup, transactions
//! - [`metrics`]: operation metrics recording

mod connection;
mod metrics;

pub use connection::{
    acquire_lock, configure_connection, open_connection, sqlite_error, with_transaction,
};
pub use metrics::{measured, record_operation_metrics};
