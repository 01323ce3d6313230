//! `SQLite` backend for the record store.
//!
//! - **[`connection`]**: `r2d2` pool with pragmas applied on every connection.
//! - **[`migrations`]**: embedded, version-tracked schema migrations.
//! - **[`repositories`]**: one stateless struct per relation.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{
    ConnectionConfig, ConnectionPool, PooledConnection, PragmaState, new_file, new_in_memory,
    verify_pragmas,
};
pub use migrations::{current_version, latest_version, run_migrations};
