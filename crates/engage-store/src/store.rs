//! The [`Store`] handle: a connection pool with the schema applied.

use std::path::Path;

use rusqlite::Connection;
use tracing::{debug, instrument};

use crate::errors::{Result, StoreError};
use crate::sqlite::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::sqlite::migrations;

/// Shared handle to the record store. Cloning is cheap and shares the pool.
#[derive(Clone, Debug)]
pub struct Store {
    pool: ConnectionPool,
}

impl Store {
    /// Open (or create) a database file and apply pending migrations.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path, config: &ConnectionConfig) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Migration {
                message: format!("cannot create {}: {e}", parent.display()),
            })?;
        }
        let pool = connection::new_file(&path.to_string_lossy(), config)?;
        let store = Self { pool };
        let _ = store.migrate()?;
        Ok(store)
    }

    /// A migrated in-memory store backed by a single connection.
    pub fn in_memory() -> Result<Self> {
        let pool = connection::new_in_memory(&ConnectionConfig::default())?;
        let store = Self { pool };
        let _ = store.migrate()?;
        Ok(store)
    }

    /// Apply pending migrations, returning how many ran.
    pub fn migrate(&self) -> Result<u32> {
        let conn = self.conn()?;
        let applied = migrations::run_migrations(&conn)?;
        debug!(applied, "schema up to date");
        Ok(applied)
    }

    pub fn schema_version(&self) -> Result<u32> {
        migrations::current_version(&*self.conn()?)
    }

    /// Borrow a pooled connection.
    ///
    /// The in-memory pool has one connection: drop it before calling back
    /// into the store.
    pub fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Run `f` on a pooled connection.
    pub fn with_conn<T, E>(&self, f: impl FnOnce(&Connection) -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
    {
        let conn = self.conn()?;
        f(&conn)
    }

    /// Run `f` inside a transaction. Commits when `f` returns `Ok`; the
    /// transaction rolls back on drop otherwise.
    pub fn with_transaction<T, E>(
        &self,
        f: impl FnOnce(&Connection) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
    {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction().map_err(StoreError::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
