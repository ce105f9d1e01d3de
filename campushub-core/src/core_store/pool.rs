//! Store handle: a pooled SQLite database plus its change feed.
//!
//! The store is the single arbiter of truth. Components treat their own
//! state as a cache that reconciles against store-confirmed writes, and
//! every invariant check happens here as a compare-and-insert against a
//! uniqueness constraint, never as a separate read-then-write.

use super::error::{StoreError, StoreResult};
use super::feed::ChangeFeed;
use super::migrations;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

/// Pooled SQLite connection type
pub type SqlitePool = Pool<SqliteConnectionManager>;

/// Handle to the coordinator's persistent store.
///
/// Cheap to clone; all clones share the pool and the change feed.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    feed: ChangeFeed,
}

impl Store {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(init_connection);
        Self::from_manager(manager)
    }

    /// Create a fresh in-memory store.
    ///
    /// Uses a uniquely named shared-cache database so that every pooled
    /// connection sees the same data; a plain `:memory:` database would be
    /// private to each connection.
    pub fn memory() -> StoreResult<Self> {
        let uri = format!(
            "file:campushub-mem-{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4()
        );
        let manager = SqliteConnectionManager::file(uri).with_init(init_connection);
        Self::from_manager(manager)
    }

    fn from_manager(manager: SqliteConnectionManager) -> StoreResult<Self> {
        let pool = Pool::new(manager).map_err(|e| StoreError::Pool(e.to_string()))?;
        migrations::migrate(&pool)?;
        Ok(Self {
            pool,
            feed: ChangeFeed::default(),
        })
    }

    /// Get a pooled connection.
    pub fn conn(&self) -> StoreResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The store's change feed.
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }
}

fn init_connection(conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
}
