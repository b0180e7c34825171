//! SQLite connection pooling.
//!
//! Connections come from an [`r2d2`] pool over [`SqliteConnectionManager`].
//! Every file connection runs in WAL mode with a busy timeout. Waiting for a
//! free connection is bounded by the acquire timeout, and a closed pool
//! refuses to hand out connections.

use std::path::Path;
use std::time::Duration;

use parking_lot::RwLock;
use r2d2::{ManageConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::debug;

use crate::error::{Error, Result};

/// SQLite busy timeout applied to every file connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A connection borrowed from a [`ConnectionPool`], returned on drop.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool of connections to one database.
pub struct ConnectionPool {
    /// `None` once closed.
    pool: RwLock<Option<Pool<SqliteConnectionManager>>>,
    acquire_timeout: Duration,
    max_size: u32,
}

impl ConnectionPool {
    /// Pool over a database file. One connection is opened up front so that
    /// an unusable path fails here.
    pub fn open<P: AsRef<Path>>(path: P, max_size: usize, acquire_timeout: Duration) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(init_file_connection);
        Self::build(manager, max_size, acquire_timeout)
    }

    /// Pool over a private in-memory database, limited to one connection.
    pub fn in_memory(acquire_timeout: Duration) -> Result<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        Self::build(manager, 1, acquire_timeout)
    }

    fn build(
        manager: SqliteConnectionManager,
        max_size: usize,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let first = manager.connect()?;
        let max_size = u32::try_from(max_size.max(1)).unwrap_or(u32::MAX);
        let acquire_timeout = acquire_timeout.max(Duration::from_millis(1));

        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(0))
            .connection_timeout(acquire_timeout)
            .build_unchecked(manager);
        drop(first);

        Ok(Self {
            pool: RwLock::new(Some(pool)),
            acquire_timeout,
            max_size,
        })
    }

    /// Borrow a connection, waiting at most the acquire timeout.
    pub fn get(&self) -> Result<PooledConnection> {
        let pool = self.pool.read().clone().ok_or(Error::StoreClosed)?;
        pool.get().map_err(|e| {
            debug!("No database connection available: {}", e);
            Error::PoolTimeout(self.acquire_timeout)
        })
    }

    /// Stop handing out connections.
    ///
    /// Idle connections close now, borrowed ones once they are returned.
    /// Later [`get`](Self::get) calls fail with [`Error::StoreClosed`].
    pub fn close(&self) {
        if let Some(pool) = self.pool.write().take() {
            let state = pool.state();
            debug!(
                "Closing connection pool ({} open, {} idle)",
                state.connections, state.idle_connections
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.read().is_none()
    }

    /// Number of connections currently open, borrowed or idle.
    pub fn open_connections(&self) -> u32 {
        self.pool
            .read()
            .as_ref()
            .map_or(0, |pool| pool.state().connections)
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }
}

fn init_file_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)
}
