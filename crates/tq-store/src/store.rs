//! Connection handle and transaction boundaries

use crate::error::{StoreError, StoreResult};
use crate::schema;
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default bound on lock waits
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Open options
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Bound on every lock wait
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

/// SQLite-backed store.
///
/// One connection behind a mutex. Several `Store`s (in this process or
/// others) may point at the same file; SQLite's writer lock serialises them.
pub struct Store {
    conn: Mutex<Connection>,
    busy_timeout: Duration,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("busy_timeout", &self.busy_timeout)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open (creating if needed) a database file
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        // before the WAL switch, which needs an exclusive lock
        conn.busy_timeout(options.busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(journal_mode = %mode, "journal mode set");
        Self::init(conn, options, Some(path.to_path_buf()))
    }

    /// Private in-memory database
    pub fn in_memory() -> StoreResult<Self> {
        let options = StoreOptions::default();
        let conn = Connection::open_in_memory()?;
        conn.busy_timeout(options.busy_timeout)?;
        Self::init(conn, options, None)
    }

    fn init(conn: Connection, options: StoreOptions, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::bootstrap(&conn)?;
        debug!(path = ?path, "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            busy_timeout: options.busy_timeout,
            path,
        })
    }

    /// Database file, if not in memory
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Configured lock wait bound
    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }

    /// Recorded schema version
    pub fn schema_version(&self) -> StoreResult<i64> {
        self.read(|conn| schema::schema_version(conn))
    }

    fn lock(&self) -> StoreResult<parking_lot::MutexGuard<'_, Connection>> {
        self.conn.try_lock_for(self.busy_timeout).ok_or_else(|| {
            StoreError::Busy(format!(
                "connection handle not available within {} ms",
                self.busy_timeout.as_millis()
            ))
        })
    }

    /// Run a read-only unit of work
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run a write unit of work in one `BEGIN IMMEDIATE` transaction.
    ///
    /// The writer lock is taken before `f` runs, so every read inside `f`
    /// sees the latest committed state. The deadline is checked before `f`
    /// and again before commit; an error or a missed deadline rolls back.
    pub fn write<T, E, F>(&self, deadline: Option<Instant>, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        check_deadline(deadline, "start")?;
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let value = f(&tx)?;
        check_deadline(deadline, "commit")?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

fn check_deadline(deadline: Option<Instant>, stage: &'static str) -> StoreResult<()> {
    match deadline {
        Some(d) if Instant::now() >= d => Err(StoreError::DeadlineExceeded(stage)),
        _ => Ok(()),
    }
}
