//! SQLite store for the kaban engine.
//!
//! One [`Store`] owns one connection to `<project>/.kaban/board.db`. The
//! services share it behind an `Arc`; cross-process coordination relies on
//! SQLite's WAL mode and write lock.
//!
//! Multi-step operations run through [`Store::with_tx`] so either every
//! mutation and its audit rows commit, or none do. SQLITE_BUSY is retried
//! with bounded exponential backoff; everything else surfaces.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, InterruptHandle, Transaction, TransactionBehavior};

use crate::error::{Error, Result};
use crate::migrations;

/// Name of the database file inside the `.kaban` directory
pub const DB_FILENAME: &str = "board.db";

/// Maximum number of attempts for a busy database
const BUSY_MAX_ATTEMPTS: u32 = 3;

/// Base backoff delay between busy retries
const BUSY_BASE_DELAY_MS: u64 = 25;

/// SQLite-backed store
pub struct Store {
    conn: Mutex<Connection>,
    dir: PathBuf,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("dir", &self.dir).finish()
    }
}

impl Store {
    /// Open (or create) the database under the given `.kaban` directory,
    /// applying any unapplied migrations.
    pub fn open(kaban_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = kaban_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|err| Error::StoreOpen {
            path: dir.display().to_string(),
            message: err.to_string(),
        })?;

        let db_path = dir.join(DB_FILENAME);
        let conn = Connection::open(&db_path).map_err(|err| Error::StoreOpen {
            path: db_path.display().to_string(),
            message: err.to_string(),
        })?;

        let store = Self::setup(conn, dir)?;
        tracing::debug!(path = %db_path.display(), "store opened");
        Ok(store)
    }

    /// Open an in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|err| Error::StoreOpen {
            path: ":memory:".to_string(),
            message: err.to_string(),
        })?;
        Self::setup(conn, PathBuf::from(":memory:"))
    }

    fn setup(mut conn: Connection, dir: PathBuf) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_millis(250))?;

        migrations::apply_all(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            dir,
        })
    }

    /// Directory this store persists under.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Handle for cancelling a statement running on this store's
    /// connection. Obtain it before starting the operation to cancel (the
    /// connection is locked while an operation runs); the handle itself is
    /// `Send + Sync` and can interrupt from any thread. An interrupted
    /// statement rolls back and the operation surfaces
    /// [`Error::Cancelled`].
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.conn
            .lock()
            .expect("store connection lock poisoned")
            .get_interrupt_handle()
    }

    /// Run a read or single-statement write against the connection.
    pub fn with_conn<T>(&self, mut f: impl FnMut(&Connection) -> Result<T>) -> Result<T> {
        self.retry_busy(|| {
            let conn = self.conn.lock().expect("store connection lock poisoned");
            f(&conn)
        })
    }

    /// Run a multi-step operation in one immediate transaction.
    ///
    /// The closure may run more than once when the database is busy, so it
    /// must not have side effects outside the transaction.
    pub fn with_tx<T>(&self, mut f: impl FnMut(&Transaction) -> Result<T>) -> Result<T> {
        self.retry_busy(|| {
            let mut conn = self.conn.lock().expect("store connection lock poisoned");
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
    }

    fn retry_busy<T>(&self, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            match f() {
                Err(err) if is_busy(&err) => {
                    attempt += 1;
                    if attempt >= BUSY_MAX_ATTEMPTS {
                        tracing::warn!(attempts = attempt, "database still busy, giving up");
                        return Err(Error::BusyAfterRetry);
                    }
                    let delay = BUSY_BASE_DELAY_MS << (attempt - 1);
                    std::thread::sleep(Duration::from_millis(delay));
                }
                other => return other,
            }
        }
    }
}

fn is_busy(err: &Error) -> bool {
    match err {
        Error::Sql(rusqlite::Error::SqliteFailure(failure, _)) => matches!(
            failure.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directories_and_schema() {
        let dir = tempdir().expect("tempdir");
        let nested = dir.path().join("deep").join(".kaban");
        let store = Store::open(&nested).expect("open");
        assert!(nested.join(DB_FILENAME).exists());

        let count: i64 = store
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'tasks'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .expect("query");
        assert_eq!(count, 1);
    }

    #[test]
    fn reopen_is_a_noop() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(".kaban");
        drop(Store::open(&path).expect("first open"));
        drop(Store::open(&path).expect("second open"));
    }

    #[test]
    fn with_tx_rolls_back_on_error() {
        let store = Store::open_in_memory().expect("open");
        let result: Result<()> = store.with_tx(|tx| {
            tx.execute(
                "INSERT INTO boards (id, name, created_at, updated_at) \
                 VALUES ('b1', 'Board', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
                [],
            )?;
            Err(Error::validation("test", "forced failure"))
        });
        assert!(result.is_err());

        let boards: i64 = store
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM boards", [], |r| r.get(0))?))
            .expect("count");
        assert_eq!(boards, 0);
    }

    #[test]
    fn triggers_are_installed() {
        let store = Store::open_in_memory().expect("open");
        let triggers: i64 = store
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .expect("query");
        assert!(triggers >= 15);
    }
}
