//! SQLite-backed ledger store.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::ledger::LedgerStore;
use super::user::UserId;
use crate::error::{CreditGateError, Result};

/// How long a statement waits on a locked database file before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Ledger persisted in the `user_credits` table of a SQLite database.
///
/// The connection is shared behind a mutex and every statement runs on the
/// blocking thread pool, so async callers never stall the runtime on disk I/O.
#[derive(Clone)]
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening credit ledger");

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database. Contents vanish on drop.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let ledger = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        ledger.ensure_schema()?;
        Ok(ledger)
    }

    /// Create the `user_credits` table if it does not exist yet.
    pub fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_credits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id VARCHAR(50) UNIQUE NOT NULL,
                credits INTEGER NOT NULL DEFAULT 10 CHECK (credits >= 0)
            );",
        )?;
        Ok(())
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await?
    }
}

#[async_trait]
impl LedgerStore for SqliteLedger {
    async fn get_balance(&self, user_id: &UserId) -> Result<Option<i64>> {
        let key = user_id.to_string();
        self.with_conn(move |conn| {
            let credits = conn
                .query_row(
                    "SELECT credits FROM user_credits WHERE user_id = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(credits)
        })
        .await
    }

    async fn set_balance(&self, user_id: &UserId, amount: i64) -> Result<()> {
        if amount < 0 {
            return Err(CreditGateError::InvalidAmount(amount));
        }

        let key = user_id.to_string();
        debug!(user_id = %key, credits = amount, "Writing ledger balance");
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO user_credits (user_id, credits)
                 VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET credits = excluded.credits",
                params![key, amount],
            )?;
            Ok(())
        })
        .await
    }

    async fn ensure_exists(&self, user_id: &UserId, default_amount: i64) -> Result<()> {
        if default_amount < 0 {
            return Err(CreditGateError::InvalidAmount(default_amount));
        }

        let key = user_id.to_string();
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO user_credits (user_id, credits) VALUES (?1, ?2)",
                params![key, default_amount],
            )?;
            if inserted > 0 {
                debug!(user_id = %key, credits = default_amount, "Created ledger entry");
            }
            Ok(())
        })
        .await
    }

    async fn top_up(&self, user_id: &UserId, amount: i64, default_amount: i64) -> Result<i64> {
        if amount <= 0 {
            return Err(CreditGateError::InvalidAmount(amount));
        }
        if default_amount < 0 {
            return Err(CreditGateError::InvalidAmount(default_amount));
        }

        let key = user_id.to_string();
        self.with_conn(move |conn| {
            let credits = conn.query_row(
                "INSERT INTO user_credits (user_id, credits)
                 VALUES (?1, ?2 + ?3)
                 ON CONFLICT(user_id) DO UPDATE SET credits = credits + ?3
                 RETURNING credits",
                params![key, default_amount, amount],
                |row| row.get(0),
            )?;
            Ok(credits)
        })
        .await
    }
}
