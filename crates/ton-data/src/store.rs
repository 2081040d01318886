//! SQLite storage layer for fetched account history and emitted swap records.
//!
//! Raw transactions are keyed by hash and inserted with `INSERT OR IGNORE`,
//! so re-fetching overlapping pages never duplicates rows.

use eyre::{Context, Result};
use rusqlite::Connection;
use std::cell::RefCell;

use crate::types::RawTransaction;

/// Row tuple for persisted swap records:
/// `(venue, query_id, direction, primary_lt, utime, record_json)`.
pub type SwapRecordRow = (String, String, String, u64, u64, String);

pub struct Store {
    conn: RefCell<Connection>,
}

impl Store {
    /// Creates or opens a SQLite database with WAL mode enabled.
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or migrations fail.
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self {
            conn: RefCell::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn.borrow_mut().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS raw_transactions (
                hash TEXT PRIMARY KEY,
                account TEXT NOT NULL,
                lt INTEGER,
                utime INTEGER,
                body TEXT
            );

            CREATE INDEX IF NOT EXISTS raw_transactions_account_lt
                ON raw_transactions (account, lt);

            CREATE TABLE IF NOT EXISTS swap_records (
                venue TEXT NOT NULL,
                query_id TEXT NOT NULL,
                direction TEXT,
                primary_lt INTEGER,
                utime INTEGER,
                body TEXT,
                PRIMARY KEY (venue, query_id)
            );
            ",
        )?;
        Ok(())
    }

    /// Batch insert raw transactions for `account`, ignoring known hashes.
    ///
    /// Returns the number of newly stored rows.
    ///
    /// # Errors
    /// Returns error if serialization or the database insert fails.
    pub fn insert_raw_txs(&self, account: &str, txs: &[RawTransaction]) -> Result<usize> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO raw_transactions (hash, account, lt, utime, body)
                VALUES (?, ?, ?, ?, ?)
                ",
            )?;

            for raw in txs {
                if raw.hash.is_empty() {
                    continue;
                }
                let body = serde_json::to_string(raw)
                    .wrap_err_with(|| format!("failed to serialize tx {}", raw.hash))?;
                inserted += stmt.execute(rusqlite::params![
                    raw.hash, account, raw.lt, raw.utime, body
                ])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Loads every stored transaction of `account` in ascending logical time.
    ///
    /// Rows whose body no longer parses are skipped.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn load_raw_txs(&self, account: &str) -> Result<Vec<RawTransaction>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT hash, body FROM raw_transactions WHERE account = ? ORDER BY lt ASC, hash ASC",
        )?;

        let rows = stmt
            .query_map(rusqlite::params![account], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut txs = Vec::with_capacity(rows.len());
        for (hash, body) in rows {
            match serde_json::from_str::<RawTransaction>(&body) {
                Ok(raw) => txs.push(raw),
                Err(err) => {
                    tracing::warn!(hash = %hash, error = %err, "skipping unreadable stored tx");
                }
            }
        }

        Ok(txs)
    }

    /// Returns `(min_lt, max_lt, count)` of stored transactions for `account`.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn get_lt_range(&self, account: &str) -> Result<(u64, u64, u64)> {
        let conn = self.conn.borrow();
        let range = conn.query_row(
            "SELECT COALESCE(MIN(lt), 0), COALESCE(MAX(lt), 0), COUNT(*)
             FROM raw_transactions WHERE account = ?",
            rusqlite::params![account],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(range)
    }

    /// Upserts swap records keyed by `(venue, query_id)`.
    ///
    /// # Errors
    /// Returns error if the database insert fails.
    pub fn insert_swap_records(&self, rows: &[SwapRecordRow]) -> Result<usize> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR REPLACE INTO swap_records (
                    venue, query_id, direction, primary_lt, utime, body
                ) VALUES (?, ?, ?, ?, ?, ?)
                ",
            )?;

            for (venue, query_id, direction, primary_lt, utime, body) in rows {
                stmt.execute(rusqlite::params![
                    venue, query_id, direction, primary_lt, utime, body
                ])?;
            }
        }

        tx.commit()?;
        Ok(rows.len())
    }

    /// Counts stored swap records for `venue`.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn count_swap_records(&self, venue: &str) -> Result<u64> {
        let count = self.conn.borrow().query_row(
            "SELECT COUNT(*) FROM swap_records WHERE venue = ?",
            rusqlite::params![venue],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
