use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::{fs, path::Path};
use thiserror::Error;
use tracing::{debug, info};

use crate::ingest::SalesRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("could not replace store file {path}: {source}")]
    Replace {
        path: String,
        source: std::io::Error,
    },
    #[error("row count mismatch after load: table has {actual}, expected {expected}")]
    CountMismatch { expected: usize, actual: i64 },
}

/// The single relational table this pipeline owns. Fully rebuilt on every
/// run; there is no incremental update path.
pub struct SalesStore {
    conn: Connection,
}

impl SalesStore {
    /// Open the on-disk store at `path`, deleting any previous store file
    /// first (full-refresh semantics).
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if path.exists() {
            fs::remove_file(path).map_err(|source| StoreError::Replace {
                path: path.display().to_string(),
                source,
            })?;
            debug!(path = %path.display(), "removed previous store file");
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Drop and recreate `online_sales` with the fixed four-column schema.
    pub fn rebuild_table(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "DROP TABLE IF EXISTS online_sales;
             CREATE TABLE online_sales (
                 order_id   INTEGER,
                 order_date TEXT,
                 amount     REAL,
                 product_id TEXT
             );",
        )?;
        Ok(())
    }

    /// Bulk-insert `records` in ingestion order inside one transaction, then
    /// verify the table row count matches what was handed in.
    pub fn load(&mut self, records: &[SalesRecord]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO online_sales (order_id, order_date, amount, product_id)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for rec in records {
                stmt.execute(params![
                    rec.order_id,
                    rec.order_date,
                    rec.amount,
                    rec.product_id
                ])?;
            }
        }
        tx.commit()?;

        let actual: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM online_sales", [], |row| row.get(0))?;
        if actual != records.len() as i64 {
            return Err(StoreError::CountMismatch {
                expected: records.len(),
                actual,
            });
        }
        info!(rows = actual, "loaded online_sales");
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Release the connection, surfacing any close-time error.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| e)
            .context("closing store connection")
    }
}
