use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tokio::task;
use tracing::debug;

use super::{RecordStore, WriteOutcome, now_epoch};
use crate::error::StoreError;
use crate::record::{Record, RecordId, TableName};

/// SQLite-backed store, one SQL table per record table
pub struct SqliteStore {
    /// Path to the SQLite database file
    db_path: PathBuf,
    /// Tables already created during this process
    ready: Mutex<HashSet<TableName>>,
}

/// Open a SQLite connection with standard pragmas (busy_timeout).
fn open_connection(db_path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("failed to open database: {}", db_path.display()))?;
    conn.execute_batch("PRAGMA busy_timeout=5000;")?;
    Ok(conn)
}

impl SqliteStore {
    /// Create a new SQLite store at the given path
    pub fn new(db_path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }

        let conn = open_connection(&db_path)?;
        // WAL lets the fan-out writers and readers overlap
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("failed to set WAL mode")?;

        debug!(path = %db_path.display(), "initialized SQLite store");

        Ok(Self {
            db_path,
            ready: Mutex::new(HashSet::new()),
        })
    }

    fn is_ready(&self, table: &TableName) -> bool {
        self.ready
            .lock()
            .map(|ready| ready.contains(table))
            .unwrap_or(false)
    }

    fn mark_ready(&self, table: &TableName) {
        if let Ok(mut ready) = self.ready.lock() {
            ready.insert(table.clone());
        }
    }

    /// Run `f` on a fresh connection off the async runtime.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        task::spawn_blocking(move || {
            let mut conn = open_connection(&db_path)?;
            f(&mut conn)
        })
        .await
        .context("spawn_blocking failed")?
    }
}

fn encode(item: &Record) -> Result<(String, Option<i64>, String), StoreError> {
    let key = item.id()?.key();
    let data = serde_json::to_string(item)?;
    Ok((key, item.ttl(), data))
}

fn decode(data: &str) -> Result<Record, StoreError> {
    Ok(serde_json::from_str(data)?)
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn ensure_table(&self, table: &TableName) -> Result<(), StoreError> {
        if self.is_ready(table) {
            return Ok(());
        }

        let name = table.clone();
        self.with_conn(move |conn| {
            // Names are validated by TableName, so quoting is enough here
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{name}\" (
                    id TEXT PRIMARY KEY,
                    ttl INTEGER,
                    data TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS \"idx_{name}_ttl\" ON \"{name}\"(ttl);"
            ))?;
            debug!(table = %name, "ensured table");
            Ok(())
        })
        .await?;

        self.mark_ready(table);
        Ok(())
    }

    async fn put_if_absent(
        &self,
        table: &TableName,
        item: &Record,
    ) -> Result<WriteOutcome, StoreError> {
        self.ensure_table(table).await?;
        let (key, ttl, data) = encode(item)?;
        let name = table.clone();

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                &format!("DELETE FROM \"{name}\" WHERE id = ?1 AND ttl IS NOT NULL AND ttl <= ?2"),
                params![key, now_epoch()],
            )?;
            let inserted = tx.execute(
                &format!(
                    "INSERT INTO \"{name}\" (id, ttl, data) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO NOTHING"
                ),
                params![key, ttl, data],
            )?;
            tx.commit()?;

            if inserted == 1 {
                Ok(WriteOutcome::Written)
            } else {
                Ok(WriteOutcome::AlreadyExists)
            }
        })
        .await
    }

    async fn put(&self, table: &TableName, item: &Record) -> Result<(), StoreError> {
        self.ensure_table(table).await?;
        let (key, ttl, data) = encode(item)?;
        let name = table.clone();

        self.with_conn(move |conn| {
            conn.execute(
                &format!("INSERT OR REPLACE INTO \"{name}\" (id, ttl, data) VALUES (?1, ?2, ?3)"),
                params![key, ttl, data],
            )?;
            debug!(table = %name, id = %key, "put item");
            Ok(())
        })
        .await
    }

    async fn get(&self, table: &TableName, id: &RecordId) -> Result<Option<Record>, StoreError> {
        self.ensure_table(table).await?;
        let key = id.key();
        let name = table.clone();

        self.with_conn(move |conn| {
            let data: Option<String> = conn
                .query_row(
                    &format!(
                        "SELECT data FROM \"{name}\" WHERE id = ?1 AND (ttl IS NULL OR ttl > ?2)"
                    ),
                    params![key, now_epoch()],
                    |row| row.get(0),
                )
                .optional()?;

            data.as_deref().map(decode).transpose()
        })
        .await
    }

    async fn get_including_expired(
        &self,
        table: &TableName,
        id: &RecordId,
    ) -> Result<Option<Record>, StoreError> {
        self.ensure_table(table).await?;
        let key = id.key();
        let name = table.clone();

        self.with_conn(move |conn| {
            let data: Option<String> = conn
                .query_row(
                    &format!("SELECT data FROM \"{name}\" WHERE id = ?1"),
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;

            data.as_deref().map(decode).transpose()
        })
        .await
    }
}
