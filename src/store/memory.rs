use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{RecordStore, WriteOutcome, is_expired, now_epoch};
use crate::error::StoreError;
use crate::record::{Record, RecordId, TableName};

type Table = HashMap<String, Record>;

/// In-process store used for dry runs and tests.
///
/// Expired items are dropped lazily when they are next touched.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<TableName, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live items in `table`
    pub fn len(&self, table: &TableName) -> usize {
        let now = now_epoch();
        self.with_tables(|tables| {
            tables
                .get(table)
                .map(|t| t.values().filter(|item| !is_expired(item, now)).count())
                .unwrap_or(0)
        })
    }

    pub fn is_empty(&self, table: &TableName) -> bool {
        self.len(table) == 0
    }

    fn with_tables<R>(&self, f: impl FnOnce(&mut HashMap<TableName, Table>) -> R) -> R {
        // A poisoned lock only means another writer panicked mid-insert; the
        // map itself is still consistent.
        let mut guard = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn ensure_table(&self, table: &TableName) -> Result<(), StoreError> {
        self.with_tables(|tables| {
            tables.entry(table.clone()).or_default();
        });
        Ok(())
    }

    async fn put_if_absent(
        &self,
        table: &TableName,
        item: &Record,
    ) -> Result<WriteOutcome, StoreError> {
        let key = item.id()?.key();
        let now = now_epoch();

        Ok(self.with_tables(|tables| {
            let rows = tables.entry(table.clone()).or_default();
            match rows.get(&key) {
                Some(existing) if !is_expired(existing, now) => WriteOutcome::AlreadyExists,
                _ => {
                    rows.insert(key, item.clone());
                    WriteOutcome::Written
                }
            }
        }))
    }

    async fn put(&self, table: &TableName, item: &Record) -> Result<(), StoreError> {
        let key = item.id()?.key();
        self.with_tables(|tables| {
            tables.entry(table.clone()).or_default().insert(key, item.clone());
        });
        Ok(())
    }

    async fn get(&self, table: &TableName, id: &RecordId) -> Result<Option<Record>, StoreError> {
        let key = id.key();
        let now = now_epoch();

        Ok(self.with_tables(|tables| {
            let rows = tables.get_mut(table)?;
            if rows.get(&key).is_some_and(|item| is_expired(item, now)) {
                rows.remove(&key);
                return None;
            }
            rows.get(&key).cloned()
        }))
    }

    async fn get_including_expired(
        &self,
        table: &TableName,
        id: &RecordId,
    ) -> Result<Option<Record>, StoreError> {
        let key = id.key();
        Ok(self.with_tables(|tables| tables.get(table)?.get(&key).cloned()))
    }
}
