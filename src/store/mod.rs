mod memory;
mod sqlite;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StoreError;
use crate::record::{Record, RecordId, TableName};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Result of an existence-guarded write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The record was newly stored
    Written,
    /// A live record with the same identity was already present; nothing changed
    AlreadyExists,
}

impl WriteOutcome {
    pub fn is_written(self) -> bool {
        matches!(self, Self::Written)
    }
}

/// Key-value backend shared by every invocation of the pipeline.
///
/// Items whose `ttl` attribute lies in the past are treated as deleted, the
/// same way a store with native expiry would eventually drop them.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Prepare `table` to receive writes. Failing here means no write to the
    /// table can be attempted at all.
    async fn ensure_table(&self, table: &TableName) -> Result<(), StoreError>;

    /// Store `item` unless a live item with the same `Id` exists
    async fn put_if_absent(
        &self,
        table: &TableName,
        item: &Record,
    ) -> Result<WriteOutcome, StoreError>;

    /// Store `item`, replacing any item with the same `Id`
    async fn put(&self, table: &TableName, item: &Record) -> Result<(), StoreError>;

    /// Look up a live item by identity
    async fn get(&self, table: &TableName, id: &RecordId) -> Result<Option<Record>, StoreError>;

    /// Look up an item by identity, even if its `ttl` has passed.
    ///
    /// For callers that interpret expiry themselves, such as the session record.
    async fn get_including_expired(
        &self,
        table: &TableName,
        id: &RecordId,
    ) -> Result<Option<Record>, StoreError>;
}

/// Whether an item has passed its expiry.
pub(crate) fn is_expired(item: &Record, now_epoch: i64) -> bool {
    item.ttl().is_some_and(|ttl| ttl <= now_epoch)
}

pub(crate) fn now_epoch() -> i64 {
    Utc::now().timestamp()
}
