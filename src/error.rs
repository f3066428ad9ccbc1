use crate::persist::SaveResult;

/// Failure reported by a [`RecordStore`](crate::store::RecordStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid table name: {0:?}")]
    InvalidTable(String),

    #[error("record has no usable Id attribute")]
    MissingId,

    #[error("invalid item: {0}")]
    InvalidItem(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("request throttled: {0}")]
    Throttled(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Throttled(_) | Self::Backend(_)
        )
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                Self::Throttled(err.to_string())
            }
            other => Self::Backend(other.into()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidItem(err.to_string())
    }
}

/// A table-level failure that stopped a persistence call part way through.
///
/// `partial` holds the counts for the groups that completed before the failure.
#[derive(Debug, thiserror::Error)]
#[error("persisting into {table} aborted after {} records: {source}", .partial.attempted())]
pub struct PersistError {
    pub table: String,
    pub partial: SaveResult,
    #[source]
    pub source: StoreError,
}

/// Failures that stop a sync cycle before any record is persisted.
///
/// Persistence problems are not errors at this level; they are reported in
/// the [`SyncReport`](crate::persist::SyncReport).
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("portal source error: {0}")]
    Source(String),
}
