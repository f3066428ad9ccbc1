use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use super::gateway::ConditionalWriteGateway;
use super::report::{AbortedTable, SaveResult, SyncReport};
use crate::error::{PersistError, StoreError};
use crate::record::{ID_ATTR, Record, TableName};
use crate::retry::{RetryConfig, retry_if};
use crate::store::{RecordStore, WriteOutcome};

/// Hard per-request item limit of the backing store
pub const MAX_BATCH_SIZE: usize = 25;

/// Default retention for synchronized records
pub const DEFAULT_RETENTION_DAYS: i64 = 60;

/// What happened to a single record.
#[derive(Debug)]
pub enum RecordOutcome {
    Written,
    AlreadyExists,
    Failed(StoreError),
}

impl From<Result<WriteOutcome, StoreError>> for RecordOutcome {
    fn from(result: Result<WriteOutcome, StoreError>) -> Self {
        match result {
            Ok(WriteOutcome::Written) => Self::Written,
            Ok(WriteOutcome::AlreadyExists) => Self::AlreadyExists,
            Err(e) => Self::Failed(e),
        }
    }
}

/// Persists record collections so that re-running the same input is harmless.
///
/// Records are written in groups of at most [`MAX_BATCH_SIZE`]. Writes inside a
/// group are issued concurrently; groups run one after another.
pub struct BatchPersistenceEngine {
    gateway: ConditionalWriteGateway,
    retry: RetryConfig,
    batch_size: usize,
    retention: Duration,
}

impl BatchPersistenceEngine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            gateway: ConditionalWriteGateway::new(store),
            retry: RetryConfig::default(),
            batch_size: MAX_BATCH_SIZE,
            retention: Duration::days(DEFAULT_RETENTION_DAYS),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the group size; clamped to `1..=MAX_BATCH_SIZE`.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Persist `records` into `table`.
    ///
    /// Per-record failures end up in the returned [`SaveResult`]. An error is
    /// returned only when a group cannot be attempted at all; it carries the
    /// counts of the groups that completed before it.
    pub async fn persist(
        &self,
        table: &str,
        records: Vec<Record>,
    ) -> Result<SaveResult, PersistError> {
        let mut result = SaveResult::new(table);
        if records.is_empty() {
            debug!(table, "nothing to persist");
            return Ok(result);
        }

        let table_name = match TableName::new(table) {
            Ok(name) => name,
            Err(source) => return Err(abort(result, source)),
        };

        let total = records.len();
        let mut remaining = records.into_iter();
        let mut group_index = 0usize;

        loop {
            let group: Vec<Record> = remaining.by_ref().take(self.batch_size).collect();
            if group.is_empty() {
                break;
            }

            if let Err(source) = self.gateway.prepare(&table_name).await {
                return Err(abort(result, source));
            }

            let group_result = self.persist_group(&table_name, group).await;
            debug!(
                table,
                group = group_index,
                size = group_result.attempted,
                successful = group_result.successful,
                failed = group_result.failed,
                "group persisted"
            );
            result.absorb(group_result);
            group_index += 1;
        }

        info!(
            table,
            total,
            groups = group_index,
            successful = result.successful,
            failed = result.failed,
            already_existed = result.already_existed(),
            "table persisted"
        );

        Ok(result)
    }

    /// Persist several collections, one table after another.
    ///
    /// A table-level failure is recorded in the report and the remaining
    /// tables are still attempted.
    pub async fn persist_all<I>(&self, collections: I) -> SyncReport
    where
        I: IntoIterator<Item = (String, Vec<Record>)>,
    {
        let mut report = SyncReport::default();

        for (table, records) in collections {
            let total = records.len();
            match self.persist(&table, records).await {
                Ok(result) => report.results.push(result),
                Err(err) => {
                    report.aborted.push(AbortedTable {
                        table: table.clone(),
                        error: err.source.to_string(),
                        unattempted: total - err.partial.attempted,
                    });
                    report.results.push(err.partial);
                }
            }
        }

        report
    }

    async fn persist_group(&self, table: &TableName, group: Vec<Record>) -> SaveResult {
        let expires_at = Utc::now()
            .checked_add_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .timestamp();

        let outcomes = join_all(
            group
                .iter()
                .map(|record| self.write_one(table, record, expires_at)),
        )
        .await;

        let mut result = SaveResult::new(table.as_str());
        for (record, outcome) in group.into_iter().zip(outcomes) {
            result.attempted += 1;
            match outcome {
                RecordOutcome::Written => result.successful += 1,
                RecordOutcome::AlreadyExists => {}
                RecordOutcome::Failed(e) => {
                    warn!(
                        table = %table,
                        id = ?record.get(ID_ATTR),
                        error = %e,
                        "record write failed"
                    );
                    result.failed += 1;
                    result.failed_items.push(record);
                }
            }
        }

        result
    }

    async fn write_one(&self, table: &TableName, record: &Record, expires_at: i64) -> RecordOutcome {
        let stamped = record.with_ttl(expires_at);

        retry_if(
            &self.retry,
            "conditional_write",
            StoreError::is_transient,
            || self.gateway.write_if_absent(table, &stamped),
        )
        .await
        .into()
    }
}

fn abort(partial: SaveResult, source: StoreError) -> PersistError {
    error!(
        table = %partial.table,
        attempted = partial.attempted,
        successful = partial.successful,
        failed = partial.failed,
        error = %source,
        "persistence aborted"
    );
    PersistError {
        table: partial.table.clone(),
        partial,
        source,
    }
}
