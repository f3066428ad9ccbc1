#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use portal_sync::{
    FetchBatch, MemoryStore, PortalSource, Record, RecordId, RecordStore, StoreError, TableName,
    WriteOutcome,
};

/// Records carrying only the given integer ids.
pub fn records(ids: impl IntoIterator<Item = i64>) -> Vec<Record> {
    ids.into_iter().map(Record::with_id).collect()
}

/// A memory store that can be told to fail, and that counts what it sees.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    failing_ids: Mutex<HashSet<String>>,
    /// ensure_table succeeds this many times, then fails
    ensure_budget: Mutex<Option<usize>>,
    fail_reads: Mutex<bool>,
    fail_writes: Mutex<bool>,
    ensure_calls: AtomicUsize,
    write_calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every conditional write of this id fails with a transient error.
    pub fn fail_id(self, id: impl Into<RecordId>) -> Self {
        let id: RecordId = id.into();
        self.failing_ids.lock().unwrap().insert(id.key());
        self
    }

    /// Allow `n` table preparations, then report the store as unavailable.
    pub fn fail_ensure_after(self, n: usize) -> Self {
        *self.ensure_budget.lock().unwrap() = Some(n);
        self
    }

    pub fn fail_reads(&self, fail: bool) {
        *self.fail_reads.lock().unwrap() = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }

    /// One call per write group
    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self, id: impl Into<RecordId>) -> usize {
        let id: RecordId = id.into();
        self.write_calls
            .lock()
            .unwrap()
            .get(&id.key())
            .copied()
            .unwrap_or(0)
    }

    pub fn total_write_calls(&self) -> usize {
        self.write_calls.lock().unwrap().values().sum()
    }

    /// Most conditional writes observed in progress at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for FaultyStore {
    async fn ensure_table(&self, table: &TableName) -> Result<(), StoreError> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut budget = self.ensure_budget.lock().unwrap();
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(StoreError::Unavailable("connection lost".to_string()));
                }
                *remaining -= 1;
            }
        }
        self.inner.ensure_table(table).await
    }

    async fn put_if_absent(
        &self,
        table: &TableName,
        item: &Record,
    ) -> Result<WriteOutcome, StoreError> {
        let key = item.id().map(|id| id.key()).unwrap_or_default();
        *self
            .write_calls
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_ids.lock().unwrap().contains(&key) {
            return Err(StoreError::Unavailable(format!("write of {key} timed out")));
        }
        self.inner.put_if_absent(table, item).await
    }

    async fn put(&self, table: &TableName, item: &Record) -> Result<(), StoreError> {
        if *self.fail_writes.lock().unwrap() {
            return Err(StoreError::Unavailable("write rejected".to_string()));
        }
        self.inner.put(table, item).await
    }

    async fn get(&self, table: &TableName, id: &RecordId) -> Result<Option<Record>, StoreError> {
        if *self.fail_reads.lock().unwrap() {
            return Err(StoreError::Unavailable("read timed out".to_string()));
        }
        self.inner.get(table, id).await
    }

    async fn get_including_expired(
        &self,
        table: &TableName,
        id: &RecordId,
    ) -> Result<Option<Record>, StoreError> {
        if *self.fail_reads.lock().unwrap() {
            return Err(StoreError::Unavailable("read timed out".to_string()));
        }
        self.inner.get_including_expired(table, id).await
    }
}

/// A portal source that replays scripted fetch results in order.
pub struct MockPortalSource {
    responses: Mutex<VecDeque<Result<FetchBatch>>>,
    calls: Mutex<Vec<(Option<String>, DateTime<Utc>)>>,
}

impl MockPortalSource {
    pub fn with_responses(responses: Vec<Result<FetchBatch>>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(responses)),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Tokens and fetch windows the pipeline asked for, in order
    pub fn calls(&self) -> Vec<(Option<String>, DateTime<Utc>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PortalSource for MockPortalSource {
    async fn fetch(&self, session_id: Option<&str>, since: DateTime<Utc>) -> Result<FetchBatch> {
        self.calls
            .lock()
            .unwrap()
            .push((session_id.map(str::to_string), since));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("MockPortalSource: no more responses in queue")))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
