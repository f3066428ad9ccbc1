use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::state::{SESSION_RECORD_ID, SessionEvent, SessionRecord, SessionState};
use crate::error::StoreError;
use crate::record::{RecordId, TableName};
use crate::store::RecordStore;

/// Default time a session record stays alive after its last confirmation
pub const DEFAULT_LIVENESS_SECS: i64 = 3600;

/// Tracks the one portal session token shared by all pipeline invocations.
///
/// Storage problems never escape from here. A failed read looks like "no
/// session" and a failed write is logged and dropped; the worst outcome of
/// either is an extra portal login. Concurrent invocations race on the
/// record and the last writer wins.
pub struct SessionLifecycleManager {
    store: Arc<dyn RecordStore>,
    table: TableName,
    liveness: Duration,
}

impl SessionLifecycleManager {
    pub fn new(store: Arc<dyn RecordStore>, table: TableName) -> Self {
        Self {
            store,
            table,
            liveness: Duration::seconds(DEFAULT_LIVENESS_SECS),
        }
    }

    /// Set how far each confirmation pushes the record's expiry
    pub fn with_liveness(mut self, liveness: Duration) -> Self {
        self.liveness = liveness;
        self
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Stored session record, if any, including one past its ttl
    pub async fn record(&self) -> Option<SessionRecord> {
        match self.load().await {
            Ok(record) => record,
            Err(e) => {
                warn!(table = %self.table, error = %e, "failed to read session record");
                None
            }
        }
    }

    pub async fn state(&self) -> SessionState {
        SessionState::of(self.record().await.as_ref(), Utc::now())
    }

    /// Cached token, unless it is missing or expired
    pub async fn get_token(&self) -> Option<String> {
        let record = self.record().await?;
        if record.is_expired(Utc::now()) {
            debug!("cached session expired");
            return None;
        }
        Some(record.session_id)
    }

    pub async fn set_token(&self, session_id: impl Into<String>) {
        self.apply(SessionEvent::TokenObserved(session_id.into()))
            .await;
    }

    /// Whether the current token is known to be bad. Expiry does not clear this.
    pub async fn is_failed(&self) -> bool {
        self.record()
            .await
            .is_some_and(|r| r.last_used_failure.is_some())
    }

    pub async fn mark_success(&self) {
        self.apply(SessionEvent::Succeeded).await;
    }

    /// Record a failure; an earlier unresolved failure keeps its timestamp.
    pub async fn mark_failure(&self) {
        self.apply(SessionEvent::Failed).await;
    }

    /// Operator override: treat the session as healthy again without a probe.
    pub async fn clear_failure(&self) {
        self.apply(SessionEvent::FailureCleared).await;
    }

    async fn load(&self) -> Result<Option<SessionRecord>, StoreError> {
        let item = self
            .store
            .get_including_expired(&self.table, &RecordId::Int(SESSION_RECORD_ID))
            .await?;
        item.as_ref().map(SessionRecord::from_record).transpose()
    }

    async fn apply(&self, event: SessionEvent) {
        let current = match self.load().await {
            Ok(current) => current,
            Err(e) => {
                // Without the current record a write could clobber history
                warn!(table = %self.table, ?event, error = %e, "session read failed, skipping update");
                return;
            }
        };

        let now = Utc::now();
        let Some(next) = event.clone().apply(current.as_ref(), now, self.liveness) else {
            debug!(?event, "no session record, nothing to update");
            return;
        };
        if current.as_ref() == Some(&next) {
            debug!(?event, "session record unchanged");
            return;
        }

        match self.write(&next).await {
            Ok(()) => info!(
                ?event,
                state = %next.state(now),
                expires_at = %expiry(&next),
                "session record updated"
            ),
            Err(e) => warn!(?event, error = %e, "failed to write session record"),
        }
    }

    async fn write(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.store.put(&self.table, &record.to_record()?).await
    }
}

fn expiry(record: &SessionRecord) -> String {
    DateTime::<Utc>::from_timestamp(record.ttl, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| record.ttl.to_string())
}
