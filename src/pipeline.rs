use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::persist::{BatchPersistenceEngine, SyncReport};
use crate::record::Record;
use crate::session::{DEFAULT_DAYS_IN_PAST, SessionLifecycleManager, start_date};
use crate::store::RecordStore;

/// What one portal fetch produced.
#[derive(Debug, Clone, Default)]
pub struct FetchBatch {
    /// Token the fetch ended up using, cached or freshly issued
    pub session_id: String,

    /// Records grouped by destination table, in persistence order
    pub collections: Vec<(String, Vec<Record>)>,
}

/// Client for the school portal.
///
/// Implementations own the network calls and the login handshake.
#[async_trait]
pub trait PortalSource: Send + Sync {
    /// Fetch everything changed since `since`.
    ///
    /// `session_id` is the cached token; `None` asks for a fresh login.
    async fn fetch(&self, session_id: Option<&str>, since: DateTime<Utc>) -> Result<FetchBatch>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// One synchronization cycle: pick the fetch window, fetch, persist, and
/// record how the session token fared.
pub struct SyncPipeline {
    engine: BatchPersistenceEngine,
    session: SessionLifecycleManager,
    default_days_in_past: i64,
}

impl SyncPipeline {
    pub fn new(engine: BatchPersistenceEngine, session: SessionLifecycleManager) -> Self {
        Self {
            engine,
            session,
            default_days_in_past: DEFAULT_DAYS_IN_PAST,
        }
    }

    pub fn from_config(config: &SyncConfig, store: Arc<dyn RecordStore>) -> Result<Self, SyncError> {
        let pipeline = Self::new(config.engine(store.clone()), config.session_manager(store)?)
            .with_default_days_in_past(config.default_days_in_past);
        Ok(pipeline)
    }

    pub fn with_default_days_in_past(mut self, days: i64) -> Self {
        self.default_days_in_past = days;
        self
    }

    pub fn session(&self) -> &SessionLifecycleManager {
        &self.session
    }

    pub fn engine(&self) -> &BatchPersistenceEngine {
        &self.engine
    }

    /// Run one cycle against `source`.
    ///
    /// A session already marked failed skips the cycle. A fetch error marks
    /// the session failed and is returned; persistence failures are reported
    /// in the [`SyncReport`] and do not count against the session.
    pub async fn run(&self, source: &dyn PortalSource) -> Result<SyncReport, SyncError> {
        if self.session.is_failed().await {
            warn!(source = source.name(), "session marked failed, skipping run");
            return Ok(SyncReport::skipped());
        }

        let record = self.session.record().await;
        let since = start_date(record.as_ref(), self.default_days_in_past, Utc::now());
        let token = self.session.get_token().await;

        info!(
            source = source.name(),
            since = %since,
            cached_token = token.is_some(),
            "starting sync"
        );

        let batch = match source.fetch(token.as_deref(), since).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(source = source.name(), error = %e, "portal fetch failed");
                self.session.mark_failure().await;
                return Err(SyncError::Source(format!("{e:#}")));
            }
        };

        self.session.set_token(batch.session_id).await;
        let report = self.engine.persist_all(batch.collections).await;
        self.session.mark_success().await;

        info!(
            source = source.name(),
            status = %report.status(),
            successful = report.successful(),
            failed = report.failed(),
            already_existed = report.already_existed(),
            "sync finished"
        );

        Ok(report)
    }
}
