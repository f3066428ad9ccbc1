use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SyncError;
use crate::persist::{BatchPersistenceEngine, DEFAULT_RETENTION_DAYS, MAX_BATCH_SIZE};
use crate::record::TableName;
use crate::retry::RetryConfig;
use crate::session::{
    DEFAULT_DAYS_IN_PAST, DEFAULT_LIVENESS_SECS, MAX_DAYS_IN_PAST, SessionLifecycleManager,
};
use crate::store::RecordStore;

/// Config file looked up in the working directory when none is given
pub const CONFIG_FILE_NAME: &str = "portal-sync.toml";

const ENV_PREFIX: &str = "PORTAL_SYNC_";
const MAX_LIVENESS_SECS: i64 = 365 * 24 * 3600;
const MAX_RETENTION_DAYS: i64 = 36_500;

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// SQLite database file; defaults to ~/.portal-sync/sync.db
    pub database_path: Option<PathBuf>,

    /// Table holding the shared session record
    pub session_table: String,

    /// Records per write group (at most 25)
    pub batch_size: usize,

    /// Days synchronized records are kept
    pub record_retention_days: i64,

    /// Seconds a session record lives after its last confirmation
    pub session_liveness_secs: i64,

    /// Look-back window when there is no session history
    pub default_days_in_past: i64,

    pub retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            session_table: "Session".to_string(),
            batch_size: MAX_BATCH_SIZE,
            record_retention_days: DEFAULT_RETENTION_DAYS,
            session_liveness_secs: DEFAULT_LIVENESS_SECS,
            default_days_in_past: DEFAULT_DAYS_IN_PAST,
            retry: RetryConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Load configuration: file (explicit path, else `portal-sync.toml` in the
    /// working directory, else defaults), then `PORTAL_SYNC_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, SyncError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(CONFIG_FILE_NAME).exists() => {
                Self::from_file(Path::new(CONFIG_FILE_NAME))?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, SyncError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = toml::from_str(&text)
            .map_err(|e| SyncError::Config(format!("invalid {}: {e}", path.display())))?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Override fields from environment variables looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(db) = var("DB") {
            self.database_path = Some(PathBuf::from(db));
        }
        if let Some(table) = var("SESSION_TABLE") {
            self.session_table = table;
        }
        override_parsed(&mut self.batch_size, "BATCH_SIZE", var("BATCH_SIZE"))?;
        override_parsed(
            &mut self.record_retention_days,
            "RETENTION_DAYS",
            var("RETENTION_DAYS"),
        )?;
        override_parsed(
            &mut self.session_liveness_secs,
            "SESSION_LIVENESS_SECS",
            var("SESSION_LIVENESS_SECS"),
        )?;
        override_parsed(
            &mut self.default_days_in_past,
            "DEFAULT_DAYS_IN_PAST",
            var("DEFAULT_DAYS_IN_PAST"),
        )?;
        override_parsed(
            &mut self.retry.max_attempts,
            "RETRY_ATTEMPTS",
            var("RETRY_ATTEMPTS"),
        )?;

        let mut base_delay_ms = self.retry.base_delay.as_millis() as u64;
        override_parsed(
            &mut base_delay_ms,
            "RETRY_BASE_DELAY_MS",
            var("RETRY_BASE_DELAY_MS"),
        )?;
        self.retry.base_delay = std::time::Duration::from_millis(base_delay_ms);

        Ok(())
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        TableName::new(&self.session_table)
            .map_err(|e| SyncError::Config(format!("session_table: {e}")))?;

        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(SyncError::Config(format!(
                "batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.record_retention_days) {
            return Err(SyncError::Config(format!(
                "record_retention_days must be between 1 and {MAX_RETENTION_DAYS}"
            )));
        }
        if !(1..=MAX_LIVENESS_SECS).contains(&self.session_liveness_secs) {
            return Err(SyncError::Config(format!(
                "session_liveness_secs must be between 1 and {MAX_LIVENESS_SECS}"
            )));
        }
        if !(0..=MAX_DAYS_IN_PAST).contains(&self.default_days_in_past) {
            return Err(SyncError::Config(format!(
                "default_days_in_past must be between 0 and {MAX_DAYS_IN_PAST}"
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Database location, falling back to ~/.portal-sync/sync.db
    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.database_path {
            return path.clone();
        }
        match std::env::var("HOME") {
            Ok(home) => PathBuf::from(home).join(".portal-sync").join("sync.db"),
            Err(_) => PathBuf::from("portal-sync.db"),
        }
    }

    pub fn session_table(&self) -> Result<TableName, SyncError> {
        TableName::new(&self.session_table)
            .map_err(|e| SyncError::Config(format!("session_table: {e}")))
    }

    pub fn engine(&self, store: Arc<dyn RecordStore>) -> BatchPersistenceEngine {
        BatchPersistenceEngine::new(store)
            .with_batch_size(self.batch_size)
            .with_retention(
                Duration::try_days(self.record_retention_days).unwrap_or(Duration::MAX),
            )
            .with_retry(self.retry.clone())
    }

    pub fn session_manager(
        &self,
        store: Arc<dyn RecordStore>,
    ) -> Result<SessionLifecycleManager, SyncError> {
        Ok(SessionLifecycleManager::new(store, self.session_table()?)
            .with_liveness(
                Duration::try_seconds(self.session_liveness_secs).unwrap_or(Duration::MAX),
            ))
    }
}

fn override_parsed<T>(target: &mut T, name: &str, value: Option<String>) -> Result<(), SyncError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = value {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| SyncError::Config(format!("{ENV_PREFIX}{name}={raw:?}: {e}")))?;
    }
    Ok(())
}
