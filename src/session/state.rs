use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::record::Record;

/// Fixed identity of the one session record per deployment
pub const SESSION_RECORD_ID: i64 = 1;

/// The shared portal session, as persisted in the session table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(rename = "Id")]
    pub id: i64,

    /// Opaque portal credential
    pub session_id: String,

    /// When the current `session_id` value was first seen
    pub created: DateTime<Utc>,

    /// Last write to this record
    pub last_updated: DateTime<Utc>,

    /// Last time the token was confirmed to work
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_successfully: Option<DateTime<Utc>>,

    /// First failure since the last success; sticky until cleared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_failure: Option<DateTime<Utc>>,

    /// Expiry in epoch seconds
    pub ttl: i64,
}

impl SessionRecord {
    pub fn new(session_id: impl Into<String>, now: DateTime<Utc>, liveness: Duration) -> Self {
        Self {
            id: SESSION_RECORD_ID,
            session_id: session_id.into(),
            created: now,
            last_updated: now,
            last_used_successfully: None,
            last_used_failure: None,
            ttl: expiry_after(now, liveness),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ttl <= now.timestamp()
    }

    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        SessionState::of(Some(self), now)
    }

    pub fn to_record(&self) -> Result<Record, StoreError> {
        Record::try_from(serde_json::to_value(self)?)
    }

    pub fn from_record(record: &Record) -> Result<Self, StoreError> {
        Ok(serde_json::from_value(serde_json::to_value(record)?)?)
    }

    fn extend(&mut self, now: DateTime<Utc>, liveness: Duration) {
        self.last_updated = now;
        self.ttl = expiry_after(now, liveness);
    }
}

fn expiry_after(now: DateTime<Utc>, liveness: Duration) -> i64 {
    now.checked_add_signed(liveness)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
        .timestamp()
}

/// Liveness of the shared session, derived from the stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No record stored
    NoSession,
    /// Token usable
    Active,
    /// Record past its ttl
    Expired,
    /// Token known to be bad
    Failed,
}

impl SessionState {
    /// A failure marker wins over expiry: a bad token stays bad.
    pub fn of(record: Option<&SessionRecord>, now: DateTime<Utc>) -> Self {
        match record {
            None => Self::NoSession,
            Some(r) if r.last_used_failure.is_some() => Self::Failed,
            Some(r) if r.is_expired(now) => Self::Expired,
            Some(_) => Self::Active,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSession => write!(f, "no_session"),
            Self::Active => write!(f, "active"),
            Self::Expired => write!(f, "expired"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Something that happened to the shared session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A token was obtained or reused
    TokenObserved(String),
    /// The token worked
    Succeeded,
    /// The token did not work
    Failed,
    /// An operator vouched for the session without probing it
    FailureCleared,
}

impl SessionEvent {
    /// Compute the record that results from this event.
    ///
    /// Returns `None` when there is no record to describe. The result equals
    /// `current` when the event changes nothing, such as a repeated failure.
    pub fn apply(
        self,
        current: Option<&SessionRecord>,
        now: DateTime<Utc>,
        liveness: Duration,
    ) -> Option<SessionRecord> {
        match (self, current) {
            (Self::TokenObserved(token), None) => Some(SessionRecord::new(token, now, liveness)),
            (Self::TokenObserved(token), Some(existing)) => {
                let mut next = existing.clone();
                if next.session_id != token {
                    next.session_id = token;
                    next.created = now;
                }
                next.extend(now, liveness);
                Some(next)
            }
            (_, None) => None,
            (Self::Succeeded, Some(existing)) => {
                let mut next = existing.clone();
                next.last_used_failure = None;
                next.last_used_successfully = Some(now);
                next.extend(now, liveness);
                Some(next)
            }
            (Self::Failed, Some(existing)) => {
                let mut next = existing.clone();
                if next.last_used_failure.is_none() {
                    next.last_used_failure = Some(now);
                    next.last_updated = now;
                }
                Some(next)
            }
            (Self::FailureCleared, Some(existing)) => {
                let mut next = existing.clone();
                if next.last_used_failure.take().is_some() {
                    next.last_updated = now;
                }
                Some(next)
            }
        }
    }
}
