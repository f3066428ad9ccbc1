mod date_range;
mod manager;
mod state;

pub use date_range::{DEFAULT_DAYS_IN_PAST, MAX_DAYS_IN_PAST, start_date};
pub use manager::{DEFAULT_LIVENESS_SECS, SessionLifecycleManager};
pub use state::{SESSION_RECORD_ID, SessionEvent, SessionRecord, SessionState};
