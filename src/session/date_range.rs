use chrono::{DateTime, Duration, Utc};

use super::SessionRecord;

/// Days to look back when there is no session history to go on
pub const DEFAULT_DAYS_IN_PAST: i64 = 7;

/// Longest accepted look-back window, in days
pub const MAX_DAYS_IN_PAST: i64 = 36_500;

/// Earliest point the next portal fetch needs to cover.
///
/// Prefers the last confirmed success, then the creation of the current
/// token, and otherwise falls back to `default_days_in_past` before `now`,
/// saturating at the earliest representable instant.
pub fn start_date(
    session: Option<&SessionRecord>,
    default_days_in_past: i64,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    session
        .map(|s| s.last_used_successfully.unwrap_or(s.created))
        .unwrap_or_else(|| {
            Duration::try_days(default_days_in_past)
                .and_then(|window| now.checked_sub_signed(window))
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        })
}
