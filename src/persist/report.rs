use serde::Serialize;

use crate::record::Record;

/// Outcome counts for one table.
///
/// Records that already existed are counted in neither `successful` nor
/// `failed`; see [`SaveResult::already_existed`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResult {
    pub table: String,
    /// Records covered by this result
    pub attempted: usize,
    pub successful: usize,
    pub failed: usize,
    /// Original records (without the injected ttl) whose write failed
    pub failed_items: Vec<Record>,
}

impl SaveResult {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn attempted(&self) -> usize {
        self.attempted
    }

    pub fn already_existed(&self) -> usize {
        self.attempted - self.successful - self.failed
    }

    pub(crate) fn absorb(&mut self, other: SaveResult) {
        self.attempted += other.attempted;
        self.successful += other.successful;
        self.failed += other.failed;
        self.failed_items.extend(other.failed_items);
    }
}

/// Overall status of a sync run, derived only from the aggregated counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No record failed
    Success,
    /// Some records failed, some were written
    PartialSuccess,
    /// Records failed and none were written
    Failure,
    /// The run did not start because the session is known to be bad
    Skipped,
}

impl RunStatus {
    pub fn classify(successful: usize, failed: usize) -> Self {
        match (successful, failed) {
            (_, 0) => Self::Success,
            (0, _) => Self::Failure,
            _ => Self::PartialSuccess,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::PartialSuccess => write!(f, "partial_success"),
            Self::Failure => write!(f, "failure"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// A table whose persistence stopped on a table-level error
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortedTable {
    pub table: String,
    pub error: String,
    /// Records never attempted because of the abort
    pub unattempted: usize,
}

/// Aggregated results of persisting every collection of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub results: Vec<SaveResult>,
    pub aborted: Vec<AbortedTable>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
}

impl SyncReport {
    /// Report for a run that never started.
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn successful(&self) -> usize {
        self.results.iter().map(|r| r.successful).sum()
    }

    /// Failed records, counting those a table abort left unattempted
    pub fn failed(&self) -> usize {
        let failed: usize = self.results.iter().map(|r| r.failed).sum();
        failed + self.aborted.iter().map(|a| a.unattempted).sum::<usize>()
    }

    pub fn already_existed(&self) -> usize {
        self.results.iter().map(SaveResult::already_existed).sum()
    }

    pub fn status(&self) -> RunStatus {
        if self.skipped {
            RunStatus::Skipped
        } else {
            RunStatus::classify(self.successful(), self.failed())
        }
    }

    pub fn result_for(&self, table: &str) -> Option<&SaveResult> {
        self.results.iter().find(|r| r.table == table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(table: &str, attempted: usize, successful: usize, failed: usize) -> SaveResult {
        SaveResult {
            table: table.to_string(),
            attempted,
            successful,
            failed,
            failed_items: vec![],
        }
    }

    #[test]
    fn test_already_existed_is_the_remainder() {
        let r = result("Posts", 10, 6, 1);
        assert_eq!(r.already_existed(), 3);
        assert_eq!(r.successful + r.failed + r.already_existed(), r.attempted);
    }

    #[test]
    fn test_classify() {
        assert_eq!(RunStatus::classify(0, 0), RunStatus::Success);
        assert_eq!(RunStatus::classify(5, 0), RunStatus::Success);
        assert_eq!(RunStatus::classify(5, 2), RunStatus::PartialSuccess);
        assert_eq!(RunStatus::classify(0, 2), RunStatus::Failure);
    }

    #[test]
    fn test_report_counts_unattempted_as_failed() {
        let report = SyncReport {
            results: vec![result("Posts", 4, 4, 0), result("Events", 25, 20, 0)],
            aborted: vec![AbortedTable {
                table: "Events".to_string(),
                error: "store unavailable".to_string(),
                unattempted: 5,
            }],
            skipped: false,
        };

        assert_eq!(report.successful(), 24);
        assert_eq!(report.failed(), 5);
        assert_eq!(report.already_existed(), 5);
        assert_eq!(report.status(), RunStatus::PartialSuccess);
        assert_eq!(report.result_for("Events").map(|r| r.attempted), Some(25));
    }

    #[test]
    fn test_save_result_json_shape() {
        let mut r = result("Posts", 2, 1, 1);
        r.failed_items.push(Record::with_id(5));

        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["failedItems"], serde_json::json!([{ "Id": 5 }]));
        assert!(json.get("failed_items").is_none());
    }

    #[test]
    fn test_skipped_report() {
        assert_eq!(SyncReport::skipped().status(), RunStatus::Skipped);
    }
}
