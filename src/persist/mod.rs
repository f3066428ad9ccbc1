mod engine;
mod gateway;
mod report;

pub use engine::{BatchPersistenceEngine, DEFAULT_RETENTION_DAYS, MAX_BATCH_SIZE, RecordOutcome};
pub use gateway::ConditionalWriteGateway;
pub use report::{AbortedTable, RunStatus, SaveResult, SyncReport};
