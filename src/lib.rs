pub mod config;
pub mod error;
pub mod persist;
pub mod pipeline;
pub mod record;
pub mod retry;
pub mod session;
pub mod store;

pub use config::SyncConfig;
pub use error::{PersistError, StoreError, SyncError};
pub use persist::{
    BatchPersistenceEngine, ConditionalWriteGateway, RecordOutcome, RunStatus, SaveResult,
    SyncReport,
};
pub use pipeline::{FetchBatch, PortalSource, SyncPipeline};
pub use record::{Record, RecordId, TableName};
pub use retry::{RetryConfig, retry_with_backoff};
pub use session::{SessionLifecycleManager, SessionRecord, SessionState, start_date};
pub use store::{MemoryStore, RecordStore, SqliteStore, WriteOutcome};
