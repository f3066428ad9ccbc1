use std::sync::Arc;

use tracing::trace;

use crate::error::StoreError;
use crate::record::{Record, TableName};
use crate::store::{RecordStore, WriteOutcome};

/// Writes single records behind an existence guard on their `Id`.
///
/// "Already there" comes back as [`WriteOutcome::AlreadyExists`]; every other
/// failure is handed back to the caller untouched.
#[derive(Clone)]
pub struct ConditionalWriteGateway {
    store: Arc<dyn RecordStore>,
}

impl ConditionalWriteGateway {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn write_if_absent(
        &self,
        table: &TableName,
        record: &Record,
    ) -> Result<WriteOutcome, StoreError> {
        let outcome = self.store.put_if_absent(table, record).await?;
        trace!(table = %table, ?outcome, "conditional write");
        Ok(outcome)
    }

    pub(crate) async fn prepare(&self, table: &TableName) -> Result<(), StoreError> {
        self.store.ensure_table(table).await
    }
}
