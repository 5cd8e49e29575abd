use async_trait::async_trait;

use crate::domain::RawTransaction;

/// Supplies the raw batch for one ETL run.
#[async_trait]
pub trait RecordSourcePort: Send + Sync {
    async fn extract(&self) -> anyhow::Result<Vec<RawTransaction>>;
}

/// A fixed batch, for tests and for piping records in from elsewhere.
pub struct StaticRecordSource {
    records: Vec<RawTransaction>,
}

impl StaticRecordSource {
    pub fn new(records: Vec<RawTransaction>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl RecordSourcePort for StaticRecordSource {
    async fn extract(&self) -> anyhow::Result<Vec<RawTransaction>> {
        Ok(self.records.clone())
    }
}
