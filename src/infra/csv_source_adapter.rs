use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use crate::app::ports::RecordSourcePort;
use crate::domain::RawTransaction;
use crate::pipeline::extract::{extract_data, read_staging_csv};

/// Stages the JSON seed as CSV, then reads the CSV back as the raw batch.
pub struct CsvStagingSource {
    seed_path: PathBuf,
    csv_path: PathBuf,
}

impl CsvStagingSource {
    pub fn new(seed_path: impl Into<PathBuf>, csv_path: impl Into<PathBuf>) -> Self {
        Self {
            seed_path: seed_path.into(),
            csv_path: csv_path.into(),
        }
    }
}

#[async_trait]
impl RecordSourcePort for CsvStagingSource {
    async fn extract(&self) -> anyhow::Result<Vec<RawTransaction>> {
        extract_data(&self.seed_path, &self.csv_path);

        let records = read_staging_csv(&self.csv_path)
            .with_context(|| format!("Failed to read staging CSV '{}'", self.csv_path.display()))?;
        info!(records = records.len(), "Read raw records from staging CSV");
        Ok(records)
    }
}
