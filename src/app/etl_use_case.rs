use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::app::ports::RecordSourcePort;
use crate::pipeline::load::{insert_data, LoadSummary};
use crate::pipeline::storage::SalesStore;
use crate::pipeline::Pipeline;

/// Outcome of one extract → transform → load run
#[derive(Debug, Clone, Serialize)]
pub struct EtlReport {
    pub raw_records: usize,
    pub transactions: usize,
    pub categories: usize,
    pub outliers: usize,
    pub load: LoadSummary,
}

/// Use case wiring a record source, the transform pipeline and a store
pub struct EtlUseCase {
    source: Box<dyn RecordSourcePort>,
    pipeline: Pipeline,
    store: Arc<dyn SalesStore>,
}

impl EtlUseCase {
    pub fn new(source: Box<dyn RecordSourcePort>, pipeline: Pipeline, store: Arc<dyn SalesStore>) -> Self {
        Self {
            source,
            pipeline,
            store,
        }
    }

    /// Run the full batch. Extraction errors and, in strict mode, transform
    /// failures are returned; load failures are reported in the summary.
    #[instrument(skip(self), fields(mode = ?self.pipeline.mode()))]
    pub async fn run(&self) -> Result<EtlReport> {
        let raw = self.source.extract().await?;
        let output = self.pipeline.execute(&raw)?;
        let load = insert_data(self.store.as_ref(), &output).await;

        let report = EtlReport {
            raw_records: raw.len(),
            transactions: output.transactions.len(),
            categories: output.category_metrics.len(),
            outliers: output.outliers.len(),
            load,
        };
        info!(
            raw_records = report.raw_records,
            transactions = report.transactions,
            categories = report.categories,
            outliers = report.outliers,
            "ETL run finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::StaticRecordSource;
    use crate::domain::RawTransaction;
    use crate::pipeline::storage::InMemorySalesStore;
    use crate::pipeline::FailureMode;

    fn records() -> Vec<RawTransaction> {
        vec![
            RawTransaction::new("2024-01-01", "Laptop", "Electronics", Some("2"), Some("1000")),
            RawTransaction::new("2024-01-02", "Mouse", "Electronics", None, Some("not_a_number")),
            RawTransaction::new("2024-01-02", "Desk", "Furniture", Some("1"), Some("250")),
        ]
    }

    #[tokio::test]
    async fn test_etl_use_case_persists_all_tables() {
        let store = Arc::new(InMemorySalesStore::new());
        let use_case = EtlUseCase::new(
            Box::new(StaticRecordSource::new(records())),
            Pipeline::default(),
            store.clone(),
        );

        let report = use_case.run().await.unwrap();

        assert_eq!(report.raw_records, 3);
        assert_eq!(report.transactions, 3);
        assert_eq!(report.categories, 2);
        assert_eq!(report.load.transactions_written, 3);
        assert_eq!(report.load.metrics_written, 2);
        assert_eq!(store.category_metrics().await.unwrap()[0].category, "Electronics");
    }

    #[tokio::test]
    async fn test_strict_mode_returns_transform_error() {
        let mut bad = records();
        bad[0].date = Some("31st of never".to_string());
        let store = Arc::new(InMemorySalesStore::new());
        let use_case = EtlUseCase::new(
            Box::new(StaticRecordSource::new(bad)),
            Pipeline::default().with_mode(FailureMode::Strict),
            store.clone(),
        );

        assert!(use_case.run().await.is_err());
        assert!(store.transactions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lenient_mode_writes_nothing_on_failure() {
        let mut bad = records();
        bad[0].date = Some("31st of never".to_string());
        let store = Arc::new(InMemorySalesStore::new());
        let use_case = EtlUseCase::new(Box::new(StaticRecordSource::new(bad)), Pipeline::default(), store.clone());

        let report = use_case.run().await.unwrap();

        assert_eq!(report.transactions, 0);
        assert_eq!(report.load.rows_written(), 0);
    }
}
