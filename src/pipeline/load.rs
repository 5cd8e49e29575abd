use serde::Serialize;
use tracing::{error, info};

use crate::constants::{METRICS_TABLE, OUTLIERS_TABLE, TRANSACTIONS_TABLE};
use crate::observability::metrics;
use crate::pipeline::orchestrator::PipelineOutput;
use crate::pipeline::storage::SalesStore;

/// What a load wrote.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct LoadSummary {
    pub transactions_written: usize,
    pub metrics_written: usize,
    pub outliers_written: usize,
    /// Tables skipped because they had no rows
    pub skipped_tables: Vec<String>,
    pub errors: Vec<String>,
}

impl LoadSummary {
    pub fn rows_written(&self) -> usize {
        self.transactions_written + self.metrics_written + self.outliers_written
    }
}

/// Persist a run's three tables as one unit. Empty tables are not written,
/// so the previous contents stay in place. A store error leaves every table
/// as it was; it is logged and reported in the summary.
pub async fn insert_data(store: &dyn SalesStore, output: &PipelineOutput) -> LoadSummary {
    let mut summary = LoadSummary::default();

    if output.is_empty() {
        info!("No data to insert into the database");
        summary.skipped_tables = vec![
            TRANSACTIONS_TABLE.to_string(),
            METRICS_TABLE.to_string(),
            OUTLIERS_TABLE.to_string(),
        ];
        return summary;
    }

    let tables = [
        (TRANSACTIONS_TABLE, output.transactions.is_empty()),
        (METRICS_TABLE, output.category_metrics.is_empty()),
        (OUTLIERS_TABLE, output.outliers.is_empty()),
    ];
    for (table, empty) in tables {
        if empty {
            summary.skipped_tables.push(table.to_string());
        }
    }

    match store.replace_run(output).await {
        Ok(counts) => {
            summary.transactions_written = counts.transactions;
            summary.metrics_written = counts.category_metrics;
            summary.outliers_written = counts.outliers;
            metrics::load::rows_written(TRANSACTIONS_TABLE, counts.transactions);
            metrics::load::rows_written(METRICS_TABLE, counts.category_metrics);
            metrics::load::rows_written(OUTLIERS_TABLE, counts.outliers);
        }
        Err(e) => {
            error!("Error inserting data into the database: {}", e);
            for (table, empty) in tables {
                if !empty {
                    metrics::load::write_failed(table);
                }
            }
            summary.errors.push(e.to_string());
        }
    }

    info!(
        rows = summary.rows_written(),
        skipped = ?summary.skipped_tables,
        errors = summary.errors.len(),
        "Load finished"
    );
    summary
}
