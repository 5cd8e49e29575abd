//! Metrics for the sales ETL, recorded through the `metrics` facade and
//! exported in Prometheus text format.
//!
//! Recording is a no-op until [`init`] installs a recorder, so the transform
//! core can call these helpers from tests and library code freely.

use std::fmt;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::error::{Result, SalesEtlError};

/// Every metric name the crate emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Extract
    ExtractRecordsStaged,

    // Normalize
    NormalizeRecordsIn,
    NormalizeRecordsOut,
    NormalizeRecordsDropped,
    NormalizeQuantitiesImputed,
    NormalizePricesImputed,

    // Aggregate
    AggregateCategories,

    // Outliers
    OutliersFlagged,

    // Pipeline
    PipelineStageFailures,
    PipelineRunsCompleted,
    PipelineRunDuration,

    // Load
    LoadRowsWritten,
    LoadErrors,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::ExtractRecordsStaged => "sales_etl_extract_records_staged_total",
            MetricName::NormalizeRecordsIn => "sales_etl_normalize_records_in_total",
            MetricName::NormalizeRecordsOut => "sales_etl_normalize_records_out_total",
            MetricName::NormalizeRecordsDropped => "sales_etl_normalize_records_dropped_total",
            MetricName::NormalizeQuantitiesImputed => "sales_etl_normalize_quantities_imputed_total",
            MetricName::NormalizePricesImputed => "sales_etl_normalize_prices_imputed_total",
            MetricName::AggregateCategories => "sales_etl_aggregate_categories",
            MetricName::OutliersFlagged => "sales_etl_outliers_flagged_total",
            MetricName::PipelineStageFailures => "sales_etl_pipeline_stage_failures_total",
            MetricName::PipelineRunsCompleted => "sales_etl_pipeline_runs_completed_total",
            MetricName::PipelineRunDuration => "sales_etl_pipeline_run_duration_seconds",
            MetricName::LoadRowsWritten => "sales_etl_load_rows_written_total",
            MetricName::LoadErrors => "sales_etl_load_errors_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Safe to call more than once; later calls
/// are ignored.
pub fn init() -> Result<()> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| SalesEtlError::Metrics(format!("Failed to install Prometheus recorder: {}", e)))?;
    METRICS_HANDLE.set(handle).ok();
    info!("Metrics system initialized");
    Ok(())
}

/// Render the current metrics in Prometheus exposition format, if a
/// recorder has been installed.
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

pub mod extract {
    use super::MetricName;

    pub fn records_staged(count: usize) {
        ::metrics::counter!(MetricName::ExtractRecordsStaged.as_str()).increment(count as u64);
    }
}

pub mod normalize {
    use super::MetricName;

    pub fn batch_processed(records_in: usize, records_out: usize) {
        ::metrics::counter!(MetricName::NormalizeRecordsIn.as_str()).increment(records_in as u64);
        ::metrics::counter!(MetricName::NormalizeRecordsOut.as_str()).increment(records_out as u64);
    }

    pub fn records_dropped(count: usize) {
        ::metrics::counter!(MetricName::NormalizeRecordsDropped.as_str()).increment(count as u64);
    }

    pub fn quantities_imputed(count: usize) {
        ::metrics::counter!(MetricName::NormalizeQuantitiesImputed.as_str()).increment(count as u64);
    }

    pub fn prices_imputed(count: usize) {
        ::metrics::counter!(MetricName::NormalizePricesImputed.as_str()).increment(count as u64);
    }
}

pub mod aggregate {
    use super::MetricName;

    pub fn categories_computed(count: usize) {
        ::metrics::gauge!(MetricName::AggregateCategories.as_str()).set(count as f64);
    }
}

pub mod outliers {
    use super::MetricName;

    pub fn flagged(count: usize) {
        ::metrics::counter!(MetricName::OutliersFlagged.as_str()).increment(count as u64);
    }
}

pub mod pipeline {
    use super::MetricName;

    pub fn stage_failed(stage: &str) {
        ::metrics::counter!(MetricName::PipelineStageFailures.as_str(), "stage" => stage.to_string())
            .increment(1);
    }

    pub fn run_completed(duration_secs: f64) {
        ::metrics::counter!(MetricName::PipelineRunsCompleted.as_str()).increment(1);
        ::metrics::histogram!(MetricName::PipelineRunDuration.as_str()).record(duration_secs);
    }
}

pub mod load {
    use super::MetricName;

    pub fn rows_written(table: &str, count: usize) {
        ::metrics::counter!(MetricName::LoadRowsWritten.as_str(), "table" => table.to_string())
            .increment(count as u64);
    }

    pub fn write_failed(table: &str) {
        ::metrics::counter!(MetricName::LoadErrors.as_str(), "table" => table.to_string()).increment(1);
    }
}
