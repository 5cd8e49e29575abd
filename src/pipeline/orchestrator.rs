use std::time::Instant;

use serde::Serialize;
use tracing::{info, info_span, Span};
use uuid::Uuid;

use crate::config::TransformConfig;
use crate::domain::{CategoryMetrics, RawTransaction, Transaction};
use crate::observability::metrics;
use crate::pipeline::processing::{CategoryAggregator, OutlierDetector, RecordNormalizer, TransformError};

/// How stage failures surface from a pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailureMode {
    /// Failures are logged and the failing stage yields an empty result.
    #[default]
    Lenient,
    /// The first computation failure is returned to the caller.
    Strict,
}

/// The three result tables of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineOutput {
    /// Normalized records carrying the `outlier` flag
    pub transactions: Vec<Transaction>,
    pub category_metrics: Vec<CategoryMetrics>,
    pub outliers: Vec<Transaction>,
}

impl PipelineOutput {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.category_metrics.is_empty() && self.outliers.is_empty()
    }
}

/// Runs normalize, then aggregate and outlier detection over the normalized batch.
///
/// Every run gets its own span with a fresh `run_id`; each stage logs inside a
/// child of that span. Runs share no state.
pub struct Pipeline {
    config: TransformConfig,
    mode: FailureMode,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(TransformConfig::default())
    }
}

struct Stages {
    normalizer: RecordNormalizer,
    aggregator: CategoryAggregator,
    detector: OutlierDetector,
}

impl Pipeline {
    pub fn new(config: TransformConfig) -> Self {
        Self {
            config,
            mode: FailureMode::Lenient,
        }
    }

    pub fn with_mode(mut self, mode: FailureMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> FailureMode {
        self.mode
    }

    /// Run according to the configured [`FailureMode`].
    pub fn execute(&self, raw: &[RawTransaction]) -> Result<PipelineOutput, TransformError> {
        match self.mode {
            FailureMode::Lenient => Ok(self.run(raw)),
            FailureMode::Strict => self.try_run(raw),
        }
    }

    /// Run with every stage failure contained. Never fails; a failed stage
    /// contributes an empty result.
    pub fn run(&self, raw: &[RawTransaction]) -> PipelineOutput {
        let started = Instant::now();
        let run_span = self.run_span(raw.len());
        let stages = self.stages(&run_span);

        let normalized = stages.normalizer.normalize(raw);
        if normalized.is_empty() {
            run_span.in_scope(|| info!("Normalization produced no records; skipping aggregation"));
            return PipelineOutput::default();
        }

        let category_metrics = stages.aggregator.aggregate(&normalized);
        let (flagged, outliers) = stages.detector.detect_outliers(&normalized);

        // If detection failed, the normalized records go out without flags
        let transactions = if flagged.is_empty() { normalized } else { flagged };

        let output = PipelineOutput {
            transactions,
            category_metrics,
            outliers,
        };
        self.finish(&run_span, &output, started);
        output
    }

    /// Run with stage failures propagated. Empty input is not a failure: it
    /// short-circuits to an empty output exactly as [`Pipeline::run`] does.
    pub fn try_run(&self, raw: &[RawTransaction]) -> Result<PipelineOutput, TransformError> {
        let started = Instant::now();
        let run_span = self.run_span(raw.len());
        let stages = self.stages(&run_span);

        let normalized = match stages.normalizer.try_normalize(raw) {
            Ok(records) => records,
            Err(err) if err.is_empty_input() => Vec::new(),
            Err(err) => return Err(err),
        };
        if normalized.is_empty() {
            run_span.in_scope(|| info!("Normalization produced no records; skipping aggregation"));
            return Ok(PipelineOutput::default());
        }

        let category_metrics = stages.aggregator.try_aggregate(&normalized)?;
        let (transactions, outliers) = stages.detector.try_detect_outliers(&normalized)?;

        let output = PipelineOutput {
            transactions,
            category_metrics,
            outliers,
        };
        self.finish(&run_span, &output, started);
        Ok(output)
    }

    fn run_span(&self, records: usize) -> Span {
        info_span!("pipeline_run", run_id = %Uuid::new_v4(), records)
    }

    fn stages(&self, run_span: &Span) -> Stages {
        Stages {
            normalizer: RecordNormalizer::new(&self.config)
                .with_span(info_span!(parent: run_span, "normalize")),
            aggregator: CategoryAggregator::new().with_span(info_span!(parent: run_span, "aggregate")),
            detector: OutlierDetector::new(&self.config)
                .with_span(info_span!(parent: run_span, "detect_outliers")),
        }
    }

    fn finish(&self, run_span: &Span, output: &PipelineOutput, started: Instant) {
        let elapsed = started.elapsed().as_secs_f64();
        metrics::pipeline::run_completed(elapsed);
        run_span.in_scope(|| {
            info!(
                transactions = output.transactions.len(),
                categories = output.category_metrics.len(),
                outliers = output.outliers.len(),
                elapsed_secs = elapsed,
                "Transform finished"
            )
        });
    }
}

/// Run the default lenient pipeline over `raw`.
pub fn run(raw: &[RawTransaction]) -> PipelineOutput {
    Pipeline::default().run(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::Stage;
    use pretty_assertions::assert_eq;

    fn raw(date: &str, category: &str, quantity: Option<&str>, price: Option<&str>) -> RawTransaction {
        RawTransaction::new(date, "Widget", category, quantity, price)
    }

    #[test]
    fn test_empty_batch_yields_three_empty_tables() {
        let output = run(&[]);
        assert_eq!(output, PipelineOutput::default());
        assert!(output.is_empty());

        let strict = Pipeline::default().with_mode(FailureMode::Strict);
        assert_eq!(strict.execute(&[]), Ok(PipelineOutput::default()));
    }

    #[test]
    fn test_all_records_dropped_short_circuits() {
        let records = vec![raw("2024-01-01", "A", None, Some("not_a_number"))];

        let output = run(&records);

        assert!(output.is_empty());
    }

    #[test]
    fn test_transactions_carry_outlier_flag() {
        let records = vec![
            raw("2024-01-01", "A", Some("5"), Some("10")),
            raw("2024-01-01", "A", None, Some("10")),
        ];

        let output = run(&records);

        assert_eq!(output.transactions.len(), 2);
        assert!(output.transactions.iter().all(|t| t.outlier == Some(false)));
        assert!(output.outliers.is_empty());
        assert_eq!(output.category_metrics.len(), 1);
        assert_eq!(output.category_metrics[0].avg_price, 10.0);
        assert_eq!(output.category_metrics[0].total_revenue, 50.0);
    }

    #[test]
    fn test_lenient_failure_degrades_to_empty_output() {
        let records = vec![raw("not-a-date", "A", Some("1"), Some("1"))];

        assert!(run(&records).is_empty());
    }

    #[test]
    fn test_strict_mode_surfaces_failure() {
        let records = vec![raw("not-a-date", "A", Some("1"), Some("1"))];
        let pipeline = Pipeline::default().with_mode(FailureMode::Strict);

        let err = pipeline.execute(&records).unwrap_err();

        assert_eq!(err.stage(), Stage::Normalize);
    }

    #[test]
    fn test_strict_and_lenient_agree_on_good_input() {
        let records = vec![
            raw("2024-01-01", "A", Some("5"), Some("10")),
            raw("2024-01-02", "A", Some("7"), Some("not_a_number")),
            raw("2024-01-02", "B", Some("1"), Some("3")),
        ];
        let pipeline = Pipeline::default();

        assert_eq!(pipeline.try_run(&records).unwrap(), pipeline.run(&records));
    }
}
