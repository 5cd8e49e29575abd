// Pipeline processing: record cleaning, category aggregation, outlier detection

pub mod aggregate;
pub mod normalize;
pub mod outliers;
pub mod stats;

use std::fmt;

use thiserror::Error;
use tracing::{error, info, Span};

use crate::observability::metrics;

pub use aggregate::CategoryAggregator;
pub use normalize::RecordNormalizer;
pub use outliers::OutlierDetector;

/// The transform stages, used to label errors, spans and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalize,
    Aggregate,
    DetectOutliers,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Normalize => "normalize",
            Stage::Aggregate => "aggregate",
            Stage::DetectOutliers => "detect_outliers",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures a transform stage can report through its strict `try_*` entry point.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("no data to {stage}")]
    EmptyInput { stage: Stage },

    #[error("error in {stage}: {message}")]
    ComputationFailure { stage: Stage, message: String },
}

impl TransformError {
    pub fn computation(stage: Stage, message: impl Into<String>) -> Self {
        TransformError::ComputationFailure {
            stage,
            message: message.into(),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            TransformError::EmptyInput { stage } | TransformError::ComputationFailure { stage, .. } => *stage,
        }
    }

    pub fn is_empty_input(&self) -> bool {
        matches!(self, TransformError::EmptyInput { .. })
    }
}

/// Contain a stage result at the stage boundary: failures are logged inside
/// the stage's span and degrade to an empty result.
///
/// Empty input to the normalizer is only a notice; everywhere else it is
/// logged as an error.
pub(crate) fn contain<T: Default>(span: &Span, result: Result<T, TransformError>) -> T {
    let _enter = span.enter();
    match result {
        Ok(value) => value,
        Err(TransformError::EmptyInput { stage: Stage::Normalize }) => {
            info!("No data to clean");
            T::default()
        }
        Err(err @ TransformError::EmptyInput { .. }) => {
            error!("{}", err);
            T::default()
        }
        Err(err) => {
            error!(stage = %err.stage(), "{}", err);
            metrics::pipeline::stage_failed(err.stage().as_str());
            T::default()
        }
    }
}
