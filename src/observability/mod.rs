// Observability: metrics for each ETL phase. Logging lives in crate::logging.

pub mod metrics;

pub use metrics::{init, render};
