pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod server;

// Layered boundaries for application and infrastructure
pub mod app;
pub mod infra;

pub use domain::{CategoryMetrics, RawTransaction, Transaction};
pub use pipeline::{FailureMode, Pipeline, PipelineOutput};
