// Sales ETL pipeline: extraction, transform stages, loading, and result storage

pub mod extract;
pub mod load;
pub mod orchestrator;
pub mod processing;
pub mod storage;

// Re-export key types and functions from each stage
pub use orchestrator::{FailureMode, Pipeline, PipelineOutput};
pub use processing::{Stage, TransformError};
