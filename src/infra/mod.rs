pub mod csv_source_adapter;

pub use csv_source_adapter::CsvStagingSource;
