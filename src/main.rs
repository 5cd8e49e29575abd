use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use sales_etl::app::EtlUseCase;
use sales_etl::config::Config;
use sales_etl::infra::CsvStagingSource;
use sales_etl::pipeline::extract::extract_data;
use sales_etl::pipeline::storage::{SalesStore, SqliteSalesStore};
use sales_etl::pipeline::{FailureMode, Pipeline};
use sales_etl::{logging, observability, server};

#[derive(Parser)]
#[command(name = "sales_etl")]
#[command(about = "Sales transaction ETL and query API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage the raw seed dataset as CSV
    Extract,
    /// Run extract, transform and load
    Run {
        /// Propagate the first transform failure instead of writing empty results
        #[arg(long)]
        strict: bool,
    },
    /// Serve the read-only query API over the result tables
    Serve {
        /// Address to bind, e.g. 0.0.0.0:8000 (defaults to the configured address)
        #[arg(long)]
        addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let config = Config::load()?;
    let _log_guard = logging::init_logging(&config.paths.log_dir);

    if let Err(e) = observability::init() {
        warn!("Metrics disabled: {}", e);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract => {
            println!("📥 Extracting raw sales data...");
            let staged = extract_data(&config.paths.seed_path, &config.paths.csv_path);
            println!("   Staged {} records to {}", staged, config.paths.csv_path.display());
        }
        Commands::Run { strict } => {
            println!("🚀 Running sales ETL (extract + transform + load)...");

            let mode = if strict { FailureMode::Strict } else { FailureMode::Lenient };
            let store: Arc<dyn SalesStore> = Arc::new(SqliteSalesStore::open(&config.paths.db_path)?);
            let use_case = EtlUseCase::new(
                Box::new(CsvStagingSource::new(&config.paths.seed_path, &config.paths.csv_path)),
                Pipeline::new(config.transform.clone()).with_mode(mode),
                store,
            );

            match use_case.run().await {
                Ok(report) => {
                    println!("\n📊 ETL Results:");
                    println!("   Raw records: {}", report.raw_records);
                    println!("   Transactions: {}", report.transactions);
                    println!("   Categories: {}", report.categories);
                    println!("   Outliers: {}", report.outliers);
                    println!("   Rows written: {}", report.load.rows_written());

                    if !report.load.errors.is_empty() {
                        warn!("{} errors encountered while loading", report.load.errors.len());
                        println!("\n⚠️  Errors encountered:");
                        for error in &report.load.errors {
                            println!("   - {}", error);
                        }
                    }
                }
                Err(e) => {
                    error!("ETL run failed: {:#}", e);
                    println!("❌ ETL run failed: {:#}", e);
                    // return rather than exit so the log guard drops and flushes
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| config.server.bind_addr.clone());
            let addr: SocketAddr = addr
                .parse()
                .with_context(|| format!("Invalid bind address '{}'", addr))?;
            let store: Arc<dyn SalesStore> = Arc::new(SqliteSalesStore::open(&config.paths.db_path)?);
            info!("Serving results from {}", config.paths.db_path.display());
            server::serve(store, addr).await?;
        }
    }
    Ok(ExitCode::SUCCESS)
}
