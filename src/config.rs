use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SalesEtlError};

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "sales_etl.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub server: ServerConfig,
    pub transform: TransformConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// JSON seed dataset consumed by extraction
    pub seed_path: PathBuf,
    /// String-typed CSV staging file written by extraction
    pub csv_path: PathBuf,
    /// SQLite database holding the result tables
    pub db_path: PathBuf,
    /// Directory for rolling JSON log files
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            seed_path: PathBuf::from("data/raw_sales.json"),
            csv_path: PathBuf::from("data/sales_data.csv"),
            db_path: PathBuf::from("data/sales.db"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Thresholds used by the transform stage.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// `high_volume` is set when quantity is strictly greater than this
    pub high_volume_threshold: f64,
    /// Outliers sit more than this many sample standard deviations above the category mean
    pub outlier_sigma: f64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            high_volume_threshold: 10.0,
            outlier_sigma: 2.0,
        }
    }
}

impl Config {
    /// Load `sales_etl.toml` if present, fall back to defaults, then apply
    /// environment overrides (a `.env` file is honoured).
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::from_file(DEFAULT_CONFIG_PATH)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            SalesEtlError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SALES_ETL_SEED_PATH") {
            self.paths.seed_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SALES_ETL_CSV_PATH") {
            self.paths.csv_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SALES_ETL_DB_PATH") {
            self.paths.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SALES_ETL_BIND_ADDR") {
            self.server.bind_addr = v;
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.transform.outlier_sigma.is_finite() || self.transform.outlier_sigma < 0.0 {
            return Err(SalesEtlError::Config(format!(
                "transform.outlier_sigma must be a non-negative number, got {}",
                self.transform.outlier_sigma
            )));
        }
        if !self.transform.high_volume_threshold.is_finite() {
            return Err(SalesEtlError::Config(
                "transform.high_volume_threshold must be finite".to_string(),
            ));
        }
        Ok(())
    }
}
