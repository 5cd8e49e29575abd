// Result-table persistence: the store port and its SQLite / in-memory adapters

pub mod in_memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

use crate::constants::DATE_FORMAT;
use crate::domain::{CategoryMetrics, DailySales, ProductSales, Transaction};
use crate::error::Result;
use crate::pipeline::orchestrator::PipelineOutput;

pub use in_memory::InMemorySalesStore;
pub use sqlite::SqliteSalesStore;

/// Filter for `sales_by_product`; `None` matches everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub product_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub category: Option<String>,
}

impl ProductFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.product_name.as_deref().map_or(true, |p| tx.product == p)
            && self.category.as_deref().map_or(true, |c| tx.category == c)
    }
}

/// Inclusive date bounds for `sales_by_day`; `None` leaves a side open.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateRange {
    #[serde(default, deserialize_with = "blank_or_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "blank_or_date")]
    pub end_date: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date.map_or(true, |start| date >= start) && self.end_date.map_or(true, |end| date <= end)
    }
}

/// Query strings send an unset filter as `key=`; treat it as absent.
fn blank_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn blank_or_date<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    blank_as_none(deserializer)?
        .map(|s| NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(serde::de::Error::custom))
        .transpose()
}

/// Rows written per table by [`SalesStore::replace_run`]. A table with no
/// rows in the run is left untouched and counts as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub transactions: usize,
    pub category_metrics: usize,
    pub outliers: usize,
}

/// Storage for the three result tables.
///
/// Writes are full replaces: after `replace_*` the table holds exactly the
/// given rows. Reads back the query API.
#[async_trait]
pub trait SalesStore: Send + Sync {
    /// Replace every non-empty table of one run as a unit. Either all of them
    /// hold the new rows afterwards or none of them changed.
    async fn replace_run(&self, output: &PipelineOutput) -> Result<RunCounts>;

    async fn replace_transactions(&self, rows: &[Transaction]) -> Result<usize>;
    async fn replace_category_metrics(&self, rows: &[CategoryMetrics]) -> Result<usize>;
    async fn replace_outliers(&self, rows: &[Transaction]) -> Result<usize>;

    /// Summed `total_sales` per product, ordered by product.
    async fn sales_by_product(&self, filter: &ProductFilter) -> Result<Vec<ProductSales>>;
    /// Summed `total_sales` per date, ordered by date.
    async fn sales_by_day(&self, range: &DateRange) -> Result<Vec<DailySales>>;
    async fn category_metrics(&self) -> Result<Vec<CategoryMetrics>>;
    async fn outliers(&self) -> Result<Vec<Transaction>>;
}
