/// Table and column names shared by extraction, the store and the query API.

pub const SERVICE_NAME: &str = "sales_etl";

// Result tables
pub const TRANSACTIONS_TABLE: &str = "transactions";
pub const METRICS_TABLE: &str = "aggregated_metrics";
pub const OUTLIERS_TABLE: &str = "outliers";

// Raw input columns, in staging CSV order
pub const COL_DATE: &str = "date";
pub const COL_PRODUCT: &str = "product";
pub const COL_CATEGORY: &str = "category";
pub const COL_QUANTITY: &str = "quantity";
pub const COL_PRICE: &str = "price";

pub const RAW_COLUMNS: [&str; 5] = [COL_DATE, COL_PRODUCT, COL_CATEGORY, COL_QUANTITY, COL_PRICE];

/// Separator used when several dates tie for a category's best day.
pub const HIGHEST_SALES_DAYS_SEPARATOR: &str = ", ";

/// Canonical date format for persisted and rendered dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
