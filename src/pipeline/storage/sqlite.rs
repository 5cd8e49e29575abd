use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::{DateRange, ProductFilter, RunCounts, SalesStore};
use crate::constants::{DATE_FORMAT, METRICS_TABLE, OUTLIERS_TABLE, TRANSACTIONS_TABLE};
use crate::domain::{CategoryMetrics, DailySales, ProductSales, Transaction};
use crate::error::{Result, SalesEtlError};
use crate::pipeline::orchestrator::PipelineOutput;

const TRANSACTION_COLUMNS: &str =
    "date, product, category, quantity, price, total_sales, day_of_week, high_volume, outlier";

/// SQLite-backed result tables. Every `replace_*` runs in one transaction,
/// so readers see either the previous run's rows or the new ones.
pub struct SqliteSalesStore {
    conn: Mutex<Connection>,
}

impl SqliteSalesStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("Opened sales database at {}", db_path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {transactions} (
                date         TEXT NOT NULL,
                product      TEXT NOT NULL,
                category     TEXT NOT NULL,
                quantity     REAL NOT NULL,
                price        REAL NOT NULL,
                total_sales  REAL NOT NULL,
                day_of_week  TEXT NOT NULL,
                high_volume  INTEGER NOT NULL,
                outlier      INTEGER
            );
            CREATE TABLE IF NOT EXISTS {metrics} (
                category                 TEXT NOT NULL,
                avg_price                REAL NOT NULL,
                total_revenue            REAL NOT NULL,
                days_with_highest_sales  TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS {outliers} (
                date         TEXT NOT NULL,
                product      TEXT NOT NULL,
                category     TEXT NOT NULL,
                quantity     REAL NOT NULL,
                price        REAL NOT NULL,
                total_sales  REAL NOT NULL,
                day_of_week  TEXT NOT NULL,
                high_volume  INTEGER NOT NULL,
                outlier      INTEGER
            );
            "#,
            transactions = TRANSACTIONS_TABLE,
            metrics = METRICS_TABLE,
            outliers = OUTLIERS_TABLE,
        ))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SalesEtlError::Storage {
            message: "sqlite connection lock poisoned".to_string(),
        })
    }

    fn replace_transaction_table(&self, table: &str, rows: &[Transaction]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let written = write_transactions(&tx, table, rows)?;
        tx.commit()?;
        Ok(written)
    }

    fn read_transaction_table(&self, table: &str) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM {} ORDER BY rowid", TRANSACTION_COLUMNS, table))?;
        let rows = stmt
            .query_map([], transaction_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// Full replace of a transaction-shaped table inside the caller's transaction.
fn write_transactions(conn: &Connection, table: &str, rows: &[Transaction]) -> Result<usize> {
    conn.execute(&format!("DELETE FROM {}", table), [])?;
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        table, TRANSACTION_COLUMNS
    ))?;
    for row in rows {
        stmt.execute(params![
            row.date.format(DATE_FORMAT).to_string(),
            row.product,
            row.category,
            row.quantity,
            row.price,
            row.total_sales,
            row.day_of_week,
            row.high_volume,
            row.outlier,
        ])?;
    }
    debug!("Replaced {} with {} rows", table, rows.len());
    Ok(rows.len())
}

fn write_category_metrics(conn: &Connection, rows: &[CategoryMetrics]) -> Result<usize> {
    conn.execute(&format!("DELETE FROM {}", METRICS_TABLE), [])?;
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {} (category, avg_price, total_revenue, days_with_highest_sales) VALUES (?1, ?2, ?3, ?4)",
        METRICS_TABLE
    ))?;
    for row in rows {
        stmt.execute(params![
            row.category,
            row.avg_price,
            row.total_revenue,
            row.days_with_highest_sales,
        ])?;
    }
    debug!("Replaced {} with {} rows", METRICS_TABLE, rows.len());
    Ok(rows.len())
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        date: date_column(row, 0)?,
        product: row.get(1)?,
        category: row.get(2)?,
        quantity: row.get(3)?,
        price: row.get(4)?,
        total_sales: row.get(5)?,
        day_of_week: row.get(6)?,
        high_volume: row.get(7)?,
        outlier: row.get(8)?,
    })
}

#[async_trait]
impl SalesStore for SqliteSalesStore {
    async fn replace_run(&self, output: &PipelineOutput) -> Result<RunCounts> {
        let mut conn = self.conn()?;
        // dropping an uncommitted transaction rolls it back
        let tx = conn.transaction()?;
        let mut counts = RunCounts::default();
        if !output.transactions.is_empty() {
            counts.transactions = write_transactions(&tx, TRANSACTIONS_TABLE, &output.transactions)?;
        }
        if !output.category_metrics.is_empty() {
            counts.category_metrics = write_category_metrics(&tx, &output.category_metrics)?;
        }
        if !output.outliers.is_empty() {
            counts.outliers = write_transactions(&tx, OUTLIERS_TABLE, &output.outliers)?;
        }
        tx.commit()?;
        Ok(counts)
    }

    async fn replace_transactions(&self, rows: &[Transaction]) -> Result<usize> {
        self.replace_transaction_table(TRANSACTIONS_TABLE, rows)
    }

    async fn replace_category_metrics(&self, rows: &[CategoryMetrics]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let written = write_category_metrics(&tx, rows)?;
        tx.commit()?;
        Ok(written)
    }

    async fn replace_outliers(&self, rows: &[Transaction]) -> Result<usize> {
        self.replace_transaction_table(OUTLIERS_TABLE, rows)
    }

    async fn sales_by_product(&self, filter: &ProductFilter) -> Result<Vec<ProductSales>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT product, SUM(total_sales) AS total_sales
             FROM {}
             WHERE (?1 IS NULL OR product = ?1)
               AND (?2 IS NULL OR category = ?2)
             GROUP BY product
             ORDER BY product",
            TRANSACTIONS_TABLE
        ))?;
        let rows = stmt
            .query_map(params![filter.product_name, filter.category], |row| {
                Ok(ProductSales {
                    product: row.get(0)?,
                    total_sales: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn sales_by_day(&self, range: &DateRange) -> Result<Vec<DailySales>> {
        let start = range.start_date.map(|d| d.format(DATE_FORMAT).to_string());
        let end = range.end_date.map(|d| d.format(DATE_FORMAT).to_string());

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT date, SUM(total_sales) AS total_sales
             FROM {}
             WHERE (?1 IS NULL OR date >= ?1)
               AND (?2 IS NULL OR date <= ?2)
             GROUP BY date
             ORDER BY date",
            TRANSACTIONS_TABLE
        ))?;
        let rows = stmt
            .query_map(params![start, end], |row| {
                Ok(DailySales {
                    date: date_column(row, 0)?,
                    total_sales: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn category_metrics(&self) -> Result<Vec<CategoryMetrics>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT category, avg_price, total_revenue, days_with_highest_sales FROM {} ORDER BY rowid",
            METRICS_TABLE
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CategoryMetrics {
                    category: row.get(0)?,
                    avg_price: row.get(1)?,
                    total_revenue: row.get(2)?,
                    days_with_highest_sales: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn outliers(&self) -> Result<Vec<Transaction>> {
        self.read_transaction_table(OUTLIERS_TABLE)
    }
}
