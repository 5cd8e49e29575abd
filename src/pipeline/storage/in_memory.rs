use super::{DateRange, ProductFilter, RunCounts, SalesStore};
use crate::domain::{CategoryMetrics, DailySales, ProductSales, Transaction};
use crate::error::{Result, SalesEtlError};
use crate::pipeline::orchestrator::PipelineOutput;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// In-memory storage implementation for development/testing
pub struct InMemorySalesStore {
    transactions: Arc<Mutex<Vec<Transaction>>>,
    category_metrics: Arc<Mutex<Vec<CategoryMetrics>>>,
    outliers: Arc<Mutex<Vec<Transaction>>>,
}

impl Default for InMemorySalesStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySalesStore {
    pub fn new() -> Self {
        Self {
            transactions: Arc::new(Mutex::new(Vec::new())),
            category_metrics: Arc::new(Mutex::new(Vec::new())),
            outliers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot of the stored transactions table.
    pub fn transactions(&self) -> Result<Vec<Transaction>> {
        Ok(lock(&self.transactions)?.clone())
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock().map_err(|_| SalesEtlError::Storage {
        message: "in-memory store lock poisoned".to_string(),
    })
}

#[async_trait]
impl SalesStore for InMemorySalesStore {
    async fn replace_run(&self, output: &PipelineOutput) -> Result<RunCounts> {
        // all three locks are held so readers never see a half-replaced run
        let mut transactions = lock(&self.transactions)?;
        let mut category_metrics = lock(&self.category_metrics)?;
        let mut outliers = lock(&self.outliers)?;

        let mut counts = RunCounts::default();
        if !output.transactions.is_empty() {
            *transactions = output.transactions.clone();
            counts.transactions = transactions.len();
        }
        if !output.category_metrics.is_empty() {
            *category_metrics = output.category_metrics.clone();
            counts.category_metrics = category_metrics.len();
        }
        if !output.outliers.is_empty() {
            *outliers = output.outliers.clone();
            counts.outliers = outliers.len();
        }
        debug!(?counts, "Replaced run");
        Ok(counts)
    }

    async fn replace_transactions(&self, rows: &[Transaction]) -> Result<usize> {
        *lock(&self.transactions)? = rows.to_vec();
        debug!("Replaced transactions with {} rows", rows.len());
        Ok(rows.len())
    }

    async fn replace_category_metrics(&self, rows: &[CategoryMetrics]) -> Result<usize> {
        *lock(&self.category_metrics)? = rows.to_vec();
        debug!("Replaced aggregated metrics with {} rows", rows.len());
        Ok(rows.len())
    }

    async fn replace_outliers(&self, rows: &[Transaction]) -> Result<usize> {
        *lock(&self.outliers)? = rows.to_vec();
        debug!("Replaced outliers with {} rows", rows.len());
        Ok(rows.len())
    }

    async fn sales_by_product(&self, filter: &ProductFilter) -> Result<Vec<ProductSales>> {
        let transactions = lock(&self.transactions)?;
        let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
        for tx in transactions.iter().filter(|tx| filter.matches(tx)) {
            *totals.entry(tx.product.as_str()).or_insert(0.0) += tx.total_sales;
        }
        Ok(totals
            .into_iter()
            .map(|(product, total_sales)| ProductSales {
                product: product.to_string(),
                total_sales,
            })
            .collect())
    }

    async fn sales_by_day(&self, range: &DateRange) -> Result<Vec<DailySales>> {
        let transactions = lock(&self.transactions)?;
        let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for tx in transactions.iter().filter(|tx| range.contains(tx.date)) {
            *totals.entry(tx.date).or_insert(0.0) += tx.total_sales;
        }
        Ok(totals
            .into_iter()
            .map(|(date, total_sales)| DailySales { date, total_sales })
            .collect())
    }

    async fn category_metrics(&self) -> Result<Vec<CategoryMetrics>> {
        Ok(lock(&self.category_metrics)?.clone())
    }

    async fn outliers(&self) -> Result<Vec<Transaction>> {
        Ok(lock(&self.outliers)?.clone())
    }
}
