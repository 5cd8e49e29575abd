use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::DATE_FORMAT;

/// A sales record as delivered by extraction. Every field is kept as an
/// optional string; numeric fields may hold placeholders such as
/// `"not_a_number"` and are only interpreted by the normalizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub product: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub quantity: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub price: Option<String>,
}

impl RawTransaction {
    pub fn new(
        date: impl Into<String>,
        product: impl Into<String>,
        category: impl Into<String>,
        quantity: Option<&str>,
        price: Option<&str>,
    ) -> Self {
        Self {
            date: Some(date.into()),
            product: Some(product.into()),
            category: Some(category.into()),
            quantity: quantity.map(str::to_string),
            price: price.map(str::to_string),
        }
    }
}

/// Seed files mix strings, numbers and nulls in the same column; everything
/// that is not null is staged as its string form.
fn scalar_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// A cleaned and enriched transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub product: String,
    pub category: String,
    pub quantity: f64,
    pub price: f64,
    /// `quantity * price`
    pub total_sales: f64,
    /// English weekday name, e.g. "Monday"
    pub day_of_week: String,
    pub high_volume: bool,
    /// Set by outlier detection; `None` until the detector has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outlier: Option<bool>,
}

impl Transaction {
    pub fn is_outlier(&self) -> bool {
        self.outlier.unwrap_or(false)
    }
}

impl From<&Transaction> for RawTransaction {
    fn from(tx: &Transaction) -> Self {
        Self {
            date: Some(tx.date.format(DATE_FORMAT).to_string()),
            product: Some(tx.product.clone()),
            category: Some(tx.category.clone()),
            quantity: Some(tx.quantity.to_string()),
            price: Some(tx.price.to_string()),
        }
    }
}

/// Per-category aggregate row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMetrics {
    pub category: String,
    pub avg_price: f64,
    pub total_revenue: f64,
    /// Every date reaching the category's maximum daily sales, joined by ", "
    pub days_with_highest_sales: String,
}

/// `GET /sales/product` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSales {
    pub product: String,
    pub total_sales: f64,
}

/// `GET /sales/day` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySales {
    pub date: NaiveDate,
    pub total_sales: f64,
}
