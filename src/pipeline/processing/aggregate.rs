use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use tracing::{debug, info, info_span, Span};

use super::{contain, Stage, TransformError};
use crate::constants::{DATE_FORMAT, HIGHEST_SALES_DAYS_SEPARATOR};
use crate::domain::{CategoryMetrics, Transaction};
use crate::observability::metrics;

/// Computes one [`CategoryMetrics`] row per category, in first-seen order.
pub struct CategoryAggregator {
    span: Span,
}

impl Default for CategoryAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Running totals for one category.
struct CategoryTotals<'a> {
    category: &'a str,
    price_sum: f64,
    records: usize,
    revenue: f64,
    /// `total_sales` summed per date, ordered by date
    daily_sales: BTreeMap<NaiveDate, f64>,
}

impl<'a> CategoryTotals<'a> {
    fn new(category: &'a str) -> Self {
        Self {
            category,
            price_sum: 0.0,
            records: 0,
            revenue: 0.0,
            daily_sales: BTreeMap::new(),
        }
    }

    fn add(&mut self, tx: &Transaction) {
        self.price_sum += tx.price;
        self.records += 1;
        self.revenue += tx.total_sales;
        *self.daily_sales.entry(tx.date).or_insert(0.0) += tx.total_sales;
    }

    /// Every date whose summed sales equal the category maximum, ties kept.
    fn days_with_highest_sales(&self) -> Vec<NaiveDate> {
        let max = self
            .daily_sales
            .values()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        self.daily_sales
            .iter()
            .filter(|(_, total)| **total == max)
            .map(|(date, _)| *date)
            .collect()
    }
}

impl CategoryAggregator {
    pub fn new() -> Self {
        Self {
            span: info_span!("aggregate"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Aggregate per category. Failures are logged and yield no rows.
    pub fn aggregate(&self, records: &[Transaction]) -> Vec<CategoryMetrics> {
        contain(&self.span, self.try_aggregate(records))
    }

    pub fn try_aggregate(&self, records: &[Transaction]) -> Result<Vec<CategoryMetrics>, TransformError> {
        let _enter = self.span.enter();

        if records.is_empty() {
            return Err(TransformError::EmptyInput { stage: Stage::Aggregate });
        }

        let mut order: HashMap<&str, usize> = HashMap::new();
        let mut totals: Vec<CategoryTotals<'_>> = Vec::new();
        for tx in records {
            let idx = *order.entry(tx.category.as_str()).or_insert_with(|| {
                totals.push(CategoryTotals::new(tx.category.as_str()));
                totals.len() - 1
            });
            totals[idx].add(tx);
        }

        let mut rows = Vec::with_capacity(totals.len());
        for group in &totals {
            let best_days = group.days_with_highest_sales();
            if best_days.is_empty() {
                return Err(TransformError::computation(
                    Stage::Aggregate,
                    format!("no highest-sales day for category '{}'", group.category),
                ));
            }
            let days_with_highest_sales = best_days
                .iter()
                .map(|d| d.format(DATE_FORMAT).to_string())
                .collect::<Vec<_>>()
                .join(HIGHEST_SALES_DAYS_SEPARATOR);

            debug!(
                category = group.category,
                records = group.records,
                best_days = %days_with_highest_sales,
                "Aggregated category"
            );

            rows.push(CategoryMetrics {
                category: group.category.to_string(),
                avg_price: group.price_sum / group.records as f64,
                total_revenue: group.revenue,
                days_with_highest_sales,
            });
        }

        metrics::aggregate::categories_computed(rows.len());
        info!(categories = rows.len(), "Aggregated category metrics");

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tx(date: &str, category: &str, quantity: f64, price: f64) -> Transaction {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        Transaction {
            date,
            product: "Widget".to_string(),
            category: category.to_string(),
            quantity,
            price,
            total_sales: quantity * price,
            day_of_week: date.format("%A").to_string(),
            high_volume: quantity > 10.0,
            outlier: None,
        }
    }

    #[test]
    fn test_avg_price_and_total_revenue() {
        let records = vec![
            tx("2024-01-01", "A", 5.0, 10.0),
            tx("2024-01-01", "A", 0.0, 10.0),
        ];

        let rows = CategoryAggregator::new().aggregate(&records);

        assert_eq!(
            rows,
            vec![CategoryMetrics {
                category: "A".to_string(),
                avg_price: 10.0,
                total_revenue: 50.0,
                days_with_highest_sales: "2024-01-01".to_string(),
            }]
        );
    }

    #[test]
    fn test_tied_days_are_all_reported_in_date_order() {
        let records = vec![
            tx("2024-01-03", "A", 2.0, 10.0),
            tx("2024-01-01", "A", 1.0, 10.0),
            tx("2024-01-01", "A", 1.0, 10.0),
            tx("2024-01-02", "A", 1.0, 5.0),
        ];

        let rows = CategoryAggregator::new().aggregate(&records);

        assert_eq!(rows[0].days_with_highest_sales, "2024-01-01, 2024-01-03");
    }

    #[test]
    fn test_daily_sales_are_summed_before_picking_max() {
        // two small sales on the 1st beat one larger sale on the 2nd
        let records = vec![
            tx("2024-01-01", "A", 3.0, 10.0),
            tx("2024-01-02", "A", 5.0, 10.0),
            tx("2024-01-01", "A", 3.0, 10.0),
        ];

        let rows = CategoryAggregator::new().aggregate(&records);

        assert_eq!(rows[0].days_with_highest_sales, "2024-01-01");
    }

    #[test]
    fn test_rows_follow_first_seen_category_order() {
        let records = vec![
            tx("2024-01-01", "Furniture", 1.0, 100.0),
            tx("2024-01-01", "Electronics", 1.0, 50.0),
            tx("2024-01-02", "Furniture", 1.0, 300.0),
        ];

        let rows = CategoryAggregator::new().aggregate(&records);

        let categories: Vec<&str> = rows.iter().map(|r| r.category.as_str()).collect();
        assert_eq!(categories, vec!["Furniture", "Electronics"]);
        assert_eq!(rows[0].avg_price, 200.0);
        assert_eq!(rows[0].total_revenue, 400.0);
    }

    #[test]
    fn test_total_revenue_conserves_category_sales() {
        let records = vec![
            tx("2024-01-01", "A", 1.5, 3.3),
            tx("2024-01-02", "B", 2.0, 7.0),
            tx("2024-01-02", "A", 4.0, 1.1),
            tx("2024-01-05", "A", 0.0, 9.0),
        ];

        let rows = CategoryAggregator::new().aggregate(&records);

        for row in &rows {
            let expected: f64 = records
                .iter()
                .filter(|t| t.category == row.category)
                .map(|t| t.total_sales)
                .sum();
            assert!((row.total_revenue - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_zero_sales_category_reports_every_day() {
        let records = vec![
            tx("2024-01-01", "A", 0.0, 10.0),
            tx("2024-01-02", "A", 0.0, 10.0),
        ];

        let rows = CategoryAggregator::new().aggregate(&records);

        assert_eq!(rows[0].days_with_highest_sales, "2024-01-01, 2024-01-02");
    }

    #[test]
    fn test_empty_input() {
        let aggregator = CategoryAggregator::new();
        assert!(aggregator.aggregate(&[]).is_empty());
        assert!(aggregator.try_aggregate(&[]).unwrap_err().is_empty_input());
    }

    #[test]
    fn test_nan_sales_violate_best_day_invariant() {
        let mut bad = tx("2024-01-01", "A", 1.0, 1.0);
        bad.total_sales = f64::NAN;

        let err = CategoryAggregator::new().try_aggregate(&[bad]).unwrap_err();

        assert_eq!(err.stage(), Stage::Aggregate);
        assert!(!err.is_empty_input());
    }
}
