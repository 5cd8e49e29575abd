use std::collections::HashMap;

use tracing::{info, info_span, Span};

use super::{contain, stats, Stage, TransformError};
use crate::config::TransformConfig;
use crate::domain::Transaction;
use crate::observability::metrics;

/// Flags records whose quantity sits more than `sigma` sample standard
/// deviations above their category's mean quantity.
///
/// Single-record categories have an undefined (NaN) standard deviation, so
/// their threshold compares false and they never produce outliers.
pub struct OutlierDetector {
    sigma: f64,
    span: Span,
}

impl Default for OutlierDetector {
    fn default() -> Self {
        Self::new(&TransformConfig::default())
    }
}

/// `(every record with its outlier flag set, only the outliers)`
pub type DetectionResult = (Vec<Transaction>, Vec<Transaction>);

impl OutlierDetector {
    pub fn new(config: &TransformConfig) -> Self {
        Self {
            sigma: config.outlier_sigma,
            span: info_span!("detect_outliers"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Annotate and filter. Failures are logged and yield two empty sequences.
    pub fn detect_outliers(&self, records: &[Transaction]) -> DetectionResult {
        contain(&self.span, self.try_detect_outliers(records))
    }

    pub fn try_detect_outliers(&self, records: &[Transaction]) -> Result<DetectionResult, TransformError> {
        let _enter = self.span.enter();

        if records.is_empty() {
            return Err(TransformError::EmptyInput {
                stage: Stage::DetectOutliers,
            });
        }

        let thresholds = self.category_thresholds(records);

        let flagged: Vec<Transaction> = records
            .iter()
            .map(|tx| {
                let threshold = thresholds.get(tx.category.as_str()).copied().unwrap_or(f64::NAN);
                Transaction {
                    outlier: Some(tx.quantity > threshold),
                    ..tx.clone()
                }
            })
            .collect();

        let outliers: Vec<Transaction> = flagged.iter().filter(|tx| tx.is_outlier()).cloned().collect();

        metrics::outliers::flagged(outliers.len());
        info!(
            records = flagged.len(),
            outliers = outliers.len(),
            sigma = self.sigma,
            "Outlier detection complete"
        );

        Ok((flagged, outliers))
    }

    /// `mean + sigma * sample_std` of quantity, per category.
    fn category_thresholds<'a>(&self, records: &'a [Transaction]) -> HashMap<&'a str, f64> {
        let mut quantities: HashMap<&'a str, Vec<f64>> = HashMap::new();
        for tx in records {
            quantities.entry(tx.category.as_str()).or_default().push(tx.quantity);
        }
        quantities
            .into_iter()
            .map(|(category, values)| {
                let threshold = stats::mean(&values) + self.sigma * stats::std_dev_sample(&values);
                (category, threshold)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(category: &str, quantity: f64) -> Transaction {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        Transaction {
            date,
            product: "Widget".to_string(),
            category: category.to_string(),
            quantity,
            price: 1.0,
            total_sales: quantity,
            day_of_week: "Monday".to_string(),
            high_volume: quantity > 10.0,
            outlier: None,
        }
    }

    #[test]
    fn test_flags_quantity_above_two_sigma() {
        // mean 9.1667, sample std ~20.004, threshold ~49.17
        let mut records: Vec<Transaction> = (0..5).map(|_| tx("A", 1.0)).collect();
        records.push(tx("A", 50.0));

        let (flagged, outliers) = OutlierDetector::default().detect_outliers(&records);

        assert_eq!(flagged.len(), 6);
        assert!(flagged.iter().all(|t| t.outlier.is_some()));
        assert_eq!(outliers.len(), 1);
        assert_eq!(outliers[0].quantity, 50.0);
        assert_eq!(flagged.iter().filter(|t| t.is_outlier()).count(), 1);
    }

    #[test]
    fn test_singleton_category_is_never_an_outlier() {
        let records = vec![tx("Solo", 1000.0), tx("B", 1.0), tx("B", 2.0)];

        let (flagged, outliers) = OutlierDetector::default().detect_outliers(&records);

        assert_eq!(flagged[0].outlier, Some(false));
        assert!(outliers.is_empty());
    }

    #[test]
    fn test_constant_quantities_have_no_outliers() {
        let records = vec![tx("A", 4.0), tx("A", 4.0), tx("A", 4.0)];

        let (_, outliers) = OutlierDetector::default().detect_outliers(&records);

        assert!(outliers.is_empty());
    }

    #[test]
    fn test_threshold_is_per_category() {
        // 50 is extreme among the small A quantities but ordinary in B
        let mut records: Vec<Transaction> = (0..5).map(|_| tx("A", 1.0)).collect();
        records.push(tx("A", 50.0));
        records.extend([40.0, 60.0, 45.0, 55.0, 50.0, 52.0].iter().map(|q| tx("B", *q)));

        let (_, outliers) = OutlierDetector::default().detect_outliers(&records);

        assert_eq!(outliers.len(), 1);
        assert_eq!(outliers[0].category, "A");
    }

    #[test]
    fn test_outlier_flag_matches_threshold_rule() {
        let records: Vec<Transaction> = [3.0, 7.0, 1.0, 2.0, 9.0, 40.0, 5.0, 2.0]
            .iter()
            .map(|q| tx("A", *q))
            .collect();
        let quantities: Vec<f64> = records.iter().map(|t| t.quantity).collect();
        let threshold = stats::mean(&quantities) + 2.0 * stats::std_dev_sample(&quantities);

        let (flagged, _) = OutlierDetector::default().detect_outliers(&records);

        for t in &flagged {
            assert_eq!(t.is_outlier(), t.quantity > threshold);
        }
    }

    #[test]
    fn test_sigma_comes_from_config() {
        let mut records: Vec<Transaction> = (0..5).map(|_| tx("A", 1.0)).collect();
        records.push(tx("A", 50.0));
        let config = TransformConfig {
            outlier_sigma: 3.0,
            ..TransformConfig::default()
        };

        let (_, outliers) = OutlierDetector::new(&config).detect_outliers(&records);

        assert!(outliers.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let detector = OutlierDetector::default();
        let (flagged, outliers) = detector.detect_outliers(&[]);
        assert!(flagged.is_empty() && outliers.is_empty());
        assert!(detector.try_detect_outliers(&[]).unwrap_err().is_empty_input());
    }
}
