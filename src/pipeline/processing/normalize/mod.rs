use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{debug, info, info_span, warn, Span};

use super::{contain, stats, Stage, TransformError};
use crate::config::TransformConfig;
use crate::domain::{RawTransaction, Transaction};
use crate::observability::metrics;

/// Date layouts accepted for the `date` column, tried in order.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Cleans raw records and derives `total_sales`, `day_of_week` and `high_volume`.
///
/// Missing-value policy:
/// - a missing or unparseable quantity becomes 0
/// - a missing or unparseable price becomes the median of the valid prices in
///   the same category, computed over the whole batch before any filling
/// - a record whose price cannot be filled (its category has no valid price)
///   is dropped
pub struct RecordNormalizer {
    high_volume_threshold: f64,
    span: Span,
}

impl Default for RecordNormalizer {
    fn default() -> Self {
        Self::new(&TransformConfig::default())
    }
}

/// Field values of one raw record after parsing, before imputation.
struct ParsedRecord<'a> {
    index: usize,
    date: NaiveDate,
    product: &'a str,
    category: &'a str,
    quantity: Option<f64>,
    price: Option<f64>,
}

impl RecordNormalizer {
    pub fn new(config: &TransformConfig) -> Self {
        Self {
            high_volume_threshold: config.high_volume_threshold,
            span: info_span!("normalize"),
        }
    }

    /// Emit this stage's log events inside `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Normalize a batch. Failures are logged and yield an empty batch.
    pub fn normalize(&self, records: &[RawTransaction]) -> Vec<Transaction> {
        contain(&self.span, self.try_normalize(records))
    }

    /// Normalize a batch, reporting empty input and parse failures as errors.
    pub fn try_normalize(&self, records: &[RawTransaction]) -> Result<Vec<Transaction>, TransformError> {
        let _enter = self.span.enter();

        if records.is_empty() {
            return Err(TransformError::EmptyInput { stage: Stage::Normalize });
        }

        let parsed = records
            .iter()
            .enumerate()
            .map(|(index, raw)| parse_record(index, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let medians = category_median_prices(&parsed);

        let mut normalized = Vec::with_capacity(parsed.len());
        let mut quantities_imputed = 0usize;
        let mut prices_imputed = 0usize;
        let mut dropped = 0usize;

        for record in parsed {
            let price = match record.price {
                Some(price) => price,
                None => match medians.get(record.category) {
                    Some(median) => {
                        prices_imputed += 1;
                        *median
                    }
                    None => {
                        debug!(
                            record = record.index,
                            category = record.category,
                            quantity_missing = record.quantity.is_none(),
                            "Dropping record: category has no valid price to impute from"
                        );
                        dropped += 1;
                        continue;
                    }
                },
            };

            let quantity = record.quantity.unwrap_or_else(|| {
                quantities_imputed += 1;
                0.0
            });

            let date = record.date;
            normalized.push(Transaction {
                date,
                product: record.product.to_string(),
                category: record.category.to_string(),
                quantity,
                price,
                total_sales: quantity * price,
                day_of_week: date.format("%A").to_string(),
                high_volume: quantity > self.high_volume_threshold,
                outlier: None,
            });
        }

        if dropped > 0 {
            warn!(dropped, "Dropped records with neither a usable price nor a category median");
        }

        metrics::normalize::batch_processed(records.len(), normalized.len());
        metrics::normalize::records_dropped(dropped);
        metrics::normalize::quantities_imputed(quantities_imputed);
        metrics::normalize::prices_imputed(prices_imputed);

        info!(
            records_in = records.len(),
            records_out = normalized.len(),
            quantities_imputed,
            prices_imputed,
            dropped,
            "Normalized batch"
        );

        Ok(normalized)
    }
}

fn parse_record(index: usize, raw: &RawTransaction) -> Result<ParsedRecord<'_>, TransformError> {
    let category = raw.category.as_deref().ok_or_else(|| {
        TransformError::computation(
            Stage::Normalize,
            format!("record {}: missing required field 'category'", index),
        )
    })?;
    let raw_date = raw.date.as_deref().ok_or_else(|| {
        TransformError::computation(
            Stage::Normalize,
            format!("record {}: missing required field 'date'", index),
        )
    })?;
    let date = parse_date(raw_date).ok_or_else(|| {
        TransformError::computation(
            Stage::Normalize,
            format!("record {}: unparseable date '{}'", index, raw_date),
        )
    })?;

    Ok(ParsedRecord {
        index,
        date,
        product: raw.product.as_deref().unwrap_or_default(),
        category,
        quantity: parse_number(raw.quantity.as_deref()),
        price: parse_number(raw.price.as_deref()),
    })
}

/// Parse a numeric cell. Blank, non-numeric and non-finite values are invalid.
pub fn parse_number(value: Option<&str>) -> Option<f64> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Parse a calendar date, accepting a few common layouts and full timestamps.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}

/// Median of the originally valid prices, per category.
fn category_median_prices<'a>(records: &[ParsedRecord<'a>]) -> HashMap<&'a str, f64> {
    let mut prices: HashMap<&'a str, Vec<f64>> = HashMap::new();
    for record in records {
        if let Some(price) = record.price {
            prices.entry(record.category).or_default().push(price);
        }
    }
    prices
        .into_iter()
        .filter_map(|(category, values)| stats::median(&values).map(|m| (category, m)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn raw(date: &str, category: &str, quantity: Option<&str>, price: Option<&str>) -> RawTransaction {
        RawTransaction::new(date, "Widget", category, quantity, price)
    }

    #[test]
    fn test_missing_quantity_becomes_zero() {
        let records = vec![
            raw("2024-01-01", "A", Some("5"), Some("10")),
            raw("2024-01-01", "A", None, Some("10")),
        ];

        let normalized = RecordNormalizer::default().normalize(&records);

        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[1].quantity, 0.0);
        assert_eq!(normalized[0].total_sales, 50.0);
        assert_eq!(normalized[1].total_sales, 0.0);
    }

    #[test]
    fn test_invalid_price_takes_category_median() {
        let records = vec![
            raw("2024-01-01", "A", Some("1"), Some("10")),
            raw("2024-01-02", "A", Some("1"), Some("20")),
            raw("2024-01-03", "A", Some("1"), Some("not_a_number")),
            raw("2024-01-03", "B", Some("1"), Some("99")),
        ];

        let normalized = RecordNormalizer::default().normalize(&records);

        assert_eq!(normalized.len(), 4);
        assert_eq!(normalized[2].price, 15.0);
        assert_eq!(normalized[2].total_sales, 15.0);
        // other categories do not contribute to A's median
        assert_eq!(normalized[3].price, 99.0);
    }

    #[test]
    fn test_category_without_valid_price_is_dropped() {
        let records = vec![
            raw("2024-01-01", "A", Some("2"), Some("10")),
            raw("2024-01-01", "B", None, None),
            raw("2024-01-02", "B", None, Some("not_a_number")),
        ];

        let normalized = RecordNormalizer::default().normalize(&records);

        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].category, "A");
    }

    #[test]
    fn test_valid_quantity_does_not_save_unpriceable_record() {
        let records = vec![
            raw("2024-01-01", "Furniture", Some("1"), Some("250")),
            raw("2024-01-06", "Decor", Some("3"), Some("not_a_number")),
        ];

        let normalized = RecordNormalizer::default().normalize(&records);

        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].category, "Furniture");
        assert!(normalized.iter().all(|t| t.price.is_finite()));
    }

    #[test]
    fn test_derived_columns() {
        let records = vec![
            raw("2024-01-01", "A", Some("11"), Some("2.5")),
            raw("2024-01-06", "A", Some("10"), Some("2.5")),
        ];

        let normalized = RecordNormalizer::default().normalize(&records);

        assert_eq!(normalized[0].day_of_week, "Monday");
        assert_eq!(normalized[1].day_of_week, "Saturday");
        assert!(normalized[0].high_volume);
        // strictly greater than 10
        assert!(!normalized[1].high_volume);
        assert_eq!(normalized[0].total_sales, 27.5);
        assert!(normalized.iter().all(|t| t.outlier.is_none()));
    }

    #[test]
    fn test_unparseable_quantity_is_treated_as_missing() {
        let records = vec![raw("2024-01-01", "A", Some("lots"), Some("3"))];

        let normalized = RecordNormalizer::default().normalize(&records);

        assert_eq!(normalized[0].quantity, 0.0);
        assert_eq!(normalized[0].total_sales, 0.0);
    }

    #[test]
    fn test_empty_input_returns_empty() {
        let normalizer = RecordNormalizer::default();
        assert!(normalizer.normalize(&[]).is_empty());
        assert_eq!(
            normalizer.try_normalize(&[]),
            Err(TransformError::EmptyInput { stage: Stage::Normalize })
        );
    }

    #[test]
    fn test_unparseable_date_fails_whole_batch() {
        let records = vec![
            raw("2024-01-01", "A", Some("1"), Some("10")),
            raw("yesterday", "A", Some("1"), Some("10")),
        ];
        let normalizer = RecordNormalizer::default();

        assert!(normalizer.normalize(&records).is_empty());
        match normalizer.try_normalize(&records) {
            Err(TransformError::ComputationFailure { stage, message }) => {
                assert_eq!(stage, Stage::Normalize);
                assert!(message.contains("yesterday"));
            }
            other => panic!("expected computation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_date_on_dropped_record_still_fails() {
        let records = vec![
            raw("2024-01-01", "A", Some("1"), Some("10")),
            raw("13/45/2024", "B", Some("1"), None),
        ];

        assert!(RecordNormalizer::default().try_normalize(&records).is_err());
    }

    #[test]
    fn test_missing_category_is_a_computation_failure() {
        let mut record = raw("2024-01-01", "A", Some("1"), Some("10"));
        record.category = None;

        let err = RecordNormalizer::default().try_normalize(&[record]).unwrap_err();

        assert!(err.to_string().contains("category"));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let records = vec![
            raw("2024-01-01", "A", Some("5"), Some("10")),
            raw("2024-01-02", "A", None, Some("not_a_number")),
            raw("2024-01-02", "A", Some("3"), Some("20.25")),
            raw("2024-01-03", "B", Some("12"), Some("0.1")),
        ];
        let normalizer = RecordNormalizer::default();

        let once = normalizer.normalize(&records);
        let again: Vec<RawTransaction> = once.iter().map(RawTransaction::from).collect();
        let twice = normalizer.normalize(&again);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_parse_date_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9);
        assert_eq!(parse_date("2024-03-09"), expected);
        assert_eq!(parse_date("2024/03/09"), expected);
        assert_eq!(parse_date("03/09/2024"), expected);
        assert_eq!(parse_date(" 2024-03-09 "), expected);
        assert_eq!(parse_date("2024-03-09 17:45:00"), expected);
        assert_eq!(parse_date("2024-03-09T17:45:00Z"), expected);
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(Some("10")), Some(10.0));
        assert_eq!(parse_number(Some(" 2.5 ")), Some(2.5));
        assert_eq!(parse_number(Some("not_a_number")), None);
        assert_eq!(parse_number(Some("")), None);
        assert_eq!(parse_number(Some("NaN")), None);
        assert_eq!(parse_number(None), None);
    }
}
