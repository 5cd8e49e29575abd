//! Extraction: stage the raw seed dataset as a string-typed CSV and read it
//! back as [`RawTransaction`]s.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;

use csv::StringRecord;
use tracing::{error, info, instrument};

use crate::constants::{COL_CATEGORY, COL_DATE, COL_PRICE, COL_PRODUCT, COL_QUANTITY, RAW_COLUMNS};
use crate::domain::RawTransaction;
use crate::error::{Result, SalesEtlError};
use crate::observability::metrics;

/// Read the JSON seed: an array of objects whose values may be strings,
/// numbers or nulls.
pub fn load_seed<P: AsRef<Path>>(path: P) -> Result<Vec<RawTransaction>> {
    let content = fs::read_to_string(path.as_ref())?;
    let records: Vec<RawTransaction> = serde_json::from_str(&content)?;
    Ok(records)
}

/// Write raw records to the staging CSV. Missing values become empty cells.
pub fn write_staging_csv<P: AsRef<Path>>(records: &[RawTransaction], path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(RAW_COLUMNS)?;
    for record in records {
        writer.write_record([
            record.date.as_deref().unwrap_or_default(),
            record.product.as_deref().unwrap_or_default(),
            record.category.as_deref().unwrap_or_default(),
            record.quantity.as_deref().unwrap_or_default(),
            record.price.as_deref().unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read the staging CSV. Columns are located by header name; empty cells
/// are read as missing values.
pub fn read_staging_csv<P: AsRef<Path>>(path: P) -> Result<Vec<RawTransaction>> {
    let file = File::open(path.as_ref())?;
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);

    let headers = reader.headers()?.clone();
    let header_map = build_header_map(&headers);
    for column in RAW_COLUMNS {
        if !header_map.contains_key(column) {
            return Err(SalesEtlError::MissingField(column.to_string()));
        }
    }

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result?;
        let cell = |column: &str| -> Option<String> {
            header_map
                .get(column)
                .and_then(|idx| row.get(*idx))
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        records.push(RawTransaction {
            date: cell(COL_DATE),
            product: cell(COL_PRODUCT),
            category: cell(COL_CATEGORY),
            quantity: cell(COL_QUANTITY),
            price: cell(COL_PRICE),
        });
    }
    Ok(records)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().to_lowercase(), idx))
        .collect()
}

/// Stage the seed dataset as CSV. Failures are logged, not propagated; a
/// missing staging file surfaces when it is read.
#[instrument(skip_all, fields(seed = %seed_path.as_ref().display()))]
pub fn extract_data<P: AsRef<Path>, Q: AsRef<Path>>(seed_path: P, csv_path: Q) -> usize {
    let staged = load_seed(&seed_path).and_then(|records| {
        write_staging_csv(&records, &csv_path)?;
        Ok(records.len())
    });
    match staged {
        Ok(count) => {
            metrics::extract::records_staged(count);
            info!(records = count, csv = %csv_path.as_ref().display(), "Staged raw sales data");
            count
        }
        Err(e) => {
            error!("Error extracting data: {}", e);
            0
        }
    }
}
