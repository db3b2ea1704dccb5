use super::utils::deserialize_stock_code;
use crate::Result;
use crate::model::{StockCode, StockIdentity};
use serde::Deserialize;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

/// One row of an index-constituent table.
///
/// Only the two columns below are read; any others (such as the unnamed
/// index column a dataframe export prepends) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ConstituentRow {
    #[serde(deserialize_with = "deserialize_stock_code")]
    pub stock_code: StockCode,
    pub short_name: String,
}

impl From<ConstituentRow> for StockIdentity {
    fn from(row: ConstituentRow) -> Self {
        StockIdentity::new(row.stock_code, row.short_name.trim())
    }
}

/// Reads constituent rows from any CSV source with a header line.
///
/// Rows that fail to deserialize (bad code, missing column) are logged and
/// skipped so one malformed line does not hide the rest of the table.
pub fn read_constituents<R: Read>(reader: R) -> Result<Vec<StockIdentity>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut stocks = Vec::new();

    for (line, row) in csv_reader.deserialize::<ConstituentRow>().enumerate() {
        match row {
            Ok(row) => stocks.push(row.into()),
            Err(e) => tracing::warn!("Skipping constituent row {}: {}", line + 1, e),
        }
    }

    Ok(stocks)
}

/// Loads and merges several constituent tables.
///
/// Missing files are skipped with a warning. Stocks are de-duplicated by code,
/// keeping the first occurrence and the original order.
pub fn load_constituents<P: AsRef<Path>>(files: &[P]) -> Result<Vec<StockIdentity>> {
    let mut seen = HashSet::new();
    let mut stocks = Vec::new();

    for file in files {
        let file = file.as_ref();
        if !file.exists() {
            tracing::warn!("Constituent table {} not found, skipping", file.display());
            continue;
        }

        let rows = read_constituents(std::fs::File::open(file)?)?;
        tracing::info!("Loaded {} constituents from {}", rows.len(), file.display());

        for stock in rows {
            if seen.insert(stock.code.clone()) {
                stocks.push(stock);
            }
        }
    }

    Ok(stocks)
}
