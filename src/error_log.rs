use crate::error::Result;
use crate::model::{ReportRecord, StockIdentity};
use chrono::Local;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One failed report, as written to the error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    pub timestamp: String,
    pub code: String,
    pub name: String,
    pub year: String,
    pub quarter: String,
    pub error: String,
}

impl ErrorEntry {
    pub fn new(stock: &StockIdentity, record: &ReportRecord, error: impl ToString) -> Self {
        Self {
            timestamp: Local::now().to_rfc3339(),
            code: stock.code.to_string(),
            name: stock.name.clone(),
            year: record.year.clone(),
            quarter: record.quarter.clone(),
            error: error.to_string(),
        }
    }
}

/// Append-only JSON-lines log of reports that failed unexpectedly.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &ErrorEntry) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}
