use crate::parsing::naming::KeyDecodeError;
use chromiumoxide::error::CdpError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Browser error: {0}")]
    BrowserError(#[from] CdpError),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Report table not found in snapshot {}", .0.display())]
    CatalogEmpty(PathBuf),

    #[error("Could not resolve {url}: {reason}")]
    Resolution { url: String, reason: String },

    #[error("Download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("Filename decode error: {0}")]
    KeyDecode(#[from] KeyDecodeError),

    #[error("Cannot encode filename: {0}")]
    KeyEncode(String),

    #[error("Invalid stock code: {0:?}")]
    InvalidStockCode(String),

    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, HarvestError>;
