//! Filename codec for report artifacts and page snapshots.
//!
//! The artifact directory doubles as the download ledger, so filenames are the
//! only place a report's identity is persisted. Both directions go through this
//! module; nothing else splits or formats these names.
//!
//! ```text
//! artifact  = code "_" name "_" year "_" quarter ".pdf"
//! snapshot  = name "(" code ")" ".html"
//! code      = 6DIGIT
//! name      = 1*CHAR                 ; may contain "_" and "(", no path separator
//! year      = 1*(CHAR except "_")
//! quarter   = 1*(CHAR except "_")
//! ```
//!
//! Artifact decoding takes `code` from the left of the first `_` and
//! `year`/`quarter` from the right, which leaves the name free to contain
//! underscores.

use crate::error::{HarvestError, Result};
use crate::model::{ReportKey, StockCode, StockIdentity};
use thiserror::Error;

pub const ARTIFACT_EXTENSION: &str = ".pdf";
pub const SNAPSHOT_EXTENSION: &str = ".html";

/// Why a filename could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{file_name:?}: {reason}")]
pub struct KeyDecodeError {
    pub file_name: String,
    pub reason: String,
}

impl KeyDecodeError {
    fn new(file_name: &str, reason: impl Into<String>) -> Self {
        Self {
            file_name: file_name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Decoded form of a report artifact filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub code: StockCode,
    pub name: String,
    pub year: String,
    pub quarter: String,
}

impl ArtifactName {
    pub fn new(stock: &StockIdentity, year: &str, quarter: &str) -> Self {
        Self {
            code: stock.code.clone(),
            name: stock.name.clone(),
            year: year.to_string(),
            quarter: quarter.to_string(),
        }
    }

    /// The dedup key, without the display name.
    pub fn key(&self) -> ReportKey {
        ReportKey::new(self.code.clone(), self.year.clone(), self.quarter.clone())
    }

    /// Formats the artifact filename, e.g. `600754_ABC Co_2024_Q1.pdf`.
    ///
    /// Path separators in the name are replaced with `-`. Empty fields and
    /// underscores in `year` or `quarter` are rejected because they would not
    /// survive a round trip.
    pub fn encode(&self) -> Result<String> {
        let name = sanitize_name(&self.name);
        if name.is_empty() {
            return Err(HarvestError::KeyEncode("empty stock name".to_string()));
        }
        for (label, value) in [("year", &self.year), ("quarter", &self.quarter)] {
            if value.is_empty() {
                return Err(HarvestError::KeyEncode(format!("empty {label}")));
            }
            if value.contains('_') || value.contains(['/', '\\']) {
                return Err(HarvestError::KeyEncode(format!(
                    "{label} {value:?} contains a reserved character"
                )));
            }
        }

        Ok(format!(
            "{}_{}_{}_{}{}",
            self.code, name, self.year, self.quarter, ARTIFACT_EXTENSION
        ))
    }

    pub fn decode(file_name: &str) -> std::result::Result<Self, KeyDecodeError> {
        let stem = file_name
            .strip_suffix(ARTIFACT_EXTENSION)
            .ok_or_else(|| KeyDecodeError::new(file_name, "missing .pdf extension"))?;

        let (code, rest) = stem
            .split_once('_')
            .ok_or_else(|| KeyDecodeError::new(file_name, "expected 4 '_'-separated fields"))?;

        let mut tail = rest.rsplitn(3, '_');
        let (Some(quarter), Some(year), Some(name)) = (tail.next(), tail.next(), tail.next())
        else {
            return Err(KeyDecodeError::new(
                file_name,
                "expected 4 '_'-separated fields",
            ));
        };

        if name.is_empty() || year.is_empty() || quarter.is_empty() {
            return Err(KeyDecodeError::new(file_name, "empty field"));
        }

        Ok(Self {
            code: decode_code(file_name, code)?,
            name: name.to_string(),
            year: year.to_string(),
            quarter: quarter.to_string(),
        })
    }
}

/// Formats the snapshot filename for a stock, e.g. `ABC Co(600754).html`.
pub fn encode_snapshot(stock: &StockIdentity) -> Result<String> {
    let name = sanitize_name(&stock.name);
    if name.is_empty() {
        return Err(HarvestError::KeyEncode("empty stock name".to_string()));
    }
    Ok(format!("{}({}){}", name, stock.code, SNAPSHOT_EXTENSION))
}

/// Recovers the stock identity from a snapshot filename.
pub fn decode_snapshot(file_name: &str) -> std::result::Result<StockIdentity, KeyDecodeError> {
    let stem = file_name
        .strip_suffix(SNAPSHOT_EXTENSION)
        .ok_or_else(|| KeyDecodeError::new(file_name, "missing .html extension"))?;

    let inner = stem
        .strip_suffix(')')
        .ok_or_else(|| KeyDecodeError::new(file_name, "expected name(code)"))?;
    let (name, code) = inner
        .rsplit_once('(')
        .ok_or_else(|| KeyDecodeError::new(file_name, "expected name(code)"))?;

    if name.is_empty() {
        return Err(KeyDecodeError::new(file_name, "empty field"));
    }

    Ok(StockIdentity::new(decode_code(file_name, code)?, name))
}

fn decode_code(file_name: &str, code: &str) -> std::result::Result<StockCode, KeyDecodeError> {
    if code.len() != StockCode::LEN {
        return Err(KeyDecodeError::new(
            file_name,
            format!("code {code:?} is not 6 digits"),
        ));
    }
    StockCode::parse(code)
        .map_err(|_| KeyDecodeError::new(file_name, format!("code {code:?} is not 6 digits")))
}

fn sanitize_name(name: &str) -> String {
    name.trim().replace(['/', '\\'], "-")
}
