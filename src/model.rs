use crate::error::{HarvestError, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// A six-digit, zero-padded exchange stock code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StockCode(String);

impl StockCode {
    pub const LEN: usize = 6;

    /// Normalizes a raw code into its six-digit form.
    ///
    /// Spreadsheet exports drop leading zeros and sometimes render integers
    /// as floats, so `"1"`, `" 1 "` and `"1.0"` all become `"000001"`.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);

        if digits.is_empty()
            || digits.len() > Self::LEN
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(HarvestError::InvalidStockCode(raw.to_string()));
        }

        Ok(Self(format!("{:0>6}", digits)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for StockCode {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for StockCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StockCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A listed stock: its stable code and its current display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockIdentity {
    pub code: StockCode,
    pub name: String,
}

impl StockIdentity {
    pub fn new(code: StockCode, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
        }
    }
}

impl fmt::Display for StockIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.code)
    }
}

/// One cell of the finance-report table that links to a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRecord {
    pub year: String,
    pub quarter: String,
    pub redirect_url: String,
}

impl ReportRecord {
    pub fn key(&self, code: &StockCode) -> ReportKey {
        ReportKey {
            code: code.clone(),
            year: self.year.clone(),
            quarter: self.quarter.clone(),
        }
    }
}

/// Identity of a filing independent of the company's display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReportKey {
    pub code: StockCode,
    pub year: String,
    pub quarter: String,
}

impl ReportKey {
    pub fn new(code: StockCode, year: impl Into<String>, quarter: impl Into<String>) -> Self {
        Self {
            code,
            year: year.into(),
            quarter: quarter.into(),
        }
    }
}

impl fmt::Display for ReportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.code, self.year, self.quarter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_code_padding() {
        assert_eq!(StockCode::parse("1").unwrap().as_str(), "000001");
        assert_eq!(StockCode::parse(" 600754 ").unwrap().as_str(), "600754");
        assert_eq!(StockCode::parse("2594.0").unwrap().as_str(), "002594");
    }

    #[test]
    fn test_stock_code_rejects_garbage() {
        for raw in ["", "abc", "1234567", "12a4", "-1"] {
            assert!(
                matches!(StockCode::parse(raw), Err(HarvestError::InvalidStockCode(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_key_ignores_name() {
        let code = StockCode::parse("600754").unwrap();
        let record = ReportRecord {
            year: "2024".to_string(),
            quarter: "Q1".to_string(),
            redirect_url: "https://example.com/r.shtml".to_string(),
        };
        assert_eq!(record.key(&code), ReportKey::new(code, "2024", "Q1"));
    }
}
