use crate::model::StockCode;
use serde::{Deserialize, Deserializer, de::Error};

/// Deserializes a raw, possibly unpadded code into a `StockCode`
pub fn deserialize_stock_code<'de, D>(deserializer: D) -> Result<StockCode, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    StockCode::parse(&s).map_err(Error::custom)
}
