//! Parsers for the files a harvest run reads: finance-page snapshots,
//! constituent tables, and the artifact/snapshot filename grammar.

pub mod catalog;
pub mod constituents;
pub mod naming;
mod utils;
