//! # ReportKit - financial report harvester
//!
//! ReportKit collects the periodic financial reports (annual, semi-annual and
//! quarterly PDFs) of listed companies from their finance pages.
//!
//! ## Pipeline
//!
//! - **Snapshots** - The finance page is rendered in a browser and the report
//!   table frame is saved to disk, once per stock
//! - **Catalog parsing** - Each snapshot yields the year/period of every report
//!   and the redirect link pointing at it
//! - **Resolution** - Redirect links are followed in a throwaway browser to
//!   find the final document address
//! - **Download** - PDFs are streamed to disk under a name that encodes the
//!   stock and period
//! - **Dedup** - Files already in the report directory are never fetched again,
//!   keyed on code, year and period only
//!
//! ## Requirements
//!
//! ReportKit is async and runs on [tokio](https://tokio.rs). Snapshot and
//! resolve stages drive a local Chrome/Chromium through the DevTools protocol.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use reportkit::{HarvestConfig, Harvester, parsing::constituents::load_constituents};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HarvestConfig::default();
//!     let stocks = load_constituents(&config.paths.constituent_files)?;
//!
//!     let mut harvester = Harvester::from_config(config)?;
//!     let summary = harvester.run(&stocks).await;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```

mod browser;
mod config;
mod dedup;
mod download;
mod error;
mod error_log;
mod harvester;
pub mod logging;
mod model;
pub mod parsing;
mod resolver;
mod snapshot;
mod traits;

pub use config::{DEFAULT_USER_AGENT, HarvestConfig, HarvestPaths};
pub use dedup::{DedupLoad, DedupRepository, PARTIAL_SUFFIX};
pub use download::DownloadManager;
pub use error::{HarvestError, Result};
pub use error_log::{ErrorEntry, ErrorLog};
pub use harvester::{Harvester, ReportOutcome, RunSummary, SnapshotState, SnapshotSummary};
pub use model::{ReportKey, ReportRecord, StockCode, StockIdentity};
pub use resolver::{UrlResolver, points_to_pdf};
pub use snapshot::SnapshotFetcher;
pub use traits::{DownloadOperations, ResolveOperations, SnapshotOperations};

/// Current crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
