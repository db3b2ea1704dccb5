//! Trait definitions for the network-facing stages of a harvest.
//!
//! Each stage that talks to the outside world (rendering a finance page,
//! following a redirect in a browser, streaming a document to disk) is a
//! trait with one production implementation. The `Harvester` is generic over
//! all three, which keeps the orchestration logic testable without a browser
//! or network.
//!
//! All three follow the same convention: an expected failure of the remote
//! side (timeout, missing element, bad status) is logged and reported through
//! the `Ok` value, while `Err` is reserved for faults the caller did not
//! anticipate, such as a browser that fails to launch.

use super::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Saves the rendered report table of a finance page.
#[async_trait]
pub trait SnapshotOperations {
    /// Renders `page_url` and writes the report frame's markup to `output`.
    ///
    /// Returns `Ok(false)` without writing anything when the page, frame or
    /// table did not appear in time.
    async fn fetch_snapshot(&self, page_url: &str, output: &Path) -> Result<bool>;
}

/// Follows a redirect link to the document it ends up at.
#[async_trait]
pub trait ResolveOperations {
    /// Returns the final address, or `Ok(None)` if navigation failed or timed out.
    async fn resolve(&self, redirect_url: &str) -> Result<Option<String>>;
}

/// Streams a document to disk.
#[async_trait]
pub trait DownloadOperations {
    /// Returns `Ok(false)` on a non-success status or transport fault.
    async fn download(&self, url: &str, destination: &Path) -> Result<bool>;
}
