use futures_util::StreamExt;
use governor::{
    Quota, RateLimiter, clock::DefaultClock, middleware::NoOpMiddleware, state::InMemoryState,
    state::NotKeyed,
};
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderValue, USER_AGENT};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::config::HarvestConfig;
use super::dedup::PARTIAL_SUFFIX;
use super::error::{HarvestError, Result};
use super::traits::DownloadOperations;
use async_trait::async_trait;

type Governor = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Streams resolved documents to disk.
///
/// Every request carries the configured user agent and passes through a token
/// bucket limiter first. Bodies are written through a fixed-size buffer into
/// `<destination>.part`, and only a complete, flushed transfer is renamed into
/// place. Since the artifact directory is the download ledger, a truncated
/// file must never appear under its final name.
#[derive(Debug, Clone)]
pub struct DownloadManager {
    client: reqwest::Client,
    rate_limiter: Arc<Governor>,
    chunk_size: usize,
}

impl DownloadManager {
    /// Builds the HTTP client from the harvest configuration.
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::ConfigError` if the user agent is not a valid
    /// header value, the rate limit is zero, or the client cannot be built.
    pub fn new(config: &HarvestConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| HarvestError::ConfigError(format!("Invalid user agent: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.download_timeout)
            .read_timeout(config.download_timeout)
            .build()
            .map_err(|e| HarvestError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(
            NonZeroU32::new(config.rate_limit).ok_or_else(|| {
                HarvestError::ConfigError("Rate limit must be greater than zero".to_string())
            })?,
        )));

        Ok(Self {
            client,
            rate_limiter,
            chunk_size: config.chunk_size.max(1),
        })
    }

    /// Performs the GET and moves the finished body into place.
    ///
    /// # Errors
    ///
    /// * `HarvestError::Download` - Status other than 200, or fewer bytes than announced
    /// * `HarvestError::RequestError` - Connection, timeout or body stream failure
    /// * `HarvestError::FileError` - The partial file could not be written or renamed
    async fn fetch_to(&self, url: &str, destination: &Path) -> Result<u64> {
        self.rate_limiter.until_ready().await;

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(HarvestError::Download {
                url: url.to_string(),
                reason: format!("server returned status {}", status),
            });
        }

        let expected = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        match expected {
            Some(len) => tracing::info!("Connected, size {:.2} KB", len as f64 / 1024.0),
            None => tracing::info!("Connected, size unknown"),
        }

        let partial = partial_path(destination);
        let written = match self.write_body(response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                discard(&partial).await;
                return Err(e);
            }
        };

        if let Some(len) = expected {
            if written != len {
                discard(&partial).await;
                return Err(HarvestError::Download {
                    url: url.to_string(),
                    reason: format!("partial transfer: wrote {} of {} bytes", written, len),
                });
            }
        }

        if let Err(e) = tokio::fs::rename(&partial, destination).await {
            discard(&partial).await;
            return Err(e.into());
        }

        Ok(written)
    }

    async fn write_body(&self, response: reqwest::Response, partial: &Path) -> Result<u64> {
        let file = tokio::fs::File::create(partial).await?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        Ok(written)
    }
}

#[async_trait]
impl DownloadOperations for DownloadManager {
    /// Downloads `url` to `destination`, creating the parent directory first.
    ///
    /// Failures of the transfer itself are logged and reported as `Ok(false)`;
    /// there is no retry here. Only a parent directory that cannot be created
    /// surfaces as `Err`.
    async fn download(&self, url: &str, destination: &Path) -> Result<bool> {
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
                tracing::info!("Created directory {}", parent.display());
            }
        }

        tracing::info!("Downloading {}", url);
        match self.fetch_to(url, destination).await {
            Ok(written) => {
                tracing::info!("Saved {} bytes to {}", written, destination.display());
                Ok(true)
            }
            Err(e) => {
                tracing::warn!("Download failed for {}: {}", url, e);
                Ok(false)
            }
        }
    }
}

/// `<destination>.part`, the in-flight name of a file being written.
pub(crate) fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    destination.with_file_name(name)
}

async fn discard(partial: &Path) {
    if let Err(e) = tokio::fs::remove_file(partial).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Could not remove {}: {}", partial.display(), e);
        }
    }
}
