use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a harvest run
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// User agent string presented by both the browser and the HTTP client
    pub user_agent: String,
    /// Finance page URL with a `{code}` placeholder for the zero-padded stock code
    pub finance_page_template: String,
    /// Name of the embedded frame holding the report table
    pub frame_name: String,
    /// CSS selector of the report table inside the frame
    pub table_selector: String,
    /// Upper bound for a page navigation
    pub navigation_timeout: Duration,
    /// Upper bound for the report frame to appear
    pub frame_timeout: Duration,
    /// Upper bound for the report table to become visible
    pub table_timeout: Duration,
    /// Connect and read timeout for document downloads
    pub download_timeout: Duration,
    /// Interval between frame/table visibility checks
    pub poll_interval: Duration,
    /// Randomized delay range imposed before each browser visit
    pub request_delay: (Duration, Duration),
    /// Fixed pause after a report fails unexpectedly
    pub cooldown: Duration,
    /// Download rate limit in requests per second
    pub rate_limit: u32,
    /// Size of the buffered writer used for streamed downloads
    pub chunk_size: usize,
    /// Viewport of the throwaway resolver browser
    pub resolver_viewport: (u32, u32),
    /// Whether the resolver browser runs without a window
    pub resolver_headless: bool,
    /// Whether the snapshot browser runs without a window
    pub snapshot_headless: bool,
    /// Maximum number of snapshot-only passes in `Harvester::fetch_snapshots`
    pub snapshot_passes: usize,
    /// Filesystem locations
    pub paths: HarvestPaths,
}

/// Filesystem locations read and written by a run
#[derive(Debug, Clone)]
pub struct HarvestPaths {
    /// Directory of rendered finance-page snapshots
    pub snapshot_dir: PathBuf,
    /// Directory of downloaded report artifacts
    pub report_dir: PathBuf,
    /// Append-only structured error log
    pub error_log: PathBuf,
    /// Constituent tables with `stock_code` and `short_name` columns
    pub constituent_files: Vec<PathBuf>,
}

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            finance_page_template: "https://stockpage.10jqka.com.cn/{code}/finance/".to_string(),
            frame_name: "dataifm".to_string(),
            table_selector: "table.finance-report-table".to_string(),
            navigation_timeout: Duration::from_secs(60),
            frame_timeout: Duration::from_secs(20),
            table_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(250),
            request_delay: (Duration::from_secs(1), Duration::from_secs(2)),
            cooldown: Duration::from_secs(20),
            rate_limit: 1,
            chunk_size: 8192,
            resolver_viewport: (64, 36),
            resolver_headless: false,
            snapshot_headless: true,
            snapshot_passes: 1,
            paths: HarvestPaths::default(),
        }
    }
}

impl Default for HarvestPaths {
    fn default() -> Self {
        Self {
            snapshot_dir: PathBuf::from("html"),
            report_dir: PathBuf::from("reports"),
            error_log: PathBuf::from("error_log.txt"),
            constituent_files: vec![PathBuf::from("000905.csv"), PathBuf::from("000300.csv")],
        }
    }
}

impl HarvestPaths {
    /// Rebases every default location under `root`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let defaults = Self::default();
        Self {
            snapshot_dir: root.join(defaults.snapshot_dir),
            report_dir: root.join(defaults.report_dir),
            error_log: root.join(defaults.error_log),
            constituent_files: defaults
                .constituent_files
                .into_iter()
                .map(|file| root.join(file))
                .collect(),
        }
    }
}

impl HarvestConfig {
    /// Default configuration with every path rebased under `root`.
    ///
    /// # Basic usage
    ///
    /// ```rust
    /// use reportkit::HarvestConfig;
    /// let config = HarvestConfig::with_root("/tmp/harvest");
    /// assert!(config.paths.report_dir.ends_with("reports"));
    /// ```
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            paths: HarvestPaths::under(root),
            ..Self::default()
        }
    }

    /// Builds the finance page URL for a zero-padded stock code.
    pub fn finance_page_url(&self, code: &str) -> String {
        self.finance_page_template.replace("{code}", code)
    }
}
