use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;

use super::config::HarvestConfig;
use super::dedup::DedupRepository;
use super::download::DownloadManager;
use super::error::{HarvestError, Result};
use super::error_log::{ErrorEntry, ErrorLog};
use super::model::{ReportRecord, StockIdentity};
use super::parsing::catalog::{CatalogConfig, CatalogParser};
use super::parsing::naming::{self, ArtifactName, SNAPSHOT_EXTENSION};
use super::resolver::{UrlResolver, points_to_pdf};
use super::snapshot::SnapshotFetcher;
use super::traits::{DownloadOperations, ResolveOperations, SnapshotOperations};

/// Where a stock's snapshot stands after the snapshot stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotState {
    /// Already on disk from an earlier run
    Existing(PathBuf),
    /// Rendered and saved by this call
    Fetched(PathBuf),
    /// Rendering failed; nothing was written
    Missing,
}

impl SnapshotState {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            SnapshotState::Existing(path) | SnapshotState::Fetched(path) => Some(path),
            SnapshotState::Missing => None,
        }
    }
}

/// Terminal state of one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    Downloaded(PathBuf),
    AlreadyPresent,
    /// Resolution ended somewhere other than a PDF
    NotPdf(String),
    Unresolved,
    DownloadFailed,
}

/// Counters for a harvest run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub stocks: usize,
    pub stocks_aborted: usize,
    pub snapshots_fetched: usize,
    pub downloaded: usize,
    pub already_present: usize,
    pub not_pdf: usize,
    pub unresolved: usize,
    pub download_failed: usize,
    pub errored: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &ReportOutcome) {
        match outcome {
            ReportOutcome::Downloaded(_) => self.downloaded += 1,
            ReportOutcome::AlreadyPresent => self.already_present += 1,
            ReportOutcome::NotPdf(_) => self.not_pdf += 1,
            ReportOutcome::Unresolved => self.unresolved += 1,
            ReportOutcome::DownloadFailed => self.download_failed += 1,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stocks ({} aborted, {} snapshots fetched); reports: {} downloaded, {} already present, {} not pdf, {} unresolved, {} download failures, {} errors",
            self.stocks,
            self.stocks_aborted,
            self.snapshots_fetched,
            self.downloaded,
            self.already_present,
            self.not_pdf,
            self.unresolved,
            self.download_failed,
            self.errored
        )
    }
}

/// Counters for a snapshot-only pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub passes: usize,
    pub fetched: usize,
    /// Stocks still without a snapshot after the last pass
    pub missing: usize,
}

/// Runs the harvest pipeline over a list of stocks.
///
/// Processing is strictly sequential. For each stock the harvester makes
/// sure a snapshot exists, parses its report catalog, and then walks the
/// reports one at a time:
///
/// ```text
/// Pending ─► SnapshotReady ─► CatalogParsed ─► per report:
///                                   already present? ─► Skipped
///                                   delay ─► resolve ─► None        ─► Skipped
///                                                   ─► non-PDF URL ─► Skipped
///                                                   ─► PDF URL ─► download ─► Done | Failed
/// ```
///
/// Failures are contained at the smallest enclosing unit. A stock whose
/// snapshot or catalog is unusable is abandoned and the next stock starts.
/// An unexpected error on a report is written to the error log, followed by
/// a cooldown, and the next report starts. Nothing short of a failed
/// artifact-directory scan at construction stops a run.
pub struct Harvester<S, R, D> {
    config: HarvestConfig,
    snapshots: S,
    resolver: R,
    downloader: D,
    parser: CatalogParser,
    repository: DedupRepository,
    error_log: ErrorLog,
}

impl Harvester<SnapshotFetcher, UrlResolver, DownloadManager> {
    /// Builds a harvester backed by a real browser and HTTP client.
    pub fn from_config(config: HarvestConfig) -> Result<Self> {
        let snapshots = SnapshotFetcher::new(&config);
        let resolver = UrlResolver::new(&config);
        let downloader = DownloadManager::new(&config)?;
        Self::new(config, snapshots, resolver, downloader)
    }
}

impl<S, R, D> Harvester<S, R, D>
where
    S: SnapshotOperations + Sync,
    R: ResolveOperations + Sync,
    D: DownloadOperations + Sync,
{
    /// Creates a harvester over the given stage implementations.
    ///
    /// The artifact directory named in `config.paths.report_dir` is scanned
    /// once here to build the dedup repository; later downloads extend it in
    /// memory. Artifact names that do not decode are logged and left out of
    /// the repository, so a stray file never blocks a run.
    ///
    /// # Arguments
    ///
    /// * `config` - Timeouts, delays, selectors and filesystem locations for the run
    /// * `snapshots` - Renders finance pages that have no snapshot yet
    /// * `resolver` - Follows report redirect links to their final address
    /// * `downloader` - Streams resolved documents into the artifact directory
    ///
    /// # Returns
    ///
    /// A harvester ready for [`Harvester::run`], [`Harvester::run_snapshot_dir`]
    /// or [`Harvester::fetch_snapshots`].
    ///
    /// # Errors
    ///
    /// * `HarvestError::FileError` - The artifact directory exists but cannot be listed
    /// * `HarvestError::Selector` - `config.table_selector` is not a valid CSS selector
    ///
    /// # Example
    ///
    /// ```ignore
    /// let config = HarvestConfig::with_root("data");
    /// let harvester = Harvester::new(
    ///     config.clone(),
    ///     SnapshotFetcher::new(&config),
    ///     UrlResolver::new(&config),
    ///     DownloadManager::new(&config)?,
    /// )?;
    /// ```
    pub fn new(config: HarvestConfig, snapshots: S, resolver: R, downloader: D) -> Result<Self> {
        let load = DedupRepository::load(&config.paths.report_dir)?;
        for rejected in &load.rejected {
            tracing::warn!("Unrecognized file in artifact directory: {}", rejected);
        }

        let parser =
            CatalogParser::new(CatalogConfig::default().with_table(config.table_selector.clone()))?;
        let error_log = ErrorLog::new(config.paths.error_log.clone());

        Ok(Self {
            config,
            snapshots,
            resolver,
            downloader,
            parser,
            repository: load.repository,
            error_log,
        })
    }

    pub fn repository(&self) -> &DedupRepository {
        &self.repository
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Harvests every stock in order, fetching missing snapshots on the way.
    pub async fn run(&mut self, stocks: &[StockIdentity]) -> RunSummary {
        let mut summary = RunSummary::default();

        for (index, stock) in stocks.iter().enumerate() {
            tracing::info!("[{}/{}] Processing {}", index + 1, stocks.len(), stock);
            self.process_stock(stock, &mut summary).await;
        }

        tracing::info!("Harvest finished: {}", summary);
        summary
    }

    /// Harvests every stock that already has a snapshot on disk.
    ///
    /// Stock identities are recovered from the snapshot filenames; files
    /// that do not follow the `name(code).html` form are skipped.
    pub async fn run_snapshot_dir(&mut self) -> Result<RunSummary> {
        let stocks = self.snapshot_dir_stocks()?;
        tracing::info!(
            "Found {} snapshots in {}",
            stocks.len(),
            self.config.paths.snapshot_dir.display()
        );
        Ok(self.run(&stocks).await)
    }

    /// Fetches missing snapshots without harvesting any reports.
    ///
    /// Repeats the pass up to `snapshot_passes` times while stocks are still
    /// missing their snapshot.
    pub async fn fetch_snapshots(&self, stocks: &[StockIdentity]) -> SnapshotSummary {
        let mut summary = SnapshotSummary::default();
        let passes = self.config.snapshot_passes.max(1);

        for pass in 1..=passes {
            summary.passes = pass;
            summary.missing = 0;

            for stock in stocks {
                match self.ensure_snapshot(stock).await {
                    Ok(SnapshotState::Fetched(_)) => summary.fetched += 1,
                    Ok(SnapshotState::Existing(_)) => {}
                    Ok(SnapshotState::Missing) => summary.missing += 1,
                    Err(e) => {
                        tracing::warn!("Snapshot for {} failed: {}", stock, e);
                        summary.missing += 1;
                    }
                }
            }

            tracing::info!(
                "Snapshot pass {}/{}: {} fetched so far, {} missing",
                pass,
                passes,
                summary.fetched,
                summary.missing
            );
            if summary.missing == 0 {
                break;
            }
        }

        summary
    }

    /// Makes sure a stock's snapshot is on disk, rendering it if absent.
    ///
    /// Snapshots are never refreshed: an existing file is returned as is,
    /// without a delay or a browser launch. Otherwise the randomized request
    /// delay is observed and the finance page is rendered to
    /// `<snapshot_dir>/<name>(<code>).html`.
    ///
    /// # Arguments
    ///
    /// * `stock` - Code and display name; both go into the snapshot filename
    ///
    /// # Returns
    ///
    /// * `SnapshotState::Existing` - The file was already there
    /// * `SnapshotState::Fetched` - The page was rendered and saved by this call
    /// * `SnapshotState::Missing` - The page, frame or table never appeared
    ///
    /// # Errors
    ///
    /// * `HarvestError::KeyEncode` - The stock name is empty after sanitizing
    /// * Anything the snapshot stage reports as `Err`, such as a browser that
    ///   fails to launch or a snapshot that cannot be written
    pub async fn ensure_snapshot(&self, stock: &StockIdentity) -> Result<SnapshotState> {
        let path = self
            .config
            .paths
            .snapshot_dir
            .join(naming::encode_snapshot(stock)?);

        if path.exists() {
            tracing::debug!("Snapshot {} already exists", path.display());
            return Ok(SnapshotState::Existing(path));
        }

        self.pause().await;
        let url = self.config.finance_page_url(stock.code.as_str());
        let saved = self.snapshots.fetch_snapshot(&url, &path).await?;

        if saved && path.exists() {
            Ok(SnapshotState::Fetched(path))
        } else {
            Ok(SnapshotState::Missing)
        }
    }

    async fn process_stock(&mut self, stock: &StockIdentity, summary: &mut RunSummary) {
        summary.stocks += 1;

        let snapshot = match self.ensure_snapshot(stock).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("Skipping {}: snapshot failed: {}", stock, e);
                summary.stocks_aborted += 1;
                return;
            }
        };
        if matches!(snapshot, SnapshotState::Fetched(_)) {
            summary.snapshots_fetched += 1;
        }
        let Some(path) = snapshot.path() else {
            tracing::warn!("Skipping {}: no snapshot available", stock);
            summary.stocks_aborted += 1;
            return;
        };

        let catalog = match self.parser.parse_file(path) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!("Skipping {}: could not read {}: {}", stock, path.display(), e);
                summary.stocks_aborted += 1;
                return;
            }
        };
        if catalog.is_empty() {
            tracing::warn!("Skipping {}: {}", stock, HarvestError::CatalogEmpty(path.clone()));
            summary.stocks_aborted += 1;
            return;
        }

        tracing::info!(
            "Harvesting {} reports for {}",
            catalog.records.len(),
            catalog.stock_name.as_deref().unwrap_or(&stock.name)
        );

        for record in &catalog.records {
            match self.process_report(stock, record).await {
                Ok(outcome) => summary.record(&outcome),
                Err(e) => {
                    summary.errored += 1;
                    self.report_error(stock, record, &e);
                    tracing::warn!("Cooling down for {:?}", self.config.cooldown);
                    sleep(self.config.cooldown).await;
                }
            }
        }
    }

    /// Drives a single report from dedup check to download.
    ///
    /// A report whose key is already in the repository returns immediately.
    /// Otherwise the request delay is observed, the redirect link is resolved,
    /// and only an address whose path mentions `pdf` is downloaded. A
    /// successful download adds the key to the repository.
    ///
    /// # Errors
    ///
    /// Returns `Err` only for faults the stages do not absorb themselves
    /// (filename encoding, browser launch, directory creation). [`Harvester::run`]
    /// writes these to the error log and cools down before the next report.
    pub async fn process_report(
        &mut self,
        stock: &StockIdentity,
        record: &ReportRecord,
    ) -> Result<ReportOutcome> {
        let key = record.key(&stock.code);
        if self.repository.contains(&key) {
            tracing::info!("Skipping {}: already downloaded", key);
            return Ok(ReportOutcome::AlreadyPresent);
        }

        let file_name = ArtifactName::new(stock, &record.year, &record.quarter).encode()?;
        let destination = self.config.paths.report_dir.join(file_name);

        self.pause().await;
        let Some(final_url) = self.resolver.resolve(&record.redirect_url).await? else {
            tracing::warn!("Skipping {}: could not resolve {}", key, record.redirect_url);
            return Ok(ReportOutcome::Unresolved);
        };

        if !points_to_pdf(&final_url) {
            tracing::warn!("Skipping {}: resolved to a non-PDF address {}", key, final_url);
            return Ok(ReportOutcome::NotPdf(final_url));
        }

        if self.downloader.download(&final_url, &destination).await? {
            tracing::info!("Finished {} {}", stock.name, key);
            self.repository.insert(key);
            Ok(ReportOutcome::Downloaded(destination))
        } else {
            Ok(ReportOutcome::DownloadFailed)
        }
    }

    fn report_error(&self, stock: &StockIdentity, record: &ReportRecord, error: &HarvestError) {
        tracing::error!(
            "Report {} {} {} failed: {}",
            stock,
            record.year,
            record.quarter,
            error
        );
        if let Err(e) = self.error_log.append(&ErrorEntry::new(stock, record, error)) {
            tracing::error!(
                "Could not write to {}: {}",
                self.error_log.path().display(),
                e
            );
        }
    }

    fn snapshot_dir_stocks(&self) -> Result<Vec<StockIdentity>> {
        let dir = &self.config.paths.snapshot_dir;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut file_names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                file_names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        file_names.sort();

        let stocks = file_names
            .iter()
            .filter(|name| name.ends_with(SNAPSHOT_EXTENSION))
            .filter_map(|name| match naming::decode_snapshot(name) {
                Ok(stock) => Some(stock),
                Err(e) => {
                    tracing::warn!("Ignoring snapshot with unexpected name: {}", e);
                    None
                }
            })
            .collect();

        Ok(stocks)
    }

    /// Sleeps for a random duration within the configured request delay.
    async fn pause(&self) {
        let delay = jittered(self.config.request_delay);
        if !delay.is_zero() {
            tracing::debug!("Waiting {:?} before next request", delay);
            sleep(delay).await;
        }
    }
}

/// Picks a uniformly random duration in `[min, max]`.
fn jittered((min, max): (Duration, Duration)) -> Duration {
    if max <= min {
        return min;
    }
    min + (max - min).mul_f64(fastrand::f64())
}
