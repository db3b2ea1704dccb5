mod common;

use async_trait::async_trait;
use common::read_fixture;
use reportkit::{
    DownloadOperations, HarvestConfig, HarvestError, Harvester, ReportKey, ResolveOperations,
    Result, SnapshotOperations, StockCode, StockIdentity,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const REPORT_FIXTURE: &str = "snapshots/finance_report.html";
const NO_TABLE_FIXTURE: &str = "snapshots/no_table.html";

type CallLog<T> = Arc<Mutex<Vec<T>>>;

/// Writes canned markup for stocks whose code appears in the page URL.
#[derive(Clone, Default)]
struct FakeSnapshots {
    html: HashMap<String, String>,
    calls: CallLog<String>,
}

#[async_trait]
impl SnapshotOperations for FakeSnapshots {
    async fn fetch_snapshot(&self, page_url: &str, output: &Path) -> Result<bool> {
        self.calls.lock().unwrap().push(page_url.to_string());
        let Some(html) = self.html.iter().find(|(code, _)| page_url.contains(code.as_str())) else {
            return Ok(false);
        };
        std::fs::create_dir_all(output.parent().unwrap())?;
        std::fs::write(output, html.1)?;
        Ok(true)
    }
}

#[derive(Clone)]
enum Resolution {
    To(String),
    Nowhere,
    Fails,
}

/// Resolves `x.shtml` to `x.pdf` unless told otherwise.
#[derive(Clone, Default)]
struct FakeResolver {
    overrides: HashMap<String, Resolution>,
    calls: CallLog<String>,
}

#[async_trait]
impl ResolveOperations for FakeResolver {
    async fn resolve(&self, redirect_url: &str) -> Result<Option<String>> {
        self.calls.lock().unwrap().push(redirect_url.to_string());
        match self.overrides.get(redirect_url) {
            Some(Resolution::To(url)) => Ok(Some(url.clone())),
            Some(Resolution::Nowhere) => Ok(None),
            Some(Resolution::Fails) => Err(HarvestError::ConfigError(
                "browser failed to launch".to_string(),
            )),
            None => Ok(Some(redirect_url.replace(".shtml", ".pdf"))),
        }
    }
}

#[derive(Clone, Default)]
struct FakeDownloader {
    calls: CallLog<(String, PathBuf)>,
}

#[async_trait]
impl DownloadOperations for FakeDownloader {
    async fn download(&self, url: &str, destination: &Path) -> Result<bool> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), destination.to_path_buf()));
        std::fs::create_dir_all(destination.parent().unwrap())?;
        std::fs::write(destination, b"%PDF-1.7")?;
        Ok(true)
    }
}

fn test_config(root: &Path) -> HarvestConfig {
    HarvestConfig {
        request_delay: (Duration::ZERO, Duration::ZERO),
        cooldown: Duration::ZERO,
        ..HarvestConfig::with_root(root)
    }
}

fn stock(code: &str, name: &str) -> StockIdentity {
    StockIdentity::new(StockCode::parse(code).unwrap(), name)
}

fn jinjiang() -> StockIdentity {
    stock("600754", "锦江酒店")
}

/// Fixture markup rewritten so its redirect links belong to `code`.
fn snapshot_for(code: &str) -> String {
    read_fixture(REPORT_FIXTURE).replace("/600754/", &format!("/{code}/"))
}

fn notice(code: &str, period: &str) -> String {
    format!("https://news.example.com/notice/{code}/{period}.shtml")
}

fn snapshots_for(codes: &[&str]) -> FakeSnapshots {
    FakeSnapshots {
        html: codes
            .iter()
            .map(|code| (code.to_string(), snapshot_for(code)))
            .collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn downloads_only_resolved_pdfs() {
    let dir = tempfile::tempdir().unwrap();
    let snapshots = snapshots_for(&["600754"]);
    let mut resolver = FakeResolver::default();
    resolver.overrides.insert(
        notice("600754", "2024-2"),
        Resolution::To("https://news.example.com/notice/600754/landing.shtml".to_string()),
    );
    resolver
        .overrides
        .insert(notice("600754", "2024-3"), Resolution::Nowhere);
    resolver.overrides.insert(
        notice("600754", "2023-1"),
        Resolution::To("https://static.example.com/pdf/download?id=1".to_string()),
    );
    let downloader = FakeDownloader::default();
    let downloads = downloader.calls.clone();

    let mut harvester =
        Harvester::new(test_config(dir.path()), snapshots, resolver, downloader).unwrap();
    let summary = harvester.run(&[jinjiang()]).await;

    assert_eq!(summary.stocks, 1);
    assert_eq!(summary.snapshots_fetched, 1);
    assert_eq!(summary.downloaded, 4);
    assert_eq!(summary.not_pdf, 1);
    assert_eq!(summary.unresolved, 1);
    assert_eq!(summary.errored, 0);

    let downloads = downloads.lock().unwrap();
    assert_eq!(downloads.len(), 4);
    assert!(downloads.iter().all(|(url, _)| url.to_lowercase().contains("pdf")));
    assert!(
        downloads
            .iter()
            .any(|(url, _)| url == "https://static.example.com/pdf/download?id=1")
    );
    assert_eq!(
        downloads[0].1,
        dir.path().join("reports").join("600754_锦江酒店_2024_一季报.pdf")
    );
    assert!(harvester.repository().contains(&ReportKey::new(
        StockCode::parse("600754").unwrap(),
        "2023",
        "年报"
    )));
}

#[tokio::test]
async fn second_run_downloads_nothing_even_after_rename() {
    let dir = tempfile::tempdir().unwrap();

    let first_downloads = {
        let downloader = FakeDownloader::default();
        let calls = downloader.calls.clone();
        let mut harvester = Harvester::new(
            test_config(dir.path()),
            snapshots_for(&["600754"]),
            FakeResolver::default(),
            downloader,
        )
        .unwrap();
        harvester.run(&[jinjiang()]).await;
        let count = calls.lock().unwrap().len();
        count
    };
    assert_eq!(first_downloads, 6);

    let resolver = FakeResolver::default();
    let resolves = resolver.calls.clone();
    let downloader = FakeDownloader::default();
    let downloads = downloader.calls.clone();
    let mut harvester = Harvester::new(
        test_config(dir.path()),
        snapshots_for(&["600754"]),
        resolver,
        downloader,
    )
    .unwrap();
    assert_eq!(harvester.repository().len(), 6);

    let summary = harvester.run(&[stock("600754", "锦江酒店新")]).await;

    assert_eq!(summary.already_present, 6);
    assert_eq!(summary.downloaded, 0);
    assert!(resolves.lock().unwrap().is_empty());
    assert!(downloads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn existing_snapshot_is_not_refetched() {
    let dir = tempfile::tempdir().unwrap();
    let html_dir = dir.path().join("html");
    std::fs::create_dir_all(&html_dir).unwrap();
    std::fs::write(html_dir.join("锦江酒店(600754).html"), snapshot_for("600754")).unwrap();

    let snapshots = snapshots_for(&["600754"]);
    let fetches = snapshots.calls.clone();
    let mut harvester = Harvester::new(
        test_config(dir.path()),
        snapshots,
        FakeResolver::default(),
        FakeDownloader::default(),
    )
    .unwrap();
    let summary = harvester.run(&[jinjiang()]).await;

    assert!(fetches.lock().unwrap().is_empty());
    assert_eq!(summary.snapshots_fetched, 0);
    assert_eq!(summary.downloaded, 6);
}

#[tokio::test]
async fn report_error_is_logged_and_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let mut resolver = FakeResolver::default();
    resolver
        .overrides
        .insert(notice("600754", "2024-2"), Resolution::Fails);
    let resolves = resolver.calls.clone();

    let mut harvester = Harvester::new(
        test_config(dir.path()),
        snapshots_for(&["600754", "000001"]),
        resolver,
        FakeDownloader::default(),
    )
    .unwrap();
    let summary = harvester
        .run(&[jinjiang(), stock("000001", "平安银行")])
        .await;

    assert_eq!(summary.errored, 1);
    assert_eq!(summary.downloaded, 11);

    let resolves = resolves.lock().unwrap();
    let failed_at = resolves
        .iter()
        .position(|url| *url == notice("600754", "2024-2"))
        .unwrap();
    assert_eq!(resolves[failed_at + 1], notice("600754", "2024-3"));
    assert!(resolves.contains(&notice("000001", "2023-4")));

    let log = std::fs::read_to_string(dir.path().join("error_log.txt")).unwrap();
    let lines: Vec<serde_json::Value> = log
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["code"], "600754");
    assert_eq!(lines[0]["name"], "锦江酒店");
    assert_eq!(lines[0]["year"], "2024");
    assert_eq!(lines[0]["quarter"], "中报");
    assert!(
        lines[0]["error"]
            .as_str()
            .unwrap()
            .contains("browser failed to launch")
    );
}

#[tokio::test]
async fn stock_without_snapshot_or_table_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut snapshots = snapshots_for(&["000002"]);
    snapshots
        .html
        .insert("000003".to_string(), read_fixture(NO_TABLE_FIXTURE));
    let downloader = FakeDownloader::default();
    let downloads = downloader.calls.clone();

    let mut harvester = Harvester::new(
        test_config(dir.path()),
        snapshots,
        FakeResolver::default(),
        downloader,
    )
    .unwrap();
    let summary = harvester
        .run(&[
            stock("000001", "No Snapshot"),
            stock("000003", "No Table"),
            stock("000002", "Works"),
        ])
        .await;

    assert_eq!(summary.stocks, 3);
    assert_eq!(summary.stocks_aborted, 2);
    assert_eq!(summary.downloaded, 6);
    assert!(
        downloads
            .lock()
            .unwrap()
            .iter()
            .all(|(url, _)| url.contains("/000002/"))
    );
    assert!(!dir.path().join("html").join("No Snapshot(000001).html").exists());
}

#[tokio::test]
async fn malformed_artifact_names_do_not_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let reports = dir.path().join("reports");
    std::fs::create_dir_all(&reports).unwrap();
    std::fs::write(reports.join("600754_锦江酒店_2024_一季报.pdf"), b"%PDF").unwrap();
    std::fs::write(reports.join("Thumbs.db"), b"").unwrap();

    let mut harvester = Harvester::new(
        test_config(dir.path()),
        snapshots_for(&["600754"]),
        FakeResolver::default(),
        FakeDownloader::default(),
    )
    .unwrap();
    assert_eq!(harvester.repository().len(), 1);

    let summary = harvester.run(&[jinjiang()]).await;
    assert_eq!(summary.already_present, 1);
    assert_eq!(summary.downloaded, 5);
}

#[tokio::test]
async fn snapshot_dir_mode_recovers_stocks_from_filenames() {
    let dir = tempfile::tempdir().unwrap();
    let html_dir = dir.path().join("html");
    std::fs::create_dir_all(&html_dir).unwrap();
    std::fs::write(html_dir.join("锦江酒店(600754).html"), snapshot_for("600754")).unwrap();
    std::fs::write(html_dir.join("index.html"), "<html></html>").unwrap();

    let downloader = FakeDownloader::default();
    let downloads = downloader.calls.clone();
    let mut harvester = Harvester::new(
        test_config(dir.path()),
        FakeSnapshots::default(),
        FakeResolver::default(),
        downloader,
    )
    .unwrap();
    let summary = harvester.run_snapshot_dir().await.unwrap();

    assert_eq!(summary.stocks, 1);
    assert_eq!(summary.downloaded, 6);
    assert!(
        downloads
            .lock()
            .unwrap()
            .iter()
            .all(|(_, dest)| dest.file_name().unwrap().to_string_lossy().starts_with("600754_锦江酒店_"))
    );
}

#[tokio::test]
async fn snapshot_passes_stop_once_nothing_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    let snapshots = snapshots_for(&["600754"]);
    let fetches = snapshots.calls.clone();
    let config = HarvestConfig {
        snapshot_passes: 3,
        ..test_config(dir.path())
    };

    let harvester = Harvester::new(
        config,
        snapshots,
        FakeResolver::default(),
        FakeDownloader::default(),
    )
    .unwrap();

    let summary = harvester.fetch_snapshots(&[jinjiang()]).await;
    assert_eq!(summary.passes, 1);
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.missing, 0);

    let summary = harvester
        .fetch_snapshots(&[jinjiang(), stock("000001", "Unreachable")])
        .await;
    assert_eq!(summary.passes, 3);
    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.missing, 1);
    assert_eq!(fetches.lock().unwrap().len(), 4);
}
