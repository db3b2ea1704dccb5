use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::cdp::js_protocol::runtime::ExecutionContextId;
use std::path::Path;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};

use super::browser::{BrowserSession, SessionOptions, evaluate_in};
use super::config::HarvestConfig;
use super::download::partial_path;
use super::error::{HarvestError, Result};
use super::traits::SnapshotOperations;

const FRAME_MARKUP_JS: &str = "(() => { \
    const doctype = document.doctype ? new XMLSerializer().serializeToString(document.doctype) : ''; \
    return doctype + document.documentElement.outerHTML; \
})()";

/// Renders a stock's finance page and saves the markup of its report frame.
///
/// The report table is drawn by script inside an embedded frame, so the
/// fetcher waits in three bounded steps: page load, frame attachment, and
/// table visibility. The frame's markup is only written once all three have
/// succeeded.
#[derive(Debug, Clone)]
pub struct SnapshotFetcher {
    frame_name: String,
    table_selector: String,
    navigation_timeout: Duration,
    frame_timeout: Duration,
    table_timeout: Duration,
    poll_interval: Duration,
    session: SessionOptions,
}

impl SnapshotFetcher {
    pub fn new(config: &HarvestConfig) -> Self {
        Self {
            frame_name: config.frame_name.clone(),
            table_selector: config.table_selector.clone(),
            navigation_timeout: config.navigation_timeout,
            frame_timeout: config.frame_timeout,
            table_timeout: config.table_timeout,
            poll_interval: config.poll_interval,
            session: SessionOptions {
                headless: config.snapshot_headless,
                user_agent: Some(config.user_agent.clone()),
                viewport: None,
                request_timeout: config.navigation_timeout,
            },
        }
    }

    async fn render(&self, session: &BrowserSession, page_url: &str) -> Result<String> {
        let page = session.new_page().await?;

        tracing::info!("Loading {}", page_url);
        timeout(self.navigation_timeout, page.goto(page_url))
            .await
            .map_err(|_| {
                HarvestError::Navigation(format!(
                    "{} did not load within {:?}",
                    page_url, self.navigation_timeout
                ))
            })??;

        let context = self.wait_for_frame(&page).await?;
        tracing::debug!("Entered frame {:?}", self.frame_name);

        self.wait_for_table(&page, context).await?;
        tracing::debug!("Table {:?} rendered", self.table_selector);

        evaluate_in(&page, context, FRAME_MARKUP_JS).await
    }

    /// Polls the page's frame tree until the report frame has a script context.
    async fn wait_for_frame(&self, page: &Page) -> Result<ExecutionContextId> {
        let deadline = Instant::now() + self.frame_timeout;

        loop {
            for frame_id in page.frames().await? {
                let name = page.frame_name(frame_id.clone()).await?;
                if name.as_deref() != Some(self.frame_name.as_str()) {
                    continue;
                }
                if let Some(context) = page.frame_execution_context(frame_id).await? {
                    return Ok(context);
                }
            }

            if Instant::now() >= deadline {
                return Err(HarvestError::Navigation(format!(
                    "frame {:?} did not appear within {:?}",
                    self.frame_name, self.frame_timeout
                )));
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Polls until the report table is attached, displayed and has a box.
    async fn wait_for_table(&self, page: &Page, context: ExecutionContextId) -> Result<()> {
        let deadline = Instant::now() + self.table_timeout;
        let visibility_check = table_visible_js(&self.table_selector)?;

        loop {
            if evaluate_in::<bool>(page, context, &visibility_check).await? {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(HarvestError::Navigation(format!(
                    "table {:?} not visible within {:?}",
                    self.table_selector, self.table_timeout
                )));
            }
            sleep(self.poll_interval).await;
        }
    }
}

fn table_visible_js(selector: &str) -> Result<String> {
    let selector = serde_json::to_string(selector)?;
    Ok(format!(
        "(() => {{ \
            const el = document.querySelector({selector}); \
            if (!el) return false; \
            const style = window.getComputedStyle(el); \
            const rect = el.getBoundingClientRect(); \
            return style.visibility !== 'hidden' && style.display !== 'none' \
                && (rect.width > 0 || rect.height > 0); \
        }})()"
    ))
}

#[async_trait]
impl SnapshotOperations for SnapshotFetcher {
    /// Renders `page_url` and writes the report frame's markup to `output`.
    ///
    /// A page, frame or table that never shows up is logged and reported as
    /// `Ok(false)`; no file is written, so the next run tries again. Browser
    /// launch and file write failures are returned as `Err`.
    async fn fetch_snapshot(&self, page_url: &str, output: &Path) -> Result<bool> {
        let session = BrowserSession::launch(&self.session).await?;
        let outcome = self.render(&session, page_url).await;
        session.close().await;

        let html = match outcome {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Snapshot of {} failed: {}", page_url, e);
                return Ok(false);
            }
        };

        save_snapshot(output, &html).await?;
        tracing::info!("Saved rendered frame to {}", output.display());
        Ok(true)
    }
}

/// Writes `html` next to `output` and renames it into place.
///
/// Existing snapshots are never refreshed, so a half-written file under the
/// final name would block that stock for good.
async fn save_snapshot(output: &Path, html: &str) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let partial = partial_path(output);
    let written = match tokio::fs::write(&partial, html).await {
        Ok(()) => tokio::fs::rename(&partial, output).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e.into());
    }
    Ok(())
}
