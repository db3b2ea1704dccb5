use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::js_protocol::runtime::{EvaluateParams, ExecutionContextId};
use chromiumoxide::handler::viewport::Viewport;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::error::{HarvestError, Result};

/// How a browser session is launched.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub headless: bool,
    pub user_agent: Option<String>,
    pub viewport: Option<(u32, u32)>,
    pub request_timeout: Duration,
}

/// One browser process, owned for the duration of a single call.
///
/// Sessions are never shared: every snapshot or resolve launches its own
/// browser and tears it down before returning, so a crashed or wedged page
/// cannot leak into the next call.
///
/// Two release paths exist:
/// 1. [`BrowserSession::close`], awaited on every normal and error return
/// 2. `Drop`, which schedules the same teardown on the runtime if the session
///    is dropped without being closed (panic or cancelled future)
///
/// ```ignore
/// let session = BrowserSession::launch(&options).await?;
/// let outcome = do_work(&session).await;
/// session.close().await;
/// outcome
/// ```
pub struct BrowserSession {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    runtime_handle: tokio::runtime::Handle,
}

impl BrowserSession {
    pub async fn launch(options: &SessionOptions) -> Result<Self> {
        let mut builder = BrowserConfig::builder().request_timeout(options.request_timeout);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(user_agent) = &options.user_agent {
            builder = builder.arg(format!("--user-agent={}", user_agent));
        }
        if let Some((width, height)) = options.viewport {
            builder = builder.window_size(width, height).viewport(Viewport {
                width,
                height,
                ..Viewport::default()
            });
        }
        let config = builder.build().map_err(HarvestError::ConfigError)?;

        let (browser, mut handler) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        tracing::debug!("Browser session started");
        Ok(Self {
            browser: Some(browser),
            handler: Some(handler),
            runtime_handle: tokio::runtime::Handle::current(),
        })
    }

    pub async fn new_page(&self) -> Result<Page> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| HarvestError::ConfigError("browser session already closed".to_string()))?;
        Ok(browser.new_page("about:blank").await?)
    }

    /// Shuts the browser down and waits for the process to exit.
    ///
    /// Teardown failures are logged, never returned: the caller's outcome is
    /// already decided by the time a session is closed.
    pub async fn close(mut self) {
        if let Some(browser) = self.browser.take() {
            shutdown(browser).await;
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        let handler = self.handler.take();
        if let Some(browser) = self.browser.take() {
            self.runtime_handle.spawn(async move {
                shutdown(browser).await;
                if let Some(handler) = handler {
                    handler.abort();
                }
            });
        } else if let Some(handler) = handler {
            handler.abort();
        }
    }
}

async fn shutdown(mut browser: Browser) {
    if let Err(e) = browser.close().await {
        tracing::warn!("Browser close failed: {}", e);
    }
    match browser.wait().await {
        Ok(_) => tracing::debug!("Browser session closed"),
        Err(e) => tracing::warn!("Browser did not exit cleanly: {}", e),
    }
}

/// Evaluates `expression` inside a specific frame's JavaScript context.
pub(crate) async fn evaluate_in<T: DeserializeOwned>(
    page: &Page,
    context: ExecutionContextId,
    expression: &str,
) -> Result<T> {
    let params = EvaluateParams::builder()
        .expression(expression)
        .context_id(context)
        .return_by_value(true)
        .build()
        .map_err(HarvestError::ConfigError)?;

    let result = page.evaluate_expression(params).await?;
    Ok(result.into_value()?)
}
