use async_trait::async_trait;
use std::time::Duration;
use tokio::time::timeout;

use super::browser::{BrowserSession, SessionOptions};
use super::config::HarvestConfig;
use super::error::{HarvestError, Result};
use super::traits::ResolveOperations;

/// Follows report redirect links in a real browser.
///
/// Report links point at intermediate pages whose final destination may be
/// chosen by script or gated behind an anti-automation check, which a plain
/// HTTP client cannot get past. Each call launches a small browser with a
/// desktop user agent, loads the link, and reads back wherever the page
/// settled.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    navigation_timeout: Duration,
    session: SessionOptions,
}

impl UrlResolver {
    pub fn new(config: &HarvestConfig) -> Self {
        Self {
            navigation_timeout: config.navigation_timeout,
            session: SessionOptions {
                headless: config.resolver_headless,
                user_agent: Some(config.user_agent.clone()),
                viewport: Some(config.resolver_viewport),
                request_timeout: config.navigation_timeout,
            },
        }
    }

    async fn follow(&self, session: &BrowserSession, redirect_url: &str) -> Result<String> {
        let page = session.new_page().await?;
        page.goto(redirect_url).await?;
        page.url()
            .await?
            .ok_or_else(|| HarvestError::Resolution {
                url: redirect_url.to_string(),
                reason: "page reported no address".to_string(),
            })
    }
}

#[async_trait]
impl ResolveOperations for UrlResolver {
    async fn resolve(&self, redirect_url: &str) -> Result<Option<String>> {
        tracing::info!("Resolving {}", redirect_url);

        let session = BrowserSession::launch(&self.session).await?;
        let outcome = timeout(self.navigation_timeout, self.follow(&session, redirect_url)).await;
        session.close().await;

        match outcome {
            Ok(Ok(final_url)) => {
                tracing::info!("Resolved to {}", final_url);
                Ok(Some(final_url))
            }
            Ok(Err(e)) => {
                tracing::warn!("Navigation to {} failed: {}", redirect_url, e);
                Ok(None)
            }
            Err(_) => {
                tracing::warn!(
                    "Navigation to {} timed out after {:?}",
                    redirect_url,
                    self.navigation_timeout
                );
                Ok(None)
            }
        }
    }
}

/// Whether a resolved address names a PDF document.
///
/// Matches `pdf` anywhere in the URL path, case-insensitively, so
/// `/2024/report.PDF` and `/pdf/download` both qualify while query strings
/// mentioning pdf do not. Unparseable input falls back to the whole string.
pub fn points_to_pdf(url: &str) -> bool {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_ascii_lowercase(),
        Err(_) => url.to_ascii_lowercase(),
    };
    path.contains("pdf")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_to_pdf() {
        assert!(points_to_pdf("https://notice.example.com/pdf/2024/ABC_Q1.pdf"));
        assert!(points_to_pdf("https://example.com/Report.PDF"));
        assert!(points_to_pdf("https://static.example.com/pdf/download?id=1"));
        assert!(!points_to_pdf("https://example.com/notice/600754.shtml"));
        assert!(!points_to_pdf("https://example.com/view.shtml?type=pdf"));
    }

    #[test]
    fn test_resolver_uses_spoofed_identity() {
        let config = HarvestConfig::default();
        let resolver = UrlResolver::new(&config);
        assert_eq!(resolver.session.user_agent.as_deref(), Some(config.user_agent.as_str()));
        assert_eq!(resolver.session.viewport, Some((64, 36)));
        assert_eq!(resolver.navigation_timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    #[ignore]
    async fn live_resolve_follows_redirect() {
        let resolver = UrlResolver::new(&HarvestConfig::default());
        let resolved = resolver.resolve("https://example.com/").await.unwrap();
        assert!(resolved.unwrap().starts_with("https://example.com"));
    }
}
