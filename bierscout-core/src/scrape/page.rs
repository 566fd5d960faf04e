use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::page::Page;
use tokio::time::sleep;
use tracing::warn;

use super::error::{ScrapeError, ScrapeResult};

/// The page surface adapters drive. Implemented by [`LiveStorePage`] over a
/// real browser page and by fakes in tests.
#[async_trait(?Send)]
pub trait StorePage {
    /// Navigates to a URL. A navigation timeout is a soft failure: it is
    /// logged and the adapter proceeds with whatever was loaded.
    async fn goto(&mut self, url: &str) -> ScrapeResult<()>;
    /// Waits for a selector to appear. `Ok(false)` on timeout.
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> ScrapeResult<bool>;
    /// Fixed settle delay after navigation or interaction.
    async fn settle(&mut self, wait: Duration) -> ScrapeResult<()>;
    async fn scroll_by(&mut self, delta_y: f64) -> ScrapeResult<()>;
    /// Clicks the first element matching the selector. `Ok(false)` when no
    /// such element exists.
    async fn click(&mut self, selector: &str) -> ScrapeResult<bool>;
    /// Evaluates a script returning a JSON-serializable value.
    async fn evaluate_json(&mut self, script: &str) -> ScrapeResult<serde_json::Value>;
    /// Visible text of the page body, used for bot-block signal scans.
    async fn body_text(&mut self) -> ScrapeResult<String>;
}

#[derive(Debug, Clone)]
pub struct LiveStorePage {
    page: Page,
    navigation_timeout: Duration,
}

impl LiveStorePage {
    pub fn new(page: Page, navigation_timeout: Duration) -> Self {
        Self {
            page,
            navigation_timeout,
        }
    }
}

#[async_trait(?Send)]
impl StorePage for LiveStorePage {
    async fn goto(&mut self, url: &str) -> ScrapeResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(ScrapeError::Configuration)?;
        self.page.goto(params).await?;
        let waited =
            tokio::time::timeout(self.navigation_timeout, self.page.wait_for_navigation()).await;
        match waited {
            Ok(result) => {
                result?;
            }
            Err(_) => {
                warn!(url, timeout = ?self.navigation_timeout, "navigation timed out, continuing with partial content");
            }
        }
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> ScrapeResult<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(selector, "selector wait timed out");
                return Ok(false);
            }
            sleep(Duration::from_millis(200)).await;
        }
    }

    async fn settle(&mut self, wait: Duration) -> ScrapeResult<()> {
        sleep(wait).await;
        Ok(())
    }

    async fn scroll_by(&mut self, delta_y: f64) -> ScrapeResult<()> {
        let script = format!("window.scrollBy({{ top: {delta_y}, behavior: 'smooth' }});");
        self.page
            .evaluate(script.as_str())
            .await
            .map_err(|err| ScrapeError::Unexpected(format!("failed to execute scroll: {err}")))?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> ScrapeResult<bool> {
        let element = match self.page.find_element(selector).await {
            Ok(element) => element,
            Err(_) => return Ok(false),
        };
        element
            .click()
            .await
            .map_err(|err| ScrapeError::Unexpected(format!("failed to click element: {err}")))?;
        Ok(true)
    }

    async fn evaluate_json(&mut self, script: &str) -> ScrapeResult<serde_json::Value> {
        let value = self
            .page
            .evaluate(script)
            .await?
            .into_value()
            .map_err(|err| {
                ScrapeError::Extraction(format!("failed to decode extraction payload: {err}"))
            })?;
        Ok(value)
    }

    async fn body_text(&mut self) -> ScrapeResult<String> {
        let text = self
            .page
            .evaluate("(() => document.body ? document.body.innerText : '')()")
            .await?
            .into_value::<String>()
            .unwrap_or_default();
        Ok(text)
    }
}
