use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::PipelineError;

/// Result of loading and extracting a single page. Never an `Err` — per-URL
/// failures are data, recorded in the output table next to the successes.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Text(String),
    Timeout,
    Error(String),
}

impl PageOutcome {
    /// The `scraped_text` cell this outcome materializes to.
    pub fn to_field(&self) -> String {
        match self {
            PageOutcome::Text(text) => text.clone(),
            PageOutcome::Timeout => "TIMEOUT_ERROR".to_string(),
            PageOutcome::Error(message) => format!("ERROR: {}", message),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PageOutcome::Text(_))
    }
}

/// One headless browser with one page, reused across sequential navigations.
/// Scoped to a single scrape stage call: acquired at entry, released at exit.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    pub async fn launch() -> Result<Self, PipelineError> {
        let browser_config = BrowserConfig::builder()
            .no_sandbox()
            .args(vec![
                "--headless",
                "--disable-gpu",
                "--disable-dev-shm-usage",
                "--disable-extensions",
                "--mute-audio",
                "--no-first-run",
                "--disable-default-apps",
                "--disable-sync",
                "--disable-background-networking",
            ])
            .build()
            .map_err(|e| PipelineError::Browser(format!("Failed to create browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| PipelineError::Browser(format!("Failed to launch browser: {}", e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(e) = h {
                    // filter out common websocket deserialization errors
                    let error_msg = e.to_string();
                    if error_msg.contains("data did not match any variant")
                        || error_msg.contains("untagged enum Message")
                    {
                        debug!("Ignoring WebSocket deserialization error: {}", e);
                    } else {
                        warn!("Browser handler error: {}", e);
                    }
                }
            }
            debug!("Browser handler task ended");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| PipelineError::Browser(format!("Failed to create page: {}", e)))?;

        info!("Launched headless browser session");
        Ok(Self {
            browser,
            page,
            handler_task,
        })
    }

    /// Navigate to `url`, wait for the page to load, and extract the visible
    /// body text. The whole operation is bounded by `timeout`; exceeding it
    /// yields `PageOutcome::Timeout` instead of aborting the caller's loop.
    pub async fn fetch_page_text(&self, url: &str, timeout: Duration) -> PageOutcome {
        match tokio::time::timeout(timeout, self.load_and_extract(url)).await {
            Err(_) => {
                warn!("Timeout for: {}", truncate(url, 60));
                PageOutcome::Timeout
            }
            Ok(Err(message)) => {
                warn!("Error for: {}", truncate(url, 60));
                PageOutcome::Error(message)
            }
            Ok(Ok(text)) => PageOutcome::Text(text),
        }
    }

    async fn load_and_extract(&self, url: &str) -> std::result::Result<String, String> {
        self.page.goto(url).await.map_err(|e| e.to_string())?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| e.to_string())?;

        let text: String = self
            .page
            .evaluate("document.body ? document.body.innerText : ''")
            .await
            .map_err(|e| e.to_string())?
            .into_value()
            .map_err(|e| e.to_string())?;

        Ok(text)
    }

    pub async fn close(self) {
        let BrowserSession {
            mut browser,
            page,
            handler_task,
        } = self;

        if let Err(e) = page.close().await {
            warn!("Failed to close page: {}", e);
        }
        if let Err(e) = browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        handler_task.abort();

        info!("Closed browser session");
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
