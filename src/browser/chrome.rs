use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{BrowserError, BrowserResult, BrowserSession};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

const IS_VISIBLE_JS: &str = "function() {
    const r = this.getBoundingClientRect();
    const s = window.getComputedStyle(this);
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';
}";

const IS_CLICKABLE_JS: &str = "function() {
    const r = this.getBoundingClientRect();
    return r.width > 0 && r.height > 0 && !this.disabled;
}";

const ROW_LABEL_JS: &str = "function() {
    const tr = this.closest('tr');
    if (!tr || tr.cells.length === 0) return null;
    return tr.cells[0].innerText;
}";

/// JSON-RPC server error code CDP uses for DOM and runtime lookups.
const CDP_SERVER_ERROR: i64 = -32000;

/// A node that left the DOM, or an execution context torn down by navigation.
fn is_stale_node(code: i64, message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    code == CDP_SERVER_ERROR && (msg.contains("node") || msg.contains("context with specified id"))
}

impl From<CdpError> for BrowserError {
    fn from(e: CdpError) -> Self {
        match e {
            CdpError::Chrome(err) if is_stale_node(err.code, &err.message) => {
                BrowserError::Stale(err.message)
            }
            other => BrowserError::Driver(other.to_string()),
        }
    }
}

/// `Ok(None)` for a stale element so a wait can poll again; any other error
/// is passed through.
fn tolerate_stale<T>(result: BrowserResult<T>) -> BrowserResult<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(BrowserError::Stale(msg)) => {
            debug!("Stale element while polling: {}", msg);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Launch options for [`ChromeSession::launch`].
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub headless: bool,
    pub executable: Option<PathBuf>,
}

/// A single Chromium tab driven over CDP.
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromeSession {
    pub async fn launch(opts: &LaunchOptions) -> BrowserResult<Self> {
        let mut builder = BrowserConfig::builder().window_size(1400, 1000);
        if !opts.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &opts.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        // The CDP connection only makes progress while the handler is polled.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler stopped: {}", e);
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        info!("Browser session started (headless: {})", opts.headless);
        Ok(Self { browser, page, handler })
    }

    async fn eval_on(&self, el: &Element, js: &str) -> BrowserResult<Option<serde_json::Value>> {
        let ret = el.call_js_fn(js, false).await?;
        Ok(ret.result.value)
    }

    async fn is_visible(&self, el: &Element) -> BrowserResult<bool> {
        let ret = tolerate_stale(self.eval_on(el, IS_VISIBLE_JS).await)?;
        Ok(matches!(ret, Some(Some(serde_json::Value::Bool(true)))))
    }

    async fn find_polling(&self, selector: &str) -> BrowserResult<Vec<Element>> {
        Ok(tolerate_stale(self.find_all(selector).await)?.unwrap_or_default())
    }
}

impl BrowserSession for ChromeSession {
    type Element = Element;

    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn go_back(&self) -> BrowserResult<()> {
        self.page.evaluate("window.history.back()").await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn find_all(&self, selector: &str) -> BrowserResult<Vec<Element>> {
        Ok(self.page.find_elements(selector).await?)
    }

    async fn find_within(&self, scope: &Element, selector: &str) -> BrowserResult<Vec<Element>> {
        Ok(scope.find_elements(selector).await?)
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> BrowserResult<Element> {
        let deadline = Instant::now() + timeout;
        loop {
            for el in self.find_polling(selector).await? {
                if self.is_visible(&el).await? {
                    return Ok(el);
                }
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    target: selector.to_string(),
                    after: timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_all(&self, selector: &str, timeout: Duration) -> BrowserResult<Vec<Element>> {
        let deadline = Instant::now() + timeout;
        loop {
            let found = self.find_polling(selector).await?;
            if !found.is_empty() {
                return Ok(found);
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    target: selector.to_string(),
                    after: timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_clickable(&self, el: &Element, timeout: Duration) -> BrowserResult<()> {
        el.scroll_into_view().await?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(serde_json::Value::Bool(true)) = self.eval_on(el, IS_CLICKABLE_JS).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    target: "clickable link".to_string(),
                    after: timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn click(&self, el: &Element) -> BrowserResult<()> {
        el.click().await?;
        Ok(())
    }

    async fn text(&self, el: &Element) -> BrowserResult<String> {
        Ok(el.inner_text().await?.unwrap_or_default())
    }

    async fn attribute(&self, el: &Element, name: &str) -> BrowserResult<Option<String>> {
        Ok(el.attribute(name).await?)
    }

    async fn screenshot(&self, el: &Element) -> BrowserResult<Vec<u8>> {
        Ok(el.screenshot(CaptureScreenshotFormat::Png).await?)
    }

    async fn row_label(&self, el: &Element) -> BrowserResult<Option<String>> {
        Ok(self
            .eval_on(el, ROW_LABEL_JS)
            .await?
            .and_then(|v| v.as_str().map(|s| s.trim().to_string())))
    }

    async fn close(mut self) -> BrowserResult<()> {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close command failed: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Waiting for browser exit failed: {}", e);
        }
        self.handler.abort();
        info!("Browser session closed");
        Ok(())
    }
}

// ── Tests ──
