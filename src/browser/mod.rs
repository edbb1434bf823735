pub mod chrome;

use std::time::Duration;

use thiserror::Error;

pub use chrome::ChromeSession;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("timed out after {after:?} waiting for `{target}`")]
    Timeout { target: String, after: Duration },
    #[error("element is no longer attached to the page: {0}")]
    Stale(String),
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("browser driver error: {0}")]
    Driver(String),
}

impl BrowserError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BrowserError::Timeout { .. })
    }
}

pub type BrowserResult<T> = Result<T, BrowserError>;

/// One driven page view. Implementations own a single current page and its
/// history, so every call is issued by one caller at a time.
pub trait BrowserSession {
    type Element;

    async fn navigate(&self, url: &str) -> BrowserResult<()>;
    async fn current_url(&self) -> BrowserResult<String>;
    async fn go_back(&self) -> BrowserResult<()>;

    async fn find_all(&self, selector: &str) -> BrowserResult<Vec<Self::Element>>;
    async fn find_within(
        &self,
        scope: &Self::Element,
        selector: &str,
    ) -> BrowserResult<Vec<Self::Element>>;

    /// Poll until an element matching `selector` is rendered with a non-empty box.
    /// Returns [`BrowserError::Timeout`] when `timeout` elapses first.
    async fn wait_for_visible(&self, selector: &str, timeout: Duration)
    -> BrowserResult<Self::Element>;

    /// Poll until at least one element matches `selector`, then return all of them.
    async fn wait_for_all(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> BrowserResult<Vec<Self::Element>>;

    async fn wait_for_clickable(&self, el: &Self::Element, timeout: Duration) -> BrowserResult<()>;

    async fn click(&self, el: &Self::Element) -> BrowserResult<()>;
    async fn text(&self, el: &Self::Element) -> BrowserResult<String>;
    async fn attribute(&self, el: &Self::Element, name: &str) -> BrowserResult<Option<String>>;
    async fn screenshot(&self, el: &Self::Element) -> BrowserResult<Vec<u8>>;

    /// Text of the first cell of the table row enclosing `el`, if any.
    async fn row_label(&self, el: &Self::Element) -> BrowserResult<Option<String>>;

    async fn close(self) -> BrowserResult<()>
    where
        Self: Sized;
}
