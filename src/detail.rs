use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::browser::BrowserSession;
use crate::config::ImageSource;
use crate::fetch::Fetch;

/// What a detail page yielded for its image slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailImage {
    Image(Vec<u8>),
    NoImage,
}

impl DetailImage {
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            DetailImage::Image(b) => Some(b),
            DetailImage::NoImage => None,
        }
    }
}

/// Everything gathered for one entry from its detail page.
#[derive(Debug, Clone)]
pub struct DetailRecord {
    pub error_code: Option<String>,
    pub description: String,
    pub image: DetailImage,
    pub raw_text: Option<String>,
}

/// Wait for the detail image and pull its bytes.
///
/// A visibility timeout means the page has no image and yields
/// [`DetailImage::NoImage`]. Any other failure is returned to the caller.
pub async fn extract_image<B, F>(
    browser: &B,
    fetcher: &F,
    image_selector: &str,
    source: ImageSource,
    wait: Duration,
) -> Result<DetailImage>
where
    B: BrowserSession,
    F: Fetch,
{
    let el = match browser.wait_for_visible(image_selector, wait).await {
        Ok(el) => el,
        Err(e) if e.is_timeout() => {
            debug!("No image on detail page: {}", e);
            return Ok(DetailImage::NoImage);
        }
        Err(e) => return Err(e).context("Failed to locate detail image"),
    };

    let bytes = match source {
        ImageSource::Screenshot => capture(browser, &el).await?,
        ImageSource::Url => match browser.attribute(&el, "src").await? {
            Some(src) if is_fetchable(&src) => fetcher.get(&src).await?,
            Some(_) => capture(browser, &el).await?,
            None => {
                warn!("Detail image has no src, capturing rendered element instead");
                capture(browser, &el).await?
            }
        },
    };

    Ok(DetailImage::Image(bytes))
}

async fn capture<B: BrowserSession>(browser: &B, el: &B::Element) -> Result<Vec<u8>> {
    browser
        .screenshot(el)
        .await
        .context("Failed to capture detail image")
}

fn is_fetchable(src: &str) -> bool {
    let src = src.trim();
    !src.is_empty() && !src.starts_with("data:")
}

// ── Tests ──
