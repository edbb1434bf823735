//! In-memory stand-ins for the browser, fetcher and recognizer.

use std::cell::{Cell, RefCell};
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::browser::{BrowserError, BrowserResult, BrowserSession};
use crate::config::{Config, Locators, Timing};
use crate::fetch::Fetch;
use crate::ocr::{OcrError, TextRecognizer};

pub const INDEX_URL: &str = "https://kb.test/index";

pub fn test_config() -> Config {
    Config {
        index_url: INDEX_URL.into(),
        timing: Timing {
            wait_secs: 0.0,
            initial_settle_secs: 0.0,
            reload_settle_secs: 0.0,
            pacing_min_secs: 0.0,
            pacing_max_secs: 0.0,
            fetch_timeout_secs: 1.0,
        },
        ..Default::default()
    }
}

pub struct FakeRow {
    category: String,
    /// (label, detail page index)
    links: Vec<(String, usize)>,
}

impl FakeRow {
    pub fn new(category: &str, links: &[(&str, usize)]) -> Self {
        Self {
            category: category.into(),
            links: links.iter().map(|(l, d)| (l.to_string(), *d)).collect(),
        }
    }
}

pub struct FakeImage {
    src: Option<String>,
}

impl FakeImage {
    pub fn url(src: &str) -> Self {
        Self {
            src: Some(src.into()),
        }
    }
}

pub struct FakeDetail {
    title: Option<String>,
    image: Option<FakeImage>,
    broken: bool,
}

impl FakeDetail {
    pub fn new(code: &str) -> Self {
        Self {
            title: Some(format!("  {code}\n")),
            image: None,
            broken: false,
        }
    }

    pub fn untitled() -> Self {
        Self {
            title: None,
            image: None,
            broken: false,
        }
    }

    pub fn with_image(mut self, image: FakeImage) -> Self {
        self.image = Some(image);
        self
    }

    /// Image lookup fails with a driver error instead of a timeout.
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEl {
    Cell(usize),
    Link { row: usize, idx: usize },
    Title(usize),
    Image(usize),
}

#[derive(Default)]
struct State {
    history: Vec<String>,
    clicked: Vec<String>,
    shrink_to: Option<usize>,
    navigations: usize,
    go_back_fails: bool,
    url_reads: usize,
    fail_url_read: Option<usize>,
}

/// A site with one index page of table rows and one page per detail.
pub struct FakeSite {
    rows: Vec<FakeRow>,
    details: Vec<FakeDetail>,
    locators: Locators,
    state: RefCell<State>,
}

impl FakeSite {
    pub const SCREENSHOT_BYTES: &'static [u8] = b"\x89PNG-screenshot";

    pub fn new(rows: Vec<FakeRow>, details: Vec<FakeDetail>) -> Self {
        Self {
            rows,
            details,
            locators: Locators::default(),
            state: RefCell::new(State::default()),
        }
    }

    /// Answer to these selectors instead of the defaults.
    pub fn with_locators(mut self, locators: Locators) -> Self {
        self.locators = locators;
        self
    }

    /// After the first click the index only lists `len` cells.
    pub fn shrink_after_first_click(&self, len: usize) {
        self.state.borrow_mut().shrink_to = Some(len);
    }

    /// Every `go_back` fails with a driver error and leaves the page as is.
    pub fn fail_go_back(&self) {
        self.state.borrow_mut().go_back_fails = true;
    }

    /// The `n`th call to `current_url` (1-based) fails with a driver error.
    pub fn fail_url_read(&self, n: usize) {
        self.state.borrow_mut().fail_url_read = Some(n);
    }

    pub fn navigations(&self) -> usize {
        self.state.borrow().navigations
    }

    pub fn clicked_labels(&self) -> Vec<String> {
        self.state.borrow().clicked.clone()
    }

    pub fn at_index(&self) -> bool {
        self.current() == INDEX_URL
    }

    fn current(&self) -> String {
        self.state
            .borrow()
            .history
            .last()
            .cloned()
            .unwrap_or_else(|| "about:blank".into())
    }

    fn detail_url(d: usize) -> String {
        format!("https://kb.test/detail/{d}")
    }

    fn current_detail(&self) -> Option<usize> {
        let url = self.current();
        (0..self.details.len()).find(|d| Self::detail_url(*d) == url)
    }

    fn visible_cells(&self) -> usize {
        let state = self.state.borrow();
        match state.shrink_to {
            Some(len) if !state.clicked.is_empty() => len.min(self.rows.len()),
            _ => self.rows.len(),
        }
    }

    fn timeout(selector: &str, after: Duration) -> BrowserError {
        BrowserError::Timeout {
            target: selector.into(),
            after,
        }
    }
}

impl BrowserSession for FakeSite {
    type Element = FakeEl;

    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        let mut state = self.state.borrow_mut();
        state.navigations += 1;
        state.history.push(url.into());
        Ok(())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        {
            let mut state = self.state.borrow_mut();
            state.url_reads += 1;
            if state.fail_url_read == Some(state.url_reads) {
                return Err(BrowserError::Driver("target closed".into()));
            }
        }
        Ok(self.current())
    }

    async fn go_back(&self) -> BrowserResult<()> {
        let mut state = self.state.borrow_mut();
        if state.go_back_fails {
            return Err(BrowserError::Driver("history navigation failed".into()));
        }
        if state.history.len() > 1 {
            state.history.pop();
        }
        Ok(())
    }

    async fn find_all(&self, selector: &str) -> BrowserResult<Vec<FakeEl>> {
        if selector == self.locators.index_cell && self.at_index() {
            Ok((0..self.visible_cells()).map(FakeEl::Cell).collect())
        } else {
            Ok(Vec::new())
        }
    }

    async fn find_within(&self, scope: &FakeEl, selector: &str) -> BrowserResult<Vec<FakeEl>> {
        match scope {
            FakeEl::Cell(row) if selector == self.locators.cell_link => Ok((0..self.rows[*row]
                .links
                .len())
                .map(|idx| FakeEl::Link { row: *row, idx })
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> BrowserResult<FakeEl> {
        let Some(d) = self.current_detail() else {
            return Err(Self::timeout(selector, timeout));
        };
        let detail = &self.details[d];
        if selector == self.locators.title && detail.title.is_some() {
            return Ok(FakeEl::Title(d));
        }
        if selector == self.locators.detail_image {
            if detail.broken {
                return Err(BrowserError::Driver("renderer crashed".into()));
            }
            if detail.image.is_some() {
                return Ok(FakeEl::Image(d));
            }
        }
        Err(Self::timeout(selector, timeout))
    }

    async fn wait_for_all(&self, selector: &str, timeout: Duration) -> BrowserResult<Vec<FakeEl>> {
        let found = self.find_all(selector).await?;
        if found.is_empty() {
            Err(Self::timeout(selector, timeout))
        } else {
            Ok(found)
        }
    }

    async fn wait_for_clickable(&self, _el: &FakeEl, _timeout: Duration) -> BrowserResult<()> {
        Ok(())
    }

    async fn click(&self, el: &FakeEl) -> BrowserResult<()> {
        let FakeEl::Link { row, idx } = el else {
            return Err(BrowserError::Driver(format!("{el:?} is not clickable")));
        };
        let (label, detail) = &self.rows[*row].links[*idx];
        let mut state = self.state.borrow_mut();
        state.clicked.push(label.clone());
        state.history.push(Self::detail_url(*detail));
        Ok(())
    }

    async fn text(&self, el: &FakeEl) -> BrowserResult<String> {
        Ok(match el {
            FakeEl::Link { row, idx } => self.rows[*row].links[*idx].0.clone(),
            FakeEl::Title(d) => self.details[*d].title.clone().unwrap_or_default(),
            _ => String::new(),
        })
    }

    async fn attribute(&self, el: &FakeEl, name: &str) -> BrowserResult<Option<String>> {
        match el {
            FakeEl::Image(d) if name == "src" => Ok(self.details[*d]
                .image
                .as_ref()
                .and_then(|i| i.src.clone())),
            _ => Ok(None),
        }
    }

    async fn screenshot(&self, el: &FakeEl) -> BrowserResult<Vec<u8>> {
        match el {
            FakeEl::Image(_) => Ok(Self::SCREENSHOT_BYTES.to_vec()),
            _ => Err(BrowserError::Stale(format!("{el:?}"))),
        }
    }

    async fn row_label(&self, el: &FakeEl) -> BrowserResult<Option<String>> {
        match el {
            FakeEl::Cell(row) => Ok(Some(self.rows[*row].category.clone())),
            _ => Ok(None),
        }
    }

    async fn close(self) -> BrowserResult<()> {
        Ok(())
    }
}

/// Records every request; URLs containing `fail_on` answer with an error.
#[derive(Default)]
pub struct CountingFetcher {
    calls: Cell<usize>,
    fail_on: Option<String>,
}

impl CountingFetcher {
    pub fn failing_on(pattern: &str) -> Self {
        Self {
            calls: Cell::new(0),
            fail_on: Some(pattern.into()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Fetch for CountingFetcher {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.calls.set(self.calls.get() + 1);
        match &self.fail_on {
            Some(p) if url.contains(p.as_str()) => Err(anyhow!("GET {url}: 404 Not Found")),
            _ => Ok(format!("png:{url}").into_bytes()),
        }
    }
}

/// Returns the same lines for every image.
pub struct ScriptedRecognizer {
    lines: Vec<String>,
    calls: Cell<usize>,
}

impl ScriptedRecognizer {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(&self, _image: &[u8]) -> Result<Vec<String>, OcrError> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.lines.clone())
    }
}
