use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::config::{Config, ImageSource, LocatorStrategy, Role, Timing};
use crate::detail::{self, DetailRecord};
use crate::fetch::Fetch;
use crate::naming::{BaseName, NO_CATEGORY};
use crate::ocr::TextRecognizer;
use crate::parser;
use crate::select::{self, Candidate};
use crate::sink::{Harvest, Sink, Stored};

/// Where the traversal currently stands relative to the page it drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AtIndex,
    ProcessingEntry,
    AtDetail,
    Recovering,
}

#[derive(Debug)]
enum Outcome {
    Saved { name: String, stored: Stored },
    NoLinks,
    AlreadyDone(String),
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub saved: usize,
    pub placeholders: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Entries that produced new output in this run.
    pub fn processed(&self) -> usize {
        self.saved + self.placeholders
    }
}

/// Walks every index cell once: open its representative link, extract the
/// detail page, hand the result to the sink, and return to the index.
///
/// Entries are attempted exactly once per run. A failing entry is logged and
/// abandoned; the next one starts from a freshly resolved index.
pub struct Crawler<'a, B: BrowserSession, F: Fetch, S: Sink> {
    browser: &'a B,
    fetcher: &'a F,
    sink: S,
    recognizer: Option<&'a dyn TextRecognizer>,
    locators: &'a dyn LocatorStrategy,
    index_url: String,
    timing: Timing,
    image_source: ImageSource,
    phase: Phase,
    sub_indices: HashMap<String, usize>,
}

impl<'a, B: BrowserSession, F: Fetch, S: Sink> Crawler<'a, B, F, S> {
    pub fn new(browser: &'a B, fetcher: &'a F, sink: S, config: &'a Config) -> Self {
        Self {
            browser,
            fetcher,
            sink,
            recognizer: None,
            locators: &config.locators,
            index_url: config.index_url.clone(),
            timing: config.timing.clone(),
            image_source: config.image.source,
            phase: Phase::AtIndex,
            sub_indices: HashMap::new(),
        }
    }

    /// Run every extracted image through `recognizer` and attach the parsed record.
    pub fn with_recognizer(mut self, recognizer: &'a dyn TextRecognizer) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    #[cfg(test)]
    pub fn with_locators(mut self, locators: &'a dyn LocatorStrategy) -> Self {
        self.locators = locators;
        self
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!("{:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        info!("Opening index page: {}", self.index_url);
        self.browser
            .navigate(&self.index_url)
            .await
            .context("Failed to load index page")?;
        tokio::time::sleep(self.timing.initial_settle()).await;

        let total = self
            .browser
            .wait_for_all(self.locators.selector(Role::IndexCell), self.timing.wait())
            .await
            .context("No entry cells found on index page")?
            .len();
        self.enter(Phase::AtIndex);
        info!("Found {} entry cells", total);

        let mut summary = RunSummary {
            discovered: total,
            ..Default::default()
        };

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} (eta {eta})")?
                .progress_chars("=> "),
        );

        for i in 0..total {
            let pos = i + 1;
            match self.process_entry(i).await {
                Ok(Outcome::Saved { name, stored }) => match stored {
                    Stored::Image(path) => {
                        summary.saved += 1;
                        pb.println(format!("[{pos}/{total}] saved: {}", path.display()));
                    }
                    Stored::Placeholder(path) => {
                        summary.placeholders += 1;
                        pb.println(format!(
                            "[{pos}/{total}] no image, marker saved: {}",
                            path.display()
                        ));
                    }
                    Stored::Row => {
                        summary.saved += 1;
                        pb.println(format!("[{pos}/{total}] recorded: {name}"));
                    }
                },
                Ok(Outcome::NoLinks) => {
                    summary.skipped += 1;
                    pb.println(format!("[{pos}/{total}] skipped: no link in cell"));
                }
                Ok(Outcome::AlreadyDone(name)) => {
                    summary.skipped += 1;
                    pb.println(format!("[{pos}/{total}] skipped, already saved: {name}"));
                }
                Err(e) => {
                    self.enter(Phase::Recovering);
                    summary.failed += 1;
                    warn!("Entry {}/{} failed: {:#}", pos, total, e);
                    pb.println(format!("[{pos}/{total}] failed: {e}"));
                }
            }

            self.finalize_entry().await;
            pb.inc(1);
        }

        pb.finish_and_clear();
        self.sink.finish().context("Failed to flush output")?;

        info!(
            "Processed {} of {} entries ({} saved, {} markers, {} skipped, {} failed)",
            summary.processed(),
            summary.discovered,
            summary.saved,
            summary.placeholders,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }

    async fn process_entry(&mut self, i: usize) -> Result<Outcome> {
        self.ensure_at_index().await?;
        self.enter(Phase::ProcessingEntry);

        let wait = self.timing.wait();
        let cells = self
            .browser
            .wait_for_all(self.locators.selector(Role::IndexCell), wait)
            .await
            .context("Index cells did not reappear")?;
        let cell = cells.get(i).ok_or_else(|| {
            anyhow!(
                "index changed: entry {} requested but only {} cells present",
                i + 1,
                cells.len()
            )
        })?;

        let category = self
            .browser
            .row_label(cell)
            .await?
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| NO_CATEGORY.to_string());

        let links = self
            .browser
            .find_within(cell, self.locators.selector(Role::CellLink))
            .await?;
        let mut candidates = Vec::with_capacity(links.len());
        for link in links {
            let label = self.browser.text(&link).await?;
            candidates.push(Candidate::new(label, link));
        }
        let Some(chosen) = select::representative(candidates) else {
            return Ok(Outcome::NoLinks);
        };

        let description = chosen.label.replace('\n', " ");
        let sub_index = self.next_sub_index(&category);

        self.browser.wait_for_clickable(&chosen.handle, wait).await?;
        self.browser.click(&chosen.handle).await?;
        self.enter(Phase::AtDetail);

        let error_code = match self.read_title(wait).await {
            Ok(code) if !code.is_empty() => Some(code),
            Ok(_) => {
                warn!("Empty title on detail page for entry {}, using NOCODE", i + 1);
                None
            }
            Err(e) => {
                warn!("No error code on detail page for entry {} ({}), using NOCODE", i + 1, e);
                None
            }
        };

        let name = BaseName::new(error_code.as_deref(), &category, &description);
        let key = name.to_string();
        if self.sink.is_done(&key) {
            return Ok(Outcome::AlreadyDone(key));
        }

        let image = detail::extract_image(
            self.browser,
            self.fetcher,
            self.locators.selector(Role::DetailImage),
            self.image_source,
            wait,
        )
        .await?;

        let (raw_text, manual) = match self.recognizer {
            Some(r) => {
                let raw = match image.bytes() {
                    Some(bytes) => Some(r.recognize(bytes)?.join("\n")),
                    None => None,
                };
                let manual = parser::parse(raw.as_deref().unwrap_or(""));
                (raw, Some(manual))
            }
            None => (None, None),
        };

        let record = DetailRecord {
            error_code,
            description: name.description.clone(),
            image,
            raw_text,
        };
        debug!(
            "Entry {}: code={:?} description={:?} image={} text_lines={}",
            i + 1,
            record.error_code,
            record.description,
            record.image.bytes().is_some(),
            record.raw_text.as_deref().map_or(0, |t| t.lines().count())
        );

        let stored = self.sink.store(Harvest {
            category,
            sub_index,
            name,
            detail: record,
            manual,
        })?;
        Ok(Outcome::Saved { name: key, stored })
    }

    async fn read_title(&self, wait: Duration) -> Result<String> {
        let el = self
            .browser
            .wait_for_visible(self.locators.selector(Role::Title), wait)
            .await?;
        let text = self.browser.text(&el).await?;
        Ok(text.trim().to_string())
    }

    fn next_sub_index(&mut self, category: &str) -> usize {
        let n = self.sub_indices.entry(category.to_string()).or_insert(0);
        *n += 1;
        *n
    }

    async fn is_at_index(&self) -> Result<bool> {
        let url = self.browser.current_url().await?;
        Ok(same_page(&url, &self.index_url))
    }

    async fn ensure_at_index(&mut self) -> Result<()> {
        if !self.is_at_index().await? {
            debug!("Not on index page, reloading {}", self.index_url);
            self.browser.navigate(&self.index_url).await?;
            tokio::time::sleep(self.timing.reload_settle()).await;
        }
        self.enter(Phase::AtIndex);
        Ok(())
    }

    /// Always runs after an entry, whatever its outcome: step back to the
    /// index if needed, then pause for a random interval.
    async fn finalize_entry(&mut self) {
        match self.is_at_index().await {
            Ok(true) => {}
            Ok(false) => {
                if let Err(e) = self.browser.go_back().await {
                    warn!("Failed to navigate back to index: {}", e);
                }
            }
            Err(e) => warn!("Could not read current URL: {:#}", e),
        }
        self.enter(Phase::AtIndex);

        let (min, max) = (self.timing.pacing_min_secs, self.timing.pacing_max_secs);
        let secs = rand::thread_rng().gen_range(min..=max);
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }
}

/// URL equality ignoring a trailing slash and fragment.
fn same_page(a: &str, b: &str) -> bool {
    fn norm(u: &str) -> &str {
        let u = u.split('#').next().unwrap_or(u);
        u.trim_end_matches('/')
    }
    norm(a) == norm(b)
}

// ── Tests ──
