//! Run configuration.
//!
//! Sources, lowest to highest precedence:
//! 1. Built-in defaults
//! 2. `errcode_crawler.toml` (or the file given with `--config`)
//! 3. `ERRCRAWL_*` environment variables, `__` separating nested keys
//!    (`ERRCRAWL_TIMING__WAIT_SECS=30` -> `timing.wait_secs`)
//!
//! CLI flags are applied on top by `main`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "errcode_crawler.toml";
const ENV_PREFIX: &str = "ERRCRAWL_";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub index_url: String,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub locators: Locators,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Directory for per-entry `.png` / `.txt` files.
    pub dir: PathBuf,
    /// Path of the tabular export written by `export`.
    pub workbook: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("downloads"),
            workbook: PathBuf::from("downloads/manual.csv"),
        }
    }
}

/// Logical page roles the crawler looks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// A table cell on the index page that holds at least one entry link.
    IndexCell,
    /// A clickable link inside an index cell.
    CellLink,
    /// The image on a detail page.
    DetailImage,
    /// The element whose text is the entry's error code.
    Title,
}

/// Maps page roles to lookup expressions, so the traversal never hardcodes
/// markup details.
pub trait LocatorStrategy {
    fn selector(&self, role: Role) -> &str;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Locators {
    pub index_cell: String,
    pub cell_link: String,
    pub detail_image: String,
    pub title: String,
}

impl Default for Locators {
    fn default() -> Self {
        Self {
            index_cell: "td:has(a.notion-link-token)".into(),
            cell_link: "a.notion-link-token.notion-enable-hover".into(),
            detail_image: "img.css-l68de9.e5kxa4l0".into(),
            title: "h1.page-title".into(),
        }
    }
}

impl LocatorStrategy for Locators {
    fn selector(&self, role: Role) -> &str {
        match role {
            Role::IndexCell => &self.index_cell,
            Role::CellLink => &self.cell_link,
            Role::DetailImage => &self.detail_image,
            Role::Title => &self.title,
        }
    }
}

/// All values in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Timing {
    pub wait_secs: f64,
    pub initial_settle_secs: f64,
    pub reload_settle_secs: f64,
    pub pacing_min_secs: f64,
    pub pacing_max_secs: f64,
    pub fetch_timeout_secs: f64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            wait_secs: 20.0,
            initial_settle_secs: 5.0,
            reload_settle_secs: 3.0,
            pacing_min_secs: 1.5,
            pacing_max_secs: 3.5,
            fetch_timeout_secs: 10.0,
        }
    }
}

impl Timing {
    pub fn wait(&self) -> Duration {
        Duration::from_secs_f64(self.wait_secs)
    }

    pub fn initial_settle(&self) -> Duration {
        Duration::from_secs_f64(self.initial_settle_secs)
    }

    pub fn reload_settle(&self) -> Duration {
        Duration::from_secs_f64(self.reload_settle_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    /// Read the image's `src` and download it.
    #[default]
    Url,
    /// Capture the rendered element's pixels.
    Screenshot,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub source: ImageSource,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub headless: bool,
    #[serde(default)]
    pub executable: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OcrConfig {
    pub program: String,
    /// `{image}` is replaced by the path of the image being recognized.
    pub args: Vec<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            program: "tesseract".into(),
            args: vec![
                "{image}".into(),
                "stdout".into(),
                "-l".into(),
                "kor+eng".into(),
            ],
        }
    }
}

impl Config {
    pub fn figment(path: Option<&Path>) -> Figment {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path
            && !p.exists()
        {
            bail!("config file not found: {}", p.display());
        }
        let config: Config = Self::figment(path).extract()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.index_url.trim().is_empty() {
            bail!("index_url is not set (config file, ERRCRAWL_INDEX_URL or --index-url)");
        }
        let t = &self.timing;
        for (name, v) in [
            ("wait_secs", t.wait_secs),
            ("initial_settle_secs", t.initial_settle_secs),
            ("reload_settle_secs", t.reload_settle_secs),
            ("pacing_min_secs", t.pacing_min_secs),
            ("pacing_max_secs", t.pacing_max_secs),
            ("fetch_timeout_secs", t.fetch_timeout_secs),
        ] {
            if !v.is_finite() || v < 0.0 {
                bail!("timing.{} must be a non-negative number, got {}", name, v);
            }
        }
        if t.pacing_min_secs > t.pacing_max_secs {
            bail!(
                "timing.pacing_min_secs ({}) exceeds timing.pacing_max_secs ({})",
                t.pacing_min_secs,
                t.pacing_max_secs
            );
        }
        for role in [Role::IndexCell, Role::CellLink, Role::DetailImage, Role::Title] {
            if self.locators.selector(role).trim().is_empty() {
                bail!("locator for {:?} is empty", role);
            }
        }
        Ok(())
    }
}

// ── Tests ──
