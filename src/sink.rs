use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::detail::{DetailImage, DetailRecord};
use crate::naming::BaseName;
use crate::parser::ManualRecord;

/// One finished entry handed over by the crawler.
#[derive(Debug, Clone)]
pub struct Harvest {
    pub category: String,
    pub sub_index: usize,
    pub name: BaseName,
    pub detail: DetailRecord,
    pub manual: Option<ManualRecord>,
}

/// Where a stored entry ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stored {
    Image(PathBuf),
    Placeholder(PathBuf),
    Row,
}

pub trait Sink {
    /// Whether output for `name` already exists; such entries are skipped
    /// before any fetch or OCR.
    fn is_done(&self, name: &str) -> bool;
    fn store(&mut self, item: Harvest) -> Result<Stored>;
    /// Flush anything buffered. Called once at the end of a run.
    fn finish(&mut self) -> Result<()>;
}

// ── Per-file output ──

/// Writes `{name}.png` per entry, or an empty `{name}.txt` when the detail
/// page had no image.
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn png_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.png"))
    }

    fn txt_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.txt"))
    }
}

impl Sink for FileSink {
    fn is_done(&self, name: &str) -> bool {
        self.png_path(name).exists() || self.txt_path(name).exists()
    }

    fn store(&mut self, item: Harvest) -> Result<Stored> {
        let name = item.name.to_string();
        match &item.detail.image {
            DetailImage::Image(bytes) => {
                let path = self.png_path(&name);
                fs::write(&path, bytes)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                Ok(Stored::Image(path))
            }
            DetailImage::NoImage => {
                let path = self.txt_path(&name);
                fs::File::create(&path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                Ok(Stored::Placeholder(path))
            }
        }
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

// ── Workbook output ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkbookRow {
    pub category: String,
    pub sub_index: usize,
    pub error_code: String,
    pub description: String,
    pub flag: String,
    pub drawing_code: String,
    pub markup: String,
}

impl WorkbookRow {
    fn from_harvest(item: Harvest) -> Self {
        let manual = item.manual.unwrap_or_else(ManualRecord::no_ocr_result);
        Self {
            category: item.category,
            sub_index: item.sub_index,
            error_code: item.name.code,
            description: item.name.description,
            markup: manual.markup_html(),
            flag: manual.flag,
            drawing_code: manual.drawing_code,
        }
    }

    fn name(&self) -> String {
        BaseName::new(Some(&self.error_code), &self.category, &self.description).to_string()
    }
}

/// Collects one row per entry and writes a single CSV export in `finish`.
///
/// Rows from an earlier export at the same path are loaded on open and kept,
/// and their names count as done.
pub struct WorkbookSink {
    path: PathBuf,
    rows: Vec<WorkbookRow>,
    names: HashSet<String>,
}

impl WorkbookSink {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let rows = if path.exists() {
            read_rows(&path)?
        } else {
            Vec::new()
        };
        if !rows.is_empty() {
            info!("Loaded {} rows from existing export {}", rows.len(), path.display());
        }
        let names = rows.iter().map(WorkbookRow::name).collect();
        Ok(Self { path, rows, names })
    }

    pub fn rows(&self) -> &[WorkbookRow] {
        &self.rows
    }
}

fn read_rows(path: &Path) -> Result<Vec<WorkbookRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open existing export {}", path.display()))?;
    let mut rows = Vec::new();
    for row in reader.deserialize::<WorkbookRow>() {
        rows.push(row.with_context(|| format!("Malformed row in {}", path.display()))?);
    }
    Ok(rows)
}

impl Sink for WorkbookSink {
    fn is_done(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    fn store(&mut self, item: Harvest) -> Result<Stored> {
        let row = WorkbookRow::from_harvest(item);
        self.names.insert(row.name());
        self.rows.push(row);
        Ok(Stored::Row)
    }

    fn finish(&mut self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create export dir {}", dir.display()))?;

        // Write next to the target and rename so a failed flush never leaves
        // a truncated export behind.
        let staged = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let mut writer = csv::Writer::from_writer(staged.as_file());
            for row in &self.rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        staged
            .persist(&self.path)
            .with_context(|| format!("Failed to write export {}", self.path.display()))?;

        info!("Wrote {} rows to {}", self.rows.len(), self.path.display());
        Ok(())
    }
}

// ── Tests ──
