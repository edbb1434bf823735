use std::io::Write;
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::OcrConfig;

const IMAGE_PLACEHOLDER: &str = "{image}";

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR program `{program}` is not usable: {reason}")]
    Unavailable { program: String, reason: String },
    #[error("failed to stage image for OCR: {0}")]
    Io(#[from] std::io::Error),
    #[error("OCR program exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Turns a raster image into ordered lines of text.
pub trait TextRecognizer {
    fn recognize(&self, image: &[u8]) -> Result<Vec<String>, OcrError>;
}

/// Runs an external OCR program (tesseract by default) once per image.
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
}

impl CommandRecognizer {
    /// Probes the program with `--version` so a missing install fails at
    /// startup instead of on the first entry.
    pub fn new(config: &OcrConfig) -> Result<Self, OcrError> {
        let probe = Command::new(&config.program).arg("--version").output();
        match probe {
            Ok(out) if out.status.success() => {
                let version = String::from_utf8_lossy(&out.stdout);
                info!(
                    "OCR engine ready: {}",
                    version.lines().next().unwrap_or(&config.program)
                );
            }
            Ok(out) => {
                return Err(OcrError::Unavailable {
                    program: config.program.clone(),
                    reason: format!("--version exited with {}", out.status),
                });
            }
            Err(e) => {
                return Err(OcrError::Unavailable {
                    program: config.program.clone(),
                    reason: e.to_string(),
                });
            }
        }

        Ok(Self {
            program: config.program.clone(),
            args: config.args.clone(),
        })
    }

    fn build_args(&self, image_path: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace(IMAGE_PLACEHOLDER, image_path))
            .collect()
    }
}

impl TextRecognizer for CommandRecognizer {
    fn recognize(&self, image: &[u8]) -> Result<Vec<String>, OcrError> {
        let mut staged = tempfile::Builder::new().suffix(".png").tempfile()?;
        staged.write_all(image)?;
        staged.flush()?;

        let path = staged.path().to_string_lossy().to_string();
        let args = self.build_args(&path);
        debug!("Running {} {:?}", self.program, args);

        let out = Command::new(&self.program).args(&args).output()?;
        if !out.status.success() {
            return Err(OcrError::Failed {
                status: out.status.to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }

        Ok(split_lines(&String::from_utf8_lossy(&out.stdout)))
    }
}

/// Non-blank lines, in order, with trailing whitespace and form feeds removed.
fn split_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|l| l.trim_end_matches(['\u{c}', ' ', '\t', '\r']))
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

// ── Tests ──
