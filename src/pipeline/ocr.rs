//! OCR engine seam and the tesseract command-line implementation.
//!
//! The pipeline only needs "image in, text out". [`OcrEngine`] is that
//! contract; [`TesseractCli`] fulfils it by writing the page image to a
//! temporary PNG and running the `tesseract` binary on it. Tests substitute
//! their own engines.

use crate::config::PipelineConfig;
use crate::error::OcrError;
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::process::Command;
use tracing::debug;

/// One recognition configuration: page-segmentation and engine modes.
///
/// `None` leaves the engine's own default in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Page segmentation mode (`--psm`).
    pub psm: Option<u8>,
    /// OCR engine mode (`--oem`).
    pub oem: Option<u8>,
}

impl OcrConfig {
    /// Engine defaults.
    pub const DEFAULT: Self = Self {
        psm: None,
        oem: None,
    };

    /// Treat the page as a single uniform block of text.
    pub const UNIFORM_BLOCK: Self = Self {
        psm: Some(6),
        oem: None,
    };

    /// LSTM-only recogniser on a uniform block of text.
    pub const LSTM_UNIFORM_BLOCK: Self = Self {
        psm: Some(6),
        oem: Some(1),
    };

    /// The three configurations tried, in order, for a textless page.
    pub fn default_ladder() -> Vec<Self> {
        vec![Self::DEFAULT, Self::UNIFORM_BLOCK, Self::LSTM_UNIFORM_BLOCK]
    }

    /// Command-line flags for tesseract.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(oem) = self.oem {
            args.push("--oem".to_string());
            args.push(oem.to_string());
        }
        if let Some(psm) = self.psm {
            args.push("--psm".to_string());
            args.push(psm.to_string());
        }
        args
    }
}

impl fmt::Display for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self.args();
        if args.is_empty() {
            f.write_str("default")
        } else {
            f.write_str(&args.join(" "))
        }
    }
}

/// Recognises text in a rasterised page.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Return whatever text the engine finds; an empty string is a valid answer.
    async fn recognize(&self, image: &DynamicImage, config: &OcrConfig) -> Result<String, OcrError>;
}

/// Runs the `tesseract` binary.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    command: String,
    lang: String,
}

impl TesseractCli {
    pub fn new(command: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            lang: lang.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.tesseract_cmd.clone(), config.ocr_lang.clone())
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    async fn recognize(&self, image: &DynamicImage, config: &OcrConfig) -> Result<String, OcrError> {
        let png = tempfile::Builder::new()
            .prefix("orccortex-page-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Image(e.to_string()))?;
        image
            .save_with_format(png.path(), ImageFormat::Png)
            .map_err(|e| OcrError::Image(e.to_string()))?;

        debug!(config = %config, "running tesseract on {}", png.path().display());

        let output = Command::new(&self.command)
            .arg(png.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .args(config.args())
            .output()
            .await
            .map_err(|source| OcrError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
