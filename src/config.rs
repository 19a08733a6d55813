//! Configuration types for the structuring pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. The same struct is shared by the upload
//! service, the orchestrator and the stand-alone [`crate::convert`] entry
//! points, so a CLI run and a background job behave identically.

use crate::error::PipelineError;
use crate::pipeline::ocr::OcrConfig;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for PDF structuring.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use orccortex::{PipelineConfig, ProcessingMode};
///
/// let config = PipelineConfig::builder()
///     .mode(ProcessingMode::SingleDocument)
///     .concurrency(4)
///     .ocr_lang("eng")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Zoom factor applied when rasterising a page for OCR. Range: 1.0–4.0. Default: 2.0.
    ///
    /// Pages are rendered at their natural size times this factor; tesseract
    /// recognises small print noticeably better at 2×.
    pub render_scale: f32,

    /// Tesseract language code(s), e.g. `eng` or `eng+deu`. Default: `eng`.
    pub ocr_lang: String,

    /// Command used to invoke tesseract. Default: `tesseract`.
    pub tesseract_cmd: String,

    /// OCR configurations tried in order until one yields text.
    pub ocr_ladder: Vec<OcrConfig>,

    /// Number of pages processed at once within one document. Default: 1.
    pub concurrency: usize,

    /// Whether pages become independent problems or one merged document.
    pub mode: ProcessingMode,

    /// Directory where uploads are staged before processing. Default: `uploads`.
    pub upload_dir: PathBuf,

    /// Largest accepted upload in bytes. Default: 10 MiB.
    pub max_file_size: u64,

    /// Accepted filename extensions, lowercase with leading dot.
    pub allowed_extensions: Vec<String>,

    /// Directory containing the pdfium shared library, if not system-wide.
    pub pdfium_dir: Option<PathBuf>,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            render_scale: 2.0,
            ocr_lang: "eng".to_string(),
            tesseract_cmd: "tesseract".to_string(),
            ocr_ladder: OcrConfig::default_ladder(),
            concurrency: 1,
            mode: ProcessingMode::default(),
            upload_dir: PathBuf::from("uploads"),
            max_file_size: 10 * 1024 * 1024,
            allowed_extensions: vec![".pdf".to_string()],
            pdfium_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("render_scale", &self.render_scale)
            .field("ocr_lang", &self.ocr_lang)
            .field("tesseract_cmd", &self.tesseract_cmd)
            .field("ocr_ladder", &self.ocr_ladder)
            .field("concurrency", &self.concurrency)
            .field("mode", &self.mode)
            .field("upload_dir", &self.upload_dir)
            .field("max_file_size", &self.max_file_size)
            .field("pdfium_dir", &self.pdfium_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// True when `filename` ends with one of the allowed extensions.
    pub fn accepts_extension(&self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        self.allowed_extensions.iter().any(|ext| lower.ends_with(ext))
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(1.0, 4.0);
        self
    }

    pub fn ocr_lang(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_lang = lang.into();
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.config.tesseract_cmd = cmd.into();
        self
    }

    pub fn ocr_ladder(mut self, ladder: Vec<OcrConfig>) -> Self {
        self.config.ocr_ladder = ladder;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn mode(mut self, mode: ProcessingMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn allowed_extensions(mut self, exts: Vec<String>) -> Self {
        self.config.allowed_extensions = exts.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    pub fn pdfium_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.ocr_ladder.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "OCR ladder needs at least one configuration".into(),
            ));
        }
        if c.ocr_lang.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("OCR language is empty".into()));
        }
        if c.max_file_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "Max file size must be ≥ 1 byte".into(),
            ));
        }
        if c.allowed_extensions.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "At least one file extension must be allowed".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the pages of one upload are turned into problem records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Every page becomes its own problem record. (default)
    #[default]
    MultiProblem,
    /// All pages are merged into one Markdown document and one record.
    SingleDocument,
}
