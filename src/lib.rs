//! # orccortex
//!
//! Turn uploaded PDF math worksheets into structured Markdown, one problem
//! record per page.
//!
//! ## Why this crate?
//!
//! Worksheets arrive as a mix of born-digital PDFs and phone scans. Plain
//! text extraction loses the shape of the sheet: which line is a section
//! title, which is problem `3)`, which is an equation. This crate reads the
//! text layer when there is one, falls back to tesseract OCR when there is
//! not, and classifies every line so the Markdown keeps that structure.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Accept    validate, stage <uuid>.pdf, blob upload, create records
//!  ├─ 2. Open      count pages via pdfium (spawn_blocking)
//!  ├─ 3. Extract   text layer, else rasterise + OCR ladder
//!  ├─ 4. Classify  header / numbered / lettered / math / list / prose
//!  ├─ 5. Render    Markdown per page, blank runs collapsed
//!  └─ 6. Commit    each page's record as soon as it finishes
//! ```
//!
//! Empty pages complete with the `*(Empty page)*` sentinel. Page failures
//! stay on their own record; only a document that cannot be opened fails
//! every page.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use orccortex::{convert, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let output = convert("worksheet.pdf", &config).await?;
//!     println!("{}", output.markdown);
//!     Ok(())
//! }
//! ```
//!
//! For the upload path with persistence see [`UploadService`]; records are
//! managed afterwards through [`problems`](mod@problems) and [`preview`](mod@preview).
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `orccortex` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! orccortex = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cleanup;
pub mod config;
pub mod convert;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod preview;
pub mod problems;
pub mod progress;
pub mod sink;
pub mod store;
pub mod stream;
pub mod upload;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, ProcessingMode};
pub use convert::{convert, convert_from_bytes, convert_sync, convert_to_file, convert_with, inspect};
pub use error::{OcrError, PageError, PipelineError};
pub use job::{JobStatus, PageJob, ProcessingReport};
pub use orchestrator::Orchestrator;
pub use output::{ConversionOutput, ConversionStats, PageResult};
pub use pipeline::classify::{classify, extract_math_expressions, ClassifiedLine, LineKind};
pub use pipeline::document::{Document, DocumentOpener, PageSource, PdfiumOpener};
pub use pipeline::extract::PageExtractor;
pub use pipeline::markdown::{assemble_document, render, structure_text, EMPTY_PAGE};
pub use pipeline::ocr::{OcrConfig, OcrEngine, TesseractCli};
pub use preview::{preview, preview_many, user_stats, ProblemPreview, UserStats};
pub use problems::{
    delete_problem, get_problem, list_problems, problem_file, search_problems, update_problem,
    DeleteReceipt, EditReceipt, ProblemEdit,
};
pub use progress::{NoopProgress, PageProgress, ProgressCallback};
pub use sink::ResultSink;
pub use store::{
    BlobStore, DocumentStore, InMemoryDocumentStore, LocalBlobStore, ProblemRecord, ProblemStatus,
    ProblemUpdate, UnconfiguredBlobStore, BLOB_PREFIX,
};
pub use stream::{convert_stream, structure_stream, PageStream};
pub use upload::{UploadHandle, UploadReceipt, UploadService};
