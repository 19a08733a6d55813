//! Error types for the orccortex library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`PipelineError`]: **Fatal** for the operation at hand. The upload is
//!   invalid, the PDF cannot be opened, the record does not exist. Returned as
//!   `Err(PipelineError)` from the top-level entry points.
//!
//! * [`PageError`]: **Non-fatal**. A single page failed but its siblings are
//!   fine. Stored on the page's [`crate::job::PageJob`] and written to its
//!   problem record, never propagated to other pages.
//!
//! * [`OcrError`]: raised by an [`crate::pipeline::ocr::OcrEngine`]. The page
//!   extractor downgrades it to "no text", so it never reaches a caller.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the orccortex library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}' (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The upload request itself is unacceptable (missing name, wrong type, too large).
    #[error("Validation failed: {0}")]
    Validation(String),

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set ORCCORTEX_PDFIUM_DIR to the directory containing libpdfium, \
or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Record errors ─────────────────────────────────────────────────────
    /// No problem record exists with this id.
    #[error("Problem '{id}' not found")]
    NotFound { id: String },

    /// The caller does not own the record.
    #[error("Access denied to problem '{id}'")]
    AccessDenied { id: String },

    /// The document store rejected a write that cannot be degraded.
    #[error("Document store error: {0}")]
    Store(String),

    /// The blob store failed.
    #[error("Blob store error: {0}")]
    Blob(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// Failed to write Markdown to the output path.
    #[error("Failed to write output to '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// HTTP status an outer API layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::Validation(_) | PipelineError::InvalidConfig(_) => 400,
            PipelineError::AccessDenied { .. } => 403,
            PipelineError::NotFound { .. } | PipelineError::FileNotFound { .. } => 404,
            PipelineError::NotAPdf { .. } | PipelineError::CorruptPdf { .. } => 422,
            _ => 500,
        }
    }
}

/// A non-fatal error for a single page.
///
/// Stored on the page's job and persisted as the record's error detail.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The page object could not be loaded from the opened document.
    #[error("Page {page}: could not be loaded: {detail}")]
    Unavailable { page: usize, detail: String },

    /// The job refers to a page the document does not have.
    #[error("Page {page} is out of range (document has {total} pages)")]
    OutOfRange { page: usize, total: usize },

    /// The document could not be opened; every pending page carries this.
    #[error("Document processing failed: {detail}")]
    Orchestration { detail: String },

    /// The result could not be written to the document store.
    #[error("Page {page}: failed to persist result: {detail}")]
    Persistence { page: usize, detail: String },

    /// A processing task panicked or was aborted.
    #[error("Page {page}: internal error: {detail}")]
    Internal { page: usize, detail: String },
}

/// Errors raised by an OCR engine.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The engine binary could not be started.
    #[error("failed to run OCR engine '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine ran but reported failure.
    #[error("OCR engine exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    /// The page image could not be handed to the engine.
    #[error("could not prepare page image: {0}")]
    Image(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let e = PipelineError::Validation("Only PDF files are allowed".into());
        assert_eq!(e.status_code(), 400);
        assert!(e.to_string().contains("Only PDF"));
    }

    #[test]
    fn not_found_and_access_denied_codes() {
        assert_eq!(PipelineError::NotFound { id: "p1".into() }.status_code(), 404);
        assert_eq!(
            PipelineError::AccessDenied { id: "p1".into() }.status_code(),
            403
        );
    }

    #[test]
    fn corrupt_pdf_is_unprocessable() {
        let e = PipelineError::CorruptPdf {
            path: PathBuf::from("/tmp/x.pdf"),
            detail: "bad xref".into(),
        };
        assert_eq!(e.status_code(), 422);
        assert!(e.to_string().contains("bad xref"));
    }

    #[test]
    fn orchestration_page_error_display() {
        let e = PageError::Orchestration {
            detail: "cannot open".into(),
        };
        assert!(e.to_string().contains("cannot open"));
    }

    #[test]
    fn page_error_roundtrips_through_json() {
        let e = PageError::Persistence {
            page: 4,
            detail: "timeout".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: PageError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
