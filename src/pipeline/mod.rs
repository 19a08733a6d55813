//! Pipeline stages for turning one PDF page into Markdown.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the OCR or PDF backend swapped without touching the
//! text heuristics.
//!
//! ## Data Flow
//!
//! ```text
//! document ──▶ extract ──▶ classify ──▶ markdown
//! (pdfium)     (text/OCR)  (line kinds)  (render)
//! ```
//!
//! 1. [`document`]: open the PDF, count pages, read a page's text layer or
//!    rasterise it; runs in `spawn_blocking` because pdfium is not async-safe
//! 2. [`extract`] : text layer first, then the OCR ladder via [`ocr`]
//! 3. [`classify`]: tag every line (header, numbered item, math, ...)
//! 4. [`markdown`]: render tagged lines, collapse blank runs, merge pages

pub mod classify;
pub mod document;
pub mod extract;
pub mod markdown;
pub mod ocr;

use crate::error::PageError;
use document::PageSource;
use extract::PageExtractor;

/// Raw text and Markdown for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredPage {
    pub raw_text: String,
    pub markdown: String,
}

/// Run extract → classify → render for a single page.
pub async fn structure_page(
    extractor: &PageExtractor,
    source: &dyn PageSource,
    page: usize,
) -> Result<StructuredPage, PageError> {
    let raw_text = extractor.extract(source, page).await?;
    let markdown = markdown::structure_text(&raw_text);
    Ok(StructuredPage { raw_text, markdown })
}
