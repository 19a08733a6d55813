//! Stand-alone conversion: a PDF on disk to Markdown, with no records.
//!
//! This is the path the CLI takes. Pages go through the same stream the
//! orchestrator uses, are collected and sorted, and the successful ones are
//! merged with [`assemble_document`]. Use [`crate::stream::convert_stream`]
//! instead to receive pages as they finish.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::output::{ConversionOutput, ConversionStats, PageResult};
use crate::pipeline::document::{Document, DocumentOpener, PdfiumOpener};
use crate::pipeline::extract::PageExtractor;
use crate::pipeline::markdown::assemble_document;
use crate::stream::structure_stream;
use futures::StreamExt;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Convert a PDF file to Markdown using pdfium and tesseract.
///
/// # Returns
/// `Ok(ConversionOutput)` even if some pages failed
/// (check `output.stats.failed_pages`).
///
/// # Errors
/// Only when the document cannot be opened at all.
pub async fn convert(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<ConversionOutput, PipelineError> {
    let opener = PdfiumOpener::new(config.pdfium_dir.clone());
    let extractor = PageExtractor::from_config(config);
    convert_with(&opener, extractor, path, config).await
}

/// [`convert`] with a caller-supplied document backend and extractor.
pub async fn convert_with(
    opener: &dyn DocumentOpener,
    extractor: PageExtractor,
    path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<ConversionOutput, PipelineError> {
    let total_start = Instant::now();
    let path = path.as_ref();
    info!("Starting conversion: {}", path.display());

    let source = opener.open(path).await?;
    let total_pages = source.page_count();
    if let Some(ref cb) = config.progress_callback {
        cb.on_document_start(total_pages);
    }

    let mut pages: Vec<PageResult> = structure_stream(
        source,
        extractor,
        (1..=total_pages).collect(),
        config.concurrency,
        config.progress_callback.clone(),
    )
    .collect()
    .await;
    pages.sort_by_key(|p| p.page_num);

    let successful: Vec<(usize, String)> = pages
        .iter()
        .filter(|p| p.is_success())
        .map(|p| (p.page_num, p.markdown.clone()))
        .collect();
    let markdown = assemble_document(&successful);

    let stats = ConversionStats::from_pages(
        total_pages,
        &pages,
        total_start.elapsed().as_millis() as u64,
    );
    info!(
        "Conversion complete: {}/{} pages, {}ms total",
        stats.processed_pages, total_pages, stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_document_complete(total_pages, stats.processed_pages);
    }

    Ok(ConversionOutput {
        markdown,
        pages,
        document: Document {
            path: path.to_path_buf(),
            original_filename: file_name(path),
            page_count: total_pages,
        },
        stats,
    })
}

/// Convert a PDF and write the merged Markdown to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn convert_to_file(
    path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<ConversionStats, PipelineError> {
    let output = convert(path, config).await?;
    write_atomic(output_path.as_ref(), &output.markdown).await?;
    Ok(output.stats)
}

pub(crate) async fn write_atomic(path: &Path, contents: &str) -> Result<(), PipelineError> {
    let write_err = |e| PipelineError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<ConversionOutput, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(path, config))
}

/// Open a PDF and report its page count without structuring anything.
pub async fn inspect(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<Document, PipelineError> {
    let path = path.as_ref();
    let source = PdfiumOpener::new(config.pdfium_dir.clone())
        .open(path)
        .await?;
    Ok(Document {
        path: path.to_path_buf(),
        original_filename: file_name(path),
        page_count: source.page_count(),
    })
}

/// Convert PDF bytes in memory to Markdown.
///
/// The bytes are written to a managed [`tempfile`] that is deleted on return.
pub async fn convert_from_bytes(
    bytes: &[u8],
    config: &PipelineConfig,
) -> Result<ConversionOutput, PipelineError> {
    let mut tmp = tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| PipelineError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| PipelineError::Internal(format!("tempfile write: {e}")))?;
    // `tmp` is dropped (and the file deleted) when `convert` returns
    convert(tmp.path(), config).await
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
