//! Streaming page processing: emit pages as they complete.
//!
//! Both the stand-alone converter and the orchestrator consume this stream.
//! With `concurrency > 1` pages are worked on in parallel and arrive in
//! completion order, so a quick page is never held back by a slow OCR page
//! before it. Sort by `page_num` if order matters.
//!
//! Every page runs in its own Tokio task; a panic there becomes a
//! [`PageError::Internal`] for that page only.

use crate::config::PipelineConfig;
use crate::error::{PageError, PipelineError};
use crate::output::PageResult;
use crate::pipeline::document::{DocumentOpener, PageSource, PdfiumOpener};
use crate::pipeline::extract::PageExtractor;
use crate::pipeline::structure_page;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of page results.
pub type PageStream = Pin<Box<dyn Stream<Item = PageResult> + Send>>;

/// Structure the given pages of an opened document.
///
/// Page failures are carried inside each [`PageResult`]; the stream itself
/// never fails and yields exactly one item per requested page.
pub fn structure_stream(
    source: Arc<dyn PageSource>,
    extractor: PageExtractor,
    pages: Vec<usize>,
    concurrency: usize,
    progress: Option<ProgressCallback>,
) -> PageStream {
    let total_pages = source.page_count();

    let s = stream::iter(pages.into_iter().map(move |page_num| {
        let source = Arc::clone(&source);
        let extractor = extractor.clone();
        let progress = progress.clone();
        async move {
            let start = Instant::now();
            if let Some(ref cb) = progress {
                cb.on_page_start(page_num, total_pages);
            }

            let task = tokio::spawn(async move {
                structure_page(&extractor, source.as_ref(), page_num).await
            });
            let result = match task.await {
                Ok(result) => result,
                Err(e) => Err(PageError::Internal {
                    page: page_num,
                    detail: e.to_string(),
                }),
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(page) => {
                    if let Some(ref cb) = progress {
                        cb.on_page_complete(page_num, total_pages, page.markdown.len());
                    }
                    PageResult {
                        page_num,
                        raw_text: page.raw_text,
                        markdown: page.markdown,
                        error: None,
                        duration_ms,
                    }
                }
                Err(e) => {
                    if let Some(ref cb) = progress {
                        cb.on_page_error(page_num, total_pages, &e.to_string());
                    }
                    PageResult {
                        page_num,
                        raw_text: String::new(),
                        markdown: String::new(),
                        error: Some(e),
                        duration_ms,
                    }
                }
            }
        }
    }))
    .buffer_unordered(concurrency.max(1));

    Box::pin(s)
}

/// Open a PDF with pdfium and stream every page through the pipeline.
///
/// # Returns
/// - `Ok(PageStream)`: one [`PageResult`] per page, in completion order
/// - `Err(PipelineError)`: the document could not be opened
pub async fn convert_stream(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<PageStream, PipelineError> {
    let path = path.as_ref();
    info!("Starting streaming conversion: {}", path.display());

    let opener = PdfiumOpener::new(config.pdfium_dir.clone());
    let source = opener.open(path).await?;
    let pages: Vec<usize> = (1..=source.page_count()).collect();

    Ok(structure_stream(
        source,
        PageExtractor::from_config(config),
        pages,
        config.concurrency,
        config.progress_callback.clone(),
    ))
}
