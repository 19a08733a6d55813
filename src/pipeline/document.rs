//! Opening PDFs and reading individual pages through pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and must not run on Tokio worker threads. Every pdfium call here is
//! moved onto the blocking pool, and each call binds and loads the document
//! afresh so no pdfium handle ever crosses an `.await`.
//!
//! The rest of the pipeline talks to [`DocumentOpener`] and [`PageSource`],
//! never to pdfium directly, so the orchestrator can be driven by in-memory
//! fakes in tests.

use crate::error::{PageError, PipelineError};
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An uploaded file waiting to be, or being, processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Local path of the staged file.
    pub path: PathBuf,
    /// Name the file was uploaded with.
    pub original_filename: String,
    /// Number of pages seen when the upload was accepted.
    pub page_count: usize,
}

/// Read access to the pages of one opened document.
///
/// Page numbers are 1-based throughout.
#[async_trait]
pub trait PageSource: Send + Sync {
    fn page_count(&self) -> usize;

    /// The embedded text layer of a page; empty for scanned pages.
    async fn text_layer(&self, page: usize) -> Result<String, PageError>;

    /// Render a page to an image, scaled by `scale` from its natural size.
    async fn rasterize(&self, page: usize, scale: f32) -> Result<DynamicImage, PageError>;
}

/// Opens a document for reading.
#[async_trait]
pub trait DocumentOpener: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn PageSource>, PipelineError>;
}

/// Verify that `path` exists, is readable and starts with the `%PDF` magic.
pub fn check_pdf(path: &Path) -> Result<(), PipelineError> {
    if !path.exists() {
        return Err(PipelineError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(PipelineError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PipelineError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(PipelineError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    Ok(())
}

/// Bind to pdfium, preferring an explicit library directory.
pub fn bind_pdfium(pdfium_dir: Option<&Path>) -> Result<Pdfium, PipelineError> {
    let bindings = match pdfium_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
            &*dir.to_string_lossy(),
        )),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| PipelineError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// [`DocumentOpener`] backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumOpener {
    pdfium_dir: Option<PathBuf>,
}

impl PdfiumOpener {
    pub fn new(pdfium_dir: Option<PathBuf>) -> Self {
        Self { pdfium_dir }
    }
}

#[async_trait]
impl DocumentOpener for PdfiumOpener {
    async fn open(&self, path: &Path) -> Result<Arc<dyn PageSource>, PipelineError> {
        check_pdf(path)?;

        let path = path.to_path_buf();
        let pdfium_dir = self.pdfium_dir.clone();

        let page_count = {
            let path = path.clone();
            let pdfium_dir = pdfium_dir.clone();
            tokio::task::spawn_blocking(move || count_pages_blocking(&path, pdfium_dir.as_deref()))
                .await
                .map_err(|e| PipelineError::Internal(format!("Open task panicked: {}", e)))??
        };
        info!("PDF loaded: {} ({} pages)", path.display(), page_count);

        Ok(Arc::new(PdfiumDocument {
            path,
            pdfium_dir,
            page_count,
        }))
    }
}

fn count_pages_blocking(path: &Path, pdfium_dir: Option<&Path>) -> Result<usize, PipelineError> {
    let pdfium = bind_pdfium(pdfium_dir)?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| PipelineError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{:?}", e),
        })?;
    Ok(document.pages().len() as usize)
}

/// A PDF on disk, re-opened by every blocking call.
struct PdfiumDocument {
    path: PathBuf,
    pdfium_dir: Option<PathBuf>,
    page_count: usize,
}

impl PdfiumDocument {
    /// Run `f` against the requested page on the blocking pool.
    async fn with_page<T, F>(&self, page: usize, f: F) -> Result<T, PageError>
    where
        T: Send + 'static,
        F: FnOnce(&PdfPage) -> Result<T, PageError> + Send + 'static,
    {
        if page == 0 || page > self.page_count {
            return Err(PageError::OutOfRange {
                page,
                total: self.page_count,
            });
        }

        let path = self.path.clone();
        let pdfium_dir = self.pdfium_dir.clone();

        tokio::task::spawn_blocking(move || {
            let unavailable = |detail: String| PageError::Unavailable { page, detail };

            let pdfium = bind_pdfium(pdfium_dir.as_deref()).map_err(|e| unavailable(e.to_string()))?;
            let document = pdfium
                .load_pdf_from_file(&path, None)
                .map_err(|e| unavailable(format!("{:?}", e)))?;
            let pages = document.pages();
            let pdf_page = pages
                .get((page - 1) as u16)
                .map_err(|e| unavailable(format!("{:?}", e)))?;
            f(&pdf_page)
        })
        .await
        .map_err(|e| PageError::Internal {
            page,
            detail: format!("page task panicked: {}", e),
        })?
    }
}

#[async_trait]
impl PageSource for PdfiumDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    async fn text_layer(&self, page: usize) -> Result<String, PageError> {
        self.with_page(page, move |pdf_page| match pdf_page.text() {
            Ok(text) => Ok(text.all()),
            Err(e) => {
                // Unreadable text layer is treated like a scanned page.
                warn!("Page {}: text layer unreadable: {:?}", page, e);
                Ok(String::new())
            }
        })
        .await
    }

    async fn rasterize(&self, page: usize, scale: f32) -> Result<DynamicImage, PageError> {
        self.with_page(page, move |pdf_page| {
            let config = PdfRenderConfig::new().scale_page_by_factor(scale);
            let bitmap = pdf_page
                .render_with_config(&config)
                .map_err(|e| PageError::Unavailable {
                    page,
                    detail: format!("rasterisation failed: {:?}", e),
                })?;
            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                page,
                image.width(),
                image.height()
            );
            Ok(image)
        })
        .await
    }
}
