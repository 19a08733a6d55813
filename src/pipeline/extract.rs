//! Page text extraction with OCR fallback.
//!
//! Digital PDFs carry a text layer and need no OCR at all. Scanned pages
//! come back empty, so they are rasterised and handed to the OCR engine,
//! walking a ladder of recognition configurations until one produces text.
//!
//! OCR trouble never fails a page: a rasterisation error, an engine crash or
//! three empty answers all end in an empty string, which the Markdown stage
//! turns into the empty-page sentinel.

use crate::config::PipelineConfig;
use crate::error::PageError;
use crate::pipeline::document::PageSource;
use crate::pipeline::ocr::{OcrConfig, OcrEngine, TesseractCli};
use std::sync::Arc;
use tracing::{debug, warn};

/// Extracts the raw text of one page.
#[derive(Clone)]
pub struct PageExtractor {
    ocr: Arc<dyn OcrEngine>,
    ladder: Vec<OcrConfig>,
    render_scale: f32,
}

impl PageExtractor {
    pub fn new(ocr: Arc<dyn OcrEngine>, ladder: Vec<OcrConfig>, render_scale: f32) -> Self {
        Self {
            ocr,
            ladder,
            render_scale,
        }
    }

    /// Extractor using the tesseract CLI as configured.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            Arc::new(TesseractCli::from_config(config)),
            config.ocr_ladder.clone(),
            config.render_scale,
        )
    }

    /// Raw text of `page` (1-based).
    ///
    /// Only a page that cannot be loaded at all is an error; every OCR
    /// problem degrades to `Ok("")`.
    pub async fn extract(&self, source: &dyn PageSource, page: usize) -> Result<String, PageError> {
        let text = source.text_layer(page).await?;
        if !text.trim().is_empty() {
            debug!("Page {}: {} chars from text layer", page, text.len());
            return Ok(text);
        }

        debug!("Page {}: no text layer, falling back to OCR", page);
        Ok(self.ocr_page(source, page).await)
    }

    async fn ocr_page(&self, source: &dyn PageSource, page: usize) -> String {
        let image = match source.rasterize(page, self.render_scale).await {
            Ok(image) => image,
            Err(e) => {
                warn!("Page {}: OCR page conversion failed: {}", page, e);
                return String::new();
            }
        };

        for config in &self.ladder {
            match self.ocr.recognize(&image, config).await {
                Ok(text) if !text.trim().is_empty() => {
                    debug!("Page {}: OCR ({}) found {} chars", page, config, text.len());
                    return text;
                }
                Ok(_) => debug!("Page {}: OCR ({}) found nothing", page, config),
                Err(e) => {
                    warn!("Page {}: OCR processing warning: {}", page, e);
                    return String::new();
                }
            }
        }

        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcrError;
    use async_trait::async_trait;
    use image::DynamicImage;
    use std::sync::Mutex;

    struct StubPage {
        text: String,
        raster_ok: bool,
    }

    #[async_trait]
    impl PageSource for StubPage {
        fn page_count(&self) -> usize {
            1
        }

        async fn text_layer(&self, _page: usize) -> Result<String, PageError> {
            Ok(self.text.clone())
        }

        async fn rasterize(&self, page: usize, _scale: f32) -> Result<DynamicImage, PageError> {
            if self.raster_ok {
                Ok(DynamicImage::new_rgb8(2, 2))
            } else {
                Err(PageError::Unavailable {
                    page,
                    detail: "no bitmap".into(),
                })
            }
        }
    }

    /// Answers from a script, recording which configs were tried.
    struct ScriptedOcr {
        answers: Mutex<Vec<Result<String, OcrError>>>,
        tried: Mutex<Vec<OcrConfig>>,
    }

    impl ScriptedOcr {
        fn new(answers: Vec<Result<String, OcrError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.into_iter().rev().collect()),
                tried: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl OcrEngine for ScriptedOcr {
        async fn recognize(
            &self,
            _image: &DynamicImage,
            config: &OcrConfig,
        ) -> Result<String, OcrError> {
            self.tried.lock().unwrap().push(*config);
            self.answers
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn extractor(ocr: Arc<ScriptedOcr>) -> PageExtractor {
        PageExtractor::new(ocr, OcrConfig::default_ladder(), 2.0)
    }

    #[tokio::test]
    async fn text_layer_skips_ocr() {
        let ocr = ScriptedOcr::new(vec![]);
        let page = StubPage {
            text: "QUESTION 1".into(),
            raster_ok: true,
        };
        let text = extractor(ocr.clone()).extract(&page, 1).await.unwrap();
        assert_eq!(text, "QUESTION 1");
        assert!(ocr.tried.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ladder_stops_at_first_text() {
        let ocr = ScriptedOcr::new(vec![Ok("  \n".into()), Ok("found it".into())]);
        let page = StubPage {
            text: "   ".into(),
            raster_ok: true,
        };
        let text = extractor(ocr.clone()).extract(&page, 1).await.unwrap();
        assert_eq!(text, "found it");
        assert_eq!(
            *ocr.tried.lock().unwrap(),
            vec![OcrConfig::DEFAULT, OcrConfig::UNIFORM_BLOCK]
        );
    }

    #[tokio::test]
    async fn exhausted_ladder_yields_empty() {
        let ocr = ScriptedOcr::new(vec![]);
        let page = StubPage {
            text: String::new(),
            raster_ok: true,
        };
        let text = extractor(ocr.clone()).extract(&page, 1).await.unwrap();
        assert_eq!(text, "");
        assert_eq!(ocr.tried.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn ocr_error_is_swallowed() {
        let ocr = ScriptedOcr::new(vec![Err(OcrError::Failed {
            status: "exit status: 1".into(),
            stderr: "boom".into(),
        })]);
        let page = StubPage {
            text: String::new(),
            raster_ok: true,
        };
        assert_eq!(extractor(ocr).extract(&page, 1).await.unwrap(), "");
    }

    #[tokio::test]
    async fn rasterisation_error_is_swallowed() {
        let ocr = ScriptedOcr::new(vec![Ok("never used".into())]);
        let page = StubPage {
            text: String::new(),
            raster_ok: false,
        };
        assert_eq!(extractor(ocr.clone()).extract(&page, 1).await.unwrap(), "");
        assert!(ocr.tried.lock().unwrap().is_empty());
    }
}
