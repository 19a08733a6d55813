//! Result types produced by stand-alone conversion and the page stream.

use crate::error::PageError;
use crate::pipeline::document::Document;
use crate::pipeline::markdown::EMPTY_PAGE;
use serde::{Deserialize, Serialize};

/// Outcome of structuring one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Text as extracted (text layer or OCR), before classification.
    pub raw_text: String,
    /// Rendered Markdown; empty when `error` is set.
    pub markdown: String,
    /// Set when the page could not be processed.
    pub error: Option<PageError>,
    /// Wall-clock time spent on this page.
    pub duration_ms: u64,
}

impl PageResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Processed, but nothing readable was on the page.
    pub fn is_empty_page(&self) -> bool {
        self.error.is_none() && self.markdown == EMPTY_PAGE
    }
}

/// Everything [`crate::convert::convert`] returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// All successful pages merged into one document.
    pub markdown: String,
    /// Per-page results, sorted by page number.
    pub pages: Vec<PageResult>,
    pub document: Document,
    pub stats: ConversionStats,
}

/// Counters for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_pages: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    /// Processed pages that rendered as the empty-page sentinel.
    pub empty_pages: usize,
    pub total_duration_ms: u64,
}

impl ConversionStats {
    pub fn from_pages(total_pages: usize, pages: &[PageResult], total_duration_ms: u64) -> Self {
        Self {
            total_pages,
            processed_pages: pages.iter().filter(|p| p.is_success()).count(),
            failed_pages: pages.iter().filter(|p| !p.is_success()).count(),
            empty_pages: pages.iter().filter(|p| p.is_empty_page()).count(),
            total_duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: usize, markdown: &str, error: Option<PageError>) -> PageResult {
        PageResult {
            page_num: n,
            raw_text: String::new(),
            markdown: markdown.to_string(),
            error,
            duration_ms: 1,
        }
    }

    #[test]
    fn stats_count_empty_pages_as_processed() {
        let pages = vec![
            page(1, "## Title", None),
            page(2, EMPTY_PAGE, None),
            page(
                3,
                "",
                Some(PageError::Unavailable {
                    page: 3,
                    detail: "broken".into(),
                }),
            ),
        ];
        let stats = ConversionStats::from_pages(3, &pages, 10);
        assert_eq!(stats.processed_pages, 2);
        assert_eq!(stats.empty_pages, 1);
        assert_eq!(stats.failed_pages, 1);
    }
}
