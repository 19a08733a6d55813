//! Markdown rendering: turn classified lines into page Markdown.
//!
//! Each [`LineKind`] maps to one fixed Markdown shape. After joining, runs of
//! blank lines are collapsed so a page never contains more than one empty
//! line in a row, and the result is trimmed.

use crate::pipeline::classify::{classify, ClassifiedLine, LineKind};
use once_cell::sync::Lazy;
use regex::Regex;

/// Emitted for a page where neither the text layer nor OCR produced text.
pub const EMPTY_PAGE: &str = "*(Empty page)*";

/// Emitted for a merged document that has no pages at all.
pub const NO_CONTENT: &str = "*(No content found)*";

/// Stored as a failed page's Markdown so readers never see stale content.
pub const FAILED_PAGE: &str = "*(Processing failed)*";

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Render one line according to its category.
pub fn render_line(line: &ClassifiedLine) -> String {
    let text = line.text.as_str();
    match line.kind {
        LineKind::Header => format!("## {text}"),
        LineKind::NumberedItem => format!("### {text}"),
        LineKind::LetteredItem => format!("**{text}**"),
        LineKind::MathToken => format!("`{text}`"),
        LineKind::ListItem => format!("- {text}"),
        LineKind::Prose => text.to_string(),
        LineKind::Blank => String::new(),
    }
}

/// Render a classified page to Markdown.
pub fn render(lines: &[ClassifiedLine]) -> String {
    let joined = lines.iter().map(render_line).collect::<Vec<_>>().join("\n");
    RE_BLANK_RUN.replace_all(&joined, "\n\n").trim().to_string()
}

/// Classify and render raw page text in one step.
///
/// Empty or whitespace-only input yields [`EMPTY_PAGE`].
pub fn structure_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return EMPTY_PAGE.to_string();
    }
    render(&classify(trimmed))
}

/// Merge per-page Markdown into one document.
///
/// With more than one page every page gets a `# Page N` heading and pages
/// are separated by a horizontal rule. A single page is returned as is.
pub fn assemble_document(pages: &[(usize, String)]) -> String {
    if pages.is_empty() {
        return NO_CONTENT.to_string();
    }

    let multi = pages.len() > 1;
    let mut parts: Vec<String> = Vec::with_capacity(pages.len() * 5);

    for (i, (page_num, markdown)) in pages.iter().enumerate() {
        if multi {
            parts.push(format!("# Page {page_num}"));
            parts.push(String::new());
        }
        parts.push(markdown.clone());
        if i + 1 < pages.len() {
            parts.push(String::new());
            parts.push("---".to_string());
            parts.push(String::new());
        }
    }

    parts.join("\n")
}
