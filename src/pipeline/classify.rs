//! Line classification: decide what each line of raw page text *is*.
//!
//! Worksheet PDFs have a predictable shape: a short title, numbered
//! questions, lettered sub-parts, equations, the odd bullet list and running
//! prose. This stage tags every line with one [`LineKind`] so the Markdown
//! stage can render it without re-inspecting the text.
//!
//! ## Rule order
//!
//! Rules are an ordered table of `(kind, matcher)` pairs and the first match
//! wins. Order matters: `"1) Solve x = 2"` is a numbered item even though it
//! also contains an equation, and a short capitalised line followed by
//! content is a header before anything else.
//!
//! The header rule treats any capitalised line without a period as a title.
//! That misfires on some sentences; the behaviour is kept as is so existing
//! records render the same way.
//!
//! Classification is total: every input, including binary garbage from a
//! bad OCR pass, yields a line list (worst case all [`LineKind::Prose`]).

use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Category assigned to one line of page text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    /// Short title-like line followed by content.
    Header,
    /// `1.` / `2)` style question.
    NumberedItem,
    /// `a.` / `b)` style sub-part.
    LetteredItem,
    /// Line containing an equation, operator or formula.
    MathToken,
    /// Bullet or `(i)` style list entry.
    ListItem,
    /// Anything else.
    Prose,
    /// Empty line, kept as a paragraph separator.
    Blank,
}

/// A trimmed line together with its category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedLine {
    pub text: String,
    pub kind: LineKind,
}

impl ClassifiedLine {
    pub fn new(text: impl Into<String>, kind: LineKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

/// What a matcher gets to look at.
struct LineContext<'a> {
    /// The current line, trimmed and non-empty.
    line: &'a str,
    /// The following raw line, if any.
    next: Option<&'a str>,
}

type Matcher = fn(&LineContext<'_>) -> bool;

/// Precedence-ordered rules; lines matching none are [`LineKind::Prose`].
const RULES: &[(LineKind, Matcher)] = &[
    (LineKind::Header, is_header),
    (LineKind::NumberedItem, is_numbered_item),
    (LineKind::LetteredItem, is_lettered_item),
    (LineKind::MathToken, is_math_token),
    (LineKind::ListItem, is_list_item),
];

/// Classify every line of `raw` in order.
///
/// Lines are split on `\n` and trimmed; empty lines become
/// [`LineKind::Blank`] with empty text.
pub fn classify(raw: &str) -> Vec<ClassifiedLine> {
    let lines: Vec<&str> = raw.split('\n').collect();

    lines
        .iter()
        .enumerate()
        .map(|(i, raw_line)| {
            let line = raw_line.trim();
            if line.is_empty() {
                return ClassifiedLine::new(String::new(), LineKind::Blank);
            }

            let ctx = LineContext {
                line,
                next: lines.get(i + 1).copied(),
            };
            let kind = RULES
                .iter()
                .find(|(_, matches)| matches(&ctx))
                .map(|(kind, _)| *kind)
                .unwrap_or(LineKind::Prose);

            ClassifiedLine::new(line, kind)
        })
        .collect()
}

// ── Header ───────────────────────────────────────────────────────────────────

const HEADER_MAX_CHARS: usize = 100;
const HEADER_KEYWORDS: &[&str] = &["question", "problem", "exercise", "part", "section"];

static RE_TITLE_CASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][^.]*[^.]$").unwrap());

fn is_header(ctx: &LineContext<'_>) -> bool {
    let followed_by_content = ctx.next.is_some_and(|next| !next.trim().is_empty());
    if ctx.line.chars().count() >= HEADER_MAX_CHARS || !followed_by_content {
        return false;
    }

    let lower = ctx.line.to_lowercase();
    is_all_uppercase(ctx.line)
        || HEADER_KEYWORDS.iter().any(|kw| lower.contains(kw))
        || RE_TITLE_CASE.is_match(ctx.line)
}

/// At least one cased character and no lowercase ones.
fn is_all_uppercase(line: &str) -> bool {
    let mut cased = false;
    for c in line.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            cased = true;
        }
    }
    cased
}

// ── Numbered / lettered items ────────────────────────────────────────────────

static RE_NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+[.)]\s*").unwrap());
static RE_LETTERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][.)]\s*").unwrap());

fn is_numbered_item(ctx: &LineContext<'_>) -> bool {
    RE_NUMBERED.is_match(ctx.line)
}

fn is_lettered_item(ctx: &LineContext<'_>) -> bool {
    RE_LETTERED.is_match(ctx.line)
}

// ── Math ─────────────────────────────────────────────────────────────────────

static MATH_INDICATORS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)[=<>≤≥≠±∓×÷∏∑∫∂∇]",
        r"(?i)\d+/\d+",
        r"(?i)[a-zA-Z]+\^[a-zA-Z0-9]+",
        r"(?i)√[a-zA-Z0-9]+",
        r"(?i)(sin|cos|tan|log|ln|exp|sqrt)\(",
        r"(?i)\$[^$]+\$",
        r"(?i)[a-zA-Z]\s*=\s*[0-9a-zA-Z\s+\-*/^()]+",
    ])
    .unwrap()
});

/// True when `text` contains anything that looks like mathematics.
pub fn contains_math(text: &str) -> bool {
    MATH_INDICATORS.is_match(text)
}

fn is_math_token(ctx: &LineContext<'_>) -> bool {
    contains_math(ctx.line)
}

// ── Lists ────────────────────────────────────────────────────────────────────

static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-•*]\s*").unwrap());
static RE_PAREN_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\([\p{L}\p{N}_]+\)\s*").unwrap());

fn is_list_item(ctx: &LineContext<'_>) -> bool {
    RE_BULLET.is_match(ctx.line) || RE_PAREN_ITEM.is_match(ctx.line)
}

// ── Expression extraction ────────────────────────────────────────────────────

static EXPRESSION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // LaTeX
        r"\$[^$]+\$",
        r"\$\$[^$]+\$\$",
        r"\\begin\{[^}]+\}.*?\\end\{[^}]+\}",
        // Operators and comparisons
        r"[a-zA-Z0-9\s]*[=<>≤≥≠±∓×÷∏∑∫∂∇][a-zA-Z0-9\s]*",
        // Equations with variables and numbers
        r"[a-zA-Z]\s*=\s*[0-9a-zA-Z\s+\-*/^()]+",
        // Fractions
        r"\d+/\d+",
        r"[a-zA-Z]+/[a-zA-Z]+",
        // Powers and roots
        r"[a-zA-Z0-9]+\^[a-zA-Z0-9]+",
        r"√[a-zA-Z0-9]+",
        // Function calls
        r"(?:sin|cos|tan|log|ln|exp|sqrt)\([^)]+\)",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
    .collect()
});

/// Pull candidate math expressions out of free text.
///
/// Matches are trimmed, deduplicated (first occurrence wins) and anything of
/// two characters or fewer is dropped. Used to fill a record's
/// `math_expressions` field next to its Markdown.
pub fn extract_math_expressions(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut expressions = Vec::new();

    for pattern in EXPRESSION_PATTERNS.iter() {
        for m in pattern.find_iter(text) {
            let expr = m.as_str().trim();
            if expr.chars().count() > 2 && seen.insert(expr.to_string()) {
                expressions.push(expr.to_string());
            }
        }
    }

    expressions
}
