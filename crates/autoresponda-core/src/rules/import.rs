//! Spreadsheet rows to rule drafts.
//!
//! Header detection is a forgiving substring sniff over the first row, with terms in
//! English, French, Darija and Arabic. When it cannot find two distinct columns the
//! importer treats every row as data in a fixed `keyword, response` layout.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::RuleDraft;

const KEYWORD_TERMS: &[&str] = &[
    "keyword", "key", "trigger", "message", "input", "question", "mot", "mot-cle", "kalima",
    "sual", "كلمة", "مفتاح", "سؤال",
];

const RESPONSE_TERMS: &[&str] = &[
    "response", "reply", "answer", "output", "jawab", "rad", "rep", "reponse", "جواب", "رد",
];

const DEFAULT_KEYWORD_COLUMN: usize = 0;
const DEFAULT_RESPONSE_COLUMN: usize = 1;

/// One cell as produced by a tabular parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImportCell {
    Text(String),
    Number(f64),
    Bool(bool),
    Empty,
}

impl ImportCell {
    pub fn is_empty(&self) -> bool {
        match self {
            ImportCell::Empty => true,
            ImportCell::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    /// Render the cell as text. Integral numbers print without a fractional part.
    pub fn as_text(&self) -> String {
        match self {
            ImportCell::Text(text) => text.clone(),
            ImportCell::Number(value) => value.to_string(),
            ImportCell::Bool(value) => value.to_string(),
            ImportCell::Empty => String::new(),
        }
    }
}

impl From<&str> for ImportCell {
    fn from(value: &str) -> Self {
        ImportCell::Text(value.to_string())
    }
}

impl From<String> for ImportCell {
    fn from(value: String) -> Self {
        ImportCell::Text(value)
    }
}

pub type ImportRow = Vec<ImportCell>;

/// Column indices found in a candidate header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColumnLayout {
    pub keyword: Option<usize>,
    pub response: Option<usize>,
}

impl ColumnLayout {
    /// Both columns found and distinct, so the row really is a header.
    pub fn is_header(&self) -> bool {
        matches!((self.keyword, self.response), (Some(k), Some(r)) if k != r)
    }
}

/// Look for keyword and response columns in `header`. When several cells match the
/// same term list, the last one wins.
pub fn detect_columns(header: &[ImportCell]) -> ColumnLayout {
    let mut layout = ColumnLayout::default();

    for (index, cell) in header.iter().enumerate() {
        let label = cell.as_text().trim().to_lowercase();
        if KEYWORD_TERMS.iter().any(|term| label.contains(term)) {
            layout.keyword = Some(index);
        }
        if RESPONSE_TERMS.iter().any(|term| label.contains(term)) {
            layout.response = Some(index);
        }
    }

    layout
}

/// Convert rows into rule drafts. Rows that do not yield a usable rule are skipped
/// silently.
pub fn import_rows(rows: &[ImportRow]) -> Vec<RuleDraft> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };

    let layout = detect_columns(first);
    let (start, keyword_column, response_column) = match layout {
        ColumnLayout {
            keyword: Some(keyword),
            response: Some(response),
        } if layout.is_header() => {
            debug!(keyword, response, "detected header row");
            (1, keyword, response)
        }
        _ => {
            debug!("no header detected, using default column layout");
            (0, DEFAULT_KEYWORD_COLUMN, DEFAULT_RESPONSE_COLUMN)
        }
    };

    rows[start..]
        .iter()
        .filter_map(|row| row_to_draft(row, keyword_column, response_column))
        .collect()
}

fn row_to_draft(row: &[ImportCell], keyword_column: usize, response_column: usize) -> Option<RuleDraft> {
    if row.len() < 2 {
        return None;
    }

    let keywords = split_keywords(&row.get(keyword_column)?.as_text());
    let response = row.get(response_column)?.as_text().trim().to_string();

    if keywords.is_empty() || response.is_empty() {
        return None;
    }

    Some(RuleDraft::new(keywords, response))
}

/// Split a keyword cell on commas, semicolons and newlines.
pub fn split_keywords(raw: &str) -> Vec<String> {
    raw.split([',', ';', '\n'])
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string)
        .collect()
}

/// Aggregate result of one import, the only feedback a caller gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub imported: usize,
}

impl fmt::Display for ImportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.imported {
            0 => write!(f, "no valid rules found"),
            n => write!(f, "{n} imported"),
        }
    }
}
