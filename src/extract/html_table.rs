// src/extract/html_table.rs
//! Structured extraction from an HTML `<table>`.
//!
//! Rules, in order:
//! 1. The first `<table>` whose visible text contains `anchor` (case-insensitive)
//!    is selected; none → `NotFound`.
//! 2. Rows are `<tr>` elements; rows containing `<th>` cells are headers and skipped.
//! 3. The data row at `row` (0 = first data row, usually the newest entry) is read.
//! 4. Each cell is reduced with `normalize_text` (tags stripped, entities decoded,
//!    whitespace collapsed, trimmed). Column indices map cells to fields.
//! 5. A missing data row or any missing/blank mapped cell → `Incomplete`.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{complete_record, normalize_text, ExtractedRecord, Extractor, RecordKind};
use crate::error::ExtractError;

/// Zero-based cell index for each field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumns {
    pub date: usize,
    pub quantity: usize,
    pub unit_price: usize,
    pub total: usize,
}

impl Default for TableColumns {
    fn default() -> Self {
        Self {
            date: 0,
            quantity: 1,
            unit_price: 2,
            total: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HtmlTableExtractor {
    anchor: String,
    columns: TableColumns,
    row: usize,
}

fn re_table() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)<table\b.*?</table\s*>").expect("table regex"))
}

fn re_row_open() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)<tr\b[^>]*>").expect("row regex"))
}

fn re_cell_open() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)<(t[dh])\b[^>]*>").expect("cell regex"))
}

/// Splits `s` at every opening tag matched by `re`. Each piece runs from the
/// end of one opening tag to the start of the next (or the end of input), so
/// unclosed `<tr>`/`<td>` still produce sane pieces. Closing tags stay inside
/// the piece and are removed later by `normalize_text`.
fn split_at_open_tags<'a>(re: &Regex, s: &'a str) -> Vec<(&'a str, &'a str)> {
    let opens: Vec<_> = re.find_iter(s).collect();
    opens
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let end = opens.get(i + 1).map_or(s.len(), |next| next.start());
            (m.as_str(), &s[m.end()..end])
        })
        .collect()
}

impl HtmlTableExtractor {
    pub fn new(anchor: impl Into<String>, columns: TableColumns) -> Self {
        Self {
            anchor: anchor.into(),
            columns,
            row: 0,
        }
    }

    pub fn with_row(mut self, row: usize) -> Self {
        self.row = row;
        self
    }

    fn find_table<'a>(&self, html: &'a str) -> Option<&'a str> {
        let needle = self.anchor.to_lowercase();
        re_table()
            .find_iter(html)
            .map(|m| m.as_str())
            .find(|t| normalize_text(t).to_lowercase().contains(&needle))
    }

    /// Data rows as lists of normalized cell texts.
    fn data_rows(table: &str) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        for (_, row) in split_at_open_tags(re_row_open(), table) {
            let mut is_header = false;
            let mut cells = Vec::new();
            for (open, content) in split_at_open_tags(re_cell_open(), row) {
                if open.get(..3).is_some_and(|t| t.eq_ignore_ascii_case("<th")) {
                    is_header = true;
                }
                cells.push(normalize_text(content));
            }
            if !is_header && !cells.is_empty() {
                rows.push(cells);
            }
        }
        rows
    }
}

impl Extractor for HtmlTableExtractor {
    fn kind(&self) -> RecordKind {
        RecordKind::Structured
    }

    fn extract(&self, body: &[u8]) -> Result<ExtractedRecord, ExtractError> {
        let html = String::from_utf8_lossy(body);
        let table = self
            .find_table(&html)
            .ok_or_else(|| ExtractError::NotFound(format!("table containing {:?}", self.anchor)))?;

        let rows = Self::data_rows(table);
        let Some(cells) = rows.get(self.row) else {
            return Err(ExtractError::Incomplete {
                present: 0,
                required: super::StructuredRecord::REQUIRED_FIELDS,
            });
        };

        let cell = |i: usize| cells.get(i).cloned();
        let record = complete_record([
            cell(self.columns.date),
            cell(self.columns.quantity),
            cell(self.columns.unit_price),
            cell(self.columns.total),
        ])?;
        Ok(ExtractedRecord::Structured(record))
    }
}
