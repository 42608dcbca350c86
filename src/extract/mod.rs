// src/extract/mod.rs
//! Turns a fetched body into a comparable unit: a whole-page fingerprint or a
//! small structured record pulled from a known table/JSON shape.

pub mod fingerprint;
pub mod html_table;
pub mod json_record;

use std::fmt;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

pub use fingerprint::{FingerprintExtractor, Normalization};
pub use html_table::{HtmlTableExtractor, TableColumns};
pub use json_record::{JsonFields, JsonRecordExtractor, RecordPick};

/// SHA-256 digest, persisted as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest([u8; 32]);

impl Digest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex chars, enough for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Digest {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let raw = hex::decode(s.trim()).map_err(|e| format!("digest hex: {e}"))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|v: Vec<u8>| format!("digest must be 32 bytes, got {}", v.len()))?;
        Ok(Self(bytes))
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> Self {
        d.to_hex()
    }
}

/// Row of a purchase-style table. `date` is the change key; the rest is payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredRecord {
    pub date: String,
    pub quantity: String,
    pub unit_price: String,
    pub total: String,
}

impl StructuredRecord {
    /// Number of fields every structured extractor must fill.
    pub const REQUIRED_FIELDS: usize = 4;
}

/// What one successful fetch boils down to. Never mutated after extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractedRecord {
    Fingerprint { hash: Digest },
    Structured(StructuredRecord),
}

impl ExtractedRecord {
    /// Value compared between cycles. Full digest for fingerprints, the date
    /// for structured records; price/total reformatting does not count.
    pub fn change_key(&self) -> String {
        match self {
            ExtractedRecord::Fingerprint { hash } => hash.to_hex(),
            ExtractedRecord::Structured(r) => r.date.trim().to_string(),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            ExtractedRecord::Fingerprint { .. } => RecordKind::Fingerprint,
            ExtractedRecord::Structured(_) => RecordKind::Structured,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Fingerprint,
    Structured,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Fingerprint => "fingerprint",
            RecordKind::Structured => "structured",
        }
    }
}

/// Pure body → record step. Implementations must not panic on any input.
pub trait Extractor: Send + Sync {
    fn kind(&self) -> RecordKind;
    fn extract(&self, body: &[u8]) -> Result<ExtractedRecord, ExtractError>;
}

/// Visible text of an HTML fragment: entities decoded, tags stripped,
/// whitespace collapsed, trimmed.
pub fn normalize_text(s: &str) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("ws regex"));

    // Tags go first so that an encoded `&lt;b&gt;` survives as literal text.
    let stripped = re_tags.replace_all(s, " ");
    let decoded = html_escape::decode_html_entities(&stripped);
    let out = decoded.replace('\u{00A0}', " ");
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Collapse every whitespace run to a single space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("ws regex"));
    re_ws.replace_all(s, " ").trim().to_string()
}

/// Checks that all four fields are non-empty after trimming.
pub(crate) fn complete_record(fields: [Option<String>; 4]) -> Result<StructuredRecord, ExtractError> {
    let present = fields
        .iter()
        .filter(|f| f.as_deref().is_some_and(|v| !v.trim().is_empty()))
        .count();
    if present < StructuredRecord::REQUIRED_FIELDS {
        return Err(ExtractError::Incomplete {
            present,
            required: StructuredRecord::REQUIRED_FIELDS,
        });
    }
    let [date, quantity, unit_price, total] = fields.map(|f| f.unwrap_or_default().trim().to_string());
    Ok(StructuredRecord {
        date,
        quantity,
        unit_price,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_tags_and_entities() {
        let s = "  <td class=\"x\">\n  Oct&nbsp;1,&nbsp;2025 <b>new</b> </td> ";
        assert_eq!(normalize_text(s), "Oct 1, 2025 new");
    }

    #[test]
    fn digest_hex_roundtrip_through_serde() {
        let d = Digest::from_bytes([0xab; 32]);
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
        assert!(serde_json::from_str::<Digest>("\"abcd\"").is_err());
    }

    #[test]
    fn change_key_of_structured_is_date_only() {
        let a = ExtractedRecord::Structured(StructuredRecord {
            date: "2025-10-01".into(),
            quantity: "3,000".into(),
            unit_price: "$60,000".into(),
            total: "$180M".into(),
        });
        let b = ExtractedRecord::Structured(StructuredRecord {
            date: " 2025-10-01 ".into(),
            quantity: "3000".into(),
            unit_price: "$60000.00".into(),
            total: "$181M".into(),
        });
        assert_eq!(a.change_key(), b.change_key());
        assert_ne!(a, b);
    }

    #[test]
    fn complete_record_counts_blank_as_missing() {
        let err = complete_record([
            Some("2025-10-01".into()),
            Some("  ".into()),
            None,
            Some("$1".into()),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ExtractError::Incomplete {
                present: 2,
                required: 4
            }
        );
    }
}
