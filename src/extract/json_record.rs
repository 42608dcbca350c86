// src/extract/json_record.rs
//! Structured extraction from a JSON API response.
//!
//! Shape: `records` is a JSON pointer to an array of objects (or to a single
//! object). One element is picked (`first`, `last` or an index) and the four
//! fields are read from it. Field locators are either a plain key (`"date"`)
//! or a pointer relative to the element (`"/purchase/date"`).
//!
//! Strings are trimmed; numbers are rendered with serde_json's formatting;
//! null, bool, arrays and objects count as missing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{complete_record, ExtractedRecord, Extractor, RecordKind, StructuredRecord};
use crate::error::ExtractError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordPick {
    #[default]
    First,
    Last,
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonFields {
    pub date: String,
    pub quantity: String,
    pub unit_price: String,
    pub total: String,
}

impl Default for JsonFields {
    fn default() -> Self {
        Self {
            date: "date".into(),
            quantity: "quantity".into(),
            unit_price: "unit_price".into(),
            total: "total".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JsonRecordExtractor {
    records: String,
    pick: RecordPick,
    fields: JsonFields,
}

impl JsonRecordExtractor {
    pub fn new(records: impl Into<String>, pick: RecordPick, fields: JsonFields) -> Self {
        Self {
            records: records.into(),
            pick,
            fields,
        }
    }

    fn pick<'a>(&self, list: &'a Value) -> Option<&'a Value> {
        match list {
            Value::Array(items) => match self.pick {
                RecordPick::First => items.first(),
                RecordPick::Last => items.last(),
                RecordPick::Index(i) => items.get(i),
            },
            Value::Object(_) => Some(list),
            _ => None,
        }
    }
}

fn lookup<'a>(item: &'a Value, locator: &str) -> Option<&'a Value> {
    if locator.starts_with('/') {
        item.pointer(locator)
    } else {
        item.get(locator)
    }
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Extractor for JsonRecordExtractor {
    fn kind(&self) -> RecordKind {
        RecordKind::Structured
    }

    fn extract(&self, body: &[u8]) -> Result<ExtractedRecord, ExtractError> {
        let root: Value =
            serde_json::from_slice(body).map_err(|e| ExtractError::Malformed(e.to_string()))?;

        let list = if self.records.is_empty() {
            &root
        } else {
            root.pointer(&self.records)
                .ok_or_else(|| ExtractError::NotFound(self.records.clone()))?
        };
        if !matches!(list, Value::Array(_) | Value::Object(_)) {
            return Err(ExtractError::NotFound(self.records.clone()));
        }

        let Some(item) = self.pick(list) else {
            return Err(ExtractError::Incomplete {
                present: 0,
                required: StructuredRecord::REQUIRED_FIELDS,
            });
        };

        let field = |loc: &str| lookup(item, loc).and_then(scalar_text);
        let record = complete_record([
            field(&self.fields.date),
            field(&self.fields.quantity),
            field(&self.fields.unit_price),
            field(&self.fields.total),
        ])?;
        Ok(ExtractedRecord::Structured(record))
    }
}
