//! Delimited-text table parser for the code-analysis CSV artifacts.
//!
//! The first non-blank line is the header. A data row is kept only when its
//! field count equals the header's; anything else is skipped. Quote
//! characters toggle a quoted segment in which the separator is literal; they
//! are never part of the value and carry no further escaping.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

const SEPARATOR: char = ',';
const QUOTE: char = '"';

// ── CsvValue ──────────────────────────────────────────────────────────────────

/// A single cell: numeric when the whole text parses as a finite number.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CsvValue {
    Number(f64),
    Text(String),
}

impl CsvValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CsvValue::Number(n) => Some(*n),
            CsvValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CsvValue::Text(s) => Some(s),
            CsvValue::Number(_) => None,
        }
    }
}

// ── CsvRow ────────────────────────────────────────────────────────────────────

/// One data row, fields in header order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvRow {
    fields: Vec<(String, CsvValue)>,
}

impl CsvRow {
    pub fn get(&self, name: &str) -> Option<&CsvValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Numeric value of `name`, `0.0` when absent or textual.
    pub fn number(&self, name: &str) -> f64 {
        self.get(name).and_then(CsvValue::as_f64).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CsvValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Serialize for CsvRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `text` into rows keyed by the header's field names.
///
/// Never fails: empty or header-only input yields an empty vector, and rows
/// with the wrong field count are dropped.
pub fn parse_table(text: &str) -> Vec<CsvRow> {
    let mut lines = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty());

    let Some(header_line) = lines.next() else {
        return Vec::new();
    };
    let header = split_fields(header_line);

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for line in lines {
        let values = split_fields(line);
        if values.len() != header.len() {
            skipped += 1;
            continue;
        }
        let fields = header
            .iter()
            .cloned()
            .zip(values.iter().map(|v| coerce(v)))
            .collect();
        rows.push(CsvRow { fields });
    }

    if skipped > 0 {
        tracing::debug!(skipped, kept = rows.len(), "csv rows with mismatched field count dropped");
    }
    rows
}

/// Split one line on separators outside quoted segments. Fields are trimmed.
pub fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for ch in line.chars() {
        match ch {
            QUOTE => quoted = !quoted,
            SEPARATOR if !quoted => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

fn coerce(raw: &str) -> CsvValue {
    if !raw.is_empty() {
        if let Ok(n) = raw.parse::<f64>() {
            if n.is_finite() {
                return CsvValue::Number(n);
            }
        }
    }
    CsvValue::Text(raw.to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
