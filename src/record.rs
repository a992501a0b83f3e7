use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Header holding the member identifier used for delete-by-identifier.
pub const MEMBER_HEADER: &str = "MEMBER";
/// Header holding the display label of a row.
pub const NAME_HEADER: &str = "NAME";
/// Header used to pre-fill mail drafts.
pub const EMAIL_HEADER: &str = "EMAIL";
/// Any header containing this marker holds a spreadsheet date serial.
pub const DATE_MARKER: &str = "DOB";

pub fn is_date_header(header: &str) -> bool {
    header.contains(DATE_MARKER)
}

/// A single scalar cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// Numeric reading of the cell: a number, or non-blank text that parses as
    /// a finite number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(*n),
            CellValue::Text(s) => parse_number(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_number().is_some()
    }

    /// Text form used for searching, sorting fallbacks and delimited export.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.clone(),
        }
    }
}

pub(crate) fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Number to text the way a browser's `String(n)` prints it: plain digits
/// inside `[1e-6, 1e21)`, exponent form (`1e+21`, `1.5e-7`) outside.
fn format_number(n: f64) -> String {
    if n == 0.0 {
        // avoid "-0"
        return "0".to_string();
    }
    let magnitude = n.abs();
    if magnitude >= 1e21 || magnitude < 1e-6 {
        let text = format!("{n:e}");
        return match text.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{mantissa}e+{exponent}")
            }
            _ => text,
        };
    }
    n.to_string()
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::from(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

// Integral numbers below 2^53 are written as JSON integers so persisted files
// read the same as the ones the browser version produced.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Empty => serializer.serialize_str(""),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER => {
                serializer.serialize_i64(*n as i64)
            }
            CellValue::Number(n) => serializer.serialize_f64(*n),
            CellValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

struct CellVisitor;

impl<'de> Visitor<'de> for CellVisitor {
    type Value = CellValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number, boolean or null")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<CellValue, E> {
        Ok(CellValue::Text(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<CellValue, E> {
        Ok(CellValue::Number(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<CellValue, E> {
        Ok(CellValue::Number(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<CellValue, E> {
        Ok(CellValue::Number(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<CellValue, E> {
        Ok(CellValue::from(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<CellValue, E> {
        Ok(CellValue::from(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<CellValue, E> {
        Ok(CellValue::Empty)
    }

    fn visit_none<E: de::Error>(self) -> Result<CellValue, E> {
        Ok(CellValue::Empty)
    }
}

impl<'de> Deserialize<'de> for CellValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CellVisitor)
    }
}

/// One row: header name to cell. Column order lives in the owning dataset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, CellValue>);

impl Record {
    pub fn new() -> Self {
        Record(BTreeMap::new())
    }

    /// Cell under `header`, empty when the record has no such key.
    pub fn get(&self, header: &str) -> &CellValue {
        self.0.get(header).unwrap_or(&EMPTY_CELL)
    }

    pub fn set(&mut self, header: impl Into<String>, value: impl Into<CellValue>) {
        self.0.insert(header.into(), value.into());
    }

    pub fn contains(&self, header: &str) -> bool {
        self.0.contains_key(header)
    }

    pub fn values(&self) -> impl Iterator<Item = &CellValue> {
        self.0.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CellValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn member(&self) -> &CellValue {
        self.get(MEMBER_HEADER)
    }

    pub fn name(&self) -> &CellValue {
        self.get(NAME_HEADER)
    }

    /// Keep exactly `headers` as keys, filling missing ones with empty cells.
    pub fn conform(self, headers: &[String]) -> Record {
        let mut out = BTreeMap::new();
        for header in headers {
            let value = self.0.get(header).cloned().unwrap_or_default();
            out.insert(header.clone(), value);
        }
        Record(out)
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Record(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A named table: the unit of upload, persistence and export.
///
/// Serialized in the `{ fileName, headers, data }` layout of the persisted
/// collection. The revision counter is in-memory only and moves on every
/// commit so cached query results can tell stale data apart.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(rename = "fileName")]
    pub name: String,
    pub headers: Vec<String>,
    #[serde(rename = "data")]
    pub rows: Vec<Record>,
    #[serde(skip)]
    pub(crate) revision: u64,
}

impl Dataset {
    /// Build a dataset, conforming every row to `headers`.
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Record>) -> Self {
        let rows = rows.into_iter().map(|r| r.conform(&headers)).collect();
        Dataset {
            name: name.into(),
            headers,
            rows,
            revision: 0,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            name: self.name.clone(),
        }
    }
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.headers == other.headers && self.rows == other.rows
    }
}

/// Listing entry for the dataset picker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub name: String,
}
