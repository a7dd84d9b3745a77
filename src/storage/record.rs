use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{StoreError, StoreResult};

/// One entity in a table: an opaque JSON object that must carry an `id`.
pub type Record = serde_json::Map<String, JsonValue>;

/// Field every record is keyed by.
pub const ID_FIELD: &str = "id";

/// Record identifier as stored: an integer or a string.
///
/// Comparison is normalized: a string holding a canonical base-10 integer equals the
/// integer id with the same value, so a path segment `"7"` finds a record stored with `7`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl RecordId {
    /// Parse an id from untyped text such as a URL path segment.
    pub fn parse(text: &str) -> Self {
        match canonical_int(text) {
            Some(n) => RecordId::Int(n),
            None => RecordId::Str(text.to_string()),
        }
    }

    /// Extract the id of a JSON value. Returns `None` for anything that is not an
    /// integer, an integral float or a string, and for integers outside the i64 range.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() { return Some(RecordId::Int(i)); }
                // Integers past i64 would saturate and collide with i64::MAX.
                if n.is_u64() { return None; }
                let f = n.as_f64()?;
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                    Some(RecordId::Int(f as i64))
                } else {
                    None
                }
            }
            JsonValue::String(s) => Some(RecordId::Str(s.clone())),
            _ => None,
        }
    }

    /// Read the `id` field of a record.
    pub fn of(record: &Record) -> StoreResult<Self> {
        let raw = record
            .get(ID_FIELD)
            .ok_or_else(|| StoreError::InvalidRecord("record has no 'id' field".into()))?;
        RecordId::from_json(raw)
            .ok_or_else(|| StoreError::InvalidRecord(format!("unsupported id value {}", raw)))
    }

    fn normalized(&self) -> NormalizedId<'_> {
        match self {
            RecordId::Int(n) => NormalizedId::Int(*n),
            RecordId::Str(s) => match canonical_int(s) {
                Some(n) => NormalizedId::Int(n),
                None => NormalizedId::Str(s.as_str()),
            },
        }
    }

    /// True when `record` carries this id.
    pub fn matches(&self, record: &Record) -> bool {
        record
            .get(ID_FIELD)
            .and_then(RecordId::from_json)
            .map(|other| other == *self)
            .unwrap_or(false)
    }
}

#[derive(PartialEq, Eq, Hash)]
enum NormalizedId<'a> {
    Int(i64),
    Str(&'a str),
}

// "007", "+7" and " 7" stay strings; only the form i64::to_string would produce counts.
fn canonical_int(s: &str) -> Option<i64> {
    let n = s.parse::<i64>().ok()?;
    if n.to_string() == s { Some(n) } else { None }
}

impl PartialEq for RecordId {
    fn eq(&self, other: &Self) -> bool { self.normalized() == other.normalized() }
}

impl Eq for RecordId {}

impl std::hash::Hash for RecordId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) { self.normalized().hash(state) }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{}", n),
            RecordId::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self { RecordId::Int(n) }
}

impl From<i32> for RecordId {
    fn from(n: i32) -> Self { RecordId::Int(n as i64) }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self { RecordId::Str(s.to_string()) }
}
