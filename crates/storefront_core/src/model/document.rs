//! Document model and well-known collection names.
//!
//! # Responsibility
//! - Represent schemaless documents as a JSON field map plus stable id.
//! - Extract the `createdAt` bucketing timestamp from supported encodings.
//!
//! # Invariants
//! - Collection names match `[A-Za-z][A-Za-z0-9_]*` (max 64 chars).
//! - Document ids are non-empty, contain no `/`, and are at most 256 chars.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Collection holding one `ArchivalSnapshot` per closed year.
pub const ANNUAL_CLOSINGS: &str = "annualClosings";
/// Collection holding process-wide singletons.
pub const APP_STATE: &str = "appState";
/// Document id of the revert budget singleton inside `APP_STATE`.
pub const REVERT_COUNTER_ID: &str = "revertCounter";
/// Collection holding one `ClosingControl` per year that left `open`.
pub const CLOSING_STATUS: &str = "closingStatus";
/// Field name used to bucket live records into a year.
pub const CREATED_AT_FIELD: &str = "createdAt";

const MAX_DOC_ID_CHARS: usize = 256;

static COLLECTION_NAME_RE: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r"^[A-Za-z][A-Za-z0-9_]{0,63}$").expect("valid collection regex")
});

/// Field set of one document.
pub type Fields = Map<String, Value>;

/// Live source collections swept by an annual closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceCollection {
    Orders,
    Customers,
    Promotions,
    Admins,
}

impl SourceCollection {
    /// Every source collection, in archive order.
    pub const ALL: [SourceCollection; 4] = [
        SourceCollection::Orders,
        SourceCollection::Customers,
        SourceCollection::Promotions,
        SourceCollection::Admins,
    ];

    /// Storage name of the collection.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Orders => "orders",
            Self::Customers => "customers",
            Self::Promotions => "promotions",
            Self::Admins => "admins",
        }
    }

    /// Parses a storage name back into a source collection.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|collection| collection.as_str() == value)
    }
}

impl Display for SourceCollection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of one document: `collection/id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocKey {
    pub collection: String,
    pub id: String,
}

/// Key validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocKeyValidationError {
    InvalidCollection(String),
    EmptyId,
    InvalidId(String),
}

impl Display for DocKeyValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCollection(name) => write!(f, "invalid collection name `{name}`"),
            Self::EmptyId => write!(f, "document id cannot be empty"),
            Self::InvalidId(id) => write!(f, "invalid document id `{id}`"),
        }
    }
}

impl Error for DocKeyValidationError {}

impl DocKey {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Key of a live record in a source collection.
    pub fn source(collection: SourceCollection, id: impl Into<String>) -> Self {
        Self::new(collection.as_str(), id)
    }

    /// Key of the archival snapshot for `year`.
    pub fn annual_closing(year: i32) -> Self {
        Self::new(ANNUAL_CLOSINGS, year.to_string())
    }

    /// Key of the closing control record for `year`.
    pub fn closing_status(year: i32) -> Self {
        Self::new(CLOSING_STATUS, year.to_string())
    }

    /// Key of the revert budget singleton.
    pub fn revert_counter() -> Self {
        Self::new(APP_STATE, REVERT_COUNTER_ID)
    }

    /// Checks collection and id shape before persistence.
    pub fn validate(&self) -> Result<(), DocKeyValidationError> {
        if !COLLECTION_NAME_RE.is_match(&self.collection) {
            return Err(DocKeyValidationError::InvalidCollection(
                self.collection.clone(),
            ));
        }
        if self.id.trim().is_empty() {
            return Err(DocKeyValidationError::EmptyId);
        }
        if self.id.contains('/') || self.id.chars().count() > MAX_DOC_ID_CHARS {
            return Err(DocKeyValidationError::InvalidId(self.id.clone()));
        }
        Ok(())
    }
}

impl Display for DocKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// One stored document: its id within the collection and its full field set.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Bucketing timestamp in epoch milliseconds, if `createdAt` is parseable.
    pub fn created_at_ms(&self) -> Option<i64> {
        created_at_ms(&self.fields)
    }
}

/// Reads `createdAt` from a field map.
///
/// Accepted encodings: integer epoch milliseconds, RFC 3339 string, a naive
/// `YYYY-MM-DD[THH:MM:SS[.fff]]` string read as UTC, or a
/// `{seconds, nanoseconds}` object (leading underscores allowed).
pub fn created_at_ms(fields: &Fields) -> Option<i64> {
    fields.get(CREATED_AT_FIELD).and_then(timestamp_ms)
}

fn timestamp_ms(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|millis| millis.trunc() as i64)),
        Value::String(text) => string_timestamp_ms(text.trim()),
        Value::Object(parts) => {
            let seconds = parts
                .get("seconds")
                .or_else(|| parts.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = parts
                .get("nanoseconds")
                .or_else(|| parts.get("_nanoseconds"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            seconds
                .checked_mul(1000)
                .and_then(|millis| millis.checked_add(nanos / 1_000_000))
        }
        _ => None,
    }
}

const NAIVE_DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

fn string_timestamp_ms(text: &str) -> Option<i64> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.timestamp_millis());
    }
    if let Some(parsed) = NAIVE_DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
    {
        return Some(parsed.and_utc().timestamp_millis());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::{created_at_ms, DocKey, DocKeyValidationError, Fields, SourceCollection};
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn created_at_accepts_all_supported_encodings() {
        assert_eq!(
            created_at_ms(&fields(json!({"createdAt": 1_685_577_600_000_i64}))),
            Some(1_685_577_600_000)
        );
        assert_eq!(
            created_at_ms(&fields(json!({"createdAt": "2023-06-01T00:00:00Z"}))),
            Some(1_685_577_600_000)
        );
        assert_eq!(
            created_at_ms(&fields(
                json!({"createdAt": {"seconds": 1_685_577_600_i64, "nanoseconds": 5_000_000}})
            )),
            Some(1_685_577_600_005)
        );
        assert_eq!(
            created_at_ms(&fields(json!({"createdAt": {"_seconds": 10}}))),
            Some(10_000)
        );
    }

    #[test]
    fn created_at_reads_naive_dates_as_utc() {
        assert_eq!(
            created_at_ms(&fields(json!({"createdAt": "2023-06-01"}))),
            Some(1_685_577_600_000)
        );
        assert_eq!(
            created_at_ms(&fields(json!({"createdAt": "2023-06-01T00:00:01"}))),
            Some(1_685_577_601_000)
        );
        assert_eq!(
            created_at_ms(&fields(json!({"createdAt": "2023-06-01 00:00:00.250"}))),
            Some(1_685_577_600_250)
        );
        assert_eq!(created_at_ms(&fields(json!({"createdAt": "2023-13-01"}))), None);
    }

    #[test]
    fn created_at_rejects_missing_or_malformed_values() {
        assert_eq!(created_at_ms(&fields(json!({}))), None);
        assert_eq!(created_at_ms(&fields(json!({"createdAt": "yesterday"}))), None);
        assert_eq!(created_at_ms(&fields(json!({"createdAt": true}))), None);
    }

    #[test]
    fn key_validation_rejects_bad_shapes() {
        assert!(DocKey::new("orders", "o1").validate().is_ok());
        assert_eq!(
            DocKey::new("orders", " ").validate(),
            Err(DocKeyValidationError::EmptyId)
        );
        assert!(matches!(
            DocKey::new("orders", "a/b").validate(),
            Err(DocKeyValidationError::InvalidId(_))
        ));
        assert!(matches!(
            DocKey::new("1orders", "o1").validate(),
            Err(DocKeyValidationError::InvalidCollection(_))
        ));
    }

    #[test]
    fn source_collection_names_roundtrip() {
        for collection in SourceCollection::ALL {
            assert_eq!(SourceCollection::parse(collection.as_str()), Some(collection));
        }
        assert_eq!(SourceCollection::parse("annualClosings"), None);
    }
}
