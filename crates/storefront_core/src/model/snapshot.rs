//! Archival snapshot model.
//!
//! # Responsibility
//! - Define the year window used to bucket live records.
//! - Convert `ArchivalSnapshot` to and from its stored document shape.
//!
//! # Invariants
//! - Year windows are inclusive on both ends and evaluated in UTC.
//! - A stored snapshot always carries one array per source collection.
//! - Archived records keep the original id and the untouched field set.

use crate::model::document::{DocKey, Document, Fields, SourceCollection, CREATED_AT_FIELD};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Inclusive `[start_ms, end_ms]` range covering one calendar year in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearWindow {
    pub year: i32,
    pub start_ms: i64,
    pub end_ms: i64,
}

impl YearWindow {
    /// Returns `[Y-01-01T00:00:00.000Z, Y-12-31T23:59:59.999Z]`.
    ///
    /// Returns `None` for years chrono cannot represent.
    pub fn for_year(year: i32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)?;
        let end = NaiveDate::from_ymd_opt(year, 12, 31)?.and_hms_milli_opt(23, 59, 59, 999)?;
        Some(Self {
            year,
            start_ms: start.and_utc().timestamp_millis(),
            end_ms: end.and_utc().timestamp_millis(),
        })
    }

    pub fn contains(&self, timestamp_ms: i64) -> bool {
        (self.start_ms..=self.end_ms).contains(&timestamp_ms)
    }
}

/// One captured record inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedRecord {
    /// Original document id in its source collection.
    pub id: String,
    /// Original full field set, stored verbatim.
    pub data: Fields,
}

impl From<Document> for ArchivedRecord {
    fn from(value: Document) -> Self {
        Self {
            id: value.id,
            data: value.fields,
        }
    }
}

/// All records removed from live collections by one closing.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivalSnapshot {
    pub year: i32,
    /// Epoch milliseconds when the archive was written.
    pub created_at: i64,
    pub collections: BTreeMap<SourceCollection, Vec<ArchivedRecord>>,
}

impl ArchivalSnapshot {
    /// Total records across every source collection.
    pub fn total_records(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    /// Record count per source collection, including empty ones.
    pub fn counts(&self) -> BTreeMap<SourceCollection, usize> {
        SourceCollection::ALL
            .into_iter()
            .map(|collection| {
                let count = self.collections.get(&collection).map_or(0, Vec::len);
                (collection, count)
            })
            .collect()
    }

    /// Live keys of every archived record.
    pub fn keys(&self) -> impl Iterator<Item = DocKey> + '_ {
        self.collections.iter().flat_map(|(collection, records)| {
            records
                .iter()
                .map(move |record| DocKey::source(*collection, record.id.clone()))
        })
    }

    /// Serializes the snapshot into its `annualClosings/{year}` document.
    pub fn to_document(&self) -> Result<Document, serde_json::Error> {
        let mut fields = Fields::new();
        fields.insert("year".to_string(), Value::from(self.year));
        fields.insert(CREATED_AT_FIELD.to_string(), Value::from(self.created_at));
        for collection in SourceCollection::ALL {
            let records = self
                .collections
                .get(&collection)
                .map(Vec::as_slice)
                .unwrap_or_default();
            fields.insert(
                collection.as_str().to_string(),
                serde_json::to_value(records)?,
            );
        }
        Ok(Document::new(self.year.to_string(), fields))
    }

    /// Parses an `annualClosings/{year}` document.
    ///
    /// Missing collection arrays are read as empty. Non-array values,
    /// malformed records and arrays under any name other than a source
    /// collection are rejected instead of being skipped.
    pub fn from_document(document: &Document) -> Result<Self, String> {
        let year = match document.fields.get("year") {
            Some(value) => value
                .as_i64()
                .and_then(|year| i32::try_from(year).ok())
                .ok_or_else(|| format!("invalid snapshot year `{value}`"))?,
            None => document
                .id
                .parse::<i32>()
                .map_err(|_| format!("snapshot id `{}` is not a year", document.id))?,
        };
        let created_at = document
            .fields
            .get(CREATED_AT_FIELD)
            .and_then(Value::as_i64)
            .unwrap_or_default();

        if let Some(name) = document.fields.iter().find_map(|(name, value)| {
            (value.is_array() && SourceCollection::parse(name).is_none()).then_some(name)
        }) {
            return Err(format!(
                "snapshot {year} holds records for unsupported collection `{name}`"
            ));
        }

        let mut collections = BTreeMap::new();
        for collection in SourceCollection::ALL {
            let records = match document.fields.get(collection.as_str()) {
                None | Some(Value::Null) => Vec::new(),
                Some(value @ Value::Array(_)) => {
                    serde_json::from_value::<Vec<ArchivedRecord>>(value.clone()).map_err(
                        |err| format!("invalid `{collection}` records in snapshot {year}: {err}"),
                    )?
                }
                Some(other) => {
                    return Err(format!(
                        "snapshot {year} field `{collection}` must be an array, got `{other}`"
                    ))
                }
            };
            collections.insert(collection, records);
        }

        Ok(Self {
            year,
            created_at,
            collections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ArchivalSnapshot, ArchivedRecord, YearWindow};
    use crate::model::document::{Document, SourceCollection};
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn year_window_covers_whole_utc_year() {
        let window = YearWindow::for_year(2023).expect("2023 is representable");
        assert_eq!(window.start_ms, 1_672_531_200_000);
        assert_eq!(window.end_ms, 1_704_067_199_999);
        assert!(window.contains(window.start_ms));
        assert!(window.contains(window.end_ms));
        assert!(!window.contains(window.end_ms + 1));
        assert!(!window.contains(window.start_ms - 1));
    }

    #[test]
    fn snapshot_document_keeps_colliding_id_fields() {
        let data = json!({"id": "inner", "total": 12}).as_object().cloned().unwrap();
        let mut collections = BTreeMap::new();
        collections.insert(
            SourceCollection::Orders,
            vec![ArchivedRecord {
                id: "o1".to_string(),
                data: data.clone(),
            }],
        );
        let snapshot = ArchivalSnapshot {
            year: 2023,
            created_at: 42,
            collections,
        };

        let document = snapshot.to_document().unwrap();
        assert_eq!(document.id, "2023");
        assert_eq!(document.fields["customers"], json!([]));

        let parsed = ArchivalSnapshot::from_document(&document).unwrap();
        assert_eq!(parsed.collections[&SourceCollection::Orders][0].id, "o1");
        assert_eq!(parsed.collections[&SourceCollection::Orders][0].data, data);
        assert_eq!(parsed.total_records(), 1);
    }

    #[test]
    fn snapshot_rejects_records_of_unknown_collections() {
        let fields = json!({
            "year": 2022,
            "orders": [{"id": "o1", "data": {}}],
            "products": [{"id": "p9", "data": {"sku": "X"}}],
            "note": "kept as metadata",
        })
        .as_object()
        .cloned()
        .unwrap();
        let err = ArchivalSnapshot::from_document(&Document::new("2022", fields)).unwrap_err();
        assert!(err.contains("`products`"));
    }

    #[test]
    fn snapshot_rejects_non_array_collection_field() {
        let fields = json!({"year": 2022, "orders": "oops"})
            .as_object()
            .cloned()
            .unwrap();
        let err = ArchivalSnapshot::from_document(&Document::new("2022", fields)).unwrap_err();
        assert!(err.contains("must be an array"));
    }
}
