use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    Received,
    Generated,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Received, Category::Generated];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Received => "received",
            Category::Generated => "generated",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a record across runs. See [`record_key`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RecordKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignee {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
}

/// A document attached to a record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Unread marker owned by the portal UI. Display only, never a change signal.
    #[serde(default)]
    pub is_new: bool,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SubRecord {
    pub fn identity(&self) -> Option<&str> {
        self.id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
    #[serde(default)]
    pub process_number: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Assignee>,
    #[serde(default)]
    pub markers: Vec<String>,
    #[serde(default)]
    pub signers: Vec<String>,
    #[serde(default)]
    pub documents: Vec<SubRecord>,
    #[serde(default)]
    pub viewed: bool,
    #[serde(default)]
    pub has_unseen_documents: bool,
    #[serde(default)]
    pub has_annotations: bool,
    #[serde(default)]
    pub restricted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(
        process_id: impl Into<String>,
        process_number: impl Into<String>,
        category: Category,
    ) -> Self {
        Self {
            process_id: Some(process_id.into()),
            process_number: process_number.into(),
            category,
            ..Self::default()
        }
    }

    pub fn key(&self) -> RecordKey {
        record_key(self)
    }

    pub fn document_ids(&self) -> BTreeSet<&str> {
        self.documents.iter().filter_map(SubRecord::identity).collect()
    }

    pub fn marker_set(&self) -> BTreeSet<&str> {
        self.markers
            .iter()
            .map(|marker| marker.trim())
            .filter(|marker| !marker.is_empty())
            .collect()
    }

    pub fn signer_set(&self) -> BTreeSet<&str> {
        self.signers.iter().map(String::as_str).collect()
    }

    pub fn new_document_count(&self) -> usize {
        self.documents.iter().filter(|doc| doc.is_new).count()
    }

    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or("(untitled)")
    }
}

/// Primary process id when present and non-blank, else the process number.
///
/// Every identity comparison (classification, quota, artifacts, history) goes
/// through this function so the fallback never drifts between code paths.
pub fn record_key(record: &Record) -> RecordKey {
    let primary = record
        .process_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    RecordKey(
        primary
            .unwrap_or_else(|| record.process_number.trim())
            .to_string(),
    )
}

/// Bookkeeping timestamps of a history entry.
///
/// Every field is optional on read: entries written by older tools may carry
/// no metadata at all, or timestamps that do not parse. Such values read as
/// `None` and are filled in the next time the record is observed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoryMetadata {
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl HistoryMetadata {
    pub fn first_seen_at(ts: DateTime<Utc>) -> Self {
        Self {
            first_seen: Some(ts),
            last_seen: Some(ts),
            last_updated: Some(ts),
            extra: BTreeMap::new(),
        }
    }

    pub fn last_updated_or_first_seen(&self) -> Option<DateTime<Utc>> {
        self.last_updated.or(self.first_seen)
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(raw).ok())
}

fn lenient_metadata<'de, D>(deserializer: D) -> Result<HistoryMetadata, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(raw).unwrap_or_default())
}

/// Last observed state of a record plus bookkeeping timestamps.
///
/// Only the snapshot has to parse; a missing or unusable `_metadata` block
/// reads as empty metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub snapshot: Record,
    #[serde(rename = "_metadata", default, deserialize_with = "lenient_metadata")]
    pub metadata: HistoryMetadata,
}

impl HistoryEntry {
    pub fn first_seen(record: &Record, ts: DateTime<Utc>) -> Self {
        Self {
            snapshot: record.clone(),
            metadata: HistoryMetadata::first_seen_at(ts),
        }
    }
}
