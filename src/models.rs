//! Data models for the agreement dashboard.
//!
//! This module contains the record shape fetched from the hosted store,
//! the derived notification types, and the statistics produced for the
//! dashboard views.

use crate::analysis::dates::parse_date;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Label used when a record has no agreement type.
pub const FALLBACK_TYPE: &str = "Other";

/// Label used when a record has no university.
pub const FALLBACK_UNIVERSITY: &str = "Unknown";

/// One partnership agreement as stored upstream.
///
/// Field names are accepted in both camelCase and snake_case. Text fields
/// tolerate numbers and ignore other JSON types, so a sloppy column never
/// rejects the whole record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgreementRecord {
    /// Unique identifier (numbers are normalized to strings).
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Partner university name.
    #[serde(default, deserialize_with = "deserialize_text")]
    pub university: Option<String>,
    /// Agreement category, e.g. "MOU" or "MOA".
    #[serde(default, alias = "agreement_type", deserialize_with = "deserialize_text")]
    pub agreement_type: Option<String>,
    /// Raw start date as stored.
    #[serde(default, alias = "start_date", deserialize_with = "deserialize_text")]
    pub start_date: Option<String>,
    /// Raw end date as stored.
    #[serde(default, alias = "end_date", deserialize_with = "deserialize_text")]
    pub end_date: Option<String>,
    /// Person in charge of the agreement.
    #[serde(
        default,
        alias = "person_in_charge",
        alias = "pic",
        deserialize_with = "deserialize_text"
    )]
    pub person_in_charge: Option<String>,
    #[serde(default, alias = "student_mobility")]
    pub student_mobility: ActivityField,
    #[serde(default, alias = "staff_mobility")]
    pub staff_mobility: ActivityField,
    #[serde(default, alias = "joint_research")]
    pub joint_research: ActivityField,
    #[serde(default, alias = "joint_publication")]
    pub joint_publication: ActivityField,
    #[serde(default, alias = "co_teaching")]
    pub co_teaching: ActivityField,
    #[serde(default, alias = "joint_supervision")]
    pub joint_supervision: ActivityField,
}

impl AgreementRecord {
    /// Agreement type, or [`FALLBACK_TYPE`] when missing or blank.
    pub fn type_label(&self) -> &str {
        non_blank(&self.agreement_type).unwrap_or(FALLBACK_TYPE)
    }

    /// University name, or [`FALLBACK_UNIVERSITY`] when missing or blank.
    pub fn university_label(&self) -> &str {
        non_blank(&self.university).unwrap_or(FALLBACK_UNIVERSITY)
    }

    /// Parsed start date; `None` when absent or unparseable.
    pub fn start(&self) -> Option<NaiveDate> {
        self.start_date.as_deref().and_then(parse_date)
    }

    /// Parsed end date; `None` when absent or unparseable.
    pub fn end(&self) -> Option<NaiveDate> {
        self.end_date.as_deref().and_then(parse_date)
    }

    /// True when an end date is present but cannot be parsed.
    pub fn has_invalid_end_date(&self) -> bool {
        non_blank(&self.end_date).is_some() && self.end().is_none()
    }

    /// Whether this record belongs to the given university (trimmed, case-insensitive).
    pub fn belongs_to(&self, university: &str) -> bool {
        non_blank(&self.university)
            .map(|name| name.eq_ignore_ascii_case(university.trim()))
            .unwrap_or(false)
    }

    /// Normalize every activity column into typed entry lists.
    pub fn activities(&self) -> Activities {
        Activities {
            student_mobility: self.student_mobility.normalize(),
            staff_mobility: self.staff_mobility.normalize(),
            joint_research: self.joint_research.normalize(),
            joint_publication: self.joint_publication.normalize(),
            co_teaching: self.co_teaching.normalize(),
            joint_supervision: self.joint_supervision.normalize(),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("invalid agreement id: {}", other))),
    }
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// An activity column as it arrives from storage.
///
/// Upstream stores these either as a native JSON array or as a string
/// holding a JSON-encoded array.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ActivityField {
    #[default]
    Absent,
    Raw(String),
    Parsed(Vec<ActivityEntry>),
}

impl From<Value> for ActivityField {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => ActivityField::Raw(s),
            Value::Array(items) => {
                ActivityField::Parsed(items.into_iter().map(ActivityEntry).collect())
            }
            _ => ActivityField::Absent,
        }
    }
}

impl<'de> Deserialize<'de> for ActivityField {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(ActivityField::from)
    }
}

impl ActivityField {
    /// Resolve the column to a list of entries. Never fails: anything that
    /// is not an array (after decoding a raw string) becomes empty.
    pub fn normalize(&self) -> Vec<ActivityEntry> {
        match self {
            ActivityField::Absent => Vec::new(),
            ActivityField::Parsed(entries) => entries.clone(),
            ActivityField::Raw(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Array(items)) => items.into_iter().map(ActivityEntry).collect(),
                Ok(_) => {
                    debug!("Activity column is not a JSON array, treating as empty");
                    Vec::new()
                }
                Err(e) => {
                    debug!("Unparseable activity column ({}), treating as empty", e);
                    Vec::new()
                }
            },
        }
    }
}

/// A single loosely-typed activity entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEntry(pub Value);

impl ActivityEntry {
    /// Number of students carried by this entry; 0 when missing or invalid.
    pub fn number_of_students(&self) -> u64 {
        ["numberOfStudents", "number_of_students"]
            .iter()
            .find_map(|key| self.0.get(key))
            .map(count_value)
            .unwrap_or(0)
    }
}

fn count_value(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && *f > 0.0)
                        .map(|f| f as u64)
                })
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Activity columns of one record after normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Activities {
    pub student_mobility: Vec<ActivityEntry>,
    pub staff_mobility: Vec<ActivityEntry>,
    pub joint_research: Vec<ActivityEntry>,
    pub joint_publication: Vec<ActivityEntry>,
    pub co_teaching: Vec<ActivityEntry>,
    pub joint_supervision: Vec<ActivityEntry>,
}

/// Urgency class of an expiry notification.
///
/// Ordered from most to least urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NotificationBucket {
    #[serde(rename = "expired")]
    Expired,
    #[serde(rename = "1-month")]
    OneMonth,
    #[serde(rename = "6-month")]
    SixMonth,
}

impl NotificationBucket {
    /// Stable label used in persisted keys.
    pub fn label(&self) -> &'static str {
        match self {
            NotificationBucket::Expired => "expired",
            NotificationBucket::OneMonth => "1-month",
            NotificationBucket::SixMonth => "6-month",
        }
    }

    /// Display priority (lower is more urgent).
    pub fn priority(&self) -> u8 {
        match self {
            NotificationBucket::Expired => 0,
            NotificationBucket::OneMonth => 1,
            NotificationBucket::SixMonth => 2,
        }
    }

    /// Returns an emoji representation of the bucket.
    pub fn emoji(&self) -> &'static str {
        match self {
            NotificationBucket::Expired => "🔴",
            NotificationBucket::OneMonth => "🟠",
            NotificationBucket::SixMonth => "🟡",
        }
    }
}

impl fmt::Display for NotificationBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a bucket or key string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid notification key: {0}")]
pub struct InvalidKey(pub String);

impl FromStr for NotificationBucket {
    type Err = InvalidKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expired" => Ok(NotificationBucket::Expired),
            "1-month" => Ok(NotificationBucket::OneMonth),
            "6-month" => Ok(NotificationBucket::SixMonth),
            other => Err(InvalidKey(other.to_string())),
        }
    }
}

/// Composite identity of a notification: `(agreement id, bucket)`.
///
/// Rendered as `"<id>:<bucket>"` for persistence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NotificationKey {
    pub agreement_id: String,
    pub bucket: NotificationBucket,
}

impl NotificationKey {
    pub fn new(agreement_id: impl Into<String>, bucket: NotificationBucket) -> Self {
        Self {
            agreement_id: agreement_id.into(),
            bucket,
        }
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.agreement_id, self.bucket)
    }
}

impl FromStr for NotificationKey {
    type Err = InvalidKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, bucket) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| InvalidKey(s.to_string()))?;
        if id.is_empty() {
            return Err(InvalidKey(s.to_string()));
        }
        let bucket = bucket.parse().map_err(|_| InvalidKey(s.to_string()))?;
        Ok(NotificationKey::new(id, bucket))
    }
}

impl Serialize for NotificationKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NotificationKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// A derived expiry notification for one agreement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEntry {
    pub key: NotificationKey,
    pub university: String,
    pub agreement_type: String,
    pub end_date: NaiveDate,
    /// Whole days from today until the end date (negative once past).
    pub days_remaining: i64,
    pub title: String,
    pub message: String,
    pub priority: u8,
    /// Whether the current user has acknowledged this notification.
    pub read: bool,
}

impl NotificationEntry {
    pub fn bucket(&self) -> NotificationBucket {
        self.key.bucket
    }
}

/// Insertion-ordered tally of string keys.
///
/// Keys keep their first-seen position, which is what tie-breaking in
/// top-N listings relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountMap {
    entries: Vec<(String, usize)>,
    positions: HashMap<String, usize>,
}

impl CountMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one occurrence of `key`.
    pub fn increment(&mut self, key: &str) {
        self.add(key, 1);
    }

    /// Add `count` occurrences of `key`.
    pub fn add(&mut self, key: &str, count: usize) {
        match self.positions.get(key) {
            Some(&index) => self.entries[index].1 += count,
            None => {
                self.positions.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), count));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<usize> {
        self.positions.get(key).map(|&index| self.entries[index].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all counts.
    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, count)| count).sum()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(key, count)| (key.as_str(), *count))
    }
}

impl FromIterator<(String, usize)> for CountMap {
    fn from_iter<I: IntoIterator<Item = (String, usize)>>(iter: I) -> Self {
        let mut map = CountMap::new();
        for (key, count) in iter {
            map.add(&key, count);
        }
        map
    }
}

impl Serialize for CountMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, count) in &self.entries {
            map.serialize_entry(key, count)?;
        }
        map.end()
    }
}

/// Totals across the activity columns of all records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivityTotals {
    /// Sum of student counts in student mobility entries.
    pub students: u64,
    /// Number of staff mobility entries.
    pub staff: usize,
    /// Joint research plus joint publication entries.
    pub research_and_publication: usize,
    /// Co-teaching plus joint supervision entries.
    pub teaching_and_supervision: usize,
}

/// Aggregate statistics over a record batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub total_agreements: usize,
    pub active: usize,
    pub expired: usize,
    /// Records excluded from the active/expired partition.
    pub without_end_date: usize,
    pub by_type: CountMap,
    pub by_university: CountMap,
    pub by_start_year: BTreeMap<i32, usize>,
    pub activities: ActivityTotals,
}

/// Metadata about a rendered dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardMetadata {
    pub generated_at: DateTime<Utc>,
    pub today: NaiveDate,
    /// "admin" or "partner: <university>".
    pub view: String,
    pub source: String,
    pub records_loaded: usize,
    pub records_skipped: usize,
}

/// Everything a dashboard view renders.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub metadata: DashboardMetadata,
    pub stats: Stats,
    pub top_types: Vec<(String, usize)>,
    pub top_universities: Vec<(String, usize)>,
    pub notifications: Vec<NotificationEntry>,
    pub unread: usize,
}
