//! Expiry notifications.
//!
//! Classifies agreement end dates into urgency buckets relative to a
//! supplied `today` and merges in the user's persisted read state.

use crate::analysis::dates::days_until;
use crate::models::{AgreementRecord, NotificationBucket, NotificationEntry, NotificationKey};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Bucket window lengths in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryWindows {
    pub one_month_days: i64,
    pub six_month_days: i64,
}

impl Default for ExpiryWindows {
    fn default() -> Self {
        Self {
            one_month_days: 30,
            six_month_days: 180,
        }
    }
}

/// Which notification rules apply.
///
/// The two views disagree on expired agreements and on bucket overlap, so
/// each is kept as its own strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationPolicy {
    /// All records; expired agreements are not reported and the 1-month and
    /// 6-month buckets are mutually exclusive.
    Admin,
    /// Records of one university; expired agreements are reported and the
    /// 6-month bucket also covers the 1-month window.
    Partner { university: String },
}

impl NotificationPolicy {
    /// Whether a record is visible under this policy.
    pub fn includes(&self, record: &AgreementRecord) -> bool {
        match self {
            NotificationPolicy::Admin => true,
            NotificationPolicy::Partner { university } => record.belongs_to(university),
        }
    }

    /// Restrict a batch to the records visible under this policy.
    pub fn scope(&self, records: &[AgreementRecord]) -> Vec<AgreementRecord> {
        records
            .iter()
            .filter(|record| self.includes(record))
            .cloned()
            .collect()
    }

    /// Buckets a record with `days` remaining falls into.
    pub fn buckets(&self, days: i64, windows: ExpiryWindows) -> Vec<NotificationBucket> {
        match self {
            NotificationPolicy::Admin => classify_admin(days, windows).into_iter().collect(),
            NotificationPolicy::Partner { .. } => classify_partner(days, windows),
        }
    }
}

impl fmt::Display for NotificationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationPolicy::Admin => write!(f, "admin"),
            NotificationPolicy::Partner { university } => write!(f, "partner: {}", university),
        }
    }
}

/// Admin classification: at most one bucket, nothing once expired.
pub fn classify_admin(days: i64, windows: ExpiryWindows) -> Option<NotificationBucket> {
    if days <= 0 {
        None
    } else if days <= windows.one_month_days {
        Some(NotificationBucket::OneMonth)
    } else if days <= windows.six_month_days {
        Some(NotificationBucket::SixMonth)
    } else {
        None
    }
}

/// Partner classification: expired is reported, 6-month overlaps 1-month.
pub fn classify_partner(days: i64, windows: ExpiryWindows) -> Vec<NotificationBucket> {
    if days <= 0 {
        return vec![NotificationBucket::Expired];
    }

    let mut buckets = Vec::new();
    if days <= windows.one_month_days {
        buckets.push(NotificationBucket::OneMonth);
    }
    if days <= windows.six_month_days {
        buckets.push(NotificationBucket::SixMonth);
    }
    buckets
}

/// Admin notifications with the default windows.
pub fn compute_notifications(records: &[AgreementRecord], today: NaiveDate) -> Vec<NotificationEntry> {
    compute_with_policy(records, today, &NotificationPolicy::Admin, ExpiryWindows::default())
}

/// Partner notifications for one university with the default windows.
pub fn compute_partner_notifications(
    records: &[AgreementRecord],
    university: &str,
    today: NaiveDate,
) -> Vec<NotificationEntry> {
    let policy = NotificationPolicy::Partner {
        university: university.to_string(),
    };
    compute_with_policy(records, today, &policy, ExpiryWindows::default())
}

/// Compute the full notification list, soonest-expiring first.
///
/// Records without a parseable end date are skipped. All entries start
/// unread; see [`merge_read_state`].
pub fn compute_with_policy(
    records: &[AgreementRecord],
    today: NaiveDate,
    policy: &NotificationPolicy,
    windows: ExpiryWindows,
) -> Vec<NotificationEntry> {
    let mut entries = Vec::new();

    for record in records.iter().filter(|record| policy.includes(record)) {
        let Some(end) = record.end() else {
            debug!("Agreement {} has no usable end date, skipping", record.id);
            continue;
        };

        let days = days_until(today, end);
        for bucket in policy.buckets(days, windows) {
            entries.push(build_entry(record, bucket, end, days));
        }
    }

    // Stable: equal days keep input order.
    entries.sort_by_key(|entry| entry.days_remaining);
    entries
}

fn build_entry(
    record: &AgreementRecord,
    bucket: NotificationBucket,
    end: NaiveDate,
    days: i64,
) -> NotificationEntry {
    let agreement_type = record.type_label().to_string();
    let university = record.university_label().to_string();

    let title = match bucket {
        NotificationBucket::Expired => format!("Agreement expired: {}", university),
        NotificationBucket::OneMonth => format!("Agreement expiring within 1 month: {}", university),
        NotificationBucket::SixMonth => format!("Agreement expiring within 6 months: {}", university),
    };

    let mut message = match bucket {
        NotificationBucket::Expired if days == 0 => format!(
            "The {} agreement with {} ends today ({}).",
            agreement_type, university, end
        ),
        NotificationBucket::Expired => format!(
            "The {} agreement with {} expired on {} ({} days ago).",
            agreement_type,
            university,
            end,
            -days
        ),
        _ => format!(
            "The {} agreement with {} expires on {} ({} {} remaining).",
            agreement_type,
            university,
            end,
            days,
            if days == 1 { "day" } else { "days" }
        ),
    };

    if let Some(pic) = record
        .person_in_charge
        .as_deref()
        .map(str::trim)
        .filter(|pic| !pic.is_empty())
    {
        message.push_str(&format!(" Person in charge: {}.", pic));
    }

    NotificationEntry {
        key: NotificationKey::new(record.id.clone(), bucket),
        university,
        agreement_type,
        end_date: end,
        days_remaining: days,
        title,
        message,
        priority: bucket.priority(),
        read: false,
    }
}

/// Mark each entry read when its key is in `read_keys`.
pub fn merge_read_state(
    entries: Vec<NotificationEntry>,
    read_keys: &BTreeSet<NotificationKey>,
) -> Vec<NotificationEntry> {
    entries
        .into_iter()
        .map(|mut entry| {
            entry.read = read_keys.contains(&entry.key);
            entry
        })
        .collect()
}

/// Number of unread entries.
pub fn unread_count(entries: &[NotificationEntry]) -> usize {
    entries.iter().filter(|entry| !entry.read).count()
}

/// Whether any unread entry is at least as urgent as `threshold`.
pub fn has_unread_at_or_above(entries: &[NotificationEntry], threshold: NotificationBucket) -> bool {
    entries
        .iter()
        .any(|entry| !entry.read && entry.bucket() <= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn create_test_record(id: &str, university: &str, days_from_today: i64) -> AgreementRecord {
        let end = today() + Duration::days(days_from_today);
        AgreementRecord {
            id: id.to_string(),
            university: Some(university.to_string()),
            agreement_type: Some("MOU".to_string()),
            end_date: Some(end.format("%Y-%m-%d").to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_one_month_bucket_sorted_first() {
        let records = vec![
            create_test_record("2", "Uni B", 45),
            create_test_record("1", "Uni A", 10),
        ];

        let entries = compute_notifications(&records, today());

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, NotificationKey::new("1", NotificationBucket::OneMonth));
        assert_eq!(entries[0].days_remaining, 10);
        assert_eq!(entries[0].priority, 1);
        assert_eq!(entries[1].bucket(), NotificationBucket::SixMonth);
        assert_eq!(entries[1].days_remaining, 45);
        assert_eq!(entries[1].priority, 2);
    }

    #[test]
    fn test_admin_boundaries() {
        let windows = ExpiryWindows::default();
        assert_eq!(classify_admin(-5, windows), None);
        assert_eq!(classify_admin(0, windows), None);
        assert_eq!(classify_admin(1, windows), Some(NotificationBucket::OneMonth));
        assert_eq!(classify_admin(30, windows), Some(NotificationBucket::OneMonth));
        assert_eq!(classify_admin(31, windows), Some(NotificationBucket::SixMonth));
        assert_eq!(classify_admin(180, windows), Some(NotificationBucket::SixMonth));
        assert_eq!(classify_admin(181, windows), None);
    }

    #[test]
    fn test_partner_boundaries() {
        let windows = ExpiryWindows::default();
        assert_eq!(classify_partner(0, windows), vec![NotificationBucket::Expired]);
        assert_eq!(
            classify_partner(10, windows),
            vec![NotificationBucket::OneMonth, NotificationBucket::SixMonth]
        );
        assert_eq!(classify_partner(90, windows), vec![NotificationBucket::SixMonth]);
        assert!(classify_partner(200, windows).is_empty());
    }

    #[test]
    fn test_invalid_and_missing_end_dates_skipped() {
        let mut bad = create_test_record("1", "Uni A", 10);
        bad.end_date = Some("not-a-date".to_string());
        let mut missing = create_test_record("2", "Uni A", 10);
        missing.end_date = None;
        let good = create_test_record("3", "Uni A", 10);

        let entries = compute_notifications(&[bad, missing, good], today());

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key.agreement_id, "3");
    }

    #[test]
    fn test_expired_excluded_for_admin() {
        let records = vec![
            create_test_record("1", "Uni A", -3),
            create_test_record("2", "Uni A", 0),
        ];
        assert!(compute_notifications(&records, today()).is_empty());
    }

    #[test]
    fn test_partner_scope_and_overlap() {
        let records = vec![
            create_test_record("1", "Uni A", 10),
            create_test_record("2", "Uni B", 10),
            create_test_record("3", "uni a ", -2),
            create_test_record("4", "Uni A", 100),
        ];

        let entries = compute_partner_notifications(&records, "Uni A", today());
        let keys: Vec<String> = entries.iter().map(|e| e.key.to_string()).collect();

        assert_eq!(keys, vec!["3:expired", "1:1-month", "1:6-month", "4:6-month"]);
        assert_eq!(entries[0].priority, 0);
        assert!(entries[0].message.contains("2 days ago"));
    }

    #[test]
    fn test_equal_days_keep_input_order() {
        let records = vec![
            create_test_record("b", "Uni B", 20),
            create_test_record("a", "Uni A", 20),
        ];

        let entries = compute_notifications(&records, today());

        assert_eq!(entries[0].key.agreement_id, "b");
        assert_eq!(entries[1].key.agreement_id, "a");
    }

    #[test]
    fn test_message_mentions_person_in_charge() {
        let mut record = create_test_record("1", "Uni A", 1);
        record.person_in_charge = Some("Dr. Lim".to_string());

        let entries = compute_notifications(&[record], today());

        assert!(entries[0].message.contains("1 day remaining"));
        assert!(entries[0].message.contains("Person in charge: Dr. Lim."));
        assert!(entries[0].title.contains("Uni A"));
    }

    #[test]
    fn test_custom_windows() {
        let windows = ExpiryWindows {
            one_month_days: 7,
            six_month_days: 60,
        };
        let records = vec![create_test_record("1", "Uni A", 10)];

        let entries = compute_with_policy(&records, today(), &NotificationPolicy::Admin, windows);

        assert_eq!(entries[0].bucket(), NotificationBucket::SixMonth);
    }

    #[test]
    fn test_merge_read_state_round_trip() {
        let records = vec![
            create_test_record("1", "Uni A", 10),
            create_test_record("2", "Uni B", 45),
        ];
        let entries = compute_notifications(&records, today());

        let merged = merge_read_state(entries.clone(), &BTreeSet::new());
        assert!(merged.iter().all(|e| !e.read));
        assert_eq!(unread_count(&merged), 2);

        let read_keys: BTreeSet<_> = [entries[0].key.clone()].into_iter().collect();
        let merged = merge_read_state(entries, &read_keys);
        assert!(merged[0].read);
        assert!(!merged[1].read);
        assert_eq!(unread_count(&merged), 1);
    }

    #[test]
    fn test_unread_threshold() {
        let records = vec![create_test_record("1", "Uni A", 45)];
        let entries = compute_notifications(&records, today());

        assert!(has_unread_at_or_above(&entries, NotificationBucket::SixMonth));
        assert!(!has_unread_at_or_above(&entries, NotificationBucket::OneMonth));

        let read_keys: BTreeSet<_> = entries.iter().map(|e| e.key.clone()).collect();
        let entries = merge_read_state(entries, &read_keys);
        assert!(!has_unread_at_or_above(&entries, NotificationBucket::SixMonth));
    }

    proptest! {
        #[test]
        fn prop_admin_buckets_match_days(offsets in prop::collection::vec(-400i64..400, 0..30)) {
            let records: Vec<_> = offsets
                .iter()
                .enumerate()
                .map(|(i, days)| create_test_record(&i.to_string(), "Uni", *days))
                .collect();

            let entries = compute_notifications(&records, today());

            prop_assert!(entries.windows(2).all(|w| w[0].days_remaining <= w[1].days_remaining));
            for entry in &entries {
                prop_assert!(entry.days_remaining > 0 && entry.days_remaining <= 180);
                if entry.days_remaining <= 30 {
                    prop_assert_eq!(entry.bucket(), NotificationBucket::OneMonth);
                } else {
                    prop_assert_eq!(entry.bucket(), NotificationBucket::SixMonth);
                }
            }

            let expected = offsets.iter().filter(|d| **d > 0 && **d <= 180).count();
            prop_assert_eq!(entries.len(), expected);
        }
    }
}
