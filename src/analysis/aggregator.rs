//! Agreement aggregation and statistics.
//!
//! This module reduces a batch of agreement records into the counts shown
//! on the dashboard: totals, the active/expired split, per-type and
//! per-university tallies, and activity totals.

use crate::models::{Activities, ActivityEntry, ActivityTotals, AgreementRecord, CountMap, Stats};
use chrono::{Datelike, NaiveDate};

/// Compute dashboard statistics for `records` as of `today`.
///
/// Pure and infallible: malformed dates and activity columns degrade to
/// "absent" for the affected record only.
pub fn aggregate(records: &[AgreementRecord], today: NaiveDate) -> Stats {
    let mut stats = Stats {
        total_agreements: records.len(),
        ..Stats::default()
    };

    for record in records {
        stats.by_type.increment(record.type_label());
        stats.by_university.increment(record.university_label());

        match record.end() {
            Some(end) if end >= today => stats.active += 1,
            Some(_) => stats.expired += 1,
            None => stats.without_end_date += 1,
        }

        if let Some(start) = record.start() {
            *stats.by_start_year.entry(start.year()).or_default() += 1;
        }

        add_activities(&mut stats.activities, &record.activities());
    }

    stats
}

/// Fold one record's normalized activities into the running totals.
///
/// The student total saturates at `u64::MAX`.
pub fn add_activities(totals: &mut ActivityTotals, activities: &Activities) {
    totals.students = activities
        .student_mobility
        .iter()
        .map(ActivityEntry::number_of_students)
        .fold(totals.students, u64::saturating_add);
    totals.staff += activities.staff_mobility.len();
    totals.research_and_publication +=
        activities.joint_research.len() + activities.joint_publication.len();
    totals.teaching_and_supervision +=
        activities.co_teaching.len() + activities.joint_supervision.len();
}

/// Get the top `n` entries by count, highest first.
///
/// Ties keep their insertion order.
pub fn get_top_items(counts: &CountMap, n: usize) -> Vec<(String, usize)> {
    let mut items: Vec<(String, usize)> = counts
        .iter()
        .map(|(key, count)| (key.to_string(), count))
        .collect();

    items.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
    items.truncate(n);

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityField;
    use proptest::prelude::*;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn create_test_record(id: &str, kind: Option<&str>, end_date: Option<&str>) -> AgreementRecord {
        AgreementRecord {
            id: id.to_string(),
            university: Some("Universiti Malaya".to_string()),
            agreement_type: kind.map(String::from),
            end_date: end_date.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_type_counts_with_fallback() {
        let records = vec![
            create_test_record("1", Some("MOU"), None),
            create_test_record("2", Some("MOU"), None),
            create_test_record("3", None, None),
        ];

        let stats = aggregate(&records, today());

        assert_eq!(stats.by_type.get("MOU"), Some(2));
        assert_eq!(stats.by_type.get("Other"), Some(1));
        assert_eq!(stats.by_type.len(), 2);
        assert_eq!(stats.total_agreements, 3);
    }

    #[test]
    fn test_active_expired_partition() {
        let records = vec![
            create_test_record("1", Some("MOU"), Some("2025-06-01")),
            create_test_record("2", Some("MOU"), Some("2026-01-01")),
            create_test_record("3", Some("MOA"), Some("2025-05-31")),
            create_test_record("4", Some("MOA"), Some("not-a-date")),
            create_test_record("5", Some("MOA"), None),
        ];

        let stats = aggregate(&records, today());

        assert_eq!(stats.active, 2);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.without_end_date, 2);
        assert_eq!(stats.total_agreements, 5);
    }

    #[test]
    fn test_university_fallback() {
        let mut record = create_test_record("1", Some("MOU"), None);
        record.university = None;

        let stats = aggregate(&[record], today());

        assert_eq!(stats.by_university.get("Unknown"), Some(1));
    }

    #[test]
    fn test_activity_totals() {
        let mut record = create_test_record("1", Some("MOU"), None);
        record.student_mobility = ActivityField::from(json!(
            r#"[{"number_of_students":"20"}, {"number_of_students":"bad"}]"#
        ));
        record.staff_mobility = ActivityField::from(json!([{ "name": "A" }, { "name": "B" }]));
        record.joint_research = ActivityField::from(json!([{ "title": "X" }]));
        record.joint_publication = ActivityField::from(json!("[{\"title\":\"Y\"}]"));
        record.co_teaching = ActivityField::from(json!("garbage"));
        record.joint_supervision = ActivityField::from(json!([{}, {}, {}]));

        let stats = aggregate(&[record], today());

        assert_eq!(stats.activities.students, 20);
        assert_eq!(stats.activities.staff, 2);
        assert_eq!(stats.activities.research_and_publication, 2);
        assert_eq!(stats.activities.teaching_and_supervision, 3);
    }

    #[test]
    fn test_student_total_saturates() {
        let mut a = create_test_record("1", Some("MOU"), None);
        a.student_mobility = ActivityField::from(json!(
            r#"[{"numberOfStudents":"1e30"},{"numberOfStudents":"1"}]"#
        ));
        let mut b = create_test_record("2", Some("MOU"), None);
        b.student_mobility = ActivityField::from(json!([{ "numberOfStudents": 5 }]));

        let stats = aggregate(&[a, b], today());

        assert_eq!(stats.activities.students, u64::MAX);
    }

    #[test]
    fn test_start_year_distribution() {
        let mut a = create_test_record("1", Some("MOU"), None);
        a.start_date = Some("2023-02-01".to_string());
        let mut b = create_test_record("2", Some("MOU"), None);
        b.start_date = Some("2023-09-10T00:00:00Z".to_string());
        let mut c = create_test_record("3", Some("MOU"), None);
        c.start_date = Some("someday".to_string());

        let stats = aggregate(&[a, b, c], today());

        assert_eq!(stats.by_start_year.get(&2023), Some(&2));
        assert_eq!(stats.by_start_year.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        let stats = aggregate(&[], today());
        assert_eq!(stats, Stats::default());
    }

    #[test]
    fn test_get_top_items_stable_ties() {
        let counts: CountMap = vec![
            ("MOA".to_string(), 1),
            ("MOU".to_string(), 3),
            ("LOI".to_string(), 1),
            ("Exchange".to_string(), 2),
        ]
        .into_iter()
        .collect();

        let top = get_top_items(&counts, 3);

        assert_eq!(
            top,
            vec![
                ("MOU".to_string(), 3),
                ("Exchange".to_string(), 2),
                ("MOA".to_string(), 1),
            ]
        );
    }

    fn arb_record() -> impl Strategy<Value = AgreementRecord> {
        (
            0u32..1000,
            proptest::option::of(prop::sample::select(vec!["MOU", "MOA", "LOI", " "])),
            proptest::option::of(prop_oneof![
                (2020i32..2030, 1u32..13, 1u32..29)
                    .prop_map(|(y, m, d)| format!("{:04}-{:02}-{:02}", y, m, d)),
                Just("not-a-date".to_string()),
            ]),
        )
            .prop_map(|(id, kind, end)| AgreementRecord {
                id: id.to_string(),
                agreement_type: kind.map(String::from),
                end_date: end,
                ..Default::default()
            })
    }

    proptest! {
        #[test]
        fn prop_type_counts_sum_to_total(records in prop::collection::vec(arb_record(), 0..40)) {
            let stats = aggregate(&records, today());
            prop_assert_eq!(stats.by_type.total(), stats.total_agreements);
        }

        #[test]
        fn prop_partition_covers_dated_records(records in prop::collection::vec(arb_record(), 0..40)) {
            let stats = aggregate(&records, today());
            let dated = records.iter().filter(|r| r.end().is_some()).count();
            prop_assert_eq!(stats.active + stats.expired, dated);
            prop_assert_eq!(dated + stats.without_end_date, stats.total_agreements);
        }

        #[test]
        fn prop_top_items_bounded_sorted_idempotent(
            pairs in prop::collection::vec(("[a-e]", 1usize..10), 0..20),
            n in 1usize..6,
        ) {
            let counts: CountMap = pairs.into_iter().collect();
            let top = get_top_items(&counts, n);

            prop_assert!(top.len() <= n);
            prop_assert!(top.windows(2).all(|w| w[0].1 >= w[1].1));

            let again = get_top_items(&top.iter().cloned().collect(), n);
            prop_assert_eq!(again, top);
        }
    }
}
