//! Property-based invariants for assembled snapshots.
//!
//! 1. Status percentages sum to 100 (or 0 for an empty record set).
//! 2. Conflict groups hold two or more statuses, and every disagreeing
//!    logical case appears in exactly one group.
//! 3. Every emitted pattern has at least two occurrences.
//! 4. Patterns are ordered by count descending, then signature ascending.
//! 5. Accepted plus rejected rows equals the input row count.
//! 6. Assembling the same rows twice yields identical snapshots.
//! 7. With mixed numeric and alphanumeric identifiers, conflict order,
//!    offer ranking and pattern contents do not depend on row order.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use serde_json::{Value, json};
use testrun_insight::{RawRow, Status, assemble};

// ── Strategies ────────────────────────────────────────────────────────────

const STATUSES: [&str; 6] = ["Pass", "fail", "BLOCKED", "pending", "flaky", ""];
const COMMENTS: [&str; 6] = [
    "",
    "Gateway timeout",
    "subscriber not found",
    "Balance not deducted",
    "balance not deducted!",
    "app crashed on launch",
];

fn raw_row() -> impl Strategy<Value = RawRow> {
    (
        prop_oneof![9 => (1u8..6).prop_map(Some), 1 => Just(None)],
        0u8..3,
        0u8..4,
        0usize..STATUSES.len(),
        0usize..COMMENTS.len(),
    )
        .prop_map(|(case, offer, tester, status, comment)| {
            let mut row = json!({
                "Offer ID": format!("OFF-{offer}"),
                "Tester Name": format!("tester-{tester}"),
                "Status": STATUSES[status],
                "Actual Result": COMMENTS[comment],
            });
            if let (Some(case), Value::Object(map)) = (case, &mut row) {
                map.insert("Case ID".to_string(), json!(case));
            }
            serde_json::from_value(row).expect("row object")
        })
}

fn raw_rows() -> impl Strategy<Value = Vec<RawRow>> {
    prop::collection::vec(raw_row(), 0..40)
}

const MIXED_CASES: [&str; 6] = ["9", "10", "1a", "TC-2", "01", "1"];
const MIXED_OFFERS: [&str; 4] = ["9", "10", "1a", "OFF-2"];

fn mixed_id_row() -> impl Strategy<Value = RawRow> {
    (
        0usize..MIXED_CASES.len(),
        0usize..MIXED_OFFERS.len(),
        0u8..3,
        0usize..4,
        0usize..COMMENTS.len(),
    )
        .prop_map(|(case, offer, tester, status, comment)| {
            serde_json::from_value(json!({
                "Case ID": MIXED_CASES[case],
                "Offer ID": MIXED_OFFERS[offer],
                "Tester Name": format!("tester-{tester}"),
                "Status": STATUSES[status],
                "Actual Result": COMMENTS[comment],
            }))
            .expect("row object")
        })
}

/// The same rows in their generated order and in a shuffled order.
fn mixed_rows_and_permutation() -> impl Strategy<Value = (Vec<RawRow>, Vec<RawRow>)> {
    prop::collection::vec(mixed_id_row(), 0..60)
        .prop_flat_map(|rows| (Just(rows.clone()), Just(rows).prop_shuffle()))
}

type PatternView = (String, usize, Vec<String>, Vec<String>, Vec<String>);

fn order_sensitive_views(
    rows: &[RawRow],
) -> (Vec<(String, String)>, Vec<(String, usize, usize)>, Vec<PatternView>) {
    let snapshot = assemble(rows).unwrap();
    let conflicts = snapshot
        .conflicts
        .iter()
        .map(|group| (group.case_id.clone(), group.offer_id.clone()))
        .collect();
    let offers = snapshot
        .offers_with_conflicts
        .iter()
        .map(|offer| {
            (
                offer.offer_id.clone(),
                offer.conflicting_cases,
                offer.conflicting_runs,
            )
        })
        .collect();
    let patterns = snapshot
        .patterns
        .iter()
        .map(|pattern| {
            (
                pattern.signature.clone(),
                pattern.count,
                pattern.offer_ids.clone(),
                pattern.case_ids.clone(),
                pattern.testers.clone(),
            )
        })
        .collect();
    (conflicts, offers, patterns)
}

proptest! {
    #[test]
    fn status_percentages_sum_to_hundred_or_zero(rows in raw_rows()) {
        let snapshot = assemble(&rows).unwrap();
        let sum: f64 = snapshot.aggregate.status_shares.iter().map(|s| s.percentage).sum();
        if snapshot.aggregate.total > 0 {
            prop_assert!((sum - 100.0).abs() <= 0.01, "sum {}", sum);
        } else {
            prop_assert_eq!(sum, 0.0);
        }
    }

    #[test]
    fn conflicts_cover_exactly_the_disagreeing_cases(rows in raw_rows()) {
        let snapshot = assemble(&rows).unwrap();

        let mut statuses: BTreeMap<(String, String), BTreeSet<Status>> = BTreeMap::new();
        for record in &snapshot.records {
            statuses
                .entry((record.case_id().to_string(), record.offer_id().to_string()))
                .or_default()
                .insert(record.status());
        }
        let expected: BTreeSet<_> = statuses
            .iter()
            .filter(|(_, set)| set.len() >= 2)
            .map(|(key, _)| key.clone())
            .collect();

        let mut seen = BTreeSet::new();
        for group in &snapshot.conflicts {
            prop_assert!(group.statuses.len() >= 2);
            prop_assert!(seen.insert((group.case_id.clone(), group.offer_id.clone())));
        }
        prop_assert_eq!(seen, expected);
    }

    #[test]
    fn patterns_need_two_occurrences_and_are_ranked(rows in raw_rows()) {
        let snapshot = assemble(&rows).unwrap();
        for pattern in &snapshot.patterns {
            prop_assert!(pattern.count >= 2, "{} occurs {}", pattern.signature, pattern.count);
        }
        for pair in snapshot.patterns.windows(2) {
            let ordered = pair[0].count > pair[1].count
                || (pair[0].count == pair[1].count && pair[0].signature < pair[1].signature);
            prop_assert!(ordered, "{:?} before {:?}", pair[0].signature, pair[1].signature);
        }
    }

    #[test]
    fn every_row_is_accepted_or_rejected(rows in raw_rows()) {
        let snapshot = assemble(&rows).unwrap();
        prop_assert_eq!(snapshot.accepted_records + snapshot.rejected_rows, rows.len());
        prop_assert_eq!(snapshot.aggregate.total, snapshot.accepted_records);
        let missing_case = rows.iter().filter(|row| !row.contains_key("Case ID")).count();
        prop_assert_eq!(snapshot.rejected_rows, missing_case);
    }

    #[test]
    fn assembly_is_deterministic(rows in raw_rows()) {
        let first = assemble(&rows).unwrap();
        let second = assemble(&rows).unwrap();
        prop_assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn row_order_does_not_change_rankings((rows, shuffled) in mixed_rows_and_permutation()) {
        let (conflicts, offers, patterns) = order_sensitive_views(&rows);
        let (shuffled_conflicts, shuffled_offers, shuffled_patterns) =
            order_sensitive_views(&shuffled);
        prop_assert_eq!(conflicts, shuffled_conflicts);
        prop_assert_eq!(offers, shuffled_offers);
        prop_assert_eq!(patterns, shuffled_patterns);
    }
}
