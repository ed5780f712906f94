//! Cross-tester conflict detection.
//!
//! Runs sharing a (case, offer) key are the same logical test. A group is a
//! conflict iff its runs disagree on status; differing commentary under the
//! same status is not a conflict.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::error::{InsightError, Result};
use crate::record::{CaseKey, Status, TestRecord};
use crate::util::compare_identifiers;

/// The testers behind one of a group's distinct statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTesters {
    pub status: Status,
    /// Distinct testers, in first-occurrence order.
    pub testers: Vec<String>,
    pub runs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictGroup {
    pub case_id: String,
    pub offer_id: String,
    /// Distinct statuses in [`Status::ALL`] order; always two or more.
    pub statuses: Vec<Status>,
    pub testers_by_status: Vec<StatusTesters>,
    pub records: Vec<TestRecord>,
}

impl ConflictGroup {
    /// Build the group for one logical test case. Returns `Ok(None)` when
    /// the runs agree on status.
    ///
    /// `runs` must be non-empty and share one (case, offer) key.
    pub fn from_runs(runs: Vec<TestRecord>) -> Result<Option<Self>> {
        let Some(first) = runs.first() else {
            return Err(InsightError::invariant(
                "conflict.from_runs",
                "a logical test case needs at least one run",
            ));
        };
        let key = first.key();
        if let Some(stray) = runs.iter().find(|run| run.key() != key) {
            return Err(InsightError::invariant(
                "conflict.from_runs",
                format!(
                    "run for ({}, {}) grouped under ({}, {})",
                    stray.case_id(),
                    stray.offer_id(),
                    key.case_id,
                    key.offer_id
                ),
            ));
        }

        let testers_by_status: Vec<StatusTesters> = Status::ALL
            .iter()
            .filter_map(|&status| {
                let mut testers: Vec<String> = Vec::new();
                let mut count = 0;
                for run in runs.iter().filter(|run| run.status() == status) {
                    count += 1;
                    if !testers.iter().any(|name| name == run.tester_name()) {
                        testers.push(run.tester_name().to_string());
                    }
                }
                (count > 0).then_some(StatusTesters {
                    status,
                    testers,
                    runs: count,
                })
            })
            .collect();

        if testers_by_status.len() < 2 {
            return Ok(None);
        }

        Ok(Some(Self {
            case_id: key.case_id,
            offer_id: key.offer_id,
            statuses: testers_by_status.iter().map(|entry| entry.status).collect(),
            testers_by_status,
            records: runs,
        }))
    }

    #[must_use]
    pub fn key(&self) -> CaseKey {
        CaseKey {
            case_id: self.case_id.clone(),
            offer_id: self.offer_id.clone(),
        }
    }

    #[must_use]
    pub fn run_count(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn testers_for(&self, status: Status) -> &[String] {
        self.testers_by_status
            .iter()
            .find(|entry| entry.status == status)
            .map(|entry| entry.testers.as_slice())
            .unwrap_or(&[])
    }
}

/// Most runs first, then case and offer identifiers ascending.
fn group_order(a: &ConflictGroup, b: &ConflictGroup) -> Ordering {
    b.run_count()
        .cmp(&a.run_count())
        .then_with(|| compare_identifiers(&a.case_id, &b.case_id))
        .then_with(|| compare_identifiers(&a.offer_id, &b.offer_id))
}

/// Find every logical test case whose runs disagree on status.
pub fn detect_conflicts(records: &[TestRecord]) -> Result<Vec<ConflictGroup>> {
    let mut order: Vec<CaseKey> = Vec::new();
    let mut groups: HashMap<CaseKey, Vec<TestRecord>> = HashMap::new();
    for record in records {
        groups
            .entry(record.key())
            .or_insert_with(|| {
                order.push(record.key());
                Vec::new()
            })
            .push(record.clone());
    }

    let logical_cases = order.len();
    let mut conflicts = Vec::new();
    for key in order {
        let runs = groups.remove(&key).unwrap_or_default();
        if runs.len() < 2 {
            continue;
        }
        if let Some(group) = ConflictGroup::from_runs(runs)? {
            conflicts.push(group);
        }
    }
    conflicts.sort_by(group_order);

    tracing::debug!(
        records = records.len(),
        logical_cases,
        conflicts = conflicts.len(),
        "detected status conflicts"
    );
    Ok(conflicts)
}

/// Conflict load per offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfferConflicts {
    pub offer_id: String,
    pub conflicting_cases: usize,
    pub conflicting_runs: usize,
}

/// Offers ranked by conflicting logical cases, then offer id ascending.
#[must_use]
pub fn offers_with_conflicts(groups: &[ConflictGroup]) -> Vec<OfferConflicts> {
    let mut offers: Vec<OfferConflicts> = Vec::new();
    for group in groups {
        match offers
            .iter_mut()
            .find(|entry| entry.offer_id == group.offer_id)
        {
            Some(entry) => {
                entry.conflicting_cases += 1;
                entry.conflicting_runs += group.run_count();
            }
            None => offers.push(OfferConflicts {
                offer_id: group.offer_id.clone(),
                conflicting_cases: 1,
                conflicting_runs: group.run_count(),
            }),
        }
    }
    offers.sort_by(|a, b| {
        b.conflicting_cases
            .cmp(&a.conflicting_cases)
            .then_with(|| compare_identifiers(&a.offer_id, &b.offer_id))
    });
    offers
}
