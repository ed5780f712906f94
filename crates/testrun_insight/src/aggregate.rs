//! Aggregate counts over a normalized record set.
//!
//! Group keys keep the insertion order of their first occurrence; callers
//! that want sorted presentation sort on their side. The one ranked view,
//! [`AggregateReport::bug_ranking`], uses Fail count descending with tester
//! name ascending as the tie-break.

use std::collections::{HashMap, HashSet};

use serde::{Serialize, Serializer};

use crate::record::{CaseKey, Status, TestRecord};

/// Per-status tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pass: usize,
    pub fail: usize,
    pub blocked: usize,
    pub pending: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: Status) {
        match status {
            Status::Pass => self.pass += 1,
            Status::Fail => self.fail += 1,
            Status::Blocked => self.blocked += 1,
            Status::Pending => self.pending += 1,
        }
    }

    #[must_use]
    pub fn get(&self, status: Status) -> usize {
        match status {
            Status::Pass => self.pass,
            Status::Fail => self.fail,
            Status::Blocked => self.blocked,
            Status::Pending => self.pending,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.pass + self.fail + self.blocked + self.pending
    }

    /// Pass percentage in `[0, 100]`; 0 when nothing was recorded.
    #[must_use]
    pub fn pass_rate(&self) -> f64 {
        percentage(self.pass, self.total())
    }
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusShare {
    pub status: Status,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupEntry {
    pub key: String,
    pub counts: StatusCounts,
}

/// Key → status breakdown, in first-occurrence order of the keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedCounts {
    entries: Vec<GroupEntry>,
    index: HashMap<String, usize>,
}

impl GroupedCounts {
    pub fn record(&mut self, key: &str, status: Status) {
        let slot = match self.index.get(key) {
            Some(&slot) => slot,
            None => {
                self.entries.push(GroupEntry {
                    key: key.to_string(),
                    counts: StatusCounts::default(),
                });
                self.index.insert(key.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        self.entries[slot].counts.record(status);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&StatusCounts> {
        self.index.get(key).map(|&slot| &self.entries[slot].counts)
    }

    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.key.as_str()).collect()
    }

    #[must_use]
    pub fn entries(&self) -> &[GroupEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for GroupedCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TesterMetrics {
    pub tester_name: String,
    pub counts: StatusCounts,
    pub pass_rate: f64,
    pub distinct_cases: usize,
    pub distinct_offers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BugRank {
    pub tester_name: String,
    pub bugs_found: usize,
    pub total_runs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub total: usize,
    /// Always all four statuses, in [`Status::ALL`] order.
    pub status_shares: Vec<StatusShare>,
    pub by_tester: GroupedCounts,
    pub by_stream: GroupedCounts,
    pub by_domain: GroupedCounts,
    pub by_offer: GroupedCounts,
    /// Dated records only, keyed `YYYY-MM-DD`.
    pub by_date: GroupedCounts,
    pub undated_records: usize,
    /// Testers in first-occurrence order.
    pub testers: Vec<TesterMetrics>,
    pub bug_ranking: Vec<BugRank>,
}

impl AggregateReport {
    #[must_use]
    pub fn share(&self, status: Status) -> Option<&StatusShare> {
        self.status_shares.iter().find(|share| share.status == status)
    }

    #[must_use]
    pub fn tester(&self, name: &str) -> Option<&TesterMetrics> {
        self.testers.iter().find(|tester| tester.tester_name == name)
    }
}

#[derive(Default)]
struct TesterAccumulator {
    counts: StatusCounts,
    cases: HashSet<CaseKey>,
    offers: HashSet<String>,
}

/// Compute every aggregate over `records`.
#[must_use]
pub fn aggregate(records: &[TestRecord]) -> AggregateReport {
    let mut overall = StatusCounts::default();
    let mut by_tester = GroupedCounts::default();
    let mut by_stream = GroupedCounts::default();
    let mut by_domain = GroupedCounts::default();
    let mut by_offer = GroupedCounts::default();
    let mut by_date = GroupedCounts::default();
    let mut undated_records = 0;
    let mut tester_order: Vec<String> = Vec::new();
    let mut tester_acc: HashMap<String, TesterAccumulator> = HashMap::new();

    for record in records {
        let status = record.status();
        overall.record(status);
        by_tester.record(record.tester_name(), status);
        by_stream.record(record.stream(), status);
        by_domain.record(record.domain(), status);
        by_offer.record(record.offer_id(), status);
        match record.date_label() {
            Some(date) => by_date.record(&date, status),
            None => undated_records += 1,
        }

        let acc = tester_acc
            .entry(record.tester_name().to_string())
            .or_insert_with(|| {
                tester_order.push(record.tester_name().to_string());
                TesterAccumulator::default()
            });
        acc.counts.record(status);
        acc.cases.insert(record.key());
        acc.offers.insert(record.offer_id().to_string());
    }

    let total = overall.total();
    let status_shares = Status::ALL
        .iter()
        .map(|&status| StatusShare {
            status,
            count: overall.get(status),
            percentage: percentage(overall.get(status), total),
        })
        .collect();

    let testers: Vec<TesterMetrics> = tester_order
        .iter()
        .filter_map(|name| {
            tester_acc.get(name).map(|acc| TesterMetrics {
                tester_name: name.clone(),
                counts: acc.counts,
                pass_rate: acc.counts.pass_rate(),
                distinct_cases: acc.cases.len(),
                distinct_offers: acc.offers.len(),
            })
        })
        .collect();

    let mut bug_ranking: Vec<BugRank> = testers
        .iter()
        .map(|tester| BugRank {
            tester_name: tester.tester_name.clone(),
            bugs_found: tester.counts.fail,
            total_runs: tester.counts.total(),
        })
        .collect();
    bug_ranking.sort_by(|a, b| {
        b.bugs_found
            .cmp(&a.bugs_found)
            .then_with(|| a.tester_name.cmp(&b.tester_name))
    });

    tracing::debug!(
        total,
        testers = testers.len(),
        streams = by_stream.len(),
        dates = by_date.len(),
        undated_records,
        "aggregated records"
    );

    AggregateReport {
        total,
        status_shares,
        by_tester,
        by_stream,
        by_domain,
        by_offer,
        by_date,
        undated_records,
        testers,
        bug_ranking,
    }
}
