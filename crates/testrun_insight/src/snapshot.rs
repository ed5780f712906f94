//! Report assembly: one immutable [`AnalyticsSnapshot`] per input set.
//!
//! The assembler normalizes the rows once, then runs the aggregator, the
//! conflict detector and the pattern miner over the same read-only record
//! slice. Nothing is cached between calls, so identical input always yields
//! an identical snapshot (and fingerprint).

use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregate::{AggregateReport, aggregate};
use crate::config::EngineConfig;
use crate::conflict::{ConflictGroup, OfferConflicts, detect_conflicts, offers_with_conflicts};
use crate::error::Result;
use crate::pattern::{PatternSignature, mine_patterns};
use crate::record::{
    CaseKey, NormalizedBatch, RawRow, TestRecord, ValidationWarning, WarningKind, normalize_rows,
};
use crate::util::sha256_hex;

/// Current version of the snapshot schema.
pub const SNAPSHOT_VERSION: &str = "testrun-insight-v1";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    pub version: String,
    pub input_rows: usize,
    pub accepted_records: usize,
    pub rejected_rows: usize,
    pub aggregate: AggregateReport,
    pub conflicts: Vec<ConflictGroup>,
    pub offers_with_conflicts: Vec<OfferConflicts>,
    pub patterns: Vec<PatternSignature>,
    pub failing_records: usize,
    pub unexplained_failures: usize,
    /// Every validation warning, in input-row order.
    pub warnings: Vec<ValidationWarning>,
    /// The normalized records the analyses ran over.
    pub records: Vec<TestRecord>,
}

impl AnalyticsSnapshot {
    /// Warning counts keyed by kind.
    #[must_use]
    pub fn warning_counts(&self) -> BTreeMap<WarningKind, usize> {
        let mut counts = BTreeMap::new();
        for warning in &self.warnings {
            *counts.entry(warning.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Caller-facing note about excluded rows, if any were excluded.
    #[must_use]
    pub fn rejection_notice(&self) -> Option<String> {
        match self.rejected_rows {
            0 => None,
            1 => Some("1 row excluded due to missing identifiers".to_string()),
            n => Some(format!("{n} rows excluded due to missing identifiers")),
        }
    }

    /// Records dated `YYYY-MM-DD`.
    #[must_use]
    pub fn records_on(&self, date: &str) -> Vec<&TestRecord> {
        self.records
            .iter()
            .filter(|record| record.date_label().as_deref() == Some(date))
            .collect()
    }

    /// Records that belong to some conflict group, in input order.
    #[must_use]
    pub fn conflicting_records(&self) -> Vec<&TestRecord> {
        let keys: Vec<CaseKey> = self.conflicts.iter().map(ConflictGroup::key).collect();
        self.records
            .iter()
            .filter(|record| keys.contains(&record.key()))
            .collect()
    }

    #[must_use]
    pub fn records_for_tester(&self, tester_name: &str) -> Vec<&TestRecord> {
        self.records
            .iter()
            .filter(|record| record.tester_name() == tester_name)
            .collect()
    }

    /// SHA-256 of the canonical JSON form.
    pub fn fingerprint(&self) -> Result<String> {
        let serialized = serde_json::to_string(self)?;
        Ok(sha256_hex(serialized.as_bytes()))
    }
}

/// Assemble a snapshot with the built-in configuration.
pub fn assemble(rows: &[RawRow]) -> Result<AnalyticsSnapshot> {
    assemble_with_config(rows, &EngineConfig::default())
}

pub fn assemble_with_config(rows: &[RawRow], config: &EngineConfig) -> Result<AnalyticsSnapshot> {
    let _span = tracing::debug_span!("insight.assemble", rows = rows.len()).entered();
    config.validate()?;
    let batch = normalize_rows(rows, config);
    assemble_batch(batch, config)
}

/// Assemble from records that were already constructed by the caller.
///
/// Placeholder labels left by the [`TestRecord`] builders are replaced with
/// `config.unknown_label`, matching rows that went through normalization.
pub fn assemble_records(
    records: Vec<TestRecord>,
    config: &EngineConfig,
) -> Result<AnalyticsSnapshot> {
    let _span = tracing::debug_span!("insight.assemble", rows = records.len()).entered();
    config.validate()?;
    let records: Vec<TestRecord> = records
        .into_iter()
        .map(|record| record.relabel_unknown(&config.unknown_label))
        .collect();
    let batch = NormalizedBatch {
        input_rows: records.len(),
        records,
        ..NormalizedBatch::default()
    };
    assemble_batch(batch, config)
}

fn assemble_batch(batch: NormalizedBatch, config: &EngineConfig) -> Result<AnalyticsSnapshot> {
    let NormalizedBatch {
        input_rows,
        records,
        warnings,
        rejected_rows,
    } = batch;

    let aggregate = aggregate(&records);
    let conflicts = detect_conflicts(&records)?;
    let offers = offers_with_conflicts(&conflicts);
    let patterns = mine_patterns(&records, config)?;

    tracing::info!(
        input_rows,
        accepted = records.len(),
        rejected = rejected_rows,
        warnings = warnings.len(),
        conflicts = conflicts.len(),
        patterns = patterns.patterns.len(),
        "assembled analytics snapshot"
    );

    Ok(AnalyticsSnapshot {
        version: SNAPSHOT_VERSION.to_string(),
        input_rows,
        accepted_records: records.len(),
        rejected_rows,
        aggregate,
        conflicts,
        offers_with_conflicts: offers,
        patterns: patterns.patterns,
        failing_records: patterns.failing_records,
        unexplained_failures: patterns.unexplained_failures,
        warnings,
        records,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::InsightError;
    use crate::record::Status;

    fn rows(value: serde_json::Value) -> Vec<RawRow> {
        serde_json::from_value(value).expect("rows")
    }

    #[test]
    fn empty_input_yields_empty_snapshot() {
        let snapshot = assemble(&[]).expect("snapshot");
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        assert_eq!(snapshot.aggregate.total, 0);
        assert!(snapshot.conflicts.is_empty());
        assert!(snapshot.patterns.is_empty());
        assert!(snapshot.warnings.is_empty());
        assert_eq!(snapshot.rejection_notice(), None);
    }

    #[test]
    fn rejected_rows_contribute_to_no_aggregate() {
        let input = rows(json!([
            {"case_id": "1", "offer_id": "A", "status": "Fail", "tester": "X", "actual": "timeout"},
            {"offer_id": "A", "status": "Fail", "tester": "Y", "actual": "timeout"},
        ]));
        let snapshot = assemble(&input).expect("snapshot");
        assert_eq!(snapshot.input_rows, 2);
        assert_eq!(snapshot.accepted_records, 1);
        assert_eq!(snapshot.rejected_rows, 1);
        assert_eq!(snapshot.aggregate.total, 1);
        assert_eq!(snapshot.aggregate.by_tester.get("Y"), None);
        assert!(snapshot.patterns.is_empty());
        assert_eq!(
            snapshot.rejection_notice().as_deref(),
            Some("1 row excluded due to missing identifiers")
        );
        assert_eq!(snapshot.warning_counts().get(&WarningKind::RowRejected), Some(&1));
    }

    #[test]
    fn export_views_filter_records() {
        let input = rows(json!([
            {"case_id": "1", "offer_id": "A", "status": "Pass", "tester": "X", "date": "2025-01-02"},
            {"case_id": "1", "offer_id": "A", "status": "Fail", "tester": "Y", "date": "2025-01-03"},
            {"case_id": "2", "offer_id": "A", "status": "Pass", "tester": "X", "date": "2025-01-03"},
        ]));
        let snapshot = assemble(&input).expect("snapshot");

        let on_third: Vec<_> = snapshot.records_on("2025-01-03").iter().map(|r| r.row_index()).collect();
        assert_eq!(on_third, vec![1, 2]);

        let conflicting: Vec<_> = snapshot
            .conflicting_records()
            .iter()
            .map(|r| r.row_index())
            .collect();
        assert_eq!(conflicting, vec![0, 1]);

        assert_eq!(snapshot.records_for_tester("X").len(), 2);
    }

    #[test]
    fn fingerprint_is_stable_across_runs() {
        let input = rows(json!([
            {"case_id": "1", "offer_id": "A", "status": "Pass", "tester": "X"},
            {"case_id": "1", "offer_id": "A", "status": "Fail", "tester": "Y", "actual": "crash"},
            {"case_id": "2", "offer_id": "B", "status": "Fail", "tester": "Y", "actual": "crash"},
        ]));
        let first = assemble(&input).expect("first");
        let second = assemble(&input).expect("second");
        assert_eq!(first, second);
        assert_eq!(
            first.fingerprint().expect("fingerprint"),
            second.fingerprint().expect("fingerprint")
        );
    }

    #[test]
    fn invalid_config_is_a_hard_failure() {
        let config = EngineConfig {
            min_pattern_occurrences: 0,
            ..EngineConfig::default()
        };
        let error = assemble_with_config(&[], &config).expect_err("invalid config");
        assert!(matches!(error, InsightError::InvalidConfig { .. }));
    }

    #[test]
    fn assemble_records_skips_normalization() {
        let records = vec![
            TestRecord::new("1", "A", Status::Pass, "X").expect("record"),
            TestRecord::new("1", "A", Status::Blocked, "Y").expect("record"),
        ];
        let snapshot = assemble_records(records, &EngineConfig::default()).expect("snapshot");
        assert_eq!(snapshot.input_rows, 2);
        assert_eq!(snapshot.conflicts.len(), 1);
        assert!(snapshot.warnings.is_empty());
    }

    #[test]
    fn assemble_records_uses_configured_unknown_label() {
        let config = EngineConfig {
            unknown_label: "N/A".to_string(),
            ..EngineConfig::default()
        };
        let records = vec![
            TestRecord::new("1", "A", Status::Pass, "").expect("record"),
            TestRecord::new("2", "A", Status::Fail, "X")
                .expect("record")
                .with_stream("Prepaid"),
        ];
        let snapshot = assemble_records(records, &config).expect("snapshot");
        assert_eq!(snapshot.records[0].tester_name(), "N/A");
        assert_eq!(snapshot.records[0].stream(), "N/A");
        assert_eq!(snapshot.records[1].stream(), "Prepaid");
        assert!(snapshot.aggregate.by_stream.get("Unknown").is_none());
        assert!(snapshot.aggregate.by_stream.get("N/A").is_some());

        let normalized = assemble_with_config(
            &rows(json!([{"case_id": "1", "offer_id": "A", "status": "Pass"}])),
            &config,
        )
        .expect("snapshot");
        assert_eq!(normalized.records[0].stream(), snapshot.records[0].stream());
        assert_eq!(normalized.records[0].tester_name(), snapshot.records[0].tester_name());
    }
}
