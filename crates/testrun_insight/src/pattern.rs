//! Failure-pattern mining over Fail/Blocked commentary.
//!
//! Each failing record's `actual_result` is normalized (lowercase, no
//! punctuation, single spaces) and reduced to a signature: the first marker
//! of the configured table that occurs anywhere in the text (or on word
//! boundaries, for markers flagged `whole_word`), or the whole normalized
//! text when no marker matches. Signatures shared by fewer than
//! `min_pattern_occurrences` records are dropped as noise.

use std::collections::HashMap;
use std::fmt;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{InsightError, Result};
use crate::recommend::{PatternFacts, Recommendation, recommend};
use crate::record::TestRecord;
use crate::util::compare_identifiers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    Timeout,
    NotFound,
    PermissionDenied,
    Mismatch,
    Crash,
    /// Exact-text signatures that hit no marker.
    Uncategorized,
}

impl PatternCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::NotFound => "not found",
            Self::PermissionDenied => "permission",
            Self::Mismatch => "data mismatch",
            Self::Crash => "crash",
            Self::Uncategorized => "uncategorized",
        }
    }
}

impl fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the marker table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRule {
    pub marker: String,
    pub category: PatternCategory,
    /// Only match between word boundaries instead of as a substring.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub whole_word: bool,
}

impl MarkerRule {
    #[must_use]
    pub fn new(marker: impl Into<String>, category: PatternCategory) -> Self {
        Self {
            marker: marker.into(),
            category,
            whole_word: false,
        }
    }

    #[must_use]
    pub fn whole_word(mut self) -> Self {
        self.whole_word = true;
        self
    }

    /// The marker as it is matched against normalized text.
    #[must_use]
    pub fn normalized_marker(&self) -> String {
        normalize_text(&self.marker)
    }
}

/// Built-in marker priority.
#[must_use]
pub fn default_markers() -> Vec<MarkerRule> {
    use PatternCategory::{Crash, Mismatch, NotFound, PermissionDenied, Timeout};
    vec![
        MarkerRule::new("timeout", Timeout),
        MarkerRule::new("timed out", Timeout),
        MarkerRule::new("no response", Timeout),
        MarkerRule::new("not found", NotFound),
        MarkerRule::new("permission denied", PermissionDenied),
        MarkerRule::new("access denied", PermissionDenied),
        MarkerRule::new("mismatch", Mismatch),
        MarkerRule::new("crash", Crash),
    ]
}

/// Lowercase, drop punctuation, collapse whitespace.
///
/// Apostrophes join their neighbours (`can't` → `cant`); any other
/// non-alphanumeric character separates words.
#[must_use]
pub fn normalize_text(raw: &str) -> String {
    let spaced: String = raw
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}'))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Marker,
    ExactText,
}

/// Signature extracted from one record's commentary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub key: String,
    pub category: PatternCategory,
    pub kind: MatchKind,
}

/// Compiled marker table.
#[derive(Debug)]
pub struct SignatureMatcher {
    rules: Vec<(Regex, String, PatternCategory)>,
}

impl SignatureMatcher {
    pub fn compile(markers: &[MarkerRule]) -> Result<Self> {
        let rules = markers
            .iter()
            .map(|rule| {
                let marker = rule.normalized_marker();
                if marker.is_empty() {
                    return Err(InsightError::config(format!(
                        "marker {:?} is empty after normalization",
                        rule.marker
                    )));
                }
                let escaped = regex_lite::escape(&marker);
                let pattern = if rule.whole_word {
                    format!(r"\b{escaped}\b")
                } else {
                    escaped
                };
                let regex = Regex::new(&pattern).map_err(|error| {
                    InsightError::config(format!("marker {marker:?} does not compile: {error}"))
                })?;
                Ok((regex, marker, rule.category))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Signature for already-normalized text; `None` for empty text.
    #[must_use]
    pub fn classify(&self, normalized: &str) -> Option<Signature> {
        if normalized.is_empty() {
            return None;
        }
        let signature = self
            .rules
            .iter()
            .find(|(regex, _, _)| regex.is_match(normalized))
            .map_or_else(
                || Signature {
                    key: normalized.to_string(),
                    category: PatternCategory::Uncategorized,
                    kind: MatchKind::ExactText,
                },
                |(_, marker, category)| Signature {
                    key: marker.clone(),
                    category: *category,
                    kind: MatchKind::Marker,
                },
            );
        Some(signature)
    }
}

/// A recurring failure cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternSignature {
    pub signature: String,
    pub category: PatternCategory,
    pub match_kind: MatchKind,
    pub count: usize,
    /// Distinct affected offers, ascending.
    pub offer_ids: Vec<String>,
    /// Distinct affected cases, ascending.
    pub case_ids: Vec<String>,
    /// Distinct reporting testers, ascending.
    pub testers: Vec<String>,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatternReport {
    /// Count descending, then signature ascending.
    pub patterns: Vec<PatternSignature>,
    pub failing_records: usize,
    /// Failing records with empty commentary.
    pub unexplained_failures: usize,
    /// Signatures seen fewer times than the reporting floor.
    pub dropped_signatures: usize,
}

struct SignatureGroup {
    signature: Signature,
    count: usize,
    offer_ids: Vec<String>,
    case_ids: Vec<String>,
    testers: Vec<String>,
}

fn push_distinct(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|existing| existing == value) {
        values.push(value.to_string());
    }
}

/// Mine recurring signatures from the Fail/Blocked records in `records`.
pub fn mine_patterns(records: &[TestRecord], config: &EngineConfig) -> Result<PatternReport> {
    let matcher = SignatureMatcher::compile(&config.markers)?;

    let mut report = PatternReport::default();
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, SignatureGroup> = HashMap::new();

    for record in records.iter().filter(|record| record.status().is_failing()) {
        report.failing_records += 1;
        let Some(signature) = matcher.classify(&normalize_text(record.actual_result())) else {
            report.unexplained_failures += 1;
            continue;
        };
        let group = groups.entry(signature.key.clone()).or_insert_with(|| {
            order.push(signature.key.clone());
            SignatureGroup {
                signature,
                count: 0,
                offer_ids: Vec::new(),
                case_ids: Vec::new(),
                testers: Vec::new(),
            }
        });
        group.count += 1;
        push_distinct(&mut group.offer_ids, record.offer_id());
        push_distinct(&mut group.case_ids, record.case_id());
        push_distinct(&mut group.testers, record.tester_name());
    }

    let floor = config.min_pattern_occurrences.max(2);
    for key in order {
        let Some(mut group) = groups.remove(&key) else {
            continue;
        };
        if group.count < floor {
            report.dropped_signatures += 1;
            continue;
        }
        group.offer_ids.sort_by(|a, b| compare_identifiers(a, b));
        group.case_ids.sort_by(|a, b| compare_identifiers(a, b));
        group.testers.sort();

        let recommendation = recommend(
            &PatternFacts {
                signature: &group.signature.key,
                category: group.signature.category,
                count: group.count,
                offer_ids: &group.offer_ids,
            },
            config,
        );
        report.patterns.push(PatternSignature {
            signature: group.signature.key,
            category: group.signature.category,
            match_kind: group.signature.kind,
            count: group.count,
            offer_ids: group.offer_ids,
            case_ids: group.case_ids,
            testers: group.testers,
            recommendation,
        });
    }

    report.patterns.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.signature.cmp(&b.signature))
    });

    tracing::debug!(
        failing_records = report.failing_records,
        patterns = report.patterns.len(),
        unexplained = report.unexplained_failures,
        dropped = report.dropped_signatures,
        "mined failure patterns"
    );
    Ok(report)
}
