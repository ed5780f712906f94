//! Record model: typed test-execution rows and the normalization step that
//! produces them from raw spreadsheet-like row mappings.
//!
//! Normalization never fails. Malformed cells degrade to defaults and leave a
//! [`ValidationWarning`] behind; the only hard reject is a row without a case
//! or offer identifier, because such a row cannot be grouped.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::{InsightError, Result};

/// One raw input row: field name to raw cell value, as read upstream.
pub type RawRow = BTreeMap<String, Value>;

/// Label shown for records without a usable timestamp.
pub const UNKNOWN_DATE: &str = "unknown date";

/// Default label for empty categorical tags and missing tester names.
pub const DEFAULT_UNKNOWN_LABEL: &str = "Unknown";

/// Spreadsheet serial day numbers count from this epoch.
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// Largest serial day accepted (9999-12-31).
const SERIAL_MAX_DAYS: f64 = 2_958_465.0;

/// Smallest serial day accepted from text (1927-05-18). Keeps bare years
/// such as `"2025"` from being read as day counts.
const SERIAL_TEXT_MIN_DAYS: f64 = 10_000.0;

// ── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Status {
    Pass,
    Fail,
    Blocked,
    Pending,
}

impl Status {
    /// Fixed reporting order.
    pub const ALL: [Self; 4] = [Self::Pass, Self::Fail, Self::Blocked, Self::Pending];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "Pass",
            Self::Fail => "Fail",
            Self::Blocked => "Blocked",
            Self::Pending => "Pending",
        }
    }

    /// Recognize a raw status cell. Returns `None` for unknown spellings.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw
            .trim()
            .to_ascii_lowercase()
            .replace(['_', '-'], " ");
        let key = key.split_whitespace().collect::<Vec<_>>().join(" ");
        match key.as_str() {
            "pass" | "passed" | "ok" | "success" | "successful" => Some(Self::Pass),
            "fail" | "failed" | "failure" | "nok" => Some(Self::Fail),
            "blocked" | "block" | "blocker" => Some(Self::Blocked),
            "pending" | "not run" | "not executed" | "in progress" | "na" | "n/a" | "todo" => {
                Some(Self::Pending)
            }
            _ => None,
        }
    }

    /// Fail and Blocked runs feed the pattern miner.
    #[must_use]
    pub const fn is_failing(self) -> bool {
        matches!(self, Self::Fail | Self::Blocked)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Fields ──────────────────────────────────────────────────────────────────

/// Canonical record fields, used to resolve raw headers and to label warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    CaseId,
    OfferId,
    Stream,
    Domain,
    Scenario,
    ExpectedResult,
    ActualResult,
    Status,
    TesterName,
    Msisdn,
    Timestamp,
}

impl RecordField {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CaseId => "case_id",
            Self::OfferId => "offer_id",
            Self::Stream => "stream",
            Self::Domain => "domain",
            Self::Scenario => "scenario",
            Self::ExpectedResult => "expected_result",
            Self::ActualResult => "actual_result",
            Self::Status => "status",
            Self::TesterName => "tester_name",
            Self::Msisdn => "msisdn",
            Self::Timestamp => "timestamp",
        }
    }

    /// Accepted header spellings, compared after [`header_key`] folding.
    const fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::CaseId => &[
                "caseid",
                "testcaseid",
                "tcid",
                "case",
                "testcase",
                "caseno",
                "casenumber",
            ],
            Self::OfferId => &["offerid", "offer", "offercode", "offername"],
            Self::Stream => &["stream", "streamname"],
            Self::Domain => &["domain", "domainname"],
            Self::Scenario => &["scenario", "testscenario", "description"],
            Self::ExpectedResult => &["expectedresult", "expected", "expectedoutcome"],
            Self::ActualResult => &[
                "actualresult",
                "actual",
                "actualoutcome",
                "comments",
                "remarks",
            ],
            Self::Status => &["status", "result", "teststatus", "executionstatus"],
            Self::TesterName => &["testername", "tester", "testedby", "executedby", "assignee"],
            Self::Msisdn => &["msisdn", "phonenumber", "msisdnnumber", "number"],
            Self::Timestamp => &[
                "timestamp",
                "date",
                "datetime",
                "executiondate",
                "testdate",
                "executedon",
            ],
        }
    }
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fold a header to lowercase ASCII alphanumerics: `"Case ID"` → `"caseid"`.
#[must_use]
pub fn header_key(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// ── Warnings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    MissingField,
    UnrecognizedStatus,
    UnparseableDate,
    RowRejected,
}

/// A per-row data-quality note. Recoverable by definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    /// 0-based position of the row in the input sequence.
    pub row_index: usize,
    pub kind: WarningKind,
    pub field: RecordField,
    pub message: String,
}

impl ValidationWarning {
    fn new(row_index: usize, kind: WarningKind, field: RecordField, message: String) -> Self {
        Self {
            row_index,
            kind,
            field,
            message,
        }
    }
}

// ── TestRecord ──────────────────────────────────────────────────────────────

/// Identity of a logical test case: the (case, offer) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaseKey {
    pub case_id: String,
    pub offer_id: String,
}

/// One normalized test execution. Fields are read-only after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestRecord {
    row_index: usize,
    case_id: String,
    offer_id: String,
    stream: String,
    domain: String,
    scenario: String,
    expected_result: String,
    actual_result: String,
    status: Status,
    tester_name: String,
    msisdn: String,
    timestamp: Option<NaiveDateTime>,
}

impl TestRecord {
    /// Build a record directly. Blank identifiers are an API misuse.
    pub fn new(
        case_id: impl Into<String>,
        offer_id: impl Into<String>,
        status: Status,
        tester_name: impl Into<String>,
    ) -> Result<Self> {
        let case_id = case_id.into().trim().to_string();
        let offer_id = offer_id.into().trim().to_string();
        if case_id.is_empty() || offer_id.is_empty() {
            return Err(InsightError::invariant(
                "record.new",
                "case and offer identifiers must be non-empty",
            ));
        }
        let tester_name = or_label(Some(tester_name.into()), DEFAULT_UNKNOWN_LABEL);
        Ok(Self {
            row_index: 0,
            case_id,
            offer_id,
            stream: DEFAULT_UNKNOWN_LABEL.to_string(),
            domain: DEFAULT_UNKNOWN_LABEL.to_string(),
            scenario: String::new(),
            expected_result: String::new(),
            actual_result: String::new(),
            status,
            tester_name,
            msisdn: String::new(),
            timestamp: None,
        })
    }

    /// Replace the built-in `"Unknown"` placeholder in tester, stream and
    /// domain with `label`. The builders always fill blanks with
    /// [`DEFAULT_UNKNOWN_LABEL`].
    #[must_use]
    pub fn relabel_unknown(mut self, label: &str) -> Self {
        for value in [&mut self.tester_name, &mut self.stream, &mut self.domain] {
            if *value == DEFAULT_UNKNOWN_LABEL {
                *value = label.to_string();
            }
        }
        self
    }

    #[must_use]
    pub fn with_row_index(mut self, row_index: usize) -> Self {
        self.row_index = row_index;
        self
    }

    #[must_use]
    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = or_label(Some(stream.into()), DEFAULT_UNKNOWN_LABEL);
        self
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = or_label(Some(domain.into()), DEFAULT_UNKNOWN_LABEL);
        self
    }

    #[must_use]
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = scenario.into();
        self
    }

    #[must_use]
    pub fn with_expected_result(mut self, expected: impl Into<String>) -> Self {
        self.expected_result = expected.into();
        self
    }

    #[must_use]
    pub fn with_actual_result(mut self, actual: impl Into<String>) -> Self {
        self.actual_result = actual.into();
        self
    }

    #[must_use]
    pub fn with_msisdn(mut self, msisdn: impl Into<String>) -> Self {
        self.msisdn = msisdn.into();
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Option<NaiveDateTime>) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn row_index(&self) -> usize {
        self.row_index
    }

    #[must_use]
    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    #[must_use]
    pub fn offer_id(&self) -> &str {
        &self.offer_id
    }

    #[must_use]
    pub fn key(&self) -> CaseKey {
        CaseKey {
            case_id: self.case_id.clone(),
            offer_id: self.offer_id.clone(),
        }
    }

    #[must_use]
    pub fn stream(&self) -> &str {
        &self.stream
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    #[must_use]
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    #[must_use]
    pub fn expected_result(&self) -> &str {
        &self.expected_result
    }

    #[must_use]
    pub fn actual_result(&self) -> &str {
        &self.actual_result
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn tester_name(&self) -> &str {
        &self.tester_name
    }

    #[must_use]
    pub fn msisdn(&self) -> &str {
        &self.msisdn
    }

    #[must_use]
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamp
    }

    /// `YYYY-MM-DD` bucket, or `None` when the date is unknown.
    #[must_use]
    pub fn date_label(&self) -> Option<String> {
        self.timestamp
            .map(|ts| ts.date().format("%Y-%m-%d").to_string())
    }

    /// Date label for presentation; never empty.
    #[must_use]
    pub fn date_display(&self) -> String {
        self.date_label()
            .unwrap_or_else(|| UNKNOWN_DATE.to_string())
    }
}

// ── Normalization ───────────────────────────────────────────────────────────

/// Result of normalizing one raw row.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub record: Option<TestRecord>,
    pub warnings: Vec<ValidationWarning>,
}

impl Normalized {
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.record.is_none()
    }
}

/// Result of normalizing an ordered batch of rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub input_rows: usize,
    pub records: Vec<TestRecord>,
    pub warnings: Vec<ValidationWarning>,
    pub rejected_rows: usize,
}

/// Normalize one raw row. Never fails; see the module docs.
#[must_use]
pub fn normalize(row_index: usize, row: &RawRow, config: &EngineConfig) -> Normalized {
    let cells = RowCells::resolve(row);
    let case_id = cells.text(RecordField::CaseId);
    let offer_id = cells.text(RecordField::OfferId);

    let (case_id, offer_id) = match (case_id, offer_id) {
        (Some(case_id), Some(offer_id)) => (case_id, offer_id),
        (case_id, offer_id) => {
            return reject(row_index, case_id.is_none(), offer_id.is_none());
        }
    };

    let mut warnings = Vec::new();
    let unknown = config.unknown_label.as_str();

    let status = match cells.text(RecordField::Status) {
        None => {
            warnings.push(ValidationWarning::new(
                row_index,
                WarningKind::MissingField,
                RecordField::Status,
                "missing status; treated as Pending".to_string(),
            ));
            Status::Pending
        }
        Some(raw) => Status::parse(&raw).unwrap_or_else(|| {
            warnings.push(ValidationWarning::new(
                row_index,
                WarningKind::UnrecognizedStatus,
                RecordField::Status,
                format!("unrecognized status {raw:?}; treated as Pending"),
            ));
            Status::Pending
        }),
    };

    let tester_name = cells.text(RecordField::TesterName).unwrap_or_else(|| {
        warnings.push(ValidationWarning::new(
            row_index,
            WarningKind::MissingField,
            RecordField::TesterName,
            format!("missing tester name; attributed to {unknown:?}"),
        ));
        unknown.to_string()
    });

    let timestamp = match cells.get(RecordField::Timestamp) {
        None => None,
        Some(value) if cell_text(value).is_none() => None,
        Some(value) => {
            let parsed = parse_timestamp(value, &config.date_formats);
            if parsed.is_none() {
                warnings.push(ValidationWarning::new(
                    row_index,
                    WarningKind::UnparseableDate,
                    RecordField::Timestamp,
                    format!(
                        "unparseable date {}; treated as {UNKNOWN_DATE}",
                        describe_cell(value)
                    ),
                ));
            }
            parsed
        }
    };

    let record = TestRecord {
        row_index,
        case_id,
        offer_id,
        stream: or_label(cells.text(RecordField::Stream), unknown),
        domain: or_label(cells.text(RecordField::Domain), unknown),
        scenario: cells.text(RecordField::Scenario).unwrap_or_default(),
        expected_result: cells.text(RecordField::ExpectedResult).unwrap_or_default(),
        actual_result: cells.text(RecordField::ActualResult).unwrap_or_default(),
        status,
        tester_name,
        msisdn: cells.text(RecordField::Msisdn).unwrap_or_default(),
        timestamp,
    };

    Normalized {
        record: Some(record),
        warnings,
    }
}

fn reject(row_index: usize, missing_case: bool, missing_offer: bool) -> Normalized {
    let (field, message) = match (missing_case, missing_offer) {
        (true, true) => (
            RecordField::CaseId,
            "row rejected: missing case identifier and offer identifier",
        ),
        (true, false) => (RecordField::CaseId, "row rejected: missing case identifier"),
        _ => (RecordField::OfferId, "row rejected: missing offer identifier"),
    };
    tracing::warn!(row_index, field = field.as_str(), "{message}");
    Normalized {
        record: None,
        warnings: vec![ValidationWarning::new(
            row_index,
            WarningKind::RowRejected,
            field,
            message.to_string(),
        )],
    }
}

/// Normalize every row, preserving input order.
#[must_use]
pub fn normalize_rows(rows: &[RawRow], config: &EngineConfig) -> NormalizedBatch {
    let mut batch = NormalizedBatch {
        input_rows: rows.len(),
        ..NormalizedBatch::default()
    };

    for (row_index, row) in rows.iter().enumerate() {
        let normalized = normalize(row_index, row, config);
        if normalized.is_rejected() {
            batch.rejected_rows += 1;
        }
        batch.warnings.extend(normalized.warnings);
        if let Some(record) = normalized.record {
            batch.records.push(record);
        }
    }

    tracing::debug!(
        input_rows = batch.input_rows,
        accepted = batch.records.len(),
        rejected = batch.rejected_rows,
        warnings = batch.warnings.len(),
        "normalized input rows"
    );
    batch
}

/// Header-resolved view over one raw row.
struct RowCells<'a> {
    cells: BTreeMap<RecordField, &'a Value>,
}

impl<'a> RowCells<'a> {
    const FIELDS: [RecordField; 11] = [
        RecordField::CaseId,
        RecordField::OfferId,
        RecordField::Stream,
        RecordField::Domain,
        RecordField::Scenario,
        RecordField::ExpectedResult,
        RecordField::ActualResult,
        RecordField::Status,
        RecordField::TesterName,
        RecordField::Msisdn,
        RecordField::Timestamp,
    ];

    fn resolve(row: &'a RawRow) -> Self {
        let mut cells: BTreeMap<RecordField, &'a Value> = BTreeMap::new();
        for (header, value) in row {
            let key = header_key(header);
            let Some(field) = Self::FIELDS
                .iter()
                .copied()
                .find(|field| field.aliases().contains(&key.as_str()))
            else {
                continue;
            };
            // A populated duplicate header wins over an empty one.
            match cells.get(&field) {
                Some(existing) if cell_text(existing).is_some() => {}
                _ => {
                    cells.insert(field, value);
                }
            }
        }
        Self { cells }
    }

    fn get(&self, field: RecordField) -> Option<&'a Value> {
        self.cells.get(&field).copied()
    }

    fn text(&self, field: RecordField) -> Option<String> {
        self.get(field).and_then(cell_text)
    }
}

fn or_label(value: Option<String>, label: &str) -> String {
    match value {
        Some(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => label.to_string(),
    }
}

/// Render a cell as trimmed text; empty and null cells are `None`.
fn cell_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                let f = n.as_f64()?;
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{f:.0}")
                } else {
                    f.to_string()
                }
            }
        }
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

fn describe_cell(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{:?}", s.trim()),
        other => other.to_string(),
    }
}

/// Parse a timestamp cell: RFC 3339, then each configured format, then a
/// spreadsheet serial day number. Numeric text only counts as a serial day
/// from 1927 onwards.
#[must_use]
pub fn parse_timestamp(value: &Value, formats: &[String]) -> Option<NaiveDateTime> {
    match value {
        Value::Number(n) => n.as_f64().and_then(from_serial_days),
        Value::String(s) => parse_timestamp_text(s.trim(), formats),
        _ => None,
    }
}

fn parse_timestamp_text(text: &str, formats: &[String]) -> Option<NaiveDateTime> {
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_local());
    }
    for format in formats {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }
    text.parse::<f64>()
        .ok()
        .filter(|days| *days >= SERIAL_TEXT_MIN_DAYS)
        .and_then(from_serial_days)
}

fn from_serial_days(days: f64) -> Option<NaiveDateTime> {
    if !days.is_finite() || days < 1.0 || days > SERIAL_MAX_DAYS {
        return None;
    }
    let (year, month, day) = SERIAL_EPOCH;
    let epoch = NaiveDate::from_ymd_opt(year, month, day)?.and_time(NaiveTime::MIN);
    let whole = days.trunc() as i64;
    let seconds = (days.fract() * 86_400.0).round() as i64;
    epoch.checked_add_signed(Duration::days(whole) + Duration::seconds(seconds))
}
