//! Engine configuration.
//!
//! Every tunable the analytics pipeline consults lives here, with defaults
//! that reproduce the built-in behavior. Partial JSON files are accepted:
//! missing keys fall back to [`EngineConfig::default`].

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{InsightError, Result};
use crate::pattern::{MarkerRule, default_markers};
use crate::record::DEFAULT_UNKNOWN_LABEL;
use crate::recommend::{RecommendationRule, default_recommendations};

/// Lone occurrences are noise; a pattern needs at least this many records.
pub const MIN_PATTERN_FLOOR: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Marker table, checked in order; the first match names the signature.
    pub markers: Vec<MarkerRule>,
    /// Recommendation table, checked in order; the first match wins.
    pub recommendations: Vec<RecommendationRule>,
    /// Minimum records sharing a signature before it is reported.
    pub min_pattern_occurrences: usize,
    /// Distinct offers at which a signature counts as widespread.
    pub widespread_offer_threshold: usize,
    /// chrono formats tried, in order, after RFC 3339.
    pub date_formats: Vec<String>,
    /// Label for empty stream/domain tags and missing tester names.
    pub unknown_label: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            markers: default_markers(),
            recommendations: default_recommendations(),
            min_pattern_occurrences: MIN_PATTERN_FLOOR,
            widespread_offer_threshold: 3,
            date_formats: default_date_formats(),
            unknown_label: DEFAULT_UNKNOWN_LABEL.to_string(),
        }
    }
}

#[must_use]
pub fn default_date_formats() -> Vec<String> {
    [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
        "%d/%m/%Y",
        "%d-%m-%Y",
        "%d.%m.%Y",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

impl EngineConfig {
    /// Load a JSON configuration file and validate it.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(InsightError::MissingPath {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str::<Self>(&content)?;
        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            markers = config.markers.len(),
            recommendations = config.recommendations.len(),
            "loaded engine configuration"
        );
        Ok(config)
    }

    /// Reject configurations the engine cannot honor deterministically.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for (index, rule) in self.markers.iter().enumerate() {
            let marker = rule.normalized_marker();
            if marker.is_empty() {
                return Err(InsightError::config(format!(
                    "marker #{index} is empty after normalization"
                )));
            }
            if !seen.insert(marker.clone()) {
                return Err(InsightError::config(format!(
                    "marker {marker:?} appears more than once"
                )));
            }
        }

        for (index, rule) in self.recommendations.iter().enumerate() {
            if rule.template.trim().is_empty() {
                return Err(InsightError::config(format!(
                    "recommendation #{index} has an empty template"
                )));
            }
        }

        if self.min_pattern_occurrences < MIN_PATTERN_FLOOR {
            return Err(InsightError::config(format!(
                "min_pattern_occurrences must be at least {MIN_PATTERN_FLOOR}, got {}",
                self.min_pattern_occurrences
            )));
        }
        if self.widespread_offer_threshold < 2 {
            return Err(InsightError::config(format!(
                "widespread_offer_threshold must be at least 2, got {}",
                self.widespread_offer_threshold
            )));
        }
        if self.unknown_label.trim().is_empty() {
            return Err(InsightError::config("unknown_label must not be empty"));
        }
        Ok(())
    }
}
