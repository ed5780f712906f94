//! Table-driven recommendations for mined failure patterns.
//!
//! A rule matches on pattern category and offer scope (either may be left
//! open); the first matching rule's template is expanded with the pattern's
//! concrete numbers. Placeholders: `{signature}`, `{category}`, `{count}`,
//! `{offer_count}`, `{offers}`.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::pattern::PatternCategory;

/// How many offer ids `{offers}` lists before summarizing the rest.
const OFFER_LIST_LIMIT: usize = 5;

const FALLBACK_TEMPLATE: &str =
    "\"{signature}\" recurs in {count} failures on {offers}; triage it as a recurring defect.";

/// How far a signature spreads across offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferScope {
    /// Exactly one offer.
    Concentrated,
    Scattered,
    /// At least `widespread_offer_threshold` offers.
    Widespread,
}

impl OfferScope {
    #[must_use]
    pub fn classify(distinct_offers: usize, widespread_threshold: usize) -> Self {
        if distinct_offers <= 1 {
            Self::Concentrated
        } else if distinct_offers >= widespread_threshold {
            Self::Widespread
        } else {
            Self::Scattered
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationRule {
    /// `None` matches any category.
    #[serde(default)]
    pub category: Option<PatternCategory>,
    /// `None` matches any scope.
    #[serde(default)]
    pub scope: Option<OfferScope>,
    pub template: String,
}

impl RecommendationRule {
    #[must_use]
    pub fn new(
        category: Option<PatternCategory>,
        scope: Option<OfferScope>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            category,
            scope,
            template: template.into(),
        }
    }

    fn matches(&self, category: PatternCategory, scope: OfferScope) -> bool {
        self.category.is_none_or(|wanted| wanted == category)
            && self.scope.is_none_or(|wanted| wanted == scope)
    }
}

#[must_use]
pub fn default_recommendations() -> Vec<RecommendationRule> {
    use OfferScope::{Concentrated, Widespread};
    use PatternCategory::{Crash, Mismatch, NotFound, PermissionDenied, Timeout};
    vec![
        RecommendationRule::new(
            Some(Timeout),
            Some(Widespread),
            "Timeouts recur in {count} failures across {offer_count} offers ({offers}); \
             investigate environment and infrastructure stability before re-testing.",
        ),
        RecommendationRule::new(
            Some(Timeout),
            None,
            "Timeouts recur in {count} failures on {offers}; check environment stability \
             and downstream response times for these offers.",
        ),
        RecommendationRule::new(
            None,
            Some(Widespread),
            "\"{signature}\" recurs in {count} failures across {offer_count} offers \
             ({offers}); treat it as a systemic {category} issue in shared components.",
        ),
        RecommendationRule::new(
            None,
            Some(Concentrated),
            "\"{signature}\" recurs {count} times, only on offer {offers}; review that \
             offer's test data and configuration.",
        ),
        RecommendationRule::new(
            Some(NotFound),
            None,
            "\"{signature}\" recurs in {count} failures on {offers}; verify provisioning \
             of the referenced products and subscriber data.",
        ),
        RecommendationRule::new(
            Some(PermissionDenied),
            None,
            "\"{signature}\" recurs in {count} failures on {offers}; review tester \
             credentials and role permissions.",
        ),
        RecommendationRule::new(
            Some(Mismatch),
            None,
            "\"{signature}\" recurs in {count} failures on {offers}; compare the expected \
             results with the current offer configuration.",
        ),
        RecommendationRule::new(
            Some(Crash),
            None,
            "\"{signature}\" recurs in {count} failures on {offers}; escalate to \
             development with reproduction steps from the affected cases.",
        ),
        RecommendationRule::new(None, None, FALLBACK_TEMPLATE),
    ]
}

/// The inputs a recommendation is derived from.
#[derive(Debug, Clone, Copy)]
pub struct PatternFacts<'a> {
    pub signature: &'a str,
    pub category: PatternCategory,
    pub count: usize,
    /// Distinct offers, already in presentation order.
    pub offer_ids: &'a [String],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub scope: OfferScope,
    /// Index of the matching rule in the table; `None` for the fallback.
    pub rule_index: Option<usize>,
    pub text: String,
}

#[must_use]
pub fn recommend(facts: &PatternFacts<'_>, config: &EngineConfig) -> Recommendation {
    let scope = OfferScope::classify(facts.offer_ids.len(), config.widespread_offer_threshold);
    let matched = config
        .recommendations
        .iter()
        .enumerate()
        .find(|(_, rule)| rule.matches(facts.category, scope));

    let (rule_index, template) = match matched {
        Some((index, rule)) => (Some(index), rule.template.as_str()),
        None => (None, FALLBACK_TEMPLATE),
    };

    Recommendation {
        scope,
        rule_index,
        text: render_template(template, facts),
    }
}

/// Expand placeholders. Unknown placeholders are left as written.
#[must_use]
pub fn render_template(template: &str, facts: &PatternFacts<'_>) -> String {
    template
        .replace("{signature}", facts.signature)
        .replace("{category}", facts.category.as_str())
        .replace("{count}", &facts.count.to_string())
        .replace("{offer_count}", &facts.offer_ids.len().to_string())
        .replace("{offers}", &offer_list(facts.offer_ids))
}

fn offer_list(offer_ids: &[String]) -> String {
    match offer_ids.len() {
        0 => "no offer".to_string(),
        n if n <= OFFER_LIST_LIMIT => offer_ids.join(", "),
        n => format!(
            "{} and {} more",
            offer_ids[..OFFER_LIST_LIMIT].join(", "),
            n - OFFER_LIST_LIMIT
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offers(ids: &[&str]) -> Vec<String> {
        ids.iter().map(ToString::to_string).collect()
    }

    fn facts<'a>(
        signature: &'a str,
        category: PatternCategory,
        count: usize,
        offer_ids: &'a [String],
    ) -> PatternFacts<'a> {
        PatternFacts {
            signature,
            category,
            count,
            offer_ids,
        }
    }

    #[test]
    fn scope_classification_uses_threshold() {
        assert_eq!(OfferScope::classify(0, 3), OfferScope::Concentrated);
        assert_eq!(OfferScope::classify(1, 3), OfferScope::Concentrated);
        assert_eq!(OfferScope::classify(2, 3), OfferScope::Scattered);
        assert_eq!(OfferScope::classify(3, 3), OfferScope::Widespread);
    }

    #[test]
    fn widespread_timeout_points_at_infrastructure() {
        let ids = offers(&["A", "B", "C"]);
        let rec = recommend(
            &facts("timeout", PatternCategory::Timeout, 6, &ids),
            &EngineConfig::default(),
        );
        assert_eq!(rec.scope, OfferScope::Widespread);
        assert_eq!(rec.rule_index, Some(0));
        assert!(rec.text.contains("environment and infrastructure stability"));
        assert!(rec.text.contains("3 offers (A, B, C)"));
    }

    #[test]
    fn timeout_on_one_offer_still_mentions_environment() {
        let ids = offers(&["A"]);
        let rec = recommend(
            &facts("timeout", PatternCategory::Timeout, 10, &ids),
            &EngineConfig::default(),
        );
        assert_eq!(rec.scope, OfferScope::Concentrated);
        assert!(rec.text.contains("environment stability"));
        assert!(rec.text.contains("10 failures on A"));
    }

    #[test]
    fn concentrated_signature_recommends_reviewing_offer_data() {
        let ids = offers(&["OFF-7"]);
        let rec = recommend(
            &facts("not found", PatternCategory::NotFound, 4, &ids),
            &EngineConfig::default(),
        );
        assert_eq!(rec.rule_index, Some(3));
        assert!(rec.text.contains("only on offer OFF-7"));
        assert!(rec.text.contains("test data"));
    }

    #[test]
    fn scattered_category_uses_category_rule() {
        let ids = offers(&["A", "B"]);
        let rec = recommend(
            &facts("permission denied", PatternCategory::PermissionDenied, 2, &ids),
            &EngineConfig::default(),
        );
        assert_eq!(rec.scope, OfferScope::Scattered);
        assert!(rec.text.contains("role permissions"));
    }

    #[test]
    fn empty_table_falls_back() {
        let config = EngineConfig {
            recommendations: Vec::new(),
            ..EngineConfig::default()
        };
        let ids = offers(&["A", "B"]);
        let rec = recommend(&facts("x", PatternCategory::Uncategorized, 2, &ids), &config);
        assert_eq!(rec.rule_index, None);
        assert_eq!(rec.text, "\"x\" recurs in 2 failures on A, B; triage it as a recurring defect.");
    }

    #[test]
    fn long_offer_lists_are_summarized() {
        let ids = offers(&["1", "2", "3", "4", "5", "6", "7"]);
        let text = render_template("{offers}", &facts("s", PatternCategory::Crash, 9, &ids));
        assert_eq!(text, "1, 2, 3, 4, 5 and 2 more");
    }

    #[test]
    fn unknown_placeholders_are_kept() {
        let ids = offers(&["A"]);
        let text = render_template(
            "{category}: {nope}",
            &facts("s", PatternCategory::Mismatch, 2, &ids),
        );
        assert_eq!(text, "data mismatch: {nope}");
    }
}
