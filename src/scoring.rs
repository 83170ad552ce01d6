//! Keyword relevance scoring: decide whether a page carries a storm table.
//!
//! The rule is data, not code: a [`ScoringRules`] value holds a list of
//! `(keyword, weight)` pairs and a keep threshold. The aggregation is the
//! count of **distinct** keywords found - a keyword matched ten times on one
//! page still contributes its weight exactly once, so a page full of the word
//! "damage" cannot sneak past the threshold.
//!
//! Matching is case-insensitive substring search over the recognised text.
//! Scoring is pure and deterministic: the same text against the same rules
//! always yields the same score and classification.

use serde::{Deserialize, Serialize};

/// One scoring keyword and its contribution when found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keyword: String,
    pub weight: u32,
}

impl KeywordRule {
    pub fn new(keyword: impl Into<String>, weight: u32) -> Self {
        Self {
            keyword: keyword.into(),
            weight,
        }
    }
}

/// The full scoring rule set: keywords plus the keep threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringRules {
    pub keywords: Vec<KeywordRule>,
    /// Minimum aggregate score for a page to be kept.
    pub threshold: u32,
}

/// NOAA storm-report table header terms. Each weighs 1, so the default score
/// is simply the number of distinct header words detected on the page.
const DEFAULT_KEYWORDS: &[&str] = &[
    "location",
    "place",
    "date",
    "time",
    "path",
    "mile",
    "yard",
    "killed",
    "injured",
    "damage",
    "property",
    "crops",
    "character",
    "character of storm",
    "storm data",
];

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS
                .iter()
                .map(|k| KeywordRule::new(*k, 1))
                .collect(),
            threshold: 6,
        }
    }
}

impl ScoringRules {
    /// Score recognised page text: sum of weights of distinct keywords found.
    ///
    /// Returns the score and the matched keywords (for logging and debug
    /// text files).
    pub fn score(&self, text: &str) -> (u32, Vec<&str>) {
        let haystack = text.to_lowercase();
        let mut score = 0;
        let mut hits = Vec::new();
        for rule in &self.keywords {
            if haystack.contains(&rule.keyword.to_lowercase()) {
                score += rule.weight;
                hits.push(rule.keyword.as_str());
            }
        }
        (score, hits)
    }

    /// `true` when the score meets the keep threshold.
    pub fn keeps(&self, score: u32) -> bool {
        score >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_distinct_keywords_meet_default_threshold() {
        let rules = ScoringRules::default();
        let text = "Location Date Time Path Killed Injured";
        let (score, hits) = rules.score(text);
        assert_eq!(score, 6);
        assert_eq!(hits.len(), 6);
        assert!(rules.keeps(score));
    }

    #[test]
    fn five_distinct_keywords_fall_short() {
        let rules = ScoringRules::default();
        let text = "Location Date Time Path Killed";
        let (score, _) = rules.score(text);
        assert_eq!(score, 5);
        assert!(!rules.keeps(score));
    }

    #[test]
    fn repeats_count_once() {
        let rules = ScoringRules::default();
        let (score, _) = rules.score("damage damage damage damage damage damage");
        assert_eq!(score, 1);
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        let rules = ScoringRules::default();
        // "relocation" contains "location"; "DAMAGE" matches despite case.
        let (_, hits) = rules.score("RELOCATION caused DAMAGE");
        assert!(hits.contains(&"location"));
        assert!(hits.contains(&"damage"));
    }

    #[test]
    fn empty_text_scores_zero() {
        let rules = ScoringRules::default();
        let (score, hits) = rules.score("");
        assert_eq!(score, 0);
        assert!(hits.is_empty());
        assert!(!rules.keeps(score));
    }

    #[test]
    fn scoring_is_deterministic() {
        let rules = ScoringRules::default();
        let text = "storm data for the month: location, date, path, yards";
        assert_eq!(rules.score(text), rules.score(text));
    }

    #[test]
    fn custom_weights_are_honoured() {
        let rules = ScoringRules {
            keywords: vec![KeywordRule::new("tornado", 3), KeywordRule::new("hail", 2)],
            threshold: 5,
        };
        let (score, _) = rules.score("tornado with hail");
        assert_eq!(score, 5);
        assert!(rules.keeps(score));
        let (score, _) = rules.score("tornado only");
        assert!(!rules.keeps(score));
    }
}
