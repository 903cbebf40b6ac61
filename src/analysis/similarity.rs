use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::analysis::sequence::{compare_sequences, flow_pattern, fuzzy_similarity, levenshtein};
use crate::model::normalize::{step_url, step_urls, url_domain};
use crate::model::test_case::{TestCase, TestCaseId, TestSuite};

/// Float slack used for threshold comparisons on weighted sums.
pub const SCORE_EPSILON: f64 = 1e-9;

static TEXT_DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b((?:[a-z0-9-]+\.)+(?:com|org|net|io|co|dev|app|edu|gov|ai|uk|in|de))\b")
        .expect("domain regex")
});

pub const DEFAULT_DOMAIN_KEYWORDS: [(&str, &str); 16] = [
    ("amazon", "amazon.com"),
    ("ebay", "ebay.com"),
    ("walmart", "walmart.com"),
    ("target", "target.com"),
    ("etsy", "etsy.com"),
    ("shopify", "shopify.com"),
    ("facebook", "facebook.com"),
    ("twitter", "twitter.com"),
    ("linkedin", "linkedin.com"),
    ("instagram", "instagram.com"),
    ("youtube", "youtube.com"),
    ("google", "google.com"),
    ("microsoft", "microsoft.com"),
    ("apple", "apple.com"),
    ("netflix", "netflix.com"),
    ("spotify", "spotify.com"),
];

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityWeights {
    #[serde(default = "default_point_three")]
    pub sequence: f64,
    #[serde(default = "default_point_three")]
    pub lcs: f64,
    #[serde(default = "default_point_two")]
    pub step_level: f64,
    #[serde(default = "default_point_two")]
    pub flow_pattern: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            sequence: 0.3,
            lcs: 0.3,
            step_level: 0.2,
            flow_pattern: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    #[serde(default)]
    pub weights: SimilarityWeights,

    /// Multiplier applied when two cases target disjoint website domains
    #[serde(default = "default_point_three")]
    pub domain_penalty: f64,

    /// Keyword -> domain table matched against name and description
    #[serde(default = "default_domain_keywords")]
    pub domain_keywords: BTreeMap<String, String>,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            weights: SimilarityWeights::default(),
            domain_penalty: 0.3,
            domain_keywords: default_domain_keywords(),
        }
    }
}

fn default_point_three() -> f64 { 0.3 }
fn default_point_two() -> f64 { 0.2 }

pub fn default_domain_keywords() -> BTreeMap<String, String> {
    DEFAULT_DOMAIN_KEYWORDS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ============================================================================
// Scores
// ============================================================================

/// Pairwise similarity breakdown. All scores are in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityScores {
    pub overall: f64,

    /// Weighted sum before the website-domain penalty
    pub raw_overall: f64,

    pub sequence_similarity: f64,
    pub lcs_similarity: f64,
    pub step_level_similarity: f64,
    pub flow_pattern_similarity: f64,
    pub different_websites: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarPair {
    pub first: TestCaseId,
    pub second: TestCaseId,
    pub similarity: f64,
}

// ============================================================================
// Analyzer
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct SimilarityAnalyzer {
    config: SimilarityConfig,
}

impl SimilarityAnalyzer {
    pub fn new(config: SimilarityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    /// Edit distance over the space-joined action sequences.
    pub fn sequence_similarity(&self, a: &TestCase, b: &TestCase) -> f64 {
        let seq_a = a.action_sequence().join(" ");
        let seq_b = b.action_sequence().join(" ");
        if seq_a.is_empty() && seq_b.is_empty() {
            return 1.0;
        }
        if seq_a.is_empty() || seq_b.is_empty() {
            return 0.0;
        }
        let max_len = seq_a.chars().count().max(seq_b.chars().count());
        (1.0 - levenshtein(&seq_a, &seq_b) as f64 / max_len as f64).max(0.0)
    }

    pub fn lcs_similarity(&self, a: &TestCase, b: &TestCase) -> (f64, usize) {
        compare_sequences(&a.action_sequence(), &b.action_sequence())
    }

    /// Positional step comparison.
    ///
    /// Each aligned pair earns 0.4 for the action, 0.3 for the element and up
    /// to 0.3 for the description. When both steps navigate to different
    /// domains the accumulator is halved at that point.
    pub fn step_level_similarity(&self, a: &TestCase, b: &TestCase) -> f64 {
        let steps_a = a.ordered_steps();
        let steps_b = b.ordered_steps();
        if steps_a.is_empty() && steps_b.is_empty() {
            return 1.0;
        }
        if steps_a.is_empty() || steps_b.is_empty() {
            return 0.0;
        }

        let max_steps = steps_a.len().max(steps_b.len());
        let mut matches = 0.0;

        for (s1, s2) in steps_a.iter().zip(steps_b.iter()) {
            if s1.action_name == s2.action_name {
                matches += 0.4;
            }

            match (&s1.element, &s2.element) {
                (Some(e1), Some(e2)) if e1.to_lowercase() == e2.to_lowercase() => matches += 0.3,
                (None, None) => matches += 0.3,
                _ => {}
            }

            match (&s1.description, &s2.description) {
                (Some(d1), Some(d2)) => matches += fuzzy_similarity(d1, d2) * 0.3,
                (None, None) => matches += 0.3,
                _ => {}
            }

            if s1.is_navigation() && s2.is_navigation() {
                let d1 = step_url(s1).and_then(|u| url_domain(&u));
                let d2 = step_url(s2).and_then(|u| url_domain(&u));
                if let (Some(d1), Some(d2)) = (d1, d2) {
                    if d1 != d2 {
                        matches *= 0.5;
                    }
                }
            }
        }

        (matches / max_steps as f64).min(1.0)
    }

    pub fn flow_pattern_similarity(&self, a: &TestCase, b: &TestCase) -> f64 {
        compare_sequences(&flow_pattern(a), &flow_pattern(b)).0
    }

    /// Domains a test case targets: step URLs, keyword table and domain-like text.
    pub fn website_domains(&self, case: &TestCase) -> BTreeSet<String> {
        let mut domains = BTreeSet::new();

        for step in &case.steps {
            for url in step_urls(step) {
                if let Some(domain) = url_domain(&url) {
                    domains.insert(domain);
                }
            }
        }

        let text = case.text();
        let words: BTreeSet<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        for (keyword, domain) in &self.config.domain_keywords {
            if words.contains(keyword.as_str()) {
                domains.insert(domain.clone());
            }
        }

        for cap in TEXT_DOMAIN.captures_iter(&text) {
            let found = cap[1].to_lowercase();
            let found = found.strip_prefix("www.").unwrap_or(&found).to_string();
            domains.insert(found);
        }

        domains
    }

    pub fn different_websites(&self, a: &TestCase, b: &TestCase) -> bool {
        let da = self.website_domains(a);
        let db = self.website_domains(b);
        !da.is_empty() && !db.is_empty() && da.is_disjoint(&db)
    }

    /// Weighted similarity across all four metrics with the domain penalty.
    pub fn similarity(&self, a: &TestCase, b: &TestCase) -> SimilarityScores {
        let w = &self.config.weights;

        let sequence = self.sequence_similarity(a, b);
        let (lcs, _) = self.lcs_similarity(a, b);
        let step_level = self.step_level_similarity(a, b);
        let flow = self.flow_pattern_similarity(a, b);

        let raw_overall =
            sequence * w.sequence + lcs * w.lcs + step_level * w.step_level + flow * w.flow_pattern;

        let different_websites = self.different_websites(a, b);
        let overall = if different_websites {
            raw_overall * self.config.domain_penalty
        } else {
            raw_overall
        };

        SimilarityScores {
            overall,
            raw_overall,
            sequence_similarity: sequence,
            lcs_similarity: lcs,
            step_level_similarity: step_level,
            flow_pattern_similarity: flow,
            different_websites,
        }
    }

    /// All unordered pairs scoring at least `threshold`, highest first.
    pub fn find_similar(&self, suite: &TestSuite, threshold: f64) -> Vec<SimilarPair> {
        let cases: Vec<&TestCase> = suite.iter().collect();
        let mut pairs = Vec::new();

        for (i, a) in cases.iter().enumerate() {
            for b in &cases[i + 1..] {
                let score = self.similarity(a, b).overall;
                if score + SCORE_EPSILON >= threshold {
                    pairs.push(SimilarPair {
                        first: a.id,
                        second: b.id,
                        similarity: score,
                    });
                }
            }
        }

        pairs.sort_by(|x, y| y.similarity.total_cmp(&x.similarity));
        pairs
    }
}
