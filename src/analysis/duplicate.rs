use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::analysis::components::UnionFind;
use crate::analysis::matrix::SimilarityMatrix;
use crate::analysis::similarity::SCORE_EPSILON;
use crate::model::test_case::{TestCase, TestCaseId, TestSuite};
use crate::oracle::gateway::{OracleGateway, smart_limit};
use crate::oracle::oracle_model::OracleConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateConfig {
    #[serde(default = "default_exact")]
    pub exact_threshold: f64,
    #[serde(default = "default_near")]
    pub near_duplicate_threshold: f64,
    #[serde(default = "default_highly")]
    pub highly_similar_threshold: f64,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            exact_threshold: default_exact(),
            near_duplicate_threshold: default_near(),
            highly_similar_threshold: default_highly(),
        }
    }
}

fn default_exact() -> f64 { 1.0 }
fn default_near() -> f64 { 0.90 }
fn default_highly() -> f64 { 0.75 }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateCategory {
    Exact,
    Near,
    HighlySimilar,
}

impl std::fmt::Display for DuplicateCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DuplicateCategory::Exact => "exact duplicate",
            DuplicateCategory::Near => "near duplicate",
            DuplicateCategory::HighlySimilar => "highly similar",
        };
        f.write_str(label)
    }
}

/// A connected set of similar test cases with one representative to keep.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    /// Members in suite order
    pub test_case_ids: Vec<TestCaseId>,
    pub keep: TestCaseId,
    pub remove: Vec<TestCaseId>,
    pub max_similarity: f64,
    pub average_similarity: f64,
    pub reason: String,

    /// `None` for singletons and groups below the highly-similar threshold
    pub category: Option<DuplicateCategory>,

    /// At least one edge came from the semantic oracle
    pub oracle_assisted: bool,
}

impl DuplicateGroup {
    pub fn is_singleton(&self) -> bool {
        self.test_case_ids.len() == 1
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DuplicateReport {
    /// Every input id appears in exactly one group
    pub groups: Vec<DuplicateGroup>,
    pub exact_count: usize,
    pub near_count: usize,
    pub highly_similar_count: usize,

    /// Oracle pairs accepted as duplicate edges
    pub oracle_pairs: usize,
    pub oracle_queries: usize,
}

impl DuplicateReport {
    pub fn by_category(&self, category: DuplicateCategory) -> impl Iterator<Item = &DuplicateGroup> {
        self.groups.iter().filter(move |g| g.category == Some(category))
    }

    pub fn exact(&self) -> impl Iterator<Item = &DuplicateGroup> {
        self.by_category(DuplicateCategory::Exact)
    }

    pub fn near(&self) -> impl Iterator<Item = &DuplicateGroup> {
        self.by_category(DuplicateCategory::Near)
    }

    pub fn highly_similar(&self) -> impl Iterator<Item = &DuplicateGroup> {
        self.by_category(DuplicateCategory::HighlySimilar)
    }

    pub fn total_groups(&self) -> usize {
        self.exact_count + self.near_count + self.highly_similar_count
    }

    pub fn group_of(&self, id: TestCaseId) -> Option<&DuplicateGroup> {
        self.groups.iter().find(|g| g.test_case_ids.contains(&id))
    }
}

// ============================================================================
// Quality score
// ============================================================================

/// Higher is better: priority, pass rate, speed and step count.
pub fn quality_score(tc: &TestCase) -> f64 {
    let mut score = 0.0;

    if let Some(p) = tc.priority {
        if p > 0 {
            score += (6 - p).max(0) as f64 * 10.0;
        }
    }

    if let Some(rate) = tc.pass_rate() {
        score += rate * 20.0;
    }

    if let Some(d) = tc.duration {
        score += (1.0 - d as f64 / 300_000.0).max(0.0) * 5.0;
    }

    score += (tc.steps.len() as f64 / 50.0).min(1.0) * 3.0;
    score
}

/// First member wins unless another strictly beats it.
pub fn select_representative(ids: &[TestCaseId], suite: &TestSuite) -> Option<TestCaseId> {
    let mut best: Option<(TestCaseId, f64)> = None;
    for &id in ids {
        let Some(tc) = suite.get(id) else { continue };
        let score = quality_score(tc);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((id, score)),
        }
    }
    best.map(|(id, _)| id)
}

pub fn keep_reason(tc: &TestCase) -> String {
    let mut reasons = Vec::new();
    if let Some(p) = tc.priority {
        reasons.push(format!("Priority {}", p));
    }
    if let Some(rate) = tc.pass_rate() {
        reasons.push(format!("{:.1}% pass rate", rate * 100.0));
    }
    if let Some(d) = tc.duration {
        reasons.push(format!("{:.1}s execution time", d as f64 / 1000.0));
    }
    if reasons.is_empty() {
        "Selected as representative".to_string()
    } else {
        reasons.join(", ")
    }
}

// ============================================================================
// Detector
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DuplicateDetector {
    pub config: DuplicateConfig,
    pub oracle: OracleConfig,
}

impl DuplicateDetector {
    pub fn new(config: DuplicateConfig) -> Self {
        Self {
            config,
            oracle: OracleConfig::default(),
        }
    }

    pub fn with_oracle_config(mut self, oracle: OracleConfig) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn categorize(&self, max_similarity: f64) -> Option<DuplicateCategory> {
        let c = &self.config;
        if max_similarity + SCORE_EPSILON >= c.exact_threshold {
            Some(DuplicateCategory::Exact)
        } else if max_similarity + SCORE_EPSILON >= c.near_duplicate_threshold {
            Some(DuplicateCategory::Near)
        } else if max_similarity + SCORE_EPSILON >= c.highly_similar_threshold {
            Some(DuplicateCategory::HighlySimilar)
        } else {
            None
        }
    }

    pub fn detect(
        &self,
        suite: &TestSuite,
        matrix: &SimilarityMatrix,
        oracle: Option<&mut OracleGateway>,
    ) -> DuplicateReport {
        let ids = suite.ids();
        let index: HashMap<TestCaseId, usize> = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let mut uf = UnionFind::new(ids.len());

        for pair in matrix.pairs() {
            if pair.similarity + SCORE_EPSILON >= self.config.highly_similar_threshold {
                if let (Some(&a), Some(&b)) = (index.get(&pair.first), index.get(&pair.second)) {
                    uf.union(a, b);
                }
            }
        }

        let mut oracle_scores: HashMap<(TestCaseId, TestCaseId), f64> = HashMap::new();
        let mut oracle_queries = 0;
        if let Some(gateway) = oracle {
            let (accepted, queried) = self.oracle_edges(suite, matrix, gateway);
            oracle_queries = queried;
            for (a, b, score) in accepted {
                if let (Some(&ia), Some(&ib)) = (index.get(&a), index.get(&b)) {
                    uf.union(ia, ib);
                }
                oracle_scores.insert((a.min(b), a.max(b)), score);
            }
        }

        let mut report = DuplicateReport {
            oracle_pairs: oracle_scores.len(),
            oracle_queries,
            ..Default::default()
        };

        for component in uf.components() {
            let members: Vec<TestCaseId> = component.iter().map(|&i| ids[i]).collect();
            let group = self.analyze_group(&members, suite, matrix, &oracle_scores);
            match group.category {
                Some(DuplicateCategory::Exact) => report.exact_count += 1,
                Some(DuplicateCategory::Near) => report.near_count += 1,
                Some(DuplicateCategory::HighlySimilar) => report.highly_similar_count += 1,
                None => {}
            }
            report.groups.push(group);
        }

        tracing::info!(
            exact = report.exact_count,
            near = report.near_count,
            highly_similar = report.highly_similar_count,
            oracle_pairs = report.oracle_pairs,
            "duplicate detection complete"
        );
        report
    }

    /// Ask the oracle about pairs in the band just below the algorithmic
    /// threshold. Returns accepted `(a, b, similarity)` and the query count.
    fn oracle_edges(
        &self,
        suite: &TestSuite,
        matrix: &SimilarityMatrix,
        gateway: &mut OracleGateway,
    ) -> (Vec<(TestCaseId, TestCaseId, f64)>, usize) {
        let mut candidates: Vec<_> = matrix
            .pairs()
            .into_iter()
            .filter(|p| p.similarity >= self.oracle.band_low && p.similarity < self.oracle.band_high)
            .collect();
        candidates.sort_by(|x, y| y.similarity.total_cmp(&x.similarity));

        let limit = smart_limit(self.oracle.candidate_limit, suite.len()).min(candidates.len());
        candidates.truncate(limit);

        tracing::info!(
            candidates = candidates.len(),
            oracle = gateway.oracle_name(),
            "querying semantic oracle"
        );

        let mut accepted = Vec::new();
        for pair in &candidates {
            let (Some(a), Some(b)) = (suite.get(pair.first), suite.get(pair.second)) else {
                continue;
            };
            let Some(verdict) = gateway.assess(a, b) else {
                continue;
            };
            if verdict.semantic_similarity + SCORE_EPSILON >= self.oracle.acceptance_threshold {
                tracing::debug!(
                    first = a.id,
                    second = b.id,
                    algorithmic = pair.similarity,
                    semantic = verdict.semantic_similarity,
                    "oracle duplicate accepted"
                );
                accepted.push((a.id, b.id, verdict.semantic_similarity));
            }
        }
        (accepted, candidates.len())
    }

    fn analyze_group(
        &self,
        members: &[TestCaseId],
        suite: &TestSuite,
        matrix: &SimilarityMatrix,
        oracle_scores: &HashMap<(TestCaseId, TestCaseId), f64>,
    ) -> DuplicateGroup {
        if members.len() == 1 {
            let id = members[0];
            return DuplicateGroup {
                test_case_ids: members.to_vec(),
                keep: id,
                remove: Vec::new(),
                max_similarity: 0.0,
                average_similarity: 0.0,
                reason: "No duplicates found".to_string(),
                category: None,
                oracle_assisted: false,
            };
        }

        let mut similarities = Vec::new();
        let mut oracle_assisted = false;
        for (i, &a) in members.iter().enumerate() {
            for &b in &members[i + 1..] {
                let algorithmic = matrix.get(a, b);
                let score = match oracle_scores.get(&(a.min(b), a.max(b))) {
                    Some(&semantic) => {
                        oracle_assisted = true;
                        algorithmic.max(semantic)
                    }
                    None => algorithmic,
                };
                similarities.push(score);
            }
        }

        let max = similarities.iter().cloned().fold(0.0, f64::max);
        let average = similarities.iter().sum::<f64>() / similarities.len() as f64;

        let keep = select_representative(members, suite).unwrap_or(members[0]);
        let remove = members.iter().copied().filter(|&id| id != keep).collect();
        let reason = suite.get(keep).map(keep_reason).unwrap_or_default();

        DuplicateGroup {
            test_case_ids: members.to_vec(),
            keep,
            remove,
            max_similarity: max,
            average_similarity: average,
            reason,
            category: self.categorize(max),
            oracle_assisted,
        }
    }
}
