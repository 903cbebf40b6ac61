use std::collections::HashMap;

use serde::Serialize;

use crate::analysis::similarity::{SimilarPair, SimilarityAnalyzer, SimilarityScores};
use crate::model::test_case::{TestCaseId, TestSuite};

/// Symmetric similarity matrix, each unordered pair computed exactly once.
#[derive(Debug, Clone, Default)]
pub struct SimilarityMatrix {
    ids: Vec<TestCaseId>,
    scores: HashMap<(TestCaseId, TestCaseId), SimilarityScores>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatrixSummary {
    pub total_comparisons: usize,
    pub average_similarity: f64,
    pub max_similarity: f64,
    pub min_similarity: f64,
    pub high_similarity_count: usize,
    pub medium_similarity_count: usize,
    pub low_similarity_count: usize,
    pub high_similarity_pairs: Vec<SimilarPair>,
}

fn key(a: TestCaseId, b: TestCaseId) -> (TestCaseId, TestCaseId) {
    if a <= b { (a, b) } else { (b, a) }
}

impl SimilarityMatrix {
    pub fn build(analyzer: &SimilarityAnalyzer, suite: &TestSuite) -> Self {
        let cases: Vec<_> = suite.iter().collect();
        let mut scores = HashMap::new();

        for (i, a) in cases.iter().enumerate() {
            for b in &cases[i + 1..] {
                scores.insert(key(a.id, b.id), analyzer.similarity(a, b));
            }
        }

        Self {
            ids: suite.ids().to_vec(),
            scores,
        }
    }

    /// Full breakdown for a pair; `None` for self-pairs and unknown ids.
    pub fn scores(&self, a: TestCaseId, b: TestCaseId) -> Option<&SimilarityScores> {
        self.scores.get(&key(a, b))
    }

    /// Overall similarity; a case is always 1.0 to itself.
    pub fn get(&self, a: TestCaseId, b: TestCaseId) -> f64 {
        if a == b {
            return 1.0;
        }
        self.scores(a, b).map_or(0.0, |s| s.overall)
    }

    pub fn ids(&self) -> &[TestCaseId] {
        &self.ids
    }

    /// Unordered pairs in suite order.
    pub fn pairs(&self) -> Vec<SimilarPair> {
        let mut pairs = Vec::new();
        for (i, &a) in self.ids.iter().enumerate() {
            for &b in &self.ids[i + 1..] {
                pairs.push(SimilarPair {
                    first: a,
                    second: b,
                    similarity: self.get(a, b),
                });
            }
        }
        pairs
    }

    pub fn most_similar(&self, top_n: usize) -> Vec<SimilarPair> {
        let mut pairs = self.pairs();
        pairs.sort_by(|x, y| y.similarity.total_cmp(&x.similarity));
        pairs.truncate(top_n);
        pairs
    }

    /// Every other case ranked by similarity to `id`.
    pub fn similar_to(&self, id: TestCaseId) -> Vec<(TestCaseId, f64)> {
        if !self.ids.contains(&id) {
            return Vec::new();
        }
        let mut others: Vec<(TestCaseId, f64)> = self
            .ids
            .iter()
            .filter(|&&other| other != id)
            .map(|&other| (other, self.get(id, other)))
            .collect();
        others.sort_by(|x, y| y.1.total_cmp(&x.1));
        others
    }

    pub fn summary(&self) -> MatrixSummary {
        let pairs = self.pairs();
        let values: Vec<f64> = pairs.iter().map(|p| p.similarity).collect();

        let mut high: Vec<SimilarPair> = pairs.iter().filter(|p| p.similarity > 0.75).cloned().collect();
        let medium = values.iter().filter(|&&v| (0.5..=0.75).contains(&v)).count();
        let low = values.iter().filter(|&&v| v < 0.5).count();
        high.sort_by(|x, y| y.similarity.total_cmp(&x.similarity));
        let high_count = high.len();
        high.truncate(20);

        let (average, max, min) = if values.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            (
                values.iter().sum::<f64>() / values.len() as f64,
                values.iter().cloned().fold(f64::MIN, f64::max),
                values.iter().cloned().fold(f64::MAX, f64::min),
            )
        };

        MatrixSummary {
            total_comparisons: values.len(),
            average_similarity: average,
            max_similarity: max,
            min_similarity: min,
            high_similarity_count: high_count,
            medium_similarity_count: medium,
            low_similarity_count: low,
            high_similarity_pairs: high,
        }
    }
}
