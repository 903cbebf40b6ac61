use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::model::normalize::step_signature;
use crate::model::test_case::{TestCase, TestCaseId, TestSuite};

/// Step signature -> ids of the cases containing an equivalent step.
pub type StepCoverageMap = BTreeMap<String, Vec<TestCaseId>>;

#[derive(Debug, Clone, Serialize)]
pub struct LostStep {
    pub step_signature: String,
    pub was_covered_by: Vec<TestCaseId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageLoss {
    pub original_step_count: usize,
    pub optimized_step_count: usize,
    pub lost_step_count: usize,
    pub coverage_percentage_after: f64,
    pub lost_steps: Vec<LostStep>,
    pub coverage_maintained: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepCoverageCheck {
    pub is_maintained: bool,
    pub coverage_percentage: f64,
    pub threshold: f64,
    pub original_steps: usize,
    pub retained_steps: usize,
    pub lost_steps: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StepCoverageTracker;

impl StepCoverageTracker {
    pub fn coverage_map(&self, suite: &TestSuite) -> StepCoverageMap {
        let mut map = StepCoverageMap::new();
        for tc in suite.iter() {
            for step in tc.ordered_steps() {
                let ids = map.entry(step_signature(step)).or_default();
                if !ids.contains(&tc.id) {
                    ids.push(tc.id);
                }
            }
        }
        map
    }

    pub fn steps_covered_by(&self, tc: &TestCase) -> BTreeSet<String> {
        tc.steps.iter().map(step_signature).collect()
    }

    pub fn signatures(&self, suite: &TestSuite) -> BTreeSet<String> {
        suite.iter().flat_map(|tc| self.steps_covered_by(tc)).collect()
    }

    /// Percentage of `baseline` signatures present in `suite`. An empty
    /// baseline counts as fully covered.
    pub fn coverage_against(&self, baseline: &BTreeSet<String>, suite: &TestSuite) -> f64 {
        if baseline.is_empty() {
            return 100.0;
        }
        let current = self.signatures(suite);
        baseline.intersection(&current).count() as f64 / baseline.len() as f64 * 100.0
    }

    pub fn coverage_loss(&self, original: &TestSuite, optimized: &TestSuite) -> CoverageLoss {
        let original_map = self.coverage_map(original);
        let optimized_sigs = self.signatures(optimized);

        let lost_steps: Vec<LostStep> = original_map
            .iter()
            .filter(|(sig, _)| !optimized_sigs.contains(*sig))
            .map(|(sig, ids)| LostStep {
                step_signature: sig.clone(),
                was_covered_by: ids.clone(),
            })
            .collect();

        let original_count = original_map.len();
        let retained = original_count - lost_steps.len();
        CoverageLoss {
            original_step_count: original_count,
            optimized_step_count: optimized_sigs.len(),
            lost_step_count: lost_steps.len(),
            coverage_percentage_after: if original_count > 0 {
                retained as f64 / original_count as f64 * 100.0
            } else {
                100.0
            },
            coverage_maintained: lost_steps.is_empty(),
            lost_steps,
        }
    }

    /// `threshold` is a fraction (0.95 = 95%).
    pub fn validate_maintained(
        &self,
        original: &TestSuite,
        optimized: &TestSuite,
        threshold: f64,
    ) -> StepCoverageCheck {
        let loss = self.coverage_loss(original, optimized);
        let percentage = loss.coverage_percentage_after;
        let is_maintained = percentage + 1e-9 >= threshold * 100.0;
        let verb = if is_maintained { "maintained" } else { "dropped" };

        StepCoverageCheck {
            is_maintained,
            coverage_percentage: percentage,
            threshold: threshold * 100.0,
            original_steps: loss.original_step_count,
            retained_steps: loss.original_step_count - loss.lost_step_count,
            lost_steps: loss.lost_step_count,
            message: format!(
                "Coverage {}: {:.1}% (threshold: {:.1}%)",
                verb,
                percentage,
                threshold * 100.0
            ),
        }
    }
}
