use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::flows::coverage::CoverageAnalyzer;
use crate::flows::flow_model::CRITICAL_FLOWS;
use crate::model::test_case::{TestCase, TestCaseId, TestSuite};

const NEUTRAL_SCORE: f64 = 50.0;

const PRIORITY_WEIGHT: f64 = 0.30;
const PASS_RATE_WEIGHT: f64 = 0.25;
const CRITICAL_FLOW_WEIGHT: f64 = 0.20;
const DURATION_WEIGHT: f64 = 0.15;
const COVERAGE_WEIGHT: f64 = 0.10;

/// Every 3s of runtime costs one point of the duration score.
const DURATION_MS_PER_POINT: f64 = 3000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityCategory {
    Smoke,
    High,
    Medium,
    Low,
}

impl PriorityCategory {
    pub const ALL: [PriorityCategory; 4] = [
        PriorityCategory::Smoke,
        PriorityCategory::High,
        PriorityCategory::Medium,
        PriorityCategory::Low,
    ];

    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            PriorityCategory::Smoke
        } else if score >= 60.0 {
            PriorityCategory::High
        } else if score >= 40.0 {
            PriorityCategory::Medium
        } else {
            PriorityCategory::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityCategory::Smoke => "smoke",
            PriorityCategory::High => "high",
            PriorityCategory::Medium => "medium",
            PriorityCategory::Low => "low",
        }
    }
}

impl fmt::Display for PriorityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution priority on a 0..100 scale. Higher runs earlier.
#[derive(Debug, Clone, Default)]
pub struct PriorityCalculator {
    coverage: CoverageAnalyzer,
}

impl PriorityCalculator {
    pub fn new(coverage: CoverageAnalyzer) -> Self {
        Self { coverage }
    }

    pub fn calculate(&self, suite: &TestSuite) -> BTreeMap<TestCaseId, f64> {
        suite.iter().map(|tc| (tc.id, self.score(tc))).collect()
    }

    pub fn score(&self, tc: &TestCase) -> f64 {
        let priority = match tc.priority {
            Some(p) if p > 0 => ((6 - p) as f64 * 20.0).max(0.0),
            _ => NEUTRAL_SCORE,
        };

        let pass_rate = match (tc.pass_count, tc.fail_count) {
            (Some(_), Some(_)) => tc.pass_rate().map(|r| r * 100.0).unwrap_or(NEUTRAL_SCORE),
            _ => NEUTRAL_SCORE,
        };

        let flows = self.coverage.analyzer().identify_flows(tc);
        let critical = CRITICAL_FLOWS.iter().filter(|f| flows.contains(f)).count();
        let critical_score = (critical as f64 / 3.0).min(1.0) * 100.0;

        let duration = tc
            .duration
            .map(|d| (100.0 - d as f64 / DURATION_MS_PER_POINT).max(0.0))
            .unwrap_or(NEUTRAL_SCORE);

        let coverage = self.coverage.test_case_coverage_score(tc) * 100.0;

        let total = priority * PRIORITY_WEIGHT
            + pass_rate * PASS_RATE_WEIGHT
            + critical_score * CRITICAL_FLOW_WEIGHT
            + duration * DURATION_WEIGHT
            + coverage * COVERAGE_WEIGHT;
        total.clamp(0.0, 100.0)
    }

    /// Ids per category, each list in ascending id order.
    pub fn categorize(
        &self,
        priorities: &BTreeMap<TestCaseId, f64>,
    ) -> BTreeMap<PriorityCategory, Vec<TestCaseId>> {
        let mut categories: BTreeMap<PriorityCategory, Vec<TestCaseId>> =
            PriorityCategory::ALL.iter().map(|c| (*c, Vec::new())).collect();
        for (&id, &score) in priorities {
            categories
                .entry(PriorityCategory::from_score(score))
                .or_default()
                .push(id);
        }
        categories
    }
}
