use std::collections::HashSet;

use serde::Serialize;

use crate::analysis::sequence::fuzzy_similarity;
use crate::model::normalize::{normalize_action_name, normalize_element, step_signature};
use crate::model::test_case::{TestCase, TestCaseId, TestStep, TestSuite};

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.85;

/// Steps of one case not matched by the other.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UniqueSteps {
    /// No step with the same signature on the other side
    pub exact: Vec<TestStep>,

    /// Exact-unique steps that also have no fuzzy match on the other side
    pub fuzzy: Vec<TestStep>,
}

impl UniqueSteps {
    pub fn total(&self) -> usize {
        self.exact.len() + self.fuzzy.len()
    }

    pub fn has_unique(&self) -> bool {
        self.total() > 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PairUniqueness {
    pub first_id: TestCaseId,
    pub second_id: TestCaseId,
    pub exact_matches: usize,
    pub unique_in_first: UniqueSteps,
    pub unique_in_second: UniqueSteps,
}

impl PairUniqueness {
    pub fn total_unique(&self) -> usize {
        self.unique_in_first.total() + self.unique_in_second.total()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoveredStep {
    pub step: TestStep,
    pub covering_test_cases: Vec<TestCaseId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepCoverageCheck {
    pub total_unique_steps: usize,
    pub covered: Vec<CoveredStep>,
    pub uncovered: Vec<TestStep>,
    pub coverage_percentage: f64,
    pub all_covered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UniquenessAdvice {
    KeepManyUnique,
    ConsiderRemoving,
    KeepUncovered,
    SafeToRemove,
    Review,
}

impl UniquenessAdvice {
    pub fn message(&self) -> &'static str {
        match self {
            UniquenessAdvice::KeepManyUnique => "Keep: Test case has many unique steps",
            UniquenessAdvice::ConsiderRemoving => "Consider removing: Unique steps are covered elsewhere",
            UniquenessAdvice::KeepUncovered => "Keep: Has unique steps not covered elsewhere",
            UniquenessAdvice::SafeToRemove => "Safe to remove: Low uniqueness and steps covered elsewhere",
            UniquenessAdvice::Review => "Review: Low uniqueness but some steps not covered elsewhere",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UniquenessReport {
    pub test_case_id: TestCaseId,
    pub test_case_name: String,
    pub total_steps: usize,
    pub unique_steps: Vec<TestStep>,
    pub uniqueness_score: f64,
    pub coverage: StepCoverageCheck,
    pub recommendation: UniquenessAdvice,
}

// ============================================================================
// Analyzer
// ============================================================================

#[derive(Debug, Clone)]
pub struct StepUniquenessAnalyzer {
    pub fuzzy_threshold: f64,
}

impl Default for StepUniquenessAnalyzer {
    fn default() -> Self {
        Self {
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

impl StepUniquenessAnalyzer {
    pub fn new(fuzzy_threshold: f64) -> Self {
        Self { fuzzy_threshold }
    }

    /// 0.4 action + 0.3 element + 0.3 description, each fuzzy-matched.
    pub fn step_similarity(&self, a: &TestStep, b: &TestStep) -> f64 {
        let action = fuzzy_similarity(
            &normalize_action_name(&a.action_name),
            &normalize_action_name(&b.action_name),
        );
        let element = fuzzy_similarity(
            &normalize_element(a.element.as_deref()).unwrap_or_default(),
            &normalize_element(b.element.as_deref()).unwrap_or_default(),
        );
        let description = fuzzy_similarity(
            a.description.as_deref().unwrap_or(""),
            b.description.as_deref().unwrap_or(""),
        );
        action * 0.4 + element * 0.3 + description * 0.3
    }

    fn matches(&self, a: &TestStep, b: &TestStep) -> bool {
        step_signature(a) == step_signature(b) || self.step_similarity(a, b) >= self.fuzzy_threshold
    }

    pub fn unique_steps(&self, first: &TestCase, second: &TestCase) -> PairUniqueness {
        let first_steps = dedup_by_signature(first);
        let second_steps = dedup_by_signature(second);

        let first_sigs: HashSet<&str> = first_steps.iter().map(|(s, _)| s.as_str()).collect();
        let second_sigs: HashSet<&str> = second_steps.iter().map(|(s, _)| s.as_str()).collect();
        let exact_matches = first_sigs.intersection(&second_sigs).count();

        let exact_first: Vec<&TestStep> = first_steps
            .iter()
            .filter(|(sig, _)| !second_sigs.contains(sig.as_str()))
            .map(|(_, step)| *step)
            .collect();
        let exact_second: Vec<&TestStep> = second_steps
            .iter()
            .filter(|(sig, _)| !first_sigs.contains(sig.as_str()))
            .map(|(_, step)| *step)
            .collect();

        let fuzzy_first = self.without_fuzzy_match(&exact_first, &exact_second);
        let fuzzy_second = self.without_fuzzy_match(&exact_second, &exact_first);

        PairUniqueness {
            first_id: first.id,
            second_id: second.id,
            exact_matches,
            unique_in_first: UniqueSteps {
                exact: exact_first.into_iter().cloned().collect(),
                fuzzy: fuzzy_first,
            },
            unique_in_second: UniqueSteps {
                exact: exact_second.into_iter().cloned().collect(),
                fuzzy: fuzzy_second,
            },
        }
    }

    fn without_fuzzy_match(&self, steps: &[&TestStep], others: &[&TestStep]) -> Vec<TestStep> {
        steps
            .iter()
            .filter(|step| {
                !others
                    .iter()
                    .any(|other| self.step_similarity(step, other) >= self.fuzzy_threshold)
            })
            .map(|step| (*step).clone())
            .collect()
    }

    /// Steps of `case` with no exact or fuzzy equivalent anywhere else in the suite.
    pub fn globally_unique_steps(&self, case: &TestCase, suite: &TestSuite) -> Vec<TestStep> {
        case.ordered_steps()
            .into_iter()
            .filter(|step| {
                !suite
                    .iter()
                    .filter(|other| other.id != case.id)
                    .any(|other| other.steps.iter().any(|o| self.matches(step, o)))
            })
            .cloned()
            .collect()
    }

    /// Fraction of the case's steps found nowhere else.
    pub fn uniqueness_score(&self, case: &TestCase, suite: &TestSuite) -> f64 {
        if suite.len() <= 1 {
            return 1.0;
        }
        if case.steps.is_empty() {
            return 0.0;
        }
        self.globally_unique_steps(case, suite).len() as f64 / case.steps.len() as f64
    }

    /// Which of `steps` are exactly or fuzzily present in `others`.
    pub fn check_step_coverage(&self, steps: &[TestStep], others: &TestSuite) -> StepCoverageCheck {
        let mut covered = Vec::new();
        let mut uncovered = Vec::new();

        for step in steps {
            let covering: Vec<TestCaseId> = others
                .iter()
                .filter(|tc| tc.steps.iter().any(|o| self.matches(step, o)))
                .map(|tc| tc.id)
                .take(1)
                .collect();

            if covering.is_empty() {
                uncovered.push(step.clone());
            } else {
                covered.push(CoveredStep {
                    step: step.clone(),
                    covering_test_cases: covering,
                });
            }
        }

        let total = steps.len();
        StepCoverageCheck {
            total_unique_steps: total,
            coverage_percentage: if total > 0 {
                covered.len() as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            all_covered: uncovered.is_empty(),
            covered,
            uncovered,
        }
    }

    pub fn uniqueness_report(&self, id: TestCaseId, suite: &TestSuite) -> Option<UniquenessReport> {
        let case = suite.get(id)?;
        let others = suite.without(&[id]);

        let unique_steps = self.globally_unique_steps(case, suite);
        let score = self.uniqueness_score(case, suite);
        let coverage = self.check_step_coverage(&unique_steps, &others);
        let recommendation = advise(score, coverage.all_covered);

        Some(UniquenessReport {
            test_case_id: id,
            test_case_name: case.name.clone(),
            total_steps: case.steps.len(),
            unique_steps,
            uniqueness_score: score,
            coverage,
            recommendation,
        })
    }
}

fn dedup_by_signature(case: &TestCase) -> Vec<(String, &TestStep)> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for step in case.ordered_steps() {
        let sig = step_signature(step);
        if seen.insert(sig.clone()) {
            out.push((sig, step));
        }
    }
    out
}

fn advise(score: f64, all_covered: bool) -> UniquenessAdvice {
    if score >= 0.7 {
        UniquenessAdvice::KeepManyUnique
    } else if score >= 0.4 {
        if all_covered {
            UniquenessAdvice::ConsiderRemoving
        } else {
            UniquenessAdvice::KeepUncovered
        }
    } else if all_covered {
        UniquenessAdvice::SafeToRemove
    } else {
        UniquenessAdvice::Review
    }
}
