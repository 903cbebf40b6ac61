use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::flows::flow_model::FlowType;
use crate::model::test_case::{TestCase, TestCaseId, TestSuite};
use crate::optimization::step_coverage::CoverageLoss;
use crate::optimization::validator::MergeLineage;

/// Closed set of reasons attached to every engine decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKind {
    ExactDuplicate,
    NearDuplicate,
    HighlySimilar,
    MergedUniqueSteps,
    MultiMerge,
    AdvisorRemoval,
    FlowCoverageDrop,
    StepCoverageDrop,
    CriticalFlowLost,
    RoleMismatch,
    WebsiteMismatch,
    MergeValidationFailed,
    LockedByAdvisor,
    AlreadyResolved,
}

impl ReasonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonKind::ExactDuplicate => "exact_duplicate",
            ReasonKind::NearDuplicate => "near_duplicate",
            ReasonKind::HighlySimilar => "highly_similar",
            ReasonKind::MergedUniqueSteps => "merged_unique_steps",
            ReasonKind::MultiMerge => "multi_merge",
            ReasonKind::AdvisorRemoval => "advisor_removal",
            ReasonKind::FlowCoverageDrop => "flow_coverage_drop",
            ReasonKind::StepCoverageDrop => "step_coverage_drop",
            ReasonKind::CriticalFlowLost => "critical_flow_lost",
            ReasonKind::RoleMismatch => "role_mismatch",
            ReasonKind::WebsiteMismatch => "website_mismatch",
            ReasonKind::MergeValidationFailed => "merge_validation_failed",
            ReasonKind::LockedByAdvisor => "locked_by_advisor",
            ReasonKind::AlreadyResolved => "already_resolved",
        }
    }

    /// Gate rejections, as opposed to merge vetoes or bookkeeping skips.
    pub fn is_coverage_rejection(&self) -> bool {
        matches!(
            self,
            ReasonKind::FlowCoverageDrop | ReasonKind::StepCoverageDrop | ReasonKind::CriticalFlowLost
        )
    }
}

impl fmt::Display for ReasonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reason {
    pub kind: ReasonKind,
    pub detail: String,
}

impl Reason {
    pub fn new(kind: ReasonKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.detail)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseState {
    Pending,
    Kept,
    Removed,
    MergedAway,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemovedCase {
    pub test_case_id: TestCaseId,

    /// Case whose coverage makes this one redundant, if any
    pub covered_by: Option<TestCaseId>,
    pub similarity: Option<f64>,
    pub reason: Reason,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergedCase {
    pub merged_id: TestCaseId,
    pub source_ids: Vec<TestCaseId>,
    pub step_count: usize,
    pub reason: Reason,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedCandidate {
    pub test_case_ids: Vec<TestCaseId>,
    pub attempted: String,
    pub reason: Reason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageSnapshot {
    pub test_case_count: usize,
    pub flows: BTreeSet<FlowType>,

    /// Share of the baseline flows still covered
    pub flow_coverage: f64,

    /// Share of the baseline step signatures still covered
    pub step_coverage: f64,
    pub unique_steps: usize,
    pub critical_flows_covered: BTreeSet<FlowType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    pub original_count: usize,
    pub optimized_count: usize,
    pub kept_ids: Vec<TestCaseId>,
    pub removed: Vec<RemovedCase>,
    pub merged: Vec<MergedCase>,
    pub merged_cases: Vec<TestCase>,
    pub skipped: Vec<SkippedCandidate>,
    pub states: BTreeMap<TestCaseId, CaseState>,
    pub before: CoverageSnapshot,
    pub after: CoverageSnapshot,
    pub coverage_loss: CoverageLoss,
    pub reduction_count: usize,
    pub reduction_percentage: f64,
    pub time_saved_ms: u64,
    pub oracle_pairs: usize,
}

impl OptimizationResult {
    pub fn removed_ids(&self) -> Vec<TestCaseId> {
        self.removed.iter().map(|r| r.test_case_id).collect()
    }

    pub fn merged_away_ids(&self) -> Vec<TestCaseId> {
        self.merged.iter().flat_map(|m| m.source_ids.iter().copied()).collect()
    }

    pub fn state_of(&self, id: TestCaseId) -> Option<CaseState> {
        self.states.get(&id).copied()
    }

    pub fn skipped_for(&self, id: TestCaseId) -> impl Iterator<Item = &SkippedCandidate> {
        self.skipped.iter().filter(move |s| s.test_case_ids.contains(&id))
    }

    pub fn lineage(&self) -> MergeLineage {
        self.merged
            .iter()
            .map(|m| (m.merged_id, m.source_ids.clone()))
            .collect()
    }

    /// Kept originals in input order followed by merged cases.
    pub fn optimized_suite(&self, original: &TestSuite) -> TestSuite {
        let mut suite = TestSuite::new();
        for id in &self.kept_ids {
            if let Some(tc) = original.get(*id) {
                suite.insert(tc.clone());
            }
        }
        for tc in &self.merged_cases {
            if self.kept_ids.contains(&tc.id) {
                suite.insert(tc.clone());
            }
        }
        suite
    }
}
