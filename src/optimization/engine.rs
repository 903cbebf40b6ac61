use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::analysis::duplicate::{DuplicateCategory, DuplicateDetector, DuplicateReport};
use crate::analysis::matrix::SimilarityMatrix;
use crate::analysis::prefix::find_mergeable_groups;
use crate::analysis::similarity::{SCORE_EPSILON, SimilarityAnalyzer};
use crate::error::{OptimizerError, Result};
use crate::flows::coverage::CoverageAnalyzer;
use crate::flows::flow_model::{CRITICAL_FLOWS, FlowType};
use crate::model::test_case::{TestCase, TestCaseId, TestSuite};
use crate::optimization::merge_validator::{MAX_DEPENDENCY_ISSUES, MergedCaseValidator, step_dependency_issues};
use crate::optimization::merger::{MergeVeto, TestCaseMerger};
use crate::optimization::result::{
    CaseState, CoverageSnapshot, MergedCase, OptimizationResult, Reason, ReasonKind, RemovedCase,
    SkippedCandidate,
};
use crate::optimization::step_coverage::StepCoverageTracker;
use crate::oracle::advisor::{AdvisorAction, Recommendations};
use crate::oracle::gateway::OracleGateway;
use crate::trace::logger::TraceLogger;
use crate::trace::trace::{RunSummary, TraceEvent};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fraction of baseline flows that must stay covered
    #[serde(default = "default_min_flow")]
    pub min_flow_coverage: f64,

    /// Fraction of baseline step signatures that must stay covered
    #[serde(default = "default_min_step")]
    pub min_step_coverage: f64,

    #[serde(default = "default_critical")]
    pub critical_flows: Vec<FlowType>,

    /// Consolidate (role, website) groups sharing a prefix before the main pass
    #[serde(default)]
    pub multi_merge: bool,

    #[serde(default = "default_true")]
    pub flexible_login: bool,

    #[serde(default = "default_min_prefix")]
    pub multi_merge_min_prefix: usize,

    #[serde(default = "default_min_group")]
    pub multi_merge_min_group: usize,

    #[serde(default)]
    pub tidy_steps: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_flow_coverage: default_min_flow(),
            min_step_coverage: default_min_step(),
            critical_flows: default_critical(),
            multi_merge: false,
            flexible_login: true,
            multi_merge_min_prefix: default_min_prefix(),
            multi_merge_min_group: default_min_group(),
            tidy_steps: false,
        }
    }
}

fn default_min_flow() -> f64 { 0.90 }
fn default_min_step() -> f64 { 0.95 }
fn default_critical() -> Vec<FlowType> { CRITICAL_FLOWS.to_vec() }
fn default_true() -> bool { true }
fn default_min_prefix() -> usize { 1 }
fn default_min_group() -> usize { 2 }

impl EngineConfig {
    /// Step threshold for consolidating `sources` cases at once. Never looser
    /// than the configured minimum.
    pub fn multi_merge_step_threshold(&self, sources: usize) -> f64 {
        let size_based = if sources >= 10 { 0.95 } else { 0.97 };
        f64::max(size_based, self.min_step_coverage)
    }
}

// ============================================================================
// Candidates
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateAction {
    Remove,
    Merge,
}

#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub test_case_id: TestCaseId,
    pub keep_id: Option<TestCaseId>,
    pub similarity: f64,
    pub kind: ReasonKind,

    /// Lower runs first
    pub priority: f64,
    pub action: CandidateAction,
    pub advisor: Option<AdvisorAction>,
}

fn category_kind(category: DuplicateCategory) -> ReasonKind {
    match category {
        DuplicateCategory::Exact => ReasonKind::ExactDuplicate,
        DuplicateCategory::Near => ReasonKind::NearDuplicate,
        DuplicateCategory::HighlySimilar => ReasonKind::HighlySimilar,
    }
}

// ============================================================================
// Coverage gate
// ============================================================================

/// Coverage of the untouched input, captured once per run.
#[derive(Debug, Clone)]
pub struct CoverageBaseline {
    pub flows: BTreeSet<FlowType>,
    pub critical: BTreeSet<FlowType>,
    pub signatures: BTreeSet<String>,
}

impl CoverageBaseline {
    pub fn capture(coverage: &CoverageAnalyzer, tracker: &StepCoverageTracker, suite: &TestSuite) -> Self {
        Self {
            flows: coverage.flows_of(suite),
            critical: coverage.critical_flow_coverage(suite).covered(),
            signatures: tracker.signatures(suite),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub flow_coverage: f64,
    pub step_coverage: f64,
    pub lost_critical: Vec<FlowType>,

    /// First failing check; `None` when the change is safe
    pub rejection: Option<Reason>,
}

impl GateOutcome {
    pub fn passed(&self) -> bool {
        self.rejection.is_none()
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Default)]
pub struct OptimizationEngine {
    pub config: EngineConfig,
    pub similarity: SimilarityAnalyzer,
    pub detector: DuplicateDetector,
    pub merger: TestCaseMerger,
    pub coverage: CoverageAnalyzer,
    pub tracker: StepCoverageTracker,
    trace: TraceLogger,
}

impl OptimizationEngine {
    pub fn new(config: EngineConfig) -> Self {
        let coverage = CoverageAnalyzer::default().with_critical_flows(config.critical_flows.clone());
        let merger = TestCaseMerger {
            tidy_steps: config.tidy_steps,
            ..TestCaseMerger::default()
        };
        Self {
            config,
            coverage,
            merger,
            ..Self::default()
        }
    }

    pub fn with_similarity(mut self, similarity: SimilarityAnalyzer) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn with_detector(mut self, detector: DuplicateDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_merger(mut self, merger: TestCaseMerger) -> Self {
        self.merger = TestCaseMerger {
            tidy_steps: self.config.tidy_steps,
            ..merger
        };
        self
    }

    pub fn with_coverage(mut self, coverage: CoverageAnalyzer) -> Self {
        self.coverage = coverage.with_critical_flows(self.config.critical_flows.clone());
        self
    }

    pub fn with_trace(mut self, trace: TraceLogger) -> Self {
        self.trace = trace;
        self
    }

    /// Re-measure `tentative` against the baseline. Critical flows are
    /// checked first so their loss is the reported reason.
    pub fn check_coverage(
        &self,
        baseline: &CoverageBaseline,
        tentative: &TestSuite,
        step_threshold: f64,
    ) -> GateOutcome {
        let current = self.coverage.flows_of(tentative);
        let flow_coverage = self
            .coverage
            .flow_coverage_against(&baseline.flows, tentative)
            .coverage_percentage;
        let step_coverage = self.tracker.coverage_against(&baseline.signatures, tentative);
        let lost_critical: Vec<FlowType> = baseline.critical.difference(&current).copied().collect();

        let rejection = if !lost_critical.is_empty() {
            let names: Vec<&str> = lost_critical.iter().map(|f| f.as_str()).collect();
            Some(Reason::new(
                ReasonKind::CriticalFlowLost,
                format!("Critical flows no longer covered: {}", names.join(", ")),
            ))
        } else if flow_coverage + SCORE_EPSILON < self.config.min_flow_coverage * 100.0 {
            Some(Reason::new(
                ReasonKind::FlowCoverageDrop,
                format!(
                    "Flow coverage dropped to {:.1}% (threshold: {:.1}%)",
                    flow_coverage,
                    self.config.min_flow_coverage * 100.0
                ),
            ))
        } else if step_coverage + SCORE_EPSILON < step_threshold * 100.0 {
            Some(Reason::new(
                ReasonKind::StepCoverageDrop,
                format!(
                    "Step coverage would drop to {:.1}% (threshold: {:.1}%)",
                    step_coverage,
                    step_threshold * 100.0
                ),
            ))
        } else {
            None
        };

        GateOutcome {
            flow_coverage,
            step_coverage,
            lost_critical,
            rejection,
        }
    }

    pub fn snapshot(&self, baseline: &CoverageBaseline, suite: &TestSuite) -> CoverageSnapshot {
        let critical = self.coverage.critical_flow_coverage(suite).covered();
        CoverageSnapshot {
            test_case_count: suite.len(),
            flows: self.coverage.flows_of(suite),
            flow_coverage: self
                .coverage
                .flow_coverage_against(&baseline.flows, suite)
                .coverage_percentage,
            step_coverage: self.tracker.coverage_against(&baseline.signatures, suite),
            unique_steps: self.tracker.signatures(suite).len(),
            critical_flows_covered: critical,
        }
    }

    /// Removal and merge candidates from a duplicate report, safest first.
    pub fn candidates(
        &self,
        suite: &TestSuite,
        report: &DuplicateReport,
        recommendations: Option<&Recommendations>,
    ) -> Vec<Candidate> {
        let mut out = Vec::new();

        for group in &report.groups {
            let Some(category) = group.category else {
                continue;
            };
            let Some(keep) = suite.get(group.keep) else {
                continue;
            };

            for &remove_id in &group.remove {
                let Some(remove) = suite.get(remove_id) else {
                    continue;
                };

                let (action, priority) = match category {
                    DuplicateCategory::Exact => {
                        let pair = self.merger.uniqueness.unique_steps(remove, keep);
                        if pair.unique_in_first.has_unique() {
                            (CandidateAction::Merge, 1.5)
                        } else {
                            (CandidateAction::Remove, 1.0)
                        }
                    }
                    DuplicateCategory::Near | DuplicateCategory::HighlySimilar => {
                        let action = if self.merger.should_merge(keep, remove) {
                            CandidateAction::Merge
                        } else {
                            CandidateAction::Remove
                        };
                        let priority = if category == DuplicateCategory::Near { 2.0 } else { 3.0 };
                        (action, priority)
                    }
                };

                out.push(Candidate {
                    test_case_id: remove_id,
                    keep_id: Some(group.keep),
                    similarity: group.max_similarity,
                    kind: category_kind(category),
                    priority,
                    action,
                    advisor: None,
                });
            }
        }

        if let Some(recs) = recommendations {
            for candidate in &mut out {
                let Some(rec) = recs.get(&candidate.test_case_id) else {
                    continue;
                };
                candidate.advisor = Some(rec.action);
                match rec.action {
                    AdvisorAction::Remove => candidate.priority = f64::max(0.5, candidate.priority - 0.5),
                    AdvisorAction::Keep => candidate.priority += 1.0,
                    AdvisorAction::Merge => candidate.action = CandidateAction::Merge,
                }
            }
        }

        out.sort_by(|a, b| {
            a.priority
                .total_cmp(&b.priority)
                .then_with(|| b.similarity.total_cmp(&a.similarity))
        });
        out
    }

    /// Run the full pipeline over `suite`. Fails only on malformed input.
    pub fn optimize(
        &self,
        suite: &TestSuite,
        recommendations: Option<&Recommendations>,
        oracle: Option<&mut OracleGateway>,
    ) -> Result<OptimizationResult> {
        if let Some(recs) = recommendations {
            if let Some(id) = recs.keys().find(|id| !suite.contains(**id)) {
                return Err(OptimizerError::unknown(*id, "advisor recommendation"));
            }
        }

        tracing::info!(test_cases = suite.len(), "starting optimization");

        let baseline = CoverageBaseline::capture(&self.coverage, &self.tracker, suite);
        tracing::info!(
            flows = baseline.flows.len(),
            critical = baseline.critical.len(),
            unique_steps = baseline.signatures.len(),
            "baseline coverage captured"
        );

        let locked: HashSet<TestCaseId> = recommendations
            .map(|recs| {
                recs.iter()
                    .filter(|(_, r)| r.action == AdvisorAction::Keep)
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default();

        let mut run = Run::new(self, suite, &baseline, locked);

        if self.config.multi_merge {
            run.multi_merge()?;
        }

        let matrix = SimilarityMatrix::build(&self.similarity, &run.working);
        let report = self.detector.detect(&run.working, &matrix, oracle);
        let oracle_pairs = report.oracle_pairs;
        let candidates = self.candidates(&run.working, &report, recommendations);
        tracing::info!(candidates = candidates.len(), "optimization candidates ranked");

        for candidate in &candidates {
            run.apply_candidate(candidate)?;
        }

        run.resolve_exact_duplicates();

        if let Some(recs) = recommendations {
            run.apply_recommendations(recs);
        }

        Ok(run.finish(oracle_pairs))
    }
}

// ============================================================================
// Run state
// ============================================================================

struct Run<'a> {
    engine: &'a OptimizationEngine,
    original: &'a TestSuite,
    baseline: &'a CoverageBaseline,
    working: TestSuite,
    states: BTreeMap<TestCaseId, CaseState>,
    removed: Vec<RemovedCase>,
    merged: Vec<MergedCase>,
    merged_cases: Vec<TestCase>,
    skipped: Vec<SkippedCandidate>,

    /// Advisor keep locks
    locked: HashSet<TestCaseId>,

    /// Rejected by the gate or vetoed; exempt from unconditional clean-up
    exempt: HashSet<TestCaseId>,

    /// Exact-duplicate representatives, protected from advisor removal
    protected: HashSet<TestCaseId>,
    taken_ids: HashSet<TestCaseId>,
    step: u64,
}

impl<'a> Run<'a> {
    fn new(
        engine: &'a OptimizationEngine,
        original: &'a TestSuite,
        baseline: &'a CoverageBaseline,
        locked: HashSet<TestCaseId>,
    ) -> Self {
        Self {
            engine,
            original,
            baseline,
            working: original.clone(),
            states: original.ids().iter().map(|&id| (id, CaseState::Pending)).collect(),
            removed: Vec::new(),
            merged: Vec::new(),
            merged_cases: Vec::new(),
            skipped: Vec::new(),
            locked,
            exempt: HashSet::new(),
            protected: HashSet::new(),
            taken_ids: original.ids().iter().copied().collect(),
            step: 0,
        }
    }

    fn trace(&mut self, event: TraceEvent) {
        self.engine.trace.log(&event);
    }

    fn next_step(&mut self) -> u64 {
        self.step += 1;
        self.step
    }

    fn skip(&mut self, ids: Vec<TestCaseId>, attempted: &str, reason: Reason, similarity: Option<f64>) {
        tracing::debug!(ids = ?ids, attempted, reason = %reason, "candidate skipped");
        if reason.kind.is_coverage_rejection()
            || matches!(
                reason.kind,
                ReasonKind::RoleMismatch | ReasonKind::WebsiteMismatch | ReasonKind::MergeValidationFailed
            )
        {
            self.exempt.extend(ids.iter().copied());
        }

        let step = self.next_step();
        let mut event = TraceEvent::now(step, attempted)
            .with_ids(&ids)
            .with_decision("skipped")
            .with_reason(&reason);
        if let Some(s) = similarity {
            event = event.with_similarity(s);
        }
        self.trace(event);

        self.skipped.push(SkippedCandidate {
            test_case_ids: ids,
            attempted: attempted.to_string(),
            reason,
        });
    }

    fn veto_reason(veto: &MergeVeto) -> Reason {
        let kind = match veto {
            MergeVeto::RoleMismatch { .. } => ReasonKind::RoleMismatch,
            MergeVeto::WebsiteMismatch { .. } => ReasonKind::WebsiteMismatch,
        };
        Reason::new(kind, format!("Cannot merge: {}", veto))
    }

    /// `None` when the merged case passes every structural check.
    fn merge_validation_failure(&self, merged: &TestCase, sources: &[&TestCase]) -> Option<Reason> {
        let validation = MergedCaseValidator::for_merger(&self.engine.merger).validate(merged, sources);
        for warning in &validation.warnings {
            tracing::debug!(merged_id = merged.id, warning = %warning, "merge validation warning");
        }
        if validation.passed {
            return None;
        }
        Some(Reason::new(
            ReasonKind::MergeValidationFailed,
            format!("Merged test case failed validation: {}", validation.issues.join("; ")),
        ))
    }

    fn commit_removal(
        &mut self,
        id: TestCaseId,
        covered_by: Option<TestCaseId>,
        similarity: Option<f64>,
        reason: Reason,
        gate: Option<&GateOutcome>,
    ) {
        self.working.remove(id);
        self.states.insert(id, CaseState::Removed);

        let step = self.next_step();
        let mut event = TraceEvent::now(step, "remove")
            .with_ids(&[id])
            .with_decision("applied")
            .with_reason(&reason);
        if let Some(s) = similarity {
            event = event.with_similarity(s);
        }
        if let Some(g) = gate {
            event = event.with_coverage(g.flow_coverage, g.step_coverage);
        }
        self.trace(event);

        tracing::info!(test_case = id, reason = %reason, "test case removed");
        self.removed.push(RemovedCase {
            test_case_id: id,
            covered_by,
            similarity,
            reason,
        });
    }

    fn commit_merge(
        &mut self,
        merged: TestCase,
        sources: Vec<TestCaseId>,
        tentative: TestSuite,
        reason: Reason,
        gate: &GateOutcome,
    ) {
        for id in &sources {
            self.states.insert(*id, CaseState::MergedAway);
        }
        self.states.insert(merged.id, CaseState::Pending);
        self.taken_ids.insert(merged.id);
        self.working = tentative;

        let step = self.next_step();
        let mut ids = sources.clone();
        ids.push(merged.id);
        let event = TraceEvent::now(step, "merge")
            .with_ids(&ids)
            .with_decision("applied")
            .with_reason(&reason)
            .with_coverage(gate.flow_coverage, gate.step_coverage);
        self.trace(event);

        tracing::info!(merged_id = merged.id, sources = ?sources, steps = merged.steps.len(), "test cases merged");
        self.merged.push(MergedCase {
            merged_id: merged.id,
            source_ids: sources,
            step_count: merged.steps.len(),
            reason,
        });
        self.merged_cases.push(merged);
    }

    fn multi_merge(&mut self) -> Result<()> {
        let engine = self.engine;
        let roles = engine.merger.roles.classify_suite(&self.working);
        let groups = engine.merger.websites.group_by_role_and_website(&self.working, &roles);

        for ((role, website), ids) in groups {
            if ids.len() < 2 {
                continue;
            }
            let members = TestSuite::from_cases(
                ids.iter()
                    .filter_map(|id| self.working.get(*id).cloned())
                    .collect(),
            );
            let mergeable = find_mergeable_groups(
                &members,
                engine.config.multi_merge_min_prefix,
                engine.config.multi_merge_min_group,
                engine.config.flexible_login,
            );

            for group in mergeable {
                let sources: Vec<TestCase> = group
                    .test_case_ids
                    .iter()
                    .filter_map(|id| self.working.get(*id).cloned())
                    .collect();
                if sources.len() < 2 {
                    continue;
                }
                let source_ids: Vec<TestCaseId> = sources.iter().map(|tc| tc.id).collect();
                let refs: Vec<&TestCase> = sources.iter().collect();

                if let Some(locked) = source_ids.iter().find(|id| self.locked.contains(*id)) {
                    let reason = Reason::new(ReasonKind::LockedByAdvisor, format!("Test case {} is locked by advisor", locked));
                    self.skip(source_ids, "multi_merge", reason, None);
                    continue;
                }

                let safety = engine.merger.merge_safety(&refs);
                if let Some(veto) = &safety.veto {
                    let reason = Self::veto_reason(veto);
                    self.skip(source_ids, "multi_merge", reason, None);
                    continue;
                }

                let tangled = refs
                    .iter()
                    .find(|tc| step_dependency_issues(&tc.ordered_steps()).len() > MAX_DEPENDENCY_ISSUES);
                if let Some(tc) = tangled {
                    let reason = Reason::new(
                        ReasonKind::MergeValidationFailed,
                        format!("Test case {} has too many step dependency issues", tc.id),
                    );
                    self.skip(source_ids, "multi_merge", reason, None);
                    continue;
                }

                let merged_id = engine.merger.merged_id(&source_ids, &self.taken_ids);
                let merged = engine.merger.merge_many(&refs, merged_id, engine.config.flexible_login)?;
                if let Some(reason) = self.merge_validation_failure(&merged, &refs) {
                    self.skip(source_ids, "multi_merge", reason, None);
                    continue;
                }

                let mut tentative = self.working.without(&source_ids);
                tentative.insert(merged.clone());
                let threshold = engine.config.multi_merge_step_threshold(source_ids.len());
                let gate = engine.check_coverage(self.baseline, &tentative, threshold);

                if let Some(reason) = gate.rejection.clone() {
                    self.skip(source_ids, "multi_merge", reason, None);
                    continue;
                }

                let reason = Reason::new(
                    ReasonKind::MultiMerge,
                    format!(
                        "Consolidated {} {} test cases on {} sharing a {}-step prefix",
                        source_ids.len(),
                        role,
                        website,
                        group.prefix_length
                    ),
                );
                self.commit_merge(merged, source_ids, tentative, reason, &gate);
            }
        }
        Ok(())
    }

    fn apply_candidate(&mut self, candidate: &Candidate) -> Result<()> {
        let engine = self.engine;
        let id = candidate.test_case_id;

        if !self.states.contains_key(&id) {
            return Err(OptimizerError::unknown(id, "optimization candidate"));
        }
        if !self.working.contains(id) {
            let reason = Reason::new(ReasonKind::AlreadyResolved, format!("Test case {} already removed or merged", id));
            self.skip(vec![id], "candidate", reason, Some(candidate.similarity));
            return Ok(());
        }
        if self.locked.contains(&id) {
            let reason = Reason::new(ReasonKind::LockedByAdvisor, format!("Test case {} is locked by advisor", id));
            self.skip(vec![id], "candidate", reason, Some(candidate.similarity));
            return Ok(());
        }

        let keep = candidate.keep_id.filter(|k| self.working.contains(*k));

        if let (CandidateAction::Merge, Some(keep_id)) = (candidate.action, keep) {
            if self.locked.contains(&keep_id) {
                let reason = Reason::new(ReasonKind::LockedByAdvisor, format!("Test case {} is locked by advisor", keep_id));
                self.skip(vec![keep_id, id], "merge", reason, Some(candidate.similarity));
                return Ok(());
            }

            let (Some(keep_tc), Some(remove_tc)) = (self.working.get(keep_id), self.working.get(id)) else {
                return Ok(());
            };

            let safety = engine.merger.merge_safety(&[keep_tc, remove_tc]);
            if let Some(veto) = &safety.veto {
                let reason = Self::veto_reason(veto);
                self.skip(vec![keep_id, id], "merge", reason, Some(candidate.similarity));
                return Ok(());
            }

            let merged_id = engine.merger.merged_id(&[keep_id, id], &self.taken_ids);
            let merged = engine.merger.merge_pair(keep_tc, remove_tc, merged_id);
            if let Some(reason) = self.merge_validation_failure(&merged, &[keep_tc, remove_tc]) {
                self.skip(vec![keep_id, id], "merge", reason, Some(candidate.similarity));
                return Ok(());
            }

            let mut tentative = self.working.without(&[keep_id, id]);
            tentative.insert(merged.clone());
            let gate = engine.check_coverage(self.baseline, &tentative, engine.config.min_step_coverage);

            if let Some(reason) = gate.rejection.clone() {
                self.skip(vec![keep_id, id], "merge", reason, Some(candidate.similarity));
                return Ok(());
            }

            let reason = Reason::new(
                ReasonKind::MergedUniqueSteps,
                format!(
                    "{} ({:.1}% similar) merged with {}; both carry unique steps",
                    id,
                    candidate.similarity * 100.0,
                    keep_id
                ),
            );
            self.commit_merge(merged, vec![keep_id, id], tentative, reason, &gate);
            return Ok(());
        }

        let tentative = self.working.without(&[id]);
        let gate = engine.check_coverage(self.baseline, &tentative, engine.config.min_step_coverage);
        if let Some(reason) = gate.rejection.clone() {
            self.skip(vec![id], "remove", reason, Some(candidate.similarity));
            return Ok(());
        }

        let detail = match keep {
            Some(k) => format!("{:.1}% similar to {}", candidate.similarity * 100.0, k),
            None => format!("{:.1}% similar to a merged test case", candidate.similarity * 100.0),
        };
        self.commit_removal(id, keep, Some(candidate.similarity), Reason::new(candidate.kind, detail), Some(&gate));
        Ok(())
    }

    /// Drop every non-representative of an exact group on the original
    /// input, unless the gate or a veto already kept it.
    fn resolve_exact_duplicates(&mut self) {
        let engine = self.engine;
        let matrix = SimilarityMatrix::build(&engine.similarity, self.original);
        let report = engine.detector.detect(self.original, &matrix, None);

        let mut resolved = 0;
        for group in report.exact() {
            if !self.working.contains(group.keep) {
                continue;
            }
            self.protected.insert(group.keep);
            for &id in &group.remove {
                if !self.working.contains(id) || self.exempt.contains(&id) || self.locked.contains(&id) {
                    continue;
                }
                let reason = Reason::new(
                    ReasonKind::ExactDuplicate,
                    format!("Exact duplicate of {}", group.keep),
                );
                self.commit_removal(id, Some(group.keep), Some(group.max_similarity), reason, None);
                resolved += 1;
            }
        }
        tracing::info!(resolved, "exact duplicates resolved");
    }

    fn apply_recommendations(&mut self, recs: &Recommendations) {
        let engine = self.engine;
        for (&id, rec) in recs {
            if rec.action != AdvisorAction::Remove {
                continue;
            }
            if !self.working.contains(id)
                || self.protected.contains(&id)
                || self.states.get(&id) != Some(&CaseState::Pending)
            {
                continue;
            }

            let tentative = self.working.without(&[id]);
            let gate = engine.check_coverage(self.baseline, &tentative, engine.config.min_step_coverage);
            if let Some(reason) = gate.rejection.clone() {
                self.skip(vec![id], "advisor_remove", reason, None);
                continue;
            }

            let reason = Reason::new(
                ReasonKind::AdvisorRemoval,
                format!("AI recommendation: {}", rec.justification),
            );
            self.commit_removal(id, None, None, reason, Some(&gate));
        }
    }

    fn finish(mut self, oracle_pairs: usize) -> OptimizationResult {
        for id in self.working.ids() {
            self.states.insert(*id, CaseState::Kept);
        }

        let engine = self.engine;
        let before = engine.snapshot(self.baseline, self.original);
        let after = engine.snapshot(self.baseline, &self.working);
        let coverage_loss = engine.tracker.coverage_loss(self.original, &self.working);

        let original_count = self.original.len();
        let optimized_count = self.working.len();
        let reduction_count = original_count.saturating_sub(optimized_count);
        let reduction_percentage = if original_count > 0 {
            reduction_count as f64 / original_count as f64 * 100.0
        } else {
            0.0
        };
        let time_saved_ms = self
            .original
            .total_duration()
            .saturating_sub(self.working.total_duration());

        tracing::info!(
            original = original_count,
            optimized = optimized_count,
            removed = self.removed.len(),
            merged = self.merged.len(),
            skipped = self.skipped.len(),
            flow_coverage = after.flow_coverage,
            step_coverage = after.step_coverage,
            "optimization complete"
        );
        engine.trace.log_summary(
            &RunSummary::now(self.step)
                .with_counts(original_count, optimized_count)
                .with_outcomes(self.removed.len(), self.merged.len(), self.skipped.len())
                .with_coverage(after.flow_coverage, after.step_coverage),
        );

        OptimizationResult {
            original_count,
            optimized_count,
            kept_ids: self.working.ids().to_vec(),
            removed: self.removed,
            merged: self.merged,
            merged_cases: self.merged_cases,
            skipped: self.skipped,
            states: self.states,
            before,
            after,
            coverage_loss,
            reduction_count,
            reduction_percentage,
            time_saved_ms,
            oracle_pairs,
        }
    }
}
