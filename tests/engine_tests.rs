use suite_optimizer::error::OptimizerError;
use suite_optimizer::flows::flow_model::FlowType;
use suite_optimizer::model::test_case::{TestCase, TestStep, TestSuite};
use suite_optimizer::optimization::engine::{EngineConfig, OptimizationEngine};
use suite_optimizer::optimization::result::{CaseState, OptimizationResult, ReasonKind};
use suite_optimizer::oracle::advisor::{AdvisorAction, Recommendation, Recommendations};
use suite_optimizer::trace::logger::TraceLogger;
use suite_optimizer::trace::trace::{RunSummary, TraceEvent};

use crate::common::{case, profile_case, shared_steps, step, suite};

mod common;

fn optimize(s: &TestSuite) -> OptimizationResult {
    OptimizationEngine::new(EngineConfig::default())
        .optimize(s, None, None)
        .unwrap()
}

fn copy_of(tc: &TestCase, id: i64) -> TestCase {
    let mut copy = tc.clone();
    copy.id = id;
    copy
}

/// Case 1 plus one extra step, so removing it loses a unique step.
fn superset_pair() -> TestSuite {
    let first = profile_case(1, "Profile save", "#save").with_priority(1);
    let mut second = copy_of(&first, 2);
    second.priority = None;
    second.steps.push(step(299, 6, "click", "#extra"));
    suite(vec![first, second])
}

fn assert_invariants(result: &OptimizationResult) {
    let removed = result.removed_ids();
    for skipped in &result.skipped {
        for id in &skipped.test_case_ids {
            assert!(!removed.contains(id), "skipped case {} was also removed", id);
        }
    }
    assert_eq!(result.reduction_count, result.original_count - result.optimized_count);
    assert_eq!(result.kept_ids.len(), result.optimized_count);
}

// ============================================================================
// Removal
// ============================================================================

#[test]
fn exact_duplicate_is_removed() {
    let first = profile_case(1, "Profile save", "#save");
    let s = suite(vec![first.clone(), copy_of(&first, 2)]);
    let result = optimize(&s);

    assert_eq!(result.removed_ids(), vec![2]);
    assert_eq!(result.removed[0].reason.kind, ReasonKind::ExactDuplicate);
    assert_eq!(result.removed[0].covered_by, Some(1));
    assert_eq!(result.kept_ids, vec![1]);
    assert_eq!(result.state_of(1), Some(CaseState::Kept));
    assert_eq!(result.state_of(2), Some(CaseState::Removed));
    assert!((result.reduction_percentage - 50.0).abs() < 1e-9);
    assert_eq!(result.coverage_loss.lost_step_count, 0);
    assert_invariants(&result);
}

#[test]
fn removing_sole_authentication_case_is_rejected() {
    let s = suite(vec![
        case(1, "Portal smoke", shared_steps(100)),
        case(2, "Login check", shared_steps(200)),
    ]);
    let result = optimize(&s);

    assert!(result.removed.is_empty());
    assert_eq!(result.kept_ids, vec![1, 2]);
    let skipped: Vec<_> = result.skipped_for(2).collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].reason.kind, ReasonKind::CriticalFlowLost);
    assert!(skipped[0].reason.detail.contains("authentication"));
    assert!(result.after.critical_flows_covered.contains(&FlowType::Authentication));
    assert_invariants(&result);
}

#[test]
fn step_coverage_threshold_blocks_lossy_removal() {
    let s = superset_pair();
    let result = optimize(&s);

    assert!(result.removed.is_empty());
    let skipped: Vec<_> = result.skipped_for(2).collect();
    assert_eq!(skipped[0].reason.kind, ReasonKind::StepCoverageDrop);
    assert!(skipped[0].reason.detail.contains("threshold: 95.0%"));
    assert!((result.after.step_coverage - 100.0).abs() < 1e-9);
    assert_invariants(&result);
}

#[test]
fn looser_step_threshold_allows_the_removal() {
    let s = superset_pair();
    let config = EngineConfig {
        min_step_coverage: 0.80,
        ..EngineConfig::default()
    };
    let result = OptimizationEngine::new(config).optimize(&s, None, None).unwrap();

    assert_eq!(result.removed_ids(), vec![2]);
    assert_eq!(result.removed[0].reason.kind, ReasonKind::HighlySimilar);
    assert_eq!(result.coverage_loss.lost_step_count, 1);
    assert!(result.after.step_coverage >= 80.0);
    assert_invariants(&result);
}

// ============================================================================
// Merging
// ============================================================================

#[test]
fn cases_with_unique_steps_on_both_sides_are_merged() {
    let s = suite(vec![
        profile_case(1, "Profile save", "#save"),
        profile_case(2, "Profile archive", "#archive"),
    ]);
    let result = optimize(&s);

    assert_eq!(result.merged.len(), 1);
    let merged = &result.merged[0];
    assert_eq!(merged.source_ids, vec![1, 2]);
    assert_eq!(merged.step_count, 6);
    assert_eq!(merged.reason.kind, ReasonKind::MergedUniqueSteps);
    assert_eq!(result.state_of(1), Some(CaseState::MergedAway));
    assert_eq!(result.state_of(2), Some(CaseState::MergedAway));

    let optimized = result.optimized_suite(&s);
    assert_eq!(optimized.len(), 1);
    assert_eq!(optimized.ids(), &[merged.merged_id]);
    assert_eq!(result.coverage_loss.lost_step_count, 0);
    assert_eq!(result.lineage().get(&merged.merged_id), Some(&vec![1, 2]));
    assert_invariants(&result);
}

#[test]
fn merge_that_fails_validation_is_skipped() {
    let with_blank_navigation = |mut tc: TestCase| {
        let id = tc.id * 100 + 5;
        tc.steps.push(TestStep::new(id, 6, "navigateTo", "Open the page"));
        tc
    };
    let s = suite(vec![
        with_blank_navigation(profile_case(1, "Profile save", "#save")),
        with_blank_navigation(profile_case(2, "Profile archive", "#archive")),
    ]);
    let result = optimize(&s);

    assert!(result.merged.is_empty());
    assert_eq!(result.optimized_count, 2);
    let skipped = result
        .skipped
        .iter()
        .find(|c| c.reason.kind == ReasonKind::MergeValidationFailed)
        .expect("validation skip");
    assert_eq!(skipped.test_case_ids.len(), 2);
    assert!(skipped.reason.detail.contains("Step 6 (navigateTo) has no URL"));
    assert_eq!(result.state_of(1), Some(CaseState::Kept));
    assert_invariants(&result);
}

#[test]
fn multi_merge_consolidates_a_shared_prefix_group() {
    let s = suite(vec![
        profile_case(1, "Profile save", "#save"),
        profile_case(2, "Profile archive", "#archive"),
        profile_case(3, "Profile export", "#export"),
    ]);
    let config = EngineConfig {
        multi_merge: true,
        ..EngineConfig::default()
    };
    let result = OptimizationEngine::new(config).optimize(&s, None, None).unwrap();

    assert_eq!(result.merged.len(), 1);
    assert_eq!(result.merged[0].reason.kind, ReasonKind::MultiMerge);
    assert_eq!(result.merged[0].source_ids, vec![1, 2, 3]);
    assert_eq!(result.merged[0].step_count, 7);
    assert_eq!(result.optimized_count, 1);
    assert_invariants(&result);
}

#[test]
fn multi_merge_threshold_is_never_looser_than_configured() {
    let config = EngineConfig {
        min_step_coverage: 0.99,
        ..EngineConfig::default()
    };
    assert!((config.multi_merge_step_threshold(3) - 0.99).abs() < 1e-9);
    assert!((EngineConfig::default().multi_merge_step_threshold(3) - 0.97).abs() < 1e-9);
    assert!((EngineConfig::default().multi_merge_step_threshold(12) - 0.95).abs() < 1e-9);
    assert!((EngineConfig::default().multi_merge_step_threshold(9) - 0.97).abs() < 1e-9);
    assert!((EngineConfig::default().multi_merge_step_threshold(10) - 0.95).abs() < 1e-9);
}

// ============================================================================
// Advisor recommendations
// ============================================================================

fn recs(entries: &[(i64, AdvisorAction)]) -> Recommendations {
    entries
        .iter()
        .map(|(id, action)| (*id, Recommendation::new(*action, "reviewed")))
        .collect()
}

#[test]
fn unknown_recommendation_id_is_an_error() {
    let s = suite(vec![profile_case(1, "Profile save", "#save")]);
    let engine = OptimizationEngine::new(EngineConfig::default());

    let err = engine
        .optimize(&s, Some(&recs(&[(99, AdvisorAction::Remove)])), None)
        .unwrap_err();
    assert!(matches!(err, OptimizerError::UnknownTestCase { id: 99, .. }));
}

#[test]
fn advisor_keep_locks_the_case() {
    let first = profile_case(1, "Profile save", "#save");
    let s = suite(vec![first.clone(), copy_of(&first, 2)]);
    let engine = OptimizationEngine::new(EngineConfig::default());

    let result = engine
        .optimize(&s, Some(&recs(&[(2, AdvisorAction::Keep)])), None)
        .unwrap();

    assert!(result.removed.is_empty());
    assert_eq!(result.kept_ids, vec![1, 2]);
    let skipped: Vec<_> = result.skipped_for(2).collect();
    assert_eq!(skipped[0].reason.kind, ReasonKind::LockedByAdvisor);
    assert_invariants(&result);
}

#[test]
fn advisor_removal_still_passes_the_gate() {
    let s = suite(vec![
        profile_case(1, "Profile save", "#save"),
        case(3, "Search results", vec![step(300, 1, "verifyText", "#results")]),
    ]);
    let engine = OptimizationEngine::new(EngineConfig::default());

    let result = engine
        .optimize(&s, Some(&recs(&[(3, AdvisorAction::Remove)])), None)
        .unwrap();

    assert!(result.removed.is_empty());
    let skipped: Vec<_> = result.skipped_for(3).collect();
    assert_eq!(skipped[0].attempted, "advisor_remove");
    assert_eq!(skipped[0].reason.kind, ReasonKind::FlowCoverageDrop);
    assert_invariants(&result);
}

// ============================================================================
// Bookkeeping
// ============================================================================

#[test]
fn empty_suite_optimizes_to_nothing() {
    let result = optimize(&TestSuite::new());
    assert_eq!(result.original_count, 0);
    assert_eq!(result.optimized_count, 0);
    assert_eq!(result.reduction_percentage, 0.0);
    assert!((result.after.flow_coverage - 100.0).abs() < 1e-9);
}

#[test]
fn time_saved_is_the_removed_duration() {
    let first = profile_case(1, "Profile save", "#save").with_duration(30_000);
    let s = suite(vec![first.clone(), copy_of(&first, 2)]);
    let result = optimize(&s);
    assert_eq!(result.time_saved_ms, 30_000);
}

#[test]
fn decisions_are_traced_as_jsonl() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.jsonl");

    let first = profile_case(1, "Profile save", "#save");
    let s = suite(vec![first.clone(), copy_of(&first, 2)]);
    let engine = OptimizationEngine::new(EngineConfig::default()).with_trace(TraceLogger::new(&path));
    engine.optimize(&s, None, None).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let events: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["stage"], "remove");
    assert_eq!(events[0]["decision"], "applied");
    assert_eq!(events[0]["step"], 1);

    let summary = &events[1];
    assert_eq!(summary["stage"], "run_summary");
    assert_eq!(summary["decisions"], 1);
    assert_eq!(summary["original_count"], 2);
    assert_eq!(summary["optimized_count"], 1);
    assert_eq!(summary["removed"], 1);
    assert_eq!(summary["step_coverage"], 100.0);
}

#[test]
fn trace_logger_counts_records_and_tolerates_bad_paths() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.jsonl");
    let logger = TraceLogger::new(&path);
    assert_eq!(logger.path(), Some(path.as_path()));

    logger.log(&TraceEvent::now(1, "merge").with_ids(&[1, 2]).with_decision("skipped"));
    logger.log_summary(&RunSummary::now(1).with_counts(2, 2));
    assert_eq!(logger.written(), 2);
    assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);

    let missing = TraceLogger::new(&dir.path().join("absent").join("run.jsonl"));
    assert!(!missing.is_enabled());
    missing.log(&TraceEvent::now(1, "remove"));
    assert_eq!(missing.written(), 0);
}
