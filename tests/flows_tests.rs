use std::collections::{BTreeMap, BTreeSet};

use suite_optimizer::analysis::role::RoleLabel;
use suite_optimizer::analysis::website::{UNKNOWN_WEBSITE, WebsiteGrouper};
use suite_optimizer::flows::classifier::FlowClassifier;
use suite_optimizer::flows::coverage::{CoverageAnalyzer, CoverageGap};
use suite_optimizer::flows::flow_analyzer::FlowAnalyzer;
use suite_optimizer::flows::flow_model::{FlowCategory, FlowType};
use suite_optimizer::flows::graph::FlowGraph;
use suite_optimizer::model::normalize::step_signature;
use suite_optimizer::model::test_case::{TestCase, TestStep};
use suite_optimizer::optimization::step_coverage::StepCoverageTracker;

use crate::common::{case, login_case, nav, profile_case, step, suite};

mod common;

fn browse_case(id: i64) -> TestCase {
    case(
        id,
        "Browse catalog",
        vec![
            nav(id * 100, 1, "https://a.example.com/home"),
            nav(id * 100 + 1, 2, "https://a.example.com/cart?x=1"),
        ],
    )
}

fn flows(list: &[FlowType]) -> BTreeSet<FlowType> {
    list.iter().copied().collect()
}

// ============================================================================
// Flow identification
// ============================================================================

#[test]
fn flows_come_from_names_and_steps() {
    let analyzer = FlowAnalyzer::default();

    assert_eq!(analyzer.identify_flows(&login_case(1)), flows(&[FlowType::Authentication]));
    assert_eq!(analyzer.identify_flows(&TestCase::new(2, "misc")), flows(&[FlowType::General]));
    assert_eq!(analyzer.identify_flows(&browse_case(3)), flows(&[FlowType::Navigation]));

    let save = TestStep::new(40, 1, "click", "Save").with_description("Save the form");
    assert_eq!(
        analyzer.identify_flows(&case(4, "Profile", vec![save])),
        flows(&[FlowType::Form])
    );
}

#[test]
fn transitions_follow_consecutive_navigations() {
    let transitions = FlowAnalyzer::default().page_transitions(&browse_case(1));
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].from, "https://a.example.com/home");
    assert_eq!(transitions[0].to, "https://a.example.com/cart?x=1");
    assert_eq!(transitions[0].step_position, 2);
}

#[test]
fn critical_paths_rank_by_frequency_and_priority() {
    let s = suite(vec![
        login_case(1).with_priority(1),
        login_case(2),
        TestCase::new(3, "misc"),
    ]);
    let paths = FlowAnalyzer::default().critical_paths(&s);

    assert_eq!(paths.len(), 2);
    assert_eq!(paths[0].flow_type, FlowType::Authentication);
    assert_eq!(paths[0].frequency, 2);
    assert!((paths[0].average_priority - 3.0).abs() < 1e-9);
    assert!((paths[0].criticality_score - 2.5).abs() < 1e-9);
    assert_eq!(paths[1].flow_type, FlowType::General);

    let common = FlowAnalyzer::default().common_flows(&s);
    assert_eq!(common["authentication"], vec![1, 2]);
    assert_eq!(common["general"], vec![3]);
}

// ============================================================================
// Classification
// ============================================================================

#[test]
fn primary_flow_has_the_most_keyword_hits() {
    let classifier = FlowClassifier::default();
    let c = classifier.classify(&TestCase::new(1, "Search and filter users after login"));

    assert_eq!(c.primary_flow, FlowType::Search);
    assert_eq!(c.primary_category, FlowCategory::SearchFilter);
    assert_eq!(c.secondary_flows, vec![FlowType::Authentication]);
    assert!(c.is_multi_flow());
}

#[test]
fn primary_flow_ties_go_to_the_earlier_flow() {
    let c = FlowClassifier::default().classify(&TestCase::new(1, "login search"));
    assert_eq!(c.primary_flow, FlowType::Authentication);
    assert_eq!(c.primary_category, FlowCategory::Authentication);
}

#[test]
fn suite_classification_groups_by_category() {
    let s = suite(vec![
        login_case(1),
        browse_case(2),
        TestCase::new(3, "Search and filter users after login"),
    ]);
    let summary = FlowClassifier::default().classify_suite(&s);

    assert_eq!(summary.multi_flow_count, 1);
    assert_eq!(summary.category_groups[&FlowCategory::Authentication], vec![1]);
    assert_eq!(summary.category_groups[&FlowCategory::Navigation], vec![2]);
    assert_eq!(summary.category_groups[&FlowCategory::SearchFilter], vec![3]);
}

// ============================================================================
// Coverage
// ============================================================================

#[test]
fn relative_coverage_is_measured_against_the_baseline() {
    let coverage = CoverageAnalyzer::default();
    let baseline = flows(&[FlowType::Authentication, FlowType::Navigation]);
    let s = suite(vec![browse_case(1)]);

    let relative = coverage.flow_coverage_against(&baseline, &s);
    assert!((relative.coverage_percentage - 50.0).abs() < 1e-9);
    assert_eq!(relative.uncovered_flows, flows(&[FlowType::Authentication]));

    let empty = coverage.flow_coverage_against(&BTreeSet::new(), &s);
    assert!((empty.coverage_percentage - 100.0).abs() < 1e-9);
}

#[test]
fn critical_flow_coverage_lists_covering_cases() {
    let s = suite(vec![login_case(1), browse_case(2)]);
    let critical = CoverageAnalyzer::default().critical_flow_coverage(&s);

    assert!(!critical.all_critical_covered);
    assert_eq!(critical.coverage[&FlowType::Authentication].test_case_ids, vec![1]);
    assert!(!critical.coverage[&FlowType::Crud].covered);
    assert_eq!(critical.covered(), flows(&[FlowType::Authentication, FlowType::Navigation]));
}

#[test]
fn coverage_matrix_marks_each_case() {
    let s = suite(vec![login_case(1), TestCase::new(3, "misc")]);
    let matrix = CoverageAnalyzer::default().coverage_matrix(&s);

    assert_eq!(matrix.flows, vec![FlowType::Authentication, FlowType::General]);
    assert!(matrix.rows[&1][&FlowType::Authentication]);
    assert!(!matrix.rows[&3][&FlowType::Authentication]);
}

#[test]
fn page_graph_gaps_and_missing_critical_flows() {
    let lonely = case(2, "Lonely page", vec![nav(200, 1, "https://a.example.com/lonely")]);
    let s = suite(vec![browse_case(1), lonely]);

    let graph = FlowGraph::build(&FlowAnalyzer::default(), &s);
    assert_eq!(graph.isolated_pages(), vec!["https://a.example.com/lonely".to_string()]);
    assert_eq!(graph.dead_ends(), vec!["https://a.example.com/cart".to_string()]);

    let gaps = CoverageAnalyzer::default().coverage_gaps(&s);
    assert_eq!(gaps.len(), 4);
    assert!(matches!(gaps[0], CoverageGap::IsolatedPages { .. }));
    assert!(matches!(gaps[1], CoverageGap::DeadEnds { .. }));
    assert!(matches!(
        gaps[2],
        CoverageGap::MissingCriticalFlow { flow: FlowType::Authentication, .. }
    ));
    assert!(matches!(gaps[3], CoverageGap::MissingCriticalFlow { flow: FlowType::Crud, .. }));
}

#[test]
fn per_case_coverage_score() {
    let coverage = CoverageAnalyzer::default();
    assert!((coverage.test_case_coverage_score(&TestCase::new(1, "misc")) - 0.08).abs() < 1e-9);
    assert!((coverage.test_case_coverage_score(&browse_case(2)) - 0.13).abs() < 1e-9);

    let report = coverage.coverage_report(&suite(vec![browse_case(2)]));
    assert_eq!(report.test_case_scores.len(), 1);
    assert!((report.flow_coverage.coverage_percentage - 100.0).abs() < 1e-9);
}

// ============================================================================
// Website grouping
// ============================================================================

#[test]
fn website_comes_from_the_second_level_label() {
    let grouper = WebsiteGrouper::default();
    assert_eq!(grouper.normalize_website("https://www.amazon.com/gp"), "amazon");
    assert_eq!(
        grouper.normalize_website("https://opensource-demo.orangehrmlive.com/web"),
        "orangehrmlive"
    );
    assert_eq!(grouper.normalize_website("https://login.salesforce.com"), "salesforce");
    assert_eq!(grouper.normalize_website("not a url"), UNKNOWN_WEBSITE);
}

#[test]
fn website_falls_back_to_name_patterns() {
    let grouper = WebsiteGrouper::default();
    let amazon = case(1, "Buy", vec![nav(100, 1, "https://www.amazon.com/")]);
    let hrm = TestCase::new(2, "OrangeHRM leave request");
    let other = TestCase::new(3, "misc");

    assert_eq!(grouper.extract_website(&amazon), "amazon");
    assert_eq!(grouper.extract_website(&hrm), "orangehrmlive");
    assert_eq!(grouper.extract_website(&other), UNKNOWN_WEBSITE);

    let s = suite(vec![amazon, hrm, other]);
    let groups = grouper.group_by_website(&s);
    assert_eq!(groups.len(), 3);
    assert_eq!(groups["amazon"], vec![1]);

    let by_role = grouper.group_by_role_and_website(&s, &BTreeMap::new());
    assert_eq!(by_role[&(RoleLabel::Unknown, "amazon".to_string())], vec![1]);
}

// ============================================================================
// Step coverage tracking
// ============================================================================

#[test]
fn coverage_loss_names_the_cases_that_covered_a_step() {
    let tracker = StepCoverageTracker;
    let original = suite(vec![
        profile_case(1, "Profile save", "#save"),
        profile_case(2, "Profile archive", "#archive"),
    ]);
    let optimized = suite(vec![profile_case(1, "Profile save", "#save")]);

    let map = tracker.coverage_map(&original);
    assert_eq!(map.len(), 6);
    assert_eq!(map[&step_signature(&step(0, 1, "click", "#menu"))], vec![1, 2]);
    assert_eq!(tracker.steps_covered_by(original.get(1).unwrap()).len(), 5);

    let loss = tracker.coverage_loss(&original, &optimized);
    assert_eq!(loss.lost_step_count, 1);
    assert_eq!(loss.lost_steps[0].was_covered_by, vec![2]);
    assert!(!loss.coverage_maintained);
    assert!((loss.coverage_percentage_after - 500.0 / 6.0).abs() < 1e-9);

    let baseline = tracker.signatures(&original);
    assert!((tracker.coverage_against(&baseline, &optimized) - 500.0 / 6.0).abs() < 1e-9);
}

#[test]
fn maintained_coverage_respects_the_threshold() {
    let tracker = StepCoverageTracker;
    let original = suite(vec![
        profile_case(1, "Profile save", "#save"),
        profile_case(2, "Profile archive", "#archive"),
    ]);
    let optimized = suite(vec![profile_case(1, "Profile save", "#save")]);

    assert!(tracker.validate_maintained(&original, &optimized, 0.8).is_maintained);

    let check = tracker.validate_maintained(&original, &optimized, 0.9);
    assert!(!check.is_maintained);
    assert_eq!(check.lost_steps, 1);
    assert_eq!(check.message, "Coverage dropped: 83.3% (threshold: 90.0%)");
}
