use suite_optimizer::error::OptimizerError;
use suite_optimizer::flows::flow_model::FlowType;
use suite_optimizer::model::test_case::TestCase;
use suite_optimizer::optimization::validator::{CoverageValidator, MergeLineage, ValidationConfig};

use crate::common::{case, login_case, nav, profile_case, step, suite};

mod common;

fn checkout_sequence(id: i64) -> TestCase {
    let base = id * 100;
    case(
        id,
        "Checkout",
        vec![
            step(base, 1, "click", "#cart"),
            step(base + 1, 2, "enter", "#coupon"),
            step(base + 2, 3, "click", "#apply"),
            step(base + 3, 4, "verify", "#total"),
        ],
    )
}

// ============================================================================
// Whole-suite validation
// ============================================================================

#[test]
fn unchanged_suite_is_valid() {
    let s = suite(vec![login_case(1), profile_case(2, "Profile save", "#save")]);
    let result = CoverageValidator::default().validate(&s, &s);

    assert!(result.overall_valid, "errors: {:?}", result.errors);
    assert!(result.errors.is_empty());
    assert!(result.warnings.is_empty());
    assert!((result.step_coverage.coverage_percentage - 100.0).abs() < 1e-9);
    assert!((result.flow_coverage.coverage_percentage - 100.0).abs() < 1e-9);
}

#[test]
fn dropping_the_only_login_case_loses_a_critical_flow() {
    let original = suite(vec![login_case(1), profile_case(2, "Profile save", "#save")]);
    let optimized = suite(vec![profile_case(2, "Profile save", "#save")]);
    let result = CoverageValidator::default().validate(&original, &optimized);

    assert!(!result.overall_valid);
    assert!(result.flow_coverage.lost_critical_flows.contains(&FlowType::Authentication));
    assert!(result.errors.iter().any(|e| e.starts_with("Lost critical flows")));
}

#[test]
fn element_loss_is_only_a_warning() {
    let original = suite(vec![
        profile_case(1, "Profile save", "#save"),
        profile_case(2, "Profile archive", "#archive"),
    ]);
    let optimized = suite(vec![profile_case(1, "Profile save", "#save")]);
    let validator = CoverageValidator::new(ValidationConfig {
        min_step_coverage: 0.5,
        ..ValidationConfig::default()
    });

    let result = validator.validate(&original, &optimized);
    assert!(!result.element_coverage.passed);
    assert_eq!(result.element_coverage.lost_elements, vec!["#archive".to_string()]);
    assert!(result.warnings.iter().any(|w| w.starts_with("Element coverage")));
    assert!(result.overall_valid, "errors: {:?}", result.errors);
}

// ============================================================================
// Individual checks
// ============================================================================

#[test]
fn losing_the_error_scenario_fails_scenario_coverage() {
    let original = suite(vec![
        case(1, "Checkout fails with error", vec![step(100, 1, "click", "#pay")]),
        profile_case(2, "Profile save", "#save"),
    ]);
    let optimized = suite(vec![profile_case(2, "Profile save", "#save")]);
    let validator = CoverageValidator::default();

    let scenarios = validator.validate_scenario_coverage(&original, &optimized);
    assert!(!scenarios.passed);
    assert!(scenarios.lost_critical_scenarios.contains("error_scenario"));
    assert!(validator.scenarios_of(&profile_case(3, "Profile save", "#save")).contains("happy_path"));
}

#[test]
fn interrupted_sequence_is_broken_and_missing_sequence_is_lost() {
    let original = suite(vec![checkout_sequence(1)]);
    let validator = CoverageValidator::default();

    let mut interrupted = checkout_sequence(2);
    interrupted.steps.insert(3, step(299, 4, "scroll", "#footer"));
    interrupted.renumber_steps();
    let broken = validator.validate_sequence_preservation(&original, &suite(vec![interrupted]));
    assert_eq!(broken.patterns_checked, 1);
    assert_eq!(broken.broken.len(), 1);
    assert!(broken.lost.is_empty());
    assert_eq!(broken.broken[0].original_test_cases, vec![1]);

    let shortened = case(3, "Checkout", vec![step(300, 1, "click", "#cart")]);
    let lost = validator.validate_sequence_preservation(&original, &suite(vec![shortened]));
    assert_eq!(lost.lost.len(), 1);
    assert!(lost.broken.is_empty());
    assert!(!lost.passed);

    let kept = validator.validate_sequence_preservation(&original, &original);
    assert!(kept.passed);
}

#[test]
fn dependent_without_its_prerequisite_is_broken() {
    let prerequisite = profile_case(1, "Profile save", "#save");
    let dependent = profile_case(2, "Profile archive", "#archive").with_prerequisite(1);
    let original = suite(vec![prerequisite.clone(), dependent.clone()]);
    let validator = CoverageValidator::default();

    let only_dependent = suite(vec![dependent.clone()]);
    let result = validator.validate_dependency_preservation(&original, &only_dependent, &MergeLineage::new());
    assert_eq!(result.explicit_edges, 1);
    assert_eq!(result.broken_explicit.len(), 1);
    assert_eq!((result.broken_explicit[0].dependent, result.broken_explicit[0].prerequisite), (2, 1));

    let only_prerequisite = suite(vec![prerequisite]);
    let result = validator.validate_dependency_preservation(&original, &only_prerequisite, &MergeLineage::new());
    assert!(result.passed);
}

#[test]
fn lineage_resolves_a_merged_prerequisite() {
    let dependent = profile_case(2, "Profile archive", "#archive").with_prerequisite(1);
    let original = suite(vec![profile_case(1, "Profile save", "#save"), dependent.clone()]);
    let merged = profile_case(10_001, "Merged: Profile save + Profile export", "#save");
    let optimized = suite(vec![merged, dependent]);

    let lineage: MergeLineage = [(10_001, vec![1, 3])].into_iter().collect();
    let result = CoverageValidator::default().validate_dependency_preservation(&original, &optimized, &lineage);
    assert!(result.passed);
    assert!(result.broken_explicit.is_empty());
}

#[test]
fn removing_the_creator_of_a_used_entity_breaks_an_implicit_dependency() {
    let creator = case(1, "Create user account", vec![step(100, 1, "click", "#signup")]);
    let user = case(2, "Login as user and edit profile", vec![step(200, 1, "click", "#edit")]);
    let original = suite(vec![creator, user.clone()]);
    let optimized = suite(vec![user]);

    let result = CoverageValidator::default().validate_dependency_preservation(&original, &optimized, &MergeLineage::new());
    assert_eq!(result.entities_checked, 1);
    assert_eq!(result.broken_implicit.len(), 1);
    assert_eq!(result.broken_implicit[0].entity, "user");
    assert_eq!(result.broken_implicit[0].remaining_users, vec![2]);
}

#[test]
fn negative_context_must_survive() {
    let original = suite(vec![
        case(1, "Login with wrong password", vec![step(100, 1, "click", "#login")]),
        profile_case(2, "Profile save", "#save"),
    ]);
    let optimized = suite(vec![profile_case(2, "Profile save", "#save")]);
    let validator = CoverageValidator::default();

    let result = validator.validate_scenario_context(&original, &optimized);
    assert!(!result.passed);
    assert!(result.lost_contexts.contains("invalid_password"));

    let full = validator.validate(&original, &optimized);
    assert!(full.errors.iter().any(|e| e.contains("invalid_password")));
}

#[test]
fn dropping_the_only_login_to_search_transition_fails_validation() {
    let direct = case(
        1,
        "Search catalog",
        vec![
            nav(100, 1, "https://shop.example.com/login"),
            nav(101, 2, "https://shop.example.com/search"),
        ],
    );
    let detour = case(
        2,
        "Search catalog",
        vec![
            nav(200, 1, "https://shop.example.com/login"),
            nav(201, 2, "https://shop.example.com/home"),
            nav(202, 3, "https://shop.example.com/search"),
        ],
    );
    let original = suite(vec![direct, detour.clone()]);
    let optimized = suite(vec![detour]);

    let validator = CoverageValidator::default();
    let transitions = validator.validate_transition_preservation(&original, &optimized);
    assert!(!transitions.passed);
    assert_eq!(transitions.original_transitions, 3);
    assert_eq!(transitions.optimized_transitions, 2);
    assert_eq!(
        transitions.lost_transitions,
        vec![(
            "https://shop.example.com/login".to_string(),
            "https://shop.example.com/search".to_string()
        )]
    );
    assert!(transitions.lost_chains.is_empty());

    let result = validator.validate(&original, &optimized);
    assert!((result.step_coverage.coverage_percentage - 100.0).abs() < 1e-9);
    assert!(!result.overall_valid);
    assert!(result.errors.iter().any(|e| e == "Lost page transitions: 1 transitions, 0 chains"));
}

#[test]
fn lost_data_combination_is_reported() {
    let mut with_data = profile_case(1, "Profile save", "#save");
    with_data.steps[1].test_data = Some("Jane".to_string());
    with_data.steps[2].test_data = Some("invalid@".to_string());
    let original = suite(vec![with_data]);
    let optimized = suite(vec![profile_case(2, "Profile save", "#save")]);

    let result = CoverageValidator::default().validate_data_combinations(&original, &optimized);
    assert_eq!(result.original_combinations, 1);
    assert_eq!(result.lost_combinations.len(), 1);
    assert_eq!(result.lost_edge_values, vec!["invalid@".to_string()]);
}

// ============================================================================
// Single-case removal
// ============================================================================

#[test]
fn removal_check_blocks_the_only_login_case() {
    let s = suite(vec![login_case(1), profile_case(2, "Profile save", "#save")]);
    let check = CoverageValidator::default().validate_test_case_removal(&s, 1).unwrap();

    assert!(!check.can_remove);
    assert_eq!(check.critical_flows_lost, vec![FlowType::Authentication]);
    assert_eq!(check.reason, "Removal would impact coverage");
}

#[test]
fn removal_check_allows_a_redundant_copy() {
    let first = profile_case(1, "Profile save", "#save");
    let mut copy = first.clone();
    copy.id = 2;
    let s = suite(vec![first, copy]);

    let check = CoverageValidator::default().validate_test_case_removal(&s, 2).unwrap();
    assert!(check.can_remove);
    assert!((check.coverage_after - 100.0).abs() < 1e-9);
    assert_eq!(check.reason, "Can be safely removed");
}

#[test]
fn removal_check_of_unknown_id_is_an_error() {
    let s = suite(vec![login_case(1)]);
    let err = CoverageValidator::default().validate_test_case_removal(&s, 42).unwrap_err();
    assert!(matches!(err, OptimizerError::UnknownTestCase { id: 42, .. }));
}

// ============================================================================
// Report
// ============================================================================

#[test]
fn report_text_lists_status_and_errors() {
    let original = suite(vec![login_case(1), profile_case(2, "Profile save", "#save")]);
    let optimized = suite(vec![profile_case(2, "Profile save", "#save")]);
    let validator = CoverageValidator::default();
    let result = validator.validate(&original, &optimized);

    let text = validator.report_text(&result);
    assert!(text.contains("COMPREHENSIVE COVERAGE VALIDATION REPORT"));
    assert!(text.contains("Overall Validation: \u{2717} FAILED"));
    assert!(text.contains("Lost Critical Flows: authentication"));
    assert!(text.contains("Errors:"));
}
