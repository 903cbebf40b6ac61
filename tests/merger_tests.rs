use std::collections::HashSet;

use suite_optimizer::analysis::prefix::{
    common_prefix, common_suffix, find_flexible_merge_points, find_mergeable_groups, login_block_len,
};
use suite_optimizer::analysis::role::{RoleClassifier, RoleLabel};
use suite_optimizer::analysis::uniqueness::StepUniquenessAnalyzer;
use suite_optimizer::model::normalize::step_signature;
use suite_optimizer::model::test_case::{TestCase, TestStep};
use suite_optimizer::optimization::merge_validator::{
    MergedCaseValidator, step_dependency_issues, step_flow_issues,
};
use suite_optimizer::optimization::merger::{
    MERGED_ID_BASE, MergeVeto, TestCaseMerger, restore_missing_steps, tidy_steps,
};

use crate::common::{case, login_case, nav, profile_case, shared_steps, step, suite};

mod common;

fn positions(tc: &TestCase) -> Vec<u32> {
    tc.steps.iter().map(|s| s.position).collect()
}

fn signatures(tc: &TestCase) -> Vec<String> {
    tc.ordered_steps().into_iter().map(step_signature).collect()
}

// ============================================================================
// Uniqueness and merge decision
// ============================================================================

#[test]
fn one_divergent_step_on_each_side_warrants_a_merge() {
    let merger = TestCaseMerger::default();
    let a = profile_case(1, "Profile save", "#save");
    let b = profile_case(2, "Profile archive", "#archive");

    let pair = merger.uniqueness.unique_steps(&a, &b);
    assert_eq!(pair.exact_matches, 4);
    assert_eq!(pair.unique_in_first.exact.len(), 1);
    assert_eq!(pair.unique_in_second.exact.len(), 1);
    assert!(merger.should_merge(&a, &b));
}

#[test]
fn subset_case_is_removed_rather_than_merged() {
    let merger = TestCaseMerger::default();
    let full = profile_case(1, "Profile save", "#save");
    let subset = case(2, "Profile partial", shared_steps(200));

    assert!(!merger.should_merge(&full, &subset));
    assert!(!merger.should_merge(&full, &full.clone()));
}

#[test]
fn fuzzy_matching_absorbs_near_identical_steps() {
    let analyzer = StepUniquenessAnalyzer::default();
    let a = step(1, 1, "click", "#submit-button");
    let b = step(2, 1, "click", "#submit-buton");
    let c = step(3, 1, "enter", "#email");

    assert!(analyzer.step_similarity(&a, &b) >= 0.85);
    assert!(analyzer.step_similarity(&a, &c) < 0.85);
}

// ============================================================================
// Pairwise merge
// ============================================================================

#[test]
fn merging_four_shared_and_one_divergent_step_yields_six_steps() {
    let merger = TestCaseMerger::default();
    let a = profile_case(1, "Profile save", "#save");
    let b = profile_case(2, "Profile archive", "#archive");

    let merged = merger.merge_pair(&a, &b, 10_001);
    assert_eq!(merged.id, 10_001);
    assert_eq!(merged.steps.len(), 6);
    assert_eq!(positions(&merged), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(merged.name, "Merged: Profile save + Profile archive");
    assert_eq!(merged.description.as_deref(), Some("Merged from test cases: 1, 2"));

    let sigs = signatures(&merged);
    for tc in [&a, &b] {
        for sig in signatures(tc) {
            assert!(sigs.contains(&sig));
        }
    }
}

#[test]
fn merging_a_case_with_itself_is_idempotent() {
    let merger = TestCaseMerger::default();
    let a = profile_case(1, "Profile save", "#save");

    let merged = merger.merge_pair(&a, &a, 10_002);
    assert_eq!(signatures(&merged), signatures(&a));
    assert_eq!(positions(&merged), vec![1, 2, 3, 4, 5]);
}

#[test]
fn merged_metadata_combines_sources() {
    let merger = TestCaseMerger::default();
    let a = profile_case(1, "Profile save", "#save")
        .with_priority(3)
        .with_duration(20_000)
        .with_tags(&["smoke", "profile"]);
    let b = profile_case(2, "Profile archive", "#archive")
        .with_priority(1)
        .with_duration(30_000)
        .with_tags(&["profile", "regression"])
        .with_prerequisite(1);

    let merged = merger.merge_pair(&a, &b, 10_003);
    assert_eq!(merged.priority, Some(1));
    assert_eq!(merged.duration, Some(50_000));
    assert_eq!(merged.tags, vec!["profile", "regression", "smoke"]);
    assert_eq!(merged.prerequisite_case, None);
}

#[test]
fn merged_priority_ignores_unset_sources() {
    let merger = TestCaseMerger::default();
    let a = profile_case(1, "Profile save", "#save");
    let b = profile_case(2, "Profile archive", "#archive");

    assert_eq!(merger.merge_pair(&a, &b, 10_004).priority, None);

    let b = b.with_priority(4);
    assert_eq!(merger.merge_pair(&a, &b, 10_005).priority, Some(4));
}

#[test]
fn long_names_fall_back_to_ids() {
    let merger = TestCaseMerger::default();
    let long = "x".repeat(60);
    let a = profile_case(1, &long, "#save");
    let b = profile_case(2, &long, "#archive");

    let merged = merger.merge_pair(&a, &b, 10_004);
    assert_eq!(merged.name, "Merged Test Case 1 + 2");
}

// ============================================================================
// Merged ids
// ============================================================================

#[test]
fn merged_id_is_deterministic_and_in_range() {
    let merger = TestCaseMerger::default();
    let taken = HashSet::new();

    let id = merger.merged_id(&[1, 2], &taken);
    assert!((MERGED_ID_BASE..100_000).contains(&id));
    assert_eq!(id, merger.merged_id(&[2, 1], &taken));
    assert_ne!(id, merger.merged_id(&[1, 3], &taken));
}

#[test]
fn merged_id_hashes_sorted_id_strings_with_md5() {
    let merger = TestCaseMerger::default();
    let taken = HashSet::new();

    assert_eq!(merger.merged_id(&[1, 2], &taken), 96810);
    // "10" sorts before "9" as text
    assert_eq!(merger.merged_id(&[9, 10], &taken), 54419);
    assert_eq!(merger.merged_id(&[3, 1, 2], &taken), 56845);
}

#[test]
fn merged_id_skips_taken_ids() {
    let merger = TestCaseMerger::default();
    let free = merger.merged_id(&[5, 6], &HashSet::new());
    let taken: HashSet<i64> = [free].into_iter().collect();

    assert_eq!(merger.merged_id(&[5, 6], &taken), free + 1);
}

// ============================================================================
// Role and website safety
// ============================================================================

fn admin_case(id: i64) -> TestCase {
    case(
        id,
        "Admin manage roles",
        vec![
            step(id * 100, 1, "adminPanel", "#panel"),
            step(id * 100 + 1, 2, "click", "#save-role"),
        ],
    )
}

fn customer_case(id: i64) -> TestCase {
    case(
        id,
        "Customer profile update",
        vec![
            step(id * 100, 1, "click", "#profile"),
            step(id * 100 + 1, 2, "click", "#save"),
        ],
    )
}

#[test]
fn role_classifier_labels_admin_and_user_cases() {
    let roles = RoleClassifier::default();
    assert_eq!(roles.classify(&admin_case(1)), RoleLabel::Admin);
    assert_eq!(roles.classify(&customer_case(2)), RoleLabel::User);
    assert_eq!(roles.classify(&case(3, "Misc", vec![step(300, 1, "click", "#x")])), RoleLabel::Unknown);
}

#[test]
fn role_mismatch_vetoes_merge() {
    let merger = TestCaseMerger::default();
    let (a, b) = (admin_case(1), customer_case(2));
    let safety = merger.merge_safety(&[&a, &b]);

    assert!(matches!(safety.veto, Some(MergeVeto::RoleMismatch { .. })));
    assert!(!safety.is_safe());
}

#[test]
fn website_mismatch_vetoes_merge() {
    let merger = TestCaseMerger::default();
    let a = case(1, "Browse deals", vec![nav(100, 1, "https://www.amazon.com/deals"), step(101, 2, "click", "#deal")]);
    let b = case(2, "Browse deals", vec![nav(200, 1, "https://www.airbnb.com/deals"), step(201, 2, "click", "#deal")]);

    let safety = merger.merge_safety(&[&a, &b]);
    match safety.veto {
        Some(MergeVeto::WebsiteMismatch { websites }) => {
            assert_eq!(websites, vec![(1, "amazon".to_string()), (2, "airbnb".to_string())]);
        }
        other => panic!("expected website veto, got {:?}", other),
    }
}

#[test]
fn unknown_labels_are_compatible_with_a_note() {
    let merger = TestCaseMerger::default();
    let a = customer_case(1);
    let b = case(2, "Misc", vec![step(200, 1, "click", "#x")]);

    let safety = merger.merge_safety(&[&a, &b]);
    assert!(safety.is_safe());
    assert!(safety.notes.iter().any(|n| n.contains("Test case 2 has unknown role")));
}

// ============================================================================
// Multi-way merge and prefixes
// ============================================================================

#[test]
fn merge_many_keeps_prefix_once_and_each_middle() {
    let merger = TestCaseMerger::default();
    let cases = [
        profile_case(1, "Profile save", "#save"),
        profile_case(2, "Profile archive", "#archive"),
        profile_case(3, "Profile export", "#export"),
    ];
    let refs: Vec<&TestCase> = cases.iter().collect();

    let merged = merger.merge_many(&refs, 10_010, false).unwrap();
    assert_eq!(merged.steps.len(), 7);
    assert_eq!(merged.name, "Merged: 3 test cases (1, 2, 3)");
    assert_eq!(positions(&merged), (1..=7).collect::<Vec<u32>>());

    let unique: HashSet<String> = signatures(&merged).into_iter().collect();
    assert_eq!(unique.len(), 7);
}

fn search_case(id: i64, term: &str) -> TestCase {
    let base = id * 100;
    case(
        id,
        &format!("Search for {}", term),
        vec![
            nav(base, 1, "https://shop.example.com/home"),
            step(base + 1, 2, "click", "#search"),
            step(base + 2, 3, "enter", "#query").with_test_data(term),
            step(base + 3, 4, "click", "#go"),
        ],
    )
}

#[test]
fn merge_many_keeps_steps_that_differ_only_in_input() {
    let merger = TestCaseMerger::default();
    let cases = [search_case(1, "shoes"), search_case(2, "hats"), search_case(3, "socks")];
    let refs: Vec<&TestCase> = cases.iter().collect();

    let merged = merger.merge_many(&refs, 10_012, false).unwrap();
    assert_eq!(merged.steps.len(), 6);

    let data: Vec<Option<&str>> = merged.steps.iter().map(|s| s.test_data.as_deref()).collect();
    assert_eq!(data[2..5], [Some("shoes"), Some("hats"), Some("socks")]);

    let merged_sigs: HashSet<String> = signatures(&merged).into_iter().collect();
    for tc in &cases {
        assert!(signatures(tc).iter().all(|sig| merged_sigs.contains(sig)), "case {} lost a step", tc.id);
    }
}

#[test]
fn common_prefix_stops_at_differing_input() {
    let cases = [search_case(1, "shoes"), search_case(2, "hats")];
    let refs: Vec<&TestCase> = cases.iter().collect();

    assert_eq!(common_prefix(&refs).len(), 2);
    assert_eq!(common_suffix(&refs).len(), 1);

    let same = [search_case(3, "shoes"), search_case(4, "shoes")];
    let refs: Vec<&TestCase> = same.iter().collect();
    assert_eq!(common_prefix(&refs).len(), 4);
}

#[test]
fn missing_steps_are_restored_after_their_predecessor() {
    let source = case(
        1,
        "Checkout",
        vec![
            step(100, 1, "click", "#cart"),
            step(101, 2, "enter", "#coupon"),
            step(102, 3, "click", "#pay"),
        ],
    );
    let other = case(2, "Opener", vec![step(200, 1, "click", "#banner"), step(201, 2, "click", "#pay")]);
    let partial = vec![source.steps[0].clone(), source.steps[2].clone()];

    let restored = restore_missing_steps(&[&source, &other], partial);
    let elements: Vec<&str> = restored.iter().filter_map(|s| s.element.as_deref()).collect();
    assert_eq!(elements, vec!["#banner", "#cart", "#coupon", "#pay"]);
}

#[test]
fn merge_many_rejects_empty_input() {
    let merger = TestCaseMerger::default();
    assert!(merger.merge_many(&[], 10_011, true).is_err());
}

#[test]
fn common_prefix_and_suffix() {
    let a = case(1, "A", vec![step(1, 1, "click", "#a"), step(2, 2, "click", "#b"), step(3, 3, "click", "#z")]);
    let b = case(2, "B", vec![step(4, 1, "click", "#a"), step(5, 2, "enter", "#c"), step(6, 3, "click", "#z")]);

    assert_eq!(common_prefix(&[&a, &b]).len(), 1);
    assert_eq!(common_suffix(&[&a, &b]).len(), 1);
}

#[test]
fn login_block_is_detected_and_folded_into_prefix() {
    let login = login_case(1);
    assert_eq!(login_block_len(&login), 3);

    let mut with_login = login_case(2);
    with_login.steps.push(step(203, 4, "click", "#reports"));
    let mut without_login = case(3, "Reports", vec![step(300, 1, "click", "#reports")]);
    without_login.renumber_steps();

    let points = find_flexible_merge_points(&[&with_login, &without_login]);
    assert_eq!(points.prefix.len(), 3);
}

#[test]
fn mergeable_groups_require_shared_prefix() {
    let s = suite(vec![
        profile_case(1, "Profile save", "#save"),
        profile_case(2, "Profile archive", "#archive"),
        case(3, "Other", vec![step(300, 1, "scroll", "#footer")]),
    ]);

    let groups = find_mergeable_groups(&s, 2, 2, false);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].test_case_ids, vec![1, 2]);
    assert_eq!(groups[0].prefix_length, 4);
}

// ============================================================================
// Step tidying
// ============================================================================

#[test]
fn tidy_steps_drops_redundant_waits_and_moves_logout_last() {
    let steps: Vec<TestStep> = vec![
        step(1, 1, "click", "#logout"),
        TestStep::new(2, 2, "wait", "wait").with_wait_time(2000),
        TestStep::new(3, 3, "wait", "wait").with_wait_time(1000),
        step(4, 4, "click", "#next"),
    ];

    let tidied = tidy_steps(steps);
    let ids: Vec<i64> = tidied.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![2, 4, 1]);
}

// ============================================================================
// Feasibility
// ============================================================================

#[test]
fn feasibility_reports_overlap_and_minor_variations() {
    let merger = TestCaseMerger::default();
    let a = profile_case(1, "Profile save", "#save").with_duration(1_000);
    let b = profile_case(2, "Profile archive", "#archive").with_duration(2_000);

    let f = merger.merge_feasibility(&a, &b, 0.95);
    assert!(f.can_merge);
    assert!(f.flow_overlap);
    assert!(f.sequential);
    assert!(f.minor_variations);
    assert_eq!(f.estimated_steps, 6);
    assert_eq!(f.estimated_duration_ms, 3_000);
    assert_eq!(f.recommendation, "Strong merge candidate - very similar test cases");

    let low = merger.merge_feasibility(&a, &b, 0.3);
    assert!(!low.can_merge);
    assert_eq!(low.recommendation, "Cannot merge - too different");
}

// ============================================================================
// Merge validation
// ============================================================================

#[test]
fn merged_pair_passes_validation() {
    let merger = TestCaseMerger::default();
    let (a, b) = (profile_case(1, "Profile save", "#save"), profile_case(2, "Profile archive", "#archive"));
    let merged = merger.merge_pair(&a, &b, 10_020);

    let validation = MergedCaseValidator::for_merger(&merger).validate(&merged, &[&a, &b]);
    assert!(validation.passed, "{:?}", validation.issues);
    assert_eq!(validation.missing_steps, 0);
    assert!(!validation.has_navigation);
}

#[test]
fn dropped_source_step_fails_validation() {
    let merger = TestCaseMerger::default();
    let (a, b) = (profile_case(1, "Profile save", "#save"), profile_case(2, "Profile archive", "#archive"));
    let partial = case(10_021, "Partial", a.steps.clone());

    let validation = MergedCaseValidator::for_merger(&merger).validate(&partial, &[&a, &b]);
    assert!(!validation.passed);
    assert_eq!(validation.missing_steps, 1);
    assert_eq!(validation.issues, vec!["Missing 1 unique steps in merged test case"]);
}

#[test]
fn unrunnable_steps_fail_validation() {
    let merger = TestCaseMerger::default();
    let broken = case(
        10_022,
        "Broken",
        vec![TestStep::new(1, 1, "navigateTo", "Open the page"), step(1, 3, "click", "#go")],
    );

    let validation = MergedCaseValidator::for_merger(&merger).validate(&broken, &[]);
    assert!(!validation.passed);
    assert_eq!(validation.issues.len(), 3);
    assert!(validation.issues.iter().any(|i| i == "Step 1 (navigateTo) has no URL"));
    assert!(validation.issues.iter().any(|i| i.starts_with("Step positions are not sequential")));
    assert!(validation.issues.iter().any(|i| i == "Duplicate step ids: {1}"));
}

#[test]
fn logout_before_login_fails_validation() {
    let merger = TestCaseMerger::default();
    let merged = case(
        10_023,
        "Session",
        vec![
            step(1, 1, "click", "#logout"),
            step(2, 2, "enter", "#username"),
            step(3, 3, "click", "#login"),
        ],
    );

    let validation = MergedCaseValidator::for_merger(&merger).validate(&merged, &[]);
    assert!(validation.has_login && validation.has_logout);
    assert_eq!(validation.issues, vec!["Logout (step 1) appears before login (step 2)"]);
}

#[test]
fn admin_credentials_in_a_user_flow_fail_validation() {
    let merger = TestCaseMerger::default();
    let source = customer_case(1);
    let mut steps = source.steps.clone();
    steps.push(step(102, 3, "enter", "#username").with_test_data("Admin"));
    let merged = case(10_024, "Customer profile update", steps);

    let validation = MergedCaseValidator::for_merger(&merger).validate(&merged, &[&source]);
    assert!(!validation.passed);
    assert_eq!(validation.issues, vec!["Admin credentials in a user flow at steps [3]"]);
}

#[test]
fn mixed_roles_fail_validation() {
    let merger = TestCaseMerger::default();
    let (a, b) = (admin_case(1), customer_case(2));
    let merged = merger.merge_pair(&a, &b, 10_025);

    let validation = MergedCaseValidator::for_merger(&merger).validate(&merged, &[&a, &b]);
    assert!(!validation.passed);
    assert!(validation.issues.iter().any(|i| i == "Mixed roles in sources: admin, user"));
}

#[test]
fn step_flow_issues_flag_early_logout_and_repeats() {
    let steps = vec![
        step(1, 1, "click", "#logout"),
        step(2, 2, "click", "#next"),
        step(3, 3, "click", "#next"),
        nav(4, 4, "https://a.example.com/home"),
        nav(5, 5, "https://a.example.com/home/"),
    ];
    let refs: Vec<&TestStep> = steps.iter().collect();

    assert_eq!(
        step_flow_issues(&refs),
        vec![
            "Step 1: logout before the final step",
            "Step 3: repeated click on #next",
            "Step 5: repeated navigation to https://a.example.com/home/",
        ]
    );
}

#[test]
fn entries_need_a_recent_click_on_the_same_element() {
    let steps = vec![
        step(1, 1, "click", "#name"),
        step(2, 2, "enter", "#name"),
        step(3, 3, "enter", "#email"),
        step(4, 4, "enter", "#search-box"),
    ];
    let refs: Vec<&TestStep> = steps.iter().collect();

    assert_eq!(
        step_dependency_issues(&refs),
        vec!["Step 3: entering into '#email' without clicking it first"]
    );
}
