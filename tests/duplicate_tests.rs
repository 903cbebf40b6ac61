use std::collections::BTreeSet;
use std::time::Duration;

use suite_optimizer::analysis::duplicate::{
    DuplicateCategory, DuplicateConfig, DuplicateDetector, quality_score, select_representative,
};
use suite_optimizer::analysis::matrix::SimilarityMatrix;
use suite_optimizer::analysis::similarity::SimilarityAnalyzer;
use suite_optimizer::model::test_case::{TestCase, TestSuite};
use suite_optimizer::oracle::gateway::OracleGateway;
use suite_optimizer::oracle::mock::MockOracle;
use suite_optimizer::oracle::oracle_model::OracleConfig;

use crate::common::{case, nav, profile_case, step, suite};

mod common;

fn detect(s: &TestSuite) -> suite_optimizer::analysis::duplicate::DuplicateReport {
    let matrix = SimilarityMatrix::build(&SimilarityAnalyzer::default(), s);
    DuplicateDetector::new(DuplicateConfig::default()).detect(s, &matrix, None)
}

fn copy_of(tc: &TestCase, id: i64) -> TestCase {
    let mut copy = tc.clone();
    copy.id = id;
    copy
}

fn unrelated(id: i64) -> TestCase {
    case(
        id,
        "Search results",
        vec![
            step(id * 100, 1, "verifyText", "#results"),
            step(id * 100 + 1, 2, "scroll", "#footer"),
        ],
    )
}

// ============================================================================
// Grouping
// ============================================================================

#[test]
fn groups_partition_the_suite() {
    let first = profile_case(1, "Profile save", "#save");
    let s = suite(vec![
        first.clone(),
        profile_case(2, "Profile archive", "#archive"),
        copy_of(&first, 3),
        unrelated(4),
    ]);
    let report = detect(&s);

    let mut seen = BTreeSet::new();
    for group in &report.groups {
        for id in &group.test_case_ids {
            assert!(seen.insert(*id), "id {} appears in two groups", id);
        }
        assert!(!group.remove.contains(&group.keep));
        assert_eq!(group.remove.len() + 1, group.test_case_ids.len());
    }
    assert_eq!(seen, s.ids().iter().copied().collect());
}

#[test]
fn unrelated_case_is_a_singleton_without_category() {
    let s = suite(vec![
        profile_case(1, "Profile save", "#save"),
        profile_case(2, "Profile archive", "#archive"),
        unrelated(3),
    ]);
    let report = detect(&s);

    let group = report.group_of(3).unwrap();
    assert!(group.is_singleton());
    assert_eq!(group.category, None);
    assert_eq!(group.keep, 3);
    assert!(group.remove.is_empty());
}

#[test]
fn identical_cases_form_an_exact_group() {
    let first = profile_case(1, "Profile save", "#save");
    let s = suite(vec![first.clone(), copy_of(&first, 2)]);
    let report = detect(&s);

    assert_eq!(report.exact_count, 1);
    let group = report.exact().next().unwrap();
    assert_eq!(group.keep, 1);
    assert_eq!(group.remove, vec![2]);
    assert!((group.max_similarity - 1.0).abs() < 1e-9);
}

#[test]
fn one_divergent_step_is_a_near_duplicate() {
    let s = suite(vec![
        profile_case(1, "Profile save", "#save"),
        profile_case(2, "Profile archive", "#archive"),
    ]);
    let report = detect(&s);

    assert_eq!(report.near_count, 1);
    assert_eq!(report.exact_count, 0);
    let group = report.near().next().unwrap();
    assert!(group.max_similarity < 1.0);
    assert!(group.max_similarity >= 0.90);
}

#[test]
fn transitive_links_join_one_component() {
    let first = profile_case(1, "Profile save", "#save");
    let s = suite(vec![
        first.clone(),
        profile_case(2, "Profile archive", "#archive"),
        copy_of(&first, 3),
    ]);
    let report = detect(&s);

    assert_eq!(report.total_groups(), 1);
    let group = report.group_of(2).unwrap();
    assert_eq!(group.test_case_ids, vec![1, 2, 3]);
    assert_eq!(group.category, Some(DuplicateCategory::Exact));
}

#[test]
fn categorize_uses_configured_thresholds() {
    let detector = DuplicateDetector::new(DuplicateConfig::default());
    assert_eq!(detector.categorize(1.0), Some(DuplicateCategory::Exact));
    assert_eq!(detector.categorize(0.95), Some(DuplicateCategory::Near));
    assert_eq!(detector.categorize(0.80), Some(DuplicateCategory::HighlySimilar));
    assert_eq!(detector.categorize(0.5), None);

    let strict = DuplicateDetector::new(DuplicateConfig {
        near_duplicate_threshold: 0.98,
        ..DuplicateConfig::default()
    });
    assert_eq!(strict.categorize(0.95), Some(DuplicateCategory::HighlySimilar));
}

// ============================================================================
// Representative selection
// ============================================================================

#[test]
fn higher_priority_case_is_kept() {
    let first = profile_case(1, "Profile save", "#save").with_priority(4);
    let better = copy_of(&first, 2).with_priority(1);
    let s = suite(vec![first, better]);

    assert_eq!(select_representative(&[1, 2], &s), Some(2));
    let report = detect(&s);
    assert_eq!(report.exact().next().unwrap().keep, 2);
}

#[test]
fn quality_score_rewards_pass_rate_and_speed() {
    let base = profile_case(1, "Profile save", "#save");
    let reliable = base.clone().with_run_counts(9, 1);
    let flaky = base.clone().with_run_counts(1, 9);
    let fast = base.clone().with_duration(10_000);
    let slow = base.clone().with_duration(290_000);

    assert!(quality_score(&reliable) > quality_score(&flaky));
    assert!(quality_score(&fast) > quality_score(&slow));
}

#[test]
fn ties_keep_the_first_member() {
    let first = profile_case(1, "Profile save", "#save");
    let s = suite(vec![first.clone(), copy_of(&first, 2), copy_of(&first, 3)]);
    assert_eq!(select_representative(&[3, 2, 1], &s), Some(3));
    assert_eq!(select_representative(&[], &s), None);
}

// ============================================================================
// Oracle-assisted grouping
// ============================================================================

fn clicks(id: i64, tail: &str) -> TestCase {
    let base = id * 100;
    case(
        id,
        &format!("Flow {}", id),
        vec![
            step(base, 1, "click", "#a"),
            step(base + 1, 2, "click", "#b"),
            step(base + 2, 3, tail, "#e"),
            step(base + 3, 4, tail, "#f"),
        ],
    )
}

#[test]
fn oracle_edge_joins_a_mid_band_pair() {
    let s = suite(vec![clicks(1, "click"), clicks(2, "verifyText")]);
    let matrix = SimilarityMatrix::build(&SimilarityAnalyzer::default(), &s);
    let algorithmic = matrix.get(1, 2);
    assert!(algorithmic >= 0.30 && algorithmic < 0.75, "got {}", algorithmic);

    let mut gateway = OracleGateway::new(Box::new(MockOracle::new().with_similarity(1, 2, 0.9)))
        .with_rate_limit(Duration::ZERO);
    let report = DuplicateDetector::new(DuplicateConfig::default()).detect(&s, &matrix, Some(&mut gateway));

    assert_eq!(report.oracle_pairs, 1);
    assert_eq!(report.oracle_queries, 1);
    let group = report.group_of(1).unwrap();
    assert!(group.oracle_assisted);
    assert_eq!(group.test_case_ids, vec![1, 2]);
    assert!((group.max_similarity - 0.9).abs() < 1e-9);
    assert_eq!(group.category, Some(DuplicateCategory::Near));
}

#[test]
fn oracle_below_acceptance_adds_no_edge() {
    let s = suite(vec![clicks(1, "click"), clicks(2, "verifyText")]);
    let matrix = SimilarityMatrix::build(&SimilarityAnalyzer::default(), &s);

    let mut gateway = OracleGateway::new(Box::new(MockOracle::new().with_similarity(1, 2, 0.6)))
        .with_rate_limit(Duration::ZERO);
    let report = DuplicateDetector::new(DuplicateConfig::default()).detect(&s, &matrix, Some(&mut gateway));

    assert_eq!(report.oracle_pairs, 0);
    assert_eq!(report.oracle_queries, 1);
    assert!(report.group_of(1).unwrap().is_singleton());
}

// ============================================================================
// Website separation
// ============================================================================

fn storefront_checkout(id: i64, url: &str) -> TestCase {
    let base = id * 100;
    case(
        id,
        "Checkout",
        vec![
            nav(base, 1, url),
            step(base + 1, 2, "click", "#buy"),
            step(base + 2, 3, "click", "#pay"),
        ],
    )
}

#[test]
fn same_flow_on_different_websites_stays_apart() {
    let amazon = storefront_checkout(1, "https://www.amazon.com/");
    let ebay = storefront_checkout(2, "https://www.ebay.com/");

    let scores = SimilarityAnalyzer::default().similarity(&amazon, &ebay);
    assert!(scores.different_websites);
    assert!((scores.overall - scores.raw_overall * 0.3).abs() < 1e-9);

    let report = detect(&suite(vec![amazon, ebay]));
    assert_eq!(report.total_groups(), 2);
    for id in [1, 2] {
        let group = report.group_of(id).unwrap();
        assert!(group.is_singleton());
        assert_eq!(group.category, None);
    }
}

#[test]
fn oracle_cannot_join_cases_on_different_websites() {
    let s = suite(vec![
        storefront_checkout(1, "https://www.amazon.com/"),
        storefront_checkout(2, "https://www.ebay.com/"),
    ]);
    let matrix = SimilarityMatrix::build(&SimilarityAnalyzer::default(), &s);
    let detector = DuplicateDetector::new(DuplicateConfig::default()).with_oracle_config(OracleConfig {
        band_low: 0.0,
        cache_enabled: false,
        ..OracleConfig::default()
    });

    let mut gateway = OracleGateway::new(Box::new(MockOracle::new().with_similarity(1, 2, 0.9)))
        .with_rate_limit(Duration::ZERO);
    let report = detector.detect(&s, &matrix, Some(&mut gateway));

    assert_eq!(report.oracle_queries, 1);
    assert_eq!(report.oracle_pairs, 0);
    assert!(report.group_of(1).unwrap().is_singleton());
    assert!(report.group_of(2).unwrap().is_singleton());
}
