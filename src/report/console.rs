use crate::analysis::duplicate::DuplicateReport;
use crate::analysis::matrix::MatrixSummary;
use crate::execution::scheduler::ExecutionPlan;
use crate::flows::coverage::FlowCoverage;
use crate::model::test_case::TestSuite;
use crate::optimization::result::OptimizationResult;
use crate::optimization::validator::CoverageValidationResult;
use crate::report::report_model::OptimizationReport;

// ============================================================================
// Console reporter: formatted terminal output
// ============================================================================

const PASS: &str = "\u{2713}";
const FAIL: &str = "\u{2717}";

fn marker(passed: bool) -> &'static str {
    if passed { PASS } else { FAIL }
}

/// Format an optimization run for terminal output.
///
/// Produces output like:
/// ```text
/// === Optimization: 12 -> 9 test cases (25.0% reduction) ===
///
/// ✓ Flow coverage  100.0% -> 100.0%
/// ✓ Step coverage  100.0% -> 97.5%
///   Removed 2, merged 1 (from 2 sources), skipped 3
///
///   - 14 [exact_duplicate] Exact duplicate of 11
///   + 10342 <- [21, 22] [merged_unique_steps] ...
///   ! 7 [critical_flow_lost] Critical flows no longer covered: authentication
///
/// === Time saved: 1.2 minutes ===
/// ```
pub fn format_optimization_report(report: &OptimizationReport, result: &OptimizationResult) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "=== Optimization: {} -> {} test cases ({:.1}% reduction) ===\n\n",
        report.original_count, report.optimized_count, report.reduction_percentage
    ));

    let flow_kept = report.flow_coverage_after + 1e-9 >= report.flow_coverage_before;
    out.push_str(&format!(
        "{} Flow coverage  {:.1}% -> {:.1}%\n",
        marker(flow_kept),
        report.flow_coverage_before,
        report.flow_coverage_after
    ));
    out.push_str(&format!(
        "{} Step coverage  {:.1}% -> {:.1}%",
        marker(report.unique_steps_lost == 0),
        report.step_coverage_before,
        report.step_coverage_after
    ));
    if report.unique_steps_lost > 0 {
        out.push_str(&format!(" ({} unique steps lost)", report.unique_steps_lost));
    }
    out.push('\n');

    out.push_str(&format!(
        "  Removed {}, merged {} (from {} sources), skipped {}\n",
        report.removed_count, report.merged_count, report.merged_source_count, report.skipped_count
    ));
    if report.oracle_pairs > 0 {
        out.push_str(&format!("  Semantic oracle contributed {} pairs\n", report.oracle_pairs));
    }

    if !result.removed.is_empty() || !result.merged.is_empty() || !result.skipped.is_empty() {
        out.push('\n');
    }
    for removed in &result.removed {
        out.push_str(&format!("  - {} {}\n", removed.test_case_id, removed.reason));
    }
    for merged in &result.merged {
        out.push_str(&format!(
            "  + {} <- {:?} ({} steps) {}\n",
            merged.merged_id, merged.source_ids, merged.step_count, merged.reason
        ));
    }
    for skipped in &result.skipped {
        out.push_str(&format!(
            "  ! {:?} {}: {}\n",
            skipped.test_case_ids, skipped.attempted, skipped.reason
        ));
    }

    out.push_str(&format!(
        "\n=== Time saved: {:.1} minutes ===\n",
        report.time_saved_minutes()
    ));

    out
}

/// One line per comprehensive check, failures expanded with their errors.
pub fn format_validation_summary(result: &CoverageValidationResult) -> String {
    let mut out = String::new();
    let checks = [
        ("Step coverage", result.step_coverage.is_maintained),
        ("Flow coverage", result.flow_coverage.passed),
        ("Scenarios", result.scenario_coverage.passed),
        ("Sequences", result.sequence_preservation.passed),
        ("Dependencies", result.dependency_preservation.passed),
        ("Transitions", result.transition_preservation.passed),
        ("Scenario context", result.scenario_context.passed),
        ("Elements", result.element_coverage.passed),
        ("Test data", result.data_coverage.passed),
        ("Data combinations", result.data_combinations.passed),
    ];

    out.push_str("=== Comprehensive validation ===\n");
    for (name, passed) in checks {
        let label = if passed { "PASS" } else { "FAIL" };
        out.push_str(&format!("{} {}  {}\n", marker(passed), label, name));
    }

    for error in &result.errors {
        out.push_str(&format!("    [ERROR] {}\n", error));
    }
    for warning in &result.warnings {
        out.push_str(&format!("    [WARN] {}\n", warning));
    }

    let verdict = if result.overall_valid { "VALID" } else { "INVALID" };
    out.push_str(&format!("=== Result: {} ===\n", verdict));
    out
}

/// Similarity summary, duplicate groups and flow coverage of one suite.
pub fn format_analysis(summary: &MatrixSummary, duplicates: &DuplicateReport, flows: &FlowCoverage) -> String {
    let mut out = String::new();

    out.push_str("=== Similarity ===\n");
    out.push_str(&format!(
        "  {} comparisons, average {:.3}, max {:.3}, min {:.3}\n",
        summary.total_comparisons, summary.average_similarity, summary.max_similarity, summary.min_similarity
    ));
    out.push_str(&format!(
        "  high {} / medium {} / low {}\n",
        summary.high_similarity_count, summary.medium_similarity_count, summary.low_similarity_count
    ));
    for pair in summary.high_similarity_pairs.iter().take(10) {
        out.push_str(&format!("    {} ~ {}  {:.3}\n", pair.first, pair.second, pair.similarity));
    }

    out.push_str(&format!(
        "\n=== Duplicates: {} exact, {} near, {} highly similar ===\n",
        duplicates.exact_count, duplicates.near_count, duplicates.highly_similar_count
    ));
    for group in duplicates.groups.iter().filter(|g| g.category.is_some()) {
        let category = group.category.map(|c| c.to_string()).unwrap_or_default();
        let oracle = if group.oracle_assisted { " (oracle)" } else { "" };
        out.push_str(&format!(
            "  [{}]{} keep {} remove {:?}  max {:.3}\n",
            category, oracle, group.keep, group.remove, group.max_similarity
        ));
    }

    out.push_str(&format!(
        "\n=== Flows: {} covered ({:.1}%) ===\n",
        flows.covered_flows.len(),
        flows.coverage_percentage
    ));
    for flow in &flows.covered_flows {
        out.push_str(&format!("  {} {}\n", PASS, flow));
    }
    for flow in &flows.uncovered_flows {
        out.push_str(&format!("  {} {}\n", FAIL, flow));
    }

    out
}

/// Human-readable execution plan.
pub fn format_execution_plan(plan: &ExecutionPlan, suite: &TestSuite) -> String {
    let rule = "=".repeat(80);
    let thin = "-".repeat(80);
    let mut out = Vec::new();

    out.push(rule.clone());
    out.push("TEST EXECUTION PLAN".to_string());
    out.push(rule.clone());
    out.push(format!("Total Test Cases: {}", plan.summary.total_test_cases));
    out.push(format!(
        "Estimated Execution Time: {:.1} minutes",
        plan.summary.total_execution_time_minutes
    ));
    out.push(format!(
        "Smoke: {}  High: {}  Medium: {}  Low: {}",
        plan.summary.smoke_tests,
        plan.summary.high_priority_tests,
        plan.summary.medium_priority_tests,
        plan.summary.low_priority_tests
    ));
    out.push(format!("Parallel Groups: {}", plan.summary.parallel_groups_count));
    if plan.dependency_analysis.has_cycles() {
        out.push(format!(
            "{} Circular dependencies: {:?}",
            FAIL, plan.dependency_analysis.cycles
        ));
    }

    out.push(String::new());
    out.push("EXECUTION ORDER".to_string());
    out.push(thin.clone());
    for (i, id) in plan.execution_order.iter().enumerate() {
        let name = suite.get(*id).map(|tc| tc.name.as_str()).unwrap_or("Unknown");
        let score = plan.priorities.get(id).copied().unwrap_or(0.0);
        let category = plan.category_of(*id).map(|c| c.as_str()).unwrap_or("-");
        out.push(format!("{:>4}. [{}] {} ({}, {:.1})", i + 1, id, name, category, score));
    }

    if !plan.checkpoints.is_empty() {
        out.push(String::new());
        out.push("CHECKPOINTS".to_string());
        out.push(thin.clone());
        for cp in &plan.checkpoints {
            out.push(format!("  #{} after test {}: {}", cp.position, cp.test_case_id, cp.reason));
        }
    }

    if !plan.rollback_points.is_empty() {
        out.push(String::new());
        out.push("ROLLBACK POINTS".to_string());
        out.push(thin);
        for rp in &plan.rollback_points {
            out.push(format!("  #{} {}", rp.position, rp.description));
        }
    }

    out.push(rule);
    out.push(String::new());
    out.join("\n")
}
