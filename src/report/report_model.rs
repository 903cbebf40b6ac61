use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::test_case::TestCaseId;
use crate::optimization::result::{OptimizationResult, ReasonKind};

// ============================================================================
// Optimization report: the numbers behind console and JSON output
// ============================================================================

/// Aggregated view of an `OptimizationResult`.
///
/// Built via `from_result()`. Consumed by the console reporter and written
/// next to the full result as a compact summary.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub original_count: usize,
    pub optimized_count: usize,
    pub reduction_count: usize,
    pub reduction_percentage: f64,

    pub removed_count: usize,
    pub merged_count: usize,

    /// Source cases consumed by merges
    pub merged_source_count: usize,
    pub skipped_count: usize,

    /// Decisions per reason kind, applied and skipped together
    pub reasons: BTreeMap<ReasonKind, usize>,

    /// Percentages, 0..100
    pub flow_coverage_before: f64,
    pub flow_coverage_after: f64,
    pub step_coverage_before: f64,
    pub step_coverage_after: f64,
    pub unique_steps_lost: usize,

    pub time_saved_ms: u64,
    pub oracle_pairs: usize,

    pub merged_ids: Vec<TestCaseId>,
    pub removed_ids: Vec<TestCaseId>,
}

impl OptimizationReport {
    pub fn from_result(result: &OptimizationResult) -> Self {
        let mut reasons: BTreeMap<ReasonKind, usize> = BTreeMap::new();
        let kinds = result
            .removed
            .iter()
            .map(|r| r.reason.kind)
            .chain(result.merged.iter().map(|m| m.reason.kind))
            .chain(result.skipped.iter().map(|s| s.reason.kind));
        for kind in kinds {
            *reasons.entry(kind).or_default() += 1;
        }

        Self {
            original_count: result.original_count,
            optimized_count: result.optimized_count,
            reduction_count: result.reduction_count,
            reduction_percentage: result.reduction_percentage,
            removed_count: result.removed.len(),
            merged_count: result.merged.len(),
            merged_source_count: result.merged.iter().map(|m| m.source_ids.len()).sum(),
            skipped_count: result.skipped.len(),
            reasons,
            flow_coverage_before: result.before.flow_coverage,
            flow_coverage_after: result.after.flow_coverage,
            step_coverage_before: result.before.step_coverage,
            step_coverage_after: result.after.step_coverage,
            unique_steps_lost: result.coverage_loss.lost_step_count,
            time_saved_ms: result.time_saved_ms,
            oracle_pairs: result.oracle_pairs,
            merged_ids: result.merged.iter().map(|m| m.merged_id).collect(),
            removed_ids: result.removed_ids(),
        }
    }

    pub fn time_saved_minutes(&self) -> f64 {
        self.time_saved_ms as f64 / 60_000.0
    }

    /// Whether the run kept every flow and step of the input.
    pub fn lossless(&self) -> bool {
        self.unique_steps_lost == 0 && self.flow_coverage_after >= self.flow_coverage_before
    }

    pub fn count_for(&self, kind: ReasonKind) -> usize {
        self.reasons.get(&kind).copied().unwrap_or(0)
    }
}
