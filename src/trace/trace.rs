use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::model::test_case::TestCaseId;
use crate::optimization::result::Reason;

/// One engine decision, written as a single JSONL line.
#[derive(Debug, Serialize)]
pub struct TraceEvent {
    pub timestamp_ms: u128,
    pub step: u64,

    pub stage: String,
    pub test_case_ids: Vec<TestCaseId>,

    pub decision: Option<String>,
    pub reason_kind: Option<String>,
    pub detail: Option<String>,

    pub similarity: Option<f64>,
    pub flow_coverage: Option<f64>,
    pub step_coverage: Option<f64>,
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

impl TraceEvent {
    pub fn now(step: u64, stage: &str) -> Self {
        Self {
            timestamp_ms: now_ms(),
            step,
            stage: stage.to_string(),
            test_case_ids: vec![],
            decision: None,
            reason_kind: None,
            detail: None,
            similarity: None,
            flow_coverage: None,
            step_coverage: None,
        }
    }

    pub fn with_ids(mut self, ids: &[TestCaseId]) -> Self {
        self.test_case_ids = ids.to_vec();
        self
    }

    pub fn with_decision(mut self, decision: impl ToString) -> Self {
        self.decision = Some(decision.to_string());
        self
    }

    pub fn with_reason(mut self, reason: &Reason) -> Self {
        self.reason_kind = Some(reason.kind.to_string());
        self.detail = Some(reason.detail.clone());
        self
    }

    pub fn with_similarity(mut self, similarity: f64) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn with_coverage(mut self, flow: f64, step: f64) -> Self {
        self.flow_coverage = Some(flow);
        self.step_coverage = Some(step);
        self
    }
}

/// Final line of a run's trace.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub timestamp_ms: u128,
    pub stage: &'static str,
    pub decisions: u64,

    pub original_count: usize,
    pub optimized_count: usize,
    pub removed: usize,
    pub merged: usize,
    pub skipped: usize,

    pub flow_coverage: f64,
    pub step_coverage: f64,
}

impl RunSummary {
    pub fn now(decisions: u64) -> Self {
        Self {
            timestamp_ms: now_ms(),
            stage: "run_summary",
            decisions,
            original_count: 0,
            optimized_count: 0,
            removed: 0,
            merged: 0,
            skipped: 0,
            flow_coverage: 0.0,
            step_coverage: 0.0,
        }
    }

    pub fn with_counts(mut self, original: usize, optimized: usize) -> Self {
        self.original_count = original;
        self.optimized_count = optimized;
        self
    }

    pub fn with_outcomes(mut self, removed: usize, merged: usize, skipped: usize) -> Self {
        self.removed = removed;
        self.merged = merged;
        self.skipped = skipped;
        self
    }

    pub fn with_coverage(mut self, flow: f64, step: f64) -> Self {
        self.flow_coverage = flow;
        self.step_coverage = step;
        self
    }
}
