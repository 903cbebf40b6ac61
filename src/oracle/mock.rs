use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::model::test_case::{TestCase, TestCaseId};
use crate::oracle::oracle_model::{
    OracleError, OracleRecommendation, OracleVerdict, SemanticOracle,
};

// ============================================================================
// Mock Backend (for testing without a running model)
// ============================================================================

/// Scripted oracle. Unscripted pairs get the fallback verdict.
pub struct MockOracle {
    verdicts: HashMap<(TestCaseId, TestCaseId), OracleVerdict>,
    failing: HashSet<(TestCaseId, TestCaseId)>,
    rate_limited: Mutex<HashMap<(TestCaseId, TestCaseId), u32>>,
    fallback: OracleVerdict,
    calls: AtomicUsize,
}

fn pair(a: TestCaseId, b: TestCaseId) -> (TestCaseId, TestCaseId) {
    (a.min(b), a.max(b))
}

impl Default for MockOracle {
    fn default() -> Self {
        Self {
            verdicts: HashMap::new(),
            failing: HashSet::new(),
            rate_limited: Mutex::new(HashMap::new()),
            fallback: OracleVerdict::new(0.0, OracleRecommendation::KeepBoth)
                .with_reasoning("mock: no scripted verdict"),
            calls: AtomicUsize::new(0),
        }
    }
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verdict(mut self, a: TestCaseId, b: TestCaseId, verdict: OracleVerdict) -> Self {
        self.verdicts.insert(pair(a, b), verdict);
        self
    }

    pub fn with_similarity(self, a: TestCaseId, b: TestCaseId, similarity: f64) -> Self {
        let verdict = OracleVerdict::new(similarity, OracleRecommendation::RemoveOne)
            .with_reasoning("mock: scripted similarity");
        self.with_verdict(a, b, verdict)
    }

    /// Every call for this pair fails with an HTTP error.
    pub fn with_failure(mut self, a: TestCaseId, b: TestCaseId) -> Self {
        self.failing.insert(pair(a, b));
        self
    }

    /// The first `times` calls for this pair report rate limiting.
    pub fn with_rate_limit(self, a: TestCaseId, b: TestCaseId, times: u32) -> Self {
        if let Ok(mut map) = self.rate_limited.lock() {
            map.insert(pair(a, b), times);
        }
        self
    }

    pub fn with_fallback(mut self, verdict: OracleVerdict) -> Self {
        self.fallback = verdict;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SemanticOracle for MockOracle {
    fn name(&self) -> &str {
        "mock"
    }

    fn assess(&self, a: &TestCase, b: &TestCase) -> Result<OracleVerdict, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = pair(a.id, b.id);

        if self.failing.contains(&key) {
            return Err(OracleError::Http("mock: scripted failure".to_string()));
        }

        if let Ok(mut map) = self.rate_limited.lock() {
            if let Some(remaining) = map.get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(OracleError::RateLimited);
                }
            }
        }

        Ok(self
            .verdicts
            .get(&key)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}
