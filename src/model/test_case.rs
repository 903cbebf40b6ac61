use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

pub type TestCaseId = i64;

pub type Locator = BTreeMap<String, String>;

// ============================================================================
// Test step
// ============================================================================

/// One recorded UI interaction. `position` is 1-based within the owning case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStep {
    pub id: i64,
    pub position: u32,

    /// Normalized verb, lowercased (`click`, `enter`, `navigateto`)
    pub action_name: String,

    /// Free-text action description, may embed a URL
    pub action: String,

    pub element: Option<String>,
    pub description: Option<String>,
    pub locator: Option<Locator>,
    pub test_data: Option<String>,
    pub wait_time: Option<u64>,
    pub test_case_id: Option<TestCaseId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl TestStep {
    pub fn new(id: i64, position: u32, action_name: &str, action: &str) -> Self {
        Self {
            id,
            position,
            action_name: action_name.trim().to_lowercase(),
            action: action.to_string(),
            element: None,
            description: None,
            locator: None,
            test_data: None,
            wait_time: None,
            test_case_id: None,
            raw: None,
        }
    }

    pub fn with_element(mut self, element: &str) -> Self {
        self.element = Some(element.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_test_data(mut self, data: &str) -> Self {
        self.test_data = Some(data.to_string());
        self
    }

    pub fn with_locator(mut self, key: &str, value: &str) -> Self {
        self.locator
            .get_or_insert_with(Locator::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_wait_time(mut self, ms: u64) -> Self {
        self.wait_time = Some(ms);
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.action_name == "navigateto"
    }

    /// Lowercased element identifiers: the element itself plus locator values.
    pub fn element_identifiers(&self) -> Vec<String> {
        let mut ids = Vec::new();
        if let Some(element) = &self.element {
            ids.push(element.trim().to_lowercase());
        }
        if let Some(locator) = &self.locator {
            for key in ["label", "id", "name", "placeholder", "xpath", "selector"] {
                if let Some(value) = locator.get(key) {
                    ids.push(value.trim().to_lowercase());
                }
            }
        }
        ids
    }
}

// ============================================================================
// Test case
// ============================================================================

/// A recorded test case with its exclusively owned, position-ordered steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: TestCaseId,
    pub name: String,
    pub description: Option<String>,

    /// Lower is more important. `None` is treated as neutral.
    pub priority: Option<i32>,
    pub status: Option<String>,

    /// Last-run duration in milliseconds
    pub duration: Option<u64>,
    pub pass_count: Option<u32>,
    pub fail_count: Option<u32>,

    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub steps: Vec<TestStep>,

    pub prerequisite_case: Option<TestCaseId>,
    pub test_data_id: Option<i64>,
    pub last_run_result: Option<String>,
    pub created_date: Option<String>,
    pub updated_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl TestCase {
    pub fn new(id: TestCaseId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            description: None,
            priority: None,
            status: None,
            duration: None,
            pass_count: None,
            fail_count: None,
            tags: Vec::new(),
            steps: Vec::new(),
            prerequisite_case: None,
            test_data_id: None,
            last_run_result: None,
            created_date: None,
            updated_date: None,
            raw: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration = Some(ms);
        self
    }

    pub fn with_run_counts(mut self, passed: u32, failed: u32) -> Self {
        self.pass_count = Some(passed);
        self.fail_count = Some(failed);
        self
    }

    pub fn with_prerequisite(mut self, id: TestCaseId) -> Self {
        self.prerequisite_case = Some(id);
        self
    }

    pub fn with_test_data_id(mut self, id: i64) -> Self {
        self.test_data_id = Some(id);
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Attach steps, stamping ownership on each.
    pub fn with_steps(mut self, steps: Vec<TestStep>) -> Self {
        let id = self.id;
        self.steps = steps
            .into_iter()
            .map(|mut s| {
                s.test_case_id = Some(id);
                s
            })
            .collect();
        self
    }

    /// Steps sorted by position.
    pub fn ordered_steps(&self) -> Vec<&TestStep> {
        let mut steps: Vec<&TestStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.position);
        steps
    }

    pub fn action_sequence(&self) -> Vec<String> {
        self.ordered_steps()
            .into_iter()
            .map(|s| s.action_name.clone())
            .collect()
    }

    /// Name and description, lowercased, for keyword matching.
    pub fn text(&self) -> String {
        format!(
            "{} {}",
            self.name,
            self.description.as_deref().unwrap_or("")
        )
        .to_lowercase()
    }

    pub fn pass_rate(&self) -> Option<f64> {
        let passed = self.pass_count?;
        let failed = self.fail_count.unwrap_or(0);
        let total = passed + failed;
        if total == 0 {
            return None;
        }
        Some(passed as f64 / total as f64)
    }

    /// Reassign positions 1..N in current order.
    pub fn renumber_steps(&mut self) {
        self.steps.sort_by_key(|s| s.position);
        for (i, step) in self.steps.iter_mut().enumerate() {
            step.position = i as u32 + 1;
        }
    }
}

// ============================================================================
// Test suite (insertion-ordered id -> case mapping)
// ============================================================================

/// Ordered collection of test cases keyed by id.
///
/// Iteration follows insertion order, which callers rely on for
/// deterministic tie-breaks (keep-representative selection, scheduling).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestSuite {
    order: Vec<TestCaseId>,
    cases: HashMap<TestCaseId, TestCase>,
}

impl TestSuite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cases(cases: Vec<TestCase>) -> Self {
        let mut suite = Self::new();
        for case in cases {
            suite.insert(case);
        }
        suite
    }

    /// Insert or replace. A replaced case keeps its original slot.
    pub fn insert(&mut self, case: TestCase) {
        if !self.cases.contains_key(&case.id) {
            self.order.push(case.id);
        }
        self.cases.insert(case.id, case);
    }

    pub fn remove(&mut self, id: TestCaseId) -> Option<TestCase> {
        let removed = self.cases.remove(&id)?;
        self.order.retain(|&other| other != id);
        Some(removed)
    }

    pub fn get(&self, id: TestCaseId) -> Option<&TestCase> {
        self.cases.get(&id)
    }

    pub fn contains(&self, id: TestCaseId) -> bool {
        self.cases.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> &[TestCaseId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestCase> {
        self.order.iter().filter_map(|id| self.cases.get(id))
    }

    /// Copy of this suite without the given ids.
    pub fn without(&self, ids: &[TestCaseId]) -> TestSuite {
        let mut copy = self.clone();
        for id in ids {
            copy.remove(*id);
        }
        copy
    }

    pub fn total_duration(&self) -> u64 {
        self.iter().map(|tc| tc.duration.unwrap_or(0)).sum()
    }

    pub fn into_cases(self) -> Vec<TestCase> {
        let TestSuite { order, mut cases } = self;
        order.iter().filter_map(|id| cases.remove(id)).collect()
    }
}
