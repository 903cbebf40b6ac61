use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::flows::flow_model::{CriticalPath, FlowType, PageTransition};
use crate::model::normalize::step_url;
use crate::model::test_case::{TestCase, TestCaseId, TestSuite};

/// Name/description keywords per flow, checked in flow order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowKeywords(pub BTreeMap<FlowType, Vec<String>>);

impl Default for FlowKeywords {
    fn default() -> Self {
        let table: [(FlowType, &[&str]); 6] = [
            (FlowType::Authentication, &["login", "logout", "signin", "signout", "authenticate", "password"]),
            (FlowType::Navigation, &["navigate", "goto", "visit", "open", "menu", "dashboard"]),
            (FlowType::Crud, &["create", "add", "new", "edit", "update", "modify", "delete", "remove"]),
            (FlowType::Form, &["submit", "form", "fill", "enter", "input", "select"]),
            (FlowType::Search, &["search", "find", "filter", "query"]),
            (FlowType::Verification, &["verify", "assert", "check", "validate", "confirm"]),
        ];
        FlowKeywords(
            table
                .iter()
                .map(|(flow, words)| (*flow, words.iter().map(|w| w.to_string()).collect()))
                .collect(),
        )
    }
}

impl FlowKeywords {
    pub fn keywords(&self, flow: FlowType) -> &[String] {
        self.0.get(&flow).map(Vec::as_slice).unwrap_or(&[])
    }
}

// Step-level rules, matched against action name and description.
const AUTH_STEP_WORDS: [&str; 3] = ["login", "password", "username"];
const CRUD_STEP_WORDS: [&str; 6] = ["create", "add", "new", "edit", "update", "delete"];
const FORM_STEP_WORDS: [&str; 3] = ["submit", "form", "save"];
const SEARCH_STEP_WORDS: [&str; 3] = ["search", "filter", "find"];

#[derive(Debug, Clone, Default)]
pub struct FlowAnalyzer {
    pub keywords: FlowKeywords,
}

impl FlowAnalyzer {
    pub fn new(keywords: FlowKeywords) -> Self {
        Self { keywords }
    }

    /// Flows a test case exercises; `{General}` when nothing matches.
    pub fn identify_flows(&self, tc: &TestCase) -> BTreeSet<FlowType> {
        let mut flows = BTreeSet::new();
        let text = tc.text();

        for (flow, words) in &self.keywords.0 {
            if words.iter().any(|w| text.contains(w.as_str())) {
                flows.insert(*flow);
            }
        }

        for step in &tc.steps {
            let action = step.action_name.as_str();
            let description = step.description.as_deref().unwrap_or("").to_lowercase();
            let hit = |words: &[&str]| {
                words.iter().any(|w| action.contains(w) || description.contains(w))
            };

            if hit(&AUTH_STEP_WORDS) {
                flows.insert(FlowType::Authentication);
            }
            if hit(&CRUD_STEP_WORDS) {
                flows.insert(FlowType::Crud);
            }
            if step.is_navigation() || description.contains("navigate") {
                flows.insert(FlowType::Navigation);
            }
            if hit(&FORM_STEP_WORDS) {
                flows.insert(FlowType::Form);
            }
            if hit(&SEARCH_STEP_WORDS) {
                flows.insert(FlowType::Search);
            }
        }

        if flows.is_empty() {
            flows.insert(FlowType::General);
        }
        flows
    }

    /// URL-to-URL moves between consecutive navigation steps.
    pub fn page_transitions(&self, tc: &TestCase) -> Vec<PageTransition> {
        let mut transitions = Vec::new();
        let mut current: Option<String> = None;

        for step in tc.ordered_steps() {
            if !step.is_navigation() {
                continue;
            }
            let Some(url) = step_url(step) else { continue };
            if let Some(from) = current.take() {
                transitions.push(PageTransition {
                    from,
                    to: url.clone(),
                    step_position: step.position,
                });
            }
            current = Some(url);
        }
        transitions
    }

    /// Flows ranked by frequency and average priority (unset counts as 5).
    pub fn critical_paths(&self, suite: &TestSuite) -> Vec<CriticalPath> {
        let mut by_flow: BTreeMap<FlowType, (Vec<TestCaseId>, Vec<i32>)> = BTreeMap::new();
        for tc in suite.iter() {
            let priority = tc.priority.filter(|&p| p != 0).unwrap_or(5);
            for flow in self.identify_flows(tc) {
                let entry = by_flow.entry(flow).or_default();
                entry.0.push(tc.id);
                entry.1.push(priority);
            }
        }

        let mut paths: Vec<CriticalPath> = by_flow
            .into_iter()
            .map(|(flow, (ids, priorities))| {
                let average = priorities.iter().sum::<i32>() as f64 / priorities.len() as f64;
                let priority_score = if average > 0.0 { 6.0 - average } else { 0.0 };
                CriticalPath {
                    flow_type: flow,
                    frequency: ids.len(),
                    average_priority: average,
                    criticality_score: ids.len() as f64 * 0.5 + priority_score * 0.5,
                    test_case_ids: ids,
                }
            })
            .collect();

        paths.sort_by(|a, b| b.criticality_score.total_cmp(&a.criticality_score));
        paths
    }

    /// Ids grouped by their sorted flow set, e.g. `authentication->form`.
    pub fn common_flows(&self, suite: &TestSuite) -> BTreeMap<String, Vec<TestCaseId>> {
        let mut groups: BTreeMap<String, Vec<TestCaseId>> = BTreeMap::new();
        for tc in suite.iter() {
            let signature = self
                .identify_flows(tc)
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
                .join("->");
            groups.entry(signature).or_default().push(tc.id);
        }
        groups
    }

    pub fn test_cases_with_flow(&self, suite: &TestSuite, flow: FlowType) -> Vec<TestCaseId> {
        suite
            .iter()
            .filter(|tc| self.identify_flows(tc).contains(&flow))
            .map(|tc| tc.id)
            .collect()
    }
}
