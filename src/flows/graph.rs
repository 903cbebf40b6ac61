use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::flows::flow_analyzer::FlowAnalyzer;
use crate::model::normalize::{normalize_url, step_url};
use crate::model::test_case::{TestCaseId, TestSuite};

#[derive(Debug, Clone, Default, Serialize)]
pub struct EdgeInfo {
    pub weight: usize,
    pub test_cases: BTreeSet<TestCaseId>,
}

/// Directed page graph: nodes are normalized URLs, edges are observed moves.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    pub pages: BTreeMap<String, BTreeSet<TestCaseId>>,
    pub edges: BTreeMap<(String, String), EdgeInfo>,
}

impl FlowGraph {
    pub fn build(analyzer: &FlowAnalyzer, suite: &TestSuite) -> Self {
        let mut graph = FlowGraph::default();

        for tc in suite.iter() {
            for step in tc.steps.iter().filter(|s| s.is_navigation()) {
                if let Some(url) = step_url(step) {
                    graph.pages.entry(normalize_url(&url)).or_default().insert(tc.id);
                }
            }

            for t in analyzer.page_transitions(tc) {
                let edge = graph
                    .edges
                    .entry((normalize_url(&t.from), normalize_url(&t.to)))
                    .or_default();
                edge.weight += 1;
                edge.test_cases.insert(tc.id);
            }
        }
        graph
    }

    /// Pages with no incoming or outgoing edge.
    pub fn isolated_pages(&self) -> Vec<String> {
        self.pages
            .keys()
            .filter(|page| !self.edges.keys().any(|(from, to)| from == *page || to == *page))
            .cloned()
            .collect()
    }

    /// Pages reached by an edge that never lead anywhere.
    pub fn dead_ends(&self) -> Vec<String> {
        self.pages
            .keys()
            .filter(|page| {
                let incoming = self.edges.keys().any(|(_, to)| to == *page);
                let outgoing = self.edges.keys().any(|(from, _)| from == *page);
                incoming && !outgoing
            })
            .cloned()
            .collect()
    }
}
