use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::flows::flow_analyzer::FlowAnalyzer;
use crate::flows::flow_model::{FlowCategory, FlowType};
use crate::model::test_case::{TestCase, TestCaseId, TestSuite};

#[derive(Debug, Clone, Serialize)]
pub struct FlowClassification {
    pub test_case_id: TestCaseId,
    pub primary_flow: FlowType,
    pub primary_category: FlowCategory,
    pub secondary_flows: Vec<FlowType>,
    pub all_flows: BTreeSet<FlowType>,
}

impl FlowClassification {
    pub fn is_multi_flow(&self) -> bool {
        self.all_flows.len() > 1
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationSummary {
    pub classifications: BTreeMap<TestCaseId, FlowClassification>,
    pub category_groups: BTreeMap<FlowCategory, Vec<TestCaseId>>,
    pub multi_flow_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FlowClassifier {
    analyzer: FlowAnalyzer,
}

impl FlowClassifier {
    pub fn new(analyzer: FlowAnalyzer) -> Self {
        Self { analyzer }
    }

    pub fn classify(&self, tc: &TestCase) -> FlowClassification {
        let flows = self.analyzer.identify_flows(tc);
        let primary = self.primary_flow(tc, &flows);

        FlowClassification {
            test_case_id: tc.id,
            primary_flow: primary,
            primary_category: primary.category(),
            secondary_flows: flows.iter().copied().filter(|f| *f != primary).collect(),
            all_flows: flows,
        }
    }

    /// Flow with the most keyword hits in the text and steps. Ties go to
    /// the earlier flow.
    fn primary_flow(&self, tc: &TestCase, flows: &BTreeSet<FlowType>) -> FlowType {
        if flows.len() <= 1 {
            return flows.iter().next().copied().unwrap_or(FlowType::General);
        }

        let text = tc.text();
        let mut best = (FlowType::General, 0usize, false);

        for &flow in flows {
            let words = self.analyzer.keywords.keywords(flow);
            let mut score: usize = words.iter().map(|w| text.matches(w.as_str()).count()).sum();

            for step in &tc.steps {
                let description = step.description.as_deref().unwrap_or("").to_lowercase();
                score += words
                    .iter()
                    .filter(|w| step.action_name.contains(w.as_str()) || description.contains(w.as_str()))
                    .count();
            }

            if !best.2 || score > best.1 {
                best = (flow, score, true);
            }
        }
        best.0
    }

    pub fn classify_suite(&self, suite: &TestSuite) -> ClassificationSummary {
        let mut classifications = BTreeMap::new();
        let mut category_groups: BTreeMap<FlowCategory, Vec<TestCaseId>> = BTreeMap::new();

        for tc in suite.iter() {
            let c = self.classify(tc);
            category_groups.entry(c.primary_category).or_default().push(tc.id);
            classifications.insert(tc.id, c);
        }

        let multi_flow_count = classifications.values().filter(|c| c.is_multi_flow()).count();
        ClassificationSummary {
            classifications,
            category_groups,
            multi_flow_count,
        }
    }
}
