use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::flows::flow_analyzer::FlowAnalyzer;
use crate::flows::flow_model::{CRITICAL_FLOWS, FlowType};
use crate::flows::graph::FlowGraph;
use crate::model::test_case::{TestCase, TestCaseId, TestSuite};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowCoverage {
    pub total_unique_flows: usize,
    pub covered_flows: BTreeSet<FlowType>,
    pub uncovered_flows: BTreeSet<FlowType>,
    pub coverage_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalFlowStatus {
    pub covered: bool,
    pub test_case_ids: Vec<TestCaseId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalFlowCoverage {
    pub coverage: BTreeMap<FlowType, CriticalFlowStatus>,
    pub all_critical_covered: bool,
}

impl CriticalFlowCoverage {
    pub fn covered(&self) -> BTreeSet<FlowType> {
        self.coverage
            .iter()
            .filter(|(_, s)| s.covered)
            .map(|(f, _)| *f)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageMatrix {
    pub flows: Vec<FlowType>,
    pub rows: BTreeMap<TestCaseId, BTreeMap<FlowType, bool>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoverageGap {
    IsolatedPages { pages: Vec<String>, severity: GapSeverity },
    DeadEnds { pages: Vec<String>, severity: GapSeverity },
    MissingCriticalFlow { flow: FlowType, severity: GapSeverity },
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub flow_coverage: FlowCoverage,
    pub critical_flow_coverage: CriticalFlowCoverage,
    pub coverage_matrix: CoverageMatrix,
    pub gaps: Vec<CoverageGap>,
    pub test_case_scores: BTreeMap<TestCaseId, f64>,
}

#[derive(Debug, Clone)]
pub struct CoverageAnalyzer {
    analyzer: FlowAnalyzer,
    critical: Vec<FlowType>,
}

impl Default for CoverageAnalyzer {
    fn default() -> Self {
        Self::new(FlowAnalyzer::default())
    }
}

impl CoverageAnalyzer {
    pub fn new(analyzer: FlowAnalyzer) -> Self {
        Self {
            analyzer,
            critical: CRITICAL_FLOWS.to_vec(),
        }
    }

    pub fn with_critical_flows(mut self, critical: Vec<FlowType>) -> Self {
        self.critical = critical;
        self
    }

    pub fn analyzer(&self) -> &FlowAnalyzer {
        &self.analyzer
    }

    pub fn critical_flows(&self) -> &[FlowType] {
        &self.critical
    }

    pub fn flows_of(&self, suite: &TestSuite) -> BTreeSet<FlowType> {
        suite.iter().flat_map(|tc| self.analyzer.identify_flows(tc)).collect()
    }

    /// Coverage of a set measured against itself: 100% unless empty.
    pub fn flow_coverage(&self, suite: &TestSuite) -> FlowCoverage {
        let flows = self.flows_of(suite);
        FlowCoverage {
            total_unique_flows: flows.len(),
            coverage_percentage: if flows.is_empty() { 0.0 } else { 100.0 },
            covered_flows: flows,
            uncovered_flows: BTreeSet::new(),
        }
    }

    /// Share of the baseline's flows still exercised by `suite`.
    pub fn flow_coverage_against(&self, baseline: &BTreeSet<FlowType>, suite: &TestSuite) -> FlowCoverage {
        let current = self.flows_of(suite);
        let covered: BTreeSet<FlowType> = baseline.intersection(&current).copied().collect();
        let uncovered: BTreeSet<FlowType> = baseline.difference(&current).copied().collect();
        FlowCoverage {
            total_unique_flows: baseline.len(),
            coverage_percentage: if baseline.is_empty() {
                100.0
            } else {
                covered.len() as f64 / baseline.len() as f64 * 100.0
            },
            covered_flows: covered,
            uncovered_flows: uncovered,
        }
    }

    pub fn critical_flow_coverage(&self, suite: &TestSuite) -> CriticalFlowCoverage {
        let mut coverage = BTreeMap::new();
        for &flow in &self.critical {
            let ids = self.analyzer.test_cases_with_flow(suite, flow);
            coverage.insert(
                flow,
                CriticalFlowStatus {
                    covered: !ids.is_empty(),
                    test_case_ids: ids,
                },
            );
        }
        let all_critical_covered = coverage.values().all(|s| s.covered);
        CriticalFlowCoverage {
            coverage,
            all_critical_covered,
        }
    }

    pub fn coverage_matrix(&self, suite: &TestSuite) -> CoverageMatrix {
        let per_case: Vec<(TestCaseId, BTreeSet<FlowType>)> = suite
            .iter()
            .map(|tc| (tc.id, self.analyzer.identify_flows(tc)))
            .collect();
        let flows: BTreeSet<FlowType> = per_case.iter().flat_map(|(_, f)| f.iter().copied()).collect();

        let rows = per_case
            .iter()
            .map(|(id, own)| (*id, flows.iter().map(|f| (*f, own.contains(f))).collect()))
            .collect();

        CoverageMatrix {
            flows: flows.into_iter().collect(),
            rows,
        }
    }

    pub fn coverage_gaps(&self, suite: &TestSuite) -> Vec<CoverageGap> {
        let mut gaps = Vec::new();
        let graph = FlowGraph::build(&self.analyzer, suite);

        let isolated = graph.isolated_pages();
        if !isolated.is_empty() {
            gaps.push(CoverageGap::IsolatedPages {
                pages: isolated,
                severity: GapSeverity::Medium,
            });
        }

        let dead_ends = graph.dead_ends();
        if !dead_ends.is_empty() {
            gaps.push(CoverageGap::DeadEnds {
                pages: dead_ends,
                severity: GapSeverity::Low,
            });
        }

        for (flow, status) in self.critical_flow_coverage(suite).coverage {
            if !status.covered {
                gaps.push(CoverageGap::MissingCriticalFlow {
                    flow,
                    severity: GapSeverity::High,
                });
            }
        }
        gaps
    }

    /// 0..1: flow breadth (cap 5), length (cap 30 steps) and page moves (cap 10).
    pub fn test_case_coverage_score(&self, tc: &TestCase) -> f64 {
        let flows = (self.analyzer.identify_flows(tc).len() as f64 / 5.0).min(1.0);
        let steps = (tc.steps.len() as f64 / 30.0).min(1.0);
        let transitions = (self.analyzer.page_transitions(tc).len() as f64 / 10.0).min(1.0);
        (flows * 0.4 + steps * 0.3 + transitions * 0.3).min(1.0)
    }

    pub fn coverage_report(&self, suite: &TestSuite) -> CoverageReport {
        CoverageReport {
            flow_coverage: self.flow_coverage(suite),
            critical_flow_coverage: self.critical_flow_coverage(suite),
            coverage_matrix: self.coverage_matrix(suite),
            gaps: self.coverage_gaps(suite),
            test_case_scores: suite
                .iter()
                .map(|tc| (tc.id, self.test_case_coverage_score(tc)))
                .collect(),
        }
    }
}
