use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::execution::dependency::{DependencyAnalysis, DependencyAnalyzer};
use crate::execution::priority::{PriorityCalculator, PriorityCategory};
use crate::flows::classifier::{FlowClassification, FlowClassifier};
use crate::flows::flow_model::FlowType;
use crate::model::test_case::{TestCaseId, TestSuite};

const DELETE_WORDS: [&str; 2] = ["delete", "remove"];
const CREATE_WORDS: [&str; 2] = ["create", "add"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_secs: u64,
}

fn default_checkpoint_interval() -> u64 {
    300
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval_secs: default_checkpoint_interval(),
        }
    }
}

// ============================================================================
// Plan types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct TestTiming {
    pub test_case_id: TestCaseId,
    pub duration_ms: u64,
    pub duration_seconds: f64,
    pub cumulative_time_ms: u64,
    pub cumulative_time_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EstimatedTimes {
    pub total_time_ms: u64,
    pub total_time_seconds: f64,
    pub total_time_minutes: f64,
    pub per_test_case: Vec<TestTiming>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Checkpoint {
    pub test_case_id: TestCaseId,

    /// 1-based position in the execution order
    pub position: usize,
    pub cumulative_time_seconds: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackKind {
    DataDeletion,
    DataCreation,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackPoint {
    pub test_case_id: TestCaseId,
    pub position: usize,
    pub kind: RollbackKind,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryPlan {
    pub test_case_ids: Vec<TestCaseId>,
    pub total_count: usize,
    pub estimated_time_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub total_test_cases: usize,
    pub total_execution_time_seconds: f64,
    pub total_execution_time_minutes: f64,
    pub smoke_tests: usize,
    pub high_priority_tests: usize,
    pub medium_priority_tests: usize,
    pub low_priority_tests: usize,
    pub parallel_groups_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub execution_order: Vec<TestCaseId>,
    pub parallel_groups: Vec<Vec<TestCaseId>>,
    pub priorities: BTreeMap<TestCaseId, f64>,
    pub priority_categories: BTreeMap<PriorityCategory, Vec<TestCaseId>>,
    pub estimated_times: EstimatedTimes,
    pub checkpoints: Vec<Checkpoint>,
    pub rollback_points: Vec<RollbackPoint>,
    pub plan_by_category: BTreeMap<PriorityCategory, CategoryPlan>,
    pub dependency_analysis: DependencyAnalysis,
    pub flow_classifications: BTreeMap<TestCaseId, FlowClassification>,
    pub summary: PlanSummary,
}

impl ExecutionPlan {
    pub fn position_of(&self, id: TestCaseId) -> Option<usize> {
        self.execution_order.iter().position(|&other| other == id)
    }

    pub fn category_of(&self, id: TestCaseId) -> Option<PriorityCategory> {
        self.priority_categories
            .iter()
            .find(|(_, ids)| ids.contains(&id))
            .map(|(category, _)| *category)
    }
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ExecutionScheduler {
    pub config: ExecutionConfig,
    dependencies: DependencyAnalyzer,
    priorities: PriorityCalculator,
    classifier: FlowClassifier,
}

impl ExecutionScheduler {
    pub fn new(config: ExecutionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn with_priorities(mut self, priorities: PriorityCalculator) -> Self {
        self.priorities = priorities;
        self
    }

    pub fn with_classifier(mut self, classifier: FlowClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn schedule(&self, suite: &TestSuite) -> ExecutionPlan {
        let dependency_analysis = self.dependencies.analyze(suite);
        let priorities = self.priorities.calculate(suite);
        let priority_categories = self.priorities.categorize(&priorities);
        let flow_classifications = self.classifier.classify_suite(suite).classifications;

        let execution_order = order(&dependency_analysis, &priorities, &priority_categories);
        let parallel_groups = parallel_groups(&dependency_analysis, &execution_order, &flow_classifications);
        let estimated_times = estimate(suite, &execution_order);
        let checkpoints = checkpoints(&estimated_times, self.config.checkpoint_interval_secs);
        let rollback_points = rollback_points(suite, &execution_order, &flow_classifications);

        let plan_by_category = priority_categories
            .iter()
            .map(|(category, ids)| {
                let seconds = ids
                    .iter()
                    .filter_map(|id| suite.get(*id))
                    .map(|tc| tc.duration.unwrap_or(0) as f64 / 1000.0)
                    .sum();
                let plan = CategoryPlan {
                    test_case_ids: ids.clone(),
                    total_count: ids.len(),
                    estimated_time_seconds: seconds,
                };
                (*category, plan)
            })
            .collect();

        let count = |c: PriorityCategory| priority_categories.get(&c).map(Vec::len).unwrap_or(0);
        let summary = PlanSummary {
            total_test_cases: suite.len(),
            total_execution_time_seconds: estimated_times.total_time_seconds,
            total_execution_time_minutes: estimated_times.total_time_minutes,
            smoke_tests: count(PriorityCategory::Smoke),
            high_priority_tests: count(PriorityCategory::High),
            medium_priority_tests: count(PriorityCategory::Medium),
            low_priority_tests: count(PriorityCategory::Low),
            parallel_groups_count: parallel_groups.len(),
        };

        tracing::debug!(
            tests = suite.len(),
            groups = parallel_groups.len(),
            checkpoints = checkpoints.len(),
            "execution plan built"
        );

        ExecutionPlan {
            execution_order,
            parallel_groups,
            priorities,
            priority_categories,
            estimated_times,
            checkpoints,
            rollback_points,
            plan_by_category,
            dependency_analysis,
            flow_classifications,
            summary,
        }
    }
}

// ============================================================================
// Plan building blocks
// ============================================================================

/// Categories from smoke to low, best score first inside each. A test is
/// admitted only once all of its prerequisites are placed; whatever is
/// left follows in dependency order.
fn order(
    analysis: &DependencyAnalysis,
    priorities: &BTreeMap<TestCaseId, f64>,
    categories: &BTreeMap<PriorityCategory, Vec<TestCaseId>>,
) -> Vec<TestCaseId> {
    let dependency_order = analysis.execution_order();
    let mut placed: HashSet<TestCaseId> = HashSet::new();
    let mut result = Vec::with_capacity(dependency_order.len());

    for category in PriorityCategory::ALL {
        let Some(ids) = categories.get(&category) else { continue };

        let mut ready: Vec<TestCaseId> = ids
            .iter()
            .copied()
            .filter(|id| !placed.contains(id))
            .filter(|id| analysis.dependencies_of(*id).iter().all(|dep| placed.contains(dep)))
            .collect();

        ready.sort_by(|a, b| {
            let sa = priorities.get(a).copied().unwrap_or(0.0);
            let sb = priorities.get(b).copied().unwrap_or(0.0);
            sb.total_cmp(&sa).then(a.cmp(b))
        });

        for id in ready {
            placed.insert(id);
            result.push(id);
        }
    }

    for id in dependency_order {
        if placed.insert(id) {
            result.push(id);
        }
    }
    result
}

/// One group per (dependency level, primary flow). Levels ascend; flow
/// groups inside a level follow first appearance in the order.
fn parallel_groups(
    analysis: &DependencyAnalysis,
    order: &[TestCaseId],
    classifications: &BTreeMap<TestCaseId, FlowClassification>,
) -> Vec<Vec<TestCaseId>> {
    let levels = analysis.levels();
    let max_level = levels.values().copied().max().unwrap_or(0);
    let mut groups = Vec::new();

    for level in 0..=max_level {
        let mut by_flow: Vec<(FlowType, Vec<TestCaseId>)> = Vec::new();

        for &id in order {
            if levels.get(&id).copied().unwrap_or(0) != level {
                continue;
            }
            let flow = classifications
                .get(&id)
                .map(|c| c.primary_flow)
                .unwrap_or(FlowType::General);
            match by_flow.iter_mut().find(|(f, _)| *f == flow) {
                Some((_, ids)) => ids.push(id),
                None => by_flow.push((flow, vec![id])),
            }
        }

        groups.extend(by_flow.into_iter().map(|(_, ids)| ids));
    }
    groups
}

fn estimate(suite: &TestSuite, order: &[TestCaseId]) -> EstimatedTimes {
    let mut total: u64 = 0;
    let mut per_test_case = Vec::with_capacity(order.len());

    for &id in order {
        let Some(tc) = suite.get(id) else { continue };
        let duration = tc.duration.unwrap_or(0);
        total += duration;
        per_test_case.push(TestTiming {
            test_case_id: id,
            duration_ms: duration,
            duration_seconds: duration as f64 / 1000.0,
            cumulative_time_ms: total,
            cumulative_time_seconds: total as f64 / 1000.0,
        });
    }

    EstimatedTimes {
        total_time_ms: total,
        total_time_seconds: total as f64 / 1000.0,
        total_time_minutes: total as f64 / 60_000.0,
        per_test_case,
    }
}

/// At most one checkpoint per crossing of an interval boundary.
fn checkpoints(times: &EstimatedTimes, interval_secs: u64) -> Vec<Checkpoint> {
    let mut result: Vec<Checkpoint> = Vec::new();
    if interval_secs == 0 {
        return result;
    }
    let interval_ms = interval_secs * 1000;

    for (i, timing) in times.per_test_case.iter().enumerate() {
        let crossed = (timing.cumulative_time_ms / interval_ms) as usize;
        if crossed > result.len() {
            result.push(Checkpoint {
                test_case_id: timing.test_case_id,
                position: i + 1,
                cumulative_time_seconds: timing.cumulative_time_seconds,
                reason: format!("Checkpoint after {} seconds", crossed as u64 * interval_secs),
            });
        }
    }
    result
}

/// CRUD cases whose steps delete or create data.
fn rollback_points(
    suite: &TestSuite,
    order: &[TestCaseId],
    classifications: &BTreeMap<TestCaseId, FlowClassification>,
) -> Vec<RollbackPoint> {
    let mut points = Vec::new();

    for (i, &id) in order.iter().enumerate() {
        let Some(tc) = suite.get(id) else { continue };
        let is_crud = classifications
            .get(&id)
            .is_some_and(|c| c.all_flows.contains(&FlowType::Crud));
        if !is_crud {
            continue;
        }

        let touches = |words: &[&str]| {
            tc.steps.iter().any(|s| {
                let action = s.action.to_lowercase();
                words.iter().any(|w| action.contains(w))
            })
        };

        let point = if touches(&DELETE_WORDS) {
            Some((
                RollbackKind::DataDeletion,
                format!("Test case {id} performs data deletion - rollback recommended before this point"),
            ))
        } else if touches(&CREATE_WORDS) {
            Some((
                RollbackKind::DataCreation,
                format!("Test case {id} creates new data - consider rollback point"),
            ))
        } else {
            None
        };

        if let Some((kind, description)) = point {
            points.push(RollbackPoint {
                test_case_id: id,
                position: i + 1,
                kind,
                description,
            });
        }
    }
    points
}
