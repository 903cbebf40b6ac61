use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::analysis::sequence::{contains_contiguous, contains_subsequence};
use crate::analysis::similarity::SCORE_EPSILON;
use crate::error::{OptimizerError, Result};
use crate::flows::coverage::CoverageAnalyzer;
use crate::flows::flow_model::{CRITICAL_FLOWS, FlowType};
use crate::model::normalize::{normalize_url, step_url};
use crate::model::test_case::{TestCase, TestCaseId, TestSuite};
use crate::optimization::step_coverage::{StepCoverageCheck, StepCoverageTracker};

static CREATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:create|creates|creating|add|adds|adding|new|register|registers|registering)\s+(?:a\s+|an\s+|the\s+|new\s+)?([a-z][a-z_]+)")
        .expect("creator regex")
});

static USER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:use|uses|using|with|login as|log in as|logged in as)\s+(?:a\s+|an\s+|the\s+|existing\s+|created\s+)?([a-z][a-z_]+)")
        .expect("user regex")
});

const ENTITY_STOPWORDS: [&str; 12] = [
    "a", "an", "the", "new", "existing", "valid", "invalid", "data", "test", "case", "and", "to",
];

/// Action patterns whose contiguous presence must survive optimization.
pub const CRITICAL_SEQUENCES: [&[&str]; 4] = [
    &["navigateto", "click", "enter", "click", "verify"],
    &["navigateto", "click", "enter", "click"],
    &["navigateto", "enter", "enter", "click"],
    &["click", "enter", "click", "verify"],
];

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioKeywords {
    #[serde(default = "default_buckets")]
    pub buckets: BTreeMap<String, Vec<String>>,

    #[serde(default = "default_critical_scenarios")]
    pub critical: Vec<String>,

    /// Step data values treated as edge cases
    #[serde(default = "default_edge_values")]
    pub edge_values: Vec<String>,

    /// Negative contexts that must never disappear
    #[serde(default = "default_contexts")]
    pub contexts: BTreeMap<String, Vec<String>>,
}

impl Default for ScenarioKeywords {
    fn default() -> Self {
        Self {
            buckets: default_buckets(),
            critical: default_critical_scenarios(),
            edge_values: default_edge_values(),
            contexts: default_contexts(),
        }
    }
}

fn table(rows: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    rows.iter()
        .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
        .collect()
}

fn default_buckets() -> BTreeMap<String, Vec<String>> {
    table(&[
        ("error_scenario", &["error", "fail", "invalid", "exception"]),
        ("edge_case", &["edge", "boundary", "limit", "extreme"]),
        ("happy_path", &["happy", "success", "valid", "normal"]),
        ("alternative_flow", &["alternative", "different", "other"]),
    ])
}

fn default_critical_scenarios() -> Vec<String> {
    vec!["happy_path".to_string(), "error_scenario".to_string()]
}

fn default_edge_values() -> Vec<String> {
    ["invalid", "empty", "expired", "wrong", "blank", "null"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_contexts() -> BTreeMap<String, Vec<String>> {
    table(&[
        ("invalid_password", &["invalid password", "wrong password", "incorrect password"]),
        ("expired_session", &["expired session", "session expired", "session timeout"]),
        ("unauthorized", &["unauthorized", "access denied", "forbidden", "permission denied"]),
    ])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_min_flow")]
    pub min_flow_coverage: f64,
    #[serde(default = "default_min_step")]
    pub min_step_coverage: f64,
    #[serde(default = "default_ninety")]
    pub element_threshold: f64,
    #[serde(default = "default_ninety")]
    pub data_threshold: f64,
    #[serde(default = "default_critical_flows")]
    pub critical_flows: Vec<FlowType>,
    #[serde(default)]
    pub scenarios: ScenarioKeywords,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_flow_coverage: default_min_flow(),
            min_step_coverage: default_min_step(),
            element_threshold: default_ninety(),
            data_threshold: default_ninety(),
            critical_flows: default_critical_flows(),
            scenarios: ScenarioKeywords::default(),
        }
    }
}

fn default_min_flow() -> f64 { 0.90 }
fn default_min_step() -> f64 { 0.95 }
fn default_ninety() -> f64 { 0.90 }
fn default_critical_flows() -> Vec<FlowType> { CRITICAL_FLOWS.to_vec() }

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct FlowValidation {
    pub original_flows: BTreeSet<FlowType>,
    pub optimized_flows: BTreeSet<FlowType>,
    pub coverage_percentage: f64,
    pub threshold: f64,
    pub lost_flows: BTreeSet<FlowType>,
    pub lost_critical_flows: BTreeSet<FlowType>,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ElementValidation {
    pub original_elements: usize,
    pub optimized_elements: usize,
    pub lost_elements: Vec<String>,
    pub coverage_percentage: f64,
    pub threshold: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioValidation {
    pub original_scenarios: BTreeSet<String>,
    pub optimized_scenarios: BTreeSet<String>,
    pub lost_scenarios: BTreeSet<String>,
    pub lost_critical_scenarios: BTreeSet<String>,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataValidation {
    pub original_data_ids: usize,
    pub optimized_data_ids: usize,
    pub lost_data_ids: Vec<i64>,
    pub original_step_data: usize,
    pub optimized_step_data: usize,
    pub lost_step_data: Vec<String>,
    pub data_id_coverage_percentage: f64,
    pub step_data_coverage_percentage: f64,
    pub threshold: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternLoss {
    pub pattern: Vec<String>,
    pub original_test_cases: Vec<TestCaseId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SequenceValidation {
    pub patterns_checked: usize,

    /// No optimized case contains the pattern in any form
    pub lost: Vec<PatternLoss>,

    /// Present only with other steps interleaved
    pub broken: Vec<PatternLoss>,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrokenDependency {
    pub dependent: TestCaseId,
    pub prerequisite: TestCaseId,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrokenEntity {
    pub entity: String,
    pub creators: Vec<TestCaseId>,
    pub remaining_users: Vec<TestCaseId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyValidation {
    pub explicit_edges: usize,
    pub broken_explicit: Vec<BrokenDependency>,
    pub entities_checked: usize,
    pub broken_implicit: Vec<BrokenEntity>,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionValidation {
    pub original_transitions: usize,
    pub optimized_transitions: usize,
    pub lost_transitions: Vec<(String, String)>,
    pub lost_chains: Vec<(TestCaseId, Vec<String>)>,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataCombinationValidation {
    pub original_combinations: usize,
    pub lost_combinations: Vec<(TestCaseId, Vec<String>)>,
    pub lost_edge_values: Vec<String>,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextValidation {
    pub original_contexts: BTreeSet<String>,
    pub optimized_contexts: BTreeSet<String>,
    pub lost_contexts: BTreeSet<String>,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageValidationResult {
    pub overall_valid: bool,
    pub step_coverage: StepCoverageCheck,
    pub flow_coverage: FlowValidation,
    pub element_coverage: ElementValidation,
    pub scenario_coverage: ScenarioValidation,
    pub data_coverage: DataValidation,
    pub sequence_preservation: SequenceValidation,
    pub dependency_preservation: DependencyValidation,
    pub transition_preservation: TransitionValidation,
    pub data_combinations: DataCombinationValidation,
    pub scenario_context: ContextValidation,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemovalCheck {
    pub test_case_id: TestCaseId,
    pub can_remove: bool,
    pub coverage_before: f64,
    pub coverage_after: f64,
    pub critical_flows_lost: Vec<FlowType>,
    pub reason: String,
}

/// Merged id -> the ids it replaced.
pub type MergeLineage = BTreeMap<TestCaseId, Vec<TestCaseId>>;

fn percent(retained: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        retained as f64 / total as f64 * 100.0
    }
}

// ============================================================================
// Validator
// ============================================================================

#[derive(Debug, Clone)]
pub struct CoverageValidator {
    pub config: ValidationConfig,
    coverage: CoverageAnalyzer,
    tracker: StepCoverageTracker,
}

impl Default for CoverageValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

impl CoverageValidator {
    pub fn new(config: ValidationConfig) -> Self {
        let coverage = CoverageAnalyzer::default().with_critical_flows(config.critical_flows.clone());
        Self {
            config,
            coverage,
            tracker: StepCoverageTracker,
        }
    }

    pub fn with_coverage(mut self, coverage: CoverageAnalyzer) -> Self {
        self.coverage = coverage.with_critical_flows(self.config.critical_flows.clone());
        self
    }

    pub fn validate_step_coverage(&self, original: &TestSuite, optimized: &TestSuite) -> StepCoverageCheck {
        self.tracker
            .validate_maintained(original, optimized, self.config.min_step_coverage)
    }

    /// Relative flow coverage plus every originally covered critical flow.
    pub fn validate_flow_coverage(&self, original: &TestSuite, optimized: &TestSuite) -> FlowValidation {
        let original_flows = self.coverage.flows_of(original);
        let relative = self.coverage.flow_coverage_against(&original_flows, optimized);
        let critical_before = self.coverage.critical_flow_coverage(original).covered();
        let critical_after = self.coverage.critical_flow_coverage(optimized).covered();
        let lost_critical: BTreeSet<FlowType> = critical_before.difference(&critical_after).copied().collect();

        let threshold = self.config.min_flow_coverage * 100.0;
        FlowValidation {
            passed: relative.coverage_percentage + SCORE_EPSILON >= threshold && lost_critical.is_empty(),
            optimized_flows: self.coverage.flows_of(optimized),
            coverage_percentage: relative.coverage_percentage,
            threshold,
            lost_flows: relative.uncovered_flows,
            lost_critical_flows: lost_critical,
            original_flows,
        }
    }

    pub fn validate_element_coverage(&self, original: &TestSuite, optimized: &TestSuite) -> ElementValidation {
        let collect = |suite: &TestSuite| -> BTreeSet<String> {
            suite
                .iter()
                .flat_map(|tc| tc.steps.iter().flat_map(|s| s.element_identifiers()))
                .filter(|e| !e.is_empty())
                .collect()
        };
        let before = collect(original);
        let after = collect(optimized);
        let lost: Vec<String> = before.difference(&after).cloned().collect();
        let coverage = percent(before.len() - lost.len(), before.len());
        let threshold = self.config.element_threshold * 100.0;

        ElementValidation {
            original_elements: before.len(),
            optimized_elements: after.len(),
            lost_elements: lost,
            coverage_percentage: coverage,
            threshold,
            passed: coverage + SCORE_EPSILON >= threshold,
        }
    }

    /// Scenario buckets of one case; a case matching nothing is a happy path.
    pub fn scenarios_of(&self, tc: &TestCase) -> BTreeSet<String> {
        let text = tc.text();
        let mut found: BTreeSet<String> = self
            .config
            .scenarios
            .buckets
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| text.contains(k.as_str())))
            .map(|(bucket, _)| bucket.clone())
            .collect();
        if found.is_empty() {
            found.insert("happy_path".to_string());
        }
        found
    }

    pub fn validate_scenario_coverage(&self, original: &TestSuite, optimized: &TestSuite) -> ScenarioValidation {
        let before: BTreeSet<String> = original.iter().flat_map(|tc| self.scenarios_of(tc)).collect();
        let after: BTreeSet<String> = optimized.iter().flat_map(|tc| self.scenarios_of(tc)).collect();
        let lost: BTreeSet<String> = before.difference(&after).cloned().collect();
        let lost_critical: BTreeSet<String> = lost
            .iter()
            .filter(|s| self.config.scenarios.critical.contains(s))
            .cloned()
            .collect();

        ScenarioValidation {
            passed: lost_critical.is_empty(),
            original_scenarios: before,
            optimized_scenarios: after,
            lost_scenarios: lost,
            lost_critical_scenarios: lost_critical,
        }
    }

    pub fn validate_data_coverage(&self, original: &TestSuite, optimized: &TestSuite) -> DataValidation {
        let ids = |suite: &TestSuite| -> BTreeSet<i64> { suite.iter().filter_map(|tc| tc.test_data_id).collect() };
        let values = |suite: &TestSuite| -> BTreeSet<String> {
            suite
                .iter()
                .flat_map(|tc| step_values(tc).into_iter())
                .collect()
        };

        let ids_before = ids(original);
        let ids_after = ids(optimized);
        let values_before = values(original);
        let values_after = values(optimized);

        let lost_ids: Vec<i64> = ids_before.difference(&ids_after).copied().collect();
        let lost_values: Vec<String> = values_before.difference(&values_after).cloned().collect();
        let id_coverage = percent(ids_before.len() - lost_ids.len(), ids_before.len());
        let value_coverage = percent(values_before.len() - lost_values.len(), values_before.len());
        let threshold = self.config.data_threshold * 100.0;

        DataValidation {
            original_data_ids: ids_before.len(),
            optimized_data_ids: ids_after.len(),
            lost_data_ids: lost_ids,
            original_step_data: values_before.len(),
            optimized_step_data: values_after.len(),
            lost_step_data: lost_values,
            data_id_coverage_percentage: id_coverage,
            step_data_coverage_percentage: value_coverage,
            threshold,
            passed: id_coverage + SCORE_EPSILON >= threshold && value_coverage + SCORE_EPSILON >= threshold,
        }
    }

    pub fn validate_sequence_preservation(&self, original: &TestSuite, optimized: &TestSuite) -> SequenceValidation {
        let optimized_sequences: Vec<Vec<String>> = optimized.iter().map(|tc| tc.action_sequence()).collect();
        let mut lost = Vec::new();
        let mut broken = Vec::new();
        let mut checked = 0;

        for pattern in CRITICAL_SEQUENCES {
            let pattern: Vec<String> = pattern.iter().map(|s| s.to_string()).collect();
            let holders: Vec<TestCaseId> = original
                .iter()
                .filter(|tc| contains_contiguous(&tc.action_sequence(), &pattern))
                .map(|tc| tc.id)
                .collect();
            if holders.is_empty() {
                continue;
            }
            checked += 1;

            if optimized_sequences.iter().any(|seq| contains_contiguous(seq, &pattern)) {
                continue;
            }
            let entry = PatternLoss {
                pattern: pattern.clone(),
                original_test_cases: holders,
            };
            if optimized_sequences.iter().any(|seq| contains_subsequence(seq, &pattern)) {
                broken.push(entry);
            } else {
                lost.push(entry);
            }
        }

        SequenceValidation {
            patterns_checked: checked,
            passed: lost.is_empty() && broken.is_empty(),
            lost,
            broken,
        }
    }

    pub fn validate_dependency_preservation(
        &self,
        original: &TestSuite,
        optimized: &TestSuite,
        lineage: &MergeLineage,
    ) -> DependencyValidation {
        let resolve = |id: TestCaseId| resolve_id(id, optimized, lineage);

        let mut explicit_edges = 0;
        let mut broken_explicit = Vec::new();
        for tc in original.iter() {
            let Some(prereq) = tc.prerequisite_case else { continue };
            if !original.contains(prereq) {
                continue;
            }
            explicit_edges += 1;
            if resolve(tc.id).is_none() || resolve(prereq).is_some() {
                continue;
            }
            broken_explicit.push(BrokenDependency {
                dependent: tc.id,
                prerequisite: prereq,
            });
        }

        let creators = entity_index(original, &CREATOR);
        let users = entity_index(original, &USER);
        let mut broken_implicit = Vec::new();
        let mut entities_checked = 0;
        for (entity, creator_ids) in &creators {
            let Some(user_ids) = users.get(entity) else { continue };
            entities_checked += 1;

            if creator_ids.iter().any(|&id| resolve(id).is_some()) {
                continue;
            }
            let remaining: Vec<TestCaseId> = user_ids
                .iter()
                .copied()
                .filter(|&id| resolve(id).is_some())
                .collect();
            if !remaining.is_empty() {
                broken_implicit.push(BrokenEntity {
                    entity: entity.clone(),
                    creators: creator_ids.clone(),
                    remaining_users: remaining,
                });
            }
        }

        DependencyValidation {
            explicit_edges,
            passed: broken_explicit.is_empty() && broken_implicit.is_empty(),
            broken_explicit,
            entities_checked,
            broken_implicit,
        }
    }

    pub fn validate_transition_preservation(&self, original: &TestSuite, optimized: &TestSuite) -> TransitionValidation {
        let before = self.transitions(original);
        let after = self.transitions(optimized);
        let lost_transitions: Vec<(String, String)> = before.difference(&after).cloned().collect();

        let optimized_chains: Vec<Vec<String>> = optimized.iter().map(page_chain).collect();
        let lost_chains: Vec<(TestCaseId, Vec<String>)> = original
            .iter()
            .map(|tc| (tc.id, page_chain(tc)))
            .filter(|(_, chain)| chain.len() >= 3)
            .filter(|(_, chain)| !optimized_chains.iter().any(|other| contains_contiguous(other, chain)))
            .collect();

        TransitionValidation {
            original_transitions: before.len(),
            optimized_transitions: after.len(),
            passed: lost_transitions.is_empty() && lost_chains.is_empty(),
            lost_transitions,
            lost_chains,
        }
    }

    pub fn validate_data_combinations(&self, original: &TestSuite, optimized: &TestSuite) -> DataCombinationValidation {
        let optimized_values: Vec<BTreeSet<String>> = optimized.iter().map(step_values).collect();

        let combos: Vec<(TestCaseId, BTreeSet<String>)> = original
            .iter()
            .map(|tc| (tc.id, step_values(tc)))
            .filter(|(_, values)| values.len() >= 2)
            .collect();
        let lost_combinations: Vec<(TestCaseId, Vec<String>)> = combos
            .iter()
            .filter(|(_, combo)| !optimized_values.iter().any(|vals| combo.is_subset(vals)))
            .map(|(id, combo)| (*id, combo.iter().cloned().collect()))
            .collect();

        let is_edge = |value: &String| {
            self.config
                .scenarios
                .edge_values
                .iter()
                .any(|k| value.contains(k.as_str()))
        };
        let all_after: BTreeSet<&String> = optimized_values.iter().flatten().collect();
        let lost_edge_values: Vec<String> = original
            .iter()
            .flat_map(step_values)
            .filter(is_edge)
            .filter(|v| !all_after.contains(&v))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        DataCombinationValidation {
            original_combinations: combos.len(),
            passed: lost_combinations.is_empty() && lost_edge_values.is_empty(),
            lost_combinations,
            lost_edge_values,
        }
    }

    pub fn contexts_of(&self, tc: &TestCase) -> BTreeSet<String> {
        let mut text = tc.text();
        for step in &tc.steps {
            text.push(' ');
            text.push_str(&step.action.to_lowercase());
            for extra in [step.description.as_deref(), step.test_data.as_deref()].into_iter().flatten() {
                text.push(' ');
                text.push_str(&extra.to_lowercase());
            }
        }
        let normalized = text.replace('_', " ");

        self.config
            .scenarios
            .contexts
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| normalized.contains(k.as_str())))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn validate_scenario_context(&self, original: &TestSuite, optimized: &TestSuite) -> ContextValidation {
        let before: BTreeSet<String> = original.iter().flat_map(|tc| self.contexts_of(tc)).collect();
        let after: BTreeSet<String> = optimized.iter().flat_map(|tc| self.contexts_of(tc)).collect();
        let lost: BTreeSet<String> = before.difference(&after).cloned().collect();
        ContextValidation {
            passed: lost.is_empty(),
            original_contexts: before,
            optimized_contexts: after,
            lost_contexts: lost,
        }
    }

    /// Whether one case could go without dropping flow coverage.
    pub fn validate_test_case_removal(&self, suite: &TestSuite, id: TestCaseId) -> Result<RemovalCheck> {
        if !suite.contains(id) {
            return Err(OptimizerError::unknown(id, "removal check"));
        }
        let without = suite.without(&[id]);
        let baseline = self.coverage.flows_of(suite);
        let after = self.coverage.flow_coverage_against(&baseline, &without);
        let critical_before = self.coverage.critical_flow_coverage(suite).covered();
        let critical_after = self.coverage.critical_flow_coverage(&without).covered();
        let critical_flows_lost: Vec<FlowType> = critical_before.difference(&critical_after).copied().collect();

        let can_remove = after.coverage_percentage + SCORE_EPSILON >= self.config.min_flow_coverage * 100.0
            && critical_flows_lost.is_empty();
        Ok(RemovalCheck {
            test_case_id: id,
            can_remove,
            coverage_before: if baseline.is_empty() { 0.0 } else { 100.0 },
            coverage_after: after.coverage_percentage,
            critical_flows_lost,
            reason: if can_remove {
                "Can be safely removed".to_string()
            } else {
                "Removal would impact coverage".to_string()
            },
        })
    }

    pub fn validate(&self, original: &TestSuite, optimized: &TestSuite) -> CoverageValidationResult {
        self.validate_with_lineage(original, optimized, &MergeLineage::new())
    }

    /// Run every check. Every failing hard check contributes an error.
    pub fn validate_with_lineage(
        &self,
        original: &TestSuite,
        optimized: &TestSuite,
        lineage: &MergeLineage,
    ) -> CoverageValidationResult {
        let step = self.validate_step_coverage(original, optimized);
        let flow = self.validate_flow_coverage(original, optimized);
        let element = self.validate_element_coverage(original, optimized);
        let scenario = self.validate_scenario_coverage(original, optimized);
        let data = self.validate_data_coverage(original, optimized);
        let sequence = self.validate_sequence_preservation(original, optimized);
        let dependency = self.validate_dependency_preservation(original, optimized, lineage);
        let transition = self.validate_transition_preservation(original, optimized);
        let combinations = self.validate_data_combinations(original, optimized);
        let context = self.validate_scenario_context(original, optimized);

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if !step.is_maintained {
            errors.push(format!(
                "Step coverage dropped to {:.1}% (threshold: {:.1}%)",
                step.coverage_percentage, step.threshold
            ));
        }
        if !flow.passed {
            if flow.coverage_percentage + SCORE_EPSILON < flow.threshold {
                errors.push(format!(
                    "Flow coverage dropped to {:.1}% (threshold: {:.1}%)",
                    flow.coverage_percentage, flow.threshold
                ));
            }
            if !flow.lost_critical_flows.is_empty() {
                errors.push(format!("Lost critical flows: {}", join_flows(&flow.lost_critical_flows)));
            }
        }
        if !scenario.passed {
            errors.push(format!(
                "Lost critical scenarios: {}",
                scenario.lost_critical_scenarios.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        if !sequence.passed {
            errors.push(format!(
                "Critical step sequences: {} lost, {} broken",
                sequence.lost.len(),
                sequence.broken.len()
            ));
        }
        if !dependency.passed {
            errors.push(format!(
                "Broken dependencies: {} explicit, {} implicit",
                dependency.broken_explicit.len(),
                dependency.broken_implicit.len()
            ));
        }
        if !transition.passed {
            errors.push(format!(
                "Lost page transitions: {} transitions, {} chains",
                transition.lost_transitions.len(),
                transition.lost_chains.len()
            ));
        }
        if !context.passed {
            errors.push(format!(
                "Lost scenario contexts: {}",
                context.lost_contexts.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }

        if !element.passed {
            warnings.push(format!(
                "Element coverage: {} elements lost (coverage: {:.1}%, threshold: {:.1}%)",
                element.lost_elements.len(),
                element.coverage_percentage,
                element.threshold
            ));
        }
        if !data.passed {
            warnings.push(format!(
                "Lost test data: {} data IDs, {} step data values (step data coverage: {:.1}%, threshold: {:.1}%)",
                data.lost_data_ids.len(),
                data.lost_step_data.len(),
                data.step_data_coverage_percentage,
                data.threshold
            ));
        }
        if !combinations.passed {
            warnings.push(format!(
                "Data combinations: {} combinations lost, {} edge-case values lost",
                combinations.lost_combinations.len(),
                combinations.lost_edge_values.len()
            ));
        }

        let overall_valid = step.is_maintained
            && flow.passed
            && scenario.passed
            && sequence.passed
            && dependency.passed
            && transition.passed
            && context.passed;

        tracing::info!(
            overall_valid,
            errors = errors.len(),
            warnings = warnings.len(),
            "comprehensive validation complete"
        );

        CoverageValidationResult {
            overall_valid,
            step_coverage: step,
            flow_coverage: flow,
            element_coverage: element,
            scenario_coverage: scenario,
            data_coverage: data,
            sequence_preservation: sequence,
            dependency_preservation: dependency,
            transition_preservation: transition,
            data_combinations: combinations,
            scenario_context: context,
            warnings,
            errors,
        }
    }

    fn transitions(&self, suite: &TestSuite) -> BTreeSet<(String, String)> {
        suite
            .iter()
            .flat_map(|tc| self.coverage.analyzer().page_transitions(tc))
            .map(|t| (normalize_url(&t.from), normalize_url(&t.to)))
            .collect()
    }

    pub fn report_text(&self, result: &CoverageValidationResult) -> String {
        let status = |passed: bool| if passed { "\u{2713} PASSED" } else { "\u{2717} FAILED" };
        let rule = "=".repeat(80);
        let mut out = Vec::new();

        out.push(rule.clone());
        out.push("COMPREHENSIVE COVERAGE VALIDATION REPORT".to_string());
        out.push(rule.clone());
        out.push(String::new());
        out.push(format!("Overall Validation: {}", status(result.overall_valid)));
        out.push(String::new());

        let step = &result.step_coverage;
        out.push("Step Coverage:".to_string());
        out.push(format!("  Original Steps: {}", step.original_steps));
        out.push(format!("  Retained Steps: {}", step.retained_steps));
        out.push(format!(
            "  Coverage: {:.1}% (Threshold: {:.1}%)",
            step.coverage_percentage, step.threshold
        ));
        out.push(format!("  Status: {}", status(step.is_maintained)));
        if step.lost_steps > 0 {
            out.push(format!("  \u{26a0} Lost Steps: {}", step.lost_steps));
        }
        out.push(String::new());

        let flow = &result.flow_coverage;
        out.push("Flow Coverage:".to_string());
        out.push(format!("  Original Flows: {}", flow.original_flows.len()));
        out.push(format!("  Optimized Flows: {}", flow.optimized_flows.len()));
        out.push(format!(
            "  Coverage: {:.1}% (Threshold: {:.1}%)",
            flow.coverage_percentage, flow.threshold
        ));
        out.push(format!("  Status: {}", status(flow.passed)));
        if !flow.lost_critical_flows.is_empty() {
            out.push(format!("  \u{2717} Lost Critical Flows: {}", join_flows(&flow.lost_critical_flows)));
        }
        out.push(String::new());

        let element = &result.element_coverage;
        out.push("Element Coverage:".to_string());
        out.push(format!("  Original Elements: {}", element.original_elements));
        out.push(format!("  Optimized Elements: {}", element.optimized_elements));
        out.push(format!("  Coverage: {:.1}%", element.coverage_percentage));
        out.push(format!("  Status: {}", status(element.passed)));
        out.push(String::new());

        let scenario = &result.scenario_coverage;
        out.push("Scenario Coverage:".to_string());
        out.push(format!("  Original Scenarios: {}", scenario.original_scenarios.len()));
        out.push(format!("  Optimized Scenarios: {}", scenario.optimized_scenarios.len()));
        out.push(format!("  Status: {}", status(scenario.passed)));
        out.push(String::new());

        let data = &result.data_coverage;
        out.push("Data Coverage:".to_string());
        out.push(format!("  Data ID Coverage: {:.1}%", data.data_id_coverage_percentage));
        out.push(format!("  Step Data Coverage: {:.1}%", data.step_data_coverage_percentage));
        out.push(format!("  Status: {}", status(data.passed)));
        out.push(String::new());

        out.push("Behavioural Preservation:".to_string());
        out.push(format!("  Step Sequences: {}", status(result.sequence_preservation.passed)));
        out.push(format!("  Dependencies: {}", status(result.dependency_preservation.passed)));
        out.push(format!("  Page Transitions: {}", status(result.transition_preservation.passed)));
        out.push(format!("  Data Combinations: {}", status(result.data_combinations.passed)));
        out.push(format!("  Scenario Contexts: {}", status(result.scenario_context.passed)));
        out.push(String::new());

        if !result.warnings.is_empty() {
            out.push("Warnings:".to_string());
            for warning in &result.warnings {
                out.push(format!("  \u{26a0} {}", warning));
            }
            out.push(String::new());
        }
        if !result.errors.is_empty() {
            out.push("Errors:".to_string());
            for error in &result.errors {
                out.push(format!("  \u{2717} {}", error));
            }
            out.push(String::new());
        }

        out.push(rule);
        out.join("\n")
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn join_flows(flows: &BTreeSet<FlowType>) -> String {
    flows.iter().map(|f| f.as_str()).collect::<Vec<_>>().join(", ")
}

/// Lowercased, trimmed, non-empty step data values of a case.
fn step_values(tc: &TestCase) -> BTreeSet<String> {
    tc.steps
        .iter()
        .filter_map(|s| s.test_data.as_deref())
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Normalized navigation URLs in step order, consecutive repeats collapsed.
fn page_chain(tc: &TestCase) -> Vec<String> {
    let mut chain: Vec<String> = Vec::new();
    for step in tc.ordered_steps() {
        if !step.is_navigation() {
            continue;
        }
        if let Some(url) = step_url(step) {
            let url = normalize_url(&url);
            if chain.last() != Some(&url) {
                chain.push(url);
            }
        }
    }
    chain
}

/// Where an original id lives in the optimized suite, following merges.
fn resolve_id(id: TestCaseId, optimized: &TestSuite, lineage: &MergeLineage) -> Option<TestCaseId> {
    let mut current = id;
    let mut hops = 0;
    loop {
        if optimized.contains(current) {
            return Some(current);
        }
        let next = lineage
            .iter()
            .find(|(_, sources)| sources.contains(&current))
            .map(|(merged, _)| *merged)?;
        current = next;
        hops += 1;
        if hops > lineage.len() {
            return None;
        }
    }
}

fn entity_index(suite: &TestSuite, pattern: &Regex) -> BTreeMap<String, Vec<TestCaseId>> {
    let mut index: BTreeMap<String, Vec<TestCaseId>> = BTreeMap::new();
    for tc in suite.iter() {
        let text = tc.text();
        let entities: BTreeSet<String> = pattern
            .captures_iter(&text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim_end_matches('s').to_string())
            .filter(|e| e.len() > 2 && !ENTITY_STOPWORDS.contains(&e.as_str()))
            .collect();
        for entity in entities {
            index.entry(entity).or_default().push(tc.id);
        }
    }
    index
}
