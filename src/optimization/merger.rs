use std::collections::{BTreeSet, HashSet};
use std::fmt;

use md5::{Digest, Md5};
use serde::Serialize;

use crate::analysis::matrix::SimilarityMatrix;
use crate::analysis::prefix::{find_flexible_merge_points, find_merge_points};
use crate::analysis::role::{RoleClassifier, RoleLabel};
use crate::analysis::similarity::SCORE_EPSILON;
use crate::analysis::uniqueness::StepUniquenessAnalyzer;
use crate::analysis::website::{UNKNOWN_WEBSITE, WebsiteGrouper};
use crate::error::{OptimizerError, Result};
use crate::flows::flow_analyzer::FlowAnalyzer;
use crate::flows::flow_model::FlowType;
use crate::model::normalize::step_signature;
use crate::model::test_case::{TestCase, TestCaseId, TestStep, TestSuite};

pub const MERGED_ID_BASE: TestCaseId = 10_000;
pub const MERGED_ID_SPAN: u64 = 90_000;
const MAX_NAME_LEN: usize = 100;
const LOGOUT_MARKERS: [&str; 4] = ["logout", "log out", "signout", "sign out"];

// ============================================================================
// Merge safety
// ============================================================================

/// Why a set of test cases may not be combined.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeVeto {
    RoleMismatch { roles: Vec<(TestCaseId, RoleLabel)> },
    WebsiteMismatch { websites: Vec<(TestCaseId, String)> },
}

impl fmt::Display for MergeVeto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeVeto::RoleMismatch { roles } => {
                let parts: Vec<String> = roles.iter().map(|(id, r)| format!("{}={}", id, r)).collect();
                write!(f, "Role mismatch: {}", parts.join(", "))
            }
            MergeVeto::WebsiteMismatch { websites } => {
                let parts: Vec<String> = websites.iter().map(|(id, w)| format!("{}={}", id, w)).collect();
                write!(f, "Website mismatch: {}", parts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeSafety {
    pub veto: Option<MergeVeto>,

    /// Unknown labels treated as compatible
    pub notes: Vec<String>,
}

impl MergeSafety {
    pub fn is_safe(&self) -> bool {
        self.veto.is_none()
    }
}

// ============================================================================
// Feasibility
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct MergeFeasibility {
    pub first_id: TestCaseId,
    pub second_id: TestCaseId,
    pub similarity: f64,
    pub can_merge: bool,
    pub flow_overlap: bool,
    pub sequential: bool,
    pub minor_variations: bool,
    pub estimated_steps: usize,
    pub estimated_duration_ms: u64,
    pub combined_flows: BTreeSet<FlowType>,
    pub recommendation: String,
}

// ============================================================================
// Merger
// ============================================================================

#[derive(Debug, Clone)]
pub struct TestCaseMerger {
    pub uniqueness: StepUniquenessAnalyzer,
    pub flows: FlowAnalyzer,
    pub roles: RoleClassifier,
    pub websites: WebsiteGrouper,
    pub merge_threshold: f64,

    /// Collapse repeated waits and move logout to the end after merging
    pub tidy_steps: bool,
}

impl Default for TestCaseMerger {
    fn default() -> Self {
        Self {
            uniqueness: StepUniquenessAnalyzer::default(),
            flows: FlowAnalyzer::default(),
            roles: RoleClassifier::default(),
            websites: WebsiteGrouper::default(),
            merge_threshold: 0.70,
            tidy_steps: false,
        }
    }
}

impl TestCaseMerger {
    /// Merge rather than remove only when each side has a step the other lacks.
    pub fn should_merge(&self, a: &TestCase, b: &TestCase) -> bool {
        let pair = self.uniqueness.unique_steps(a, b);
        pair.unique_in_first.has_unique() && pair.unique_in_second.has_unique()
    }

    /// Deterministic id from the sorted source ids, bumped past `taken`.
    pub fn merged_id(&self, source_ids: &[TestCaseId], taken: &HashSet<TestCaseId>) -> TestCaseId {
        let mut sorted: Vec<String> = source_ids.iter().map(|id| id.to_string()).collect();
        sorted.sort();
        let digest = format!("{:x}", Md5::digest(sorted.join("_").as_bytes()));
        let hash = u64::from_str_radix(&digest[..8], 16).unwrap_or(0);

        let mut id = MERGED_ID_BASE + (hash % MERGED_ID_SPAN) as TestCaseId;
        while taken.contains(&id) {
            id += 1;
        }
        id
    }

    /// Role and website consistency across all sources. Unknown is
    /// compatible with anything.
    pub fn merge_safety(&self, cases: &[&TestCase]) -> MergeSafety {
        let mut safety = MergeSafety::default();

        let roles: Vec<(TestCaseId, RoleLabel)> = cases.iter().map(|tc| (tc.id, self.roles.classify(tc))).collect();
        let known_roles: BTreeSet<RoleLabel> = roles.iter().map(|(_, r)| *r).filter(RoleLabel::is_known).collect();
        if known_roles.len() > 1 {
            safety.veto = Some(MergeVeto::RoleMismatch { roles });
            return safety;
        }
        for (id, role) in &roles {
            if !role.is_known() {
                safety.notes.push(format!("Test case {} has unknown role", id));
            }
        }

        let websites: Vec<(TestCaseId, String)> = cases
            .iter()
            .map(|tc| (tc.id, self.websites.extract_website(tc)))
            .collect();
        let known_sites: BTreeSet<&str> = websites
            .iter()
            .map(|(_, w)| w.as_str())
            .filter(|w| *w != UNKNOWN_WEBSITE)
            .collect();
        if known_sites.len() > 1 {
            safety.veto = Some(MergeVeto::WebsiteMismatch { websites });
            return safety;
        }
        for (id, site) in &websites {
            if site == UNKNOWN_WEBSITE {
                safety.notes.push(format!("Test case {} has unknown website", id));
            }
        }

        safety
    }

    /// Two-way merge: all of `a`, then `b`'s steps with unseen signatures.
    pub fn merge_pair(&self, a: &TestCase, b: &TestCase, new_id: TestCaseId) -> TestCase {
        let mut seen = HashSet::new();
        let mut steps = Vec::new();
        for step in a.ordered_steps().into_iter().chain(b.ordered_steps()) {
            if seen.insert(step_signature(step)) {
                steps.push(step.clone());
            }
        }

        let mut name = format!("Merged: {} + {}", a.name, b.name);
        if name.chars().count() > MAX_NAME_LEN {
            name = format!("Merged Test Case {} + {}", a.id, b.id);
        }

        self.assemble(&[a, b], new_id, name, steps)
    }

    /// Multi-way merge: shared prefix, each source's distinct middle, shared suffix.
    pub fn merge_many(&self, cases: &[&TestCase], new_id: TestCaseId, flexible_login: bool) -> Result<TestCase> {
        match cases {
            [] => Err(OptimizerError::InvalidInput("cannot merge an empty set of test cases".to_string())),
            [only] => Ok(self.assemble(&[*only], new_id, only.name.clone(), only.steps.clone())),
            [a, b] if !flexible_login => Ok(self.merge_pair(a, b, new_id)),
            _ => {
                let points = if flexible_login {
                    find_flexible_merge_points(cases)
                } else {
                    find_merge_points(cases)
                };

                let suffix_sigs: HashSet<String> = points.suffix.iter().map(step_signature).collect();
                let mut seen: HashSet<String> = HashSet::new();
                let mut steps: Vec<TestStep> = Vec::new();

                for step in &points.prefix {
                    if seen.insert(step_signature(step)) {
                        steps.push(step.clone());
                    }
                }

                let mut emitted_patterns: HashSet<Vec<String>> = HashSet::new();
                for middle in &points.middles {
                    let fresh: Vec<&TestStep> = middle
                        .steps
                        .iter()
                        .filter(|s| {
                            let sig = step_signature(s);
                            !seen.contains(&sig) && !suffix_sigs.contains(&sig)
                        })
                        .collect();

                    let pattern = middle.action_sequence();
                    if !emitted_patterns.insert(pattern) && fresh.is_empty() {
                        continue;
                    }

                    for step in fresh {
                        if seen.insert(step_signature(step)) {
                            steps.push(step.clone());
                        }
                    }
                }

                for step in &points.suffix {
                    if seen.insert(step_signature(step)) {
                        steps.push(step.clone());
                    }
                }

                let steps = restore_missing_steps(cases, steps);
                let ids: Vec<String> = cases.iter().map(|tc| tc.id.to_string()).collect();
                let name = format!("Merged: {} test cases ({})", cases.len(), ids.join(", "));
                Ok(self.assemble(cases, new_id, name, steps))
            }
        }
    }

    fn assemble(&self, sources: &[&TestCase], new_id: TestCaseId, name: String, steps: Vec<TestStep>) -> TestCase {
        let steps = if self.tidy_steps { tidy_steps(steps) } else { steps };
        let source_ids: Vec<TestCaseId> = sources.iter().map(|tc| tc.id).collect();

        let mut merged = TestCase::new(new_id, &name);
        merged.description = Some(format!(
            "Merged from test cases: {}",
            source_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
        ));
        merged.priority = sources.iter().filter_map(|tc| tc.priority).min();
        merged.duration = if sources.iter().any(|tc| tc.duration.is_some()) {
            Some(sources.iter().filter_map(|tc| tc.duration).sum())
        } else {
            None
        };
        merged.status = sources.iter().find_map(|tc| tc.status.clone());
        merged.pass_count = sources.first().and_then(|tc| tc.pass_count);
        merged.fail_count = sources.first().and_then(|tc| tc.fail_count);
        merged.last_run_result = sources.iter().find_map(|tc| tc.last_run_result.clone());
        merged.tags = sources
            .iter()
            .flat_map(|tc| tc.tags.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        merged.prerequisite_case = sources
            .iter()
            .filter_map(|tc| tc.prerequisite_case)
            .find(|p| !source_ids.contains(p));
        merged.test_data_id = sources.iter().find_map(|tc| tc.test_data_id);
        merged.created_date = sources.iter().filter_map(|tc| tc.created_date.clone()).min();
        merged.updated_date = sources.iter().filter_map(|tc| tc.updated_date.clone()).max();

        merged = merged.with_steps(steps);
        for (i, step) in merged.steps.iter_mut().enumerate() {
            step.position = i as u32 + 1;
        }
        merged
    }

    pub fn merge_feasibility(&self, a: &TestCase, b: &TestCase, similarity: f64) -> MergeFeasibility {
        let flows_a = self.flows.identify_flows(a);
        let flows_b = self.flows.identify_flows(b);
        let flow_overlap = !flows_a.is_disjoint(&flows_b);

        let steps_a = a.ordered_steps();
        let steps_b = b.ordered_steps();

        let sequential = match (steps_a.last(), steps_b.first()) {
            (Some(last), Some(first)) => last.action_name == first.action_name,
            _ => false,
        };

        let common = steps_a
            .iter()
            .zip(steps_b.iter())
            .filter(|(x, y)| x.action_name == y.action_name && x.element == y.element)
            .count();
        let longest = steps_a.len().max(steps_b.len());
        let minor_variations = longest > 0
            && steps_a.len().abs_diff(steps_b.len()) <= 2
            && common as f64 / longest as f64 >= 0.8;

        let can_merge = similarity + SCORE_EPSILON >= self.merge_threshold
            && (flow_overlap || sequential || minor_variations);

        let recommendation = if !can_merge {
            "Cannot merge - too different"
        } else if similarity >= 0.90 {
            "Strong merge candidate - very similar test cases"
        } else if flow_overlap {
            "Good merge candidate - test similar flows"
        } else {
            "Moderate merge candidate - consider manual review"
        };

        MergeFeasibility {
            first_id: a.id,
            second_id: b.id,
            similarity,
            can_merge,
            flow_overlap,
            sequential,
            minor_variations,
            estimated_steps: steps_a.len() + steps_b.len() - common,
            estimated_duration_ms: a.duration.unwrap_or(0) + b.duration.unwrap_or(0),
            combined_flows: flows_a.union(&flows_b).copied().collect(),
            recommendation: recommendation.to_string(),
        }
    }

    /// Feasible same-role pairs above the merge threshold, most similar first.
    pub fn merge_candidates(&self, suite: &TestSuite, matrix: &SimilarityMatrix) -> Vec<MergeFeasibility> {
        let mut out = Vec::new();
        for pair in matrix.pairs() {
            if pair.similarity + SCORE_EPSILON < self.merge_threshold {
                continue;
            }
            let (Some(a), Some(b)) = (suite.get(pair.first), suite.get(pair.second)) else {
                continue;
            };
            let role = self.roles.classify(a);
            if !role.is_known() || role != self.roles.classify(b) {
                continue;
            }
            let feasibility = self.merge_feasibility(a, b, pair.similarity);
            if feasibility.can_merge {
                out.push(feasibility);
            }
        }
        out.sort_by(|x, y| y.similarity.total_cmp(&x.similarity));
        out
    }
}

pub(crate) fn is_logout(step: &TestStep) -> bool {
    let text = format!(
        "{} {} {} {}",
        step.action_name,
        step.action.to_lowercase(),
        step.element.as_deref().unwrap_or("").to_lowercase(),
        step.description.as_deref().unwrap_or("").to_lowercase()
    );
    LOGOUT_MARKERS.iter().any(|m| text.contains(m))
}

/// Reinsert every source step whose signature the merged sequence lacks,
/// right after the nearest earlier step of the same source that is present.
pub fn restore_missing_steps(sources: &[&TestCase], mut steps: Vec<TestStep>) -> Vec<TestStep> {
    for tc in sources {
        let mut anchor: Option<usize> = None;
        for step in tc.ordered_steps() {
            let sig = step_signature(step);
            match steps.iter().position(|s| step_signature(s) == sig) {
                Some(at) => anchor = Some(at),
                None => {
                    let at = anchor.map_or(0, |a| a + 1);
                    steps.insert(at, step.clone());
                    anchor = Some(at);
                }
            }
        }
    }
    steps
}

/// Drop a wait directly following a wait at least as long, then move
/// logout steps to the end.
pub fn tidy_steps(steps: Vec<TestStep>) -> Vec<TestStep> {
    let mut kept: Vec<TestStep> = Vec::with_capacity(steps.len());
    for step in steps {
        if step.action_name == "wait" {
            if let Some(prev) = kept.last() {
                if prev.action_name == "wait" && step.wait_time.unwrap_or(0) <= prev.wait_time.unwrap_or(0) {
                    continue;
                }
            }
        }
        kept.push(step);
    }

    let (logout, mut rest): (Vec<TestStep>, Vec<TestStep>) = kept.into_iter().partition(is_logout);
    rest.extend(logout);
    rest
}
