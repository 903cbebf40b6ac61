use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use crate::analysis::prefix::is_login_step;
use crate::analysis::role::{RoleClassifier, RoleLabel};
use crate::analysis::website::{UNKNOWN_WEBSITE, WebsiteGrouper};
use crate::model::normalize::{normalize_url, step_signature, step_url};
use crate::model::test_case::{TestCase, TestStep};
use crate::optimization::merger::{TestCaseMerger, is_logout};

/// Sources with more unclicked entries than this are not multi-merged.
pub const MAX_DEPENDENCY_ISSUES: usize = 10;

const ENTRY_ACTIONS: [&str; 4] = ["enter", "type", "fill", "input"];
const ELEMENT_ACTIONS: [&str; 4] = ["click", "enter", "type", "input"];
const CLICK_LOOKBACK: usize = 3;
const CREDENTIAL_SCAN: usize = 20;
const NAVIGATION_SCAN: usize = 5;

// ============================================================================
// Result
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeValidation {
    pub passed: bool,
    pub missing_steps: usize,
    pub has_login: bool,
    pub has_logout: bool,
    pub has_navigation: bool,

    /// Failures; any entry fails the merge
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

impl MergeValidation {
    pub fn summary(&self) -> String {
        match (self.issues.len(), self.warnings.len()) {
            (0, 0) => "All merge checks passed".to_string(),
            (0, w) => format!("{} warnings", w),
            (i, 0) => format!("{} issues", i),
            (i, w) => format!("{} issues | {} warnings", i, w),
        }
    }
}

// ============================================================================
// Merged test case validation
// ============================================================================

/// Checks a merged test case against the cases it came from before it is
/// allowed into the suite.
#[derive(Debug, Clone, Copy)]
pub struct MergedCaseValidator<'a> {
    roles: &'a RoleClassifier,
    websites: &'a WebsiteGrouper,
}

impl<'a> MergedCaseValidator<'a> {
    pub fn new(roles: &'a RoleClassifier, websites: &'a WebsiteGrouper) -> Self {
        Self { roles, websites }
    }

    pub fn for_merger(merger: &'a TestCaseMerger) -> Self {
        Self::new(&merger.roles, &merger.websites)
    }

    pub fn validate(&self, merged: &TestCase, sources: &[&TestCase]) -> MergeValidation {
        let mut result = MergeValidation::default();
        let steps = merged.ordered_steps();

        check_preservation(&steps, sources, &mut result);
        self.check_flow(&steps, sources, &mut result);
        check_positions(&steps, &mut result);
        check_execution(&steps, &mut result);
        check_usernames(&steps, &mut result);
        self.check_consistency(sources, &mut result);

        result.warnings.extend(step_flow_issues(&steps));

        result.passed = result.issues.is_empty();
        result
    }

    fn check_flow(&self, steps: &[&TestStep], sources: &[&TestCase], result: &mut MergeValidation) {
        if steps.is_empty() {
            result.issues.push("Merged test case has no steps".to_string());
            return;
        }

        let first_login = steps.iter().position(|s| is_login_step(s));
        let last_logout = steps.iter().rposition(|s| is_logout(s));
        result.has_login = first_login.is_some();
        result.has_logout = last_logout.is_some();

        match (first_login, last_logout) {
            (Some(login), Some(logout)) if logout <= login => result.issues.push(format!(
                "Logout (step {}) appears before login (step {})",
                logout + 1,
                login + 1
            )),
            (None, _) => result
                .warnings
                .push("No login step detected; may be a post-login flow".to_string()),
            (Some(_), None) => result
                .warnings
                .push("No logout step detected; session may remain open".to_string()),
            _ => {}
        }

        let all_user = !sources.is_empty() && sources.iter().all(|tc| self.roles.classify(tc) == RoleLabel::User);
        if all_user {
            let admin_entries: Vec<usize> = steps
                .iter()
                .take(CREDENTIAL_SCAN)
                .enumerate()
                .filter(|(_, s)| is_username_entry(s) && s.test_data.as_deref().is_some_and(|d| d.contains("Admin")))
                .map(|(i, _)| i + 1)
                .collect();
            if !admin_entries.is_empty() {
                result
                    .issues
                    .push(format!("Admin credentials in a user flow at steps {:?}", admin_entries));
            }
        }

        result.has_navigation = steps.iter().take(NAVIGATION_SCAN).any(|s| s.is_navigation());
        if !result.has_navigation && steps.len() > 3 {
            result
                .warnings
                .push(format!("No navigation in the first {} steps", NAVIGATION_SCAN));
        }
    }

    /// Known roles and websites must agree; unknown is compatible with anything.
    fn check_consistency(&self, sources: &[&TestCase], result: &mut MergeValidation) {
        let roles: BTreeSet<RoleLabel> = sources
            .iter()
            .map(|tc| self.roles.classify(tc))
            .filter(RoleLabel::is_known)
            .collect();
        if roles.len() > 1 {
            let labels: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
            result
                .issues
                .push(format!("Mixed roles in sources: {}", labels.join(", ")));
        }

        let websites: BTreeSet<String> = sources
            .iter()
            .map(|tc| self.websites.extract_website(tc))
            .filter(|w| w != UNKNOWN_WEBSITE)
            .collect();
        if websites.len() > 1 {
            let sites: Vec<&str> = websites.iter().map(String::as_str).collect();
            result
                .issues
                .push(format!("Mixed websites in sources: {}", sites.join(", ")));
        }
    }
}

fn check_preservation(steps: &[&TestStep], sources: &[&TestCase], result: &mut MergeValidation) {
    let present: HashSet<String> = steps.iter().map(|s| step_signature(s)).collect();
    let missing: BTreeSet<String> = sources
        .iter()
        .flat_map(|tc| tc.steps.iter())
        .map(step_signature)
        .filter(|sig| !present.contains(sig))
        .collect();

    result.missing_steps = missing.len();
    if !missing.is_empty() {
        result
            .issues
            .push(format!("Missing {} unique steps in merged test case", missing.len()));
    }
}

fn check_positions(steps: &[&TestStep], result: &mut MergeValidation) {
    let sequential = steps.iter().enumerate().all(|(i, s)| s.position as usize == i + 1);
    if !sequential {
        let positions: Vec<u32> = steps.iter().take(10).map(|s| s.position).collect();
        result
            .issues
            .push(format!("Step positions are not sequential: {:?}", positions));
    }
}

fn check_execution(steps: &[&TestStep], result: &mut MergeValidation) {
    let mut ids = HashSet::new();
    let mut duplicate_ids = BTreeSet::new();

    for (i, step) in steps.iter().enumerate() {
        let n = i + 1;
        if step.action_name.trim().is_empty() {
            result.issues.push(format!("Step {} has no action name", n));
        }
        if step.is_navigation() && step_url(step).is_none() {
            result.issues.push(format!("Step {} (navigateTo) has no URL", n));
        }
        if ELEMENT_ACTIONS.contains(&step.action_name.as_str()) && step.element_identifiers().is_empty() {
            result.warnings.push(format!(
                "Step {} ({}) has no element or locator",
                n, step.action_name
            ));
        }
        if !ids.insert(step.id) {
            duplicate_ids.insert(step.id);
        }
    }

    if !duplicate_ids.is_empty() {
        result
            .issues
            .push(format!("Duplicate step ids: {:?}", duplicate_ids));
    }
}

fn check_usernames(steps: &[&TestStep], result: &mut MergeValidation) {
    let usernames: BTreeSet<&str> = steps
        .iter()
        .filter(|s| is_username_entry(s))
        .filter_map(|s| s.test_data.as_deref())
        .collect();
    if usernames.len() > 1 {
        result
            .warnings
            .push(format!("Multiple usernames entered: {:?}", usernames));
    }
}

fn is_username_entry(step: &TestStep) -> bool {
    ENTRY_ACTIONS.contains(&step.action_name.as_str()) && lowered_text(step).contains("username")
}

fn lowered_text(step: &TestStep) -> String {
    format!(
        "{} {} {}",
        step.action.to_lowercase(),
        step.element.as_deref().unwrap_or("").to_lowercase(),
        step.description.as_deref().unwrap_or("").to_lowercase()
    )
}

// ============================================================================
// Step flow
// ============================================================================

/// Ordering problems in a step sequence: logout before the last step,
/// credential steps after login completed, and back-to-back repeats of the
/// same element action or navigation.
pub fn step_flow_issues(steps: &[&TestStep]) -> Vec<String> {
    let mut issues = Vec::new();
    let mut logged_in = false;
    let last = steps.len().saturating_sub(1);

    for (i, step) in steps.iter().enumerate() {
        let n = i + 1;
        let text = lowered_text(step);

        if is_logout(step) {
            if i < last {
                issues.push(format!("Step {}: logout before the final step", n));
            }
            logged_in = false;
            continue;
        }

        if logged_in && (text.contains("password") || text.contains("username")) {
            issues.push(format!("Step {}: credential step after login", n));
        }
        if step.action_name == "click" && step.element.as_deref().is_some_and(|e| e.to_lowercase().contains("login")) {
            logged_in = true;
        }

        let Some(prev) = i.checked_sub(1).map(|p| steps[p]) else {
            continue;
        };
        if ELEMENT_ACTIONS.contains(&step.action_name.as_str())
            && prev.action_name == step.action_name
            && step.element.is_some()
            && prev.element == step.element
            && !text.contains("search")
        {
            issues.push(format!(
                "Step {}: repeated {} on {}",
                n,
                step.action_name,
                step.element.as_deref().unwrap_or_default()
            ));
        }
        if step.is_navigation() && prev.is_navigation() {
            if let (Some(a), Some(b)) = (step_url(prev), step_url(step)) {
                if normalize_url(&a) == normalize_url(&b) {
                    issues.push(format!("Step {}: repeated navigation to {}", n, b));
                }
            }
        }
    }
    issues
}

/// Entries into an element that was not clicked within the previous few
/// steps. Search fields are exempt.
pub fn step_dependency_issues(steps: &[&TestStep]) -> Vec<String> {
    let mut issues = Vec::new();
    for (i, step) in steps.iter().enumerate() {
        if !ENTRY_ACTIONS.contains(&step.action_name.as_str()) {
            continue;
        }
        let Some(element) = step.element.as_deref().map(str::to_lowercase) else {
            continue;
        };
        if element.contains("search") || step.action.to_lowercase().contains("search") {
            continue;
        }

        let clicked = steps[i.saturating_sub(CLICK_LOOKBACK)..i].iter().any(|prev| {
            prev.action_name == "click" && prev.element.as_deref().is_some_and(|e| e.to_lowercase() == element)
        });
        if !clicked {
            issues.push(format!("Step {}: entering into '{}' without clicking it first", i + 1, element));
        }
    }
    issues
}
