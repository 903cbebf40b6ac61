use std::collections::HashSet;

use serde::Serialize;

use crate::model::normalize::{normalize_url, step_url};
use crate::model::test_case::{TestCase, TestCaseId, TestStep, TestSuite};

const LOGIN_URL_MARKERS: [&str; 4] = ["login", "signin", "sign-in", "auth"];
const CREDENTIAL_MARKERS: [&str; 5] = ["username", "password", "login", "email", "user"];
const LOGIN_CLICK_MARKERS: [&str; 5] = ["login", "log in", "signin", "sign in", "submit"];
const ENTRY_ACTIONS: [&str; 4] = ["enter", "type", "fill", "input"];

// ============================================================================
// Step equivalence
// ============================================================================

/// Same action; same element when both have one; same URL for navigation
/// (query, fragment and trailing slash ignored). Other steps that both carry
/// input data must carry the same data.
pub fn steps_equivalent(a: &TestStep, b: &TestStep) -> bool {
    if a.action_name != b.action_name {
        return false;
    }

    if let (Some(e1), Some(e2)) = (&a.element, &b.element) {
        if e1.trim().to_lowercase() != e2.trim().to_lowercase() {
            return false;
        }
    }

    if a.is_navigation() {
        if let (Some(u1), Some(u2)) = (step_url(a), step_url(b)) {
            return normalize_url(&u1) == normalize_url(&u2);
        }
        return true;
    }

    match (data_of(a), data_of(b)) {
        (Some(d1), Some(d2)) => d1 == d2,
        _ => true,
    }
}

fn data_of(step: &TestStep) -> Option<&str> {
    step.test_data
        .as_deref()
        .map(str::trim)
        .filter(|data| !data.is_empty())
}

fn sequences(cases: &[&TestCase]) -> Vec<Vec<TestStep>> {
    cases
        .iter()
        .map(|tc| tc.ordered_steps().into_iter().cloned().collect())
        .collect()
}

pub fn common_prefix(cases: &[&TestCase]) -> Vec<TestStep> {
    let seqs = sequences(cases);
    let Some(first) = seqs.first() else {
        return Vec::new();
    };
    let min_len = seqs.iter().map(Vec::len).min().unwrap_or(0);

    let mut prefix = Vec::new();
    for i in 0..min_len {
        if seqs[1..].iter().all(|seq| steps_equivalent(&first[i], &seq[i])) {
            prefix.push(first[i].clone());
        } else {
            break;
        }
    }
    prefix
}

pub fn common_suffix(cases: &[&TestCase]) -> Vec<TestStep> {
    let seqs = sequences(cases);
    let Some(first) = seqs.first() else {
        return Vec::new();
    };
    let min_len = seqs.iter().map(Vec::len).min().unwrap_or(0);

    let mut suffix = Vec::new();
    for i in 1..=min_len {
        let candidate = &first[first.len() - i];
        if seqs[1..].iter().all(|seq| steps_equivalent(candidate, &seq[seq.len() - i])) {
            suffix.push(candidate.clone());
        } else {
            break;
        }
    }
    suffix.reverse();
    suffix
}

// ============================================================================
// Login detection
// ============================================================================

fn contains_any(text: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| text.contains(m))
}

pub fn is_login_step(step: &TestStep) -> bool {
    let action = step.action_name.as_str();

    if step.is_navigation() {
        return step_url(step)
            .map(|u| contains_any(&u.to_lowercase(), &LOGIN_URL_MARKERS))
            .unwrap_or(false);
    }

    let element = step.element.as_deref().unwrap_or("").to_lowercase();
    let description = step.description.as_deref().unwrap_or("").to_lowercase();

    if ENTRY_ACTIONS.contains(&action) {
        let data = step.test_data.as_deref().unwrap_or("").to_lowercase();
        return contains_any(&element, &CREDENTIAL_MARKERS)
            || contains_any(&description, &CREDENTIAL_MARKERS)
            || contains_any(&data, &CREDENTIAL_MARKERS);
    }

    if action == "click" {
        let text = format!("{} {} {}", element, description, step.action.to_lowercase());
        return contains_any(&text, &LOGIN_CLICK_MARKERS);
    }

    false
}

/// Length of the contiguous login block at the start of `tc`, or 0.
///
/// A leading navigation to any page belongs to the block when login steps
/// follow it directly.
pub fn login_block_len(tc: &TestCase) -> usize {
    let steps = tc.ordered_steps();
    let Some(first) = steps.first() else {
        return 0;
    };

    let start = usize::from(first.is_navigation() && !is_login_step(first));
    let run = steps[start..].iter().take_while(|s| is_login_step(s)).count();

    if run == 0 { 0 } else { start + run }
}

// ============================================================================
// Merge points
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct MiddleSection {
    pub test_case_id: TestCaseId,
    pub steps: Vec<TestStep>,
}

impl MiddleSection {
    pub fn action_sequence(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.action_name.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginSection {
    pub test_case_id: TestCaseId,
    pub has_login: bool,
    pub login_end: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergePoints {
    pub prefix: Vec<TestStep>,
    pub middles: Vec<MiddleSection>,
    pub suffix: Vec<TestStep>,

    /// Only some sources carried a login block
    pub mixed_login: bool,
    pub login_sections: Vec<LoginSection>,
}

impl MergePoints {
    pub fn prefix_actions(&self) -> Vec<String> {
        self.prefix.iter().map(|s| s.action_name.clone()).collect()
    }

    pub fn suffix_actions(&self) -> Vec<String> {
        self.suffix.iter().map(|s| s.action_name.clone()).collect()
    }
}

/// Split each case into the shared prefix, its own middle and the shared suffix.
pub fn find_merge_points(cases: &[&TestCase]) -> MergePoints {
    if cases.is_empty() {
        return MergePoints::default();
    }
    let prefix = common_prefix(cases);
    let starts = vec![prefix.len(); cases.len()];
    build_points(cases, prefix, &starts, false, Vec::new())
}

/// Like [`find_merge_points`], but folds login blocks into the prefix even
/// when sources differ in whether or how long they log in.
pub fn find_flexible_merge_points(cases: &[&TestCase]) -> MergePoints {
    if cases.is_empty() {
        return MergePoints::default();
    }

    let standard_prefix = common_prefix(cases);
    let sections: Vec<LoginSection> = cases
        .iter()
        .map(|tc| {
            let end = login_block_len(tc);
            LoginSection {
                test_case_id: tc.id,
                has_login: end > 0,
                login_end: end,
            }
        })
        .collect();

    let with_login = sections.iter().filter(|s| s.has_login).count();
    let longest = sections
        .iter()
        .enumerate()
        .max_by_key(|(i, s)| (s.login_end, std::cmp::Reverse(*i)))
        .map(|(i, s)| (i, s.login_end));

    match longest {
        Some((owner, login_len)) if with_login == cases.len() && standard_prefix.len() < login_len => {
            let prefix = cases[owner].ordered_steps()[..login_len].iter().map(|s| (*s).clone()).collect();
            let starts: Vec<usize> = sections.iter().map(|s| s.login_end).collect();
            build_points(cases, prefix, &starts, false, sections)
        }
        Some((owner, login_len)) if with_login > 0 && with_login < cases.len() => {
            let prefix = cases[owner].ordered_steps()[..login_len].iter().map(|s| (*s).clone()).collect();
            let starts: Vec<usize> = sections.iter().map(|s| s.login_end).collect();
            build_points(cases, prefix, &starts, true, sections)
        }
        _ => {
            let starts = vec![standard_prefix.len(); cases.len()];
            build_points(cases, standard_prefix, &starts, false, sections)
        }
    }
}

fn build_points(
    cases: &[&TestCase],
    prefix: Vec<TestStep>,
    starts: &[usize],
    mixed_login: bool,
    login_sections: Vec<LoginSection>,
) -> MergePoints {
    let seqs = sequences(cases);

    // The suffix may not reach into any case's prefix region.
    let room = seqs
        .iter()
        .zip(starts)
        .map(|(seq, &start)| seq.len().saturating_sub(start))
        .min()
        .unwrap_or(0);
    let mut suffix = common_suffix(cases);
    if suffix.len() > room {
        suffix.drain(..suffix.len() - room);
    }

    let middles = cases
        .iter()
        .zip(seqs.iter())
        .zip(starts)
        .map(|((tc, seq), &start)| {
            let end = seq.len() - suffix.len();
            MiddleSection {
                test_case_id: tc.id,
                steps: seq[start.min(end)..end].to_vec(),
            }
        })
        .collect();

    MergePoints {
        prefix,
        middles,
        suffix,
        mixed_login,
        login_sections,
    }
}

// ============================================================================
// Mergeable groups
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct MergeableGroup {
    pub test_case_ids: Vec<TestCaseId>,
    pub prefix_length: usize,
    pub prefix_actions: Vec<String>,
}

impl MergeableGroup {
    pub fn group_size(&self) -> usize {
        self.test_case_ids.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PrefixStatistics {
    pub total: usize,
    pub common_prefix_length: usize,
    pub common_suffix_length: usize,
    pub common_prefix_actions: Vec<String>,
    pub common_suffix_actions: Vec<String>,
}

pub fn prefix_statistics(cases: &[&TestCase]) -> PrefixStatistics {
    let prefix = common_prefix(cases);
    let suffix = common_suffix(cases);
    PrefixStatistics {
        total: cases.len(),
        common_prefix_length: prefix.len(),
        common_suffix_length: suffix.len(),
        common_prefix_actions: prefix.iter().map(|s| s.action_name.clone()).collect(),
        common_suffix_actions: suffix.iter().map(|s| s.action_name.clone()).collect(),
    }
}

/// Greedy grouping: each unprocessed case collects later cases sharing at
/// least `min_prefix` leading steps with it. Largest groups first.
pub fn find_mergeable_groups(
    suite: &TestSuite,
    min_prefix: usize,
    min_group: usize,
    flexible_login: bool,
) -> Vec<MergeableGroup> {
    let cases: Vec<&TestCase> = suite.iter().collect();
    let mut processed: HashSet<TestCaseId> = HashSet::new();
    let mut groups = Vec::new();

    let prefix_of = |members: &[&TestCase]| {
        if flexible_login {
            find_flexible_merge_points(members).prefix
        } else {
            common_prefix(members)
        }
    };

    for (i, anchor) in cases.iter().enumerate() {
        if processed.contains(&anchor.id) {
            continue;
        }

        let mut members = vec![*anchor];
        for other in &cases[i + 1..] {
            if processed.contains(&other.id) {
                continue;
            }
            if prefix_of(&[*anchor, *other]).len() >= min_prefix {
                members.push(*other);
            }
        }

        if members.len() < min_group {
            continue;
        }
        let prefix = prefix_of(&members);
        if prefix.len() < min_prefix {
            continue;
        }

        processed.extend(members.iter().map(|tc| tc.id));
        groups.push(MergeableGroup {
            test_case_ids: members.iter().map(|tc| tc.id).collect(),
            prefix_length: prefix.len(),
            prefix_actions: prefix.iter().map(|s| s.action_name.clone()).collect(),
        });
    }

    groups.sort_by(|a, b| {
        (b.group_size(), b.prefix_length).cmp(&(a.group_size(), a.prefix_length))
    });
    groups
}
