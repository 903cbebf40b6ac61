use std::collections::BTreeMap;

use crate::model::test_case::{TestCase, TestCaseId, TestSuite};

// ============================================================================
// Sequence extraction
// ============================================================================

pub fn action_sequence(case: &TestCase) -> Vec<String> {
    case.action_sequence()
}

/// Elements interacted with, in order. Falls back to the first locator value.
pub fn element_sequence(case: &TestCase) -> Vec<String> {
    let mut elements = Vec::new();
    for step in case.ordered_steps() {
        if let Some(element) = &step.element {
            elements.push(element.trim().to_lowercase());
        } else if let Some(locator) = &step.locator {
            if let Some(value) = ["label", "id", "name", "placeholder"]
                .iter()
                .find_map(|key| locator.get(*key))
            {
                elements.push(value.trim().to_lowercase());
            }
        }
    }
    elements
}

/// Abstract an action name into its coarse verb.
pub fn abstract_action(action_name: &str) -> String {
    let lower = action_name.to_lowercase();
    let abstracted = match lower.as_str() {
        "navigateto" => "navigateTo",
        "click" | "doubleclick" | "rightclick" => "click",
        "enter" | "type" | "fill" | "input" => "enter",
        "select" | "selectoption" | "choose" => "select",
        "verify" | "assert" | "check" | "validate" => "verify",
        "wait" | "waitfor" | "pause" => "wait",
        _ => return lower,
    };
    abstracted.to_string()
}

pub fn flow_pattern(case: &TestCase) -> Vec<String> {
    case.ordered_steps()
        .into_iter()
        .map(|s| abstract_action(&s.action_name))
        .collect()
}

/// `navigateto->click->enter`
pub fn action_signature(case: &TestCase) -> String {
    action_sequence(case).join("->")
}

/// Group ids by identical action signature.
pub fn common_patterns(suite: &TestSuite) -> BTreeMap<String, Vec<TestCaseId>> {
    let mut patterns: BTreeMap<String, Vec<TestCaseId>> = BTreeMap::new();
    for case in suite.iter() {
        patterns.entry(action_signature(case)).or_default().push(case.id);
    }
    patterns
}

// ============================================================================
// Sequence comparison
// ============================================================================

/// LCS similarity (`lcs / max_len`) and the LCS length.
pub fn compare_sequences<T: PartialEq>(a: &[T], b: &[T]) -> (f64, usize) {
    if a.is_empty() && b.is_empty() {
        return (1.0, 0);
    }
    if a.is_empty() || b.is_empty() {
        return (0.0, 0);
    }
    let lcs = lcs_length(a, b);
    let max_len = a.len().max(b.len());
    (lcs as f64 / max_len as f64, lcs)
}

pub fn lcs_length<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];

    for item_a in a {
        for (j, item_b) in b.iter().enumerate() {
            curr[j + 1] = if item_a == item_b {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Character-level edit distance.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `1 - distance / max_len`, case-insensitive and trimmed, floored at 0.
pub fn fuzzy_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    let distance = levenshtein(&a, &b);
    (1.0 - distance as f64 / max_len as f64).max(0.0)
}

/// True when `needle` occurs as a contiguous run inside `haystack`.
pub fn contains_contiguous<T: PartialEq>(haystack: &[T], needle: &[T]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// True when `needle` occurs in order, gaps allowed.
pub fn contains_subsequence<T: PartialEq>(haystack: &[T], needle: &[T]) -> bool {
    let mut it = haystack.iter();
    needle.iter().all(|n| it.any(|h| h == n))
}
