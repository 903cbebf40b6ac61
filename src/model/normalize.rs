use std::sync::LazyLock;

use regex::Regex;

use crate::model::test_case::TestStep;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("html tag regex"));

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).expect("url regex")
});

/// Strip HTML tags and collapse whitespace. Empty results become `None`.
pub fn clean_description(raw: Option<&str>) -> Option<String> {
    let text = raw?;
    let stripped = HTML_TAG.replace_all(text, "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

pub fn normalize_action_name(action_name: &str) -> String {
    action_name.trim().to_lowercase()
}

pub fn normalize_element(element: Option<&str>) -> Option<String> {
    let trimmed = element?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// All http(s) URLs embedded in a piece of text.
pub fn extract_urls(text: &str) -> Vec<String> {
    URL.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// The URL a step points at: test data first, then action and description text.
pub fn step_url(step: &TestStep) -> Option<String> {
    if let Some(data) = &step.test_data {
        if data.contains("http://") || data.contains("https://") {
            return extract_urls(data).into_iter().next().or_else(|| Some(data.clone()));
        }
    }
    let text = format!(
        "{} {}",
        step.action,
        step.description.as_deref().unwrap_or("")
    );
    extract_urls(&text).into_iter().next()
}

/// Every URL mentioned anywhere in a step.
pub fn step_urls(step: &TestStep) -> Vec<String> {
    let mut urls = Vec::new();
    for text in [
        step.test_data.as_deref(),
        Some(step.action.as_str()),
        step.description.as_deref(),
    ]
    .into_iter()
    .flatten()
    {
        for url in extract_urls(text) {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

/// Drop query and fragment, then trailing slashes.
pub fn normalize_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.as_str().trim_end_matches('/').to_string()
        }
        Err(_) => raw.trim_end_matches('/').to_string(),
    }
}

/// Lowercased host without a leading `www.`; port is never included.
pub fn url_domain(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);
    if host.is_empty() { None } else { Some(host) }
}

pub fn text_fingerprint(text: &str) -> String {
    use sha1::{Digest, Sha1};

    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Deduplication identity of a step.
///
/// Hash of `action|element|description|test_data` after normalization. Two
/// steps with equal signatures are interchangeable regardless of their ids.
pub fn step_signature(step: &TestStep) -> String {
    let action = normalize_action_name(&step.action_name);
    let element = normalize_element(step.element.as_deref()).unwrap_or_default();
    let description = clean_description(step.description.as_deref())
        .map(|d| d.to_lowercase())
        .unwrap_or_default();
    let test_data = step
        .test_data
        .as_deref()
        .map(|d| d.trim().to_lowercase())
        .unwrap_or_default();

    text_fingerprint(&format!(
        "{}|{}|{}|{}",
        action, element, description, test_data
    ))
}
