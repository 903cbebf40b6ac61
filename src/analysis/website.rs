use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analysis::role::RoleLabel;
use crate::model::normalize::step_urls;
use crate::model::test_case::{TestCase, TestCaseId, TestSuite};

pub const UNKNOWN_WEBSITE: &str = "unknown";

/// Site label aliasing and text fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsiteAliases {
    /// Second-level domain label -> canonical site
    #[serde(default = "default_aliases")]
    pub aliases: BTreeMap<String, String>,

    /// Checked in order against name and description when no URL is present
    #[serde(default = "default_text_patterns")]
    pub text_patterns: Vec<(String, Vec<String>)>,
}

impl Default for WebsiteAliases {
    fn default() -> Self {
        Self {
            aliases: default_aliases(),
            text_patterns: default_text_patterns(),
        }
    }
}

fn default_aliases() -> BTreeMap<String, String> {
    [
        ("orangehrm", "orangehrmlive"),
        ("orangehrmlive", "orangehrmlive"),
        ("ohrm", "orangehrmlive"),
        ("salesforce", "salesforce"),
        ("sfdc", "salesforce"),
        ("force", "salesforce"),
        ("amazon", "amazon"),
        ("airbnb", "airbnb"),
        ("demo", "demo"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_text_patterns() -> Vec<(String, Vec<String>)> {
    let table: [(&str, &[&str]); 5] = [
        ("orangehrmlive", &["orangehrm", "orange hrm", "ohrm"]),
        ("salesforce", &["salesforce", "sfdc"]),
        ("ecommerce", &["ecommerce", "e-commerce", "shop", "store"]),
        ("amazon", &["amazon"]),
        ("airbnb", &["airbnb", "air bnb"]),
    ];
    table
        .iter()
        .map(|(site, patterns)| {
            (site.to_string(), patterns.iter().map(|p| p.to_string()).collect())
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct WebsiteGrouper {
    pub aliases: WebsiteAliases,
}

impl WebsiteGrouper {
    pub fn new(aliases: WebsiteAliases) -> Self {
        Self { aliases }
    }

    /// Canonical site label for a URL: the second-level label, aliased.
    pub fn normalize_website(&self, raw: &str) -> String {
        let host = match url::Url::parse(raw) {
            Ok(parsed) => parsed.host_str().map(|h| h.to_lowercase()),
            Err(_) => None,
        };
        let Some(host) = host else {
            return UNKNOWN_WEBSITE.to_string();
        };
        let host = host.strip_prefix("www.").unwrap_or(&host);

        let parts: Vec<&str> = host.split('.').collect();
        if parts.len() < 2 {
            return host.to_string();
        }
        let label = parts[parts.len() - 2];
        self.aliases
            .aliases
            .get(label)
            .cloned()
            .unwrap_or_else(|| label.to_string())
    }

    /// First URL in step order decides; otherwise name/description patterns.
    pub fn extract_website(&self, tc: &TestCase) -> String {
        for step in tc.ordered_steps() {
            if let Some(url) = step_urls(step).first() {
                let site = self.normalize_website(url);
                if site != UNKNOWN_WEBSITE {
                    return site;
                }
            }
        }

        let text = tc.text();
        for (site, patterns) in &self.aliases.text_patterns {
            if patterns.iter().any(|p| text.contains(p.as_str())) {
                return site.clone();
            }
        }

        UNKNOWN_WEBSITE.to_string()
    }

    pub fn group_by_website(&self, suite: &TestSuite) -> BTreeMap<String, Vec<TestCaseId>> {
        let mut groups: BTreeMap<String, Vec<TestCaseId>> = BTreeMap::new();
        for tc in suite.iter() {
            groups.entry(self.extract_website(tc)).or_default().push(tc.id);
        }
        groups
    }

    pub fn group_by_role_and_website(
        &self,
        suite: &TestSuite,
        roles: &BTreeMap<TestCaseId, RoleLabel>,
    ) -> BTreeMap<(RoleLabel, String), Vec<TestCaseId>> {
        let mut groups: BTreeMap<(RoleLabel, String), Vec<TestCaseId>> = BTreeMap::new();
        for tc in suite.iter() {
            let role = roles.get(&tc.id).copied().unwrap_or(RoleLabel::Unknown);
            groups
                .entry((role, self.extract_website(tc)))
                .or_default()
                .push(tc.id);
        }
        groups
    }
}
