use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::normalize::step_urls;
use crate::model::test_case::{TestCase, TestCaseId, TestSuite};

pub const ROLE_CONFIDENCE_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleLabel {
    Admin,
    User,
    Unknown,
}

impl RoleLabel {
    pub fn is_known(&self) -> bool {
        *self != RoleLabel::Unknown
    }
}

impl fmt::Display for RoleLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RoleLabel::Admin => "admin",
            RoleLabel::User => "user",
            RoleLabel::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Keyword, action, URL and element indicator lists for one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleTable {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub url_patterns: Vec<String>,
    #[serde(default)]
    pub element_patterns: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleIndicators {
    #[serde(default = "default_admin_table")]
    pub admin: RoleTable,
    #[serde(default = "default_user_table")]
    pub user: RoleTable,
}

impl Default for RoleIndicators {
    fn default() -> Self {
        Self {
            admin: default_admin_table(),
            user: default_user_table(),
        }
    }
}

fn default_admin_table() -> RoleTable {
    RoleTable {
        keywords: strings(&[
            "admin", "administrator", "system user", "manage", "management",
            "delete user", "create user", "add user", "remove user",
            "user management", "system settings", "system configuration",
            "permissions", "roles", "access control", "system admin",
        ]),
        actions: strings(&[
            "deleteuser", "createuser", "adduser", "removeuser", "manageusers",
            "managesystem", "systemsettings", "permissions", "roles",
            "accesscontrol", "adminpanel",
        ]),
        url_patterns: strings(&[
            "/admin", "/administrator", "/management", "/system",
            "/admin/", "/manage/", "/system/", "/settings",
        ]),
        element_patterns: strings(&[
            "admin", "administrator", "management", "system",
            "user management", "admin panel", "system settings",
        ]),
    }
}

fn default_user_table() -> RoleTable {
    RoleTable {
        keywords: strings(&[
            "user", "customer", "employee", "login", "profile", "dashboard",
            "my account", "my profile", "personal", "settings", "preferences",
            "account settings",
        ]),
        actions: strings(&[
            "login", "logout", "viewprofile", "updateprofile", "editprofile",
            "changepassword", "myaccount",
        ]),
        url_patterns: strings(&[
            "/user", "/customer", "/dashboard", "/profile", "/my",
            "/account", "/settings", "/preferences",
        ]),
        element_patterns: strings(&[
            "user", "customer", "profile", "dashboard", "account",
            "my account", "personal", "settings",
        ]),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IndicatorCounts {
    pub keywords: usize,
    pub actions: usize,
    pub urls: usize,
    pub elements: usize,
}

impl IndicatorCounts {
    pub fn total(&self) -> usize {
        self.keywords + self.actions + self.urls + self.elements
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleConfidence {
    pub admin_confidence: f64,
    pub user_confidence: f64,
    pub classification: RoleLabel,
    pub admin: IndicatorCounts,
    pub user: IndicatorCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleStatistics {
    pub total: usize,
    pub admin: usize,
    pub user: usize,
    pub unknown: usize,
    pub classifications: BTreeMap<TestCaseId, RoleLabel>,
}

// ============================================================================
// Classifier
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct RoleClassifier {
    pub indicators: RoleIndicators,
}

impl RoleClassifier {
    pub fn new(indicators: RoleIndicators) -> Self {
        Self { indicators }
    }

    pub fn indicators(&self, tc: &TestCase) -> (IndicatorCounts, IndicatorCounts) {
        let text = tc.text();

        let mut urls: Vec<String> = tc.steps.iter().flat_map(step_urls).map(|u| u.to_lowercase()).collect();
        urls.sort();
        urls.dedup();

        let actions: Vec<&str> = tc.steps.iter().map(|s| s.action_name.as_str()).collect();
        let elements: Vec<String> = tc.steps.iter().flat_map(|s| s.element_identifiers()).collect();

        let count = |table: &RoleTable| IndicatorCounts {
            keywords: table.keywords.iter().filter(|k| text.contains(k.as_str())).count(),
            actions: actions
                .iter()
                .filter(|a| table.actions.iter().any(|p| a.contains(p.as_str())))
                .count(),
            urls: urls
                .iter()
                .filter(|u| table.url_patterns.iter().any(|p| u.contains(&p.to_lowercase())))
                .count(),
            elements: elements
                .iter()
                .filter(|e| table.element_patterns.iter().any(|p| e.contains(p.as_str())))
                .count(),
        };

        (count(&self.indicators.admin), count(&self.indicators.user))
    }

    pub fn confidence(&self, tc: &TestCase) -> RoleConfidence {
        let (admin, user) = self.indicators(tc);
        let total = admin.total() + user.total();

        if total == 0 {
            return RoleConfidence {
                admin_confidence: 0.0,
                user_confidence: 0.3,
                classification: RoleLabel::Unknown,
                admin,
                user,
            };
        }

        let mut admin_confidence = admin.total() as f64 / total as f64;
        let mut user_confidence = user.total() as f64 / total as f64;
        if admin.keywords > 0 && admin.actions > 0 {
            admin_confidence = (admin_confidence + 0.2).min(1.0);
        }
        if user.keywords > 0 && user.actions > 0 {
            user_confidence = (user_confidence + 0.2).min(1.0);
        }

        let classification = if admin_confidence >= ROLE_CONFIDENCE_THRESHOLD {
            RoleLabel::Admin
        } else if user_confidence >= ROLE_CONFIDENCE_THRESHOLD {
            RoleLabel::User
        } else {
            RoleLabel::Unknown
        };

        RoleConfidence {
            admin_confidence,
            user_confidence,
            classification,
            admin,
            user,
        }
    }

    pub fn classify(&self, tc: &TestCase) -> RoleLabel {
        self.confidence(tc).classification
    }

    pub fn classify_suite(&self, suite: &TestSuite) -> BTreeMap<TestCaseId, RoleLabel> {
        suite.iter().map(|tc| (tc.id, self.classify(tc))).collect()
    }

    pub fn statistics(&self, suite: &TestSuite) -> RoleStatistics {
        let classifications = self.classify_suite(suite);
        let count = |label| classifications.values().filter(|&&l| l == label).count();
        RoleStatistics {
            total: suite.len(),
            admin: count(RoleLabel::Admin),
            user: count(RoleLabel::User),
            unknown: count(RoleLabel::Unknown),
            classifications,
        }
    }
}
