use std::collections::HashSet;

use serde::Serialize;

use crate::model::normalize::step_url;
use crate::model::test_case::{TestCase, TestCaseId, TestSuite};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub test_case_id: TestCaseId,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteValidation {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl SuiteValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Structural checks on loaded data. Errors make a case invalid; warnings do not.
pub fn validate_suite(suite: &TestSuite) -> SuiteValidation {
    let mut report = SuiteValidation {
        total: suite.len(),
        ..Default::default()
    };

    for case in suite.iter() {
        let before = report.errors.len();
        check_case(case, &mut report);
        if report.errors.len() == before {
            report.valid += 1;
        } else {
            report.invalid += 1;
        }
    }
    report
}

fn check_case(case: &TestCase, report: &mut SuiteValidation) {
    let issue = |message: String| ValidationIssue {
        test_case_id: case.id,
        message,
    };

    if case.name.trim().is_empty() {
        report.errors.push(issue("Test case has no name".into()));
    }

    if case.steps.is_empty() {
        report.warnings.push(issue("Test case has no steps".into()));
        return;
    }

    let mut positions = HashSet::new();
    for step in &case.steps {
        if !positions.insert(step.position) {
            report
                .errors
                .push(issue(format!("Duplicate step position {}", step.position)));
        }
        if step.action_name.is_empty() {
            report
                .errors
                .push(issue(format!("Step {} has no action name", step.id)));
        }
        if step.is_navigation() && step_url(step).is_none() {
            report.warnings.push(issue(format!(
                "Step {} navigates without a URL",
                step.id
            )));
        }
    }
}
