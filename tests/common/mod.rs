#![allow(dead_code)]

use std::path::Path;

use serde_json::{Value, json};
use suite_optimizer::model::test_case::{TestCase, TestCaseId, TestStep, TestSuite};

// ============================================================================
// Builders
// ============================================================================

pub fn step(id: i64, position: u32, action_name: &str, element: &str) -> TestStep {
    TestStep::new(id, position, action_name, &format!("{} {}", action_name, element)).with_element(element)
}

pub fn nav(id: i64, position: u32, url: &str) -> TestStep {
    TestStep::new(id, position, "navigateTo", &format!("Navigate to {}", url)).with_test_data(url)
}

pub fn case(id: TestCaseId, name: &str, steps: Vec<TestStep>) -> TestCase {
    TestCase::new(id, name).with_steps(steps)
}

/// Four steps shared by most fixtures; ids start at `base`.
pub fn shared_steps(base: i64) -> Vec<TestStep> {
    vec![
        step(base, 1, "click", "#menu"),
        step(base + 1, 2, "enter", "#name"),
        step(base + 2, 3, "enter", "#email"),
        step(base + 3, 4, "click", "#next"),
    ]
}

/// Four shared steps followed by one step unique to this case.
pub fn profile_case(id: TestCaseId, name: &str, last_element: &str) -> TestCase {
    let base = id * 100;
    let mut steps = shared_steps(base);
    steps.push(step(base + 4, 5, "click", last_element));
    case(id, name, steps)
}

pub fn login_case(id: TestCaseId) -> TestCase {
    let base = id * 100;
    case(
        id,
        "Login with valid credentials",
        vec![
            step(base, 1, "enter", "#username"),
            step(base + 1, 2, "enter", "#password"),
            step(base + 2, 3, "click", "#login"),
        ],
    )
}

pub fn suite(cases: Vec<TestCase>) -> TestSuite {
    TestSuite::from_cases(cases)
}

// ============================================================================
// On-disk fixtures
// ============================================================================

pub fn write_json(path: &Path, value: &Value) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

/// Write one metadata file and its steps file in the loader's layout.
pub fn write_case(dir: &Path, id: TestCaseId, name: &str, steps: Value) {
    write_json(
        &dir.join("test_cases").join(format!("{:02}.json", id)),
        &json!({ "id": id, "name": name, "priority": 2 }),
    );
    write_json(
        &dir.join("steps").join(format!("{:02}.json", id)),
        &json!({ "content": steps }),
    );
}

pub fn raw_step(id: i64, position: u32, action_name: &str, element: &str) -> Value {
    json!({
        "id": id,
        "position": position,
        "type": "STEP",
        "actionName": action_name,
        "action": format!("{} {}", action_name, element),
        "element": element,
    })
}
