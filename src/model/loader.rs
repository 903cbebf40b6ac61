use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::error::{OptimizerError, Result};
use crate::model::normalize::{clean_description, normalize_action_name, normalize_element};
use crate::model::test_case::{Locator, TestCase, TestCaseId, TestStep, TestSuite};

// ============================================================================
// On-disk record shapes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTestCase {
    id: Option<TestCaseId>,
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<i32>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    pre_requisite_case: Option<TestCaseId>,
    #[serde(default)]
    test_data_id: Option<i64>,
    #[serde(default)]
    created_date: Option<String>,
    #[serde(default)]
    updated_date: Option<String>,
    #[serde(default)]
    last_run: Option<RawLastRun>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLastRun {
    #[serde(default)]
    duration: Option<u64>,
    #[serde(default)]
    passed_count: Option<u32>,
    #[serde(default)]
    failed_count: Option<u32>,
    #[serde(default)]
    result: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStep {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    position: Option<u32>,
    #[serde(rename = "type", default)]
    step_type: Option<String>,
    #[serde(default)]
    action_name: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    element: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    test_data: Option<Value>,
    #[serde(default)]
    wait_time: Option<u64>,
    #[serde(default)]
    test_case_id: Option<TestCaseId>,
    #[serde(default)]
    event: Option<Value>,
}

const LOCATOR_KEYS: [&str; 7] = ["xpath", "selector", "label", "placeholder", "id", "name", "class"];

// ============================================================================
// Loading
// ============================================================================

/// Load every test case found in `test_cases_dir` with steps from `steps_dir`.
///
/// Files are named `NN.json`. Ids are discovered from both directories; an id
/// without a metadata file is skipped, an id without a steps file has no steps.
pub fn load_suite(test_cases_dir: &Path, steps_dir: &Path) -> Result<TestSuite> {
    let ids = discover_ids(test_cases_dir, steps_dir)?;
    info!(count = ids.len(), dir = %test_cases_dir.display(), "discovered test case ids");

    let mut suite = TestSuite::new();
    for id in ids {
        let meta_path = file_for(test_cases_dir, id);
        if !meta_path.exists() {
            debug!(id, "no metadata file, skipping");
            continue;
        }
        let steps_path = file_for(steps_dir, id);
        let case = load_test_case(&meta_path, &steps_path)?;
        debug!(id = case.id, steps = case.steps.len(), "loaded test case");
        suite.insert(case);
    }

    info!(loaded = suite.len(), "test suite loaded");
    Ok(suite)
}

/// `NN.json` unless only the unpadded `N.json` exists.
fn file_for(dir: &Path, id: TestCaseId) -> PathBuf {
    let padded = dir.join(format!("{:02}.json", id));
    if padded.exists() {
        return padded;
    }
    let plain = dir.join(format!("{}.json", id));
    if plain.exists() { plain } else { padded }
}

fn discover_ids(test_cases_dir: &Path, steps_dir: &Path) -> Result<Vec<TestCaseId>> {
    let mut ids = BTreeSet::new();
    for dir in [test_cases_dir, steps_dir] {
        if !dir.is_dir() {
            continue;
        }
        let entries = std::fs::read_dir(dir).map_err(|e| OptimizerError::io(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| OptimizerError::io(dir, e))?;
            let path = entry.path();
            if path.extension().map_or(false, |e| e == "json") {
                if let Some(id) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<TestCaseId>().ok())
                {
                    ids.insert(id);
                }
            }
        }
    }
    Ok(ids.into_iter().collect())
}

fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| OptimizerError::io(path, e))?;
    serde_json::from_str(&content).map_err(|source| OptimizerError::JsonParse {
        context: path.display().to_string(),
        source,
    })
}

/// Parse one metadata file and its (optional) steps file.
pub fn load_test_case(meta_path: &Path, steps_path: &Path) -> Result<TestCase> {
    let raw_value = read_json(meta_path)?;
    let steps = if steps_path.exists() {
        parse_steps(&read_json(steps_path)?, &steps_path.display().to_string())?
    } else {
        Vec::new()
    };
    parse_test_case(raw_value, steps, &meta_path.display().to_string())
}

fn parse_test_case(raw_value: Value, mut steps: Vec<TestStep>, file: &str) -> Result<TestCase> {
    let raw: RawTestCase =
        serde_json::from_value(raw_value.clone()).map_err(|source| OptimizerError::JsonParse {
            context: file.to_string(),
            source,
        })?;

    let id = raw.id.ok_or_else(|| OptimizerError::MissingField {
        file: file.to_string(),
        field: "id",
    })?;
    let name = raw.name.ok_or_else(|| OptimizerError::MissingField {
        file: file.to_string(),
        field: "name",
    })?;

    steps.sort_by_key(|s| s.position);
    for step in &mut steps {
        step.test_case_id.get_or_insert(id);
    }

    let (duration, pass_count, fail_count, last_run_result) = match raw.last_run {
        Some(run) => (run.duration, run.passed_count, run.failed_count, run.result),
        None => (None, None, None, None),
    };

    Ok(TestCase {
        id,
        name,
        description: clean_description(raw.description.as_deref()),
        priority: raw.priority,
        status: raw.status,
        duration,
        pass_count,
        fail_count,
        tags: raw.tags.unwrap_or_default(),
        steps,
        prerequisite_case: raw.pre_requisite_case,
        test_data_id: raw.test_data_id,
        last_run_result,
        created_date: raw.created_date,
        updated_date: raw.updated_date,
        raw: Some(raw_value),
    })
}

fn parse_steps(value: &Value, file: &str) -> Result<Vec<TestStep>> {
    let content = match value.get("content").and_then(Value::as_array) {
        Some(items) => items,
        None => return Ok(Vec::new()),
    };

    let mut steps = Vec::new();
    for item in content {
        let raw: RawStep =
            serde_json::from_value(item.clone()).map_err(|source| OptimizerError::JsonParse {
                context: file.to_string(),
                source,
            })?;

        if raw.step_type.as_deref() == Some("STEP_GROUP") {
            continue;
        }

        steps.push(TestStep {
            id: raw.id.ok_or_else(|| OptimizerError::MissingField {
                file: file.to_string(),
                field: "id",
            })?,
            position: raw.position.unwrap_or(0),
            action_name: normalize_action_name(raw.action_name.as_deref().unwrap_or("")),
            action: raw.action.unwrap_or_default(),
            element: normalize_element(raw.element.as_deref()),
            description: clean_description(raw.description.as_deref()),
            locator: raw.event.as_ref().and_then(parse_locator),
            test_data: raw.test_data.as_ref().and_then(normalize_test_data),
            wait_time: raw.wait_time,
            test_case_id: raw.test_case_id,
            raw: Some(item.clone()),
        });
    }
    Ok(steps)
}

fn parse_locator(event: &Value) -> Option<Locator> {
    let mut locator = Locator::new();

    if let Some(obj) = event.get("locator").and_then(Value::as_object) {
        for key in LOCATOR_KEYS {
            if let Some(value) = obj.get(key) {
                let text = match value {
                    Value::String(s) => s.trim().to_string(),
                    Value::Null => continue,
                    other => other.to_string(),
                };
                locator.insert(key.to_string(), text);
            }
        }
    }

    if locator.is_empty() {
        for key in ["selector", "label"] {
            if let Some(value) = event.get(key).and_then(Value::as_str) {
                locator.insert(key.to_string(), value.trim().to_string());
                break;
            }
        }
    }

    if locator.is_empty() { None } else { Some(locator) }
}

fn normalize_test_data(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

// ============================================================================
// Writing
// ============================================================================

/// Write a suite back in the two-directory layout the loader reads.
pub fn write_suite(suite: &TestSuite, test_cases_dir: &Path, steps_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(test_cases_dir).map_err(|e| OptimizerError::io(test_cases_dir, e))?;
    std::fs::create_dir_all(steps_dir).map_err(|e| OptimizerError::io(steps_dir, e))?;

    let mut written = Vec::new();
    for case in suite.iter() {
        let file_name = format!("{:02}.json", case.id);

        let meta_path = test_cases_dir.join(&file_name);
        write_json(&meta_path, &test_case_record(case))?;
        written.push(meta_path);

        let steps_path = steps_dir.join(&file_name);
        let content: Vec<Value> = case.ordered_steps().into_iter().map(step_record).collect();
        write_json(&steps_path, &json!({ "content": content }))?;
        written.push(steps_path);
    }
    Ok(written)
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|source| OptimizerError::JsonSerialize {
        context: path.display().to_string(),
        source,
    })?;
    std::fs::write(path, text).map_err(|e| OptimizerError::io(path, e))
}

fn base_object(raw: Option<&Value>) -> Map<String, Value> {
    raw.and_then(Value::as_object).cloned().unwrap_or_default()
}

fn test_case_record(case: &TestCase) -> Value {
    let mut obj = base_object(case.raw.as_ref());
    obj.insert("id".into(), json!(case.id));
    obj.insert("name".into(), json!(case.name));
    obj.insert("description".into(), json!(case.description));
    obj.insert("priority".into(), json!(case.priority));
    obj.insert("status".into(), json!(case.status));
    obj.insert("tags".into(), json!(case.tags));
    obj.insert("preRequisiteCase".into(), json!(case.prerequisite_case));
    obj.insert("testDataId".into(), json!(case.test_data_id));
    obj.insert(
        "lastRun".into(),
        json!({
            "duration": case.duration,
            "passedCount": case.pass_count,
            "failedCount": case.fail_count,
            "result": case.last_run_result,
        }),
    );
    Value::Object(obj)
}

fn step_record(step: &TestStep) -> Value {
    let mut obj = base_object(step.raw.as_ref());
    obj.insert("id".into(), json!(step.id));
    obj.insert("position".into(), json!(step.position));
    obj.insert("actionName".into(), json!(step.action_name));
    obj.insert("action".into(), json!(step.action));
    obj.insert("element".into(), json!(step.element));
    obj.insert("description".into(), json!(step.description));
    obj.insert("testData".into(), json!(step.test_data));
    obj.insert("waitTime".into(), json!(step.wait_time));
    obj.insert("testCaseId".into(), json!(step.test_case_id));

    let mut event = obj
        .get("event")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    event.insert("locator".into(), json!(step.locator));
    obj.insert("event".into(), Value::Object(event));

    Value::Object(obj)
}
