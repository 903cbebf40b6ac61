use serde_json::json;
use suite_optimizer::error::OptimizerError;
use suite_optimizer::model::loader::{load_suite, load_test_case, write_suite};
use suite_optimizer::model::test_case::TestStep;
use suite_optimizer::model::validate::validate_suite;

use crate::common::{case, nav, profile_case, raw_step, step, suite, write_case, write_json};

mod common;

#[test]
fn loads_cases_with_ordered_steps() {
    let dir = tempfile::tempdir().unwrap();
    write_case(
        dir.path(),
        1,
        "Login",
        json!([
            raw_step(11, 2, "Click", "#login"),
            raw_step(10, 1, " Enter ", "#username"),
        ]),
    );
    write_case(dir.path(), 2, "Search", json!([raw_step(20, 1, "click", "#search")]));

    let s = load_suite(&dir.path().join("test_cases"), &dir.path().join("steps")).unwrap();
    assert_eq!(s.ids(), &[1, 2]);

    let login = s.get(1).unwrap();
    assert_eq!(login.priority, Some(2));
    let names: Vec<&str> = login.ordered_steps().iter().map(|st| st.action_name.as_str()).collect();
    assert_eq!(names, vec!["enter", "click"]);
    assert!(login.steps.iter().all(|st| st.test_case_id == Some(1)));
}

#[test]
fn step_groups_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_case(
        dir.path(),
        3,
        "Grouped",
        json!([
            { "id": 30, "position": 1, "type": "STEP_GROUP", "actionName": "group" },
            raw_step(31, 2, "click", "#go"),
        ]),
    );

    let s = load_suite(&dir.path().join("test_cases"), &dir.path().join("steps")).unwrap();
    let steps = &s.get(3).unwrap().steps;
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].id, 31);
}

#[test]
fn metadata_fields_and_locators_are_read() {
    let dir = tempfile::tempdir().unwrap();
    let meta = dir.path().join("meta.json");
    let steps = dir.path().join("steps.json");
    write_json(
        &meta,
        &json!({
            "id": 7,
            "name": "Checkout",
            "description": "<p>Pay   with card</p>",
            "preRequisiteCase": 3,
            "testDataId": 12,
            "tags": ["smoke"],
            "lastRun": { "duration": 4200, "passedCount": 8, "failedCount": 2, "result": "PASSED" },
        }),
    );
    write_json(
        &steps,
        &json!({ "content": [{
            "id": 70,
            "position": 1,
            "actionName": "enter",
            "action": "Enter card",
            "testData": 4111,
            "event": { "locator": { "id": "card", "name": null } },
        }]}),
    );

    let tc = load_test_case(&meta, &steps).unwrap();
    assert_eq!(tc.description.as_deref(), Some("Pay with card"));
    assert_eq!(tc.prerequisite_case, Some(3));
    assert_eq!(tc.test_data_id, Some(12));
    assert_eq!(tc.duration, Some(4200));
    assert!((tc.pass_rate().unwrap() - 0.8).abs() < 1e-9);
    assert_eq!(tc.steps[0].test_data.as_deref(), Some("4111"));
    assert!(tc.steps[0].element_identifiers().contains(&"card".to_string()));
}

#[test]
fn missing_name_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let meta = dir.path().join("01.json");
    write_json(&meta, &json!({ "id": 1 }));

    let err = load_test_case(&meta, &dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, OptimizerError::MissingField { field: "name", .. }));
}

#[test]
fn malformed_json_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let meta = dir.path().join("01.json");
    std::fs::write(&meta, "{ not json").unwrap();

    let err = load_test_case(&meta, &dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, OptimizerError::JsonParse { .. }));
}

#[test]
fn unpadded_file_names_are_accepted() {
    let dir = tempfile::tempdir().unwrap();
    write_json(&dir.path().join("test_cases").join("123.json"), &json!({ "id": 123, "name": "Big id" }));
    write_json(
        &dir.path().join("steps").join("5.json"),
        &json!({ "content": [raw_step(50, 1, "click", "#x")] }),
    );
    write_json(&dir.path().join("test_cases").join("5.json"), &json!({ "id": 5, "name": "Small id" }));

    let s = load_suite(&dir.path().join("test_cases"), &dir.path().join("steps")).unwrap();
    assert_eq!(s.ids(), &[5, 123]);
    assert_eq!(s.get(5).unwrap().steps.len(), 1);
    assert!(s.get(123).unwrap().steps.is_empty());
}

#[test]
fn written_suite_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let tc_dir = dir.path().join("out").join("test_cases");
    let steps_dir = dir.path().join("out").join("steps");
    let original = suite(vec![
        profile_case(1, "Profile save", "#save").with_priority(1).with_tags(&["smoke"]),
        case(12, "Open home", vec![nav(1200, 1, "https://shop.example.com/")]),
    ]);

    let written = write_suite(&original, &tc_dir, &steps_dir).unwrap();
    assert_eq!(written.len(), 4);
    assert!(tc_dir.join("01.json").exists());
    assert!(steps_dir.join("12.json").exists());

    let loaded = load_suite(&tc_dir, &steps_dir).unwrap();
    assert_eq!(loaded.ids(), original.ids());
    for tc in original.iter() {
        let back = loaded.get(tc.id).unwrap();
        assert_eq!(back.name, tc.name);
        assert_eq!(back.priority, tc.priority);
        assert_eq!(back.tags, tc.tags);
        assert_eq!(back.action_sequence(), tc.action_sequence());
    }
    assert_eq!(
        loaded.get(12).unwrap().steps[0].test_data.as_deref(),
        Some("https://shop.example.com/")
    );
}

#[test]
fn structural_validation_flags_errors_and_warnings() {
    let mut dup_positions = case(1, "Dup", vec![step(10, 1, "click", "#a"), step(11, 1, "click", "#b")]);
    dup_positions.steps[1].position = 1;
    let empty = case(2, "Empty", vec![]);
    let bare_nav = case(3, "Nav", vec![TestStep::new(30, 1, "navigateTo", "Go somewhere")]);
    let s = suite(vec![dup_positions, empty, bare_nav]);

    let report = validate_suite(&s);
    assert_eq!(report.total, 3);
    assert_eq!(report.invalid, 1);
    assert_eq!(report.valid, 2);
    assert!(!report.is_valid());
    assert!(report.errors[0].message.contains("Duplicate step position 1"));
    assert_eq!(report.warnings.len(), 2);
}
