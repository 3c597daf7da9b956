use std::fs;
use std::path::Path;

use serde_json::{Value, json};
use tempfile::tempdir;

use super::registry::OperatorKind;
use super::run::{PipelineConfig, STEP_CONFIG_FILE, execute, resolve_steps};

fn write_json(path: &Path, value: &Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

fn recall_fixture() -> Value {
    json!([{
        "query": "How is coal moved?",
        "fine_keywords": [["coal", "rail"]],
        "coarse_keywords": ["coal"],
        "recall_results": {"source_nodes": [
            {"node": {"text": "Coal is moved by rail."}, "score": 0.9}
        ]}
    }])
}

fn pipeline_config(value: Value) -> PipelineConfig {
    serde_json::from_value(value).unwrap()
}

#[test]
fn registry_resolves_known_operators_only() {
    assert_eq!(
        OperatorKind::resolve("eval_search", "ScoredKeywordMatchEval").unwrap(),
        OperatorKind::KeywordMatchEval
    );
    assert_eq!(
        OperatorKind::resolve("eval_response", "LiNativeEvaluator").unwrap(),
        OperatorKind::ResponseJudgeEval
    );
    let err = OperatorKind::resolve("eval_search", "LiNativeEvaluator").unwrap_err();
    assert!(err.to_string().contains("eval_search/ScoredKeywordMatchEval"));
}

#[test]
fn pipeline_runs_steps_and_records_config() {
    let root = tempdir().unwrap();
    let datasets = root.path().join("datasets");
    let operators = root.path().join("operators");
    write_json(
        &datasets.join("energy/recall/recall_results.json"),
        &recall_fixture(),
    );
    write_json(
        &operators.join("eval_search/config/top5.json"),
        &json!({"class_name": "ScoredKeywordMatchEval", "top_k": 5}),
    );

    let config = pipeline_config(json!({
        "datasets": ["energy"],
        "start_point": "recall",
        "start_prefix": "recall",
        "save_folder_prefix_list": ["config_name", "missing_key"],
        "pipeline": [{"operator": "eval_search", "config_name": "top5", "note": "first pass"}]
    }));

    let outputs = execute(&config, &datasets, &operators).unwrap();
    let expected = datasets.join("energy").join("recall_top5");
    assert_eq!(outputs, vec![expected.clone()]);
    assert!(expected.join("eval_results_detail.json").exists());

    let record: Value =
        serde_json::from_slice(&fs::read(expected.join(STEP_CONFIG_FILE)).unwrap()).unwrap();
    assert_eq!(record["operator"], "eval_search");
    assert_eq!(record["note"], "first pass");
    assert_eq!(record["operator_config"]["class_name"], "ScoredKeywordMatchEval");
    assert_eq!(
        record["input_folder"],
        datasets.join("energy").join("recall").display().to_string()
    );
}

#[test]
fn unknown_step_fails_before_any_step_runs() {
    let root = tempdir().unwrap();
    let datasets = root.path().join("datasets");
    let operators = root.path().join("operators");
    write_json(
        &datasets.join("energy/recall/recall_results.json"),
        &recall_fixture(),
    );
    write_json(
        &operators.join("eval_search/config/top5.json"),
        &json!({"class_name": "ScoredKeywordMatchEval"}),
    );
    write_json(
        &operators.join("eval_search/config/broken.json"),
        &json!({"class_name": "RemovedEvaluator"}),
    );

    let config = pipeline_config(json!({
        "datasets": ["energy"],
        "start_point": "recall",
        "start_prefix": "",
        "save_folder_prefix_list": ["config_name"],
        "pipeline": [
            {"operator": "eval_search", "config_name": "top5"},
            {"operator": "eval_search", "config_name": "broken"}
        ]
    }));

    let err = execute(&config, &datasets, &operators).unwrap_err();
    assert!(format!("{err:#}").contains("RemovedEvaluator"));
    assert!(!datasets.join("energy").join("top5").exists());
}

#[test]
fn operator_config_without_class_name_is_rejected() {
    let root = tempdir().unwrap();
    write_json(
        &root.path().join("eval_search/config/plain.json"),
        &json!({"top_k": 3}),
    );
    let config = pipeline_config(json!({
        "datasets": [],
        "start_point": "recall",
        "pipeline": [{"operator": "eval_search", "config_name": "plain"}]
    }));
    let err = resolve_steps(&config.pipeline, root.path()).unwrap_err();
    assert!(err.to_string().contains("has no class_name"));
}

#[test]
fn invalid_operator_settings_are_rejected_at_resolution() {
    let root = tempdir().unwrap();
    write_json(
        &root.path().join("eval_search/config/zero.json"),
        &json!({"class_name": "ScoredKeywordMatchEval", "top_k": 0}),
    );
    let config = pipeline_config(json!({
        "datasets": [],
        "start_point": "recall",
        "pipeline": [{"operator": "eval_search", "config_name": "zero"}]
    }));
    assert!(resolve_steps(&config.pipeline, root.path()).is_err());
}

#[test]
fn long_folder_names_are_shortened() {
    let root = tempdir().unwrap();
    let datasets = root.path().join("datasets");
    let operators = root.path().join("operators");
    write_json(
        &datasets.join("energy/recall/recall_results.json"),
        &recall_fixture(),
    );
    write_json(
        &operators.join("eval_search/config/top5.json"),
        &json!({"class_name": "ScoredKeywordMatchEval"}),
    );

    let long_tag = "t".repeat(300);
    let config = pipeline_config(json!({
        "datasets": ["energy"],
        "start_point": "recall",
        "start_prefix": "recall",
        "save_folder_prefix_list": ["tag"],
        "pipeline": [{"operator": "eval_search", "config_name": "top5", "tag": long_tag}]
    }));

    let outputs = execute(&config, &datasets, &operators).unwrap();
    let name = outputs[0].file_name().unwrap().to_str().unwrap().to_string();
    assert!(name.starts_with("short_"));
    assert!(outputs[0].as_os_str().len() <= 255);
    assert!(outputs[0].join(STEP_CONFIG_FILE).exists());
}
