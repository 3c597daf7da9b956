use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use super::registry::OperatorKind;
use crate::cli::PipelineArgs;
use crate::util::{MAX_PATH_LENGTH, ensure_directory, read_json, truncate_file_name, write_json_pretty};

pub(crate) const STEP_CONFIG_FILE: &str = "config.json";
const SHORT_NAME_PREFIX: &str = "short_";

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PipelineConfig {
    pub datasets: Vec<String>,
    pub start_point: String,
    #[serde(default)]
    pub start_prefix: String,
    #[serde(default)]
    pub save_folder_prefix_list: Vec<String>,
    pub pipeline: Vec<PipelineStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PipelineStep {
    pub operator: String,
    pub config_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PipelineStep {
    /// Folder-name fragment contributed by `key`, if the step sets it.
    fn prefix_value(&self, key: &str) -> Option<String> {
        match key {
            "operator" => Some(self.operator.clone()),
            "config_name" => Some(self.config_name.clone()),
            _ => match self.extra.get(key)? {
                Value::String(value) => Some(value.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            },
        }
    }
}

/// A step whose operator and config file were resolved up front.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedStep {
    pub step: PipelineStep,
    pub kind: OperatorKind,
    pub operator_config: Value,
}

/// Written as `config.json` into every step's output folder.
#[derive(Debug, Serialize)]
struct StepRecord<'a> {
    #[serde(flatten)]
    step: &'a PipelineStep,
    input_folder: String,
    operator_config: &'a Value,
}

pub fn run(args: PipelineArgs) -> Result<()> {
    let config: PipelineConfig = read_json(&args.config)
        .with_context(|| format!("invalid pipeline config: {}", args.config.display()))?;
    let outputs = execute(&config, &args.datasets_root, &args.operators_root)?;
    for output in outputs {
        println!("{}", output.display());
    }
    Ok(())
}

/// Runs every step for every dataset and returns the final output folder
/// of each dataset.
pub(crate) fn execute(
    config: &PipelineConfig,
    datasets_root: &Path,
    operators_root: &Path,
) -> Result<Vec<PathBuf>> {
    if config.pipeline.is_empty() {
        bail!("pipeline has no steps");
    }
    let steps = resolve_steps(&config.pipeline, operators_root)?;
    info!(
        datasets = config.datasets.len(),
        steps = steps.len(),
        "pipeline resolved"
    );

    let mut finals = Vec::with_capacity(config.datasets.len());
    for dataset in &config.datasets {
        let dataset_dir = datasets_root.join(dataset);
        let mut input_dir = dataset_dir.join(&config.start_point);
        let mut prefixes = Vec::new();
        if !config.start_prefix.is_empty() {
            prefixes.push(config.start_prefix.clone());
        }

        for resolved in &steps {
            prefixes.extend(
                config
                    .save_folder_prefix_list
                    .iter()
                    .filter_map(|key| resolved.step.prefix_value(key)),
            );
            let output_dir = step_output_dir(&dataset_dir, &prefixes)?;
            ensure_directory(&output_dir)?;

            let produced = resolved
                .kind
                .run(&input_dir, &output_dir, &resolved.operator_config)
                .with_context(|| {
                    format!(
                        "step {}/{} failed for dataset {dataset}",
                        resolved.step.operator, resolved.step.config_name
                    )
                })?;

            let record = StepRecord {
                step: &resolved.step,
                input_folder: input_dir.display().to_string(),
                operator_config: &resolved.operator_config,
            };
            write_json_pretty(&produced.join(STEP_CONFIG_FILE), &record)?;
            info!(
                dataset = %dataset,
                operator = %resolved.step.operator,
                output_dir = %produced.display(),
                "finished step"
            );
            input_dir = produced;
        }
        finals.push(input_dir);
    }
    Ok(finals)
}

/// Loads each step's operator config and maps it onto the registry so that
/// a bad step fails before any work starts.
pub(crate) fn resolve_steps(steps: &[PipelineStep], operators_root: &Path) -> Result<Vec<ResolvedStep>> {
    steps
        .iter()
        .map(|step| {
            let path = operators_root
                .join(&step.operator)
                .join("config")
                .join(format!("{}.json", step.config_name));
            let operator_config: Value = read_json(&path)
                .with_context(|| format!("invalid operator config: {}", path.display()))?;
            let Some(class_name) = operator_config.get("class_name").and_then(Value::as_str) else {
                bail!("operator config {} has no class_name", path.display());
            };
            let kind = OperatorKind::resolve(&step.operator, class_name)?;
            kind.check_config(&operator_config)
                .with_context(|| format!("invalid operator config: {}", path.display()))?;
            Ok(ResolvedStep {
                step: step.clone(),
                kind,
                operator_config,
            })
        })
        .collect()
}

fn step_output_dir(dataset_dir: &Path, prefixes: &[String]) -> Result<PathBuf> {
    let name = prefixes.join("_");
    if name.is_empty() {
        bail!("step output folder name is empty; set start_prefix or save_folder_prefix_list");
    }
    Ok(truncate_file_name(
        &dataset_dir.join(name),
        MAX_PATH_LENGTH,
        SHORT_NAME_PREFIX,
    ))
}
