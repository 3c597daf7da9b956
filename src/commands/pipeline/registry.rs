use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use crate::commands::{eval_response, eval_search};
use crate::config::{KeywordMatchConfig, ResponseEvalConfig};
use crate::llm::HttpCompletionClient;

/// Operators a pipeline step can name, keyed by operator folder and the
/// `class_name` of its config file.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OperatorKind {
    KeywordMatchEval,
    ResponseJudgeEval,
}

const REGISTRY: [(&str, &str, OperatorKind); 2] = [
    (
        "eval_search",
        "ScoredKeywordMatchEval",
        OperatorKind::KeywordMatchEval,
    ),
    (
        "eval_response",
        "LiNativeEvaluator",
        OperatorKind::ResponseJudgeEval,
    ),
];

impl OperatorKind {
    pub(crate) fn resolve(operator: &str, class_name: &str) -> Result<Self> {
        if let Some((_, _, kind)) = REGISTRY
            .iter()
            .find(|(name, class, _)| *name == operator && *class == class_name)
        {
            return Ok(*kind);
        }
        let known = REGISTRY
            .iter()
            .map(|(name, class, _)| format!("{name}/{class}"))
            .collect::<Vec<String>>()
            .join(", ");
        bail!("unknown operator {operator}/{class_name} (known: {known})");
    }

    pub(crate) fn operator(self) -> &'static str {
        match self {
            Self::KeywordMatchEval => "eval_search",
            Self::ResponseJudgeEval => "eval_response",
        }
    }

    /// Checks that `config` deserializes into this operator's settings.
    pub(crate) fn check_config(self, config: &Value) -> Result<()> {
        match self {
            Self::KeywordMatchEval => typed_config::<KeywordMatchConfig>(config)?.validate(),
            Self::ResponseJudgeEval => typed_config::<ResponseEvalConfig>(config)?.validate(),
        }
    }

    /// Runs the operator and returns the folder that feeds the next step.
    pub(crate) fn run(self, input_dir: &Path, output_dir: &Path, config: &Value) -> Result<PathBuf> {
        info!(
            operator = self.operator(),
            input_dir = %input_dir.display(),
            output_dir = %output_dir.display(),
            "running operator"
        );
        match self {
            Self::KeywordMatchEval => {
                let config = typed_config::<KeywordMatchConfig>(config)?;
                let outcome = eval_search::process(input_dir, output_dir, &config)?;
                info!(total = outcome.stats.total, "keyword match evaluation finished");
                Ok(outcome.output_dir)
            }
            Self::ResponseJudgeEval => {
                let config = typed_config::<ResponseEvalConfig>(config)?;
                let client = HttpCompletionClient::new(config.llm.clone())?;
                let outcome = eval_response::process(input_dir, output_dir, &config, &client)?;
                info!(
                    metrics = outcome.statistics.len(),
                    "response evaluation finished"
                );
                Ok(outcome.output_dir)
            }
        }
    }
}

fn typed_config<T: DeserializeOwned>(config: &Value) -> Result<T> {
    serde_json::from_value(config.clone()).context("operator config does not match its operator")
}
