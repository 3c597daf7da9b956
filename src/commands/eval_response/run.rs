use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use super::judges::{JudgeCase, JudgeKind, ResponseJudge};
use super::stats::{ResponseEvalResult, judge_statistics};
use crate::cli::EvalResponseArgs;
use crate::commands::eval_search::DETAIL_JSON_FILE;
use crate::config::{ResponseEvalConfig, load_operator_config};
use crate::llm::{CompletionClient, HttpCompletionClient, RetryPolicy};
use crate::model::{EvaluatedRecord, PredictionExample, PredictionSet};
use crate::util::{ensure_directory, read_json, write_json_pretty};

pub(crate) const PREDICTIONS_FILE: &str = "predictions.json";
pub(crate) const RESULTS_FILE: &str = "eval_results.json";
pub(crate) const STATISTIC_CSV_FILE: &str = "statistic.csv";

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ResponseEvalRecord {
    #[serde(flatten)]
    pub example: PredictionExample,
    pub eval_result: ResponseEvalResult,
}

#[derive(Debug, Clone)]
pub(crate) struct ResponseEvalOutcome {
    pub output_dir: PathBuf,
    pub statistics: Vec<(String, f64)>,
}

pub fn run(args: EvalResponseArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let client = HttpCompletionClient::new(config.llm.clone())?;
    let outcome = process(&args.input_dir, &args.output_dir, &config, &client)?;

    let mut output = io::BufWriter::new(io::stdout().lock());
    for (key, value) in &outcome.statistics {
        writeln!(output, "{key:<32}\t{value:.4}")?;
    }
    output.flush()?;
    Ok(())
}

fn resolve_config(args: &EvalResponseArgs) -> Result<ResponseEvalConfig> {
    let mut config = match &args.config {
        Some(path) => load_operator_config::<ResponseEvalConfig>(path)?,
        None => ResponseEvalConfig::default(),
    };
    if let Some(thread_num) = args.thread_num {
        config.thread_num = thread_num;
    }
    if let Some(model) = &args.model {
        config.llm.model = model.clone();
    }
    if let Some(api_base) = &args.api_base {
        config.llm.api_base = api_base.clone();
    }
    if let Some(folder) = &args.search_eval_results {
        config.search_eval_results = folder.clone();
    }
    Ok(config)
}

/// Judges every prediction in `<input_dir>/predictions.json` and writes
/// `eval_results.json` and `statistic.csv` into `output_dir`.
pub(crate) fn process(
    input_dir: &Path,
    output_dir: &Path,
    config: &ResponseEvalConfig,
    client: &dyn CompletionClient,
) -> Result<ResponseEvalOutcome> {
    config.validate()?;
    ensure_directory(output_dir)?;

    let predictions_path = input_dir.join(PREDICTIONS_FILE);
    let set: PredictionSet = read_json(&predictions_path)?;
    info!(
        path = %predictions_path.display(),
        examples = set.examples.len(),
        model = %config.llm.model,
        context_window = config.llm.context_window(),
        thread_num = config.thread_num,
        "starting response evaluation"
    );

    let search_hits = match config.search_eval_results.trim() {
        "" => None,
        folder => Some(load_search_hits(input_dir, folder)?),
    };

    let judge = ResponseJudge::new(client, RetryPolicy::from_settings(&config.llm))?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.thread_num)
        .build()
        .context("failed to build evaluation thread pool")?;

    let records = pool.install(|| {
        set.examples
            .into_par_iter()
            .map(|example| {
                let mut eval_result = judge_example(&judge, &example);
                if let Some(hits) = &search_hits {
                    eval_result.search_eval = hits.get(&example.query).cloned();
                    if eval_result.search_eval.is_none() {
                        warn!(query = %example.query, "no retrieval evaluation for query");
                    }
                }
                ResponseEvalRecord {
                    example,
                    eval_result,
                }
            })
            .collect::<Vec<ResponseEvalRecord>>()
    });

    let results = records
        .iter()
        .map(|record| record.eval_result.clone())
        .collect::<Vec<ResponseEvalResult>>();
    let statistics = judge_statistics(&results);

    let results_path = output_dir.join(RESULTS_FILE);
    write_json_pretty(&results_path, &records)?;
    write_statistic_csv(output_dir, &statistics)?;

    for (key, value) in &statistics {
        info!(metric = %key, value = format!("{value:.4}"), "response metric");
    }
    info!(
        path = %results_path.display(),
        examples = records.len(),
        "response evaluation completed"
    );

    Ok(ResponseEvalOutcome {
        output_dir: output_dir.to_path_buf(),
        statistics,
    })
}

fn judge_example(judge: &ResponseJudge<'_>, example: &PredictionExample) -> ResponseEvalResult {
    let contexts = example
        .predictions
        .source_nodes
        .iter()
        .map(|passage| passage.text().to_string())
        .collect::<Vec<String>>();
    let case = JudgeCase {
        query: &example.query,
        response: example.predictions.response.as_deref().unwrap_or_default(),
        contexts: &contexts,
        reference: &example.reference_answer,
    };

    let judgements = JudgeKind::ALL
        .iter()
        .map(|kind| (kind.name().to_string(), judge.judge(*kind, &case)))
        .collect::<BTreeMap<_, _>>();
    ResponseEvalResult {
        judgements,
        search_eval: None,
    }
}

/// Maps query text to the retrieval tier recorded by a sibling
/// `eval-search` output folder.
fn load_search_hits(input_dir: &Path, folder: &str) -> Result<HashMap<String, String>> {
    let parent = input_dir.parent().unwrap_or(input_dir);
    let path = parent.join(folder).join(DETAIL_JSON_FILE);
    let records: Vec<EvaluatedRecord> =
        read_json(&path).context("failed to load retrieval evaluation for merging")?;
    info!(path = %path.display(), records = records.len(), "merging retrieval evaluation");
    Ok(records
        .into_iter()
        .map(|record| (record.query, record.eval_results.hit_by.as_str().to_string()))
        .collect())
}

fn write_statistic_csv(output_dir: &Path, statistics: &[(String, f64)]) -> Result<()> {
    let path = output_dir.join(STATISTIC_CSV_FILE);
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for (key, value) in statistics {
        writer.write_record([key.clone(), format!("{value:.4}")])?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
