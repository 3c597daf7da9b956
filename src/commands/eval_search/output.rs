use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use super::evaluator::SkipReason;
use super::stats::CorpusStats;
use crate::config::KeywordMatchConfig;
use crate::model::{EvaluatedRecord, InputHash};
use crate::util::write_json_pretty;

pub(crate) const DETAIL_JSON_FILE: &str = "eval_results_detail.json";
pub(crate) const DETAIL_CSV_FILE: &str = "eval_results_detail.csv";
pub(crate) const SCORES_CSV_FILE: &str = "eval_results_scores.csv";
pub(crate) const RUN_MANIFEST_FILE: &str = "eval_run_manifest.json";

const DETAIL_CSV_HEADER: [&str; 9] = [
    "query",
    "reference_answer",
    "hit_by",
    "hit_score",
    "keywords_missing",
    "keywords_content",
    "prompt",
    "gold_result",
    "meta_info",
];

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SkippedQuery {
    pub index: usize,
    pub query: String,
    pub reason: SkipReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct EvalCounts {
    pub records_read: usize,
    pub filtered_out: usize,
    pub skipped: usize,
    pub evaluated: usize,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct StatsSnapshot {
    #[serde(flatten)]
    pub stats: CorpusStats,
    pub mean_hit_score: Option<f64>,
    pub top_hit_rate: String,
    pub recall_hit_rate: String,
    pub offline_hit_rate: String,
}

impl StatsSnapshot {
    pub(crate) fn from_stats(stats: CorpusStats) -> Self {
        let rows = stats.summary_rows();
        let rate = |index: usize| rows.get(index).map(|row| row.formatted()).unwrap_or_default();
        Self {
            stats,
            mean_hit_score: stats.mean_hit_score(),
            top_hit_rate: rate(0),
            recall_hit_rate: rate(1),
            offline_hit_rate: rate(2),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct EvalRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub input_dir: String,
    pub output_dir: String,
    pub config: KeywordMatchConfig,
    pub offline_corpus_nodes: usize,
    pub inputs: Vec<InputHash>,
    pub counts: EvalCounts,
    pub statistics: StatsSnapshot,
    pub skipped: Vec<SkippedQuery>,
    pub warnings: Vec<String>,
}

pub(crate) fn write_detail_json(output_dir: &Path, records: &[EvaluatedRecord]) -> Result<()> {
    write_json_pretty(&output_dir.join(DETAIL_JSON_FILE), &records)
}

pub(crate) fn write_detail_csv(output_dir: &Path, records: &[EvaluatedRecord]) -> Result<()> {
    let path = output_dir.join(DETAIL_CSV_FILE);
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(DETAIL_CSV_HEADER)?;

    for record in records {
        let result = &record.eval_results;
        let reference_answer = match record.extra.get("reference_answer") {
            Some(Value::String(answer)) => answer.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let meta_info = record
            .meta_info
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default();

        writer.write_record([
            record.query.clone(),
            reference_answer,
            result.hit_by.as_str().to_string(),
            result.hit_score.to_string(),
            serde_json::to_string(&result.keywords_missing)?,
            result.keywords_content.clone(),
            result.prompt.clone(),
            serde_json::to_string(&result.gold_result)?,
            meta_info,
        ])?;
    }

    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub(crate) fn write_scores_csv(output_dir: &Path, stats: &CorpusStats) -> Result<()> {
    let path = output_dir.join(SCORES_CSV_FILE);
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(["metric", "value"])?;
    for row in stats.summary_rows() {
        writer.write_record([row.metric.to_string(), row.formatted()])?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub(crate) fn write_summary_table<W: Write>(output: &mut W, stats: &CorpusStats) -> Result<()> {
    writeln!(output, "Queries evaluated: {}", stats.total)?;
    writeln!(output, "{:<12}\t{:>6}\t{:>8}", "metric", "count", "share")?;
    for row in stats.summary_rows() {
        writeln!(
            output,
            "{:<12}\t{:>6}\t{:>8}",
            row.metric,
            row.count,
            row.formatted()
        )?;
    }
    if let Some(mean) = stats.mean_hit_score() {
        writeln!(output, "mean_hit_score: {mean:.4}")?;
    }
    Ok(())
}
