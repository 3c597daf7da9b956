use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{info, warn};

use super::evaluator::{Evaluation, KeywordMatchEvaluator, SkipReason, into_evaluated_record};
use super::filters::DatasetFilter;
use super::offline::OfflineCorpus;
use super::output::{
    EvalCounts, EvalRunManifest, RUN_MANIFEST_FILE, SkippedQuery, StatsSnapshot,
    write_detail_csv, write_detail_json, write_scores_csv, write_summary_table,
};
use super::stats::CorpusStats;
use crate::cli::EvalSearchArgs;
use crate::config::{KeywordMatchConfig, load_operator_config};
use crate::model::{InputHash, QueryRecord};
use crate::util::{
    ensure_directory, now_utc_string, read_json, sha256_file, utc_compact_string,
    write_json_pretty,
};

pub(crate) const RECALL_RESULTS_FILE: &str = "recall_results.json";

#[derive(Debug, Clone)]
pub(crate) struct EvalSearchOutcome {
    pub output_dir: PathBuf,
    pub stats: CorpusStats,
}

pub fn run(args: EvalSearchArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let outcome = process(&args.input_dir, &args.output_dir, &config)?;

    let mut output = io::BufWriter::new(io::stdout().lock());
    write_summary_table(&mut output, &outcome.stats)?;
    output.flush()?;
    Ok(())
}

fn resolve_config(args: &EvalSearchArgs) -> Result<KeywordMatchConfig> {
    let mut config = match &args.config {
        Some(path) => load_operator_config::<KeywordMatchConfig>(path)?,
        None => KeywordMatchConfig::default(),
    };
    if let Some(top_k) = args.top_k {
        config.top_k = top_k;
    }
    if let Some(error_ratio) = args.error_ratio {
        config.error_ratio = error_ratio;
    }
    if args.fuzzy_tolerance {
        config.fuzzy_tolerance = true;
    }
    if let Some(thread_num) = args.thread_num {
        config.thread_num = thread_num;
    }
    if let Some(filter) = &args.dataset_filter {
        config.dataset_filter = filter.clone();
    }
    if let Some(file) = &args.offline_corpus_file {
        config.offline_corpus_file = file.clone();
    }
    Ok(config)
}

/// Evaluates `<input_dir>/recall_results.json` and writes the detail and
/// score reports into `output_dir`.
pub(crate) fn process(
    input_dir: &Path,
    output_dir: &Path,
    config: &KeywordMatchConfig,
) -> Result<EvalSearchOutcome> {
    config.validate()?;
    let dataset_filter = DatasetFilter::parse(&config.dataset_filter)?;

    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("eval-search-{}", utc_compact_string(started_ts));
    ensure_directory(output_dir)?;

    info!(
        run_id = %run_id,
        input_dir = %input_dir.display(),
        top_k = config.top_k,
        error_ratio = config.error_ratio,
        fuzzy_tolerance = config.fuzzy_tolerance,
        thread_num = config.thread_num,
        dataset_filter = dataset_filter.as_str(),
        "starting retrieval evaluation"
    );

    let recall_path = input_dir.join(RECALL_RESULTS_FILE);
    let raw_records: Vec<Value> = read_json(&recall_path)?;
    let records_read = raw_records.len();
    info!(path = %recall_path.display(), records = records_read, "loaded recall results");

    let mut skipped = Vec::new();
    let mut records = Vec::with_capacity(records_read);
    for (index, raw) in raw_records.into_iter().enumerate() {
        let query = raw
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match serde_json::from_value::<QueryRecord>(raw) {
            Ok(record) => records.push((index, record)),
            Err(err) => {
                warn!(index, query = %query, error = %err, "malformed recall record skipped");
                skipped.push(SkippedQuery {
                    index,
                    query,
                    reason: SkipReason::MalformedRecord,
                    error: Some(err.to_string()),
                });
            }
        }
    }
    let records_parsed = records.len();

    let mut warnings = Vec::new();
    let mut inputs = vec![InputHash {
        path: recall_path.display().to_string(),
        sha256: sha256_file(&recall_path)?,
    }];

    let offline_path = input_dir.join(&config.offline_corpus_file);
    let offline = OfflineCorpus::load(&offline_path)?;
    if offline_path.exists() {
        inputs.push(InputHash {
            path: offline_path.display().to_string(),
            sha256: sha256_file(&offline_path)?,
        });
    } else {
        warnings.push(format!(
            "offline corpus missing at {}; offline tier disabled",
            offline_path.display()
        ));
    }
    let offline_corpus_nodes = offline.len();
    if offline.is_empty() && offline_path.exists() {
        warn!(path = %offline_path.display(), "offline corpus is empty");
    }

    let selected = records
        .into_iter()
        .filter(|(_, record)| dataset_filter.accepts(record.meta_info.as_ref()))
        .collect::<Vec<(usize, QueryRecord)>>();
    let filtered_out = records_parsed - selected.len();
    if filtered_out > 0 {
        info!(
            filter = dataset_filter.as_str(),
            filtered_out, "records excluded by dataset filter"
        );
    }

    let evaluator = KeywordMatchEvaluator::new(config, offline);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.thread_num)
        .build()
        .context("failed to build evaluation thread pool")?;

    let evaluations = pool.install(|| {
        selected
            .into_par_iter()
            .map(|(index, record)| {
                let evaluation = evaluator.evaluate(&record);
                (index, record, evaluation)
            })
            .collect::<Vec<_>>()
    });

    let stats = pool.install(|| {
        evaluations
            .par_iter()
            .fold(CorpusStats::default, |mut stats, (_, _, evaluation)| {
                if let Evaluation::Evaluated(result) = evaluation {
                    stats.record(result);
                }
                stats
            })
            .reduce(CorpusStats::default, CorpusStats::merge)
    });

    let mut evaluated = Vec::with_capacity(evaluations.len());
    for (index, record, evaluation) in evaluations {
        match evaluation {
            Evaluation::Evaluated(result) => {
                evaluated.push(into_evaluated_record(record, result, evaluator.top_k()));
            }
            Evaluation::Skipped(reason) => {
                info!(index, query = %record.query, reason = reason.as_str(), "query skipped");
                skipped.push(SkippedQuery {
                    index,
                    query: record.query,
                    reason,
                    error: None,
                });
            }
        }
    }
    skipped.sort_by_key(|entry| entry.index);

    write_detail_json(output_dir, &evaluated)?;
    write_detail_csv(output_dir, &evaluated)?;
    write_scores_csv(output_dir, &stats)?;

    let snapshot = StatsSnapshot::from_stats(stats);
    info!(
        total = stats.total,
        top_hit = %snapshot.top_hit_rate,
        recall_hit = %snapshot.recall_hit_rate,
        offline_hit = %snapshot.offline_hit_rate,
        skipped = skipped.len(),
        "retrieval evaluation completed"
    );

    let manifest = EvalRunManifest {
        manifest_version: 1,
        run_id,
        started_at,
        finished_at: now_utc_string(),
        input_dir: input_dir.display().to_string(),
        output_dir: output_dir.display().to_string(),
        config: config.clone(),
        offline_corpus_nodes,
        inputs,
        counts: EvalCounts {
            records_read,
            filtered_out,
            skipped: skipped.len(),
            evaluated: evaluated.len(),
        },
        statistics: snapshot,
        skipped,
        warnings,
    };
    let manifest_path = output_dir.join(RUN_MANIFEST_FILE);
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote run manifest");

    Ok(EvalSearchOutcome {
        output_dir: output_dir.to_path_buf(),
        stats,
    })
}
