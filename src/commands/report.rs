use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::cli::ReportArgs;
use crate::commands::eval_search::{CorpusStats, StatsSnapshot, aggregate, write_summary_table};
use crate::model::EvaluatedRecord;
use crate::util::read_json;

pub fn run(args: ReportArgs) -> Result<()> {
    let stats = load_stats(&args.results)?;

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        serde_json::to_writer_pretty(&mut output, &StatsSnapshot::from_stats(stats))?;
        writeln!(output)?;
    } else {
        write_summary_table(&mut output, &stats)?;
    }
    output.flush()?;
    Ok(())
}

/// Re-aggregates a saved `eval_results_detail.json`.
fn load_stats(path: &Path) -> Result<CorpusStats> {
    let records: Vec<EvaluatedRecord> = read_json(path)?;
    info!(path = %path.display(), records = records.len(), "report requested");
    Ok(aggregate(records.iter().map(|record| &record.eval_results)))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;
    use tempfile::tempdir;

    use super::load_stats;

    fn detail(hit_by: &str, hit_score: f64) -> serde_json::Value {
        json!({
            "query": format!("query {hit_by}"),
            "fine_keywords": ["coal"],
            "coarse_keywords": ["coal"],
            "eval_results": {
                "hit_by": hit_by,
                "hit_score": hit_score,
                "keywords_missing": [],
                "keywords_content": "",
                "gold_result": [],
                "prompt": ""
            },
            "topk_results": []
        })
    }

    #[test]
    fn report_reaggregates_saved_details() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("eval_results_detail.json");
        let records = json!([
            detail("top_hit", 1.0),
            detail("offline_hit", 0.5),
            detail("no_hit", 0.0),
            detail("recall_hit", 0.5)
        ]);
        fs::write(&path, serde_json::to_vec(&records).unwrap()).unwrap();

        let stats = load_stats(&path).unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.top_hit, 3);
        assert_eq!(stats.recall_hit, 2);
        assert_eq!(stats.offline_hit, 1);
        assert_eq!(stats.mean_hit_score(), Some(0.5));
    }

    #[test]
    fn report_fails_on_missing_file() {
        let dir = tempdir().unwrap();
        assert!(load_stats(&dir.path().join("absent.json")).is_err());
    }
}
