mod evaluator;
mod filters;
mod gold_match;
mod offline;
mod output;
mod run;
mod stats;

pub(crate) use output::{DETAIL_JSON_FILE, StatsSnapshot, write_summary_table};
pub(crate) use run::{process, run};
pub(crate) use stats::{CorpusStats, aggregate};
