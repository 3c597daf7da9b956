use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "ragbench",
    version,
    about = "Keyword-grounded retrieval and response evaluation for RAG pipelines"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    EvalSearch(EvalSearchArgs),
    EvalResponse(EvalResponseArgs),
    Pipeline(PipelineArgs),
    Report(ReportArgs),
}

#[derive(Args, Debug, Clone)]
pub struct EvalSearchArgs {
    /// Folder holding `recall_results.json` and the offline corpus.
    #[arg(long)]
    pub input_dir: PathBuf,

    #[arg(long)]
    pub output_dir: PathBuf,

    /// Operator config file; flags below override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub top_k: Option<usize>,

    #[arg(long)]
    pub error_ratio: Option<f64>,

    #[arg(long, default_value_t = false)]
    pub fuzzy_tolerance: bool,

    #[arg(long)]
    pub thread_num: Option<usize>,

    #[arg(long)]
    pub dataset_filter: Option<String>,

    #[arg(long)]
    pub offline_corpus_file: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EvalResponseArgs {
    /// Folder holding `predictions.json`.
    #[arg(long)]
    pub input_dir: PathBuf,

    #[arg(long)]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub thread_num: Option<usize>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub api_base: Option<String>,

    /// Sibling folder with an `eval-search` detail file to merge.
    #[arg(long)]
    pub search_eval_results: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    #[arg(long)]
    pub config: PathBuf,

    #[arg(long, default_value = "datasets")]
    pub datasets_root: PathBuf,

    #[arg(long, default_value = ".")]
    pub operators_root: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[arg(long)]
    pub results: PathBuf,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}
