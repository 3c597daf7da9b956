use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::util::read_json;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_ERROR_RATIO: f64 = 0.15;
pub const DEFAULT_THREAD_NUM: usize = 1;
pub const DEFAULT_DATASET_FILTER: &str = "no_filter";

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo-0301";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Settings of the keyword-match retrieval evaluator
/// (`eval_search/config/<name>.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordMatchConfig {
    pub top_k: usize,
    pub error_ratio: f64,
    pub fuzzy_tolerance: bool,
    pub thread_num: usize,
    pub dataset_filter: String,
    pub offline_corpus_file: String,
}

impl Default for KeywordMatchConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            error_ratio: DEFAULT_ERROR_RATIO,
            fuzzy_tolerance: false,
            thread_num: DEFAULT_THREAD_NUM,
            dataset_filter: DEFAULT_DATASET_FILTER.to_string(),
            offline_corpus_file: "parsed_files.json".to_string(),
        }
    }
}

impl KeywordMatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            bail!("top_k must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.error_ratio) {
            bail!("error_ratio must be within [0, 1], got {}", self.error_ratio);
        }
        if self.thread_num == 0 {
            bail!("thread_num must be at least 1");
        }
        Ok(())
    }
}

/// Connection and sampling settings handed to every LLM-backed component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub api_base: String,
    pub api_key_env: String,
    pub temperature: f64,
    pub top_p: f64,
    pub seed: u64,
    pub n: u32,
    pub max_tokens: u32,
    pub max_input_tokens: u32,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            temperature: 0.0,
            top_p: 0.0,
            seed: 1234,
            n: 1,
            max_tokens: 1000,
            max_input_tokens: 3000,
            max_retries: 3,
            retry_base_ms: 500,
            retry_max_ms: 8000,
            timeout_secs: 60,
        }
    }
}

impl LlmSettings {
    pub fn context_window(&self) -> u32 {
        self.max_tokens + self.max_input_tokens
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            bail!("llm model must not be empty");
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            bail!("llm temperature must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            bail!("llm top_p must be within [0, 1]");
        }
        if self.n == 0 || self.max_tokens == 0 || self.max_input_tokens == 0 {
            bail!("llm n, max_tokens and max_input_tokens must be positive");
        }
        Ok(())
    }
}

/// Settings of the LLM-judged response evaluator
/// (`eval_response/config/<name>.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ResponseEvalConfigFile")]
pub struct ResponseEvalConfig {
    pub thread_num: usize,
    pub search_eval_results: String,
    pub llm: LlmSettings,
}

impl Default for ResponseEvalConfig {
    fn default() -> Self {
        Self {
            thread_num: DEFAULT_THREAD_NUM,
            search_eval_results: String::new(),
            llm: LlmSettings::default(),
        }
    }
}

/// On-disk shape of [`ResponseEvalConfig`]. A top-level `base_llm` names the
/// judge model and takes precedence over `llm.model`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ResponseEvalConfigFile {
    thread_num: usize,
    search_eval_results: String,
    base_llm: Option<String>,
    llm: LlmSettings,
}

impl Default for ResponseEvalConfigFile {
    fn default() -> Self {
        let defaults = ResponseEvalConfig::default();
        Self {
            thread_num: defaults.thread_num,
            search_eval_results: defaults.search_eval_results,
            base_llm: None,
            llm: defaults.llm,
        }
    }
}

impl TryFrom<ResponseEvalConfigFile> for ResponseEvalConfig {
    type Error = String;

    fn try_from(file: ResponseEvalConfigFile) -> std::result::Result<Self, Self::Error> {
        let mut llm = file.llm;
        if let Some(model) = file.base_llm {
            if model.trim().is_empty() {
                return Err("base_llm must not be empty".to_string());
            }
            llm.model = model;
        }
        Ok(Self {
            thread_num: file.thread_num,
            search_eval_results: file.search_eval_results,
            llm,
        })
    }
}

impl ResponseEvalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.thread_num == 0 {
            bail!("thread_num must be at least 1");
        }
        self.llm.validate()
    }
}

/// Reads an operator config file. `class_name` and other bookkeeping keys
/// are ignored by the typed configs.
pub fn load_operator_config<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    read_json(path).with_context(|| format!("invalid operator config: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::{KeywordMatchConfig, LlmSettings, ResponseEvalConfig};

    #[test]
    fn keyword_match_config_fills_defaults_and_ignores_class_name() {
        let raw = r#"{"class_name": "ScoredKeywordMatchEval", "top_k": 3}"#;
        let config: KeywordMatchConfig =
            serde_json::from_str(raw).expect("partial config should deserialize");
        assert_eq!(config.top_k, 3);
        assert_eq!(config.error_ratio, 0.15);
        assert!(!config.fuzzy_tolerance);
        assert_eq!(config.dataset_filter, "no_filter");
        config.validate().expect("defaults should validate");
    }

    #[test]
    fn keyword_match_config_rejects_zero_top_k() {
        let config = KeywordMatchConfig {
            top_k: 0,
            ..KeywordMatchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn response_eval_config_reads_nested_llm_settings() {
        let raw = r#"{"thread_num": 4, "llm": {"model": "gpt-4", "max_retries": 5}}"#;
        let config: ResponseEvalConfig =
            serde_json::from_str(raw).expect("nested config should deserialize");
        assert_eq!(config.thread_num, 4);
        assert_eq!(config.llm.model, "gpt-4");
        assert_eq!(config.llm.max_retries, 5);
        assert_eq!(config.llm.seed, 1234);
        assert_eq!(config.llm.context_window(), 4000);
    }

    #[test]
    fn response_eval_config_takes_model_from_base_llm() {
        let raw = r#"{"class_name": "LiNativeEvaluator", "base_llm": "gpt-4"}"#;
        let config: ResponseEvalConfig =
            serde_json::from_str(raw).expect("base_llm config should deserialize");
        assert_eq!(config.llm.model, "gpt-4");
        assert_eq!(config.thread_num, 1);

        let both = r#"{"base_llm": "gpt-4", "llm": {"model": "gpt-3.5-turbo", "seed": 7}}"#;
        let config: ResponseEvalConfig =
            serde_json::from_str(both).expect("base_llm with llm block should deserialize");
        assert_eq!(config.llm.model, "gpt-4");
        assert_eq!(config.llm.seed, 7);

        let blank = r#"{"base_llm": "  "}"#;
        assert!(serde_json::from_str::<ResponseEvalConfig>(blank).is_err());
    }

    #[test]
    fn llm_settings_reject_out_of_range_temperature() {
        let settings = LlmSettings {
            temperature: 1.5,
            ..LlmSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
