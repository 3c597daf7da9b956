use serde::Serialize;

use super::gold_match::{KeywordSpec, MatchOptions, find_gold, prepare_keywords};
use super::offline::OfflineCorpus;
use crate::config::KeywordMatchConfig;
use crate::model::{EvalResult, EvaluatedRecord, HitBy, Passage, QueryRecord};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SkipReason {
    EmptyFineKeywords,
    EmptyCoarseKeywords,
    MalformedRecord,
}

impl SkipReason {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::EmptyFineKeywords => "empty_fine_keywords",
            Self::EmptyCoarseKeywords => "empty_coarse_keywords",
            Self::MalformedRecord => "malformed_record",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Evaluation {
    Evaluated(EvalResult),
    Skipped(SkipReason),
}

/// Keyword-grounded retrieval evaluator.
///
/// Each query is matched against its top-k passages, then its whole recall
/// list, then the offline corpus; the first tier that covers every keyword
/// group decides `hit_by`. Score, missing keywords and matched content always
/// describe the top-k attempt.
#[derive(Debug, Clone)]
pub(crate) struct KeywordMatchEvaluator {
    top_k: usize,
    error_ratio: f64,
    fuzzy_tolerance: bool,
    offline: OfflineCorpus,
}

impl KeywordMatchEvaluator {
    pub(crate) fn new(config: &KeywordMatchConfig, offline: OfflineCorpus) -> Self {
        Self {
            top_k: config.top_k,
            error_ratio: config.error_ratio,
            fuzzy_tolerance: config.fuzzy_tolerance,
            offline,
        }
    }

    pub(crate) fn top_k(&self) -> usize {
        self.top_k
    }

    fn options(&self, need_norm: bool) -> MatchOptions {
        MatchOptions {
            need_norm,
            error_ratio: self.error_ratio,
            fuzzy_tolerance: self.fuzzy_tolerance,
        }
    }

    pub(crate) fn evaluate(&self, record: &QueryRecord) -> Evaluation {
        let keywords = KeywordSpec::prepare(&record.fine_keywords);
        if keywords.is_empty() {
            return Evaluation::Skipped(SkipReason::EmptyFineKeywords);
        }
        let coarse_keywords = prepare_keywords(&record.coarse_keywords);
        if coarse_keywords.is_empty() {
            return Evaluation::Skipped(SkipReason::EmptyCoarseKeywords);
        }

        let recall = &record.recall_results.source_nodes;
        let top = top_k_slice(recall, self.top_k);

        let first = find_gold(top, &keywords, &coarse_keywords, self.options(true));
        let (hit_by, gold_result) = if first.hit {
            (HitBy::TopHit, first.gold_result)
        } else {
            let recall_match = find_gold(recall, &keywords, &coarse_keywords, self.options(true));
            if recall_match.hit {
                (HitBy::RecallHit, recall_match.gold_result)
            } else {
                let offline_match = find_gold(
                    self.offline.passages(),
                    &keywords,
                    &coarse_keywords,
                    self.options(false),
                );
                if offline_match.hit {
                    (HitBy::OfflineHit, offline_match.gold_result)
                } else {
                    (HitBy::NoHit, Vec::new())
                }
            }
        };

        Evaluation::Evaluated(EvalResult {
            hit_by,
            hit_score: first.score,
            keywords_missing: first.missing,
            keywords_content: first.matched_text,
            gold_result,
            prompt: build_prompt(top),
        })
    }
}

pub(crate) fn top_k_slice(passages: &[Passage], top_k: usize) -> &[Passage] {
    &passages[..passages.len().min(top_k)]
}

/// Context an answer synthesizer would see: top-k texts separated by a
/// blank line.
pub(crate) fn build_prompt(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(Passage::text)
        .collect::<Vec<&str>>()
        .join("\n\n")
}

pub(crate) fn into_evaluated_record(
    record: QueryRecord,
    eval_results: EvalResult,
    top_k: usize,
) -> EvaluatedRecord {
    let QueryRecord {
        query,
        fine_keywords,
        coarse_keywords,
        recall_results,
        meta_info,
        extra,
    } = record;
    let mut topk_results = recall_results.source_nodes;
    topk_results.truncate(top_k);

    EvaluatedRecord {
        query,
        fine_keywords,
        coarse_keywords,
        meta_info,
        extra,
        eval_results,
        topk_results,
    }
}
