use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use super::judges::{JudgeKind, JudgeOutcome};

/// Judge outcomes keyed by judge name, plus the retrieval tier of the same
/// query when a search evaluation was merged in.
#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct ResponseEvalResult {
    #[serde(flatten)]
    pub judgements: BTreeMap<String, JudgeOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_eval: Option<String>,
}

/// Mean of `{judge}_valid`, `{judge}_passing` and `{judge}_score` over all
/// examples, in that metric order. Invalid or missing judgements count as
/// zero but stay in the denominator.
pub(crate) fn judge_statistics(results: &[ResponseEvalResult]) -> Vec<(String, f64)> {
    if results.is_empty() {
        return Vec::new();
    }
    let total = results.len() as f64;

    let mut valid = vec![0usize; JudgeKind::ALL.len()];
    let mut passing = vec![0usize; JudgeKind::ALL.len()];
    let mut score = vec![0.0f64; JudgeKind::ALL.len()];

    for result in results {
        for (slot, kind) in JudgeKind::ALL.iter().enumerate() {
            let Some(outcome) = result.judgements.get(kind.name()) else {
                continue;
            };
            if outcome.invalid_result {
                warn!(
                    judge = kind.name(),
                    query = %outcome.query,
                    reason = outcome.invalid_reason.as_deref().unwrap_or_default(),
                    "invalid judge result"
                );
                continue;
            }
            valid[slot] += 1;
            if outcome.passing == Some(true) {
                passing[slot] += 1;
            }
            score[slot] += outcome.score.unwrap_or_default();
        }
    }

    let mut rows = Vec::with_capacity(JudgeKind::ALL.len() * 3);
    for (slot, kind) in JudgeKind::ALL.iter().enumerate() {
        rows.push((format!("{}_valid", kind.name()), valid[slot] as f64 / total));
    }
    for (slot, kind) in JudgeKind::ALL.iter().enumerate() {
        rows.push((format!("{}_passing", kind.name()), passing[slot] as f64 / total));
    }
    for (slot, kind) in JudgeKind::ALL.iter().enumerate() {
        rows.push((format!("{}_score", kind.name()), score[slot] / total));
    }
    rows
}
