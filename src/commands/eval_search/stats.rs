use serde::Serialize;

use crate::model::{EvalResult, HitBy};

/// Corpus-level hit counters. A hit resolved at one tier is also credited to
/// every higher-priority tier, so `top_hit` counts every query that was
/// found somewhere and `offline_hit` only those that needed the offline pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub(crate) struct CorpusStats {
    pub total: usize,
    pub top_hit: usize,
    pub recall_hit: usize,
    pub offline_hit: usize,
    #[serde(skip)]
    hit_score_sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct SummaryRow {
    pub metric: &'static str,
    pub count: usize,
    pub percentage: f64,
}

impl SummaryRow {
    pub(crate) fn formatted(&self) -> String {
        format!("{:.2}%", self.percentage)
    }
}

impl CorpusStats {
    pub(crate) fn record(&mut self, result: &EvalResult) {
        self.total += 1;
        self.hit_score_sum += result.hit_score;

        match result.hit_by {
            HitBy::TopHit => self.top_hit += 1,
            HitBy::RecallHit => {
                self.top_hit += 1;
                self.recall_hit += 1;
            }
            HitBy::OfflineHit => {
                self.top_hit += 1;
                self.recall_hit += 1;
                self.offline_hit += 1;
            }
            HitBy::NoHit => {}
        }
    }

    pub(crate) fn merge(mut self, other: Self) -> Self {
        self.total += other.total;
        self.top_hit += other.top_hit;
        self.recall_hit += other.recall_hit;
        self.offline_hit += other.offline_hit;
        self.hit_score_sum += other.hit_score_sum;
        self
    }

    pub(crate) fn bucket(&self, tier: HitBy) -> usize {
        match tier {
            HitBy::TopHit => self.top_hit,
            HitBy::RecallHit => self.recall_hit,
            HitBy::OfflineHit => self.offline_hit,
            HitBy::NoHit => self.total.saturating_sub(self.top_hit),
        }
    }

    pub(crate) fn percentage(&self, tier: HitBy) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.bucket(tier) as f64 / self.total as f64 * 100.0
        }
    }

    pub(crate) fn mean_hit_score(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.hit_score_sum / self.total as f64)
        }
    }

    pub(crate) fn summary_rows(&self) -> Vec<SummaryRow> {
        HitBy::PRIORITY
            .iter()
            .map(|tier| SummaryRow {
                metric: tier.as_str(),
                count: self.bucket(*tier),
                percentage: self.percentage(*tier),
            })
            .collect()
    }
}

pub(crate) fn aggregate<'a, I>(results: I) -> CorpusStats
where
    I: IntoIterator<Item = &'a EvalResult>,
{
    let mut stats = CorpusStats::default();
    for result in results {
        stats.record(result);
    }
    stats
}
