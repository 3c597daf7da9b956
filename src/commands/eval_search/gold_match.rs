use crate::model::{FineKeywords, Passage};
use crate::text::{contains_folded, normalize};

/// Fine keywords after normalization. Keywords that normalize to nothing are
/// removed; a group left empty stays and is trivially satisfied.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum KeywordSpec {
    Flat(Vec<String>),
    Grouped(Vec<Vec<String>>),
}

impl KeywordSpec {
    pub(crate) fn prepare(fine_keywords: &FineKeywords) -> Self {
        match fine_keywords {
            FineKeywords::Flat(keywords) => Self::Flat(prepare_keywords(keywords)),
            FineKeywords::Grouped(groups) => Self::Grouped(
                groups
                    .iter()
                    .map(|group| prepare_keywords(group))
                    .collect(),
            ),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Self::Flat(keywords) => keywords.is_empty(),
            Self::Grouped(groups) => groups.iter().all(Vec::is_empty),
        }
    }
}

pub(crate) fn prepare_keywords(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|keyword| normalize(keyword))
        .filter(|keyword| !keyword.is_empty())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MatchOptions {
    /// Normalize passage text before matching.
    pub need_norm: bool,
    pub error_ratio: f64,
    /// Let a group pass with up to `floor(error_ratio * len)` absent keywords.
    pub fuzzy_tolerance: bool,
}

impl MatchOptions {
    fn allowed_misses(&self, group_len: usize) -> usize {
        if self.fuzzy_tolerance {
            (self.error_ratio * group_len as f64).floor() as usize
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GoldMatch {
    pub hit: bool,
    /// Admitted passages when `hit`, otherwise empty.
    pub gold_result: Vec<Passage>,
    pub score: f64,
    pub missing: Vec<String>,
    /// Raw text of every admitted passage, concatenated.
    pub matched_text: String,
}

/// Decides whether `passages` jointly cover `keywords`.
///
/// A passage takes part only if it mentions at least one coarse keyword.
/// Fine keywords are then looked up in the concatenation of those passages;
/// grouped keywords earn partial credit per fully present group.
pub(crate) fn find_gold(
    passages: &[Passage],
    keywords: &KeywordSpec,
    coarse_keywords: &[String],
    options: MatchOptions,
) -> GoldMatch {
    let mut search_text = String::new();
    let mut matched_text = String::new();
    let mut admitted = Vec::new();

    for passage in passages {
        let raw = passage.text();
        let combined = if options.need_norm {
            normalize(raw)
        } else {
            raw.to_string()
        };
        let combined_lower = combined.to_lowercase();
        if coarse_keywords
            .iter()
            .any(|keyword| contains_folded(&combined_lower, keyword))
        {
            search_text.push_str(&combined_lower);
            matched_text.push_str(raw);
            admitted.push(passage);
        }
    }

    let (hit, score, missing) = match keywords {
        KeywordSpec::Flat(keywords) => {
            let missing = missing_from(&search_text, keywords);
            let hit = !keywords.is_empty()
                && missing.len() <= options.allowed_misses(keywords.len());
            (hit, if hit { 1.0 } else { 0.0 }, missing)
        }
        KeywordSpec::Grouped(groups) => {
            let mut missing = Vec::new();
            let mut groups_hit = 0_usize;
            for group in groups {
                let group_missing = missing_from(&search_text, group);
                if group_missing.len() <= options.allowed_misses(group.len()) {
                    groups_hit += 1;
                }
                // tolerated misses are still reported
                missing.extend(group_missing);
            }
            let score = if groups.is_empty() {
                0.0
            } else {
                groups_hit as f64 / groups.len() as f64
            };
            (!groups.is_empty() && groups_hit == groups.len(), score, missing)
        }
    };

    GoldMatch {
        hit,
        gold_result: if hit {
            admitted.into_iter().cloned().collect()
        } else {
            Vec::new()
        },
        score,
        missing,
        matched_text,
    }
}

fn missing_from(search_text_lower: &str, keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .filter(|keyword| !contains_folded(search_text_lower, keyword))
        .cloned()
        .collect()
}
