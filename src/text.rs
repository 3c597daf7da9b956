/// Character that OCR and tokenization regularly double in the source corpora.
const DUPLICATED_CHAR: char = '一';

fn is_kept(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || ('\u{4E00}'..='\u{9FA5}').contains(&c)
}

/// Canonical comparison form of `text`: only ASCII word characters and CJK
/// unified ideographs survive, and runs of `一` collapse to a single one.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous = None;
    for c in text.chars().filter(|c| is_kept(*c)) {
        if c == DUPLICATED_CHAR && previous == Some(DUPLICATED_CHAR) {
            continue;
        }
        out.push(c);
        previous = Some(c);
    }
    out
}

/// Case-insensitive containment. `haystack_lower` must already be lowercased.
pub fn contains_folded(haystack_lower: &str, needle: &str) -> bool {
    haystack_lower.contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::{contains_folded, normalize};

    #[test]
    fn normalize_strips_punctuation_and_whitespace() {
        assert_eq!(normalize("Coal, stable -- supply!"), "Coalstablesupply");
        assert_eq!(normalize("煤炭 供应。"), "煤炭供应");
        assert_eq!(normalize("snake_case 42"), "snake_case42");
    }

    #[test]
    fn normalize_drops_non_ascii_letters_outside_cjk_block() {
        assert_eq!(normalize("café ñ"), "caf");
        assert_eq!(normalize("가나 abc"), "abc");
    }

    #[test]
    fn normalize_collapses_duplicated_yi() {
        assert_eq!(normalize("第一一章"), "第一章");
        assert_eq!(normalize("一一一"), "一");
        assert_eq!(normalize("一 一"), "一");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "",
            "  ",
            "Hello, World!",
            "统一一一 规划, 2024",
            "mixed 中文 and English — with dashes",
            "一,一;一",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn contains_folded_ignores_case() {
        assert!(contains_folded("stable supply chain", "Supply"));
        assert!(!contains_folded("stable supply chain", "transport"));
    }
}
