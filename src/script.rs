use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use unicode_script::{Script, UnicodeScript};
use unicode_segmentation::UnicodeSegmentation;

lazy_static! {
    static ref KANA: Regex = Regex::new(r"[\u{3040}-\u{309F}\u{30A0}-\u{30FF}\u{FF66}-\u{FF9F}]")
        .expect("kana pattern is valid");
    static ref HANGUL: Regex =
        Regex::new(r"[\u{3131}-\u{D79D}]").expect("hangul pattern is valid");
}

/// Script bucket a lyric line falls into.
///
/// Han characters alone cannot tell Chinese from Japanese, so the checks run
/// in a fixed order: Japanese, Chinese, Korean, and English as the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptCategory {
    Japanese,
    Chinese,
    Korean,
    English,
}

pub fn classify(line: &str) -> ScriptCategory {
    if contains_kana(line) {
        ScriptCategory::Japanese
    } else if contains_han(line) {
        ScriptCategory::Chinese
    } else if contains_hangul(line) {
        ScriptCategory::Korean
    } else {
        ScriptCategory::English
    }
}

pub fn is_han(ch: char) -> bool {
    ch.script() == Script::Han
}

/// At least one hiragana or katakana code point.
pub fn contains_kana(text: &str) -> bool {
    KANA.is_match(text)
}

/// Looks at every grapheme cluster, so a single Han cluster anywhere in a
/// mixed line is enough.
pub fn contains_han(text: &str) -> bool {
    text.graphemes(true)
        .any(|grapheme| grapheme.chars().any(is_han))
}

pub fn contains_hangul(text: &str) -> bool {
    HANGUL.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_line_is_english() {
        assert_eq!(classify(""), ScriptCategory::English);
        assert_eq!(classify("   "), ScriptCategory::English);
    }

    #[test]
    fn test_latin_and_unknown_scripts_fall_back_to_english() {
        assert_eq!(classify("Never gonna give you up"), ScriptCategory::English);
        assert_eq!(classify("Привет, мир"), ScriptCategory::English);
        assert_eq!(classify("🎵 ♪"), ScriptCategory::English);
    }

    #[test]
    fn test_kana_wins_over_han_and_hangul() {
        assert_eq!(classify("テスト"), ScriptCategory::Japanese);
        assert_eq!(classify("君の名は"), ScriptCategory::Japanese);
        assert_eq!(classify("사랑 愛 です"), ScriptCategory::Japanese);
        assert_eq!(classify("ｶﾀｶﾅ"), ScriptCategory::Japanese);
    }

    #[test]
    fn test_han_without_kana_is_chinese() {
        assert_eq!(classify("你好"), ScriptCategory::Chinese);
        assert_eq!(classify("我 love 你"), ScriptCategory::Chinese);
        assert_eq!(classify("這是我們的歌"), ScriptCategory::Chinese);
        // Han beats Hangul when there is no kana
        assert_eq!(classify("사랑 愛"), ScriptCategory::Chinese);
    }

    #[test]
    fn test_hangul_is_korean() {
        assert_eq!(classify("안녕하세요"), ScriptCategory::Korean);
        assert_eq!(classify("I love 너"), ScriptCategory::Korean);
        assert_eq!(classify("ㅋㅋㅋ"), ScriptCategory::Korean);
    }

    #[test]
    fn test_han_check_handles_combining_marks() {
        // Han base followed by a variation selector stays one Han cluster
        assert!(contains_han("葛\u{E0100}"));
        assert!(!contains_han("e\u{0301}"));
    }

    #[test]
    fn test_classification_is_exclusive_for_mixed_input() {
        let samples = ["", "abc", "你好", "テスト", "한국어", "mix 你 テ 한", "1234 !?"];
        for sample in samples {
            let category = classify(sample);
            let expected = [
                contains_kana(sample),
                !contains_kana(sample) && contains_han(sample),
                !contains_kana(sample) && !contains_han(sample) && contains_hangul(sample),
            ];
            let matched = expected.iter().filter(|it| **it).count();
            assert!(matched <= 1, "{sample} matched more than one bucket");
            if matched == 0 {
                assert_eq!(category, ScriptCategory::English);
            }
        }
    }
}
