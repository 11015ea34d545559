//! Ruby annotation of lyric lines.
//!
//! A line is split into segments, each pairing a piece of the original text
//! (`base`) with its reading. Gluing the bases back together always gives the
//! original line; trimming and blank-slot handling belong to the renderer.

pub mod providers;
mod variant;

use handlebars::html_escape;
use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;
use unicode_segmentation::UnicodeSegmentation;

use crate::script::{classify, contains_hangul, is_han, ScriptCategory};

pub use providers::{
    CantoneseProvider, ConversionError, Deunicode, HangulRomanizer, JapaneseConverter,
    PinyinOptions, PinyinProvider, VariantDetector,
};
pub use variant::CharTableDetector;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotatedSegment {
    pub base: String,
    /// May be empty, the slot is still rendered to keep alignment.
    pub reading: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnnotatedLine {
    pub segments: Vec<AnnotatedSegment>,
}

impl AnnotatedLine {
    /// Appends a segment. An unread base that only extends the previous
    /// grapheme cluster (variation selectors, combining marks) joins the
    /// previous segment instead.
    fn push(&mut self, base: impl Into<String>, reading: impl Into<String>) {
        let base = base.into();
        let reading = reading.into();
        if let Some(last) = self.segments.last_mut() {
            if reading.is_empty() && extends_cluster(&last.base, &base) {
                last.base.push_str(&base);
                return;
            }
        }
        self.segments.push(AnnotatedSegment { base, reading });
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn base_text(&self) -> String {
        self.segments.iter().map(|it| it.base.as_str()).collect()
    }
}

/// What a renderer gets for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    Ruby(AnnotatedLine),
    Plain(String),
}

impl Annotation {
    pub fn is_ruby(&self) -> bool {
        matches!(self, Annotation::Ruby(_))
    }

    pub fn plain_text(&self) -> String {
        match self {
            Annotation::Ruby(line) => line.base_text(),
            Annotation::Plain(text) => text.clone(),
        }
    }

    /// Escaped HTML. Ruby lines become a single `<ruby>` block with one
    /// `<rt>` per segment; whitespace-only bases are kept as `&nbsp;`.
    pub fn to_html(&self) -> String {
        match self {
            Annotation::Plain(text) => html_escape(text),
            Annotation::Ruby(line) => {
                let body = line
                    .segments
                    .iter()
                    .map(|segment| {
                        let base = segment.base.trim();
                        let base = if base.is_empty() {
                            "&nbsp;".to_owned()
                        } else {
                            html_escape(base)
                        };
                        format!("{base} <rt>{}</rt>", html_escape(&segment.reading))
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("<ruby>{body}</ruby>")
            }
        }
    }
}

/// Why a line ended up as plain text.
#[derive(Debug, Error)]
pub enum Degraded {
    #[error("{0:?} lines carry no readings")]
    NotAnnotated(ScriptCategory),
    #[error("annotation of {0:?} lines is turned off")]
    Excluded(ScriptCategory),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("converter produced {converted} tokens for {original} original tokens")]
    TokenMismatch { original: usize, converted: usize },
    #[error("no segments produced")]
    Empty,
}

pub struct Annotator {
    pinyin: Box<dyn PinyinProvider>,
    cantonese: Box<dyn CantoneseProvider>,
    variant: Box<dyn VariantDetector>,
    japanese: Box<dyn JapaneseConverter>,
    korean: Box<dyn HangulRomanizer>,
    enabled: bool,
    excluded: Vec<ScriptCategory>,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            pinyin: Box::new(Deunicode),
            cantonese: Box::new(Deunicode),
            variant: Box::new(CharTableDetector),
            japanese: Box::new(Deunicode),
            korean: Box::new(Deunicode),
            enabled: true,
            excluded: Vec::new(),
        }
    }
}

impl Annotator {
    pub fn with_pinyin(mut self, provider: impl PinyinProvider + 'static) -> Self {
        self.pinyin = Box::new(provider);
        self
    }

    pub fn with_cantonese(mut self, provider: impl CantoneseProvider + 'static) -> Self {
        self.cantonese = Box::new(provider);
        self
    }

    pub fn with_variant_detector(mut self, detector: impl VariantDetector + 'static) -> Self {
        self.variant = Box::new(detector);
        self
    }

    pub fn with_japanese(mut self, converter: impl JapaneseConverter + 'static) -> Self {
        self.japanese = Box::new(converter);
        self
    }

    pub fn with_korean(mut self, romanizer: impl HangulRomanizer + 'static) -> Self {
        self.korean = Box::new(romanizer);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn excluding(mut self, categories: impl IntoIterator<Item = ScriptCategory>) -> Self {
        self.excluded.extend(categories);
        self
    }

    /// Classifies `line` and annotates it accordingly.
    pub fn annotate_line(&self, line: &str) -> Annotation {
        self.annotate(line, classify(line))
    }

    pub fn annotate(&self, line: &str, category: ScriptCategory) -> Annotation {
        match self.try_annotate(line, category) {
            Ok(annotated) => Annotation::Ruby(annotated),
            Err(reason) => {
                match &reason {
                    Degraded::Conversion(_) | Degraded::TokenMismatch { .. } => {
                        warn!("Falling back to plain text for {line:?}: {reason}")
                    }
                    _ => debug!("Plain text for {line:?}: {reason}"),
                }
                Annotation::Plain(line.to_owned())
            }
        }
    }

    pub fn try_annotate(
        &self,
        line: &str,
        category: ScriptCategory,
    ) -> Result<AnnotatedLine, Degraded> {
        if !self.enabled || self.excluded.contains(&category) {
            return Err(Degraded::Excluded(category));
        }
        let annotated = match category {
            ScriptCategory::English => return Err(Degraded::NotAnnotated(category)),
            ScriptCategory::Chinese => self.annotate_chinese(line)?,
            ScriptCategory::Japanese => {
                let romaji = self.japanese.to_romaji(line)?;
                pair_words(line, &romaji, |word| {
                    classify(word) == ScriptCategory::Japanese
                })?
            }
            ScriptCategory::Korean => {
                let romanized = self.korean.romanize(line)?;
                pair_words(line, &romanized, contains_hangul)?
            }
        };
        if annotated.is_empty() {
            Err(Degraded::Empty)
        } else {
            Ok(annotated)
        }
    }

    fn annotate_chinese(&self, line: &str) -> Result<AnnotatedLine, Degraded> {
        let han: String = line.chars().filter(|ch| is_han(*ch)).collect();
        if self.variant.is_traditional(&han) {
            self.annotate_cantonese(line)
        } else {
            self.annotate_mandarin(line)
        }
    }

    fn annotate_cantonese(&self, line: &str) -> Result<AnnotatedLine, Degraded> {
        let tokens = self.cantonese.romanize(line)?;
        let original = line.chars().count();
        if tokens.len() != original {
            return Err(Degraded::TokenMismatch {
                original,
                converted: tokens.len(),
            });
        }

        let mut annotated = AnnotatedLine::default();
        for (ch, token) in line.chars().zip(tokens) {
            let reading = if is_han(ch) {
                strip_tone_number(&token)
            } else {
                ""
            };
            annotated.push(ch, reading);
        }
        Ok(annotated)
    }

    fn annotate_mandarin(&self, line: &str) -> Result<AnnotatedLine, Degraded> {
        let tokens = self.pinyin.pinyin(line, PinyinOptions::default())?;
        let chars: Vec<char> = line.chars().collect();

        let mut annotated = AnnotatedLine::default();
        let mut index = 0;
        for token in tokens {
            let Some(&next) = chars.get(index) else {
                break;
            };
            let token = token
                .filter(|it| !it.is_empty())
                .unwrap_or_else(|| " ".to_owned());
            if is_han(next) {
                annotated.push(next, token.trim());
                index += 1;
            } else {
                let end = (index + token.chars().count()).min(chars.len());
                annotated.push(chars[index..end].iter().collect::<String>(), "");
                index = end;
            }
        }
        if index < chars.len() {
            annotated.push(chars[index..].iter().collect::<String>(), "");
        }
        Ok(annotated)
    }
}

fn extends_cluster(previous: &str, next: &str) -> bool {
    if next.is_empty() || previous.is_empty() {
        return false;
    }
    let joined = format!("{previous}{next}");
    joined.graphemes(true).count() == previous.graphemes(true).count()
}

/// Yale-style readings end in a tone number.
fn strip_tone_number(token: &str) -> &str {
    token.trim().trim_end_matches(|ch: char| ch.is_ascii_digit())
}

struct Word<'a> {
    token: &'a str,
    /// The token plus the whitespace that follows it.
    span: &'a str,
}

fn split_words(line: &str) -> (&str, Vec<Word<'_>>) {
    let trimmed = line.trim_start();
    let leading = &line[..line.len() - trimmed.len()];

    let mut words = Vec::new();
    let mut rest = trimmed;
    while !rest.is_empty() {
        let token_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let after = rest[token_end..].trim_start();
        words.push(Word {
            token: &rest[..token_end],
            span: &rest[..rest.len() - after.len()],
        });
        rest = after;
    }
    (leading, words)
}

/// Pairs original words with converted words by position. Both sides must
/// have the same number of words.
fn pair_words(
    line: &str,
    converted: &str,
    wants_reading: impl Fn(&str) -> bool,
) -> Result<AnnotatedLine, Degraded> {
    let (leading, words) = split_words(line);
    let readings: Vec<&str> = converted.split_whitespace().collect();
    if readings.len() != words.len() {
        return Err(Degraded::TokenMismatch {
            original: words.len(),
            converted: readings.len(),
        });
    }

    let mut annotated = AnnotatedLine::default();
    if !leading.is_empty() {
        annotated.push(leading, "");
    }
    for (word, reading) in words.iter().zip(readings) {
        let reading = if wants_reading(word.token) {
            reading
        } else {
            ""
        };
        annotated.push(word.span, reading);
    }
    Ok(annotated)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingRomaji;

    impl JapaneseConverter for FailingRomaji {
        fn to_romaji(&self, text: &str) -> Result<String, ConversionError> {
            Err(ConversionError::Failed {
                provider: "test",
                message: format!("cannot handle {text}"),
            })
        }
    }

    /// Returns a fixed output regardless of input.
    struct Fixed(&'static str);

    impl JapaneseConverter for Fixed {
        fn to_romaji(&self, _text: &str) -> Result<String, ConversionError> {
            Ok(self.0.to_owned())
        }
    }

    impl HangulRomanizer for Fixed {
        fn romanize(&self, _text: &str) -> Result<String, ConversionError> {
            Ok(self.0.to_owned())
        }
    }

    struct FailingHangul;

    impl HangulRomanizer for FailingHangul {
        fn romanize(&self, text: &str) -> Result<String, ConversionError> {
            Err(ConversionError::Unsupported {
                provider: "test",
                input: text.to_owned(),
            })
        }
    }

    struct AlwaysTraditional;

    impl VariantDetector for AlwaysTraditional {
        fn is_traditional(&self, _han: &str) -> bool {
            true
        }
    }

    struct Yale;

    impl CantoneseProvider for Yale {
        fn romanize(&self, text: &str) -> Result<Vec<String>, ConversionError> {
            Ok(text
                .chars()
                .map(|ch| match ch {
                    '我' => "ngo5".to_owned(),
                    '愛' => "oi3".to_owned(),
                    '你' => "nei5".to_owned(),
                    other => other.to_string(),
                })
                .collect())
        }
    }

    struct ShortYale;

    impl CantoneseProvider for ShortYale {
        fn romanize(&self, _text: &str) -> Result<Vec<String>, ConversionError> {
            Ok(vec!["ngo5".to_owned()])
        }
    }

    /// Drops the reading of every other Han character.
    struct GappyPinyin;

    impl PinyinProvider for GappyPinyin {
        fn pinyin(
            &self,
            text: &str,
            _options: PinyinOptions,
        ) -> Result<Vec<Option<String>>, ConversionError> {
            Ok(text
                .chars()
                .enumerate()
                .map(|(idx, _)| (idx % 2 == 0).then(|| "x".to_owned()))
                .collect())
        }
    }

    #[test]
    fn test_simplified_line_pairs_each_han_character() {
        let annotated = Annotator::default()
            .try_annotate("你好", ScriptCategory::Chinese)
            .unwrap();
        assert_eq!(annotated.len(), 2);
        assert_eq!(annotated.segments[0].base, "你");
        assert_eq!(annotated.segments[1].base, "好");
        assert!(annotated
            .segments
            .iter()
            .all(|it| it.base.chars().count() == 1 && !it.reading.is_empty()));
    }

    #[test]
    fn test_mandarin_keeps_non_han_runs_intact() {
        let line = "我 love 你!";
        let annotated = Annotator::default()
            .try_annotate(line, ScriptCategory::Chinese)
            .unwrap();
        let bases: Vec<_> = annotated.segments.iter().map(|it| it.base.as_str()).collect();
        assert_eq!(bases, vec!["我", " love ", "你", "!"]);
        assert_eq!(annotated.segments[1].reading, "");
        assert_eq!(annotated.base_text(), line);
    }

    #[test]
    fn test_missing_pinyin_tokens_consume_one_character() {
        let line = "天空之城";
        let annotated = Annotator::default()
            .with_pinyin(GappyPinyin)
            .try_annotate(line, ScriptCategory::Chinese)
            .unwrap();
        assert_eq!(annotated.len(), 4);
        assert_eq!(annotated.segments[1].reading, "");
        assert_eq!(annotated.segments[2].reading, "x");
        let consumed: usize = annotated
            .segments
            .iter()
            .map(|it| it.base.chars().count())
            .sum();
        assert_eq!(consumed, line.chars().count());
    }

    #[test]
    fn test_traditional_line_uses_cantonese_one_to_one() {
        let annotated = Annotator::default()
            .with_variant_detector(AlwaysTraditional)
            .with_cantonese(Yale)
            .try_annotate("我愛 你", ScriptCategory::Chinese)
            .unwrap();
        let pairs: Vec<_> = annotated
            .segments
            .iter()
            .map(|it| (it.base.as_str(), it.reading.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("我", "ngo"), ("愛", "oi"), (" ", ""), ("你", "nei")]
        );
    }

    #[test]
    fn test_cantonese_count_mismatch_degrades() {
        let annotation = Annotator::default()
            .with_variant_detector(AlwaysTraditional)
            .with_cantonese(ShortYale)
            .annotate("我愛你", ScriptCategory::Chinese);
        assert_eq!(annotation, Annotation::Plain("我愛你".to_owned()));
    }

    #[test]
    fn test_japanese_failure_falls_back_to_plain_text() {
        let annotator = Annotator::default().with_japanese(FailingRomaji);
        assert!(matches!(
            annotator.try_annotate("テスト", ScriptCategory::Japanese),
            Err(Degraded::Conversion(_))
        ));
        let annotation = annotator.annotate("テスト", ScriptCategory::Japanese);
        assert_eq!(annotation, Annotation::Plain("テスト".to_owned()));
        assert_eq!(annotation.to_html(), "テスト");
    }

    #[test]
    fn test_japanese_words_only_read_when_japanese() {
        let line = "  愛してる baby ずっと";
        let annotated = Annotator::default()
            .with_japanese(Fixed("aishiteru baby zutto"))
            .try_annotate(line, ScriptCategory::Japanese)
            .unwrap();
        let pairs: Vec<_> = annotated
            .segments
            .iter()
            .map(|it| (it.base.as_str(), it.reading.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("  ", ""),
                ("愛してる ", "aishiteru"),
                ("baby ", ""),
                ("ずっと", "zutto")
            ]
        );
        assert_eq!(annotated.base_text(), line);
    }

    #[test]
    fn test_token_mismatch_degrades_instead_of_misaligning() {
        let annotator = Annotator::default().with_japanese(Fixed("kimi no na wa"));
        assert!(matches!(
            annotator.try_annotate("君の名は", ScriptCategory::Japanese),
            Err(Degraded::TokenMismatch {
                original: 1,
                converted: 4
            })
        ));
    }

    #[test]
    fn test_variation_selectors_stay_with_their_character() {
        let line = "葛\u{E0100}城";
        let mandarin = Annotator::default()
            .try_annotate(line, ScriptCategory::Chinese)
            .unwrap();
        let bases: Vec<_> = mandarin.segments.iter().map(|it| it.base.as_str()).collect();
        assert_eq!(bases, vec!["葛\u{E0100}", "城"]);
        assert!(mandarin.segments.iter().all(|it| !it.reading.is_empty()));
        assert_eq!(mandarin.base_text(), line);

        let cantonese = Annotator::default()
            .with_variant_detector(AlwaysTraditional)
            .with_cantonese(Yale)
            .try_annotate("我\u{FE00}愛", ScriptCategory::Chinese)
            .unwrap();
        let pairs: Vec<_> = cantonese
            .segments
            .iter()
            .map(|it| (it.base.as_str(), it.reading.as_str()))
            .collect();
        assert_eq!(pairs, vec![("我\u{FE00}", "ngo"), ("愛", "oi")]);
    }

    #[test]
    fn test_korean_reads_hangul_words() {
        let annotated = Annotator::default()
            .with_korean(Fixed("saranghae oh yeah"))
            .try_annotate("사랑해 oh yeah", ScriptCategory::Korean)
            .unwrap();
        assert_eq!(annotated.segments[0].reading, "saranghae");
        assert_eq!(annotated.segments[1].reading, "");
        assert_eq!(annotated.segments[2].reading, "");
    }

    #[test]
    fn test_korean_failure_falls_back_to_plain_text() {
        let annotator = Annotator::default().with_korean(FailingHangul);
        assert!(matches!(
            annotator.try_annotate("사랑해", ScriptCategory::Korean),
            Err(Degraded::Conversion(_))
        ));
        assert_eq!(
            annotator.annotate("사랑해", ScriptCategory::Korean),
            Annotation::Plain("사랑해".to_owned())
        );
    }

    #[test]
    fn test_korean_token_mismatch_degrades() {
        let annotator = Annotator::default().with_korean(Fixed("a b c"));
        assert!(matches!(
            annotator.try_annotate("사랑해 oh", ScriptCategory::Korean),
            Err(Degraded::TokenMismatch {
                original: 2,
                converted: 3
            })
        ));
        assert_eq!(
            annotator.annotate("사랑해 oh", ScriptCategory::Korean),
            Annotation::Plain("사랑해 oh".to_owned())
        );
    }

    #[test]
    fn test_english_and_excluded_lines_stay_plain() {
        let annotator = Annotator::default();
        assert_eq!(
            annotator.annotate_line("hello there"),
            Annotation::Plain("hello there".to_owned())
        );

        let annotator = Annotator::default().excluding([ScriptCategory::Chinese]);
        assert!(!annotator.annotate_line("你好").is_ruby());
        assert!(annotator.annotate_line("안녕").is_ruby());

        let annotator = Annotator::default().enabled(false);
        assert!(!annotator.annotate_line("안녕").is_ruby());
    }

    #[test]
    fn test_base_text_round_trips_for_every_category() {
        let annotator = Annotator::default();
        let lines = [
            "",
            "plain english line",
            "你好 世界 2024",
            "這是我們的歌",
            "テスト です",
            " 안녕 하세요 ",
            "mixed 你 and テ",
        ];
        for line in lines {
            assert_eq!(annotator.annotate_line(line).plain_text(), line, "{line:?}");
        }
    }

    #[test]
    fn test_ruby_html_escapes_and_fills_blank_slots() {
        let annotation = Annotation::Ruby(AnnotatedLine {
            segments: vec![
                AnnotatedSegment {
                    base: "你".to_owned(),
                    reading: "ni".to_owned(),
                },
                AnnotatedSegment {
                    base: " ".to_owned(),
                    reading: String::new(),
                },
                AnnotatedSegment {
                    base: "<b>".to_owned(),
                    reading: String::new(),
                },
            ],
        });
        assert_eq!(
            annotation.to_html(),
            "<ruby>你 <rt>ni</rt>\n&nbsp; <rt></rt>\n&lt;b&gt; <rt></rt></ruby>"
        );
    }
}
