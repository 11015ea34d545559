//! Conversion providers the annotator leans on.
//!
//! Each script gets its own port so a host can plug in a proper dictionary
//! based converter. [`Deunicode`] implements all of them on top of the
//! `deunicode` tables, which is crude but dependency-free.

use deunicode::deunicode_char;
use thiserror::Error;

use crate::script::{contains_hangul, contains_kana, is_han};

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("{provider} cannot convert {input:?}")]
    Unsupported {
        provider: &'static str,
        input: String,
    },
    #[error("{provider} failed: {message}")]
    Failed {
        provider: &'static str,
        message: String,
    },
}

/// Flags handed to the Mandarin provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinyinOptions {
    pub tone_marks: bool,
    pub heteronym: bool,
    pub segment: bool,
}

impl Default for PinyinOptions {
    fn default() -> Self {
        Self {
            tone_marks: true,
            heteronym: true,
            segment: true,
        }
    }
}

/// Mandarin readings.
///
/// Produces one token per Han character, or one token holding a raw run of
/// non-Han text. `None` marks a character the provider had no reading for.
pub trait PinyinProvider: Send + Sync {
    fn pinyin(
        &self,
        text: &str,
        options: PinyinOptions,
    ) -> Result<Vec<Option<String>>, ConversionError>;
}

/// Cantonese readings, exactly one token per input character.
pub trait CantoneseProvider: Send + Sync {
    fn romanize(&self, text: &str) -> Result<Vec<String>, ConversionError>;
}

/// Tells traditional from simplified Chinese. Receives Han characters only.
pub trait VariantDetector: Send + Sync {
    fn is_traditional(&self, han: &str) -> bool;
}

/// Romaji for a whole line, space delimited.
pub trait JapaneseConverter: Send + Sync {
    fn to_romaji(&self, text: &str) -> Result<String, ConversionError>;
}

/// Revised-romanization style output for a whole line, space delimited.
pub trait HangulRomanizer: Send + Sync {
    fn romanize(&self, text: &str) -> Result<String, ConversionError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Deunicode;

impl Deunicode {
    fn reading(ch: char) -> Option<String> {
        deunicode_char(ch)
            .map(|it| it.split_whitespace().collect::<String>().to_lowercase())
            .filter(|it| !it.is_empty())
    }

    fn transliterate(text: &str) -> String {
        text.chars().filter_map(Self::reading).collect()
    }

    /// Converts each whitespace-delimited token on its own so the output keeps
    /// the token count of the input.
    fn spaced(text: &str) -> String {
        text.split_whitespace()
            .map(|token| {
                let converted = Self::transliterate(token);
                if converted.is_empty() {
                    token.to_owned()
                } else {
                    converted
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl PinyinProvider for Deunicode {
    fn pinyin(
        &self,
        text: &str,
        _options: PinyinOptions,
    ) -> Result<Vec<Option<String>>, ConversionError> {
        let mut tokens = Vec::new();
        let mut run = String::new();
        for ch in text.chars() {
            if is_han(ch) {
                if !run.is_empty() {
                    tokens.push(Some(std::mem::take(&mut run)));
                }
                tokens.push(Self::reading(ch));
            } else {
                run.push(ch);
            }
        }
        if !run.is_empty() {
            tokens.push(Some(run));
        }
        Ok(tokens)
    }
}

impl CantoneseProvider for Deunicode {
    fn romanize(&self, text: &str) -> Result<Vec<String>, ConversionError> {
        Ok(text
            .chars()
            .map(|ch| {
                if is_han(ch) {
                    Self::reading(ch).unwrap_or_default()
                } else {
                    ch.to_string()
                }
            })
            .collect())
    }
}

impl JapaneseConverter for Deunicode {
    fn to_romaji(&self, text: &str) -> Result<String, ConversionError> {
        if !contains_kana(text) {
            return Err(ConversionError::Unsupported {
                provider: "deunicode romaji",
                input: text.to_owned(),
            });
        }
        Ok(Self::spaced(text))
    }
}

impl HangulRomanizer for Deunicode {
    fn romanize(&self, text: &str) -> Result<String, ConversionError> {
        if !contains_hangul(text) {
            return Err(ConversionError::Unsupported {
                provider: "deunicode hangul",
                input: text.to_owned(),
            });
        }
        Ok(Self::spaced(text))
    }
}
