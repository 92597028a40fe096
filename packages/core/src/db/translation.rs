//! Translation Filter
//!
//! Listing locations by content id can be narrowed to content available in a
//! set of languages. The language service owns the mapping from language codes
//! to bit masks; the tree only ANDs the produced mask against
//! `content_objects.language_mask`.

use std::collections::HashMap;
use thiserror::Error;

/// Bit set on content that is available in every language
pub const ALWAYS_AVAILABLE_BIT: i64 = 1;

/// A requested language code is unknown to the language service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Translation not found: {language}")]
pub struct TranslationNotFound {
    pub language: String,
}

/// Languages a [`LanguageMaskTable`] can hold: bits 1 through 62, the sign
/// bit stays clear
pub const MAX_LANGUAGES: usize = 62;

/// More language codes than there are usable mask bits
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Language table holds at most {max} languages, got {count}", max = MAX_LANGUAGES)]
pub struct LanguageTableFull {
    pub count: usize,
}

/// Produces the language mask used to filter locations by translation
pub trait TranslationFilter: Send + Sync {
    /// Mask matching content translated into any of `languages`
    fn language_mask(&self, languages: &[String]) -> Result<i64, TranslationNotFound>;
}

/// Languages to narrow a lookup to, with the filter that resolves them
#[derive(Clone, Copy)]
pub struct LanguageSelection<'a> {
    pub filter: &'a dyn TranslationFilter,
    pub languages: &'a [String],
}

impl<'a> LanguageSelection<'a> {
    pub fn new(filter: &'a dyn TranslationFilter, languages: &'a [String]) -> Self {
        Self { filter, languages }
    }

    pub fn language_mask(&self) -> Result<i64, TranslationNotFound> {
        self.filter.language_mask(self.languages)
    }
}

/// In-process language table assigning one mask bit per language code
///
/// Bits start at 2; bit 1 is reserved for always-available content, which
/// every generated mask includes.
#[derive(Debug, Clone, Default)]
pub struct LanguageMaskTable {
    bits: HashMap<String, i64>,
}

impl LanguageMaskTable {
    pub fn new<I, S>(language_codes: I) -> Result<Self, LanguageTableFull>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let codes: Vec<String> = language_codes.into_iter().map(Into::into).collect();
        let count = codes.len();

        let bits = codes
            .into_iter()
            .enumerate()
            .map(|(index, code)| {
                u32::try_from(index + 1)
                    .ok()
                    .and_then(|shift| 1i64.checked_shl(shift))
                    .filter(|bit| *bit > 0)
                    .map(|bit| (code, bit))
                    .ok_or(LanguageTableFull { count })
            })
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(Self { bits })
    }

    /// Mask bit of a single language
    pub fn bit(&self, language: &str) -> Option<i64> {
        self.bits.get(language).copied()
    }
}

impl TranslationFilter for LanguageMaskTable {
    fn language_mask(&self, languages: &[String]) -> Result<i64, TranslationNotFound> {
        languages.iter().try_fold(ALWAYS_AVAILABLE_BIT, |mask, language| {
            self.bit(language)
                .map(|bit| mask | bit)
                .ok_or_else(|| TranslationNotFound {
                    language: language.clone(),
                })
        })
    }
}
