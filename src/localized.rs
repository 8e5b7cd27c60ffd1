use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The language every localized field is expected to carry.
pub const DEFAULT_LANGUAGE: &str = "uk";

/// LocalizedText
///
/// A multilingual field: language code → display string. Entries keep the order
/// in which they were stored, which makes the "first entry" fallback deterministic.
/// Serializes as a plain JSON object (`{"uk": "...", "en": "..."}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedText(IndexMap<String, String>);

impl LocalizedText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful for fixtures.
    pub fn with(mut self, lang: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(lang.into(), value.into());
        self
    }

    pub fn insert(&mut self, lang: impl Into<String>, value: impl Into<String>) {
        self.0.insert(lang.into(), value.into());
    }

    pub fn get(&self, lang: &str) -> Option<&str> {
        self.0.get(lang).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// resolve
    ///
    /// Picks the display string for `lang` using the crate-wide default language.
    /// See [`LocalizedText::resolve_with`].
    pub fn resolve(&self, lang: &str) -> &str {
        self.resolve_with(lang, DEFAULT_LANGUAGE)
    }

    /// resolve_with
    ///
    /// Resolution order:
    /// 1. the exact `lang` entry,
    /// 2. the `default_lang` entry,
    /// 3. the first entry as stored,
    /// 4. an empty string.
    ///
    /// Language codes are compared as plain strings, no normalization.
    pub fn resolve_with<'a>(&'a self, lang: &str, default_lang: &str) -> &'a str {
        self.get(lang)
            .or_else(|| self.get(default_lang))
            .or_else(|| self.0.first().map(|(_, v)| v.as_str()))
            .unwrap_or("")
    }
}

impl<K, V> FromIterator<(K, V)> for LocalizedText
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Extracts the requested language from an `Accept-Language` style header value.
///
/// The value is taken as-is (trimmed); an absent or blank header yields `fallback`.
pub fn requested_language<'a>(header: Option<&'a str>, fallback: &'a str) -> &'a str {
    match header.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => fallback,
    }
}
