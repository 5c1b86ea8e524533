//! Display text keyed by language code.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An immutable map from language code to text.
///
/// Ordered by language code so that serialization (and therefore the content
/// hash) does not depend on insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultilingualString(BTreeMap<String, String>);

impl MultilingualString {
    /// Create an empty string.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy with the given translation added or replaced.
    pub fn with(&self, language: impl Into<String>, text: impl Into<String>) -> Self {
        let mut map = self.0.clone();
        map.insert(language.into(), text.into());
        Self(map)
    }

    /// Get the text for a language.
    pub fn get(&self, language: &str) -> Option<&str> {
        self.0.get(language).map(String::as_str)
    }

    /// Check if no translation is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(language, text)` pairs in language order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<L: Into<String>, T: Into<String>> FromIterator<(L, T)> for MultilingualString {
    fn from_iter<I: IntoIterator<Item = (L, T)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(l, t)| (l.into(), t.into()))
                .collect(),
        )
    }
}
