//! Tag sets identifying a single time series within a metric

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::clean::clean;
use crate::error::TsdbError;

/// Mapping of tag key to tag value
///
/// Keys are kept sorted, so every textual and JSON rendering of a tag set is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag, returning the previous value for `key` if there was one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    /// Returns true if every `k=v` pair in `other` is also in `self`.
    pub fn subset(&self, other: &TagSet) -> bool {
        other
            .iter()
            .all(|(k, v)| self.0.get(k).is_some_and(|tv| tv == v))
    }

    /// The `k1=v1,k2=v2` form, sorted by key and without braces
    pub fn tags(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Build a new tag set with every key and value passed through [`clean`].
    ///
    /// Two keys that clean to the same string collapse into one entry.
    pub fn clean(&self) -> Result<TagSet, TsdbError> {
        let mut cleaned = TagSet::new();
        for (k, v) in self.iter() {
            let kc = clean_annotated(k)?;
            let vc = clean_annotated(v)?;
            cleaned.insert(kc, vc);
        }
        Ok(cleaned)
    }
}

pub(crate) fn clean_annotated(s: &str) -> Result<String, TsdbError> {
    clean(s).map_err(|source| TsdbError::Clean {
        source,
        original: s.to_string(),
        cleaned: s.chars().filter(|c| crate::clean::is_valid_char(*c)).collect(),
    })
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.tags())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromStr for TagSet {
    type Err = TsdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_tags(s)
    }
}

/// Parse tag pairs of the form `k=v,m=o`.
///
/// Whitespace around keys and values is trimmed. A pair without `=` or a key
/// given twice is an error.
pub fn parse_tags(text: &str) -> Result<TagSet, TsdbError> {
    let mut ts = TagSet::new();
    for pair in text.split(',') {
        let (k, v) = pair
            .split_once('=')
            .ok_or_else(|| TsdbError::BadTag(pair.to_string()))?;
        let (k, v) = (k.trim(), v.trim());
        if ts.contains_key(k) {
            return Err(TsdbError::DuplicateTag(pair.to_string()));
        }
        ts.insert(k, v);
    }
    Ok(ts)
}
