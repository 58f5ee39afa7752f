//! # Link Records
//!
//! The persisted shape of a captured anchor and the shared collection that
//! holds them.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One captured anchor.
///
/// Serialized as `{href, text, isAjax, timestamp}` so the stored collection
/// stays readable by every surface that shares the store key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    pub href: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub is_ajax: bool,
    /// Capture instant, epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
}

impl LinkRecord {
    pub fn new(href: impl Into<String>, text: impl Into<String>, is_ajax: bool, timestamp: i64) -> Self {
        let href = href.into();
        let text = text.into();
        let text = if text.trim().is_empty() { href.clone() } else { text };
        Self {
            href,
            text,
            is_ajax,
            timestamp,
        }
    }
}

/// Ordered sequence of records as persisted.
///
/// Duplicates by `href` are tolerated on read; `href` is the identity key
/// for every consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkCollection(Vec<LinkRecord>);

impl LinkCollection {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Decode a stored value. A missing key is an empty collection.
    pub fn from_value(value: Option<Value>) -> Result<Self, serde_json::Error> {
        match value {
            None | Some(Value::Null) => Ok(Self::new()),
            Some(value) => serde_json::from_value(value),
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn records(&self) -> &[LinkRecord] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn hrefs(&self) -> HashSet<&str> {
        self.0.iter().map(|r| r.href.as_str()).collect()
    }

    pub fn contains(&self, href: &str) -> bool {
        self.0.iter().any(|r| r.href == href)
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = LinkRecord>) {
        self.0.extend(records);
    }

    /// One record per `href`, the last occurrence in iteration order winning.
    /// Output keeps the position of each href's first appearance.
    pub fn unique_by_href(&self) -> Vec<LinkRecord> {
        let mut slots: HashMap<&str, usize> = HashMap::new();
        let mut unique: Vec<LinkRecord> = Vec::new();
        for record in &self.0 {
            match slots.get(record.href.as_str()) {
                Some(&idx) => unique[idx] = record.clone(),
                None => {
                    slots.insert(record.href.as_str(), unique.len());
                    unique.push(record.clone());
                }
            }
        }
        unique
    }
}

impl From<Vec<LinkRecord>> for LinkCollection {
    fn from(records: Vec<LinkRecord>) -> Self {
        Self(records)
    }
}

impl IntoIterator for LinkCollection {
    type Item = LinkRecord;
    type IntoIter = std::vec::IntoIter<LinkRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
