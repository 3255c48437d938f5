// src/env/list.rs

//! Ordered set stored as one space-delimited configuration value.

use std::fmt;

/// Insertion-ordered set of tokens encoded as a single space-separated string
/// (e.g. the allowed-hosts list).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceList {
    items: Vec<String>,
}

impl SpaceList {
    /// Decode a stored value. Runs of whitespace never produce empty tokens.
    pub fn parse(raw: &str) -> Self {
        let mut list = SpaceList::default();
        for token in raw.split_whitespace() {
            list.insert(token);
        }
        list
    }

    /// Add `item` unless an identical token is already present.
    ///
    /// Returns `true` if the list changed.
    pub fn insert(&mut self, item: &str) -> bool {
        let item = item.trim();
        if item.is_empty() || self.contains(item) {
            return false;
        }
        self.items.push(item.to_string());
        true
    }

    /// Remove every token equal to `item`. Returns how many were removed.
    pub fn remove(&mut self, item: &str) -> usize {
        let item = item.trim();
        let before = self.items.len();
        self.items.retain(|existing| existing != item);
        before - self.items.len()
    }

    pub fn contains(&self, item: &str) -> bool {
        self.items.iter().any(|existing| existing == item)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl fmt::Display for SpaceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.items.join(" "))
    }
}
