//! Invalidation index: logical identifiers to canonical keys

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// A label under which cache entries can be invalidated together
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// Identity of the producer that computed the entries
    Producer(String),
    /// An explicit tag attached by the caller
    Tag(String),
}

impl Identifier {
    pub fn producer(name: impl Into<String>) -> Self {
        Identifier::Producer(name.into())
    }

    pub fn tag(name: impl Into<String>) -> Self {
        Identifier::Tag(name.into())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Producer(name) => write!(f, "producer:{name}"),
            Identifier::Tag(name) => write!(f, "tag:{name}"),
        }
    }
}

/// Maps identifiers to the canonical keys currently associated with them
///
/// Entries are only ever added after a successful write, and are taken out
/// as a whole on invalidation.
#[derive(Debug, Default)]
pub struct InvalidationIndex {
    entries: Mutex<HashMap<Identifier, HashSet<String>>>,
}

impl InvalidationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `key` with every identifier in `ids`
    pub fn record<'a>(&self, key: &str, ids: impl IntoIterator<Item = &'a Identifier>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            entries.entry(id.clone()).or_default().insert(key.to_string());
        }
    }

    /// Removes and returns every key associated with `id`
    ///
    /// Unknown identifiers yield an empty list.
    pub fn take(&self, id: &Identifier) -> Vec<String> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .remove(id)
            .map(|keys| keys.into_iter().collect())
            .unwrap_or_default()
    }

    /// Drops `key` from every identifier, forgetting identifiers left empty
    pub fn forget_key(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, keys| {
            keys.remove(key);
            !keys.is_empty()
        });
    }

    /// Keys currently associated with `id`
    pub fn keys_for(&self, id: &Identifier) -> Vec<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(id)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_take() {
        let index = InvalidationIndex::new();
        let posts = Identifier::producer("load_posts");
        let tag = Identifier::tag("blog");

        index.record("a", [&posts, &tag]);
        index.record("b", [&posts]);

        let mut keys = index.take(&posts);
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

        // Taken entries are gone; the tag is untouched
        assert!(index.take(&posts).is_empty());
        assert_eq!(index.keys_for(&tag), vec!["a".to_string()]);
    }

    #[test]
    fn test_unknown_identifier_is_empty() {
        let index = InvalidationIndex::new();
        assert!(index.take(&Identifier::tag("nothing")).is_empty());
    }

    #[test]
    fn test_forget_key() {
        let index = InvalidationIndex::new();
        let tag = Identifier::tag("t");
        index.record("a", [&tag]);
        index.record("b", [&tag]);

        index.forget_key("a");
        assert_eq!(index.keys_for(&tag), vec!["b".to_string()]);

        index.forget_key("b");
        assert!(index.keys_for(&tag).is_empty());
    }

    #[test]
    fn test_producer_and_tag_with_same_name_are_distinct() {
        let index = InvalidationIndex::new();
        index.record("a", [&Identifier::producer("x")]);
        assert!(index.take(&Identifier::tag("x")).is_empty());
        assert_eq!(index.take(&Identifier::producer("x")), vec!["a".to_string()]);
    }
}
