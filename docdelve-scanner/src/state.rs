//! Run-wide bookkeeping: which states have been expanded and which documents
//! have been found.

use crate::error::{Result, ScanError};
use crate::snapshot::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Visited set keyed by fingerprint, remembering the depth each state was
/// first reached at. A fingerprint is inserted at most once for the whole run.
#[derive(Debug, Default)]
pub struct StateStore {
    visited: HashMap<Fingerprint, usize>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_visited(&self, fingerprint: &Fingerprint) -> bool {
        self.visited.contains_key(fingerprint)
    }

    /// Fails with [`ScanError::DuplicateState`] if the fingerprint is already
    /// present. Callers check [`has_visited`](Self::has_visited) first.
    pub fn mark_visited(&mut self, fingerprint: Fingerprint, depth: usize) -> Result<()> {
        if self.visited.contains_key(&fingerprint) {
            return Err(ScanError::DuplicateState(fingerprint));
        }
        self.visited.insert(fingerprint, depth);
        Ok(())
    }

    /// Single-step check-then-mark. Returns `true` when the caller won the
    /// state and should expand it.
    pub fn check_and_mark(&mut self, fingerprint: Fingerprint, depth: usize) -> bool {
        match self.visited.entry(fingerprint) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(depth);
                true
            }
        }
    }

    pub fn first_seen_depth(&self, fingerprint: &Fingerprint) -> Option<usize> {
        self.visited.get(fingerprint).copied()
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }

    pub fn clear(&mut self) {
        self.visited.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDocument {
    pub url: String,
    /// Depth of the state the link was first seen in.
    pub depth: usize,
}

/// Append-only, run-wide set of document URLs in discovery order.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    seen: HashSet<String>,
    documents: Vec<DiscoveredDocument>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the URL was not known before.
    pub fn insert(&mut self, url: &str, depth: usize) -> bool {
        if !self.seen.insert(url.to_string()) {
            return false;
        }
        self.documents.push(DiscoveredDocument {
            url: url.to_string(),
            depth,
        });
        true
    }

    /// Merge a batch of links, returning the ones that were new.
    pub fn merge<'a, I>(&mut self, urls: I, depth: usize) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        urls.into_iter()
            .filter(|url| self.insert(url, depth))
            .cloned()
            .collect()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    pub fn documents(&self) -> &[DiscoveredDocument] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.documents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_visited_records_first_depth() {
        let mut store = StateStore::new();
        let fp = Fingerprint::new("aaa");

        assert!(!store.has_visited(&fp));
        store.mark_visited(fp.clone(), 2).unwrap();
        assert!(store.has_visited(&fp));
        assert_eq!(store.first_seen_depth(&fp), Some(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_mark_visited_twice_is_an_error() {
        let mut store = StateStore::new();
        store.mark_visited(Fingerprint::new("aaa"), 0).unwrap();

        let err = store.mark_visited(Fingerprint::new("aaa"), 3).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, ScanError::DuplicateState(ref fp) if fp.as_str() == "aaa"));
        assert_eq!(store.first_seen_depth(&Fingerprint::new("aaa")), Some(0));
    }

    #[test]
    fn test_check_and_mark_only_wins_once() {
        let mut store = StateStore::new();
        assert!(store.check_and_mark(Fingerprint::new("x"), 1));
        assert!(!store.check_and_mark(Fingerprint::new("x"), 1));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_registry_deduplicates_across_depths() {
        let mut registry = DocumentRegistry::new();
        let depth_one = vec!["https://a.test/x.pdf".to_string(), "https://a.test/y.pdf".to_string()];
        let depth_two = vec!["https://a.test/y.pdf".to_string()];

        assert_eq!(registry.merge(&depth_one, 1).len(), 2);
        assert!(registry.merge(&depth_two, 2).is_empty());

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.documents()[1].depth, 1);
        assert!(registry.contains("https://a.test/x.pdf"));
    }
}
