//! Per-user persisted variable namespaces.
//!
//! Each user owns one namespace, created lazily on first use. A namespace is
//! always internally consistent: when a merge would push it past the entry
//! ceiling it is wiped first and only the new run's bindings survive: full
//! eviction, never truncation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::sandbox::value::StoredValue;

/// Thread-safe store of per-user namespaces plus the per-user serialization
/// locks that order a single user's invocations.
pub struct NamespaceStore {
    ceiling: usize,
    namespaces: Mutex<HashMap<String, HashMap<String, StoredValue>>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl NamespaceStore {
    /// Create a store with the given per-user entry ceiling.
    pub fn new(ceiling: usize) -> Self {
        NamespaceStore {
            ceiling,
            namespaces: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot a user's namespace (empty map if unseen).
    pub fn get(&self, user_id: &str) -> HashMap<String, StoredValue> {
        self.namespaces
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Merge a run's new bindings into the user's namespace, evicting the
    /// whole namespace first if the merge would exceed the ceiling. Returns
    /// the entry count after merging.
    pub fn merge(&self, user_id: &str, bindings: Vec<(String, StoredValue)>) -> usize {
        let mut namespaces = self.namespaces.lock().unwrap();
        let ns = namespaces.entry(user_id.to_string()).or_default();
        let added = bindings.iter().filter(|(k, _)| !ns.contains_key(k)).count();
        if ns.len() + added > self.ceiling {
            warn!(
                user_id,
                entries = ns.len(),
                ceiling = self.ceiling,
                "namespace ceiling exceeded, resetting"
            );
            ns.clear();
        }
        for (name, value) in bindings {
            ns.insert(name, value);
        }
        debug!(user_id, entries = ns.len(), "namespace merged");
        ns.len()
    }

    /// Wipe a user's namespace.
    pub fn clear(&self, user_id: &str) {
        self.namespaces.lock().unwrap().remove(user_id);
    }

    /// The user's bindings, sorted by name.
    pub fn list(&self, user_id: &str) -> Vec<(String, StoredValue)> {
        let mut entries: Vec<_> = self.get(user_id).into_iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }

    /// Entry count of a user's namespace.
    pub fn len(&self, user_id: &str) -> usize {
        self.namespaces
            .lock()
            .unwrap()
            .get(user_id)
            .map_or(0, HashMap::len)
    }

    /// Whether the user has no stored variables.
    pub fn is_empty(&self, user_id: &str) -> bool {
        self.len(user_id) == 0
    }

    /// The per-user lock serializing that user's invocations. Created on
    /// first use; different users get independent locks.
    pub fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        Arc::clone(
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> StoredValue {
        StoredValue::Int(v)
    }

    #[test]
    fn test_lazy_creation() {
        let store = NamespaceStore::new(10);
        assert!(store.get("alice").is_empty());
        assert_eq!(store.len("alice"), 0);
    }

    #[test]
    fn test_merge_and_get() {
        let store = NamespaceStore::new(10);
        store.merge("alice", vec![("x".into(), int(1))]);
        store.merge("alice", vec![("y".into(), int(2))]);
        let ns = store.get("alice");
        assert_eq!(ns.len(), 2);
        assert!(matches!(ns.get("x"), Some(StoredValue::Int(1))));
    }

    #[test]
    fn test_merge_overwrites() {
        let store = NamespaceStore::new(10);
        store.merge("alice", vec![("x".into(), int(1))]);
        store.merge("alice", vec![("x".into(), int(9))]);
        assert_eq!(store.len("alice"), 1);
        assert!(matches!(store.get("alice").get("x"), Some(StoredValue::Int(9))));
    }

    #[test]
    fn test_eviction_is_full_reset() {
        let store = NamespaceStore::new(3);
        store.merge(
            "alice",
            vec![("a".into(), int(1)), ("b".into(), int(2)), ("c".into(), int(3))],
        );
        // This merge would exceed the ceiling: the namespace must be wiped
        // first, leaving exactly the new run's bindings.
        store.merge("alice", vec![("d".into(), int(4))]);
        let ns = store.get("alice");
        assert_eq!(ns.len(), 1);
        assert!(ns.contains_key("d"));
        assert!(!ns.contains_key("a"));
    }

    #[test]
    fn test_overwrite_does_not_trigger_eviction() {
        let store = NamespaceStore::new(2);
        store.merge("alice", vec![("a".into(), int(1)), ("b".into(), int(2))]);
        // Re-binding existing names adds no entries.
        store.merge("alice", vec![("a".into(), int(7))]);
        assert_eq!(store.len("alice"), 2);
        assert!(matches!(store.get("alice").get("a"), Some(StoredValue::Int(7))));
    }

    #[test]
    fn test_users_are_independent() {
        let store = NamespaceStore::new(10);
        store.merge("alice", vec![("x".into(), int(1))]);
        assert!(store.get("bob").is_empty());
        store.clear("alice");
        assert!(store.get("alice").is_empty());
    }

    #[test]
    fn test_list_sorted() {
        let store = NamespaceStore::new(10);
        store.merge("alice", vec![("z".into(), int(1)), ("a".into(), int(2))]);
        let names: Vec<_> = store.list("alice").into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "z"]);
    }

    #[test]
    fn test_user_lock_identity() {
        let store = NamespaceStore::new(10);
        let a1 = store.user_lock("alice");
        let a2 = store.user_lock("alice");
        let b = store.user_lock("bob");
        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
    }
}
