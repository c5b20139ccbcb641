//! Per-extension key/value and named-list storage

use std::collections::{HashMap, VecDeque};

/// A stored value: either a scalar or an ordered list
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<T> {
    /// Arbitrary scalar value
    Scalar(serde_json::Value),
    /// FIFO list of items
    List(VecDeque<T>),
}

/// Key/value store private to one extension
///
/// List operations never fail: on a missing key or a scalar slot they
/// degrade to a no-op (`push` returns `false`) or `None`.
#[derive(Debug, Clone)]
pub struct SessionStore<T> {
    slots: HashMap<String, Slot<T>>,
}

impl<T> SessionStore<T> {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    /// Get the slot stored under `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Slot<T>> {
        self.slots.get(key)
    }

    /// Get a scalar value, ignoring list slots
    #[must_use]
    pub fn scalar(&self, key: &str) -> Option<&serde_json::Value> {
        match self.slots.get(key) {
            Some(Slot::Scalar(value)) => Some(value),
            _ => None,
        }
    }

    /// Store a slot, replacing any previous value
    pub fn set(&mut self, key: impl Into<String>, slot: Slot<T>) -> &mut Self {
        self.slots.insert(key.into(), slot);
        self
    }

    /// Store a scalar value
    pub fn set_scalar(&mut self, key: impl Into<String>, value: serde_json::Value) -> &mut Self {
        self.set(key, Slot::Scalar(value))
    }

    /// Initialise an empty list under `key`
    pub fn set_list(&mut self, key: impl Into<String>) -> &mut Self {
        self.set(key, Slot::List(VecDeque::new()))
    }

    /// Check whether `key` holds any value
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Remove `key`, returning its previous slot
    pub fn delete(&mut self, key: &str) -> Option<Slot<T>> {
        self.slots.remove(key)
    }

    /// Append to the list under `key`
    ///
    /// Returns `false` (and drops `value`) if `key` is missing or scalar.
    pub fn push(&mut self, key: &str, value: T) -> bool {
        match self.slots.get_mut(key) {
            Some(Slot::List(list)) => {
                list.push_back(value);
                true
            }
            _ => false,
        }
    }

    /// Remove and return the front of the list under `key`
    pub fn pop_front(&mut self, key: &str) -> Option<T> {
        match self.slots.get_mut(key) {
            Some(Slot::List(list)) => list.pop_front(),
            _ => None,
        }
    }

    /// Length of the list under `key`, `None` if missing or scalar
    #[must_use]
    pub fn len_of(&self, key: &str) -> Option<usize> {
        match self.slots.get(key) {
            Some(Slot::List(list)) => Some(list.len()),
            _ => None,
        }
    }

    /// Iterate the list under `key` front to back
    pub fn iter_list(&self, key: &str) -> impl Iterator<Item = &T> {
        let list = match self.slots.get(key) {
            Some(Slot::List(list)) => Some(list),
            _ => None,
        };
        list.into_iter().flatten()
    }
}

impl<T> Default for SessionStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trip() {
        let mut store: SessionStore<u32> = SessionStore::new();
        store
            .set_scalar("volume", serde_json::json!(0.5))
            .set_scalar("name", serde_json::json!("MusicBot"));

        assert!(store.has("volume"));
        assert_eq!(store.scalar("name"), Some(&serde_json::json!("MusicBot")));

        store.delete("volume");
        assert!(!store.has("volume"));
    }

    #[test]
    fn list_is_fifo() {
        let mut store = SessionStore::new();
        store.set_list("queue");

        assert!(store.push("queue", 1));
        assert!(store.push("queue", 2));
        assert!(store.push("queue", 3));
        assert_eq!(store.len_of("queue"), Some(3));

        assert_eq!(store.pop_front("queue"), Some(1));
        assert_eq!(store.iter_list("queue").copied().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn list_ops_on_missing_key_are_noops() {
        let mut store: SessionStore<u32> = SessionStore::new();

        assert!(!store.push("queue", 1));
        assert_eq!(store.pop_front("queue"), None);
        assert_eq!(store.len_of("queue"), None);
        assert!(!store.has("queue"));
    }

    #[test]
    fn list_ops_on_scalar_are_noops() {
        let mut store: SessionStore<u32> = SessionStore::new();
        store.set_scalar("queue", serde_json::json!("not a list"));

        assert!(!store.push("queue", 1));
        assert_eq!(store.pop_front("queue"), None);
        assert_eq!(store.len_of("queue"), None);
        assert_eq!(store.iter_list("queue").count(), 0);
    }
}
