//! Map wrapper that never creates entries behind the caller's back.
//!
//! Controller bookkeeping (host attachments, group id registrations) must
//! only gain an entry through an explicit insert. Lookups return `Option`,
//! reference counting returns `Result`, and a missing key is always visible
//! to the caller instead of silently turning into a default value.

use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;

/// Error type for SyncMap operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncMapError {
    #[error("Key not found")]
    KeyNotFound,

    #[error("Reference count underflow")]
    RefCountUnderflow,
}

/// Trait for values that carry a reference count.
pub trait HasRefCount {
    /// Increments the reference count and returns the new value.
    fn increment_ref(&mut self) -> u32;

    /// Decrements the reference count and returns the new value.
    ///
    /// Returns `None` if the count would underflow.
    fn decrement_ref(&mut self) -> Option<u32>;

    /// Returns the current reference count.
    fn ref_count(&self) -> u32;
}

/// A map whose entries only come into existence through explicit inserts.
///
/// # Example
///
/// ```
/// use fabric_orch_common::SyncMap;
///
/// let mut map: SyncMap<&str, u32> = SyncMap::new();
/// assert!(map.get(&"10.0.0.1").is_none());
///
/// map.insert("10.0.0.1", 1);
/// assert_eq!(map.get(&"10.0.0.1"), Some(&1));
/// assert_eq!(map.remove(&"10.0.0.1"), Some(1));
/// assert!(map.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct SyncMap<K, V> {
    inner: HashMap<K, V>,
}

impl<K, V> SyncMap<K, V>
where
    K: Eq + Hash,
{
    /// Creates a new empty map.
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    /// Returns the number of entries in the map.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns true if the map contains the given key.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// Returns the value for `key`. Never creates an entry.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Returns the value for `key` mutably. Never creates an entry.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.inner.get_mut(key)
    }

    /// Inserts a key-value pair, returning the replaced value.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    /// Removes a key from the map, returning its value if present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.remove(key)
    }

    /// Clears all entries from the map.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Returns an iterator over key-value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter()
    }

    /// Returns an iterator over keys.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.inner.keys()
    }
}

impl<K, V> SyncMap<K, V>
where
    K: Eq + Hash,
    V: HasRefCount,
{
    /// Increments the reference count of an existing entry.
    pub fn increment_ref(&mut self, key: &K) -> Result<u32, SyncMapError> {
        match self.inner.get_mut(key) {
            Some(entry) => Ok(entry.increment_ref()),
            None => Err(SyncMapError::KeyNotFound),
        }
    }

    /// Decrements the reference count of an existing entry.
    pub fn decrement_ref(&mut self, key: &K) -> Result<u32, SyncMapError> {
        match self.inner.get_mut(key) {
            Some(entry) => entry
                .decrement_ref()
                .ok_or(SyncMapError::RefCountUnderflow),
            None => Err(SyncMapError::KeyNotFound),
        }
    }

    /// Returns the reference count for `key`, if present.
    pub fn ref_count(&self, key: &K) -> Option<u32> {
        self.inner.get(key).map(|e| e.ref_count())
    }
}

impl<K, V> Default for SyncMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Registration {
        id: u32,
        users: u32,
    }

    impl Registration {
        fn new(id: u32) -> Self {
            Self { id, users: 0 }
        }
    }

    impl HasRefCount for Registration {
        fn increment_ref(&mut self) -> u32 {
            self.users += 1;
            self.users
        }

        fn decrement_ref(&mut self) -> Option<u32> {
            if self.users == 0 {
                None
            } else {
                self.users -= 1;
                Some(self.users)
            }
        }

        fn ref_count(&self) -> u32 {
            self.users
        }
    }

    #[test]
    fn test_get_never_creates() {
        let mut map: SyncMap<String, u32> = SyncMap::new();

        assert!(map.get(&"missing".to_string()).is_none());
        assert!(map.get_mut(&"missing".to_string()).is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn test_insert_replaces_and_remove() {
        let mut map: SyncMap<String, u32> = SyncMap::new();

        assert_eq!(map.insert("h1".to_string(), 1), None);
        assert_eq!(map.insert("h1".to_string(), 2), Some(1));
        assert_eq!(map.len(), 1);

        assert_eq!(map.remove(&"h1".to_string()), Some(2));
        assert!(map.is_empty());
    }

    #[test]
    fn test_ref_counting_requires_existing_key() {
        let mut map: SyncMap<&str, Registration> = SyncMap::new();

        assert_eq!(map.increment_ref(&"c1"), Err(SyncMapError::KeyNotFound));

        map.insert("c1", Registration::new(7));
        assert_eq!(map.increment_ref(&"c1"), Ok(1));
        assert_eq!(map.increment_ref(&"c1"), Ok(2));
        assert_eq!(map.ref_count(&"c1"), Some(2));
        assert_eq!(map.get(&"c1").map(|r| r.id), Some(7));
    }

    #[test]
    fn test_decrement_ref_underflow_protection() {
        let mut map: SyncMap<&str, Registration> = SyncMap::new();
        map.insert("c1", Registration::new(7));

        assert_eq!(map.decrement_ref(&"c1"), Err(SyncMapError::RefCountUnderflow));

        map.increment_ref(&"c1").unwrap();
        assert_eq!(map.decrement_ref(&"c1"), Ok(0));
        assert_eq!(map.decrement_ref(&"missing"), Err(SyncMapError::KeyNotFound));
    }
}
