//! Immutable key/value maps with structural sharing.
//!
//! A [`PersistentMap`] is a hash array mapped trie. Every write returns a new
//! version that shares all untouched nodes with the version it was derived
//! from; existing versions are never modified, so they can be handed to other
//! threads and kept alive as long as anyone needs them.

mod binding;
mod iter;
mod node;

pub use binding::Binding;
pub use iter::{Iter, Keys, Values};

use node::{hash_key, Leaf, Node, Removal};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// An immutable hash map whose writes return new versions.
///
/// Lookups and writes take `O(log32 n)` steps. Cloning is a reference count
/// increment.
pub struct PersistentMap<K, V> {
    root: Option<Arc<Node<K, V>>>,
    len: usize,
}

impl<K, V> PersistentMap<K, V> {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self { root: None, len: 0 }
    }

    /// Returns the number of keys.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the map has no keys.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates over `(key, value)` pairs of this version.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self.root.as_ref(), self.len)
    }

    /// Iterates over the keys of this version.
    #[must_use]
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Iterates over the values of this version.
    #[must_use]
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns true if both maps are the very same version.
    ///
    /// Two empty maps are always the same version.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<K: Hash + Eq, V> PersistentMap<K, V> {
    /// Looks up a key.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let root = self.root.as_ref()?;
        root.get(hash_key(key), key).map(|leaf| &leaf.value)
    }

    /// Returns true if the key is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Returns a new version with `key` bound to `value`.
    #[must_use]
    pub fn set(&self, key: K, value: V) -> Self {
        let hash = hash_key(&key);
        let leaf = Arc::new(Leaf { hash, key, value });

        match &self.root {
            None => Self {
                root: Some(Arc::new(Node::singleton(0, leaf))),
                len: 1,
            },
            Some(root) => {
                let (root, added) = node::insert(root, 0, leaf);
                Self {
                    root: Some(root),
                    len: self.len + usize::from(added),
                }
            }
        }
    }

    /// Returns a new version without `key`.
    ///
    /// Removing an absent key returns the same version.
    #[must_use]
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(root) = &self.root else {
            return Self::new();
        };

        match node::remove(root, 0, hash_key(key), key) {
            Removal::NotFound => self.clone(),
            Removal::Empty => Self::new(),
            Removal::Leaf(leaf) => Self {
                root: Some(Arc::new(Node::singleton(0, leaf))),
                len: self.len - 1,
            },
            Removal::Node(root) => Self {
                root: Some(root),
                len: self.len - 1,
            },
        }
    }

    /// Applies a binding: stores the value, or removes the key for a tombstone.
    #[must_use]
    pub fn assign(&self, key: K, binding: impl Into<Binding<V>>) -> Self {
        match binding.into() {
            Binding::Value(value) => self.set(key, value),
            Binding::Tombstone => self.remove(&key),
        }
    }
}

impl<K, V> Clone for PersistentMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
        }
    }
}

impl<K, V> Default for PersistentMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for PersistentMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Hash + Eq, V: PartialEq> PartialEq for PersistentMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.len == other.len
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|v| v == value))
    }
}

impl<K: Hash + Eq, V: Eq> Eq for PersistentMap<K, V> {}

impl<K: Hash + Eq, V> FromIterator<(K, V)> for PersistentMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |map, (key, value)| map.set(key, value))
    }
}

impl<'a, K, V> IntoIterator for &'a PersistentMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Serialize, V: Serialize> Serialize for PersistentMap<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len))?;
        for (key, value) in self {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
