//! The context handle: one immutable version of the key/value state.

use super::key::{ContextKey, IntoContextKey};
use super::ContextValue;
use crate::errors::ContextResult;
use crate::map::{Binding, Iter, Keys, PersistentMap, Values};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// An immutable snapshot of context state.
///
/// Every write returns a new handle; the receiver is never modified, so a
/// handle can be stored in a frame, sent to another thread, or reused as a
/// template for [`ContextSlot::run_isolated`](super::ContextSlot::run_isolated)
/// any number of times.
#[derive(Clone, Default, PartialEq)]
pub struct Context {
    entries: PersistentMap<ContextKey, ContextValue>,
}

impl Context {
    /// Creates an empty context.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: PersistentMap::new(),
        }
    }

    /// Looks up a key.
    pub fn get(&self, key: impl IntoContextKey) -> Option<&ContextValue> {
        self.entries.get(&key.into_lookup_key())
    }

    /// Looks up a key, falling back to `default` when it is absent.
    pub fn get_or(&self, key: impl IntoContextKey, default: ContextValue) -> ContextValue {
        self.get(key).cloned().unwrap_or(default)
    }

    /// Returns true if the key is bound.
    pub fn contains(&self, key: impl IntoContextKey) -> bool {
        self.get(key).is_some()
    }

    /// Returns a new handle with `key` bound, or removed for a tombstone.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::InvalidKey` if the key name is empty.
    pub fn set(
        &self,
        key: impl IntoContextKey,
        value: impl Into<Binding<ContextValue>>,
    ) -> ContextResult<Self> {
        let key = key.into_context_key()?;
        Ok(Self {
            entries: self.entries.assign(key, value),
        })
    }

    /// Returns a new handle without `key`.
    #[must_use]
    pub fn remove(&self, key: impl IntoContextKey) -> Self {
        Self {
            entries: self.entries.remove(&key.into_lookup_key()),
        }
    }

    /// Iterates over the bindings of this version.
    #[must_use]
    pub fn items(&self) -> Iter<'_, ContextKey, ContextValue> {
        self.entries.iter()
    }

    /// Iterates over the keys of this version.
    #[must_use]
    pub fn keys(&self) -> Keys<'_, ContextKey, ContextValue> {
        self.entries.keys()
    }

    /// Iterates over the values of this version.
    #[must_use]
    pub fn values(&self) -> Values<'_, ContextKey, ContextValue> {
        self.entries.values()
    }

    /// Returns the number of bindings.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns another handle to the same version.
    ///
    /// Versions are immutable, so a copy never needs to duplicate data.
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Returns true if both handles refer to the same version.
    #[must_use]
    pub fn same_version(&self, other: &Self) -> bool {
        self.entries.ptr_eq(&other.entries)
    }

    /// Returns the underlying persistent map.
    #[must_use]
    pub const fn as_map(&self) -> &PersistentMap<ContextKey, ContextValue> {
        &self.entries
    }

    /// Converts to a dictionary representation keyed by key display names.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Map<String, ContextValue> {
        self.items()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    /// Returns a short content digest of this version.
    ///
    /// Equal contents give equal fingerprints regardless of how the version
    /// was built, which makes versions easy to correlate in logs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut pairs: Vec<(String, String)> = self
            .items()
            .map(|(key, value)| (key.to_string(), serde_json::to_string(value).unwrap_or_default()))
            .collect();
        pairs.sort();

        let mut hasher = Sha256::new();
        for (key, value) in &pairs {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        let result = hasher.finalize();
        hex::encode(&result[..8])
    }
}

impl From<PersistentMap<ContextKey, ContextValue>> for Context {
    fn from(entries: PersistentMap<ContextKey, ContextValue>) -> Self {
        Self { entries }
    }
}

impl FromIterator<(ContextKey, ContextValue)> for Context {
    fn from_iter<I: IntoIterator<Item = (ContextKey, ContextValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Context {
    type Item = (&'a ContextKey, &'a ContextValue);
    type IntoIter = Iter<'a, ContextKey, ContextValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.items()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.items()).finish()
    }
}

impl Serialize for Context {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}
