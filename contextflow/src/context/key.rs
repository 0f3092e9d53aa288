//! Context keys.

use crate::errors::{ContextError, ContextResult};
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static UNIQUE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, PartialEq, Eq, Hash)]
enum Repr {
    Named(Arc<str>),
    Unique { id: u64, label: Arc<str> },
}

/// A key in a [`Context`](super::Context).
///
/// Named keys compare by name, so any two pieces of code spelling the same
/// name share a binding. Unique keys compare by identity: each call to
/// [`ContextKey::unique`] creates a key no other code can forge.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ContextKey(Repr);

impl ContextKey {
    /// Creates a named key. Any non-empty string is a valid name.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::InvalidKey` if the name is empty.
    pub fn named(name: impl AsRef<str>) -> ContextResult<Self> {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(ContextError::invalid_key(name, "key name is empty"));
        }
        Ok(Self::unchecked(name))
    }

    /// Creates a key that is equal only to its own clones.
    #[must_use]
    pub fn unique(label: impl AsRef<str>) -> Self {
        Self(Repr::Unique {
            id: UNIQUE_ID.fetch_add(1, Ordering::Relaxed),
            label: Arc::from(label.as_ref()),
        })
    }

    /// Named key without validation, used for lookups only.
    ///
    /// The empty name can never have been stored, so the lookup just misses.
    fn unchecked(name: &str) -> Self {
        Self(Repr::Named(Arc::from(name)))
    }

    /// Returns the name (or label, for unique keys).
    #[must_use]
    pub fn name(&self) -> &str {
        match &self.0 {
            Repr::Named(name) => name,
            Repr::Unique { label, .. } => label,
        }
    }

    /// Returns true for identity-compared keys.
    #[must_use]
    pub const fn is_unique(&self) -> bool {
        matches!(self.0, Repr::Unique { .. })
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Named(name) => f.write_str(name),
            Repr::Unique { id, label } => write!(f, "{label}#{id}"),
        }
    }
}

impl fmt::Debug for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextKey({self})")
    }
}

impl Serialize for ContextKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Conversion into a [`ContextKey`].
///
/// Writes reject the empty name; lookups never fail.
pub trait IntoContextKey: Sized {
    /// Converts for a write.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::InvalidKey` for the empty name.
    fn into_context_key(self) -> ContextResult<ContextKey>;

    /// Converts for a lookup.
    fn into_lookup_key(self) -> ContextKey;
}

impl IntoContextKey for ContextKey {
    fn into_context_key(self) -> ContextResult<ContextKey> {
        Ok(self)
    }

    fn into_lookup_key(self) -> ContextKey {
        self
    }
}

impl IntoContextKey for &ContextKey {
    fn into_context_key(self) -> ContextResult<ContextKey> {
        Ok(self.clone())
    }

    fn into_lookup_key(self) -> ContextKey {
        self.clone()
    }
}

impl IntoContextKey for &str {
    fn into_context_key(self) -> ContextResult<ContextKey> {
        ContextKey::named(self)
    }

    fn into_lookup_key(self) -> ContextKey {
        ContextKey::unchecked(self)
    }
}

impl IntoContextKey for String {
    fn into_context_key(self) -> ContextResult<ContextKey> {
        ContextKey::named(&self)
    }

    fn into_lookup_key(self) -> ContextKey {
        ContextKey::unchecked(&self)
    }
}

impl IntoContextKey for &String {
    fn into_context_key(self) -> ContextResult<ContextKey> {
        ContextKey::named(self)
    }

    fn into_lookup_key(self) -> ContextKey {
        ContextKey::unchecked(self)
    }
}
