//! The value-or-tombstone type accepted by map and context writes.

use serde::{Deserialize, Serialize};

/// A value to store, or the tombstone that removes the key.
///
/// Assigning `Binding::Tombstone` yields a version without the key, which is
/// what "restore the previous value, or remove the key if it was absent"
/// needs in a single call:
///
/// ```
/// use contextflow::map::{Binding, PersistentMap};
///
/// let map = PersistentMap::new().set("depth", 1);
/// let previous = map.get("depth").copied();
///
/// let changed = map.set("depth", 2);
/// let restored = changed.assign("depth", Binding::restore(previous));
/// assert_eq!(restored.get("depth"), Some(&1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Binding<V> {
    /// Associate the key with this value.
    Value(V),
    /// Remove the key.
    Tombstone,
}

impl<V> Binding<V> {
    /// Builds the binding that restores a previously observed lookup result.
    #[must_use]
    pub fn restore(previous: Option<V>) -> Self {
        previous.map_or(Self::Tombstone, Self::Value)
    }

    /// Returns true for the tombstone.
    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        matches!(self, Self::Tombstone)
    }

    /// Converts into an `Option`, mapping the tombstone to `None`.
    #[must_use]
    pub fn into_option(self) -> Option<V> {
        match self {
            Self::Value(value) => Some(value),
            Self::Tombstone => None,
        }
    }
}

impl<V> From<V> for Binding<V> {
    fn from(value: V) -> Self {
        Self::Value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_absent_is_tombstone() {
        assert!(Binding::<u8>::restore(None).is_tombstone());
        assert_eq!(Binding::restore(Some(3)), Binding::Value(3));
    }

    #[test]
    fn test_into_option() {
        assert_eq!(Binding::from("x").into_option(), Some("x"));
        assert_eq!(Binding::<&str>::Tombstone.into_option(), None);
    }
}
