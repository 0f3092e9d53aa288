//! Ambient access to the calling thread's active context.
//!
//! These functions are thin wrappers over [`ContextSlot::with_thread`]. Code
//! that already holds a slot should call the slot methods directly.

use super::key::IntoContextKey;
use super::{Context, ContextSlot, ContextValue};
use crate::errors::ContextResult;
use crate::map::Binding;

/// Looks up a key in the thread's active context, falling back to `default`.
pub fn get_item(key: impl IntoContextKey, default: ContextValue) -> ContextValue {
    ContextSlot::with_thread(|slot| slot.get_item(key, default))
}

/// Binds a key in the thread's active context; a tombstone removes it.
///
/// # Errors
///
/// Returns `ContextError::InvalidKey` if the key name is empty.
pub fn set_item(key: impl IntoContextKey, value: impl Into<Binding<ContextValue>>) -> ContextResult<()> {
    ContextSlot::with_thread(|slot| slot.set_item(key, value))
}

/// Returns the thread's active context.
#[must_use]
pub fn current_handle() -> Context {
    ContextSlot::with_thread(ContextSlot::current_handle)
}

/// Makes `handle` the thread's active context, returning the replaced one.
pub fn adopt_handle(handle: Context) -> Context {
    ContextSlot::with_thread(|slot| slot.adopt_handle(handle))
}

/// Returns a new empty handle.
#[must_use]
pub const fn new_empty_handle() -> Context {
    Context::new()
}

/// Runs `f` on the calling thread with `handle` active, restoring afterwards.
pub fn run_isolated<R>(handle: Context, f: impl FnOnce() -> R) -> R {
    ContextSlot::with_thread(|slot| slot.run_isolated(handle, f))
}
