//! Context state and its propagation within a thread.
//!
//! This module provides:
//! - Context keys, named or identity-compared
//! - Immutable context handles built on the persistent map
//! - The per-thread slot holding the active handle
//! - Ambient free functions acting on the calling thread's slot

pub mod ambient;
mod handle;
mod key;
mod slot;

pub use handle::Context;
pub use key::{ContextKey, IntoContextKey};
pub use slot::ContextSlot;

/// The value type stored in a context.
pub type ContextValue = serde_json::Value;
