//! The per-thread active context cell.

use super::key::IntoContextKey;
use super::{Context, ContextValue};
use crate::config::{ContextConfig, DEFAULT_MAX_FRAME_DEPTH};
use crate::errors::{ContextError, ContextResult};
use crate::frame::FrameEventSink;
use crate::map::Binding;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::Arc;

thread_local! {
    static THREAD_SLOT: ContextSlot = ContextSlot::new();
}

/// The cell holding the currently active [`Context`] of one thread.
///
/// A slot is not `Sync`: only the owning thread reads or replaces its
/// reference, so no locking is involved. Only the reference is ever replaced;
/// the versions it points to are immutable and may be shared freely.
///
/// Every thread lazily gets one slot, reachable through
/// [`ContextSlot::with_thread`]. Slots can also be constructed directly, which
/// lets tests simulate several workers inside one thread.
pub struct ContextSlot {
    current: RefCell<Context>,
    depth: Cell<usize>,
    max_depth: Cell<usize>,
    sink: RefCell<Option<Arc<dyn FrameEventSink>>>,
}

impl ContextSlot {
    /// Creates a slot holding the empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::with_context(Context::new())
    }

    /// Creates a slot holding `context`.
    #[must_use]
    pub const fn with_context(context: Context) -> Self {
        Self {
            current: RefCell::new(context),
            depth: Cell::new(0),
            max_depth: Cell::new(DEFAULT_MAX_FRAME_DEPTH),
            sink: RefCell::new(None),
        }
    }

    /// Creates an empty slot using the limits and event settings of `config`.
    #[must_use]
    pub fn with_config(config: &ContextConfig) -> Self {
        let slot = Self::new();
        slot.configure(config);
        slot
    }

    /// Applies the frame depth limit and frame event settings of `config`.
    ///
    /// Frames captured from this slot afterwards report to the configured
    /// sink unless they were given their own.
    pub fn configure(&self, config: &ContextConfig) {
        self.set_max_frame_depth(config.max_frame_depth);
        self.set_event_sink(Some(config.event_sink()));
    }

    /// Applies `config` to the calling thread's slot.
    ///
    /// Call this from each worker thread, for example in tokio's
    /// `on_thread_start`, to make environment settings reach every task.
    pub fn configure_thread(config: &ContextConfig) {
        Self::with_thread(|slot| slot.configure(config));
    }

    /// Runs `f` with the calling thread's slot, creating it on first use.
    pub fn with_thread<R>(f: impl FnOnce(&Self) -> R) -> R {
        THREAD_SLOT.with(f)
    }

    /// Like [`ContextSlot::with_thread`], but returns `None` instead of
    /// panicking once the thread's slot has been destroyed.
    pub fn try_with_thread<R>(f: impl FnOnce(&Self) -> R) -> Option<R> {
        THREAD_SLOT.try_with(f).ok()
    }

    /// Looks up a key in the active context, falling back to `default`.
    pub fn get_item(&self, key: impl IntoContextKey, default: ContextValue) -> ContextValue {
        self.current.borrow().get_or(key, default)
    }

    /// Binds a key in the active context; a tombstone removes it.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::InvalidKey` if the key name is empty. The
    /// active context is unchanged in that case.
    pub fn set_item(
        &self,
        key: impl IntoContextKey,
        value: impl Into<Binding<ContextValue>>,
    ) -> ContextResult<()> {
        let next = self.current.borrow().set(key, value)?;
        *self.current.borrow_mut() = next;
        Ok(())
    }

    /// Returns the active context without copying it.
    #[must_use]
    pub fn current_handle(&self) -> Context {
        self.current.borrow().clone()
    }

    /// Makes `handle` the active context and returns the one it replaced.
    ///
    /// The replaced handle remains valid wherever else it is held.
    pub fn adopt_handle(&self, handle: Context) -> Context {
        self.current.replace(handle)
    }

    /// Runs `f` with `handle` active, then restores the previous context.
    ///
    /// Restoration happens on every exit path, including a panic unwinding
    /// through `f`, and nests correctly for recursive calls. Writes made by
    /// `f` are visible to code it calls but are never written into `handle`
    /// and never reach the caller.
    pub fn run_isolated<R>(&self, handle: Context, f: impl FnOnce() -> R) -> R {
        let _restore = RestoreGuard {
            slot: self,
            saved: Some(self.adopt_handle(handle)),
        };
        f()
    }

    /// Returns the number of frames currently entered on this slot.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Returns the frame nesting limit.
    #[must_use]
    pub fn max_frame_depth(&self) -> usize {
        self.max_depth.get()
    }

    /// Sets the frame nesting limit.
    pub fn set_max_frame_depth(&self, limit: usize) {
        self.max_depth.set(limit);
    }

    /// Returns the sink frames captured from this slot report to by default.
    #[must_use]
    pub fn event_sink(&self) -> Option<Arc<dyn FrameEventSink>> {
        self.sink.borrow().clone()
    }

    /// Sets the default frame event sink; `None` turns events off.
    pub fn set_event_sink(&self, sink: Option<Arc<dyn FrameEventSink>>) {
        *self.sink.borrow_mut() = sink;
    }

    pub(crate) fn push_frame(&self) -> ContextResult<()> {
        let depth = self.depth.get();
        let limit = self.max_depth.get();
        if depth >= limit {
            return Err(ContextError::FrameDepthExceeded { limit });
        }
        self.depth.set(depth + 1);
        Ok(())
    }

    pub(crate) fn pop_frame(&self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

impl Default for ContextSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContextSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSlot")
            .field("current", &*self.current.borrow())
            .field("depth", &self.depth.get())
            .field("max_depth", &self.max_depth.get())
            .field("events", &self.sink.borrow().is_some())
            .finish()
    }
}

/// Puts the saved context back when dropped.
struct RestoreGuard<'a> {
    slot: &'a ContextSlot,
    saved: Option<Context>,
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.slot.adopt_handle(saved);
        }
    }
}
