//! Context managers written as single-yield coroutines.
//!
//! The coroutine runs up to its yield when the managed block starts and
//! finishes when the block ends. Its frame is never isolated, so whatever it
//! sets before yielding is visible inside the block, and whatever it restores
//! afterwards is what the block's caller continues with.

use crate::context::{ContextKey, ContextSlot, ContextValue, IntoContextKey};
use crate::errors::{ContextError, ContextResult};
use crate::frame::{Coroutine, CoroutineStep, Frame, FrameKind, FrameStep};
use crate::map::Binding;
use std::fmt;
use tracing::warn;

/// Drives a single-yield coroutine as a context manager.
pub struct ContextManager<C> {
    frame: Frame<C>,
}

impl<C: Coroutine> ContextManager<C> {
    /// Wraps `coroutine` in an adaptor frame.
    #[must_use]
    pub fn new(coroutine: C, slot: &ContextSlot) -> Self {
        Self {
            frame: Frame::new(FrameKind::InlinedAdaptor, coroutine, slot),
        }
    }

    /// Runs the coroutine up to its yield and returns the yielded value.
    ///
    /// # Errors
    ///
    /// Returns `AdaptorProtocol` if the coroutine completes without yielding,
    /// and the frame errors of [`Frame::step`].
    pub fn enter(&mut self, slot: &ContextSlot) -> ContextResult<C::Yield> {
        match self.frame.step(slot)? {
            FrameStep::Yielded(value) => Ok(value),
            FrameStep::Completed(_) => Err(ContextError::AdaptorProtocol {
                frame_id: self.frame.id(),
                problem: "completed without yielding",
            }),
        }
    }

    /// Runs the coroutine from its yield to completion.
    ///
    /// # Errors
    ///
    /// Returns `AdaptorProtocol` if the coroutine yields a second time, in
    /// which case it is cancelled, and the frame errors of [`Frame::step`].
    pub fn exit(&mut self, slot: &ContextSlot) -> ContextResult<C::Return> {
        match self.frame.step(slot)? {
            FrameStep::Completed(value) => Ok(value),
            FrameStep::Yielded(_) => {
                self.frame.cancel(slot)?;
                Err(ContextError::AdaptorProtocol {
                    frame_id: self.frame.id(),
                    problem: "yielded more than once",
                })
            }
        }
    }

    /// Returns the adaptor frame.
    #[must_use]
    pub const fn frame(&self) -> &Frame<C> {
        &self.frame
    }
}

impl<C> fmt::Debug for ContextManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextManager")
            .field("frame", &self.frame)
            .finish()
    }
}

#[derive(Debug)]
enum OverrideStage {
    Pending(ContextValue),
    Applied(Option<ContextValue>),
    Done,
}

/// Sets a key, yields, then restores the key's previous binding.
///
/// If the key was absent before, it is removed again rather than set to a
/// placeholder.
#[derive(Debug)]
pub struct ScopedOverride {
    key: ContextKey,
    stage: OverrideStage,
}

impl ScopedOverride {
    /// Creates the override.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the key name is empty.
    pub fn new(key: impl IntoContextKey, value: ContextValue) -> ContextResult<Self> {
        Ok(Self {
            key: key.into_context_key()?,
            stage: OverrideStage::Pending(value),
        })
    }

    fn restore(&mut self, slot: &ContextSlot) -> anyhow::Result<()> {
        if let OverrideStage::Applied(previous) =
            std::mem::replace(&mut self.stage, OverrideStage::Done)
        {
            slot.set_item(&self.key, Binding::restore(previous))?;
        }
        Ok(())
    }
}

impl Coroutine for ScopedOverride {
    type Yield = ();
    type Return = ();

    fn resume(&mut self, slot: &ContextSlot) -> CoroutineStep<(), ()> {
        match std::mem::replace(&mut self.stage, OverrideStage::Done) {
            OverrideStage::Pending(value) => {
                let previous = slot.current_handle().get(&self.key).cloned();
                if let Err(error) = slot.set_item(&self.key, value) {
                    return CoroutineStep::Fail(error.into());
                }
                self.stage = OverrideStage::Applied(previous);
                CoroutineStep::Yield(())
            }
            applied @ OverrideStage::Applied(_) => {
                self.stage = applied;
                match self.restore(slot) {
                    Ok(()) => CoroutineStep::Complete(()),
                    Err(error) => CoroutineStep::Fail(error),
                }
            }
            OverrideStage::Done => CoroutineStep::Complete(()),
        }
    }

    fn close(&mut self, slot: &ContextSlot) -> anyhow::Result<()> {
        self.restore(slot)
    }
}

/// Restores an overridden key when dropped.
#[must_use = "the override is undone as soon as the guard is dropped"]
pub struct OverrideGuard<'a> {
    slot: &'a ContextSlot,
    manager: Option<ContextManager<ScopedOverride>>,
}

impl OverrideGuard<'_> {
    /// Restores the key now, reporting any failure.
    ///
    /// # Errors
    ///
    /// Returns the frame error if restoring fails.
    pub fn restore(mut self) -> ContextResult<()> {
        match self.manager.take() {
            Some(mut manager) => manager.exit(self.slot),
            None => Ok(()),
        }
    }
}

impl Drop for OverrideGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut manager) = self.manager.take() {
            if let Err(error) = manager.exit(self.slot) {
                warn!(error = %error, "Failed to restore overridden context key");
            }
        }
    }
}

impl fmt::Debug for OverrideGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideGuard")
            .field("active", &self.manager.is_some())
            .finish_non_exhaustive()
    }
}

/// Binds `key` on `slot` until the returned guard is dropped.
///
/// ```
/// use contextflow::adaptor::override_item;
/// use contextflow::context::ContextSlot;
/// use serde_json::json;
///
/// let slot = ContextSlot::new();
/// {
///     let _guard = override_item(&slot, "precision", json!(50))?;
///     assert_eq!(slot.get_item("precision", json!(null)), json!(50));
/// }
/// assert!(!slot.current_handle().contains("precision"));
/// # Ok::<(), contextflow::errors::ContextError>(())
/// ```
///
/// # Errors
///
/// Returns `InvalidKey` for an empty key name and the frame errors of
/// [`ContextManager::enter`].
pub fn override_item(
    slot: &ContextSlot,
    key: impl IntoContextKey,
    value: ContextValue,
) -> ContextResult<OverrideGuard<'_>> {
    let mut manager = ContextManager::new(ScopedOverride::new(key, value)?, slot);
    manager.enter(slot)?;
    Ok(OverrideGuard {
        slot,
        manager: Some(manager),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{from_fn, FrameState, Script};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_override_restores_previous_value() {
        let slot = ContextSlot::new();
        slot.set_item("precision", json!(28)).unwrap();

        let guard = override_item(&slot, "precision", json!(50)).unwrap();
        assert_eq!(slot.get_item("precision", json!(null)), json!(50));
        guard.restore().unwrap();

        assert_eq!(slot.get_item("precision", json!(null)), json!(28));
    }

    #[test]
    fn test_override_of_absent_key_removes_it() {
        let slot = ContextSlot::new();
        {
            let _guard = override_item(&slot, "tmp", json!(1)).unwrap();
            assert!(slot.current_handle().contains("tmp"));
        }
        assert!(!slot.current_handle().contains("tmp"));
    }

    #[test]
    fn test_override_keeps_other_writes_in_block() {
        let slot = ContextSlot::new();
        {
            let _guard = override_item(&slot, "tmp", json!(1)).unwrap();
            slot.set_item("written_inside", json!(true)).unwrap();
        }
        assert_eq!(slot.get_item("written_inside", json!(null)), json!(true));
        assert!(!slot.current_handle().contains("tmp"));
    }

    #[test]
    fn test_nested_overrides_unwind_in_order() {
        let slot = ContextSlot::new();
        let outer = override_item(&slot, "level", json!(1)).unwrap();
        {
            let _inner = override_item(&slot, "level", json!(2)).unwrap();
            assert_eq!(slot.get_item("level", json!(null)), json!(2));
        }
        assert_eq!(slot.get_item("level", json!(null)), json!(1));
        drop(outer);
        assert!(!slot.current_handle().contains("level"));
    }

    #[test]
    fn test_override_restores_during_panic() {
        let slot = ContextSlot::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = override_item(&slot, "tmp", json!(1)).unwrap();
            panic!("inside block");
        }));

        assert!(outcome.is_err());
        assert!(!slot.current_handle().contains("tmp"));
        assert_eq!(slot.depth(), 0);
    }

    #[test]
    fn test_invalid_key_rejected_before_running() {
        let slot = ContextSlot::new();
        let err = override_item(&slot, "", json!(1)).unwrap_err();
        assert!(matches!(err, ContextError::InvalidKey { .. }));
    }

    #[test]
    fn test_manager_writes_merge_outward() {
        let slot = ContextSlot::new();
        let mut manager = ContextManager::new(
            Script::new()
                .run(|slot| slot.set_item("entered", json!(true)).map_err(Into::into))
                .yield_value(json!("resource"))
                .run(|slot| slot.set_item("exited", json!(true)).map_err(Into::into)),
            &slot,
        );

        assert_eq!(manager.enter(&slot).unwrap(), json!("resource"));
        assert_eq!(slot.get_item("entered", json!(null)), json!(true));
        manager.exit(&slot).unwrap();

        assert_eq!(slot.get_item("exited", json!(null)), json!(true));
        assert!(!manager.frame().is_isolated());
        assert_eq!(manager.frame().state(), FrameState::Completed);
    }

    #[test]
    fn test_manager_without_yield_is_rejected() {
        let slot = ContextSlot::new();
        let mut manager = ContextManager::new(
            from_fn(|_: &ContextSlot| CoroutineStep::<(), ()>::Complete(())),
            &slot,
        );
        assert!(matches!(
            manager.enter(&slot),
            Err(ContextError::AdaptorProtocol { .. })
        ));
    }

    #[test]
    fn test_manager_yielding_twice_is_rejected() {
        let slot = ContextSlot::new();
        let mut manager = ContextManager::new(
            Script::new().yield_value(json!(1)).yield_value(json!(2)),
            &slot,
        );
        manager.enter(&slot).unwrap();

        let err = manager.exit(&slot).unwrap_err();
        assert!(matches!(err, ContextError::AdaptorProtocol { .. }));
        assert_eq!(manager.frame().state(), FrameState::Completed);
    }

    #[test]
    fn test_adaptor_inside_isolated_generator_stays_in_its_branch() {
        let slot = ContextSlot::new();
        let mut generator = Frame::producer(
            Script::new().yield_with(|slot| {
                let _guard = override_item(slot, "inside", json!(true))?;
                Ok(slot.get_item("inside", json!(null)))
            }),
            &slot,
        );

        assert_eq!(generator.step(&slot).unwrap(), FrameStep::Yielded(json!(true)));
        assert!(!slot.current_handle().contains("inside"));
        assert!(!generator.saved_context().contains("inside"));
    }
}
