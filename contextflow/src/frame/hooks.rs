//! Entry points for schedulers that drive frames themselves.
//!
//! A scheduler that runs its own coroutine implementation calls these at the
//! matching points of its dispatch loop. Schedulers built on [`Coroutine`]
//! use [`Frame::step`](super::Frame::step) instead, which calls them in
//! order.
//!
//! [`Coroutine`]: super::Coroutine

use super::machine::Frame;
use super::state::{ExitState, FrameKind};
use crate::context::ContextSlot;
use crate::errors::ContextResult;

/// Creates a frame capturing the slot's active context.
#[must_use]
pub fn on_frame_create<C>(slot: &ContextSlot, kind: FrameKind, coroutine: C) -> Frame<C> {
    Frame::new(kind, coroutine, slot)
}

/// Call when the frame's computation is about to run.
///
/// # Errors
///
/// See [`Frame::enter`].
pub fn on_frame_enter<C>(frame: &mut Frame<C>, slot: &ContextSlot) -> ContextResult<()> {
    frame.enter(slot)
}

/// Call when the frame's computation stops running, on every exit path.
///
/// # Errors
///
/// See [`Frame::exit`].
pub fn on_frame_exit<C>(
    frame: &mut Frame<C>,
    slot: &ContextSlot,
    outcome: ExitState,
) -> ContextResult<()> {
    frame.exit(slot, outcome)
}

/// Call when running code starts delegating into the frame (await or
/// yield-from), before the frame's first entry.
///
/// # Errors
///
/// See [`Frame::begin_delegation`].
pub fn on_delegation_begin<C>(frame: &mut Frame<C>) -> ContextResult<()> {
    frame.begin_delegation()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameState;
    use serde_json::json;

    /// A hand-written generator: the scheduler keeps the program counter.
    struct Counter {
        pc: u32,
    }

    #[test]
    fn test_scheduler_driven_lifecycle() {
        let slot = ContextSlot::new();
        slot.set_item("k", json!("captured")).unwrap();
        let mut frame = on_frame_create(&slot, FrameKind::Producer, Counter { pc: 0 });
        slot.set_item("k", json!("driver")).unwrap();

        for _ in 0..2 {
            on_frame_enter(&mut frame, &slot).unwrap();
            frame.coroutine_mut().pc += 1;
            let pc = frame.coroutine().pc;
            assert_eq!(slot.get_item("k", json!(null)), json!("captured"));
            slot.set_item("pc", json!(pc)).unwrap();
            on_frame_exit(&mut frame, &slot, ExitState::Suspended).unwrap();
        }

        assert_eq!(slot.get_item("k", json!(null)), json!("driver"));
        assert!(!slot.current_handle().contains("pc"));
        assert_eq!(frame.saved_context().get("pc"), Some(&json!(2)));
        assert_eq!(frame.state(), FrameState::Suspended);
    }

    #[test]
    fn test_delegated_frame_writes_reach_driver() {
        let slot = ContextSlot::new();
        let mut frame = on_frame_create(&slot, FrameKind::Producer, ());
        on_delegation_begin(&mut frame).unwrap();

        on_frame_enter(&mut frame, &slot).unwrap();
        slot.set_item("k", json!(2)).unwrap();
        on_frame_exit(&mut frame, &slot, ExitState::Completed).unwrap();

        assert_eq!(slot.get_item("k", json!(null)), json!(2));
    }
}
