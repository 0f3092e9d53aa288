//! A coroutine assembled from a list of operations.

use super::coroutine::{Coroutine, CoroutineStep, FrameStep};
use super::machine::Frame;
use crate::context::{ContextSlot, ContextValue};
use std::fmt;

type Action = Box<dyn FnMut(&ContextSlot) -> anyhow::Result<()> + Send>;
type Produce = Box<dyn FnMut(&ContextSlot) -> anyhow::Result<ContextValue> + Send>;

enum Op {
    Run(Action),
    Yield(Produce),
    Delegate(Box<Frame<Script>>),
    Return(Produce),
}

/// A generator described as a sequence of operations.
///
/// Each resumption runs operations until one yields, returns or fails.
/// Delegating into a nested frame passes every value it yields straight
/// through, and moves on once it completes. A script that runs out of
/// operations completes with the value returned by its last delegation, or
/// `null`.
///
/// ```
/// use contextflow::context::ContextSlot;
/// use contextflow::frame::{Frame, FrameStep, Script};
/// use serde_json::json;
///
/// let slot = ContextSlot::new();
/// let script = Script::new()
///     .run(|slot| slot.set_item("step", json!(1)).map_err(Into::into))
///     .yield_with(|slot| Ok(slot.get_item("step", json!(null))))
///     .returning(json!("done"));
/// let mut frame = Frame::producer(script, &slot);
///
/// assert_eq!(frame.step(&slot).unwrap(), FrameStep::Yielded(json!(1)));
/// assert_eq!(frame.step(&slot).unwrap(), FrameStep::Completed(json!("done")));
/// assert!(!slot.current_handle().contains("step"));
/// ```
#[derive(Default)]
pub struct Script {
    ops: Vec<Op>,
    pc: usize,
    last: Option<ContextValue>,
    on_close: Option<Action>,
}

impl Script {
    /// Creates an empty script, which completes immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs a closure, failing the script if it fails.
    #[must_use]
    pub fn run<F>(mut self, action: F) -> Self
    where
        F: FnMut(&ContextSlot) -> anyhow::Result<()> + Send + 'static,
    {
        self.ops.push(Op::Run(Box::new(action)));
        self
    }

    /// Yields a fixed value.
    #[must_use]
    pub fn yield_value(self, value: ContextValue) -> Self {
        self.yield_with(move |_| Ok(value.clone()))
    }

    /// Yields the value computed by a closure.
    #[must_use]
    pub fn yield_with<F>(mut self, produce: F) -> Self
    where
        F: FnMut(&ContextSlot) -> anyhow::Result<ContextValue> + Send + 'static,
    {
        self.ops.push(Op::Yield(Box::new(produce)));
        self
    }

    /// Delegates into a nested frame until it completes.
    #[must_use]
    pub fn delegate(mut self, frame: Frame<Self>) -> Self {
        self.ops.push(Op::Delegate(Box::new(frame)));
        self
    }

    /// Completes with a fixed value.
    #[must_use]
    pub fn returning(self, value: ContextValue) -> Self {
        self.returning_with(move |_| Ok(value.clone()))
    }

    /// Completes with the value computed by a closure.
    #[must_use]
    pub fn returning_with<F>(mut self, produce: F) -> Self
    where
        F: FnMut(&ContextSlot) -> anyhow::Result<ContextValue> + Send + 'static,
    {
        self.ops.push(Op::Return(Box::new(produce)));
        self
    }

    /// Fails with `message`.
    #[must_use]
    pub fn fail(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.run(move |_| Err(anyhow::anyhow!("{message}")))
    }

    /// Runs a closure when the script is closed while suspended.
    #[must_use]
    pub fn on_close<F>(mut self, action: F) -> Self
    where
        F: FnMut(&ContextSlot) -> anyhow::Result<()> + Send + 'static,
    {
        self.on_close = Some(Box::new(action));
        self
    }

    /// Returns true once every operation has run.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.pc >= self.ops.len()
    }
}

impl Coroutine for Script {
    type Yield = ContextValue;
    type Return = ContextValue;

    fn resume(&mut self, slot: &ContextSlot) -> CoroutineStep<ContextValue, ContextValue> {
        let end = self.ops.len();
        while let Some(op) = self.ops.get_mut(self.pc) {
            match op {
                Op::Run(action) => {
                    if let Err(error) = action(slot) {
                        self.pc = end;
                        return CoroutineStep::Fail(error);
                    }
                    self.pc += 1;
                }
                Op::Yield(produce) => {
                    return match produce(slot) {
                        Ok(value) => {
                            self.pc += 1;
                            CoroutineStep::Yield(value)
                        }
                        Err(error) => {
                            self.pc = end;
                            CoroutineStep::Fail(error)
                        }
                    };
                }
                Op::Delegate(frame) => match frame.delegate(slot) {
                    Ok(FrameStep::Yielded(value)) => return CoroutineStep::Yield(value),
                    Ok(FrameStep::Completed(value)) => {
                        self.last = Some(value);
                        self.pc += 1;
                    }
                    Err(error) => {
                        self.pc = end;
                        return CoroutineStep::Fail(error.into());
                    }
                },
                Op::Return(produce) => {
                    self.pc = end;
                    return match produce(slot) {
                        Ok(value) => CoroutineStep::Complete(value),
                        Err(error) => CoroutineStep::Fail(error),
                    };
                }
            }
        }
        CoroutineStep::Complete(self.last.take().unwrap_or(ContextValue::Null))
    }

    fn close(&mut self, slot: &ContextSlot) -> anyhow::Result<()> {
        if let Some(Op::Delegate(frame)) = self.ops.get_mut(self.pc) {
            frame.cancel(slot)?;
        }
        self.pc = self.ops.len();
        match &mut self.on_close {
            Some(action) => action(slot),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("ops", &self.ops.len())
            .field("pc", &self.pc)
            .finish_non_exhaustive()
    }
}
