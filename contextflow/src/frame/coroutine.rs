//! The computation a frame wraps.

use crate::context::ContextSlot;

/// What one resumption of a coroutine produced.
#[derive(Debug)]
pub enum CoroutineStep<Y, R> {
    /// Suspended at a yield point with a value.
    Yield(Y),
    /// Finished with a return value.
    Complete(R),
    /// Failed.
    Fail(anyhow::Error),
}

/// A resumable computation: a generator, a coroutine, or a future adapted to
/// step-wise driving.
///
/// Implementations read and write context through the slot they are given.
/// The frame driving them decides which context that slot holds.
pub trait Coroutine {
    /// Value produced at each yield point.
    type Yield;
    /// Value produced on completion.
    type Return;

    /// Runs until the next yield point, completion, or failure.
    fn resume(&mut self, slot: &ContextSlot) -> CoroutineStep<Self::Yield, Self::Return>;

    /// Abandons a suspended computation, running whatever cleanup it has.
    ///
    /// # Errors
    ///
    /// Returns the cleanup failure, if any.
    fn close(&mut self, _slot: &ContextSlot) -> anyhow::Result<()> {
        Ok(())
    }
}

/// What a frame step produced, once failures have been split off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameStep<Y, R> {
    /// The frame suspended with a value.
    Yielded(Y),
    /// The frame finished with a value.
    Completed(R),
}

impl<Y, R> FrameStep<Y, R> {
    /// Returns true if the frame finished.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Returns the yielded value, if any.
    #[must_use]
    pub fn yielded(self) -> Option<Y> {
        match self {
            Self::Yielded(value) => Some(value),
            Self::Completed(_) => None,
        }
    }

    /// Returns the completion value, if any.
    #[must_use]
    pub fn completed(self) -> Option<R> {
        match self {
            Self::Yielded(_) => None,
            Self::Completed(value) => Some(value),
        }
    }
}

/// A coroutine backed by a closure called once per resumption.
pub struct FnCoroutine<F> {
    f: F,
}

/// Builds a coroutine from a closure.
///
/// ```
/// use contextflow::context::ContextSlot;
/// use contextflow::frame::{from_fn, CoroutineStep, Frame, FrameStep};
///
/// let slot = ContextSlot::new();
/// let mut remaining = 2;
/// let mut frame = Frame::producer(
///     from_fn(move |_slot: &ContextSlot| {
///         remaining -= 1;
///         if remaining > 0 {
///             CoroutineStep::Yield(remaining)
///         } else {
///             CoroutineStep::Complete(())
///         }
///     }),
///     &slot,
/// );
///
/// assert_eq!(frame.step(&slot).unwrap(), FrameStep::Yielded(1));
/// assert_eq!(frame.step(&slot).unwrap(), FrameStep::Completed(()));
/// ```
pub const fn from_fn<F, Y, R>(f: F) -> FnCoroutine<F>
where
    F: FnMut(&ContextSlot) -> CoroutineStep<Y, R>,
{
    FnCoroutine { f }
}

impl<F, Y, R> Coroutine for FnCoroutine<F>
where
    F: FnMut(&ContextSlot) -> CoroutineStep<Y, R>,
{
    type Yield = Y;
    type Return = R;

    fn resume(&mut self, slot: &ContextSlot) -> CoroutineStep<Y, R> {
        (self.f)(slot)
    }
}
