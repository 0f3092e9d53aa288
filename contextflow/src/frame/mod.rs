//! Frames: the unit of context isolation.
//!
//! A [`Frame`] wraps one running-or-suspended computation together with the
//! context it captured at creation. Schedulers decide once, through
//! [`FrameKind`], whether a frame runs on its own branch or directly on the
//! context of whoever drives it:
//!
//! - [`FrameKind::Task`] and [`FrameKind::Producer`] frames are isolated.
//! - [`FrameKind::Delegated`] frames (await, yield-from) and
//!   [`FrameKind::InlinedAdaptor`] frames are not.
//!
//! A producer becomes delegated when delegation begins before its first
//! step; after that the decision is fixed.

mod coroutine;
mod events;
pub mod hooks;
mod machine;
mod script;
mod state;

pub use coroutine::{from_fn, Coroutine, CoroutineStep, FnCoroutine, FrameStep};
#[cfg(test)]
pub use events::MockFrameEventSink;
pub use events::{
    CollectingFrameSink, FrameEvent, FrameEventSink, FrameEventType, LoggingFrameSink,
    NoOpFrameSink,
};
pub use machine::{Frame, FrameBuilder};
pub use script::Script;
pub use state::{ExitState, FrameId, FrameKind, FrameState};
