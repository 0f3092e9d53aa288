//! The frame state machine.

use super::coroutine::{Coroutine, CoroutineStep, FrameStep};
use super::events::{FrameEvent, FrameEventSink, FrameEventType};
use super::state::{ExitState, FrameId, FrameKind, FrameState};
use crate::config::ContextConfig;
use crate::context::{Context, ContextSlot};
use crate::errors::{ContextError, ContextResult};
use chrono::Utc;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, trace};

/// One suspended-or-running computation together with its context branch.
///
/// A frame captures the slot's active context when it is created. Each time
/// an isolated frame is entered, that captured branch becomes the active
/// context; when it exits, whatever the computation did is saved back into
/// the frame and the driver's context is put back. A non-isolated frame runs
/// directly on whatever context its driver has active, so its writes are
/// visible to the driver after it returns.
///
/// Frames are owned by whoever schedules them and are never shared between
/// threads while running.
pub struct Frame<C> {
    id: FrameId,
    kind: FrameKind,
    isolated: bool,
    state: FrameState,
    delegation_begun: bool,
    saved_context: Context,
    outer_context: Option<Context>,
    coroutine: C,
    sink: Option<Arc<dyn FrameEventSink>>,
}

/// Configures a frame before it captures its context.
pub struct FrameBuilder<C> {
    kind: FrameKind,
    coroutine: C,
    sink: Option<Arc<dyn FrameEventSink>>,
}

impl<C> FrameBuilder<C> {
    /// Sends this frame's lifecycle events to `sink`.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn FrameEventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Applies the event settings of `config`, overriding the slot's sink.
    #[must_use]
    pub fn configured(mut self, config: &ContextConfig) -> Self {
        self.sink = Some(config.event_sink());
        self
    }

    /// Creates the frame, capturing the slot's active context.
    ///
    /// Without a sink of its own the frame reports to the slot's sink.
    #[must_use]
    pub fn capture(mut self, slot: &ContextSlot) -> Frame<C> {
        if self.sink.is_none() {
            self.sink = slot.event_sink();
        }
        self.build(slot.current_handle())
    }

    /// Creates the frame with an explicitly chosen context.
    #[must_use]
    pub fn build(self, context: Context) -> Frame<C> {
        let frame = Frame {
            id: FrameId::new(),
            kind: self.kind,
            isolated: self.kind.starts_isolated(),
            state: FrameState::Created,
            delegation_begun: self.kind == FrameKind::Delegated,
            saved_context: context,
            outer_context: None,
            coroutine: self.coroutine,
            sink: self.sink,
        };
        trace!(frame_id = %frame.id, kind = %frame.kind, "Frame created");
        frame.emit(FrameEventType::Created);
        frame
    }
}

impl<C> Frame<C> {
    /// Starts configuring a frame of the given kind.
    #[must_use]
    pub const fn builder(kind: FrameKind, coroutine: C) -> FrameBuilder<C> {
        FrameBuilder {
            kind,
            coroutine,
            sink: None,
        }
    }

    /// Creates a frame of `kind` capturing the slot's active context.
    #[must_use]
    pub fn new(kind: FrameKind, coroutine: C, slot: &ContextSlot) -> Self {
        Self::builder(kind, coroutine).capture(slot)
    }

    /// Creates a top-level task frame.
    #[must_use]
    pub fn task(coroutine: C, slot: &ContextSlot) -> Self {
        Self::new(FrameKind::Task, coroutine, slot)
    }

    /// Creates a producer frame, such as a generator about to be iterated.
    #[must_use]
    pub fn producer(coroutine: C, slot: &ContextSlot) -> Self {
        Self::new(FrameKind::Producer, coroutine, slot)
    }

    /// Creates a context-manager adaptor frame.
    #[must_use]
    pub fn adaptor(coroutine: C, slot: &ContextSlot) -> Self {
        Self::new(FrameKind::InlinedAdaptor, coroutine, slot)
    }

    /// Returns the frame id.
    #[must_use]
    pub const fn id(&self) -> FrameId {
        self.id
    }

    /// Returns the frame kind.
    #[must_use]
    pub const fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> FrameState {
        self.state
    }

    /// Returns whether the frame runs on its own context branch.
    #[must_use]
    pub const fn is_isolated(&self) -> bool {
        self.isolated
    }

    /// Returns whether delegation has begun.
    #[must_use]
    pub const fn delegation_begun(&self) -> bool {
        self.delegation_begun
    }

    /// Returns the frame's own context branch as of its last exit.
    #[must_use]
    pub const fn saved_context(&self) -> &Context {
        &self.saved_context
    }

    /// Returns the wrapped computation.
    #[must_use]
    pub const fn coroutine(&self) -> &C {
        &self.coroutine
    }

    /// Returns the wrapped computation mutably.
    pub fn coroutine_mut(&mut self) -> &mut C {
        &mut self.coroutine
    }

    /// Makes this frame the running computation on `slot`.
    ///
    /// # Errors
    ///
    /// Returns `ReentrantFrameEntry` if the frame is already running,
    /// `FrameFinished` if it is in a terminal state and
    /// `FrameDepthExceeded` if the slot's nesting limit is reached. The slot
    /// is unchanged in all of these cases.
    pub fn enter(&mut self, slot: &ContextSlot) -> ContextResult<()> {
        match self.state {
            FrameState::Running => {
                return Err(ContextError::ReentrantFrameEntry { frame_id: self.id });
            }
            FrameState::Completed | FrameState::Failed => {
                return Err(ContextError::FrameFinished {
                    frame_id: self.id,
                    state: self.state,
                });
            }
            FrameState::Created | FrameState::Suspended => {}
        }
        slot.push_frame()?;

        if self.isolated {
            self.outer_context = Some(slot.adopt_handle(self.saved_context.clone()));
        }
        self.state = FrameState::Running;
        self.emit(FrameEventType::Entered);
        Ok(())
    }

    /// Stops running this frame on `slot`, moving it to `next`.
    ///
    /// An isolated frame saves the slot's context as its own branch and puts
    /// the driver's context back. A non-isolated frame leaves the slot alone.
    ///
    /// # Errors
    ///
    /// Returns `FrameNotRunning` if the frame was not entered.
    pub fn exit(&mut self, slot: &ContextSlot, next: ExitState) -> ContextResult<()> {
        if self.state != FrameState::Running {
            return Err(ContextError::FrameNotRunning {
                frame_id: self.id,
                state: self.state,
            });
        }
        self.leave(slot, next);
        Ok(())
    }

    /// Switches the frame to run on its driver's context.
    ///
    /// Allowed once, before the first entry. Adaptor frames are already
    /// non-isolated and keep their kind; every other kind becomes
    /// [`FrameKind::Delegated`].
    ///
    /// # Errors
    ///
    /// Returns `TaskDelegation` for task frames, `DelegationAlreadyBegun` on a
    /// second call and `DelegationAfterEnter` once the frame has run.
    pub fn begin_delegation(&mut self) -> ContextResult<()> {
        if self.kind == FrameKind::Task {
            return Err(ContextError::TaskDelegation {
                frame_id: self.id,
                kind: self.kind,
            });
        }
        if self.delegation_begun {
            return Err(ContextError::DelegationAlreadyBegun { frame_id: self.id });
        }
        if self.state != FrameState::Created {
            return Err(ContextError::DelegationAfterEnter { frame_id: self.id });
        }

        self.delegation_begun = true;
        self.isolated = false;
        if self.kind != FrameKind::InlinedAdaptor {
            self.kind = FrameKind::Delegated;
        }
        debug!(frame_id = %self.id, kind = %self.kind, "Frame delegation begun");
        self.emit(FrameEventType::DelegationBegun);
        Ok(())
    }

    /// Moves out of `Running`. Only called with the frame running.
    fn leave(&mut self, slot: &ContextSlot, next: ExitState) {
        if let Some(outer) = self.outer_context.take() {
            self.saved_context = slot.adopt_handle(outer);
        }
        slot.pop_frame();
        self.state = next.into();
        self.emit(FrameEventType::Exited);
    }

    fn emit(&self, event_type: FrameEventType) {
        let Some(sink) = &self.sink else { return };
        if !sink.enabled() {
            return;
        }
        sink.on_event(&FrameEvent {
            event_type,
            frame_id: self.id,
            kind: self.kind,
            state: self.state,
            isolated: self.isolated,
            context_len: self.saved_context.len(),
            timestamp: Utc::now(),
        });
    }
}

impl<C: Coroutine> Frame<C> {
    /// Runs the computation once: enter, resume, exit.
    ///
    /// The slot's context is restored before this returns, on failure and
    /// when the computation panics, in which case the panic continues after
    /// the frame has been marked failed.
    ///
    /// # Errors
    ///
    /// Returns the `enter` errors unchanged and `FrameFailed` when the
    /// computation fails.
    pub fn step(&mut self, slot: &ContextSlot) -> ContextResult<FrameStep<C::Yield, C::Return>> {
        self.enter(slot)?;
        let resumed = panic::catch_unwind(AssertUnwindSafe(|| self.coroutine.resume(slot)));

        match resumed {
            Ok(CoroutineStep::Yield(value)) => {
                self.leave(slot, ExitState::Suspended);
                Ok(FrameStep::Yielded(value))
            }
            Ok(CoroutineStep::Complete(value)) => {
                self.leave(slot, ExitState::Completed);
                Ok(FrameStep::Completed(value))
            }
            Ok(CoroutineStep::Fail(source)) => {
                self.leave(slot, ExitState::Failed);
                debug!(frame_id = %self.id, error = %source, "Frame failed");
                Err(ContextError::frame_failed(self.id, source))
            }
            Err(payload) => {
                self.leave(slot, ExitState::Failed);
                debug!(frame_id = %self.id, "Frame panicked");
                panic::resume_unwind(payload)
            }
        }
    }

    /// Steps the frame as the target of a delegation from the running code.
    ///
    /// The first call begins delegation, so the frame's writes land in the
    /// caller's context. Frames that already began delegation are stepped
    /// directly.
    ///
    /// # Errors
    ///
    /// Returns the `begin_delegation` and `step` errors.
    pub fn delegate(
        &mut self,
        slot: &ContextSlot,
    ) -> ContextResult<FrameStep<C::Yield, C::Return>> {
        if !self.delegation_begun {
            self.begin_delegation()?;
        }
        self.step(slot)
    }

    /// Abandons the computation.
    ///
    /// A frame that never ran completes without running. A suspended frame
    /// is entered once more so its cleanup runs on its own context, then
    /// exits normally. Finished frames are left alone.
    ///
    /// # Errors
    ///
    /// Returns `ReentrantFrameEntry` for a running frame, `FrameDepthExceeded`
    /// if the frame cannot be entered, and `FrameFailed` if cleanup fails.
    pub fn cancel(&mut self, slot: &ContextSlot) -> ContextResult<()> {
        match self.state {
            FrameState::Created => {
                self.state = FrameState::Completed;
                self.emit(FrameEventType::Cancelled);
                Ok(())
            }
            FrameState::Suspended => {
                self.enter(slot)?;
                let closed = panic::catch_unwind(AssertUnwindSafe(|| self.coroutine.close(slot)));
                match closed {
                    Ok(Ok(())) => {
                        self.leave(slot, ExitState::Completed);
                        self.emit(FrameEventType::Cancelled);
                        Ok(())
                    }
                    Ok(Err(source)) => {
                        self.leave(slot, ExitState::Failed);
                        Err(ContextError::frame_failed(self.id, source))
                    }
                    Err(payload) => {
                        self.leave(slot, ExitState::Failed);
                        panic::resume_unwind(payload)
                    }
                }
            }
            FrameState::Running => Err(ContextError::ReentrantFrameEntry { frame_id: self.id }),
            FrameState::Completed | FrameState::Failed => Ok(()),
        }
    }
}

impl<C> Drop for Frame<C> {
    fn drop(&mut self) {
        if self.state == FrameState::Suspended {
            trace!(frame_id = %self.id, "Suspended frame dropped without resuming");
        }
    }
}

impl<C> fmt::Debug for Frame<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("isolated", &self.isolated)
            .field("delegation_begun", &self.delegation_begun)
            .field("saved_context", &self.saved_context)
            .finish_non_exhaustive()
    }
}
