//! A deterministic round-robin scheduler for frames.

use crate::context::ContextSlot;
use crate::errors::{ContextError, ContextResult};
use crate::frame::{Coroutine, Frame, FrameStep};

/// What one step of a frame produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome<Y, R> {
    /// The frame suspended with a value.
    Yielded(Y),
    /// The frame completed with a value.
    Completed(R),
    /// The frame failed; holds the rendered error.
    Failed(String),
}

/// One step taken by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry<Y, R> {
    /// Index of the frame, in insertion order.
    pub frame: usize,
    /// Index of the slot (worker) the step ran on.
    pub worker: usize,
    /// What the step produced.
    pub outcome: StepOutcome<Y, R>,
}

/// Steps frames in turn until all of them have finished.
///
/// Each round gives every unfinished frame one step. With several slots the
/// driver moves to the next slot after every step, so a frame may resume on
/// a different worker than it last ran on.
#[derive(Debug)]
pub struct RoundRobin<C> {
    frames: Vec<Frame<C>>,
}

impl<C: Coroutine> RoundRobin<C> {
    /// Creates an empty driver.
    #[must_use]
    pub const fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Adds a frame and returns its index.
    pub fn push(&mut self, frame: Frame<C>) -> usize {
        self.frames.push(frame);
        self.frames.len() - 1
    }

    /// Returns the frames in insertion order.
    #[must_use]
    pub fn frames(&self) -> &[Frame<C>] {
        &self.frames
    }

    /// Runs every frame to completion on one slot.
    ///
    /// # Errors
    ///
    /// Returns protocol errors; failures of the frames themselves are
    /// recorded in the trace.
    pub fn run(&mut self, slot: &ContextSlot) -> ContextResult<Vec<TraceEntry<C::Yield, C::Return>>> {
        self.run_on(std::slice::from_ref(slot))
    }

    /// Runs every frame to completion, rotating through `slots`.
    ///
    /// # Errors
    ///
    /// Returns protocol errors; failures of the frames themselves are
    /// recorded in the trace.
    pub fn run_on(
        &mut self,
        slots: &[ContextSlot],
    ) -> ContextResult<Vec<TraceEntry<C::Yield, C::Return>>> {
        let mut trace = Vec::new();
        if slots.is_empty() {
            return Ok(trace);
        }
        let mut worker = 0;

        while self.frames.iter().any(|f| !f.state().is_terminal()) {
            for (index, frame) in self.frames.iter_mut().enumerate() {
                if frame.state().is_terminal() {
                    continue;
                }
                let outcome = match frame.step(&slots[worker]) {
                    Ok(FrameStep::Yielded(value)) => StepOutcome::Yielded(value),
                    Ok(FrameStep::Completed(value)) => StepOutcome::Completed(value),
                    Err(ContextError::FrameFailed { source, .. }) => {
                        StepOutcome::Failed(format!("{source:#}"))
                    }
                    Err(error) => return Err(error),
                };
                trace.push(TraceEntry {
                    frame: index,
                    worker,
                    outcome,
                });
                worker = (worker + 1) % slots.len();
            }
        }
        Ok(trace)
    }
}

impl<C: Coroutine> Default for RoundRobin<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameState, Script};
    use crate::testing::{assert_context_lacks, assert_frame_state};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn worker(name: &'static str) -> Script {
        Script::new()
            .run(move |slot| slot.set_item("name", json!(name)).map_err(Into::into))
            .yield_with(|slot| Ok(slot.get_item("name", json!(null))))
            .returning_with(|slot| Ok(slot.get_item("name", json!(null))))
    }

    #[test]
    fn test_round_robin_interleaves() {
        let slot = ContextSlot::new();
        let mut driver = RoundRobin::new();
        driver.push(Frame::task(worker("a"), &slot));
        driver.push(Frame::task(worker("b"), &slot));

        let trace = driver.run(&slot).unwrap();
        let outcomes: Vec<_> = trace.into_iter().map(|e| (e.frame, e.outcome)).collect();

        assert_eq!(
            outcomes,
            vec![
                (0, StepOutcome::Yielded(json!("a"))),
                (1, StepOutcome::Yielded(json!("b"))),
                (0, StepOutcome::Completed(json!("a"))),
                (1, StepOutcome::Completed(json!("b"))),
            ]
        );
        assert_context_lacks(&slot.current_handle(), "name");
    }

    #[test]
    fn test_frames_migrate_between_workers() {
        let slots = [ContextSlot::new(), ContextSlot::new()];
        let mut driver = RoundRobin::new();
        for _ in 0..3 {
            driver.push(Frame::task(worker("w"), &slots[0]));
        }

        let trace = driver.run_on(&slots).unwrap();

        assert!(trace.iter().any(|e| e.frame == 0 && e.worker == 1));
        assert_eq!(trace.len(), 6);
        assert!(!trace
            .iter()
            .any(|e| matches!(e.outcome, StepOutcome::Failed(_))));
        for slot in &slots {
            assert!(slot.current_handle().is_empty());
            assert_eq!(slot.depth(), 0);
        }
    }

    #[test]
    fn test_failures_are_recorded() {
        let slot = ContextSlot::new();
        let mut driver = RoundRobin::new();
        driver.push(Frame::task(Script::new().fail("broken"), &slot));

        let trace = driver.run(&slot).unwrap();

        assert!(matches!(&trace[0].outcome, StepOutcome::Failed(msg) if msg.contains("broken")));
        assert_frame_state(&driver.frames()[0], FrameState::Failed);
    }
}
