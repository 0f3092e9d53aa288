//! Frame lifecycle events and the sinks that receive them.

use super::state::{FrameId, FrameKind, FrameState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, Level};

/// What happened to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameEventType {
    /// The frame captured its context.
    Created,
    /// The frame became the running computation.
    Entered,
    /// The frame stopped running.
    Exited,
    /// The frame switched to running on its driver's context.
    DelegationBegun,
    /// The frame was cancelled before finishing.
    Cancelled,
}

impl FrameEventType {
    /// Returns the dotted event name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "frame.created",
            Self::Entered => "frame.entered",
            Self::Exited => "frame.exited",
            Self::DelegationBegun => "frame.delegation_begun",
            Self::Cancelled => "frame.cancelled",
        }
    }
}

impl fmt::Display for FrameEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frame lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameEvent {
    /// What happened.
    pub event_type: FrameEventType,
    /// The frame it happened to.
    pub frame_id: FrameId,
    /// The frame kind at the time of the event.
    pub kind: FrameKind,
    /// The frame state after the event.
    pub state: FrameState,
    /// Whether the frame was isolated at the time of the event.
    pub isolated: bool,
    /// Number of bindings in the frame's saved context.
    pub context_len: usize,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

/// Receives frame lifecycle events.
///
/// Sinks are called synchronously from inside frame transitions and must
/// not block or panic.
#[cfg_attr(test, mockall::automock)]
pub trait FrameEventSink: Send + Sync {
    /// Returns false if events would be discarded, so frames can skip
    /// building them.
    fn enabled(&self) -> bool {
        true
    }

    /// Receives one event.
    fn on_event(&self, event: &FrameEvent);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpFrameSink;

impl FrameEventSink for NoOpFrameSink {
    fn enabled(&self) -> bool {
        false
    }

    fn on_event(&self, _event: &FrameEvent) {}
}

/// A sink that logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingFrameSink {
    level: Level,
}

impl Default for LoggingFrameSink {
    fn default() -> Self {
        Self::debug()
    }
}

impl LoggingFrameSink {
    /// Creates a sink logging at `level`. Levels other than `INFO` log at
    /// `DEBUG`.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level sink.
    #[must_use]
    pub const fn info() -> Self {
        Self::new(Level::INFO)
    }
}

impl FrameEventSink for LoggingFrameSink {
    fn on_event(&self, event: &FrameEvent) {
        if self.level == Level::INFO {
            info!(
                event_type = %event.event_type,
                frame_id = %event.frame_id,
                kind = %event.kind,
                state = %event.state,
                isolated = event.isolated,
                context_len = event.context_len,
                "Frame event: {}", event.event_type
            );
        } else {
            debug!(
                event_type = %event.event_type,
                frame_id = %event.frame_id,
                kind = %event.kind,
                state = %event.state,
                isolated = event.isolated,
                context_len = event.context_len,
                "Frame event: {}", event.event_type
            );
        }
    }
}

/// A sink that keeps every event, for tests and debugging.
#[derive(Debug, Default)]
pub struct CollectingFrameSink {
    events: parking_lot::RwLock<Vec<FrameEvent>>,
}

impl CollectingFrameSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<FrameEvent> {
        self.events.read().clone()
    }

    /// Returns the collected event types in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<FrameEventType> {
        self.events.read().iter().map(|e| e.event_type).collect()
    }

    /// Returns the events recorded for one frame.
    #[must_use]
    pub fn events_for(&self, frame_id: FrameId) -> Vec<FrameEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.frame_id == frame_id)
            .cloned()
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl FrameEventSink for CollectingFrameSink {
    fn on_event(&self, event: &FrameEvent) {
        self.events.write().push(event.clone());
    }
}
