//! Frame identity, kind and lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies one frame for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(Uuid);

impl FrameId {
    /// Generates a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for FrameId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// How a frame is driven, decided by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// A top-level scheduling unit. Always isolated, never delegated into.
    Task,
    /// A frame driven through another frame (await / yield-from). Runs
    /// directly on its driver's context.
    Delegated,
    /// A frame stepped directly by a consumer, such as a generator being
    /// iterated. Isolated unless delegation begins before its first step.
    Producer,
    /// A context-manager style frame whose writes always reach whoever
    /// steps it.
    InlinedAdaptor,
}

impl FrameKind {
    /// Returns whether frames of this kind start out isolated.
    #[must_use]
    pub const fn starts_isolated(self) -> bool {
        matches!(self, Self::Task | Self::Producer)
    }

    /// Returns the kind as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Delegated => "delegated",
            Self::Producer => "producer",
            Self::InlinedAdaptor => "inlined_adaptor",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameState {
    /// Created, never entered.
    Created,
    /// Between `enter` and `exit`.
    Running,
    /// Stopped at a yield point, waiting to be resumed.
    Suspended,
    /// Finished normally.
    Completed,
    /// Finished with a failure.
    Failed,
}

impl FrameState {
    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the state as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The state a frame leaves `Running` for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// The step stopped at a yield point.
    Suspended,
    /// The computation finished.
    Completed,
    /// The computation failed.
    Failed,
}

impl From<ExitState> for FrameState {
    fn from(state: ExitState) -> Self {
        match state {
            ExitState::Suspended => Self::Suspended,
            ExitState::Completed => Self::Completed,
            ExitState::Failed => Self::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_defaults_by_kind() {
        assert!(FrameKind::Task.starts_isolated());
        assert!(FrameKind::Producer.starts_isolated());
        assert!(!FrameKind::Delegated.starts_isolated());
        assert!(!FrameKind::InlinedAdaptor.starts_isolated());
    }

    #[test]
    fn test_terminal_states() {
        assert!(FrameState::Completed.is_terminal());
        assert!(FrameState::Failed.is_terminal());
        assert!(!FrameState::Suspended.is_terminal());
        assert_eq!(FrameState::from(ExitState::Suspended), FrameState::Suspended);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&FrameKind::InlinedAdaptor).unwrap(),
            r#""inlined_adaptor""#
        );
        assert_eq!(serde_json::to_string(&FrameState::Running).unwrap(), r#""running""#);
    }

    #[test]
    fn test_frame_ids_are_distinct() {
        assert_ne!(FrameId::new(), FrameId::new());
    }
}
