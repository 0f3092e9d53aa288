//! Error types for the contextflow crate.
//!
//! Key absence is never an error: lookups fall back to a caller-supplied
//! default. Everything here is either a misuse of the frame protocol reported
//! to the driving scheduler, a rejected key, or a failure of the wrapped
//! computation surfaced after the active context has been restored.

use crate::frame::{FrameId, FrameKind, FrameState};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type ContextResult<T> = Result<T, ContextError>;

/// The main error type for contextflow operations.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A key name was rejected when it was used for a write.
    #[error("Invalid context key '{name}': {reason}")]
    InvalidKey {
        /// The offending key name.
        name: String,
        /// Why the key was rejected.
        reason: String,
    },

    /// `enter` was called on a frame that is already running.
    #[error("Reentrant entry into running frame {frame_id}")]
    ReentrantFrameEntry {
        /// The frame that was entered twice.
        frame_id: FrameId,
    },

    /// A frame in a terminal state was driven again.
    #[error("Frame {frame_id} already finished in state {state}")]
    FrameFinished {
        /// The finished frame.
        frame_id: FrameId,
        /// The terminal state it finished in.
        state: FrameState,
    },

    /// `exit` was called on a frame that was never entered.
    #[error("Frame {frame_id} is not running (state {state})")]
    FrameNotRunning {
        /// The frame.
        frame_id: FrameId,
        /// The state it was found in.
        state: FrameState,
    },

    /// Delegation was requested after the frame had already been entered.
    #[error("Frame {frame_id} cannot begin delegation after its first entry")]
    DelegationAfterEnter {
        /// The frame.
        frame_id: FrameId,
    },

    /// Delegation was requested twice for the same frame.
    #[error("Frame {frame_id} already began delegation")]
    DelegationAlreadyBegun {
        /// The frame.
        frame_id: FrameId,
    },

    /// A top-level task frame was asked to become a delegated frame.
    #[error("Frame {frame_id} of kind {kind} is a task and cannot be delegated into")]
    TaskDelegation {
        /// The frame.
        frame_id: FrameId,
        /// Its kind.
        kind: FrameKind,
    },

    /// Entering a frame would exceed the slot's configured nesting limit.
    #[error("Frame nesting depth limit of {limit} exceeded")]
    FrameDepthExceeded {
        /// The configured limit.
        limit: usize,
    },

    /// The computation wrapped by a frame failed.
    #[error("Frame {frame_id} failed: {source}")]
    FrameFailed {
        /// The failed frame.
        frame_id: FrameId,
        /// The underlying failure.
        #[source]
        source: anyhow::Error,
    },

    /// A context-manager coroutine did not yield exactly once.
    #[error("Context manager frame {frame_id} {problem}")]
    AdaptorProtocol {
        /// The adaptor frame.
        frame_id: FrameId,
        /// What went wrong.
        problem: &'static str,
    },

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ContextError {
    /// Creates an invalid key error.
    #[must_use]
    pub fn invalid_key(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a frame failure error.
    #[must_use]
    pub fn frame_failed(frame_id: FrameId, source: anyhow::Error) -> Self {
        Self::FrameFailed { frame_id, source }
    }

    /// Returns true for errors that indicate a broken scheduler protocol
    /// rather than a failure of user code.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::ReentrantFrameEntry { .. }
                | Self::FrameFinished { .. }
                | Self::FrameNotRunning { .. }
                | Self::DelegationAfterEnter { .. }
                | Self::DelegationAlreadyBegun { .. }
                | Self::TaskDelegation { .. }
                | Self::AdaptorProtocol { .. }
        )
    }

    /// Returns the frame this error is about, if any.
    #[must_use]
    pub const fn frame_id(&self) -> Option<FrameId> {
        match self {
            Self::ReentrantFrameEntry { frame_id }
            | Self::FrameFinished { frame_id, .. }
            | Self::FrameNotRunning { frame_id, .. }
            | Self::DelegationAfterEnter { frame_id }
            | Self::DelegationAlreadyBegun { frame_id }
            | Self::TaskDelegation { frame_id, .. }
            | Self::AdaptorProtocol { frame_id, .. }
            | Self::FrameFailed { frame_id, .. } => Some(*frame_id),
            Self::InvalidKey { .. } | Self::FrameDepthExceeded { .. } | Self::Config(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_key_message() {
        let err = ContextError::invalid_key("1abc", "must start with a letter or underscore");
        assert!(err.to_string().contains("'1abc'"));
        assert!(!err.is_protocol_violation());
        assert!(err.frame_id().is_none());
    }

    #[test]
    fn test_reentrant_is_protocol_violation() {
        let frame_id = FrameId::new();
        let err = ContextError::ReentrantFrameEntry { frame_id };

        assert!(err.is_protocol_violation());
        assert_eq!(err.frame_id(), Some(frame_id));
    }

    #[test]
    fn test_frame_failed_keeps_source() {
        let frame_id = FrameId::new();
        let err = ContextError::frame_failed(frame_id, anyhow::anyhow!("boom"));

        assert!(err.to_string().contains("boom"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_protocol_violation());
    }

    #[test]
    fn test_task_delegation_message_names_kind() {
        let err = ContextError::TaskDelegation {
            frame_id: FrameId::new(),
            kind: FrameKind::Task,
        };
        assert!(err.to_string().contains("task"));
    }
}
