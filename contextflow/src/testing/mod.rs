//! Testing utilities for code built on contextflow.
//!
//! This module provides:
//! - A round-robin frame driver that simulates one or more workers
//! - Assertions on context handles and frames

mod assertions;
mod driver;

pub use assertions::{
    assert_context_lacks, assert_context_value, assert_frame_state, assert_same_version,
};
pub use driver::{RoundRobin, StepOutcome, TraceEntry};
