//! Observability utilities.
//!
//! Frame lifecycle events are defined next to frames, in
//! [`crate::frame::FrameEventSink`]; this module installs the `tracing`
//! subscriber they are logged through.

mod logging;

pub use logging::{build_env_filter, init_logging};
