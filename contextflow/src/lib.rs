//! # Contextflow
//!
//! Context propagation that follows the logical flow of execution across
//! threads, generators, coroutines and async tasks.
//!
//! Contextflow provides:
//!
//! - **Persistent contexts**: immutable key/value versions backed by a
//!   hash array mapped trie, cheap to capture and share between threads
//! - **Per-thread slots**: the single mutable "current context" reference of
//!   each worker, reachable without locking
//! - **Frames**: isolation and delegation rules for suspended computations
//! - **Context managers**: scoped overrides whose writes reach the caller
//! - **Tokio integration**: tasks that capture the spawner's context and keep
//!   their writes to themselves
//!
//! ## Quick Start
//!
//! ```rust
//! use contextflow::prelude::*;
//! use serde_json::json;
//!
//! let slot = ContextSlot::new();
//! slot.set_item("request_id", json!("r-42"))?;
//!
//! // A generator captures the context it was created in.
//! let mut generator = Frame::producer(
//!     Script::new()
//!         .run(|slot| slot.set_item("request_id", json!("inner")).map_err(Into::into))
//!         .yield_with(|slot| Ok(slot.get_item("request_id", json!(null)))),
//!     &slot,
//! );
//!
//! assert_eq!(generator.step(&slot)?, FrameStep::Yielded(json!("inner")));
//! // Its writes stay in its own branch.
//! assert_eq!(slot.get_item("request_id", json!(null)), json!("r-42"));
//! # Ok::<(), ContextError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod adaptor;
pub mod config;
pub mod context;
pub mod errors;
pub mod frame;
pub mod map;
pub mod observability;
pub mod runtime;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adaptor::{override_item, ContextManager, OverrideGuard, ScopedOverride};
    pub use crate::config::{ContextConfig, FrameEventMode, LogFormat, LoggingConfig};
    pub use crate::context::{ambient, Context, ContextKey, ContextSlot, ContextValue};
    pub use crate::errors::{ContextError, ContextResult};
    pub use crate::frame::{
        Coroutine, CoroutineStep, ExitState, Frame, FrameEventSink, FrameId, FrameKind,
        FrameState, FrameStep, Script,
    };
    pub use crate::map::{Binding, PersistentMap};
    pub use crate::runtime::{scope, spawn_task, spawn_task_with, TaskFuture};
}
