#![forbid(unsafe_code)]

//! Error type shared by every hub operation.
//!
//! Only caller-contract violations and misuse during teardown are errors.
//! Benign situations (triggering an event nobody listens to, removing a
//! handler twice, an owner hook firing after its target is gone) succeed
//! silently and are logged at `trace`.

use crate::events::ObjectId;

/// Errors from registration and dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// An event name was empty.
    #[error("event name must not be empty")]
    EmptyEventName,
    /// An attribute path was empty.
    #[error("attribute path must not be empty")]
    EmptyPath,
    /// A multi-path watch was given no paths at all.
    #[error("at least one attribute path is required")]
    EmptyPathList,
    /// The object is tearing down or already destroyed.
    #[error("object {object} is destroyed or tearing down")]
    Destroyed { object: ObjectId },
    /// Re-entrant triggering nested deeper than the configured limit.
    #[error("trigger depth limit {depth} exceeded while dispatching '{event}'")]
    DepthExceeded { event: String, depth: usize },
}

/// Result alias for hub operations.
pub type Result<T> = std::result::Result<T, EventError>;
