//! # Dispatch Errors
//!
//! This module defines the error type shared by every layer of the dispatcher:
//! registration, routing, caching, invocation and transport. Every per-request
//! failure travels through the normal `Result` channel, never across a task
//! boundary as a panic.
//!
//! The enum is `Clone` so one outcome can be handed to every waiter of a
//! single-flight cache entry, and `Serialize`/`Deserialize` so a listener can send
//! it back to a remote client unchanged.

use serde::{Deserialize, Serialize};

/// Errors produced while registering, resolving or running actions.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DispatchError {
    /// An identical pattern (same keys and values) is already registered.
    #[error("Pattern already registered: {0}")]
    DuplicatePattern(String),
    #[error("Method already defined: {0}")]
    DuplicateMethod(String),
    #[error("Unknown method: {0}")]
    UnknownMethod(String),
    /// No registered pattern is satisfied by the message.
    #[error("No action matches message: {0}")]
    NoMatch(String),
    /// The action ran but the thing it looked up does not exist.
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The message cannot be turned into a default cache key.
    #[error("Message cannot be cached: {0}")]
    Uncacheable(String),
    #[error("Generation timed out after {0}ms")]
    GenerationTimeout(u64),
    /// Connection level failure talking to a remote listener.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The action itself reported a failure, or panicked.
    #[error("Action failed: {0}")]
    Handler(String),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error("Codec error: {0}")]
    Codec(String),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, DispatchError>;

impl DispatchError {
    /// Shorthand for an action-level failure.
    pub fn handler(message: impl Into<String>) -> Self {
        DispatchError::Handler(message.into())
    }

    /// Shorthand for a lookup miss inside an action.
    pub fn not_found(message: impl Into<String>) -> Self {
        DispatchError::NotFound(message.into())
    }

    /// Status code a request/response boundary should reply with.
    ///
    /// The dispatcher never speaks HTTP itself; this is the mapping a gateway uses.
    pub fn status_code(&self) -> u16 {
        match self {
            DispatchError::NoMatch(_)
            | DispatchError::NotFound(_)
            | DispatchError::UnknownMethod(_) => 404,
            DispatchError::Uncacheable(_) | DispatchError::InvalidPattern(_) => 400,
            DispatchError::Transport(_) => 502,
            DispatchError::GenerationTimeout(_) => 504,
            DispatchError::DuplicatePattern(_)
            | DispatchError::DuplicateMethod(_)
            | DispatchError::Handler(_)
            | DispatchError::InvalidOptions(_)
            | DispatchError::Codec(_) => 500,
        }
    }

    /// Whether the error came from the connection rather than the action.
    pub fn is_transport(&self) -> bool {
        matches!(self, DispatchError::Transport(_))
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(e: serde_json::Error) -> Self {
        DispatchError::Codec(e.to_string())
    }
}
