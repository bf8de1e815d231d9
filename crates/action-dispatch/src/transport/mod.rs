//! # Transport Boundary
//!
//! [`ActionTransport`] is the one operation every way of reaching an action
//! exposes: hand over a message, get back a result or a [`DispatchError`]. The
//! in-process [`Dispatcher`](crate::Dispatcher), the network [`RemoteClient`] and
//! the test [`MockTransport`](crate::mock::MockTransport) all implement it, so
//! calling code does not know (or care) where an action actually runs.
//!
//! ```text
//!  caller ──▶ RemoteClient ══ TCP frames ══▶ ActionListener ──▶ Dispatcher
//! ```
//!
//! The wire format lives in [`codec`].

pub mod client;
pub mod codec;
pub mod listener;

pub use client::RemoteClient;
pub use codec::Frame;
pub use listener::ActionListener;

use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Sends a message to wherever its action lives and returns the outcome.
#[async_trait]
pub trait ActionTransport: Send + Sync {
    async fn act(&self, message: Message) -> Result<Value>;
}

#[async_trait]
impl<T: ActionTransport + ?Sized> ActionTransport for Arc<T> {
    async fn act(&self, message: Message) -> Result<Value> {
        (**self).act(message).await
    }
}

/// Lifecycle of a [`RemoteClient`] connection.
///
/// ```text
/// Disconnected → Connecting → Connected ⇄ (Sending → AwaitingReply)
///       ▲             │                         │
///       └─────────────┴──────── failure ────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Sending,
    AwaitingReply,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Sending => "sending",
            ConnectionState::AwaitingReply => "awaiting_reply",
        };
        f.write_str(name)
    }
}
