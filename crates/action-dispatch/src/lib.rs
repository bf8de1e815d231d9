//! # Action Dispatch
//!
//! A pattern-routed action dispatcher. Producers submit **messages** (JSON objects);
//! the dispatcher finds the registered **action** whose **pattern** the message
//! satisfies, runs it, and hands back exactly one result or error. The same call
//! works whether the action lives in-process or behind a TCP listener, and actions
//! may memoize their results in a shared response cache.
//!
//! ## Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────── Dispatcher ─────────────────────────┐
//!  message ──────▶│ PatternRegistry ──▶ (cached?) ResponseCache ──▶ invoke()    │──▶ Result<Value>
//!                 └─────────────────────────────────────────────────────────────┘
//!                                 ▲
//!  RemoteClient ══ TCP frames ══▶ ActionListener
//! ```
//!
//! 1. **Routing** ([`PatternRegistry`]) - most specific matching pattern wins, ties go to the first registration
//! 2. **Invocation** ([`invoke`](invoker::invoke)) - one terminal outcome per call, panics become errors
//! 3. **Caching** ([`ResponseCache`]) - single-flight, expiring, errors never stored
//! 4. **Transport** ([`ActionTransport`]) - local dispatcher, remote client and mock share one interface
//!
//! ## Quick Start
//!
//! ```rust
//! use action_dispatch::{handler_fn, ActionOptions, CachePolicy, DispatchError, Dispatcher};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let dispatcher = Dispatcher::new();
//!
//!     dispatcher
//!         .add(
//!             "role:users,cmd:get",
//!             handler_fn(|msg, _ctx| async move {
//!                 match msg.get_i64("id") {
//!                     Some(1) => Ok(json!({"id": 1, "name": "alice"})),
//!                     _ => Err(DispatchError::not_found("user")),
//!                 }
//!             }),
//!         )
//!         .unwrap();
//!
//!     let policy = CachePolicy::new(Duration::from_secs(1), Duration::from_secs(3));
//!     dispatcher
//!         .add_with(
//!             "generate:id",
//!             handler_fn(|_msg, _ctx| async { Ok(json!({"id": 1})) }),
//!             ActionOptions::cached(policy),
//!         )
//!         .unwrap();
//!
//!     let user = dispatcher.act("role:users,cmd:get,id:1").await.unwrap();
//!     assert_eq!(user["name"], "alice");
//!
//!     let missing = dispatcher.act("role:users,cmd:get,id:5").await.unwrap_err();
//!     assert_eq!(missing.status_code(), 404);
//! }
//! ```
//!
//! ## Remote Actions
//!
//! An [`ActionListener`] serves a dispatcher over TCP; a [`RemoteClient`] sends it
//! messages. Application errors cross the wire as the same [`DispatchError`]
//! variant; connection problems surface as [`DispatchError::Transport`].
//!
//! ```rust
//! use action_dispatch::{handler_fn, ActionListener, ClientConfig, Dispatcher, ListenerConfig, RemoteClient};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let dispatcher = Dispatcher::new();
//! dispatcher
//!     .add("generate:id", handler_fn(|_msg, _ctx| async { Ok(json!({"id": 1})) }))
//!     .unwrap();
//!
//! let listener = ActionListener::bind(&ListenerConfig::new("127.0.0.1", 0), dispatcher)
//!     .await
//!     .unwrap();
//! let client = RemoteClient::new(ClientConfig::new("127.0.0.1", listener.local_addr().port()));
//!
//! assert_eq!(client.act("generate:id").await.unwrap(), json!({"id": 1}));
//! listener.shutdown().await;
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! - The dispatcher is a cheap `Clone` handle; any task may call `act` concurrently
//! - Registry and cache locks are never held across an `.await`
//! - Cached computations run in their own task, so they finish even if the caller is dropped
//! - Each listener connection is served by its own task
//!
//! ## Testing
//!
//! [`MockTransport`](mock::MockTransport) scripts replies for code that takes an
//! [`ActionTransport`]. See the [`mock`] module for the available patterns.

pub mod cache;
pub mod compose;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod invoker;
pub mod message;
pub mod method;
pub mod mock;
pub mod pattern;
pub mod plugin;
pub mod registry;
pub mod tracing;
pub mod transport;

// Re-export core types for convenience
pub use cache::{CacheKey, CachePolicy, CacheStats, ResponseCache, UncacheablePolicy};
pub use compose::{render_act_message, render_act_template, resolve_context};
pub use config::{CacheConfig, ClientConfig, DispatcherConfig, ListenerConfig};
pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use handler::{callback_fn, handler_fn, ActionContext, ActionHandler, SharedHandler};
pub use invoker::Completion;
pub use message::{IntoMessage, Message, RequestMeta, REQUEST_KEY};
pub use method::MethodOptions;
pub use pattern::{Pattern, PatternId};
pub use plugin::Plugin;
pub use registry::{ActionOptions, PatternRegistry};
pub use transport::{ActionListener, ActionTransport, ConnectionState, RemoteClient};
