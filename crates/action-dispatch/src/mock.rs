//! # Mock Transport & Testing Guide
//!
//! [`MockTransport`] implements [`ActionTransport`] entirely in memory. Code that
//! takes a transport (a gateway, a context resolver, a proxy action) can be tested
//! against scripted replies without registering real actions or opening sockets.
//!
//! ## When to use Mocks vs a real Dispatcher
//!
//! | Feature | MockTransport | Dispatcher | RemoteClient + ActionListener |
//! |---------|---------------|------------|-------------------------------|
//! | **Speed** | Instant | Instant | Loopback TCP |
//! | **Determinism** | Scripted | Real handlers | Subject to scheduler |
//! | **Use Case** | Logic *around* a transport | The actions themselves | Wire behavior, full system |
//! | **Error Injection** | Easy (`return_err`) | Needs a failing handler | Needs a dead port |
//!
//! ## Testing Strategies
//!
//! <details>
//! <summary><b>Pattern 0: Caller Logic Test (Pure Mock)</b></summary>
//!
//! ```rust
//! use action_dispatch::mock::MockTransport;
//! use action_dispatch::{ActionTransport, Message};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mock = MockTransport::new();
//! mock.expect_act("role:users,cmd:get").return_ok(json!({"id": 1, "name": "alice"}));
//!
//! let user = mock
//!     .act(Message::parse("role:users,cmd:get,id:1").unwrap())
//!     .await
//!     .unwrap();
//! assert_eq!(user["name"], "alice");
//! mock.verify();
//! # }
//! ```
//! </details>
//!
//! <details>
//! <summary><b>Pattern 1: Single Dispatcher Test</b></summary>
//!
//! Register the actions under test on a fresh [`Dispatcher`](crate::Dispatcher) and
//! call `act` directly. Each test owns its dispatcher, so there is no shared state
//! between tests.
//! </details>
//!
//! <details>
//! <summary><b>Pattern 2: Full System Test</b></summary>
//!
//! Bind an [`ActionListener`](crate::ActionListener) on port 0 and talk to it through
//! a [`RemoteClient`](crate::RemoteClient). See `tests/integration_test.rs`.
//! </details>
//!
//! ## Testing Failure Scenarios
//!
//! ```rust
//! use action_dispatch::mock::MockTransport;
//! use action_dispatch::{ActionTransport, DispatchError, Message};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mock = MockTransport::new();
//! mock.expect_act("role:users")
//!     .return_err(DispatchError::Transport("connection refused".into()));
//!
//! let result = mock.act(Message::parse("role:users,cmd:get").unwrap()).await;
//! assert!(matches!(result, Err(DispatchError::Transport(_))));
//! # }
//! ```

use crate::error::{DispatchError, Result};
use crate::message::{IntoMessage, Message};
use crate::pattern::Pattern;
use crate::transport::ActionTransport;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// An expected call and its scripted reply.
struct Expectation {
    pattern: Pattern,
    response: Result<Value>,
}

/// A transport that answers from a queue of expectations.
///
/// Expectations are consumed in FIFO order. A call whose message does not satisfy
/// the next expected pattern (or arrives when none is left) gets
/// [`DispatchError::NoMatch`]. Clones share the same queue.
#[derive(Clone, Default)]
pub struct MockTransport {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    received: Arc<Mutex<Vec<Message>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects a call matching `pattern`.
    ///
    /// # Panics
    ///
    /// If `pattern` does not parse.
    pub fn expect_act(&self, pattern: impl IntoMessage) -> ActExpectationBuilder {
        let pattern = match Pattern::parse(pattern) {
            Ok(pattern) => pattern,
            Err(e) => panic!("invalid expectation pattern: {e}"),
        };
        ActExpectationBuilder {
            pattern,
            expectations: self.expectations.clone(),
        }
    }

    /// Messages received so far, in order.
    pub fn received(&self) -> Vec<Message> {
        lock(&self.received).clone()
    }

    /// Verifies that all expectations were met.
    ///
    /// # Panics
    ///
    /// If any expectation is still queued.
    pub fn verify(&self) {
        let exps = lock(&self.expectations);
        if !exps.is_empty() {
            let left: Vec<String> = exps.iter().map(|e| e.pattern.to_string()).collect();
            panic!(
                "Not all expectations were met. {} remaining: {}",
                exps.len(),
                left.join(" | ")
            );
        }
    }
}

#[async_trait]
impl ActionTransport for MockTransport {
    async fn act(&self, message: Message) -> Result<Value> {
        lock(&self.received).push(message.clone());

        let mut exps = lock(&self.expectations);
        let matches = exps
            .front()
            .is_some_and(|expected| expected.pattern.matches(&message));
        if !matches {
            debug!(%message, "Mock has no matching expectation");
            return Err(DispatchError::NoMatch(message.to_string()));
        }
        match exps.pop_front() {
            Some(expectation) => expectation.response,
            None => Err(DispatchError::NoMatch(message.to_string())),
        }
    }
}

/// Builder for `act` expectations.
pub struct ActExpectationBuilder {
    pattern: Pattern,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
}

impl ActExpectationBuilder {
    /// Sets the expectation to return a successful result.
    pub fn return_ok(self, value: Value) {
        lock(&self.expectations).push_back(Expectation {
            pattern: self.pattern,
            response: Ok(value),
        });
    }

    /// Sets the expectation to return an error.
    pub fn return_err(self, error: DispatchError) {
        lock(&self.expectations).push_back(Expectation {
            pattern: self.pattern,
            response: Err(error),
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
