//! # Gateway
//!
//! The boundary between inbound requests and the dispatcher. A request arrives as
//! a [`RequestMeta`] (already parsed by whatever server sits in front); the
//! gateway builds a message from an act template, attaches the request under
//! `req$`, sends it through its transport and maps the single outcome onto a
//! status-coded [`Reply`]:
//!
//! ```text
//! RequestMeta ──template──▶ Message + req$ ──transport──▶ Result<Value> ──▶ Reply { status, body }
//! ```
//!
//! | Outcome | Status |
//! |---------|--------|
//! | `Ok(value)` | 200 |
//! | `NoMatch`, `NotFound`, `UnknownMethod` | 404 |
//! | `Uncacheable`, `InvalidPattern` | 400 |
//! | `Transport` | 502 |
//! | `GenerationTimeout` | 504 |
//! | anything else | 500 |

use action_dispatch::{
    render_act_message, resolve_context, ActionTransport, DispatchError, RequestMeta,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Status-coded reply handed back to the front server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    pub fn from_outcome(outcome: Result<Value, DispatchError>) -> Self {
        match outcome {
            Ok(body) => Self { status: 200, body },
            Err(e) => Self {
                status: e.status_code(),
                body: json!({ "error": e, "message": e.to_string() }),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Clone)]
pub struct Gateway {
    transport: Arc<dyn ActionTransport>,
}

impl Gateway {
    pub fn new(transport: Arc<dyn ActionTransport>) -> Self {
        Self { transport }
    }

    /// Renders `template` against `request`, acts on it and maps the outcome.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn act(&self, template: &str, request: &RequestMeta) -> Reply {
        let reply = Reply::from_outcome(self.dispatch(template, request).await);
        if reply.is_success() {
            info!(status = reply.status, "Replied");
        } else {
            warn!(status = reply.status, body = %reply.body, "Replied with error");
        }
        reply
    }

    /// Resolves a `$resolve` context, e.g. the data behind a rendered view.
    pub async fn view(&self, context: Value) -> Reply {
        Reply::from_outcome(resolve_context(&*self.transport, context).await)
    }

    async fn dispatch(&self, template: &str, request: &RequestMeta) -> Result<Value, DispatchError> {
        let message = render_act_message(template, request)?.with_request(request)?;
        self.transport.act(message).await
    }
}
