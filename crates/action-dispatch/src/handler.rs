//! # Action Handlers
//!
//! The [`ActionHandler`] trait is the contract every action implements: take a
//! message and its context, produce a JSON result or a [`DispatchError`].
//!
//! Most actions are plain async closures wrapped with [`handler_fn`]. Actions
//! written in completion style (they receive a responder and call it once, possibly
//! from another task) are wrapped with [`callback_fn`]; the responder is a
//! write-once [`Completion`] so a second reply is dropped instead of sent.

use crate::dispatcher::Dispatcher;
use crate::error::{DispatchError, Result};
use crate::invoker::Completion;
use crate::message::{IntoMessage, Message};
use crate::pattern::{Pattern, PatternId};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Trait implemented by every registered action.
///
/// Handlers are owned by the registry and may run many times concurrently, so they
/// take `&self` and must be `Send + Sync`.
#[async_trait]
pub trait ActionHandler: Send + Sync + 'static {
    async fn handle(&self, message: Message, ctx: ActionContext) -> Result<Value>;
}

/// Shared handle to a registered handler.
pub type SharedHandler = Arc<dyn ActionHandler>;

/// Per-invocation context injected into a handler.
///
/// Carries the pattern that matched and a handle to the owning [`Dispatcher`] so an
/// action can call other actions.
#[derive(Clone)]
pub struct ActionContext {
    pub pattern_id: PatternId,
    pub pattern: Arc<Pattern>,
    dispatcher: Dispatcher,
}

impl ActionContext {
    pub(crate) fn new(pattern_id: PatternId, pattern: Arc<Pattern>, dispatcher: Dispatcher) -> Self {
        Self {
            pattern_id,
            pattern,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Acts on another pattern through the same dispatcher.
    pub async fn act(&self, message: impl IntoMessage) -> Result<Value> {
        self.dispatcher.act(message.into_message()?).await
    }
}

/// Handler backed by an async closure. See [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
}

/// Wraps an async closure as an [`ActionHandler`].
///
/// ```rust
/// use action_dispatch::{handler_fn, Dispatcher};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() {
/// let dispatcher = Dispatcher::new();
/// dispatcher
///     .add("generate:id", handler_fn(|_msg, _ctx| async { Ok(json!({"id": 1})) }))
///     .unwrap();
/// let result = dispatcher.act("generate:id").await.unwrap();
/// assert_eq!(result, json!({"id": 1}));
/// # }
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Message, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(Message, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn handle(&self, message: Message, ctx: ActionContext) -> Result<Value> {
        (self.f)(message, ctx).await
    }
}

/// Handler that replies through a [`Completion`]. See [`callback_fn`].
pub struct CallbackHandler<F> {
    f: F,
}

/// Wraps a completion-style closure as an [`ActionHandler`].
///
/// The closure may complete synchronously or hand the [`Completion`] to a spawned
/// task. Only the first completion counts. Dropping every copy of the completion
/// without replying fails the invocation.
pub fn callback_fn<F>(f: F) -> CallbackHandler<F>
where
    F: Fn(Message, ActionContext, Completion) + Send + Sync + 'static,
{
    CallbackHandler { f }
}

#[async_trait]
impl<F> ActionHandler for CallbackHandler<F>
where
    F: Fn(Message, ActionContext, Completion) + Send + Sync + 'static,
{
    async fn handle(&self, message: Message, ctx: ActionContext) -> Result<Value> {
        let (completion, reply) = Completion::new(ctx.pattern.to_string());
        (self.f)(message, ctx, completion);
        reply
            .await
            .map_err(|_| DispatchError::handler("action completed without a reply"))?
    }
}
