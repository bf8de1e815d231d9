//! # Action Invoker
//!
//! Runs a resolved handler and normalizes its outcome. Whatever the handler does
//! (return an error, panic, reply twice) the caller observes exactly one
//! `Result<Value, DispatchError>`.

use crate::error::{DispatchError, Result};
use crate::handler::{ActionContext, SharedHandler};
use crate::message::Message;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Write-once reply slot handed to completion-style handlers.
///
/// Cloning shares the slot. The first [`Completion::complete`] delivers the result;
/// later calls are dropped with a warning and return `false`.
#[derive(Clone)]
pub struct Completion {
    slot: Arc<Mutex<Option<oneshot::Sender<Result<Value>>>>>,
    pattern: Arc<str>,
}

impl Completion {
    pub(crate) fn new(pattern: String) -> (Self, oneshot::Receiver<Result<Value>>) {
        let (sender, receiver) = oneshot::channel();
        let completion = Self {
            slot: Arc::new(Mutex::new(Some(sender))),
            pattern: pattern.into(),
        };
        (completion, receiver)
    }

    /// Delivers the outcome. Returns `false` if a reply was already sent.
    pub fn complete(&self, result: Result<Value>) -> bool {
        let sender = match self.slot.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(sender) => {
                // The caller may have gone away; that is not the handler's problem.
                let _ = sender.send(result);
                true
            }
            None => {
                warn!(pattern = %self.pattern, "Duplicate completion dropped");
                false
            }
        }
    }

    pub fn ok(&self, value: Value) -> bool {
        self.complete(Ok(value))
    }

    pub fn err(&self, error: DispatchError) -> bool {
        self.complete(Err(error))
    }

    pub fn is_completed(&self) -> bool {
        match self.slot.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

/// Runs `handler` once and returns its single terminal outcome.
///
/// A panic inside the handler is caught and reported as
/// [`DispatchError::Handler`], the same channel as an explicit error result.
pub async fn invoke(handler: SharedHandler, message: Message, ctx: ActionContext) -> Result<Value> {
    let pattern = ctx.pattern.to_string();
    debug!(%pattern, %message, "Invoke");

    let outcome = AssertUnwindSafe(handler.handle(message, ctx))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(value)) => {
            debug!(%pattern, "Action ok");
            Ok(value)
        }
        Ok(Err(e)) => {
            warn!(%pattern, error = %e, "Action failed");
            Err(e)
        }
        Err(panic) => {
            let reason = panic_reason(panic.as_ref());
            warn!(%pattern, %reason, "Action panicked");
            Err(DispatchError::Handler(format!("action panicked: {reason}")))
        }
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::handler::{callback_fn, handler_fn};
    use serde_json::json;

    #[tokio::test]
    async fn test_double_completion_keeps_first() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .add(
                "generate:id",
                callback_fn(|_msg, _ctx, done| {
                    assert!(done.ok(json!({"id": 1})));
                    assert!(!done.ok(json!({"id": 2})));
                }),
            )
            .unwrap();

        let result = dispatcher.act("generate:id").await.unwrap();
        assert_eq!(result, json!({"id": 1}));
    }

    #[tokio::test]
    async fn test_completion_from_spawned_task() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .add(
                "generate:id",
                callback_fn(|_msg, _ctx, done| {
                    tokio::spawn(async move {
                        done.ok(json!({"id": 7}));
                    });
                }),
            )
            .unwrap();

        assert_eq!(dispatcher.act("generate:id").await.unwrap(), json!({"id": 7}));
    }

    #[tokio::test]
    async fn test_dropped_completion_is_an_error() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .add("generate:id", callback_fn(|_msg, _ctx, _done| {}))
            .unwrap();

        let err = dispatcher.act("generate:id").await.unwrap_err();
        assert!(matches!(err, DispatchError::Handler(_)));
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .add(
                "explode:now",
                handler_fn(|_msg, _ctx| async move {
                    if true {
                        panic!("kaboom");
                    }
                    Ok(json!(null))
                }),
            )
            .unwrap();

        let err = dispatcher.act("explode:now").await.unwrap_err();
        assert_eq!(err, DispatchError::Handler("action panicked: kaboom".into()));

        // The dispatcher keeps working afterwards.
        assert!(dispatcher.act("explode:now").await.is_err());
    }

    #[tokio::test]
    async fn test_callback_panic_is_caught() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .add("explode:sync", callback_fn(|_msg, _ctx, _done| panic!("sync")))
            .unwrap();

        let err = dispatcher.act("explode:sync").await.unwrap_err();
        assert!(matches!(err, DispatchError::Handler(_)));
    }
}
