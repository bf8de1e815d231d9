//! # Named Methods
//!
//! A named method binds a name to a base message. Calling it merges the caller's
//! additions onto the base and acts on the result, optionally through the
//! response cache. The cache scope of a method is `method:<name>`, so two methods
//! over the same action keep separate entries, and none of them share entries
//! with the action's own `action:<pattern>` scope.
//!
//! ```rust
//! use action_dispatch::{handler_fn, CachePolicy, Dispatcher, MethodOptions};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let dispatcher = Dispatcher::new();
//! dispatcher
//!     .add("generate:id", handler_fn(|msg, _ctx| async move { Ok(json!({"for": msg.get("name")})) }))
//!     .unwrap();
//!
//! let policy = CachePolicy::new(Duration::from_secs(1), Duration::from_secs(3));
//! dispatcher
//!     .define_method("id", "generate:id", MethodOptions::cached(policy))
//!     .unwrap();
//!
//! let a = dispatcher.call("id", "name:steve").await.unwrap();
//! let b = dispatcher.call("id", json!({"name": "steve"})).await.unwrap();
//! assert_eq!(a, b);
//! # }
//! ```

use crate::cache::CachePolicy;
use crate::dispatcher::Dispatcher;
use crate::error::{DispatchError, Result};
use crate::message::{IntoMessage, Message};
use serde_json::Value;
use tracing::{debug, info};

/// Options for [`Dispatcher::define_method`].
#[derive(Clone, Default)]
pub struct MethodOptions {
    pub cache: Option<CachePolicy>,
}

impl MethodOptions {
    pub fn cached(policy: CachePolicy) -> Self {
        Self {
            cache: Some(policy),
        }
    }
}

#[derive(Clone)]
pub(crate) struct MethodDef {
    base: Message,
    cache: Option<CachePolicy>,
}

impl Dispatcher {
    /// Binds `name` to a base message.
    pub fn define_method(
        &self,
        name: &str,
        base: impl IntoMessage,
        options: MethodOptions,
    ) -> Result<()> {
        let base = base.into_message()?;
        if let Some(policy) = &options.cache {
            policy.validate()?;
        }

        let mut methods = self
            .inner
            .methods
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if methods.contains_key(name) {
            return Err(DispatchError::DuplicateMethod(name.to_string()));
        }
        info!(method = name, %base, cached = options.cache.is_some(), "Defined method");
        methods.insert(
            name.to_string(),
            MethodDef {
                base,
                cache: options.cache,
            },
        );
        Ok(())
    }

    /// Calls a named method with `additions` merged over its base message.
    pub async fn call(&self, name: &str, additions: impl IntoMessage) -> Result<Value> {
        let additions = additions.into_message()?;
        let def = self
            .inner
            .methods
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownMethod(name.to_string()))?;

        let message = def.base.merged(additions);
        debug!(method = name, %message, "Call");
        match def.cache {
            Some(policy) => {
                let resolved = self.resolve(&message)?;
                let scope = format!("method:{name}");
                self.run_cached(&scope, resolved, message, &policy).await
            }
            None => self.act(message).await,
        }
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.inner
            .methods
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::registry::ActionOptions;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn counting(dispatcher: &Dispatcher) -> Arc<AtomicU64> {
        let calls = Arc::new(AtomicU64::new(0));
        let seen = calls.clone();
        dispatcher
            .add(
                "generate:id",
                handler_fn(move |msg, _ctx| {
                    let seen = seen.clone();
                    async move {
                        let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
                        Ok(json!({ "id": n, "name": msg.get("name") }))
                    }
                }),
            )
            .unwrap();
        calls
    }

    fn policy() -> CachePolicy {
        CachePolicy::new(Duration::from_secs(1), Duration::from_secs(3))
    }

    #[tokio::test]
    async fn test_string_and_object_additions_share_an_entry() {
        let dispatcher = Dispatcher::new();
        let calls = counting(&dispatcher);
        dispatcher
            .define_method("id", "generate:id", MethodOptions::cached(policy()))
            .unwrap();

        let a = dispatcher.call("id", "name:steve").await.unwrap();
        let b = dispatcher.call("id", json!({"name": "steve"})).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_nested_additions_are_uncacheable() {
        let dispatcher = Dispatcher::new();
        let calls = counting(&dispatcher);
        dispatcher
            .define_method("id", "generate:id", MethodOptions::cached(policy()))
            .unwrap();

        let err = dispatcher
            .call("id", json!({"price": {"a": "b"}}))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Uncacheable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_custom_key_collapses_nested_additions() {
        let dispatcher = Dispatcher::new();
        let calls = counting(&dispatcher);
        let keyed = policy().with_key(|msg: &Message| {
            msg.get("price").map(|p| p.to_string()).unwrap_or_default()
        });
        dispatcher
            .define_method("id", "generate:id", MethodOptions::cached(keyed))
            .unwrap();

        let a = dispatcher.call("id", json!({"price": {"a": "b"}})).await.unwrap();
        let b = dispatcher.call("id", json!({"price": {"a": "b"}})).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_methods_are_scoped_by_name() {
        let dispatcher = Dispatcher::new();
        let calls = counting(&dispatcher);
        dispatcher
            .define_method("first", "generate:id", MethodOptions::cached(policy()))
            .unwrap();
        dispatcher
            .define_method("second", "generate:id", MethodOptions::cached(policy()))
            .unwrap();

        dispatcher.call("first", "").await.unwrap();
        dispatcher.call("second", "").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_method_named_like_an_action_keeps_its_own_entries() {
        let dispatcher = Dispatcher::new();
        let calls = Arc::new(AtomicU64::new(0));
        let seen = calls.clone();
        dispatcher
            .add_with(
                "generate:id",
                handler_fn(move |_msg, _ctx| {
                    let seen = seen.clone();
                    async move { Ok(json!(seen.fetch_add(1, Ordering::SeqCst) + 1)) }
                }),
                ActionOptions::cached(policy()),
            )
            .unwrap();
        dispatcher
            .define_method("generate:id", "generate:id", MethodOptions::cached(policy()))
            .unwrap();

        assert_eq!(dispatcher.act("generate:id").await.unwrap(), json!(1));
        assert_eq!(dispatcher.call("generate:id", "").await.unwrap(), json!(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_uncached_method_runs_every_call() {
        let dispatcher = Dispatcher::new();
        let calls = counting(&dispatcher);
        dispatcher
            .define_method("id", "generate:id", MethodOptions::default())
            .unwrap();

        dispatcher.call("id", "name:a").await.unwrap();
        dispatcher.call("id", "name:a").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_definition_errors() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .define_method("id", "generate:id", MethodOptions::default())
            .unwrap();

        let err = dispatcher
            .define_method("id", "generate:id", MethodOptions::default())
            .unwrap_err();
        assert_eq!(err, DispatchError::DuplicateMethod("id".into()));

        let bad = CachePolicy::new(Duration::from_secs(1), Duration::ZERO);
        let err = dispatcher
            .define_method("other", "generate:id", MethodOptions::cached(bad))
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidOptions(_)));
        assert!(!dispatcher.has_method("other"));

        let err = dispatcher.call("missing", "").await.unwrap_err();
        assert_eq!(err, DispatchError::UnknownMethod("missing".into()));
    }
}
