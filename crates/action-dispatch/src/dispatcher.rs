//! # Dispatcher
//!
//! The [`Dispatcher`] ties the pieces together: it owns a [`PatternRegistry`], a
//! [`ResponseCache`] and the table of named methods, and runs the local pipeline
//!
//! ```text
//! message ──resolve──▶ action ──(cached?)──▶ cache ──miss──▶ invoke ──▶ result
//! ```
//!
//! A dispatcher is an explicit value. Clone it to share it: clones are cheap
//! handles onto the same registry and cache. Handlers receive a clone through
//! their [`ActionContext`] so they can act on other patterns.

use crate::cache::{CachePolicy, ResponseCache};
use crate::config::DispatcherConfig;
use crate::error::Result;
use crate::handler::{ActionContext, ActionHandler, SharedHandler};
use crate::invoker::invoke;
use crate::message::{IntoMessage, Message};
use crate::method::MethodDef;
use crate::pattern::{Pattern, PatternId};
use crate::plugin::Plugin;
use crate::registry::{ActionOptions, PatternRegistry, Resolved};
use crate::transport::ActionTransport;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub(crate) struct Inner {
    registry: RwLock<PatternRegistry>,
    pub(crate) methods: RwLock<HashMap<String, MethodDef>>,
    cache: ResponseCache,
    config: DispatcherConfig,
}

/// Local action dispatcher. See the [module docs](self).
#[derive(Clone)]
pub struct Dispatcher {
    pub(crate) inner: Arc<Inner>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: RwLock::new(PatternRegistry::new()),
                methods: RwLock::new(HashMap::new()),
                cache: ResponseCache::new(),
                config,
            }),
        }
    }

    /// Registers an uncached action.
    pub fn add(&self, pattern: impl IntoMessage, handler: impl ActionHandler) -> Result<PatternId> {
        self.add_with(pattern, handler, ActionOptions::default())
    }

    /// Registers an action with options (e.g. a cache policy).
    pub fn add_with(
        &self,
        pattern: impl IntoMessage,
        handler: impl ActionHandler,
        options: ActionOptions,
    ) -> Result<PatternId> {
        let pattern = Pattern::parse(pattern)?;
        self.add_shared(pattern, Arc::new(handler), options)
    }

    /// Registers an already shared handler, e.g. one handler under several patterns.
    pub fn add_shared(
        &self,
        pattern: Pattern,
        handler: SharedHandler,
        options: ActionOptions,
    ) -> Result<PatternId> {
        self.write_registry().register(pattern, handler, options)
    }

    /// Loads a plugin's actions. Any registration error aborts the load.
    pub fn use_plugin(&self, plugin: &dyn Plugin) -> Result<()> {
        info!(plugin = plugin.name(), "Loading plugin");
        plugin.register(self)
    }

    /// Resolves and runs the action for `message`, through the cache when the
    /// action was registered with a policy.
    pub async fn act(&self, message: impl IntoMessage) -> Result<Value> {
        let message = message.into_message()?;
        debug!(%message, "Act");
        let resolved = self.resolve(&message)?;
        match resolved.cache.clone() {
            Some(policy) => {
                let scope = format!("action:{}", resolved.pattern);
                self.run_cached(&scope, resolved, message, &policy).await
            }
            None => self.run(resolved, message).await,
        }
    }

    /// Resolves without running. Useful for introspection and tests.
    pub fn resolve(&self, message: &Message) -> Result<Resolved> {
        self.read_registry().resolve(message)
    }

    pub(crate) async fn run(&self, resolved: Resolved, message: Message) -> Result<Value> {
        let ctx = ActionContext::new(resolved.id, resolved.pattern.clone(), self.clone());
        invoke(resolved.handler, message, ctx).await
    }

    pub(crate) async fn run_cached(
        &self,
        scope: &str,
        resolved: Resolved,
        message: Message,
        policy: &CachePolicy,
    ) -> Result<Value> {
        let ctx = ActionContext::new(resolved.id, resolved.pattern.clone(), self.clone());
        let handler = resolved.handler.clone();
        let to_invoke = message.clone();
        self.inner
            .cache
            .get_or_compute(scope, &message, &resolved.pattern, policy, move || {
                invoke(handler, to_invoke, ctx)
            })
            .await
    }

    /// The response cache shared by every cached action and method.
    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    /// Registered patterns, in registration order.
    pub fn patterns(&self) -> Vec<Arc<Pattern>> {
        self.read_registry().patterns()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Starts a task that purges expired cache entries every `interval`.
    ///
    /// The task ends on its own once every handle to this dispatcher has been
    /// dropped.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    debug!("Dispatcher dropped, sweeper exiting");
                    break;
                };
                let purged = inner.cache.purge_expired();
                if purged > 0 {
                    debug!(purged, "Swept expired cache entries");
                }
            }
        })
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, PatternRegistry> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, PatternRegistry> {
        self.inner
            .registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ActionTransport for Dispatcher {
    async fn act(&self, message: Message) -> Result<Value> {
        Dispatcher::act(self, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use crate::handler::handler_fn;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn id_generator(dispatcher: &Dispatcher, options: ActionOptions) -> Arc<AtomicU64> {
        let counter = Arc::new(AtomicU64::new(0));
        let ids = counter.clone();
        dispatcher
            .add_with(
                "generate:id",
                handler_fn(move |msg, _ctx| {
                    let ids = ids.clone();
                    async move {
                        let id = ids.fetch_add(1, Ordering::SeqCst) + 1;
                        Ok(json!({ "id": id, "name": msg.get("name") }))
                    }
                }),
                options,
            )
            .unwrap();
        counter
    }

    #[tokio::test]
    async fn test_uncached_action_runs_every_time() {
        let dispatcher = Dispatcher::new();
        id_generator(&dispatcher, ActionOptions::default());

        assert_eq!(dispatcher.act("generate:id").await.unwrap()["id"], 1);
        assert_eq!(dispatcher.act("generate:id").await.unwrap()["id"], 2);
    }

    #[tokio::test]
    async fn test_cached_action_memoizes_by_additions() {
        let dispatcher = Dispatcher::new();
        let policy = CachePolicy::new(Duration::from_secs(1), Duration::from_secs(3));
        let counter = id_generator(&dispatcher, ActionOptions::cached(policy));

        let first = dispatcher.act(json!({"generate": "id", "name": "steve"})).await.unwrap();
        let second = dispatcher.act("generate:id,name:steve").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first["name"], "steve");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let other = dispatcher.act("generate:id,name:anne").await.unwrap();
        assert_eq!(other["id"], 2);
    }

    #[tokio::test]
    async fn test_cached_action_rejects_nested_additions() {
        let dispatcher = Dispatcher::new();
        let policy = CachePolicy::new(Duration::from_secs(1), Duration::from_secs(3));
        let counter = id_generator(&dispatcher, ActionOptions::cached(policy));

        let err = dispatcher
            .act(json!({"generate": "id", "price": {"a": "b"}}))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Uncacheable(_)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handlers_can_act_through_context() {
        let dispatcher = Dispatcher::new();
        id_generator(&dispatcher, ActionOptions::default());
        dispatcher
            .add(
                "role:users,cmd:create",
                handler_fn(|msg, ctx| async move {
                    let generated = ctx.act("generate:id").await?;
                    Ok(json!({ "id": generated["id"], "name": msg.get("name") }))
                }),
            )
            .unwrap();

        let user = dispatcher
            .act("role:users,cmd:create,name:alice")
            .await
            .unwrap();
        assert_eq!(user, json!({"id": 1, "name": "alice"}));
    }

    #[tokio::test]
    async fn test_invalid_cache_options_rejected_at_registration() {
        let dispatcher = Dispatcher::new();
        let policy = CachePolicy::new(Duration::ZERO, Duration::from_secs(3));
        let err = dispatcher
            .add_with(
                "generate:id",
                handler_fn(|_msg, _ctx| async { Ok(json!(1)) }),
                ActionOptions::cached(policy),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidOptions(_)));
        assert!(dispatcher.patterns().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_and_stops() {
        let dispatcher = Dispatcher::new();
        let policy = CachePolicy::new(Duration::from_millis(50), Duration::from_secs(3));
        id_generator(&dispatcher, ActionOptions::cached(policy));
        dispatcher.act("generate:id").await.unwrap();
        assert_eq!(dispatcher.cache().len(), 1);

        let sweeper = dispatcher.spawn_sweeper(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(dispatcher.cache().is_empty());

        drop(dispatcher);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(sweeper.is_finished());
    }
}
