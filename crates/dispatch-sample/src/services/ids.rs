use action_dispatch::{
    handler_fn, ActionOptions, CacheConfig, CachePolicy, DispatchError, Dispatcher, Plugin,
};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const GENERATE_ID: &str = "generate:id";

/// Hands out increasing ids, optionally memoized per message.
#[derive(Clone, Default)]
pub struct IdGenerator {
    next: Arc<AtomicU64>,
    cache: Option<CacheConfig>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(config: CacheConfig) -> Self {
        Self {
            cache: Some(config),
            ..Self::default()
        }
    }

    /// How many ids have been handed out.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl Plugin for IdGenerator {
    fn name(&self) -> &str {
        "ids"
    }

    fn register(&self, dispatcher: &Dispatcher) -> Result<(), DispatchError> {
        let next = self.next.clone();
        let options = match &self.cache {
            Some(config) => ActionOptions::cached(CachePolicy::from(config)),
            None => ActionOptions::default(),
        };
        dispatcher.add_with(
            GENERATE_ID,
            handler_fn(move |_msg, _ctx| {
                let id = next.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok(json!({ "id": id })) }
            }),
            options,
        )?;
        Ok(())
    }
}
