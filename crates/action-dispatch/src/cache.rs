//! # Response Cache
//!
//! Memoizes action results per `(scope, key)` where `scope` names the cached
//! action (its pattern, or a method name) and `key` is derived from the message.
//!
//! ## Entry lifecycle
//!
//! ```text
//!   (absent) --miss--> Pending --ok--> Ready --expires--> (absent / replaced)
//!                         |
//!                         +--error / timeout--> (absent)
//! ```
//!
//! - **Single-flight**: while an entry is `Pending`, every caller for the same
//!   `(scope, key)` waits on one `watch` channel and receives the same outcome. The
//!   computation runs in its own task, so it finishes even if the caller that
//!   started it goes away.
//! - **Expiry**: a `Ready` entry is served until `expires_in` has elapsed since it
//!   was stored; after that the next call recomputes and replaces it.
//! - **Errors are not cached**: waiters get the error, the slot is cleared.
//! - **Generation timeout**: a computation that outlives `generate_timeout` is
//!   abandoned, waiters get [`DispatchError::GenerationTimeout`], and the slot is
//!   cleared so the next call retries.
//!
//! ## Default keys
//!
//! [`default_cache_key`] joins the message's top-level scalar fields as quoted
//! `"key":"value"` pairs in key order, skipping pattern fields and reserved metadata. Any
//! nested object or array makes the message uncacheable; what happens then is
//! governed by [`UncacheablePolicy`].

use crate::config::CacheConfig;
use crate::error::{DispatchError, Result};
use crate::message::{scalar_text, Message};
use crate::pattern::Pattern;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

type Outcome = Result<Value>;
type KeyFn = dyn Fn(&Message) -> String + Send + Sync;

/// How a cache key is derived from a message.
#[derive(Clone, Default)]
pub enum CacheKey {
    /// Scalar fields outside the pattern, see [`default_cache_key`].
    #[default]
    Default,
    /// Caller-supplied function. Its result is trusted as-is, collisions included.
    Custom(Arc<KeyFn>),
}

impl CacheKey {
    pub fn custom(f: impl Fn(&Message) -> String + Send + Sync + 'static) -> Self {
        CacheKey::Custom(Arc::new(f))
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Default => f.write_str("Default"),
            CacheKey::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// What to do when the default key cannot be derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UncacheablePolicy {
    /// Return [`DispatchError::Uncacheable`] to the caller.
    #[default]
    Fail,
    /// Run the action without touching the cache.
    Bypass,
}

/// Caching options attached to an action or method.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub expires_in: Duration,
    pub generate_timeout: Duration,
    pub key: CacheKey,
    pub uncacheable: UncacheablePolicy,
}

impl CachePolicy {
    pub fn new(expires_in: Duration, generate_timeout: Duration) -> Self {
        Self {
            expires_in,
            generate_timeout,
            key: CacheKey::Default,
            uncacheable: UncacheablePolicy::Fail,
        }
    }

    pub fn with_key(mut self, f: impl Fn(&Message) -> String + Send + Sync + 'static) -> Self {
        self.key = CacheKey::custom(f);
        self
    }

    pub fn bypass_uncacheable(mut self) -> Self {
        self.uncacheable = UncacheablePolicy::Bypass;
        self
    }

    /// Rejects policies that could never hold or produce a value.
    pub fn validate(&self) -> Result<()> {
        if self.expires_in.is_zero() {
            return Err(DispatchError::InvalidOptions(
                "cache expires_in must be greater than zero".into(),
            ));
        }
        if self.generate_timeout.is_zero() {
            return Err(DispatchError::InvalidOptions(
                "cache generate_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn derive_key(&self, message: &Message, pattern: &Pattern) -> Result<String> {
        match &self.key {
            CacheKey::Default => default_cache_key(message, pattern),
            CacheKey::Custom(f) => Ok(f(message)),
        }
    }
}

impl From<&CacheConfig> for CachePolicy {
    fn from(config: &CacheConfig) -> Self {
        let policy = CachePolicy::new(
            Duration::from_millis(config.expires_in_ms),
            Duration::from_millis(config.generate_timeout_ms),
        );
        if config.bypass_uncacheable {
            policy.bypass_uncacheable()
        } else {
            policy
        }
    }
}

/// Builds the default cache key for `message` under `pattern`.
///
/// Keys and values are written as JSON strings, so separators inside a value
/// cannot make two different messages render the same key.
pub fn default_cache_key(message: &Message, pattern: &Pattern) -> Result<String> {
    let mut fields = Vec::new();
    for (key, value) in message.fields() {
        if pattern.contains_key(key) {
            continue;
        }
        let text = scalar_text(value).ok_or_else(|| {
            DispatchError::Uncacheable(format!("field '{key}' holds a nested value"))
        })?;
        fields.push((key.as_str(), text));
    }
    fields.sort();

    let parts: Vec<String> = fields
        .into_iter()
        .map(|(key, text)| format!("{}:{}", Value::from(key), Value::from(text)))
        .collect();
    Ok(parts.join(","))
}

enum Slot {
    Ready {
        value: Value,
        expires_at: Instant,
    },
    Pending {
        receiver: watch::Receiver<Option<Outcome>>,
        generation: u64,
    },
}

/// Counters describing how calls were served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Served from a ready entry.
    pub hits: u64,
    /// Started a new computation.
    pub misses: u64,
    /// Joined a computation already in flight.
    pub joined: u64,
}

/// Shared memo table with single-flight and expiry.
#[derive(Default)]
pub struct ResponseCache {
    slots: Arc<Mutex<SlotMap>>,
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    joined: AtomicU64,
}

type SlotKey = (String, String);
type SlotMap = HashMap<SlotKey, Slot>;

enum Lookup {
    Hit(Value),
    Join(watch::Receiver<Option<Outcome>>, u64),
    Reserved(
        watch::Sender<Option<Outcome>>,
        watch::Receiver<Option<Outcome>>,
        u64,
    ),
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the memoized outcome for `message`, computing it at most once per
    /// `(scope, key)` at a time.
    ///
    /// `compute` is only called on a miss. Its future is run on a separate task
    /// under the policy's generation timeout.
    pub async fn get_or_compute<F, Fut>(
        &self,
        scope: &str,
        message: &Message,
        pattern: &Pattern,
        policy: &CachePolicy,
        compute: F,
    ) -> Outcome
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let key = match policy.derive_key(message, pattern) {
            Ok(key) => key,
            Err(e) => match policy.uncacheable {
                UncacheablePolicy::Fail => {
                    warn!(scope, error = %e, "Uncacheable message");
                    return Err(e);
                }
                UncacheablePolicy::Bypass => {
                    debug!(scope, error = %e, "Bypassing cache");
                    let timeout = policy.generate_timeout;
                    return tokio::time::timeout(timeout, compute())
                        .await
                        .unwrap_or_else(|_| {
                            warn!(scope, "Bypassed computation timed out");
                            Err(DispatchError::GenerationTimeout(timeout.as_millis() as u64))
                        });
                }
            },
        };
        let slot_key: SlotKey = (scope.to_string(), key);

        let (receiver, generation) = match self.lookup_or_reserve(&slot_key) {
            Lookup::Hit(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(scope, key = %slot_key.1, "Cache hit");
                return Ok(value);
            }
            Lookup::Join(receiver, generation) => {
                self.joined.fetch_add(1, Ordering::Relaxed);
                debug!(scope, key = %slot_key.1, "Joining in-flight computation");
                (receiver, generation)
            }
            Lookup::Reserved(sender, receiver, generation) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(scope, key = %slot_key.1, "Cache miss");
                self.spawn_computation(slot_key.clone(), generation, policy, sender, compute());
                (receiver, generation)
            }
        };

        self.wait(&slot_key, generation, receiver).await
    }

    /// Serves a live entry, joins a pending one, or reserves the slot for a new
    /// computation. All under one lock acquisition.
    fn lookup_or_reserve(&self, slot_key: &SlotKey) -> Lookup {
        let mut slots = lock(&self.slots);
        match slots.get(slot_key) {
            Some(Slot::Ready { value, expires_at }) if Instant::now() < *expires_at => {
                return Lookup::Hit(value.clone());
            }
            Some(Slot::Pending {
                receiver,
                generation,
            }) => return Lookup::Join(receiver.clone(), *generation),
            _ => {}
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = watch::channel(None);
        slots.insert(
            slot_key.clone(),
            Slot::Pending {
                receiver: receiver.clone(),
                generation,
            },
        );
        Lookup::Reserved(sender, receiver, generation)
    }

    fn spawn_computation<Fut>(
        &self,
        slot_key: SlotKey,
        generation: u64,
        policy: &CachePolicy,
        sender: watch::Sender<Option<Outcome>>,
        future: Fut,
    ) where
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let expires_in = policy.expires_in;
        let generate_timeout = policy.generate_timeout;
        let slots = self.slots.clone();

        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(generate_timeout, future).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(scope = %slot_key.0, key = %slot_key.1, "Generation timed out");
                    Err(DispatchError::GenerationTimeout(
                        generate_timeout.as_millis() as u64,
                    ))
                }
            };

            // Settle the slot before waking waiters so a follow-up call sees it.
            {
                let mut slots = lock(&slots);
                if is_pending(&slots, &slot_key, generation) {
                    match &outcome {
                        Ok(value) => {
                            slots.insert(
                                slot_key.clone(),
                                Slot::Ready {
                                    value: value.clone(),
                                    expires_at: Instant::now() + expires_in,
                                },
                            );
                        }
                        Err(_) => {
                            slots.remove(&slot_key);
                        }
                    }
                }
            }
            let _ = sender.send(Some(outcome));
        });
    }

    async fn wait(
        &self,
        slot_key: &SlotKey,
        generation: u64,
        mut receiver: watch::Receiver<Option<Outcome>>,
    ) -> Outcome {
        loop {
            let current = receiver.borrow_and_update().clone();
            if let Some(outcome) = current {
                return outcome;
            }
            if receiver.changed().await.is_err() {
                // The computing task died without reporting; free the slot.
                let mut slots = lock(&self.slots);
                if is_pending(&slots, slot_key, generation) {
                    slots.remove(slot_key);
                }
                return Err(DispatchError::handler("cached computation was aborted"));
            }
        }
    }

    /// Removes expired ready entries and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = lock(&self.slots);
        let before = slots.len();
        slots.retain(|_, slot| match slot {
            Slot::Ready { expires_at, .. } => now < *expires_at,
            Slot::Pending { .. } => true,
        });
        let purged = before - slots.len();
        if purged > 0 {
            info!(purged, remaining = slots.len(), "Purged expired entries");
        }
        purged
    }

    /// Number of entries, ready or pending.
    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.slots).is_empty()
    }

    /// Drops every entry, ready and pending. In-flight computations keep running
    /// and still deliver to the callers already waiting on them, but their results
    /// are not stored and new callers start a fresh computation.
    pub fn clear(&self) {
        lock(&self.slots).clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
        }
    }
}

fn lock(slots: &Mutex<SlotMap>) -> MutexGuard<'_, SlotMap> {
    // Slot updates never panic midway, so a poisoned map is still consistent.
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn is_pending(slots: &SlotMap, slot_key: &SlotKey, generation: u64) -> bool {
    matches!(
        slots.get(slot_key),
        Some(Slot::Pending { generation: g, .. }) if *g == generation
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn policy(expires_ms: u64) -> CachePolicy {
        CachePolicy::new(Duration::from_millis(expires_ms), Duration::from_millis(3000))
    }

    fn pattern() -> Pattern {
        Pattern::parse("generate:id").unwrap()
    }

    /// Compute closure that bumps `counter` and returns `{id: n}`.
    fn counting(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> futures::future::BoxFuture<'static, Outcome> + Send {
        let counter = counter.clone();
        move || {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let id = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(json!({ "id": id }))
            })
        }
    }

    #[test]
    fn test_default_key_skips_pattern_and_metadata() {
        let msg = Message::parse("generate:id,pre:mr,name:steve")
            .unwrap()
            .with("trace$", "abc");
        assert_eq!(
            default_cache_key(&msg, &pattern()).unwrap(),
            r#""name":"steve","pre":"mr""#
        );
    }

    #[test]
    fn test_default_key_separators_in_values_stay_distinct() {
        let split = Message::from_value(json!({"generate": "id", "a": 1, "b": 2})).unwrap();
        let joined = Message::from_value(json!({"generate": "id", "a": "1,b:2"})).unwrap();
        assert_ne!(
            default_cache_key(&split, &pattern()).unwrap(),
            default_cache_key(&joined, &pattern()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_lookalike_messages_get_their_own_results() {
        let cache = ResponseCache::new();
        let policy = policy(1000);
        let split = Message::from_value(json!({"generate": "id", "a": 1, "b": 2})).unwrap();
        let joined = Message::from_value(json!({"generate": "id", "a": "1,b:2"})).unwrap();

        for msg in [&split, &joined] {
            let echoed = msg.clone().into_value();
            let result = cache
                .get_or_compute("generate", msg, &pattern(), &policy, move || async move {
                    Ok(echoed)
                })
                .await
                .unwrap();
            assert_eq!(result, msg.clone().into_value());
        }
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_default_key_rejects_nested_values() {
        let msg = Message::from_value(json!({"generate": "id", "price": {"a": "b"}})).unwrap();
        let err = default_cache_key(&msg, &pattern()).unwrap_err();
        assert!(matches!(err, DispatchError::Uncacheable(_)));
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        assert!(policy(0).validate().is_err());
        assert!(CachePolicy::new(Duration::from_secs(1), Duration::ZERO)
            .validate()
            .is_err());
        assert!(policy(1000).validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = ResponseCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let msg = Message::parse("generate:id").unwrap();
        let policy = policy(1000);

        let first = cache
            .get_or_compute("generate", &msg, &pattern(), &policy, counting(&counter))
            .await
            .unwrap();
        assert_eq!(first, json!({"id": 1}));

        tokio::time::advance(Duration::from_millis(500)).await;
        let second = cache
            .get_or_compute("generate", &msg, &pattern(), &policy, counting(&counter))
            .await
            .unwrap();
        assert_eq!(second, json!({"id": 1}));

        tokio::time::advance(Duration::from_millis(1000)).await;
        let third = cache
            .get_or_compute("generate", &msg, &pattern(), &policy, counting(&counter))
            .await
            .unwrap();
        assert_eq!(third, json!({"id": 2}));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 2, joined: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_compute_once() {
        let cache = ResponseCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let msg = Message::parse("generate:id,name:steve").unwrap();
        let policy = policy(1000);
        let pattern = pattern();

        let (a, b) = tokio::join!(
            cache.get_or_compute("generate", &msg, &pattern, &policy, counting(&counter)),
            cache.get_or_compute("generate", &msg, &pattern, &policy, counting(&counter)),
        );
        assert_eq!(a.unwrap(), json!({"id": 1}));
        assert_eq!(b.unwrap(), json!({"id": 1}));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().joined, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_do_not_share() {
        let cache = ResponseCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let policy = policy(1000);
        let steve = Message::parse("generate:id,name:steve").unwrap();
        let anne = Message::parse("generate:id,name:anne").unwrap();

        cache
            .get_or_compute("generate", &steve, &pattern(), &policy, counting(&counter))
            .await
            .unwrap();
        let other = cache
            .get_or_compute("generate", &anne, &pattern(), &policy, counting(&counter))
            .await
            .unwrap();
        assert_eq!(other, json!({"id": 2}));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_uncacheable_fails_by_default() {
        let cache = ResponseCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let msg = Message::from_value(json!({"generate": "id", "price": {"a": "b"}})).unwrap();

        let err = cache
            .get_or_compute("generate", &msg, &pattern(), &policy(1000), counting(&counter))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Uncacheable(_)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_uncacheable_bypass_never_stores() {
        let cache = ResponseCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let msg = Message::from_value(json!({"generate": "id", "price": {"a": "b"}})).unwrap();
        let policy = policy(1000).bypass_uncacheable();

        for expected in 1..=2 {
            let result = cache
                .get_or_compute("generate", &msg, &pattern(), &policy, counting(&counter))
                .await
                .unwrap();
            assert_eq!(result, json!({ "id": expected }));
        }
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bypassed_computation_times_out() {
        let cache = ResponseCache::new();
        let msg = Message::from_value(json!({"generate": "id", "price": {"a": "b"}})).unwrap();
        let policy =
            CachePolicy::new(Duration::from_secs(1), Duration::from_millis(100)).bypass_uncacheable();

        let err = cache
            .get_or_compute("generate", &msg, &pattern(), &policy, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(json!("late"))
            })
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::GenerationTimeout(100));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_clear_drops_pending_slots() {
        let cache = Arc::new(ResponseCache::new());
        let msg = Message::parse("generate:id").unwrap();
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        let waiting = {
            let cache = cache.clone();
            let msg = msg.clone();
            tokio::spawn(async move {
                let pattern = pattern();
                let policy = policy(1000);
                let outcome = cache
                    .get_or_compute("generate", &msg, &pattern, &policy, move || async move {
                        let _ = gate.await;
                        Ok(json!("first"))
                    })
                    .await;
                outcome
            })
        };
        while cache.is_empty() {
            tokio::task::yield_now().await;
        }

        cache.clear();
        assert!(cache.is_empty());
        let _ = release.send(());
        assert_eq!(waiting.await.unwrap().unwrap(), json!("first"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_custom_key_collapses_nested_messages() {
        let cache = ResponseCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let policy = policy(1000).with_key(|msg| {
            let values = &msg.get("samples").unwrap()["readings"]["values"];
            format!("id{}:{}", values[0], values[1])
        });
        let msg = Message::from_value(json!({
            "generate": "id",
            "samples": {"readings": {"values": [2, 3]}}
        }))
        .unwrap();

        for _ in 0..2 {
            let result = cache
                .get_or_compute("generate", &msg, &pattern(), &policy, counting(&counter))
                .await
                .unwrap();
            assert_eq!(result, json!({"id": 1}));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_timeout_clears_slot() {
        let cache = ResponseCache::new();
        let msg = Message::parse("generate:id").unwrap();
        let policy = CachePolicy::new(Duration::from_secs(1), Duration::from_millis(100));

        let err = cache
            .get_or_compute("generate", &msg, &pattern(), &policy, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(json!("late"))
            })
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::GenerationTimeout(100));
        assert!(cache.is_empty());

        let retried = cache
            .get_or_compute("generate", &msg, &pattern(), &policy, || async { Ok(json!("fast")) })
            .await
            .unwrap();
        assert_eq!(retried, json!("fast"));
    }

    #[tokio::test]
    async fn test_errors_are_not_stored() {
        let cache = ResponseCache::new();
        let msg = Message::parse("generate:id").unwrap();

        let err = cache
            .get_or_compute("generate", &msg, &pattern(), &policy(1000), || async {
                Err(DispatchError::handler("failed"))
            })
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::handler("failed"));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = ResponseCache::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let msg = Message::parse("generate:id").unwrap();

        cache
            .get_or_compute("generate", &msg, &pattern(), &policy(1000), counting(&counter))
            .await
            .unwrap();
        assert_eq!(cache.purge_expired(), 0);

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }
}
