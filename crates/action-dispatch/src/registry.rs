//! # Pattern Registry
//!
//! Stores actions keyed by [`Pattern`] and resolves an incoming message to the
//! best matching one.
//!
//! ## Resolution rules
//!
//! 1. Every constraint of a candidate pattern must be satisfied by the message.
//! 2. Among candidates, the one with the most constrained keys wins.
//! 3. Ties go to the pattern registered first.
//!
//! A registry is an ordinary value owned by a [`Dispatcher`](crate::Dispatcher);
//! there is no process-wide registry.

use crate::cache::CachePolicy;
use crate::error::{DispatchError, Result};
use crate::handler::SharedHandler;
use crate::message::Message;
use crate::pattern::{Pattern, PatternId};
use std::sync::Arc;
use tracing::{debug, info};

/// Per-action registration options.
#[derive(Clone, Default)]
pub struct ActionOptions {
    /// Memoize results of this action.
    pub cache: Option<CachePolicy>,
}

impl ActionOptions {
    pub fn cached(policy: CachePolicy) -> Self {
        Self {
            cache: Some(policy),
        }
    }
}

struct Entry {
    id: PatternId,
    pattern: Arc<Pattern>,
    handler: SharedHandler,
    options: ActionOptions,
}

/// The outcome of a successful [`PatternRegistry::resolve`].
#[derive(Clone)]
pub struct Resolved {
    pub id: PatternId,
    pub pattern: Arc<Pattern>,
    pub handler: SharedHandler,
    pub cache: Option<CachePolicy>,
}

/// Ordered collection of pattern → handler registrations.
#[derive(Default)]
pub struct PatternRegistry {
    entries: Vec<Entry>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an action. Fails with [`DispatchError::DuplicatePattern`] when an
    /// identical pattern exists; the registry is left untouched in that case.
    pub fn register(
        &mut self,
        pattern: Pattern,
        handler: SharedHandler,
        options: ActionOptions,
    ) -> Result<PatternId> {
        if self.entries.iter().any(|e| *e.pattern == pattern) {
            return Err(DispatchError::DuplicatePattern(pattern.to_string()));
        }
        if let Some(policy) = &options.cache {
            policy.validate()?;
        }

        let id = PatternId(self.entries.len());
        info!(%pattern, %id, cached = options.cache.is_some(), "Registered");
        self.entries.push(Entry {
            id,
            pattern: Arc::new(pattern),
            handler,
            options,
        });
        Ok(id)
    }

    /// Picks the most specific matching pattern, earliest registration on ties.
    pub fn resolve(&self, message: &Message) -> Result<Resolved> {
        let mut best: Option<&Entry> = None;
        for entry in &self.entries {
            if !entry.pattern.matches(message) {
                continue;
            }
            let better = match best {
                Some(current) => entry.pattern.specificity() > current.pattern.specificity(),
                None => true,
            };
            if better {
                best = Some(entry);
            }
        }

        match best {
            Some(entry) => {
                debug!(pattern = %entry.pattern, %message, "Resolved");
                Ok(Resolved {
                    id: entry.id,
                    pattern: entry.pattern.clone(),
                    handler: entry.handler.clone(),
                    cache: entry.options.cache.clone(),
                })
            }
            None => {
                debug!(%message, "No match");
                Err(DispatchError::NoMatch(message.to_string()))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered patterns in registration order.
    pub fn patterns(&self) -> Vec<Arc<Pattern>> {
        self.entries.iter().map(|e| e.pattern.clone()).collect()
    }
}
