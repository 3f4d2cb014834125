//! Remediation Executor
//!
//! Remedies are typed callables registered at startup under a key. A
//! remediation strategy in the knowledge store refers to its remedy by that
//! key; nothing is ever compiled from stored text.
//!
//! The executor only looks up and validates the best remedy for a fault id.
//! Invoking it against live arguments, and reporting the outcome, is the
//! caller's job.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::error::{MendError, Result};
use crate::knowledge::KnowledgeStore;

/// A remedy taking the instrumented operation's arguments
pub type RemedyFn<A, R> = Arc<dyn Fn(A) -> anyhow::Result<R> + Send + Sync>;

type ErasedRemedy = Arc<dyn Any + Send + Sync>;

/// Key -> typed remedy callable
#[derive(Default)]
pub struct RemediationRegistry {
    remedies: RwLock<HashMap<String, ErasedRemedy>>,
}

impl RemediationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the remedy stored under `key`.
    pub fn register<A, R, F>(&self, key: impl Into<String>, remedy: F)
    where
        A: 'static,
        R: 'static,
        F: Fn(A) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let key = key.into();
        let typed: RemedyFn<A, R> = Arc::new(remedy);
        let mut remedies = self
            .remedies
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if remedies.insert(key.clone(), Arc::new(typed)).is_some() {
            debug!(key = %key, "Replaced registered remedy");
        }
    }

    /// Look up a remedy with the expected `A -> R` signature.
    pub fn resolve<A: 'static, R: 'static>(&self, key: &str) -> Result<RemedyFn<A, R>> {
        let remedies = self
            .remedies
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let erased = remedies
            .get(key)
            .ok_or_else(|| MendError::RemedyNotRegistered(key.to_string()))?;
        erased
            .downcast_ref::<RemedyFn<A, R>>()
            .cloned()
            .ok_or_else(|| MendError::RemedySignatureMismatch(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.remedies
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(key)
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .remedies
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

/// A validated remedy ready to be invoked
pub struct PreparedRemedy<A, R> {
    pub strategy_id: i64,
    pub remediation_key: String,
    pub description: String,
    fix: RemedyFn<A, R>,
}

impl<A, R> PreparedRemedy<A, R> {
    pub fn invoke(&self, args: A) -> anyhow::Result<R> {
        (self.fix)(args)
    }
}

impl<A, R> fmt::Debug for PreparedRemedy<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedRemedy")
            .field("strategy_id", &self.strategy_id)
            .field("remediation_key", &self.remediation_key)
            .field("description", &self.description)
            .finish()
    }
}

/// Finds and prepares the best automated remedy for a fault id
pub struct RemediationExecutor {
    store: Arc<KnowledgeStore>,
    registry: Arc<RemediationRegistry>,
}

impl RemediationExecutor {
    pub fn new(store: Arc<KnowledgeStore>, registry: Arc<RemediationRegistry>) -> Self {
        Self { store, registry }
    }

    /// Best automated remedy for `fault_id`, or None.
    ///
    /// A strategy whose key is unregistered, or whose remedy has the wrong
    /// signature, counts as one failed execution of that strategy.
    pub fn attempt<A: 'static, R: 'static>(&self, fault_id: &str) -> Option<PreparedRemedy<A, R>> {
        let strategy = match self.store.best_strategy(fault_id) {
            Ok(Some(strategy)) => strategy,
            Ok(None) => {
                debug!(fault_id, "No remediation strategy registered");
                return None;
            }
            Err(e) => {
                warn!(fault_id, error = %e, "Failed to look up remediation strategy");
                return None;
            }
        };

        if !strategy.automated {
            debug!(
                fault_id,
                strategy_id = strategy.id,
                "Best strategy requires manual intervention"
            );
            return None;
        }

        match self.registry.resolve::<A, R>(&strategy.remediation_source) {
            Ok(fix) => Some(PreparedRemedy {
                strategy_id: strategy.id,
                remediation_key: strategy.remediation_source,
                description: strategy.description,
                fix,
            }),
            Err(e) if e.is_unresolvable_remedy() => {
                warn!(
                    fault_id,
                    strategy_id = strategy.id,
                    error = %e,
                    "Remediation strategy cannot be prepared"
                );
                if let Err(e) = self.store.record_strategy_outcome(strategy.id, false) {
                    warn!(strategy_id = strategy.id, error = %e, "Failed to record remediation outcome");
                }
                None
            }
            Err(e) => {
                warn!(fault_id, strategy_id = strategy.id, error = %e, "Remedy lookup failed");
                None
            }
        }
    }
}
