//! Instrumentation wrappers
//!
//! [`Instrumented`] wraps one operation: slow calls are logged, failures
//! (returned errors and panics alike) are classified and, when an automated
//! remedy exists, replaced by the remedy's result.
//!
//! [`InstrumentedComponent`] does the same for every operation a component
//! declares through [`Monitored`].

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::fault::{Fault, FaultSource};
use crate::manager::FaultManager;

/// A component exposing the operations that should be instrumented.
pub trait Monitored {
    /// Prefix for operation names (`"{component}.{operation}"`)
    fn component_name(&self) -> &str;

    /// Public operations to wrap
    fn monitored_operations(&self) -> &[&'static str];
}

/// One wrapped operation with the same `A -> Result<R, E>` shape as the original
pub struct Instrumented<F> {
    name: String,
    manager: Arc<FaultManager>,
    op: F,
}

impl<F> Instrumented<F> {
    pub(crate) fn new(name: String, manager: Arc<FaultManager>, op: F) -> Self {
        Self { name, manager, op }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call<A, R, E>(&self, args: A) -> Result<R, E>
    where
        F: Fn(A) -> Result<R, E>,
        A: Clone + 'static,
        R: 'static,
        E: FaultSource,
    {
        run_instrumented(&self.manager, &self.name, &self.op, args)
    }
}

/// A component whose declared operations run instrumented
pub struct InstrumentedComponent<C> {
    inner: C,
    manager: Arc<FaultManager>,
    /// operation -> qualified operation name
    operations: HashMap<&'static str, String>,
}

impl<C: Monitored> InstrumentedComponent<C> {
    pub(crate) fn new(component: C, manager: Arc<FaultManager>) -> Self {
        let prefix = component.component_name().to_string();
        let mut operations = HashMap::new();

        for &operation in component.monitored_operations() {
            // Leading underscore marks internal/lifecycle members
            if operation.is_empty() || operation.starts_with('_') {
                debug!(component = %prefix, operation, "Skipping non-public operation");
                continue;
            }
            operations.insert(operation, format!("{}.{}", prefix, operation));
        }

        debug!(component = %prefix, operations = operations.len(), "Instrumented component");
        Self {
            inner: component,
            manager,
            operations,
        }
    }

    /// Run `f` against the component. Declared operations go through the
    /// fault wrapper; anything else is called directly.
    pub fn invoke<A, R, E, F>(&self, operation: &str, args: A, f: F) -> Result<R, E>
    where
        F: Fn(&C, A) -> Result<R, E>,
        A: Clone + 'static,
        R: 'static,
        E: FaultSource,
    {
        match self.operations.get(operation) {
            Some(qualified) => {
                run_instrumented(&self.manager, qualified, |a: A| f(&self.inner, a), args)
            }
            None => f(&self.inner, args),
        }
    }

    pub fn is_monitored(&self, operation: &str) -> bool {
        self.operations.contains_key(operation)
    }

    /// Qualified names of the wrapped operations, sorted
    pub fn monitored(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.values().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

fn run_instrumented<A, R, E, F>(manager: &FaultManager, name: &str, op: F, args: A) -> Result<R, E>
where
    F: Fn(A) -> Result<R, E>,
    A: Clone + 'static,
    R: 'static,
    E: FaultSource,
{
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| op(args.clone())));

    match outcome {
        Ok(Ok(value)) => {
            let elapsed = started.elapsed();
            if elapsed > manager.config().slow_call_threshold() {
                warn!(
                    operation = name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Slow operation"
                );
            }
            Ok(value)
        }
        Ok(Err(err)) => {
            debug!(operation = name, fault_type = %err.fault_type(), "Operation failed");
            match manager.recover::<A, R>(name, &err, args) {
                Some(value) => Ok(value),
                None => Err(err),
            }
        }
        Err(payload) => {
            let fault = Fault::from_panic(payload.as_ref());
            debug!(operation = name, message = %fault.message, "Operation panicked");
            match manager.recover::<A, R>(name, &fault, args) {
                Some(value) => Ok(value),
                None => panic::resume_unwind(payload),
            }
        }
    }
}
