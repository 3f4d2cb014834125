//! Fault manager - the per-process service object
//!
//! Owns the knowledge store, the statistics aggregator and the remedy
//! registry. Built once at startup and handed out as `Arc<FaultManager>` to
//! every instrumented call site.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::classifier::{Classification, Classifier};
use crate::config::MendConfig;
use crate::error::Result;
use crate::fault::{Fault, FaultSource};
use crate::instrument::{Instrumented, InstrumentedComponent, Monitored};
use crate::knowledge::KnowledgeStore;
use crate::remediation::{RemediationExecutor, RemediationRegistry};
use crate::report::{Reporter, SnapshotReport};
use crate::stats::StatsAggregator;

pub struct FaultManager {
    config: MendConfig,
    classifier: Classifier,
    store: Arc<KnowledgeStore>,
    stats: Arc<StatsAggregator>,
    registry: Arc<RemediationRegistry>,
    executor: RemediationExecutor,
}

impl FaultManager {
    /// Open the persistent store and snapshot named by `config`.
    pub fn open(config: MendConfig) -> Result<Arc<Self>> {
        let store = Arc::new(KnowledgeStore::open_at(config.db_path())?);
        let stats = Arc::new(StatsAggregator::open(config.stats_path()));

        // The snapshot is a cache; make sure every stored fault has an entry
        let records = store.list_faults()?;
        match stats.seed_from_records(&records) {
            Ok(0) => {}
            Ok(seeded) => info!(seeded, "Rebuilt missing statistics entries from knowledge store"),
            Err(e) => warn!(error = %e, "Failed to persist rebuilt statistics snapshot"),
        }

        info!(
            data_dir = %config.data_dir.display(),
            faults = records.len(),
            "Fault manager ready"
        );
        Ok(Arc::new(Self::from_parts(config, store, stats)))
    }

    /// Manager with nothing on disk
    pub fn in_memory(config: MendConfig) -> Result<Arc<Self>> {
        let store = Arc::new(KnowledgeStore::open_in_memory()?);
        let stats = Arc::new(StatsAggregator::in_memory());
        Ok(Arc::new(Self::from_parts(config, store, stats)))
    }

    pub fn from_parts(
        config: MendConfig,
        store: Arc<KnowledgeStore>,
        stats: Arc<StatsAggregator>,
    ) -> Self {
        let registry = Arc::new(RemediationRegistry::new());
        let executor = RemediationExecutor::new(Arc::clone(&store), Arc::clone(&registry));
        Self {
            config,
            classifier: Classifier::new(),
            store,
            stats,
            registry,
            executor,
        }
    }

    pub fn config(&self) -> &MendConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    pub fn registry(&self) -> &Arc<RemediationRegistry> {
        &self.registry
    }

    pub fn executor(&self) -> &RemediationExecutor {
        &self.executor
    }

    /// Classify a fault and record it in both the statistics and the store.
    ///
    /// Both writes always run. Their failures are logged, never returned:
    /// fault recording is best-effort telemetry.
    pub fn classify<F: FaultSource + ?Sized>(&self, fault: &F, operation_name: &str) -> Classification {
        let classification = self.classifier.classify(fault, operation_name);

        if let Err(e) = self.stats.record_occurrence(
            &classification.fault_id,
            operation_name,
            classification.severity,
            None,
        ) {
            warn!(fault_id = %classification.fault_id, error = %e, "Failed to record fault occurrence");
        }

        if let Err(e) = self.store.upsert_fault(&classification) {
            warn!(fault_id = %classification.fault_id, error = %e, "Failed to store fault record");
        }

        debug!(
            fault_id = %classification.fault_id,
            operation = operation_name,
            severity = %classification.severity,
            "Classified fault"
        );
        classification
    }

    /// Add a remediation strategy for a fault id. `remediation_key` names a
    /// remedy in the registry.
    pub fn register_strategy(
        &self,
        fault_id: &str,
        description: &str,
        remediation_key: &str,
        automated: bool,
    ) -> Result<i64> {
        if automated && !self.registry.contains(remediation_key) {
            warn!(
                fault_id,
                key = remediation_key,
                "Automated strategy refers to a remedy that is not registered yet"
            );
        }
        self.store
            .add_strategy(fault_id, description, remediation_key, automated)
    }

    /// Register a typed remedy callable under `key`.
    pub fn register_remedy<A, R, F>(&self, key: impl Into<String>, remedy: F)
    where
        A: 'static,
        R: 'static,
        F: Fn(A) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        self.registry.register(key, remedy);
    }

    /// Report one remedy invocation to the statistics and the store.
    pub fn record_remedy_outcome(&self, fault_id: &str, strategy_id: i64, success: bool, duration: Duration) {
        if let Err(e) = self.stats.record_fix_outcome(fault_id, success, duration) {
            warn!(fault_id, error = %e, "Failed to record fix statistics");
        }
        match self.store.record_strategy_outcome(strategy_id, success) {
            Ok(strategy) => debug!(
                strategy_id,
                success_rate = strategy.success_rate,
                executions = strategy.execution_count,
                "Recorded remediation outcome"
            ),
            Err(e) if e.is_persistence() => {
                warn!(strategy_id, error = %e, "Failed to record remediation outcome")
            }
            Err(e) => warn!(strategy_id, fault_id, error = %e, "Outcome reported for unknown strategy"),
        }
    }

    /// Classify `fault`, then try the best automated remedy with `args`.
    ///
    /// Returns the remedy's result when it succeeds. Any panic inside fault
    /// handling is contained here so the caller can still surface the
    /// original fault.
    pub fn recover<A: 'static, R: 'static>(
        &self,
        operation_name: &str,
        fault: &dyn FaultSource,
        args: A,
    ) -> Option<R> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.try_remedy(operation_name, fault, args))) {
            Ok(result) => result,
            Err(payload) => {
                error!(
                    operation = operation_name,
                    panic = %Fault::from_panic(payload.as_ref()).message,
                    "Fault handling panicked, returning original fault"
                );
                None
            }
        }
    }

    fn try_remedy<A: 'static, R: 'static>(
        &self,
        operation_name: &str,
        fault: &dyn FaultSource,
        args: A,
    ) -> Option<R> {
        let classification = self.classify(fault, operation_name);
        let fault_id = classification.fault_id.as_str();
        let prepared = self.executor.attempt::<A, R>(fault_id)?;

        info!(
            fault_id,
            operation = operation_name,
            strategy_id = prepared.strategy_id,
            remedy = %prepared.remediation_key,
            "Attempting automated remediation"
        );

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| prepared.invoke(args)));
        let elapsed = started.elapsed();

        let result = match outcome {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(fault_id, strategy_id = prepared.strategy_id, error = %e, "Remediation failed");
                None
            }
            Err(payload) => {
                warn!(
                    fault_id,
                    strategy_id = prepared.strategy_id,
                    panic = %Fault::from_panic(payload.as_ref()).message,
                    "Remediation panicked"
                );
                None
            }
        };

        self.record_remedy_outcome(fault_id, prepared.strategy_id, result.is_some(), elapsed);
        if result.is_some() {
            info!(fault_id, elapsed_ms = elapsed.as_millis() as u64, "Remediation succeeded");
        }
        result
    }

    /// Wrap a single operation.
    pub fn instrument<A, R, E, F>(self: &Arc<Self>, name: impl Into<String>, op: F) -> Instrumented<F>
    where
        F: Fn(A) -> std::result::Result<R, E>,
    {
        Instrumented::new(name.into(), Arc::clone(self), op)
    }

    /// Wrap every declared operation of a component.
    pub fn instrument_component<C: Monitored>(self: &Arc<Self>, component: C) -> InstrumentedComponent<C> {
        InstrumentedComponent::new(component, Arc::clone(self))
    }

    pub fn reporter(&self) -> Reporter<'_> {
        Reporter::new(&self.store, &self.stats)
    }

    /// Aggregate for health endpoints
    pub fn snapshot_report(&self) -> SnapshotReport {
        self.reporter().snapshot(self.config.critical_threshold)
    }
}
