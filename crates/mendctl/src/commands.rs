//! Command handlers
//!
//! Each handler opens nothing itself; [`Workspace`] owns the store and the
//! statistics for one invocation and the handlers only read from it.

use anyhow::{Context, Result};
use mend_common::knowledge::KnowledgeStore;
use mend_common::report::{Reporter, SortKey};
use mend_common::{MendConfig, StatsAggregator};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::display;

/// The persisted state named by a config
pub struct Workspace {
    config: MendConfig,
    store: KnowledgeStore,
    stats: StatsAggregator,
}

impl Workspace {
    /// Open the data directory read-only. A directory with no knowledge store
    /// yet reads as empty instead of being created.
    pub fn open(config: MendConfig) -> Result<Self> {
        let db_path = config.db_path();
        let store = if db_path.exists() {
            KnowledgeStore::open_readonly(&db_path)
                .with_context(|| format!("opening knowledge store {}", db_path.display()))?
        } else {
            debug!(path = %db_path.display(), "No knowledge store yet");
            KnowledgeStore::open_in_memory()?
        };
        let stats = StatsAggregator::open(config.stats_path());

        Ok(Self { config, store, stats })
    }

    pub fn config(&self) -> &MendConfig {
        &self.config
    }

    pub fn reporter(&self) -> Reporter<'_> {
        Reporter::new(&self.store, &self.stats)
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn recent(ws: &Workspace, sort: SortKey, limit: usize, json: bool) -> Result<()> {
    let faults = ws.reporter().recent_faults(sort, limit)?;
    if json {
        return print_json(&faults);
    }
    display::print_fault_table("Recent faults", &faults);
    Ok(())
}

pub fn critical(ws: &Workspace, threshold: Option<u64>, json: bool) -> Result<()> {
    let threshold = threshold.unwrap_or(ws.config().critical_threshold);
    let faults = ws.reporter().critical_faults(threshold)?;
    if json {
        return print_json(&faults);
    }
    display::print_critical(&faults, threshold);
    Ok(())
}

pub fn health(ws: &Workspace, json: bool) -> Result<()> {
    let health = ws.reporter().operation_health()?;
    if json {
        return print_json(&health);
    }
    display::print_health(&health);
    Ok(())
}

pub fn unfixed(ws: &Workspace, json: bool) -> Result<()> {
    let faults = ws.reporter().faults_without_strategy()?;
    if json {
        return print_json(&faults);
    }
    display::print_fault_table("Faults without a remediation strategy", &faults);
    Ok(())
}

pub fn strategies(ws: &Workspace, fault_id: &str, json: bool) -> Result<()> {
    let strategies = ws.store.strategies_for(fault_id)?;
    if json {
        return print_json(&strategies);
    }
    let fault = ws.store.get_fault(fault_id)?;
    display::print_strategies(fault_id, fault.as_ref(), &strategies);
    Ok(())
}

pub fn export(ws: &Workspace, path: &Path, json: bool) -> Result<()> {
    let report = ws
        .reporter()
        .export_report(path, ws.config().critical_threshold)
        .with_context(|| format!("exporting report to {}", path.display()))?;
    if json {
        return print_json(&serde_json::json!({
            "path": path,
            "faults": report.faults.len(),
        }));
    }
    display::print_exported(path, report.faults.len());
    Ok(())
}

pub fn summary(ws: &Workspace, json: bool) -> Result<()> {
    let snapshot = ws.reporter().snapshot(ws.config().critical_threshold);
    if json {
        return print_json(&snapshot);
    }
    display::print_summary(&snapshot, ws.config());
    Ok(())
}
