//! Reporting façade
//!
//! Read-only queries joining the knowledge store with the statistics
//! aggregator. Nothing here mutates either.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::atomic_write::atomic_write;
use crate::classifier::Severity;
use crate::error::Result;
use crate::knowledge::{FaultRecord, KnowledgeStore, StrategyCount};
use crate::stats::{StatsAggregator, StatsEntry};

/// Health score deductions per fault on an operation
const CRITICAL_PENALTY: u32 = 20;
const HIGH_PENALTY: u32 = 10;
const MEDIUM_PENALTY: u32 = 5;
const LOW_PENALTY: u32 = 2;

/// Aggregate for health endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotReport {
    pub total_fault_types: usize,
    pub critical_faults: Vec<String>,
    /// operation -> number of distinct faults seen on it
    pub fault_pattern_counts: BTreeMap<String, usize>,
}

/// Sort order for fault listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Occurrences,
    Severity,
    Fixes,
}

impl SortKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "occurrences" | "count" => Some(SortKey::Occurrences),
            "severity" => Some(SortKey::Severity),
            "fixes" | "fix_attempts" => Some(SortKey::Fixes),
            _ => None,
        }
    }
}

/// One fault with its counters and remediation coverage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultSummary {
    pub fault_id: String,
    pub fault_type: String,
    pub message: String,
    pub operation_name: String,
    pub root_cause: String,
    pub severity: Severity,
    pub occurrences: u64,
    pub last_occurrence: Option<DateTime<Utc>>,
    pub fix_attempts: u64,
    pub successful_fixes: u64,
    pub avg_fix_time: f64,
    pub modules_affected: BTreeSet<String>,
    pub strategies: u64,
    pub automated_strategies: u64,
}

impl FaultSummary {
    fn build(
        fault_id: &str,
        record: Option<&FaultRecord>,
        entry: Option<&StatsEntry>,
        count: StrategyCount,
    ) -> Self {
        let default_entry = StatsEntry::default();
        let entry = entry.unwrap_or(&default_entry);

        let severity = match (entry.occurrences, record) {
            (0, Some(record)) => record.severity,
            _ => entry.severity,
        };

        let mut modules_affected = entry.modules_affected.clone();
        if let Some(record) = record {
            modules_affected.insert(record.operation_name.clone());
        }

        Self {
            fault_id: fault_id.to_string(),
            fault_type: record.map(|r| r.fault_type.clone()).unwrap_or_else(|| "unknown".to_string()),
            message: record.map(|r| r.message.clone()).unwrap_or_default(),
            operation_name: record
                .map(|r| r.operation_name.clone())
                .or_else(|| entry.modules_affected.iter().next().cloned())
                .unwrap_or_default(),
            root_cause: record.map(|r| r.root_cause.clone()).unwrap_or_default(),
            severity,
            occurrences: entry.occurrences,
            last_occurrence: entry.last_occurrence,
            fix_attempts: entry.fix_attempts,
            successful_fixes: entry.successful_fixes,
            avg_fix_time: entry.avg_fix_time,
            modules_affected,
            strategies: count.total,
            automated_strategies: count.automated,
        }
    }

    /// An automated strategy exists for this fault
    pub fn remediation_available(&self) -> bool {
        self.automated_strategies > 0
    }
}

/// Health score for one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHealth {
    pub operation: String,
    pub score: u32,
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub fault_count: u32,
}

impl OperationHealth {
    fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            score: 100,
            critical: 0,
            high: 0,
            medium: 0,
            low: 0,
            fault_count: 0,
        }
    }

    fn add(&mut self, severity: Severity) {
        self.fault_count += 1;
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Unknown => {}
        }
        self.score = health_score(self.critical, self.high, self.medium, self.low);
    }
}

/// 100 minus 20/10/5/2 per critical/high/medium/low fault, floored at 0.
pub fn health_score(critical: u32, high: u32, medium: u32, low: u32) -> u32 {
    let penalty = critical.saturating_mul(CRITICAL_PENALTY)
        .saturating_add(high.saturating_mul(HIGH_PENALTY))
        .saturating_add(medium.saturating_mul(MEDIUM_PENALTY))
        .saturating_add(low.saturating_mul(LOW_PENALTY));
    100u32.saturating_sub(penalty)
}

/// Everything, for export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullReport {
    pub generated_at: DateTime<Utc>,
    pub summary: SnapshotReport,
    pub faults: Vec<FaultSummary>,
    pub critical_faults: Vec<FaultSummary>,
    pub operation_health: Vec<OperationHealth>,
    pub faults_without_strategy: Vec<FaultSummary>,
}

/// Read-only view over the store and the statistics
pub struct Reporter<'a> {
    store: &'a KnowledgeStore,
    stats: &'a StatsAggregator,
}

impl<'a> Reporter<'a> {
    pub fn new(store: &'a KnowledgeStore, stats: &'a StatsAggregator) -> Self {
        Self { store, stats }
    }

    pub fn snapshot(&self, critical_threshold: u64) -> SnapshotReport {
        SnapshotReport {
            total_fault_types: self.stats.len(),
            critical_faults: self.stats.list_critical(critical_threshold),
            fault_pattern_counts: self
                .stats
                .group_by_operation()
                .into_iter()
                .map(|(operation, faults)| (operation, faults.len()))
                .collect(),
        }
    }

    /// Every fault known to either side, unsorted
    fn summaries(&self) -> Result<BTreeMap<String, FaultSummary>> {
        let records: BTreeMap<String, FaultRecord> = self
            .store
            .list_faults()?
            .into_iter()
            .map(|r| (r.fault_id.clone(), r))
            .collect();
        let entries = self.stats.entries();
        let counts = self.store.strategy_counts()?;

        let ids: BTreeSet<&String> = records.keys().chain(entries.keys()).collect();
        Ok(ids
            .into_iter()
            .map(|id| {
                let summary = FaultSummary::build(
                    id,
                    records.get(id),
                    entries.get(id),
                    counts.get(id).copied().unwrap_or_default(),
                );
                (id.clone(), summary)
            })
            .collect())
    }

    /// Faults sorted by `sort`, at most `limit` of them
    pub fn recent_faults(&self, sort: SortKey, limit: usize) -> Result<Vec<FaultSummary>> {
        let mut faults: Vec<FaultSummary> = self.summaries()?.into_values().collect();
        sort_faults(&mut faults, sort);
        faults.truncate(limit);
        Ok(faults)
    }

    /// Critical faults (occurrence or failing-fix predicate), most severe first
    pub fn critical_faults(&self, threshold: u64) -> Result<Vec<FaultSummary>> {
        let critical: BTreeSet<String> = self.stats.list_critical(threshold).into_iter().collect();
        let mut faults: Vec<FaultSummary> = self
            .summaries()?
            .into_values()
            .filter(|f| critical.contains(&f.fault_id))
            .collect();
        sort_faults(&mut faults, SortKey::Severity);
        Ok(faults)
    }

    /// Per-operation health, worst first
    pub fn operation_health(&self) -> Result<Vec<OperationHealth>> {
        let mut health: BTreeMap<String, OperationHealth> = BTreeMap::new();
        for fault in self.summaries()?.values() {
            for operation in &fault.modules_affected {
                health
                    .entry(operation.clone())
                    .or_insert_with(|| OperationHealth::new(operation))
                    .add(fault.severity);
            }
        }

        let mut health: Vec<OperationHealth> = health.into_values().collect();
        health.sort_by(|a, b| a.score.cmp(&b.score).then_with(|| a.operation.cmp(&b.operation)));
        Ok(health)
    }

    /// Faults nobody has registered a strategy for yet
    pub fn faults_without_strategy(&self) -> Result<Vec<FaultSummary>> {
        let unfixed: BTreeSet<String> = self
            .store
            .faults_without_strategy()?
            .into_iter()
            .map(|r| r.fault_id)
            .collect();
        let mut faults: Vec<FaultSummary> = self
            .summaries()?
            .into_values()
            .filter(|f| unfixed.contains(&f.fault_id))
            .collect();
        sort_faults(&mut faults, SortKey::Occurrences);
        Ok(faults)
    }

    pub fn full_report(&self, critical_threshold: u64) -> Result<FullReport> {
        let mut faults: Vec<FaultSummary> = self.summaries()?.into_values().collect();
        sort_faults(&mut faults, SortKey::Occurrences);

        Ok(FullReport {
            generated_at: Utc::now(),
            summary: self.snapshot(critical_threshold),
            faults,
            critical_faults: self.critical_faults(critical_threshold)?,
            operation_health: self.operation_health()?,
            faults_without_strategy: self.faults_without_strategy()?,
        })
    }

    /// Write the full report as pretty JSON
    pub fn export_report<P: AsRef<Path>>(&self, path: P, critical_threshold: u64) -> Result<FullReport> {
        let report = self.full_report(critical_threshold)?;
        let json = serde_json::to_string_pretty(&report)?;
        atomic_write(path, &json)?;
        Ok(report)
    }
}

fn sort_faults(faults: &mut [FaultSummary], sort: SortKey) {
    faults.sort_by(|a, b| {
        let primary = match sort {
            SortKey::Occurrences => b
                .occurrences
                .cmp(&a.occurrences)
                .then_with(|| b.last_occurrence.cmp(&a.last_occurrence)),
            SortKey::Severity => a
                .severity
                .rank()
                .cmp(&b.severity.rank())
                .then_with(|| b.occurrences.cmp(&a.occurrences)),
            SortKey::Fixes => b
                .fix_attempts
                .cmp(&a.fix_attempts)
                .then_with(|| b.occurrences.cmp(&a.occurrences)),
        };
        primary.then_with(|| a.fault_id.cmp(&b.fault_id))
    });
}
