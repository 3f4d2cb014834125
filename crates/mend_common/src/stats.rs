//! Statistics Aggregator
//!
//! Running counters per fault id, held in memory behind one mutex and
//! written out in full to a JSON snapshot after every mutation.
//!
//! The snapshot is a derived cache: a missing or corrupt file only costs the
//! counters, fault records themselves live in the knowledge store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::atomic_write::atomic_write;
use crate::classifier::Severity;
use crate::error::Result;
use crate::knowledge::FaultRecord;

/// Default occurrence count at which a fault is flagged critical
pub const DEFAULT_CRITICAL_THRESHOLD: u64 = 5;

/// Fix attempts needed before the success ratio is considered
const MIN_FIX_ATTEMPTS_FOR_RATIO: u64 = 2;

/// Success ratio below which a repeatedly-fixed fault is critical
const LOW_FIX_RATIO: f64 = 0.5;

/// Counters for one fault id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsEntry {
    pub occurrences: u64,
    pub last_occurrence: Option<DateTime<Utc>>,
    pub fix_attempts: u64,
    pub successful_fixes: u64,
    /// Mean remediation duration in seconds
    pub avg_fix_time: f64,
    pub severity: Severity,
    pub modules_affected: BTreeSet<String>,
    pub related_faults: BTreeSet<String>,
}

impl StatsEntry {
    /// successful_fixes / fix_attempts, 0.0 before any attempt
    pub fn fix_success_ratio(&self) -> f64 {
        if self.fix_attempts == 0 {
            0.0
        } else {
            self.successful_fixes as f64 / self.fix_attempts as f64
        }
    }

    fn is_critical(&self, threshold: u64) -> bool {
        self.occurrences >= threshold
            || (self.fix_attempts > MIN_FIX_ATTEMPTS_FOR_RATIO
                && self.fix_success_ratio() < LOW_FIX_RATIO)
    }
}

/// Process-wide fault counters
pub struct StatsAggregator {
    entries: Mutex<HashMap<String, StatsEntry>>,
    snapshot_path: Option<PathBuf>,
}

impl StatsAggregator {
    /// Aggregator that never touches disk
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            snapshot_path: None,
        }
    }

    /// Open with a snapshot file, merging any existing snapshot into fresh state
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = Self::load_snapshot(&path);
        debug!(path = %path.display(), entries = entries.len(), "Loaded fault statistics snapshot");

        Self {
            entries: Mutex::new(entries),
            snapshot_path: Some(path),
        }
    }

    fn load_snapshot(path: &Path) -> HashMap<String, StatsEntry> {
        let mut merged = HashMap::new();

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return merged,
        };

        match serde_json::from_str::<HashMap<String, StatsEntry>>(&content) {
            Ok(loaded) => merged.extend(loaded),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt statistics snapshot");
            }
        }

        merged
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StatsEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write the full snapshot. Called with the lock held.
    fn persist(&self, entries: &HashMap<String, StatsEntry>) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        // Sorted keys keep the file diffable
        let ordered: BTreeMap<&String, &StatsEntry> = entries.iter().collect();
        let json = serde_json::to_string_pretty(&ordered)?;
        atomic_write(path, &json)?;
        Ok(())
    }

    /// Count one occurrence of `fault_id` on `operation_name`.
    pub fn record_occurrence(
        &self,
        fault_id: &str,
        operation_name: &str,
        severity: Severity,
        related_fault: Option<&str>,
    ) -> Result<()> {
        let mut entries = self.lock();

        let entry = entries.entry(fault_id.to_string()).or_default();
        entry.occurrences += 1;
        entry.last_occurrence = Some(Utc::now());
        entry.modules_affected.insert(operation_name.to_string());
        entry.severity = severity;
        if let Some(related) = related_fault {
            entry.related_faults.insert(related.to_string());
        }

        self.persist(&entries)
    }

    /// Count one remediation attempt and fold its duration into the mean.
    pub fn record_fix_outcome(&self, fault_id: &str, success: bool, duration: Duration) -> Result<()> {
        let mut entries = self.lock();

        let entry = entries.entry(fault_id.to_string()).or_default();
        entry.fix_attempts += 1;
        if success {
            entry.successful_fixes += 1;
        }
        let n = entry.fix_attempts as f64;
        entry.avg_fix_time = (entry.avg_fix_time * (n - 1.0) + duration.as_secs_f64()) / n;

        self.persist(&entries)
    }

    /// Associate two faults without counting an occurrence.
    pub fn add_related(&self, fault_id: &str, related_fault: &str) -> Result<()> {
        let mut entries = self.lock();
        entries
            .entry(fault_id.to_string())
            .or_default()
            .related_faults
            .insert(related_fault.to_string());
        self.persist(&entries)
    }

    /// Create empty entries for stored faults the snapshot does not know about.
    /// Returns how many entries were created.
    pub fn seed_from_records(&self, records: &[FaultRecord]) -> Result<usize> {
        let mut entries = self.lock();
        let mut seeded = 0;

        for record in records {
            if entries.contains_key(&record.fault_id) {
                continue;
            }
            let mut entry = StatsEntry {
                severity: record.severity,
                ..StatsEntry::default()
            };
            entry.modules_affected.insert(record.operation_name.clone());
            entries.insert(record.fault_id.clone(), entry);
            seeded += 1;
        }

        if seeded > 0 {
            self.persist(&entries)?;
        }
        Ok(seeded)
    }

    /// Fault ids that occur often, or whose remedies keep failing.
    pub fn list_critical(&self, threshold: u64) -> Vec<String> {
        let entries = self.lock();
        let mut critical: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_critical(threshold))
            .map(|(id, _)| id.clone())
            .collect();
        critical.sort();
        critical
    }

    /// For every operation ever recorded, the fault ids observed on it.
    pub fn group_by_operation(&self) -> BTreeMap<String, BTreeSet<String>> {
        let entries = self.lock();
        let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (fault_id, entry) in entries.iter() {
            for operation in &entry.modules_affected {
                groups
                    .entry(operation.clone())
                    .or_default()
                    .insert(fault_id.clone());
            }
        }
        groups
    }

    pub fn get(&self, fault_id: &str) -> Option<StatsEntry> {
        self.lock().get(fault_id).cloned()
    }

    /// Copy of every entry, sorted by fault id
    pub fn entries(&self) -> BTreeMap<String, StatsEntry> {
        self.lock()
            .iter()
            .map(|(id, e)| (id.clone(), e.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }
}
