//! Knowledge Store - SQLite-backed fault memory
//!
//! Everything learned about each fault id, and every remediation strategy
//! registered for it, with a running success rate per strategy.
//!
//! Schema:
//! - fault_records: one row per fault id (type, message, operation, call
//!   context, root cause, severity, timestamps)
//! - remediation_strategies: any number of rows per fault id, never deleted
//!
//! The connection is opened once and shared; every statement runs under the
//! store's mutex.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::classifier::{Classification, Severity};
use crate::error::{MendError, Result};
use crate::fault::CallFrame;

const FAULT_COLUMNS: &str = "fault_id, fault_type, message, operation_name, call_context, \
                             root_cause, severity, created_at, updated_at";

const STRATEGY_COLUMNS: &str = "id, fault_id, description, remediation_source, automated, \
                                success_rate, execution_count, success_count, created_at, updated_at";

/// What the store knows about one fault id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultRecord {
    pub fault_id: String,
    pub fault_type: String,
    pub message: String,
    pub operation_name: String,
    pub call_context: Vec<CallFrame>,
    pub root_cause: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registered remediation for one fault id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationStrategy {
    pub id: i64,
    pub fault_id: String,
    pub description: String,
    /// Registry key of the remedy callable
    pub remediation_source: String,
    /// Eligible for unattended execution
    pub automated: bool,
    /// success_count / execution_count
    pub success_rate: f64,
    pub execution_count: u64,
    pub success_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Number of strategies registered for a fault id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyCount {
    pub total: u64,
    pub automated: u64,
}

/// SQLite-backed knowledge store
pub struct KnowledgeStore {
    conn: Mutex<Connection>,
}

impl KnowledgeStore {
    /// Open or create the store at a path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path_ref)?;

        // WAL lets the reporting CLI read while the service writes
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init_schema(&conn)?;

        debug!(path = %path_ref.display(), "Opened knowledge store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an existing database read-only.
    /// Returns None if the file doesn't exist or can't be opened.
    pub fn open_readonly<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return None;
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).ok()?;
        Some(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory store (tests, ephemeral processes)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS fault_records (
                fault_id TEXT PRIMARY KEY,
                fault_type TEXT NOT NULL,
                message TEXT NOT NULL,
                operation_name TEXT NOT NULL,
                call_context TEXT NOT NULL,
                root_cause TEXT NOT NULL,
                severity TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS remediation_strategies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fault_id TEXT NOT NULL,
                description TEXT NOT NULL,
                remediation_source TEXT NOT NULL,
                automated INTEGER NOT NULL,
                success_rate REAL NOT NULL DEFAULT 0.0,
                execution_count INTEGER NOT NULL DEFAULT 0,
                success_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_strategies_fault ON remediation_strategies(fault_id);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a new fault record, or refresh every mutable field of an existing one.
    /// `created_at` is kept, `updated_at` moves to now.
    pub fn upsert_fault(&self, classification: &Classification) -> Result<FaultRecord> {
        let call_context = serde_json::to_string(&classification.call_context)?;
        let now = Utc::now();

        let conn = self.lock();
        conn.execute(
            r#"
            INSERT INTO fault_records
                (fault_id, fault_type, message, operation_name, call_context,
                 root_cause, severity, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            ON CONFLICT(fault_id) DO UPDATE SET
                fault_type = excluded.fault_type,
                message = excluded.message,
                operation_name = excluded.operation_name,
                call_context = excluded.call_context,
                root_cause = excluded.root_cause,
                severity = excluded.severity,
                updated_at = excluded.updated_at
            "#,
            params![
                &classification.fault_id,
                &classification.fault_type,
                &classification.message,
                &classification.operation_name,
                call_context,
                &classification.root_cause,
                classification.severity.as_str(),
                now,
            ],
        )?;

        let record = conn.query_row(
            &format!("SELECT {} FROM fault_records WHERE fault_id = ?1", FAULT_COLUMNS),
            params![&classification.fault_id],
            fault_from_row,
        )?;
        Ok(record)
    }

    /// Plain lookup
    pub fn get_fault(&self, fault_id: &str) -> Result<Option<FaultRecord>> {
        let conn = self.lock();
        let record = conn
            .query_row(
                &format!("SELECT {} FROM fault_records WHERE fault_id = ?1", FAULT_COLUMNS),
                params![fault_id],
                fault_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// All fault records, most recently updated first
    pub fn list_faults(&self) -> Result<Vec<FaultRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM fault_records ORDER BY updated_at DESC, fault_id",
            FAULT_COLUMNS
        ))?;
        let rows = stmt.query_map([], fault_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Fault records with no strategy registered at all
    pub fn faults_without_strategy(&self) -> Result<Vec<FaultRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM fault_records f
            WHERE NOT EXISTS (
                SELECT 1 FROM remediation_strategies s WHERE s.fault_id = f.fault_id
            )
            ORDER BY updated_at DESC, fault_id
            "#,
            FAULT_COLUMNS
        ))?;
        let rows = stmt.query_map([], fault_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Always inserts; strategies for the same fault id are not deduplicated.
    pub fn add_strategy(
        &self,
        fault_id: &str,
        description: &str,
        remediation_source: &str,
        automated: bool,
    ) -> Result<i64> {
        let now = Utc::now();
        let conn = self.lock();
        conn.execute(
            r#"
            INSERT INTO remediation_strategies
                (fault_id, description, remediation_source, automated,
                 success_rate, execution_count, success_count, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, 0.0, 0, 0, ?5, ?5)
            "#,
            params![fault_id, description, remediation_source, automated, now],
        )?;
        let id = conn.last_insert_rowid();
        debug!(fault_id, strategy_id = id, automated, "Registered remediation strategy");
        Ok(id)
    }

    pub fn get_strategy(&self, strategy_id: i64) -> Result<Option<RemediationStrategy>> {
        let conn = self.lock();
        let strategy = conn
            .query_row(
                &format!(
                    "SELECT {} FROM remediation_strategies WHERE id = ?1",
                    STRATEGY_COLUMNS
                ),
                params![strategy_id],
                strategy_from_row,
            )
            .optional()?;
        Ok(strategy)
    }

    /// Every strategy for a fault id, best first
    pub fn strategies_for(&self, fault_id: &str) -> Result<Vec<RemediationStrategy>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM remediation_strategies
            WHERE fault_id = ?1
            ORDER BY success_rate DESC, execution_count DESC, id ASC
            "#,
            STRATEGY_COLUMNS
        ))?;
        let rows = stmt.query_map(params![fault_id], strategy_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Highest success rate, ties broken by highest execution count.
    /// Callers must still check `automated` before unattended execution.
    pub fn best_strategy(&self, fault_id: &str) -> Result<Option<RemediationStrategy>> {
        let conn = self.lock();
        let strategy = conn
            .query_row(
                &format!(
                    r#"
                    SELECT {} FROM remediation_strategies
                    WHERE fault_id = ?1
                    ORDER BY success_rate DESC, execution_count DESC, id ASC
                    LIMIT 1
                    "#,
                    STRATEGY_COLUMNS
                ),
                params![fault_id],
                strategy_from_row,
            )
            .optional()?;
        Ok(strategy)
    }

    /// Fold one binary outcome into a strategy's running success rate.
    pub fn record_strategy_outcome(&self, strategy_id: i64, success: bool) -> Result<RemediationStrategy> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let counts: Option<(i64, i64)> = tx
            .query_row(
                "SELECT execution_count, success_count FROM remediation_strategies WHERE id = ?1",
                params![strategy_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (execution_count, success_count) =
            counts.ok_or(MendError::StrategyNotFound(strategy_id))?;

        let execution_count = execution_count + 1;
        let success_count = success_count + i64::from(success);
        let success_rate = success_count as f64 / execution_count as f64;

        tx.execute(
            r#"
            UPDATE remediation_strategies
            SET success_rate = ?1, execution_count = ?2, success_count = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
            params![success_rate, execution_count, success_count, Utc::now(), strategy_id],
        )?;

        let strategy = tx.query_row(
            &format!(
                "SELECT {} FROM remediation_strategies WHERE id = ?1",
                STRATEGY_COLUMNS
            ),
            params![strategy_id],
            strategy_from_row,
        )?;
        tx.commit()?;

        Ok(strategy)
    }

    /// Strategy totals per fault id
    pub fn strategy_counts(&self) -> Result<HashMap<String, StrategyCount>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT fault_id, COUNT(*), SUM(automated)
            FROM remediation_strategies
            GROUP BY fault_id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                StrategyCount {
                    total: row.get::<_, i64>(1)? as u64,
                    automated: row.get::<_, Option<i64>>(2)?.unwrap_or(0) as u64,
                },
            ))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (fault_id, count) = row?;
            counts.insert(fault_id, count);
        }
        Ok(counts)
    }
}

fn fault_from_row(row: &Row<'_>) -> rusqlite::Result<FaultRecord> {
    let call_context: String = row.get(4)?;
    let call_context = serde_json::from_str(&call_context)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    let severity: String = row.get(6)?;

    Ok(FaultRecord {
        fault_id: row.get(0)?,
        fault_type: row.get(1)?,
        message: row.get(2)?,
        operation_name: row.get(3)?,
        call_context,
        root_cause: row.get(5)?,
        severity: Severity::parse(&severity).unwrap_or_default(),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn strategy_from_row(row: &Row<'_>) -> rusqlite::Result<RemediationStrategy> {
    Ok(RemediationStrategy {
        id: row.get(0)?,
        fault_id: row.get(1)?,
        description: row.get(2)?,
        remediation_source: row.get(3)?,
        automated: row.get(4)?,
        success_rate: row.get(5)?,
        execution_count: row.get::<_, i64>(6)? as u64,
        success_count: row.get::<_, i64>(7)? as u64,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use crate::fault::Fault;
    use std::thread;
    use std::time::Duration;

    fn classification(message: &str) -> Classification {
        let fault = Fault::new("KeyError", message).with_frames(vec![
            CallFrame::new("src/service.rs", 12, "handle"),
            CallFrame::new("src/profile.rs", 40, "load_profile").with_source_line("map[\"user\"]"),
        ]);
        Classifier::new().classify(&fault, "load_profile")
    }

    #[test]
    fn test_upsert_then_get_roundtrip() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let c = classification("'user'");

        let inserted = store.upsert_fault(&c).unwrap();
        let loaded = store.get_fault(&c.fault_id).unwrap().unwrap();

        assert_eq!(inserted, loaded);
        assert_eq!(loaded.fault_type, "KeyError");
        assert_eq!(loaded.message, "'user'");
        assert_eq!(loaded.operation_name, "load_profile");
        assert_eq!(loaded.call_context, c.call_context);
        assert_eq!(loaded.root_cause, c.root_cause);
        assert_eq!(loaded.severity, c.severity);
        assert_eq!(loaded.created_at, loaded.updated_at);
    }

    #[test]
    fn test_second_upsert_moves_updated_at_only() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let mut c = classification("'user'");
        let first = store.upsert_fault(&c).unwrap();

        thread::sleep(Duration::from_millis(5));
        c.root_cause = "Profile cache was not warmed.".to_string();
        let second = store.upsert_fault(&c).unwrap();

        let loaded = store.get_fault(&c.fault_id).unwrap().unwrap();
        assert_eq!(loaded, second);
        assert_eq!(loaded.root_cause, "Profile cache was not warmed.");
        assert_eq!(loaded.created_at, first.created_at);
        assert!(loaded.updated_at > first.updated_at);
    }

    #[test]
    fn test_get_missing_fault() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        assert!(store.get_fault("nope").unwrap().is_none());
    }

    #[test]
    fn test_success_rate_is_exact_mean() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let id = store.add_strategy("f1", "retry", "retry_fetch", true).unwrap();

        let outcomes = [true, false, false, true, true, false, true];
        for outcome in outcomes {
            store.record_strategy_outcome(id, outcome).unwrap();
        }

        let strategy = store.get_strategy(id).unwrap().unwrap();
        assert_eq!(strategy.execution_count, 7);
        assert_eq!(strategy.success_count, 4);
        assert_eq!(strategy.success_rate, 4.0 / 7.0);
    }

    #[test]
    fn test_record_outcome_unknown_strategy() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let err = store.record_strategy_outcome(99, true).unwrap_err();
        assert!(matches!(err, MendError::StrategyNotFound(99)));
    }

    #[test]
    fn test_best_strategy_selection() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        assert!(store.best_strategy("f1").unwrap().is_none());

        let low = store.add_strategy("f1", "low", "low", true).unwrap();
        let high_few = store.add_strategy("f1", "high, few runs", "a", true).unwrap();
        let high_many = store.add_strategy("f1", "high, many runs", "b", true).unwrap();
        store.add_strategy("f2", "other fault", "c", true).unwrap();

        store.record_strategy_outcome(low, false).unwrap();
        store.record_strategy_outcome(high_few, true).unwrap();
        store.record_strategy_outcome(high_many, true).unwrap();
        store.record_strategy_outcome(high_many, true).unwrap();

        let best = store.best_strategy("f1").unwrap().unwrap();
        assert_eq!(best.id, high_many);
        assert_eq!(best.success_rate, 1.0);
        assert_eq!(best.execution_count, 2);

        let all = store.strategies_for("f1").unwrap();
        assert_eq!(
            all.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![high_many, high_few, low]
        );
    }

    #[test]
    fn test_add_strategy_never_deduplicates() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let a = store.add_strategy("f1", "same", "same", false).unwrap();
        let b = store.add_strategy("f1", "same", "same", false).unwrap();
        assert_ne!(a, b);

        let counts = store.strategy_counts().unwrap();
        assert_eq!(counts["f1"], StrategyCount { total: 2, automated: 0 });
    }

    #[test]
    fn test_faults_without_strategy() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let covered = classification("'user'");
        let bare = classification("'account'");
        store.upsert_fault(&covered).unwrap();
        store.upsert_fault(&bare).unwrap();
        store.add_strategy(&covered.fault_id, "default user", "default_user", true).unwrap();

        let unfixed = store.faults_without_strategy().unwrap();
        assert_eq!(unfixed.len(), 1);
        assert_eq!(unfixed[0].fault_id, bare.fault_id);
        assert_eq!(store.list_faults().unwrap().len(), 2);
    }

    #[test]
    fn test_reopen_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("knowledge.db");
        let c = classification("'user'");

        {
            let store = KnowledgeStore::open_at(&path).unwrap();
            store.upsert_fault(&c).unwrap();
            store.add_strategy(&c.fault_id, "default user", "default_user", true).unwrap();
        }

        let readonly = KnowledgeStore::open_readonly(&path).unwrap();
        assert!(readonly.get_fault(&c.fault_id).unwrap().is_some());
        assert_eq!(readonly.strategies_for(&c.fault_id).unwrap().len(), 1);
        assert!(KnowledgeStore::open_readonly(dir.path().join("missing.db")).is_none());
    }
}
