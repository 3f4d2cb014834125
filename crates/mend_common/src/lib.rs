//! Mend Common - Adaptive fault management
//!
//! Intercepts faults raised by instrumented operations, fingerprints and
//! classifies them, persists what it learns and replays registered remedies.
//!
//! - `classifier`: fingerprint, severity and root-cause heuristics
//! - `stats`: in-memory counters with a JSON snapshot
//! - `knowledge`: SQLite store of fault records and remediation strategies
//! - `remediation`: typed remedy registry and executor
//! - `instrument` / `middleware`: the call sites that feed everything else
//! - `report`: read-only queries for the CLI and health endpoints

pub mod atomic_write;
pub mod classifier;
pub mod config;
pub mod error;
pub mod fault;
pub mod instrument;
pub mod knowledge;
pub mod logging;
pub mod manager;
pub mod middleware;
pub mod remediation;
pub mod report;
pub mod stats;

pub use classifier::{Classification, Classifier, Severity};
pub use config::MendConfig;
pub use error::{MendError, Result};
pub use fault::{CallFrame, Fault, FaultSource};
pub use instrument::{Instrumented, InstrumentedComponent, Monitored};
pub use knowledge::{FaultRecord, KnowledgeStore, RemediationStrategy};
pub use manager::FaultManager;
pub use middleware::{
    health_routes, monitor_requests, RequestMonitor, RouteStats, StrategyProposal, StrategyProposer,
};
pub use remediation::{PreparedRemedy, RemediationExecutor, RemediationRegistry, RemedyFn};
pub use report::{FaultSummary, FullReport, OperationHealth, Reporter, SnapshotReport, SortKey};
pub use stats::{StatsAggregator, StatsEntry};
