//! Request monitoring middleware
//!
//! Times every request per route and treats 5xx responses as faults.

use axum::{
    extract::{MatchedPath, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::fault::Fault;
use crate::knowledge::FaultRecord;
use crate::manager::FaultManager;
use crate::report::SnapshotReport;

/// Fault type used for 5xx responses that carry no [`Fault`]
pub const HTTP_SERVER_ERROR: &str = "HttpServerError";

/// Route key path for requests no route matched
pub const UNMATCHED_ROUTE: &str = "<unmatched>";

/// Timing and fault counters for one route
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouteStats {
    pub count: u64,
    pub total_secs: f64,
    pub min_secs: f64,
    pub max_secs: f64,
    pub avg_secs: f64,
    pub faults: u64,
}

impl RouteStats {
    fn observe(&mut self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        if self.count == 0 || secs < self.min_secs {
            self.min_secs = secs;
        }
        if secs > self.max_secs {
            self.max_secs = secs;
        }
        self.count += 1;
        self.total_secs += secs;
        self.avg_secs = self.total_secs / self.count as f64;
    }
}

/// A strategy to register for a fault that has none
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyProposal {
    pub description: String,
    pub remediation_key: String,
    pub automated: bool,
}

/// Suggests remediation for faults seen on request paths.
pub trait StrategyProposer: Send + Sync {
    fn propose(&self, fault: &FaultRecord) -> Option<StrategyProposal>;
}

/// Shared state for [`monitor_requests`]
#[derive(Clone)]
pub struct RequestMonitor {
    manager: Arc<FaultManager>,
    routes: Arc<Mutex<HashMap<String, RouteStats>>>,
    proposer: Option<Arc<dyn StrategyProposer>>,
}

impl RequestMonitor {
    pub fn new(manager: Arc<FaultManager>) -> Self {
        Self {
            manager,
            routes: Arc::new(Mutex::new(HashMap::new())),
            proposer: None,
        }
    }

    pub fn with_proposer(mut self, proposer: Arc<dyn StrategyProposer>) -> Self {
        self.proposer = Some(proposer);
        self
    }

    /// Install the middleware on every route of `router`.
    pub fn apply<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(self.clone(), monitor_requests))
    }

    /// Copy of all route counters
    pub fn route_stats(&self) -> HashMap<String, RouteStats> {
        self.lock().clone()
    }

    pub fn route(&self, key: &str) -> Option<RouteStats> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RouteStats>> {
        self.routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn observe(&self, route: &str, elapsed: Duration, faulted: bool) {
        let mut routes = self.lock();
        let stats = routes.entry(route.to_string()).or_default();
        stats.observe(elapsed);
        if faulted {
            stats.faults += 1;
        }
    }

    fn handle_fault(&self, route: &str, fault: &Fault) {
        let classification = self.manager.classify(fault, route);
        let Some(proposer) = &self.proposer else {
            return;
        };

        let store = self.manager.store();
        match store.strategies_for(&classification.fault_id) {
            Ok(existing) if existing.is_empty() => {}
            Ok(_) => return,
            Err(e) => {
                warn!(fault_id = %classification.fault_id, error = %e, "Failed to look up strategies");
                return;
            }
        }

        let record = match store.get_fault(&classification.fault_id) {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                warn!(fault_id = %classification.fault_id, error = %e, "Failed to load fault record");
                return;
            }
        };

        if let Some(proposal) = proposer.propose(&record) {
            match self.manager.register_strategy(
                &record.fault_id,
                &proposal.description,
                &proposal.remediation_key,
                proposal.automated,
            ) {
                Ok(id) => info!(
                    fault_id = %record.fault_id,
                    strategy_id = id,
                    route,
                    "Registered proposed strategy"
                ),
                Err(e) => warn!(fault_id = %record.fault_id, error = %e, "Failed to register proposed strategy"),
            }
        }
    }
}

/// Record timing for the matched route; classify server errors.
pub async fn monitor_requests(
    State(monitor): State<RequestMonitor>,
    request: Request,
    next: Next,
) -> Response {
    // All unmatched requests share one key
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str())
        .unwrap_or(UNMATCHED_ROUTE);
    let route = format!("{} {}", request.method(), path);

    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed = started.elapsed();

    let status = response.status();
    let faulted = status.is_server_error();
    monitor.observe(&route, elapsed, faulted);

    if elapsed > monitor.manager.config().slow_call_threshold() {
        warn!(route = %route, elapsed_ms = elapsed.as_millis() as u64, "Slow request");
    }

    if faulted {
        let fault = response
            .extensions()
            .get::<Fault>()
            .cloned()
            .unwrap_or_else(|| Fault::new(HTTP_SERVER_ERROR, status.to_string()));

        debug!(route = %route, status = status.as_u16(), fault_type = %fault.fault_type, "Server error");
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| monitor.handle_fault(&route, &fault))) {
            warn!(
                route = %route,
                panic = %Fault::from_panic(payload.as_ref()).message,
                "Fault handling panicked"
            );
        }
    }

    response
}

impl IntoResponse for Fault {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.fault_type,
            "message": self.message,
        }));
        let mut response = (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

async fn fault_health(State(manager): State<Arc<FaultManager>>) -> Json<SnapshotReport> {
    Json(manager.snapshot_report())
}

/// `GET /health/faults`
pub fn health_routes(manager: Arc<FaultManager>) -> Router {
    Router::new()
        .route("/health/faults", get(fault_health))
        .with_state(manager)
}
