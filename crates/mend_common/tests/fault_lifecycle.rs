//! End-to-end fault lifecycle through `FaultManager`
//!
//! Wrapped operation -> classification -> stats + store -> remediation.

use mend_common::classifier::{fingerprint, Severity};
use mend_common::{Fault, FaultManager, MendConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn divide((dividend, divisor): (f64, f64)) -> Result<f64, Fault> {
    if divisor == 0.0 {
        return Err(Fault::new("ZeroDivisionError", "division by zero"));
    }
    Ok(dividend / divisor)
}

#[test]
fn test_division_fault_is_replaced_by_signed_infinity() {
    let dir = TempDir::new().unwrap();
    let manager = FaultManager::open(MendConfig::with_data_dir(dir.path())).unwrap();
    let op = manager.instrument("divide", divide);

    let fault_id = fingerprint("ZeroDivisionError", "division by zero", "divide");
    manager.register_remedy("signed_infinity", |(dividend, _): (f64, f64)| {
        Ok(if dividend.is_sign_negative() {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        })
    });
    let strategy_id = manager
        .register_strategy(&fault_id, "division by zero yields signed infinity", "signed_infinity", true)
        .unwrap();

    assert_eq!(op.call((6.0, 3.0)).unwrap(), 2.0);
    assert_eq!(op.call((1.0, 0.0)).unwrap(), f64::INFINITY);
    assert_eq!(op.call((-1.0, 0.0)).unwrap(), f64::NEG_INFINITY);

    let strategy = manager.store().get_strategy(strategy_id).unwrap().unwrap();
    assert_eq!(strategy.execution_count, 2);
    assert_eq!(strategy.success_count, 2);
    assert_eq!(strategy.success_rate, 1.0);

    let entry = manager.stats().get(&fault_id).unwrap();
    assert_eq!(entry.occurrences, 2);
    assert_eq!(entry.fix_attempts, 2);
    assert_eq!(entry.successful_fixes, 2);
}

#[test]
fn test_unremediated_fault_is_returned_unchanged() {
    let manager = FaultManager::in_memory(MendConfig::default()).unwrap();
    let op = manager.instrument("divide", divide);
    let fault_id = fingerprint("ZeroDivisionError", "division by zero", "divide");

    let err = op.call((1.0, 0.0)).unwrap_err();
    assert_eq!(err.fault_type, "ZeroDivisionError");
    assert_eq!(err.message, "division by zero");
    assert_eq!(manager.stats().get(&fault_id).unwrap().occurrences, 1);

    op.call((1.0, 0.0)).unwrap_err();
    assert_eq!(manager.stats().get(&fault_id).unwrap().occurrences, 2);
}

#[test]
fn test_same_fault_across_operations() {
    let manager = FaultManager::in_memory(MendConfig::default()).unwrap();
    let fault = Fault::new("TimeoutError", "upstream timed out");

    let first = manager.classify(&fault, "fetch_profile");
    manager.classify(&fault, "fetch_profile");
    let other = manager.classify(&fault, "fetch_orders");

    // operation name is part of the fingerprint
    assert_ne!(first.fault_id, other.fault_id);

    let stats = manager.stats();
    stats
        .record_occurrence(&first.fault_id, "fetch_orders", Severity::Medium, None)
        .unwrap();

    let entry = stats.get(&first.fault_id).unwrap();
    assert_eq!(entry.occurrences, 3);
    assert_eq!(
        entry.modules_affected.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["fetch_orders", "fetch_profile"]
    );
}

#[test]
fn test_manual_strategy_is_never_invoked() {
    let manager = FaultManager::in_memory(MendConfig::default()).unwrap();
    let op = manager.instrument("divide", divide);
    let fault_id = fingerprint("ZeroDivisionError", "division by zero", "divide");

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    manager.register_remedy("zero", move |_: (f64, f64)| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(0.0)
    });
    let manual = manager
        .register_strategy(&fault_id, "ask an operator", "zero", false)
        .unwrap();
    // give the manual strategy the best possible record
    for _ in 0..3 {
        manager.store().record_strategy_outcome(manual, true).unwrap();
    }

    assert!(op.call((4.0, 0.0)).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(manager.store().get_strategy(manual).unwrap().unwrap().execution_count, 3);
}

#[test]
fn test_failing_remedy_surfaces_original_fault() {
    let manager = FaultManager::in_memory(MendConfig::default()).unwrap();
    let op = manager.instrument("divide", divide);
    let fault_id = fingerprint("ZeroDivisionError", "division by zero", "divide");

    manager.register_remedy("broken", |_: (f64, f64)| -> anyhow::Result<f64> {
        anyhow::bail!("remedy cannot handle this")
    });
    let id = manager.register_strategy(&fault_id, "broken", "broken", true).unwrap();

    let err = op.call((1.0, 0.0)).unwrap_err();
    assert_eq!(err.fault_type, "ZeroDivisionError");

    let strategy = manager.store().get_strategy(id).unwrap().unwrap();
    assert_eq!(strategy.execution_count, 1);
    assert_eq!(strategy.success_rate, 0.0);
}

#[test]
fn test_unregistered_remedy_counts_as_failed_attempt() {
    let manager = FaultManager::in_memory(MendConfig::default()).unwrap();
    let op = manager.instrument("divide", divide);
    let fault_id = fingerprint("ZeroDivisionError", "division by zero", "divide");

    let id = manager
        .register_strategy(&fault_id, "never registered", "missing_remedy", true)
        .unwrap();

    assert!(op.call((1.0, 0.0)).is_err());
    let strategy = manager.store().get_strategy(id).unwrap().unwrap();
    assert_eq!(strategy.execution_count, 1);
    assert_eq!(strategy.success_count, 0);
}

#[test]
fn test_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = MendConfig::with_data_dir(dir.path());
    let fault_id = fingerprint("ZeroDivisionError", "division by zero", "divide");

    {
        let manager = FaultManager::open(config.clone()).unwrap();
        let op = manager.instrument("divide", divide);
        op.call((1.0, 0.0)).unwrap_err();
        manager
            .register_strategy(&fault_id, "signed infinity", "signed_infinity", true)
            .unwrap();
    }

    let manager = FaultManager::open(config).unwrap();
    assert_eq!(manager.stats().get(&fault_id).unwrap().occurrences, 1);
    let best = manager.store().best_strategy(&fault_id).unwrap().unwrap();
    assert_eq!(best.remediation_source, "signed_infinity");

    let snapshot = manager.snapshot_report();
    assert_eq!(snapshot.total_fault_types, 1);
    assert_eq!(snapshot.fault_pattern_counts["divide"], 1);
}

#[test]
fn test_fingerprint_is_deterministic_and_verbatim() {
    let manager = FaultManager::in_memory(MendConfig::default()).unwrap();
    let a = manager.classify(&Fault::new("KeyError", "user 17"), "load");
    let b = manager.classify(&Fault::new("KeyError", "user 17"), "load");
    let c = manager.classify(&Fault::new("KeyError", "user 18"), "load");

    assert_eq!(a.fault_id, b.fault_id);
    // messages are hashed as-is, variable data is not normalised away
    assert_ne!(a.fault_id, c.fault_id);
    assert_eq!(a.fault_id, fingerprint("KeyError", "user 17", "load"));
}
