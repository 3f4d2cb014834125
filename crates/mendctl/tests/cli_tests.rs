//! CLI integration tests for mendctl
//!
//! Each test seeds a scratch data directory through `FaultManager` and runs
//! the real binary against it via `$MEND_DATA_DIR`.

use mend_common::classifier::fingerprint;
use mend_common::{Fault, FaultManager, MendConfig};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn mendctl(data_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mendctl"))
        .args(args)
        .env("MEND_DATA_DIR", data_dir)
        .env_remove("MEND_CONFIG")
        .env("MEND_LOG", "off")
        .output()
        .expect("Failed to run mendctl")
}

fn json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "mendctl failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

/// Two faults on `parse`, one of them recurring and remediated.
fn seed(dir: &Path) -> (String, String) {
    let manager = FaultManager::open(MendConfig::with_data_dir(dir)).unwrap();
    let repeated = Fault::new("ValueError", "invalid literal");
    for _ in 0..6 {
        manager.classify(&repeated, "parse");
    }
    manager.classify(&Fault::new("PermissionError", "permission denied"), "parse");

    let repeated_id = fingerprint("ValueError", "invalid literal", "parse");
    let denied_id = fingerprint("PermissionError", "permission denied", "parse");
    manager
        .register_strategy(&repeated_id, "fall back to zero", "zero", true)
        .unwrap();
    (repeated_id, denied_id)
}

#[test]
fn test_recent_sorted_by_occurrences() {
    let dir = TempDir::new().unwrap();
    let (repeated_id, denied_id) = seed(dir.path());

    let out = json(&mendctl(dir.path(), &["--json", "recent"]));
    let faults = out.as_array().unwrap();
    assert_eq!(faults.len(), 2);
    assert_eq!(faults[0]["fault_id"], repeated_id.as_str());
    assert_eq!(faults[0]["occurrences"], 6);

    let out = json(&mendctl(dir.path(), &["recent", "--sort", "severity", "--limit", "1", "--json"]));
    let faults = out.as_array().unwrap();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0]["fault_id"], denied_id.as_str());
    assert_eq!(faults[0]["severity"], "critical");
}

#[test]
fn test_critical_and_unfixed() {
    let dir = TempDir::new().unwrap();
    let (repeated_id, denied_id) = seed(dir.path());

    let out = json(&mendctl(dir.path(), &["--json", "critical"]));
    let faults = out.as_array().unwrap();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0]["fault_id"], repeated_id.as_str());
    assert_eq!(faults[0]["automated_strategies"], 1);

    let out = json(&mendctl(dir.path(), &["--json", "critical", "--threshold", "1"]));
    assert_eq!(out.as_array().unwrap().len(), 2);

    let out = json(&mendctl(dir.path(), &["--json", "unfixed"]));
    let faults = out.as_array().unwrap();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0]["fault_id"], denied_id.as_str());
}

#[test]
fn test_health_strategies_and_summary() {
    let dir = TempDir::new().unwrap();
    let (repeated_id, _) = seed(dir.path());

    let out = json(&mendctl(dir.path(), &["--json", "health"]));
    assert_eq!(out[0]["operation"], "parse");
    // one critical, one medium
    assert_eq!(out[0]["score"], 75);

    let out = json(&mendctl(dir.path(), &["--json", "strategies", &repeated_id]));
    assert_eq!(out[0]["remediation_source"], "zero");
    assert_eq!(out[0]["automated"], true);

    let out = json(&mendctl(dir.path(), &["--json", "summary"]));
    assert_eq!(out["total_fault_types"], 2);
    assert_eq!(out["fault_pattern_counts"]["parse"], 2);
}

#[test]
fn test_export_writes_report() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());
    let target = dir.path().join("out").join("report.json");
    std::fs::create_dir_all(target.parent().unwrap()).unwrap();

    let output = mendctl(dir.path(), &["export", target.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Exported 2 fault(s)"));

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
    assert_eq!(report["faults"].as_array().unwrap().len(), 2);
    assert_eq!(report["operation_health"][0]["operation"], "parse");
}

#[test]
fn test_empty_data_dir() {
    let dir = TempDir::new().unwrap();
    let output = mendctl(dir.path(), &["recent"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No faults recorded."));
}

#[test]
fn test_bad_config_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("mend.toml");
    std::fs::write(&config, "critical_threshold = 0\n").unwrap();

    let output = mendctl(dir.path(), &["--config", config.to_str().unwrap(), "summary"]);
    assert!(!output.status.success());
}
