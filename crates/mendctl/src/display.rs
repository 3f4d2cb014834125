//! Display helpers for mendctl output.
//!
//! Plain ASCII; colour only marks severity and health.

use mend_common::classifier::Severity;
use mend_common::knowledge::{FaultRecord, RemediationStrategy};
use mend_common::report::{FaultSummary, OperationHealth, SnapshotReport};
use mend_common::MendConfig;
use owo_colors::OwoColorize;
use std::path::Path;

const HR: &str = "------------------------------------------------------------";

/// Key width for key/value lines
const KW: usize = 18;

fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", HR.dimmed());
}

fn print_kv(key: &str, value: &str) {
    println!("{:width$} {}", key, value, width = KW);
}

pub fn severity_label(severity: Severity) -> String {
    let label = format!("{:8}", severity.as_str());
    match severity {
        Severity::Critical => label.bright_red().bold().to_string(),
        Severity::High => label.red().to_string(),
        Severity::Medium => label.yellow().to_string(),
        Severity::Low => label.green().to_string(),
        Severity::Unknown => label.dimmed().to_string(),
    }
}

fn health_label(score: u32) -> String {
    let label = format!("{:>3}", score);
    if score >= 80 {
        label.bright_green().to_string()
    } else if score >= 50 {
        label.yellow().to_string()
    } else {
        label.bright_red().to_string()
    }
}

/// First 12 hex chars are enough to tell faults apart on screen
pub fn short_id(fault_id: &str) -> &str {
    fault_id.get(..12).unwrap_or(fault_id)
}

pub fn print_fault_table(title: &str, faults: &[FaultSummary]) {
    header(title);
    if faults.is_empty() {
        println!("{}", "No faults recorded.".dimmed());
        return;
    }

    for fault in faults {
        let last = fault
            .last_occurrence
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {}  {:>5}x  fixes {}/{}  {}",
            short_id(&fault.fault_id),
            severity_label(fault.severity),
            fault.occurrences,
            fault.successful_fixes,
            fault.fix_attempts,
            last.dimmed()
        );
        println!(
            "    {}: {}  [{}]",
            fault.fault_type, fault.message, fault.operation_name
        );
    }
}

pub fn print_critical(faults: &[FaultSummary], threshold: u64) {
    header(&format!("Critical faults (threshold {})", threshold));
    if faults.is_empty() {
        println!("{}", "[OK] No critical faults.".bright_green());
        return;
    }

    for fault in faults {
        let remedy = if fault.remediation_available() {
            "[REMEDY]".bright_green().to_string()
        } else {
            "[NO REMEDY]".bright_red().to_string()
        };
        println!(
            "{}  {}  {:>5}x  {}",
            short_id(&fault.fault_id),
            severity_label(fault.severity),
            fault.occurrences,
            remedy
        );
        println!("    {}: {}", fault.fault_type, fault.message);
        if !fault.root_cause.is_empty() {
            println!("    cause: {}", fault.root_cause.dimmed());
        }
    }
}

pub fn print_health(health: &[OperationHealth]) {
    header("Operation health");
    if health.is_empty() {
        println!("{}", "No operations have faulted.".dimmed());
        return;
    }

    for op in health {
        println!(
            "{}  {:32}  critical {}  high {}  medium {}  low {}",
            health_label(op.score),
            op.operation,
            op.critical,
            op.high,
            op.medium,
            op.low
        );
    }
}

pub fn print_strategies(fault_id: &str, fault: Option<&FaultRecord>, strategies: &[RemediationStrategy]) {
    header(&format!("Strategies for {}", short_id(fault_id)));
    if let Some(fault) = fault {
        print_kv("fault", &format!("{}: {}", fault.fault_type, fault.message));
        print_kv("operation", &fault.operation_name);
        print_kv("severity", &severity_label(fault.severity));
        println!();
    }

    if strategies.is_empty() {
        println!("{}", "No strategies registered.".dimmed());
        return;
    }

    for s in strategies {
        let mode = if s.automated { "auto" } else { "manual" };
        println!(
            "#{:<4} {:6}  {:>5.1}%  ({}/{})  {}",
            s.id,
            mode,
            s.success_rate * 100.0,
            s.success_count,
            s.execution_count,
            s.description
        );
        println!("      remedy: {}", s.remediation_source.dimmed());
    }
}

pub fn print_summary(snapshot: &SnapshotReport, config: &MendConfig) {
    header("Fault summary");
    print_kv("data_dir", &config.data_dir.display().to_string());
    print_kv("fault types", &snapshot.total_fault_types.to_string());
    print_kv("critical", &snapshot.critical_faults.len().to_string());

    for id in &snapshot.critical_faults {
        println!("  {} {}", "!".bright_red(), short_id(id));
    }

    if !snapshot.fault_pattern_counts.is_empty() {
        println!();
        println!("{}", "Faults per operation".bold());
        for (operation, count) in &snapshot.fault_pattern_counts {
            print_kv(&format!("  {}", operation), &count.to_string());
        }
    }
}

pub fn print_exported(path: &Path, faults: usize) {
    println!(
        "{} Exported {} fault(s) to {}",
        "[OK]".bright_green(),
        faults,
        path.display()
    );
}
