//! Fingerprint & Classifier
//!
//! Turns a raised fault plus the name of the operation that raised it into:
//! - a stable fault id (sha256 of `"{type}:{message}:{operation}"`)
//! - a severity from ordered rules (first match wins)
//! - a root-cause text assembled from every matching heuristic
//!
//! Messages are hashed verbatim. Faults whose messages embed variable data
//! (ids, paths, counts) get distinct fingerprints.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::fault::{CallFrame, FaultSource};

/// Root cause used when no heuristic matches
pub const UNKNOWN_ROOT_CAUSE: &str = "Unknown cause, further analysis required.";

/// Resource exhaustion, process termination and interrupt faults
const CRITICAL_FAULT_TYPES: &[&str] = &[
    // resource exhaustion
    "memoryerror",
    "outofmemory",
    "resourceexhausted",
    "storagefull",
    // process termination
    "systemexit",
    "processexit",
    "aborted",
    "terminated",
    // interrupt
    "keyboardinterrupt",
    "interrupted",
];

/// Canned explanations keyed by fault type (aliases share an entry)
const TYPE_CAUSES: &[(&[&str], &str)] = &[
    (
        &["indexerror", "indexoutofbounds"],
        "Attempted to access an index outside the bounds of a sequence.",
    ),
    (
        &["keyerror", "missingkey"],
        "Attempted to access a key that does not exist in a mapping.",
    ),
    (
        &["zerodivisionerror", "divisionbyzero"],
        "Attempted to divide by zero.",
    ),
    (
        &["filenotfounderror", "notfound"],
        "Attempted to access a file or resource that does not exist.",
    ),
    (
        &["permissionerror", "permissiondenied"],
        "Insufficient permissions to access a resource.",
    ),
    (
        &["timeouterror", "timedout"],
        "Operation timed out before completing.",
    ),
    (
        &["connectionrefusederror", "connectionrefused"],
        "Connection to a remote service was refused.",
    ),
];

/// Substring checks on the lowercased message
const MESSAGE_CAUSES: &[(&[&str], &str)] = &[
    (
        &["division by zero", "divide by zero"],
        "Division by zero detected in a calculation.",
    ),
    (
        &["nonetype", "`none` value", "null pointer", "null reference"],
        "Attempted to use a missing (null) value.",
    ),
    (
        &["json", "decode", "malformed"],
        "Malformed or unparseable payload.",
    ),
    (
        &["timeout", "timed out"],
        "Operation exceeded its time limit.",
    ),
    (
        &["already exists", "duplicate"],
        "Attempted to create a resource that already exists.",
    ),
    (
        &["not found", "does not exist", "no such"],
        "Referenced resource was not found.",
    ),
];

/// File-name tokens hinting at the layer a frame belongs to
const STACK_CAUSES: &[(&[&str], &str)] = &[
    (
        &["http", "net", "network", "socket", "client", "request", "api"],
        "Possible network communication issue.",
    ),
    (
        &["db", "database", "sql", "sqlite", "store", "repository", "orm"],
        "Possible database or persistence issue.",
    ),
    (
        &["fs", "file", "files", "io", "storage"],
        "Possible file system access issue.",
    ),
];

/// Coarse priority rating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    #[default]
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            "unknown" => Some(Severity::Unknown),
            _ => None,
        }
    }

    /// Sort rank, most severe first
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
            Severity::Unknown => 4,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub fault_id: String,
    pub fault_type: String,
    pub message: String,
    pub operation_name: String,
    pub severity: Severity,
    pub root_cause: String,
    pub call_context: Vec<CallFrame>,
}

/// Stateless fault analyzer
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier;

impl Classifier {
    pub fn new() -> Self {
        Self
    }

    /// Analyze a fault raised by `operation_name`. Pure: no side effects.
    pub fn classify<F: FaultSource + ?Sized>(&self, fault: &F, operation_name: &str) -> Classification {
        let fault_type = fault.fault_type();
        let message = fault.fault_message();
        let frames = fault.frames();

        Classification {
            fault_id: fingerprint(&fault_type, &message, operation_name),
            severity: severity_for(&fault_type, &message),
            root_cause: root_cause_for(&fault_type, &message, &frames),
            fault_type,
            message,
            operation_name: operation_name.to_string(),
            call_context: frames,
        }
    }
}

/// Deterministic fault id for a (type, message, operation) triple.
pub fn fingerprint(fault_type: &str, message: &str, operation_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", fault_type, message, operation_name).as_bytes());
    hex::encode(hasher.finalize())
}

/// Ordered severity rules, first match wins.
pub fn severity_for(fault_type: &str, message: &str) -> Severity {
    if is_critical_type(fault_type) {
        return Severity::Critical;
    }

    let lower = message.to_lowercase();

    if lower.contains("security") || lower.contains("permission") {
        return Severity::Critical;
    }

    if lower.contains("database") || lower.contains("sql") {
        return Severity::High;
    }

    if lower.contains("api") || lower.contains("http") {
        return Severity::High;
    }

    Severity::Medium
}

/// True for resource exhaustion, process termination and interrupt faults.
pub fn is_critical_type(fault_type: &str) -> bool {
    let normalized = normalize_type(fault_type);
    CRITICAL_FAULT_TYPES.contains(&normalized.as_str())
}

/// Concatenate every matching heuristic: type table, message checks, stack checks.
pub fn root_cause_for(fault_type: &str, message: &str, frames: &[CallFrame]) -> String {
    let mut causes: Vec<&str> = Vec::new();

    let normalized = normalize_type(fault_type);
    for (aliases, cause) in TYPE_CAUSES {
        if aliases.contains(&normalized.as_str()) {
            causes.push(cause);
        }
    }

    let lower = message.to_lowercase();
    for (needles, cause) in MESSAGE_CAUSES {
        if needles.iter().any(|n| lower.contains(n)) {
            causes.push(cause);
        }
    }

    let tokens: Vec<String> = frames.iter().flat_map(|f| file_tokens(&f.file)).collect();
    for (keywords, cause) in STACK_CAUSES {
        if tokens.iter().any(|t| keywords.contains(&t.as_str())) {
            causes.push(cause);
        }
    }

    if causes.is_empty() {
        UNKNOWN_ROOT_CAUSE.to_string()
    } else {
        causes.join(" ")
    }
}

/// Lowercase the final path segment of a type name (`std::io::Error` -> `error`).
fn normalize_type(fault_type: &str) -> String {
    fault_type
        .rsplit(|c| c == ':' || c == '.')
        .next()
        .unwrap_or(fault_type)
        .to_lowercase()
}

/// Split a file path into lowercase alphanumeric tokens.
fn file_tokens(file: &str) -> Vec<String> {
    file.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::Fault;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fingerprint("KeyError", "'user'", "load_profile");
        let b = fingerprint("KeyError", "'user'", "load_profile");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        assert_ne!(a, fingerprint("KeyError", "'user'", "save_profile"));
        assert_ne!(a, fingerprint("KeyError", "'account'", "load_profile"));
    }

    #[test]
    fn test_variable_messages_do_not_coalesce() {
        let a = fingerprint("NotFound", "user 17 not found", "get_user");
        let b = fingerprint("NotFound", "user 18 not found", "get_user");
        assert_ne!(a, b);
    }

    #[test]
    fn test_critical_types_win_regardless_of_message() {
        for fault_type in CRITICAL_FAULT_TYPES {
            assert!(is_critical_type(fault_type), "{} should be critical", fault_type);
            assert_eq!(severity_for(fault_type, "harmless text"), Severity::Critical);
            assert_eq!(
                severity_for(&fault_type.to_uppercase(), "harmless text"),
                Severity::Critical
            );
        }

        for fault_type in [
            "MemoryError",
            "OutOfMemory",
            "ResourceExhausted",
            "StorageFull",
            "SystemExit",
            "ProcessExit",
            "Terminated",
            "KeyboardInterrupt",
            "Interrupted",
            "std::io::Aborted",
        ] {
            assert_eq!(
                severity_for(fault_type, "harmless text"),
                Severity::Critical,
                "{} should be critical",
                fault_type
            );
        }
    }

    #[test]
    fn test_severity_rule_order() {
        assert_eq!(severity_for("ValueError", "Permission denied"), Severity::Critical);
        assert_eq!(severity_for("ValueError", "security token expired"), Severity::Critical);
        assert_eq!(severity_for("ValueError", "database is locked"), Severity::High);
        assert_eq!(severity_for("ValueError", "bad SQL near SELECT"), Severity::High);
        assert_eq!(severity_for("ValueError", "upstream API returned 502"), Severity::High);
        assert_eq!(severity_for("ValueError", "HTTP status 500"), Severity::High);
        assert_eq!(severity_for("ValueError", "bad input"), Severity::Medium);
        // permission beats database
        assert_eq!(
            severity_for("ValueError", "database permission missing"),
            Severity::Critical
        );
    }

    #[test]
    fn test_root_cause_concatenates_matches() {
        let cause = root_cause_for("ZeroDivisionError", "division by zero", &[]);
        assert_eq!(
            cause,
            "Attempted to divide by zero. Division by zero detected in a calculation."
        );
    }

    #[test]
    fn test_root_cause_stack_heuristics() {
        let frames = vec![
            CallFrame::new("src/handlers/http_client.rs", 10, "fetch"),
            CallFrame::new("src/db/repository.rs", 44, "load"),
            CallFrame::new("src/db/sqlite_pool.rs", 90, "acquire"),
        ];
        let cause = root_cause_for("Custom", "weird", &frames);
        assert_eq!(
            cause,
            "Possible network communication issue. Possible database or persistence issue."
        );
    }

    #[test]
    fn test_root_cause_file_system_frames() {
        let expected = "Possible file system access issue.";
        for file in ["src/fs/walk.rs", "src/file_cache.rs", "src/io.rs", "lib/storage/blob.rs"] {
            let frames = vec![CallFrame::new(file, 1, "read")];
            assert_eq!(root_cause_for("Custom", "weird", &frames), expected, "{}", file);
        }

        // file frames add to the type cause
        let frames = vec![CallFrame::new("src/storage/disk.rs", 12, "open")];
        assert_eq!(
            root_cause_for("FileNotFoundError", "config missing", &frames),
            "Attempted to access a file or resource that does not exist. Possible file system access issue."
        );
    }

    #[test]
    fn test_root_cause_ignores_substrings_inside_tokens() {
        // "actions" contains "io" but is not an io token
        let frames = vec![CallFrame::new("src/actions.rs", 3, "run")];
        assert_eq!(root_cause_for("Custom", "weird", &frames), UNKNOWN_ROOT_CAUSE);
    }

    #[test]
    fn test_classify_carries_all_fields() {
        let fault = Fault::new("TimedOut", "request timed out after 30s");
        let c = Classifier::new().classify(&fault, "fetch_report");

        assert_eq!(c.fault_id, fingerprint("TimedOut", "request timed out after 30s", "fetch_report"));
        assert_eq!(c.severity, Severity::Medium);
        assert!(c.root_cause.starts_with("Operation timed out before completing."));
        assert!(c.root_cause.contains("Operation exceeded its time limit."));
        assert_eq!(c.call_context.len(), 1);
        assert_eq!(c.operation_name, "fetch_report");
    }

    #[test]
    fn test_severity_parse_roundtrip_and_rank() {
        for s in [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Unknown,
        ] {
            assert_eq!(Severity::parse(s.as_str()), Some(s));
        }
        assert_eq!(Severity::parse("bogus"), None);
        assert!(Severity::Critical.rank() < Severity::Low.rank());
    }
}
