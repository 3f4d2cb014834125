//! Fault model
//!
//! Anything an instrumented operation can fail with implements [`FaultSource`]:
//! a type name, a message and (optionally) the call frames that led to it.
//! [`Fault`] is the crate's own concrete fault; `std::io::Error` and
//! `anyhow::Error` are supported out of the box.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::Location;

/// Fault type assigned to panics caught by the operation wrapper.
pub const PANIC_FAULT_TYPE: &str = "Panic";

/// One frame of the call context, outermost-to-innermost order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFrame {
    pub file: String,
    pub line: u32,
    /// Enclosing operation (function) name
    pub function: String,
    /// Source text of the line, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_line: Option<String>,
}

impl CallFrame {
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
            source_line: None,
        }
    }

    pub fn with_source_line(mut self, source: impl Into<String>) -> Self {
        self.source_line = Some(source.into());
        self
    }
}

/// Something that can be fingerprinted and classified.
pub trait FaultSource {
    /// Type name of the fault (e.g. `ZeroDivisionError`, `NotFound`)
    fn fault_type(&self) -> String;

    /// Human-readable message, hashed verbatim into the fingerprint
    fn fault_message(&self) -> String;

    /// Captured call frames, outermost first
    fn frames(&self) -> Vec<CallFrame> {
        Vec::new()
    }
}

/// A concrete, cloneable fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub fault_type: String,
    pub message: String,
    #[serde(default)]
    pub frames: Vec<CallFrame>,
}

impl Fault {
    /// Create a fault, recording the caller's location as its only frame.
    #[track_caller]
    pub fn new(fault_type: impl Into<String>, message: impl Into<String>) -> Self {
        let location = Location::caller();
        Self {
            fault_type: fault_type.into(),
            message: message.into(),
            frames: vec![CallFrame::new(location.file(), location.line(), "<unknown>")],
        }
    }

    /// Replace the captured frames with a full call context.
    pub fn with_frames(mut self, frames: Vec<CallFrame>) -> Self {
        self.frames = frames;
        self
    }

    /// Append an innermost frame.
    pub fn with_frame(mut self, frame: CallFrame) -> Self {
        self.frames.push(frame);
        self
    }

    /// Build a fault from a caught panic payload.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_string()
        };

        Self {
            fault_type: PANIC_FAULT_TYPE.to_string(),
            message,
            frames: Vec::new(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.fault_type, self.message)
    }
}

impl std::error::Error for Fault {}

impl FaultSource for Fault {
    fn fault_type(&self) -> String {
        self.fault_type.clone()
    }

    fn fault_message(&self) -> String {
        self.message.clone()
    }

    fn frames(&self) -> Vec<CallFrame> {
        self.frames.clone()
    }
}

impl FaultSource for std::io::Error {
    fn fault_type(&self) -> String {
        format!("{:?}", self.kind())
    }

    fn fault_message(&self) -> String {
        self.to_string()
    }
}

impl FaultSource for anyhow::Error {
    fn fault_type(&self) -> String {
        if let Some(fault) = self.chain().find_map(|e| e.downcast_ref::<Fault>()) {
            return fault.fault_type();
        }
        if let Some(io) = self.chain().find_map(|e| e.downcast_ref::<std::io::Error>()) {
            return FaultSource::fault_type(io);
        }
        "Error".to_string()
    }

    fn fault_message(&self) -> String {
        if let Some(fault) = self.chain().find_map(|e| e.downcast_ref::<Fault>()) {
            return fault.fault_message();
        }
        self.to_string()
    }

    fn frames(&self) -> Vec<CallFrame> {
        self.chain()
            .find_map(|e| e.downcast_ref::<Fault>())
            .map(|fault| fault.frames.clone())
            .unwrap_or_default()
    }
}
