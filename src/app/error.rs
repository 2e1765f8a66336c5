use serde::Serialize;
use std::fmt;

pub const ERR_VALIDATION: &str = "ERR_VALIDATION";
pub const ERR_DEPENDENCY: &str = "ERR_DEPENDENCY";
pub const ERR_SYSTEM: &str = "ERR_SYSTEM";
pub const ERR_TRANSPORT_UNAVAILABLE: &str = "ERR_TRANSPORT_UNAVAILABLE";
pub const ERR_DEVICE_NOT_FOUND: &str = "ERR_DEVICE_NOT_FOUND";
pub const ERR_COMMAND_FAILED: &str = "ERR_COMMAND_FAILED";

const SNIPPET_MAX_CHARS: usize = 240;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_VALIDATION, message, trace_id)
    }

    pub fn dependency(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_DEPENDENCY, message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_SYSTEM, message, trace_id)
    }

    pub fn transport_unavailable(trace_id: impl Into<String>) -> Self {
        Self::new(
            ERR_TRANSPORT_UNAVAILABLE,
            "Device client is not initialized",
            trace_id,
        )
    }

    pub fn device_not_found(serial: &str, trace_id: impl Into<String>) -> Self {
        Self::new(
            ERR_DEVICE_NOT_FOUND,
            format!("Device {serial} is not connected"),
            trace_id,
        )
    }

    /// `detail` is usually raw adb output; only a bounded snippet is kept.
    pub fn command_failed(context: &str, detail: &str, trace_id: impl Into<String>) -> Self {
        Self::new(
            ERR_COMMAND_FAILED,
            format!("{context} failed: {}", snippet(detail)),
            trace_id,
        )
    }

    pub fn is_device_not_found(&self) -> bool {
        self.code == ERR_DEVICE_NOT_FOUND
    }
}

fn snippet(detail: &str) -> String {
    let trimmed = detail.trim();
    if trimmed.is_empty() {
        return "no output".to_string();
    }
    if trimmed.chars().count() <= SNIPPET_MAX_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(SNIPPET_MAX_CHARS).collect();
    cut.push_str("...");
    cut
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}
