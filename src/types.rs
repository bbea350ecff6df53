//! Tool-surface payload types.
//!
//! These are the structs the transport layer serializes back to callers.
//! Internal state types live in their owning modules.

use serde::{Deserialize, Serialize};

/// Result of a Python execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythonOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Printable representation of the value the code evaluated to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PythonOutcome {
    /// A failure with no captured output, e.g. when the worker never ran.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Result of a bash execution. Bash results always return, even on failure;
/// user-code failure is a non-zero `exit_code`, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BashOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl BashOutcome {
    /// An engine-level failure surfaced in bash result form.
    pub fn engine_failure(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            exit_code: 1,
        }
    }
}

/// One entry returned by `list_files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
}

/// Cap a captured output stream at `max_bytes`, truncating on a char
/// boundary and appending a marker with the original length. Results go
/// back to an agent over a bounded channel; unbounded user output must not
/// ride along.
pub fn truncate_output(text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = text[..end].to_owned();
    truncated.push_str(&format!("\n[output truncated, {} bytes total]", text.len()));
    truncated
}

// ============================================================================
// Tests
// ============================================================================
