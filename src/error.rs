//! The crate error type.
//!
//! Every caller-visible failure maps to one variant; tool handlers convert
//! these into result payloads rather than propagating panics. Messages use
//! workspace-relative paths — the absolute host location of the workspace is
//! never echoed back to callers.

use thiserror::Error;

/// Errors surfaced by sandbox operations.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Normalized path leaves the workspace.
    #[error("path escapes the workspace: {0}")]
    PathEscape(String),

    /// Path or an ancestor resolves outside the workspace after symlink
    /// resolution.
    #[error("path resolves outside the workspace: {0}")]
    SymlinkEscape(String),

    /// Malformed or unusable path (NUL bytes, empty, over-long, missing
    /// target).
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Single-write size exceeds the per-file cap.
    #[error("file too large: {size} bytes (max {max})")]
    FileTooLarge { size: u64, max: u64 },

    /// Completing the write would exceed the workspace cap.
    #[error("workspace full: {requested} bytes requested, {used} of {max} in use")]
    WorkspaceFull { requested: u64, used: u64, max: u64 },

    /// Python execution exceeded the configured wall-clock timeout.
    #[error("Python execution timed out after {0} ms")]
    Timeout(u64),

    /// The Python worker failed to start, crashed, or was killed. Retryable.
    #[error("Python worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// Host filesystem failure outside the confinement/quota categories.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// True for the path-confinement family of rejections.
    pub fn is_confinement(&self) -> bool {
        matches!(
            self,
            Self::PathEscape(_) | Self::SymlinkEscape(_) | Self::InvalidPath(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
