//! Contracts for the opaque execution engines.
//!
//! The embedded Python-WASM runtime and the bash interpreter are external
//! collaborators: this crate consumes them through the narrow traits here
//! and never looks inside. Callers supply providers; the supervisor, worker,
//! and bash runner drive them.

pub mod bash;
pub mod python;

pub use bash::{BashEngine, BashEngineProvider, BashOutput, EngineLimits};
pub use python::{CapturedOutput, KillSwitch, PythonEngine, PythonEngineProvider};

use thiserror::Error;

/// Failures reported by either engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not be constructed or initialized.
    #[error("engine initialization failed: {0}")]
    Init(String),
    /// User code raised; the message is the engine's rendering of the
    /// exception. Captured stdout/stderr remain valid.
    #[error("{0}")]
    Execution(String),
    /// The in-flight execution was aborted through the kill switch.
    #[error("execution terminated")]
    Killed,
    /// Anything else the engine reports (a failed package install, a broken
    /// interpreter state).
    #[error("engine failure: {0}")]
    Internal(String),
}
