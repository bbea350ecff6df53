//! Contract for the embedded Python-WASM engine.

use std::sync::Arc;

use super::EngineError;
use crate::vfs::VirtualFs;

/// Captured stdout/stderr from one execution window.
#[derive(Debug, Default, Clone)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Aborts an in-flight [`PythonEngine::run`] from another thread.
///
/// This is the authoritative termination mechanism: engines may also expose
/// cooperative interrupt buffers, but those do not cover all blocking paths,
/// so the supervisor relies on the kill switch alone. After `kill`, the
/// engine's pending `run` must return [`EngineError::Killed`] and the
/// instance is considered unusable.
pub trait KillSwitch: Send + Sync {
    fn kill(&self);
}

/// One live instance of the embedded Python runtime.
///
/// Instances are owned by a single worker thread and are not `Sync`; the
/// only cross-thread handle is the [`KillSwitch`].
pub trait PythonEngine: Send {
    /// Execute a source string asynchronously (from the engine's point of
    /// view); blocks the calling worker thread until completion or kill.
    /// Returns the printable representation of the value the code evaluated
    /// to, if it produced one.
    fn run(&mut self, code: &str) -> Result<Option<String>, EngineError>;

    /// Run a source string synchronously, for the worker's own bootstrap
    /// code (import-path setup, working-directory changes).
    fn run_sync(&mut self, code: &str) -> Result<(), EngineError>;

    /// Pre-import-based package autoload: inspect `code` for imports and
    /// load whatever the engine can satisfy. Best effort.
    fn autoload_packages(&mut self, code: &str) -> Result<(), EngineError>;

    /// Load the package-installer module. Absence is not fatal: install
    /// attempts at execution time will fail gracefully instead.
    fn load_installer(&mut self) -> Result<(), EngineError>;

    /// Install one package through the installer module.
    fn install_package(&mut self, spec: &str) -> Result<(), EngineError>;

    /// Install batched stdout/stderr capture sinks.
    fn begin_capture(&mut self);

    /// Restore the default sinks and return everything captured since
    /// [`begin_capture`](Self::begin_capture).
    fn take_output(&mut self) -> CapturedOutput;

    /// The cross-thread termination handle for this instance.
    fn kill_switch(&self) -> Arc<dyn KillSwitch>;
}

/// Builds engine instances over a shared virtual filesystem.
///
/// The provider is called once per worker spawn, on the worker thread; the
/// engine mounts the supplied tree as its in-memory filesystem.
pub trait PythonEngineProvider: Send + Sync + 'static {
    fn create(&self, vfs: Arc<dyn VirtualFs>) -> Result<Box<dyn PythonEngine>, EngineError>;
}
