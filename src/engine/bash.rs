//! Contract for the bash interpreter engine.

use std::sync::Arc;

use super::EngineError;
use crate::config::{BASH_MAX_CALL_DEPTH, BASH_MAX_COMMAND_COUNT, BASH_MAX_LOOP_ITERATIONS};
use crate::secure_fs::SandboxFs;

/// Execution bounds the engine must enforce on adversarial scripts.
#[derive(Debug, Clone, Copy)]
pub struct EngineLimits {
    pub max_loop_iterations: u64,
    pub max_command_count: u64,
    pub max_call_depth: u32,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_loop_iterations: BASH_MAX_LOOP_ITERATIONS,
            max_command_count: BASH_MAX_COMMAND_COUNT,
            max_call_depth: BASH_MAX_CALL_DEPTH,
        }
    }
}

/// Raw result of one bash execution.
#[derive(Debug, Clone)]
pub struct BashOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// One bash interpreter wired to a confined filesystem.
///
/// User-command failure is a non-zero `exit_code` inside `Ok`; `Err` is
/// reserved for engine-level failures (limit exhaustion, interpreter bugs).
pub trait BashEngine: Send + Sync {
    fn exec(&self, command: &str, cwd: Option<&str>) -> Result<BashOutput, EngineError>;
}

/// Builds a bash engine over the confined filesystem, with limits applied
/// and networking disabled. There is no enable-network variant.
pub trait BashEngineProvider: Send + Sync + 'static {
    fn create(
        &self,
        fs: Arc<dyn SandboxFs>,
        limits: EngineLimits,
    ) -> Result<Box<dyn BashEngine>, EngineError>;
}
