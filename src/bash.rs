//! Thin adapter over the bash engine.
//!
//! The engine is constructed once, wired to the confined filesystem with
//! conservative execution limits and networking disabled. Commands run on
//! the blocking pool — a user loop burning its iteration budget must not
//! stall the async scheduler. Engine-level failures (limit exhaustion,
//! interpreter faults) surface as `exit_code = 1` with the message on
//! stderr; user-command failure is whatever exit code the command produced.

use std::sync::Arc;

use crate::config::{MAX_CODE_SIZE_BYTES, MAX_OUTPUT_BYTES};
use crate::engine::{BashEngine, BashEngineProvider, EngineLimits};
use crate::error::SandboxError;
use crate::secure_fs::SandboxFs;
use crate::types::{truncate_output, BashOutcome};

pub struct BashRunner {
    engine: Arc<dyn BashEngine>,
}

impl BashRunner {
    /// Build the engine over the confined filesystem. The logical starting
    /// directory is the virtual root; limits use the crate defaults.
    pub fn new(
        provider: &dyn BashEngineProvider,
        fs: Arc<dyn SandboxFs>,
    ) -> Result<Self, SandboxError> {
        let engine = provider
            .create(fs, EngineLimits::default())
            .map_err(|e| SandboxError::Io(std::io::Error::other(e.to_string())))?;
        Ok(Self {
            engine: Arc::from(engine),
        })
    }

    /// Execute one command. Always produces an outcome.
    pub async fn execute(&self, command: &str, cwd: Option<&str>) -> BashOutcome {
        if command.trim().is_empty() {
            return BashOutcome::engine_failure("command is empty");
        }
        if command.contains('\0') {
            return BashOutcome::engine_failure("command contains null bytes");
        }
        if command.len() > MAX_CODE_SIZE_BYTES {
            return BashOutcome::engine_failure(format!(
                "command too large: {} bytes (max {})",
                command.len(),
                MAX_CODE_SIZE_BYTES
            ));
        }

        let engine = self.engine.clone();
        let command = command.to_owned();
        let cwd = cwd.map(str::to_owned);
        let joined = tokio::task::spawn_blocking(move || {
            engine.exec(&command, cwd.as_deref())
        })
        .await;

        match joined {
            Ok(Ok(output)) => BashOutcome {
                stdout: truncate_output(output.stdout, MAX_OUTPUT_BYTES),
                stderr: truncate_output(output.stderr, MAX_OUTPUT_BYTES),
                exit_code: output.exit_code,
            },
            Ok(Err(e)) => {
                tracing::warn!("bash engine failure: {}", e);
                BashOutcome::engine_failure(e.to_string())
            }
            Err(join_error) => {
                tracing::warn!("bash execution task failed: {}", join_error);
                BashOutcome::engine_failure("bash execution aborted")
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
