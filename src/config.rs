//! Constants and environment-driven configuration.

use std::path::PathBuf;

// Workspace limits
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10 MiB per file
pub const DEFAULT_MAX_WORKSPACE_SIZE: u64 = 100 * 1024 * 1024; // 100 MiB total
pub const DEFAULT_PY_TIMEOUT_MS: u64 = 5000;

// Worker lifecycle
pub const WORKER_INIT_TIMEOUT_MS: u64 = 60_000; // first-start engine init bound

// Execution limits
pub const MAX_CODE_SIZE_BYTES: usize = 1_000_000; // 1MB max code size
pub const MAX_OUTPUT_BYTES: usize = 128 * 1024; // per stream, per execution
pub const MAX_PACKAGES: usize = 50; // max packages per execute request
pub const MAX_PACKAGE_NAME_LENGTH: usize = 214; // PyPI limit

// Path limits
pub const MAX_PATH_LENGTH: usize = 4096; // POSIX PATH_MAX (full path)
pub const MAX_PATH_COMPONENT_BYTES: usize = 255; // POSIX NAME_MAX (single component)

// Bash engine limits — conservative bounds for adversarial scripts
pub const BASH_MAX_LOOP_ITERATIONS: u64 = 10_000;
pub const BASH_MAX_COMMAND_COUNT: u64 = 1_000;
pub const BASH_MAX_CALL_DEPTH: u32 = 64;

// Environment variables consumed at startup
pub const ENV_WORKSPACE: &str = "HEIMDALL_WORKSPACE";
pub const ENV_MAX_FILE_SIZE: &str = "HEIMDALL_MAX_FILE_SIZE";
pub const ENV_MAX_WORKSPACE_SIZE: &str = "HEIMDALL_MAX_WORKSPACE_SIZE";
pub const ENV_PY_TIMEOUT_MS: &str = "HEIMDALL_PYTHON_EXECUTION_TIMEOUT_MS";

/// Immutable sandbox configuration, read once at startup.
///
/// Components receive this as a shared context value at construction; there
/// are no implicit globals, so tests can run in parallel against distinct
/// workspace roots.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Host directory under which all user-visible file state lives.
    pub workspace_root: PathBuf,
    /// Maximum size of a single written file, in bytes.
    pub max_file_size: u64,
    /// Maximum total workspace size, in bytes.
    pub max_workspace_size: u64,
    /// Wall-clock bound on a single Python execution, in milliseconds.
    pub py_timeout_ms: u64,
}

impl SandboxConfig {
    /// Read configuration from the `HEIMDALL_*` environment variables.
    ///
    /// Missing variables use the documented defaults. Invalid or
    /// non-positive numeric values fall back to the default with a warning.
    pub fn from_env() -> Self {
        let workspace_root = match std::env::var(ENV_WORKSPACE) {
            Ok(p) if !p.is_empty() => PathBuf::from(p),
            _ => std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("workspace"),
        };
        Self {
            workspace_root,
            max_file_size: parse_positive(
                ENV_MAX_FILE_SIZE,
                std::env::var(ENV_MAX_FILE_SIZE).ok().as_deref(),
                DEFAULT_MAX_FILE_SIZE,
            ),
            max_workspace_size: parse_positive(
                ENV_MAX_WORKSPACE_SIZE,
                std::env::var(ENV_MAX_WORKSPACE_SIZE).ok().as_deref(),
                DEFAULT_MAX_WORKSPACE_SIZE,
            ),
            py_timeout_ms: parse_positive(
                ENV_PY_TIMEOUT_MS,
                std::env::var(ENV_PY_TIMEOUT_MS).ok().as_deref(),
                DEFAULT_PY_TIMEOUT_MS,
            ),
        }
    }

    /// Configuration with defaults for the given root. Used by tests and by
    /// embedders that configure programmatically.
    pub fn with_root(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_workspace_size: DEFAULT_MAX_WORKSPACE_SIZE,
            py_timeout_ms: DEFAULT_PY_TIMEOUT_MS,
        }
    }
}

/// Parse a positive integer setting, falling back to `default` with a
/// warning on anything unparseable or non-positive.
fn parse_positive(name: &str, raw: Option<&str>, default: u64) -> u64 {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => v,
        _ => {
            tracing::warn!(
                "invalid value '{}' for {}, using default {}",
                raw,
                name,
                default
            );
            default
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
