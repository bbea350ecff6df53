//! Heimdall — sandboxed code-execution supervisor for AI agents.
//!
//! Accepts Python source and bash command strings and executes them against
//! a confined workspace directory, returning captured stdout/stderr, the
//! evaluated result, and an error string. The crate is the supervisor only:
//! - path confinement with symlink-attack prevention ([`confine`])
//! - workspace quota enforcement safe under concurrent writes ([`quota`])
//! - isolated Python execution in a killable worker with a hard wall-clock
//!   timeout ([`worker`], [`supervisor`])
//! - two-way synchronization between the host workspace and the in-memory
//!   virtual filesystem the embedded Python runtime sees ([`sync`], [`vfs`])
//! - a confined filesystem facade for the bash engine ([`secure_fs`], [`bash`])
//!
//! The embedded Python-WASM engine and the bash interpreter are opaque
//! collaborators supplied by the caller through the [`engine`] contracts.
//! Request transport, tool registration, and result formatting live outside
//! this crate; [`coordinator::Coordinator`] is the boundary.

pub mod bash;
pub mod config;
pub mod confine;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod packages;
pub mod quota;
pub mod secure_fs;
pub mod supervisor;
pub mod sync;
pub mod types;
pub mod vfs;
pub mod worker;

pub use config::SandboxConfig;
pub use coordinator::Coordinator;
pub use error::SandboxError;
pub use types::{BashOutcome, FileEntry, PythonOutcome};
