//! Workspace quota enforcement.
//!
//! Two caps: a per-file byte limit checked up front, and a total-workspace
//! limit enforced inside a reservation. The reservation holds a process-wide
//! mutex keyed on the workspace root while it measures the tree and performs
//! the write, so two concurrent writers cannot both observe
//! `current + size <= limit` and collectively blow past it. Readers do not
//! take the lock.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex as StdMutex};

use tokio::sync::Mutex as AsyncMutex;

use crate::error::SandboxError;

/// One named lock per workspace root. Keying by root keeps the primitive
/// correct if several sandboxes with distinct roots share the process.
static WORKSPACE_LOCKS: LazyLock<StdMutex<HashMap<PathBuf, std::sync::Arc<AsyncMutex<()>>>>> =
    LazyLock::new(|| StdMutex::new(HashMap::new()));

fn lock_for(root: &Path) -> std::sync::Arc<AsyncMutex<()>> {
    let mut registry = WORKSPACE_LOCKS.lock().unwrap_or_else(|e| e.into_inner());
    registry
        .entry(root.to_path_buf())
        .or_insert_with(|| std::sync::Arc::new(AsyncMutex::new(())))
        .clone()
}

/// Enforces the per-file and total-workspace byte caps for one root.
#[derive(Debug, Clone)]
pub struct QuotaKeeper {
    root: PathBuf,
    max_file_size: u64,
    max_workspace_size: u64,
}

impl QuotaKeeper {
    pub fn new(root: impl Into<PathBuf>, max_file_size: u64, max_workspace_size: u64) -> Self {
        Self {
            root: root.into(),
            max_file_size,
            max_workspace_size,
        }
    }

    /// Reject a write whose size alone exceeds the per-file cap.
    pub fn precheck(&self, file_bytes: u64) -> Result<(), SandboxError> {
        if file_bytes > self.max_file_size {
            return Err(SandboxError::FileTooLarge {
                size: file_bytes,
                max: self.max_file_size,
            });
        }
        Ok(())
    }

    /// Atomically verify and perform a potentially growing write.
    ///
    /// The workspace lock is held across the size measurement and the write
    /// itself; it is released on every exit path, including panics in
    /// `do_write` (guard drop). The size is measured fresh each time — it is
    /// intentionally not cached across writes.
    pub async fn reserve<T, F, Fut>(&self, file_bytes: u64, do_write: F) -> Result<T, SandboxError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SandboxError>>,
    {
        self.precheck(file_bytes)?;
        let lock = lock_for(&self.root);
        let _guard = lock.lock().await;

        let used = measure_tree(&self.root).await?;
        if used + file_bytes > self.max_workspace_size {
            tracing::debug!(
                used,
                requested = file_bytes,
                max = self.max_workspace_size,
                "write rejected, workspace full"
            );
            return Err(SandboxError::WorkspaceFull {
                requested: file_bytes,
                used,
                max: self.max_workspace_size,
            });
        }
        do_write().await
    }

    /// Current measured workspace size in bytes.
    pub async fn workspace_size(&self) -> Result<u64, SandboxError> {
        measure_tree(&self.root).await
    }
}

/// Sum file sizes under `root` without following symlinks (a link's own
/// length counts, its target's does not — targets outside the workspace must
/// not inflate or satisfy the quota).
async fn measure_tree(root: &Path) -> Result<u64, SandboxError> {
    let mut total: u64 = 0;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            // The tree can shrink underneath us (bash rm, delete_file).
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let meta = match tokio::fs::symlink_metadata(entry.path()).await {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if meta.is_dir() {
                stack.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    Ok(total)
}

// ============================================================================
// Tests
// ============================================================================
