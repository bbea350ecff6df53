//! Top-level tool entrypoints.
//!
//! The coordinator composes confinement, quota, sync, the Python
//! supervisor, and the bash runner into the six operations the outside
//! world sees. For each logical operation the guard check, the quota
//! reservation, the write, and the sync happen in that program order;
//! concurrent operations may interleave between operations but never
//! inside the quota critical section.

use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;

use crate::bash::BashRunner;
use crate::config::SandboxConfig;
use crate::confine::{PathGuard, VROOT};
use crate::engine::{BashEngineProvider, PythonEngineProvider};
use crate::error::SandboxError;
use crate::quota::QuotaKeeper;
use crate::secure_fs::{SandboxFs, SecureFs};
use crate::supervisor::PySupervisor;
use crate::sync::SyncEngine;
use crate::types::{BashOutcome, FileEntry, PythonOutcome};
use crate::vfs::{MemFs, VfsError, VirtualFs};

pub struct Coordinator {
    guard: Arc<PathGuard>,
    quota: QuotaKeeper,
    vfs: Arc<dyn VirtualFs>,
    sync: Arc<SyncEngine>,
    supervisor: AsyncMutex<PySupervisor>,
    bash: BashRunner,
}

impl Coordinator {
    /// Build a sandbox over the configured workspace root, creating the
    /// directory if missing. Engine providers come from the embedder.
    pub async fn new(
        config: SandboxConfig,
        python: Arc<dyn PythonEngineProvider>,
        bash: Arc<dyn BashEngineProvider>,
    ) -> Result<Self, SandboxError> {
        tokio::fs::create_dir_all(&config.workspace_root).await?;
        let config = Arc::new(config);
        let guard = Arc::new(PathGuard::new(&config.workspace_root)?);

        let vfs: Arc<dyn VirtualFs> = Arc::new(MemFs::new());
        vfs.mkdir_tree(VROOT)
            .map_err(|e| SandboxError::InvalidPath(e.to_string()))?;

        let sync = Arc::new(SyncEngine::new(guard.clone(), vfs.clone()));
        let quota = QuotaKeeper::new(
            &config.workspace_root,
            config.max_file_size,
            config.max_workspace_size,
        );
        let secure_fs: Arc<dyn SandboxFs> =
            Arc::new(SecureFs::new(&config.workspace_root, guard.clone())?);
        let bash = BashRunner::new(bash.as_ref(), secure_fs)?;
        let supervisor = AsyncMutex::new(PySupervisor::new(
            config.clone(),
            python,
            vfs.clone(),
            sync.clone(),
        ));

        Ok(Self {
            guard,
            quota,
            vfs,
            sync,
            supervisor,
            bash,
        })
    }

    /// Write a UTF-8 text file inside the workspace.
    pub async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let resolved = self.guard.validate(path)?;
        if resolved.rel.as_os_str().is_empty() {
            return Err(SandboxError::InvalidPath(
                "cannot write to the workspace root".into(),
            ));
        }
        let host = resolved.host.clone();
        let bytes = content.as_bytes().to_vec();
        self.quota
            .reserve(bytes.len() as u64, move || async move {
                if let Some(parent) = host.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&host, &bytes).await?;
                Ok(())
            })
            .await?;
        self.sync.host_path_to_virtual(&resolved).await;
        Ok(())
    }

    /// Read a workspace file as UTF-8 text (lossy on invalid sequences,
    /// matching what the engine's text layer would produce).
    pub async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        let resolved = self.guard.validate(path)?;
        self.sync.host_path_to_virtual(&resolved).await;
        match self.vfs.read_file(&resolved.virt) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(VfsError::NotFound(_)) => Err(SandboxError::InvalidPath(format!(
                "no such file: {}",
                resolved.display()
            ))),
            Err(e) => Err(SandboxError::InvalidPath(e.to_string())),
        }
    }

    /// List a workspace directory (the root when `dir` is `None`).
    pub async fn list_files(&self, dir: Option<&str>) -> Result<Vec<FileEntry>, SandboxError> {
        let resolved = self.guard.validate(dir.unwrap_or(VROOT))?;
        self.sync.host_path_to_virtual(&resolved).await;
        let names = match self.vfs.read_dir(&resolved.virt) {
            Ok(names) => names,
            Err(VfsError::NotFound(_)) => {
                return Err(SandboxError::InvalidPath(format!(
                    "no such directory: {}",
                    resolved.display()
                )));
            }
            Err(e) => return Err(SandboxError::InvalidPath(e.to_string())),
        };
        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            if name == "." || name == ".." {
                continue;
            }
            let child = format!("{}/{}", resolved.virt.trim_end_matches('/'), name);
            if let Ok(stat) = self.vfs.stat(&child) {
                entries.push(FileEntry {
                    name,
                    is_directory: stat.is_directory,
                    size: stat.size,
                });
            }
        }
        Ok(entries)
    }

    /// Delete a file, a symlink, or an empty directory from both
    /// filesystems. A missing host file is not an error; a non-empty
    /// directory is rejected.
    pub async fn delete_file(&self, path: &str) -> Result<(), SandboxError> {
        // Parent-only confinement first: a symlink must be removable even
        // when following it would escape.
        let resolved = self.guard.validate_parent(path)?;
        if resolved.rel.as_os_str().is_empty() {
            return Err(SandboxError::InvalidPath(
                "cannot delete the workspace root".into(),
            ));
        }
        let host_meta = tokio::fs::symlink_metadata(&resolved.host).await.ok();
        let is_symlink = host_meta
            .as_ref()
            .is_some_and(|meta| meta.file_type().is_symlink());
        if !is_symlink {
            // Regular entries get the full check.
            self.guard.validate(path)?;
        }

        // Virtual side first, host second; stale virtual entries must not
        // outlive the host file.
        match self.vfs.stat(&resolved.virt) {
            Ok(stat) if stat.is_directory => match self.vfs.rmdir(&resolved.virt) {
                Ok(()) | Err(VfsError::NotFound(_)) => {}
                Err(VfsError::DirectoryNotEmpty(_)) => {
                    return Err(SandboxError::InvalidPath(format!(
                        "directory not empty: {}",
                        resolved.display()
                    )));
                }
                Err(e) => return Err(SandboxError::InvalidPath(e.to_string())),
            },
            Ok(_) => match self.vfs.unlink(&resolved.virt) {
                Ok(()) | Err(VfsError::NotFound(_)) => {}
                Err(e) => return Err(SandboxError::InvalidPath(e.to_string())),
            },
            Err(_) => {}
        }

        match host_meta {
            Some(meta) if meta.is_dir() => match tokio::fs::remove_dir(&resolved.host).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e)
                    if e.kind() == std::io::ErrorKind::DirectoryNotEmpty
                        || e.raw_os_error() == Some(39) =>
                {
                    Err(SandboxError::InvalidPath(format!(
                        "directory not empty: {}",
                        resolved.display()
                    )))
                }
                Err(e) => Err(e.into()),
            },
            Some(_) => match tokio::fs::remove_file(&resolved.host).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            },
            // Never existed on the host; deleting the virtual copy was
            // enough.
            None => Ok(()),
        }
    }

    /// Execute Python through the supervisor. Requests are serialized per
    /// worker; failures are carried in the outcome.
    pub async fn execute_python(&self, code: &str, packages: &[String]) -> PythonOutcome {
        self.supervisor.lock().await.execute(code, packages).await
    }

    /// Execute a bash command, then reconcile the virtual filesystem so the
    /// next Python execution sees whatever the command wrote.
    pub async fn execute_bash(
        &self,
        command: &str,
        cwd: Option<&str>,
    ) -> Result<BashOutcome, SandboxError> {
        let cwd_virt = match cwd {
            Some(cwd) => Some(self.guard.validate(cwd)?.virt),
            None => None,
        };
        let outcome = self.bash.execute(command, cwd_virt.as_deref()).await;
        let stats = self.sync.host_to_virtual().await;
        tracing::debug!(
            files = stats.files,
            skipped = stats.skipped,
            "post-bash sync complete"
        );
        Ok(outcome)
    }

    /// Current measured workspace size, for observability surfaces.
    pub async fn workspace_size(&self) -> Result<u64, SandboxError> {
        self.quota.workspace_size().await
    }
}
