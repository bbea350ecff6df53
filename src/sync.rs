//! Host ↔ virtual filesystem synchronization.
//!
//! Copies file trees between the host workspace and the engine's in-memory
//! filesystem without blocking the scheduler. Sync-to-virtual runs before
//! Python code, sync-to-host after it (on success and on failure — user code
//! may have written files before raising). Targeted variants cover a single
//! file or subtree and are the default for file-tool operations;
//! whole-workspace sync is reserved for execution boundaries.
//!
//! Failure model: read/stat errors on a source abort only that subtree and
//! are counted in the returned stats; they never poison the Python worker.
//! Every host write re-validates its target first — a symlink introduced
//! between operations must not redirect the write.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::confine::{PathGuard, ResolvedPath, VROOT};
use crate::vfs::{VfsError, VirtualFs};

/// Counters for one sync pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub files: u64,
    pub dirs: u64,
    pub skipped: u64,
}

impl SyncStats {
    fn absorb(&mut self, other: SyncStats) {
        self.files += other.files;
        self.dirs += other.dirs;
        self.skipped += other.skipped;
    }
}

/// Bidirectional copier between one workspace root and one virtual tree.
pub struct SyncEngine {
    guard: Arc<PathGuard>,
    vfs: Arc<dyn VirtualFs>,
}

impl SyncEngine {
    pub fn new(guard: Arc<PathGuard>, vfs: Arc<dyn VirtualFs>) -> Self {
        Self { guard, vfs }
    }

    /// Virtual path for a workspace-relative host path.
    fn virt_of(rel: &Path) -> String {
        if rel.as_os_str().is_empty() {
            VROOT.to_owned()
        } else {
            format!("{VROOT}/{}", rel.to_string_lossy())
        }
    }

    fn virt_parent(virt: &str) -> &str {
        match virt.rsplit_once('/') {
            Some((parent, _)) if parent.len() >= VROOT.len() => parent,
            _ => VROOT,
        }
    }

    // ------------------------------------------------------------------------
    // host → virtual
    // ------------------------------------------------------------------------

    /// Copy the whole workspace into the virtual tree.
    pub async fn host_to_virtual(&self) -> SyncStats {
        let root = ResolvedPath {
            virt: VROOT.to_owned(),
            rel: PathBuf::new(),
            host: self.guard.root().to_path_buf(),
        };
        self.host_path_to_virtual(&root).await
    }

    /// Copy one file or subtree into the virtual tree. A host path that no
    /// longer exists removes the corresponding virtual entry, so a stale
    /// copy cannot satisfy a later read.
    pub async fn host_path_to_virtual(&self, target: &ResolvedPath) -> SyncStats {
        let mut stats = SyncStats::default();
        let meta = match tokio::fs::symlink_metadata(&target.host).await {
            Ok(meta) => meta,
            Err(_) => {
                let _ = self.vfs.unlink(&target.virt);
                return stats;
            }
        };
        if meta.is_dir() {
            self.copy_dir_to_virtual(target.rel.clone(), &mut stats).await;
        } else {
            self.copy_file_to_virtual(&target.rel, &mut stats).await;
        }
        stats
    }

    async fn copy_dir_to_virtual(&self, rel: PathBuf, stats: &mut SyncStats) {
        let mut stack = vec![rel];
        while let Some(rel) = stack.pop() {
            let virt = Self::virt_of(&rel);
            // Already-exists is not an error; anything else is logged and
            // skips the subtree without aborting the sync.
            if let Err(e) = self.vfs.mkdir_tree(&virt) {
                tracing::warn!("virtual mkdir failed for {}: {}", virt, e);
                stats.skipped += 1;
                continue;
            }
            stats.dirs += 1;

            let host_dir = self.guard.root().join(&rel);
            let mut entries = match tokio::fs::read_dir(&host_dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("readdir failed for {}: {}", virt, e);
                    stats.skipped += 1;
                    continue;
                }
            };
            loop {
                match entries.next_entry().await {
                    Ok(Some(entry)) => {
                        let child_rel = rel.join(entry.file_name());
                        let meta = match tokio::fs::symlink_metadata(entry.path()).await {
                            Ok(meta) => meta,
                            Err(_) => {
                                stats.skipped += 1;
                                continue;
                            }
                        };
                        if meta.is_dir() {
                            stack.push(child_rel);
                        } else if meta.is_symlink() {
                            self.copy_symlink_to_virtual(&child_rel, stats).await;
                        } else {
                            self.copy_file_to_virtual(&child_rel, stats).await;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("readdir failed for {}: {}", virt, e);
                        stats.skipped += 1;
                        break;
                    }
                }
            }
        }
    }

    async fn copy_file_to_virtual(&self, rel: &Path, stats: &mut SyncStats) {
        let virt = Self::virt_of(rel);
        let bytes = match tokio::fs::read(self.guard.root().join(rel)).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("host read failed for {}: {}", virt, e);
                stats.skipped += 1;
                return;
            }
        };
        if let Err(e) = self.write_virtual(&virt, &bytes) {
            tracing::warn!("virtual write failed for {}: {}", virt, e);
            stats.skipped += 1;
            return;
        }
        stats.files += 1;
    }

    /// A symlinked entry is materialized as its target's content — but only
    /// when the link resolves inside the workspace. Escaping links are
    /// skipped; their targets must never be read.
    async fn copy_symlink_to_virtual(&self, rel: &Path, stats: &mut SyncStats) {
        let virt = Self::virt_of(rel);
        let resolved = match self.guard.validate(&virt) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::debug!("skipping symlink {}: {}", virt, e);
                stats.skipped += 1;
                return;
            }
        };
        match tokio::fs::metadata(&resolved.host).await {
            Ok(meta) if meta.is_file() => self.copy_file_to_virtual(rel, stats).await,
            // Directory links are not followed: a link to an ancestor would
            // recurse forever.
            _ => stats.skipped += 1,
        }
    }

    fn write_virtual(&self, virt: &str, bytes: &[u8]) -> Result<(), VfsError> {
        self.vfs.mkdir_tree(Self::virt_parent(virt))?;
        self.vfs.write_file(virt, bytes)
    }

    // ------------------------------------------------------------------------
    // virtual → host
    // ------------------------------------------------------------------------

    /// Copy the whole virtual tree back to the workspace.
    pub async fn virtual_to_host(&self) -> SyncStats {
        self.virtual_path_to_host(VROOT).await
    }

    /// Copy one virtual file or subtree back to the host.
    pub async fn virtual_path_to_host(&self, virt: &str) -> SyncStats {
        let mut stats = SyncStats::default();
        let stat = match self.vfs.stat(virt) {
            Ok(stat) => stat,
            Err(VfsError::NotFound(_)) => return stats,
            Err(e) => {
                tracing::warn!("virtual stat failed for {}: {}", virt, e);
                stats.skipped += 1;
                return stats;
            }
        };
        if stat.is_directory {
            let mut stack = vec![virt.to_owned()];
            while let Some(virt) = stack.pop() {
                let inner = self.copy_virtual_dir_entry(&virt, &mut stack).await;
                stats.absorb(inner);
            }
        } else {
            self.copy_virtual_file(virt, &mut stats).await;
        }
        stats
    }

    /// Materialize one virtual directory on the host and queue its children.
    async fn copy_virtual_dir_entry(&self, virt: &str, stack: &mut Vec<String>) -> SyncStats {
        let mut stats = SyncStats::default();
        // Re-validate before every host mutation: the tree may have gained
        // adversarial symlinks since the last check.
        let resolved = match self.guard.validate(virt) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!("refusing host dir for {}: {}", virt, e);
                stats.skipped += 1;
                return stats;
            }
        };
        if let Err(e) = tokio::fs::create_dir_all(&resolved.host).await {
            tracing::warn!("host mkdir failed for {}: {}", virt, e);
            stats.skipped += 1;
            return stats;
        }
        stats.dirs += 1;

        let names = match self.vfs.read_dir(virt) {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!("virtual readdir failed for {}: {}", virt, e);
                stats.skipped += 1;
                return stats;
            }
        };
        for name in names {
            let child = format!("{virt}/{name}");
            match self.vfs.stat(&child) {
                Ok(stat) if stat.is_directory => stack.push(child),
                Ok(_) => self.copy_virtual_file(&child, &mut stats).await,
                Err(_) => stats.skipped += 1,
            }
        }
        stats
    }

    async fn copy_virtual_file(&self, virt: &str, stats: &mut SyncStats) {
        let resolved = match self.guard.validate(virt) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!("refusing host write for {}: {}", virt, e);
                stats.skipped += 1;
                return;
            }
        };
        let bytes = match self.vfs.read_file(virt) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("virtual read failed for {}: {}", virt, e);
                stats.skipped += 1;
                return;
            }
        };
        if let Some(parent) = resolved.host.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!("host mkdir failed for {}: {}", virt, e);
                stats.skipped += 1;
                return;
            }
        }
        if let Err(e) = tokio::fs::write(&resolved.host, &bytes).await {
            tracing::warn!("host write failed for {}: {}", virt, e);
            stats.skipped += 1;
            return;
        }
        stats.files += 1;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemFs;
    use tempfile::TempDir;

    fn engine() -> (TempDir, Arc<MemFs>, SyncEngine) {
        let dir = TempDir::new().unwrap();
        let guard = Arc::new(PathGuard::new(dir.path()).unwrap());
        let vfs = Arc::new(MemFs::new());
        vfs.mkdir_tree(VROOT).unwrap();
        let sync = SyncEngine::new(guard, vfs.clone());
        (dir, vfs, sync)
    }

    #[tokio::test]
    async fn host_tree_appears_in_virtual() {
        let (dir, vfs, sync) = engine();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/f.txt"), b"deep").unwrap();
        std::fs::write(dir.path().join("top.txt"), b"top").unwrap();

        let stats = sync.host_to_virtual().await;
        assert_eq!(stats.files, 2);
        assert_eq!(vfs.read_file("/workspace/a/b/f.txt").unwrap(), b"deep");
        assert_eq!(vfs.read_file("/workspace/top.txt").unwrap(), b"top");
    }

    #[tokio::test]
    async fn virtual_tree_appears_on_host() {
        let (dir, vfs, sync) = engine();
        vfs.mkdir_tree("/workspace/out/sub").unwrap();
        vfs.write_file("/workspace/out/sub/r.txt", b"result").unwrap();

        let stats = sync.virtual_to_host().await;
        assert!(stats.files >= 1);
        assert_eq!(
            std::fs::read(dir.path().join("out/sub/r.txt")).unwrap(),
            b"result"
        );
    }

    #[tokio::test]
    async fn sync_is_idempotent() {
        let (dir, vfs, sync) = engine();
        std::fs::write(dir.path().join("f.txt"), b"data").unwrap();

        let first = sync.host_to_virtual().await;
        let second = sync.host_to_virtual().await;
        assert_eq!(first, second);
        assert_eq!(vfs.read_file("/workspace/f.txt").unwrap(), b"data");

        let out_first = sync.virtual_to_host().await;
        let out_second = sync.virtual_to_host().await;
        assert_eq!(out_first, out_second);
        assert_eq!(std::fs::read(dir.path().join("f.txt")).unwrap(), b"data");
    }

    #[tokio::test]
    async fn targeted_sync_copies_single_file() {
        let (dir, vfs, sync) = engine();
        std::fs::write(dir.path().join("wanted.txt"), b"yes").unwrap();
        std::fs::write(dir.path().join("other.txt"), b"no").unwrap();

        let guard = PathGuard::new(dir.path()).unwrap();
        let target = guard.validate("wanted.txt").unwrap();
        sync.host_path_to_virtual(&target).await;

        assert!(vfs.exists("/workspace/wanted.txt"));
        assert!(!vfs.exists("/workspace/other.txt"));
    }

    #[tokio::test]
    async fn targeted_sync_removes_stale_virtual_entry() {
        let (dir, vfs, sync) = engine();
        vfs.write_file("/workspace/gone.txt", b"stale").unwrap();

        let guard = PathGuard::new(dir.path()).unwrap();
        let target = guard.validate("gone.txt").unwrap();
        sync.host_path_to_virtual(&target).await;

        assert!(!vfs.exists("/workspace/gone.txt"));
    }

    #[tokio::test]
    async fn escaping_symlink_content_never_copied() {
        let (dir, vfs, sync) = engine();
        std::os::unix::fs::symlink("/etc/passwd", dir.path().join("evil")).unwrap();
        std::fs::write(dir.path().join("ok.txt"), b"fine").unwrap();

        let stats = sync.host_to_virtual().await;
        assert!(!vfs.exists("/workspace/evil"));
        assert!(vfs.exists("/workspace/ok.txt"));
        assert!(stats.skipped >= 1);
    }

    #[tokio::test]
    async fn confined_symlink_materializes_as_content() {
        let (dir, vfs, sync) = engine();
        std::fs::write(dir.path().join("real.txt"), b"linked data").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("alias"))
            .unwrap();

        sync.host_to_virtual().await;
        assert_eq!(vfs.read_file("/workspace/alias").unwrap(), b"linked data");
    }

    #[tokio::test]
    async fn host_write_revalidated_against_fresh_symlink() {
        let (dir, vfs, sync) = engine();
        vfs.mkdir_tree("/workspace/out").unwrap();
        vfs.write_file("/workspace/out/f.txt", b"payload").unwrap();
        // An attacker replaced the output directory with an escaping link
        // after the virtual tree was built.
        std::os::unix::fs::symlink("/tmp", dir.path().join("out")).unwrap();

        let stats = sync.virtual_to_host().await;
        assert!(stats.skipped >= 1);
        assert!(!std::path::Path::new("/tmp/f.txt").exists());
    }

    #[tokio::test]
    async fn unreadable_source_skips_subtree_only() {
        let (dir, vfs, sync) = engine();
        std::fs::write(dir.path().join("good.txt"), b"ok").unwrap();
        vfs.write_file("/workspace/direct.txt", b"ok").unwrap();

        // A file that vanishes mid-walk is counted, not fatal.
        std::fs::write(dir.path().join("flaky.txt"), b"x").unwrap();
        std::fs::remove_file(dir.path().join("flaky.txt")).unwrap();

        let stats = sync.host_to_virtual().await;
        assert!(vfs.exists("/workspace/good.txt"));
        assert_eq!(stats.files, 1);
    }
}
