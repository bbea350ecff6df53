//! Confined filesystem facade for the bash engine.
//!
//! [`SandboxFs`] is the pluggable filesystem interface the bash interpreter
//! is constructed with. [`SecureFs`] implements it by validating every path
//! argument through the path guard, then delegating to a root-confined
//! `cap_std::fs::Dir` — the capability layer cannot reach outside the
//! workspace even if a validation gap slipped through.
//!
//! Deliberate exceptions to the validate-everything rule:
//! - `exists` answers `false` instead of erroring when validation rejects
//!   the path — existence probed through an attacker-created symlink is a
//!   side channel.
//! - `lstat`/`read_link` validate the parent only, so a confined symlink's
//!   own metadata stays inspectable.
//! - `rm` on a symlink validates the parent only: the unlink operates on
//!   the link, letting an operator delete an adversarial link whose target
//!   escapes.
//! - `symlink` rejects creation when the resolved target escapes, even
//!   though the link itself would sit inside the workspace.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cap_std::ambient_authority;
use cap_std::fs::{Dir, OpenOptions, Permissions};

use crate::confine::{PathGuard, ResolvedPath};
use crate::error::SandboxError;

/// Typed metadata for one entry, as the bash engine consumes it.
#[derive(Debug, Clone, Copy)]
pub struct FsStat {
    pub is_file: bool,
    pub is_directory: bool,
    pub is_symlink: bool,
    pub size: u64,
}

/// One directory listing entry.
#[derive(Debug, Clone)]
pub struct FsDirEntry {
    pub name: String,
    pub stat: FsStat,
}

/// The filesystem capability handed to the bash engine.
///
/// All paths are caller-form (virtual or workspace-relative); implementations
/// confine them before touching the host.
pub trait SandboxFs: Send + Sync {
    fn read(&self, path: &str) -> Result<String, SandboxError>;
    fn read_buffer(&self, path: &str) -> Result<Vec<u8>, SandboxError>;
    fn write(&self, path: &str, data: &[u8]) -> Result<(), SandboxError>;
    fn append(&self, path: &str, data: &[u8]) -> Result<(), SandboxError>;
    fn exists(&self, path: &str) -> bool;
    fn stat(&self, path: &str) -> Result<FsStat, SandboxError>;
    fn lstat(&self, path: &str) -> Result<FsStat, SandboxError>;
    fn read_link(&self, path: &str) -> Result<String, SandboxError>;
    fn read_dir(&self, path: &str) -> Result<Vec<FsDirEntry>, SandboxError>;
    fn mkdir(&self, path: &str, recursive: bool) -> Result<(), SandboxError>;
    fn rm(&self, path: &str, recursive: bool) -> Result<(), SandboxError>;
    fn cp(&self, from: &str, to: &str) -> Result<(), SandboxError>;
    fn mv(&self, from: &str, to: &str) -> Result<(), SandboxError>;
    fn chmod(&self, path: &str, mode: u32) -> Result<(), SandboxError>;
    fn symlink(&self, target: &str, link: &str) -> Result<(), SandboxError>;
    fn hard_link(&self, original: &str, link: &str) -> Result<(), SandboxError>;
    /// Resolve `path` against `base` into a normalized virtual path, without
    /// requiring it to exist. The engine uses this for cwd handling.
    fn resolve(&self, base: &str, path: &str) -> Result<String, SandboxError>;
}

/// [`SandboxFs`] over the workspace root.
pub struct SecureFs {
    guard: Arc<PathGuard>,
    dir: Dir,
}

impl SecureFs {
    /// Open the capability directory on the workspace root.
    pub fn new(root: &Path, guard: Arc<PathGuard>) -> Result<Self, SandboxError> {
        let dir = Dir::open_ambient_dir(root, ambient_authority())?;
        Ok(Self { guard, dir })
    }

    /// Workspace-relative path for the capability layer; the root itself
    /// maps to `.`.
    fn rel(resolved: &ResolvedPath) -> PathBuf {
        if resolved.rel.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            resolved.rel.clone()
        }
    }

    fn stat_of(meta: &cap_std::fs::Metadata) -> FsStat {
        FsStat {
            is_file: meta.is_file(),
            is_directory: meta.is_dir(),
            is_symlink: meta.file_type().is_symlink(),
            size: meta.len(),
        }
    }
}

impl SandboxFs for SecureFs {
    fn read(&self, path: &str) -> Result<String, SandboxError> {
        let resolved = self.guard.validate(path)?;
        Ok(self.dir.read_to_string(Self::rel(&resolved))?)
    }

    fn read_buffer(&self, path: &str) -> Result<Vec<u8>, SandboxError> {
        let resolved = self.guard.validate(path)?;
        Ok(self.dir.read(Self::rel(&resolved))?)
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), SandboxError> {
        let resolved = self.guard.validate(path)?;
        Ok(self.dir.write(Self::rel(&resolved), data)?)
    }

    fn append(&self, path: &str, data: &[u8]) -> Result<(), SandboxError> {
        let resolved = self.guard.validate(path)?;
        let mut file = self
            .dir
            .open_with(Self::rel(&resolved), OpenOptions::new().append(true).create(true))?;
        file.write_all(data)?;
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        // A rejected path — symlink escape included — reads as absent.
        let Ok(resolved) = self.guard.validate(path) else {
            return false;
        };
        self.dir.metadata(Self::rel(&resolved)).is_ok()
    }

    fn stat(&self, path: &str) -> Result<FsStat, SandboxError> {
        let resolved = self.guard.validate(path)?;
        Ok(Self::stat_of(&self.dir.metadata(Self::rel(&resolved))?))
    }

    fn lstat(&self, path: &str) -> Result<FsStat, SandboxError> {
        let resolved = self.guard.validate_parent(path)?;
        Ok(Self::stat_of(
            &self.dir.symlink_metadata(Self::rel(&resolved))?,
        ))
    }

    fn read_link(&self, path: &str) -> Result<String, SandboxError> {
        let resolved = self.guard.validate_parent(path)?;
        let target = self.dir.read_link(Self::rel(&resolved))?;
        Ok(target.to_string_lossy().into_owned())
    }

    fn read_dir(&self, path: &str) -> Result<Vec<FsDirEntry>, SandboxError> {
        let resolved = self.guard.validate(path)?;
        let mut entries = Vec::new();
        for entry in self.dir.read_dir(Self::rel(&resolved))? {
            let entry = entry?;
            let meta = entry.metadata()?;
            entries.push(FsDirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                stat: Self::stat_of(&meta),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn mkdir(&self, path: &str, recursive: bool) -> Result<(), SandboxError> {
        let resolved = self.guard.validate(path)?;
        if recursive {
            Ok(self.dir.create_dir_all(Self::rel(&resolved))?)
        } else {
            Ok(self.dir.create_dir(Self::rel(&resolved))?)
        }
    }

    fn rm(&self, path: &str, recursive: bool) -> Result<(), SandboxError> {
        // Deleting a symlink must not require its target to validate.
        let parent_checked = self.guard.validate_parent(path)?;
        let rel = Self::rel(&parent_checked);
        if let Ok(meta) = self.dir.symlink_metadata(&rel) {
            if meta.file_type().is_symlink() {
                return Ok(self.dir.remove_file(&rel)?);
            }
        }
        let resolved = self.guard.validate(path)?;
        let rel = Self::rel(&resolved);
        let meta = self.dir.symlink_metadata(&rel)?;
        if meta.is_dir() {
            if recursive {
                Ok(self.dir.remove_dir_all(&rel)?)
            } else {
                Ok(self.dir.remove_dir(&rel)?)
            }
        } else {
            Ok(self.dir.remove_file(&rel)?)
        }
    }

    fn cp(&self, from: &str, to: &str) -> Result<(), SandboxError> {
        let src = self.guard.validate(from)?;
        let dst = self.guard.validate(to)?;
        self.dir.copy(Self::rel(&src), &self.dir, Self::rel(&dst))?;
        Ok(())
    }

    fn mv(&self, from: &str, to: &str) -> Result<(), SandboxError> {
        let src = self.guard.validate(from)?;
        let dst = self.guard.validate(to)?;
        self.dir
            .rename(Self::rel(&src), &self.dir, Self::rel(&dst))?;
        Ok(())
    }

    fn chmod(&self, path: &str, mode: u32) -> Result<(), SandboxError> {
        use std::os::unix::fs::PermissionsExt;
        let resolved = self.guard.validate(path)?;
        let perms = Permissions::from_std(std::fs::Permissions::from_mode(mode));
        Ok(self.dir.set_permissions(Self::rel(&resolved), perms)?)
    }

    fn symlink(&self, target: &str, link: &str) -> Result<(), SandboxError> {
        let resolved = self.guard.validate_symlink(link, target)?;
        Ok(self.dir.symlink(target, Self::rel(&resolved))?)
    }

    fn hard_link(&self, original: &str, link: &str) -> Result<(), SandboxError> {
        let src = self.guard.validate(original)?;
        let dst = self.guard.validate(link)?;
        self.dir
            .hard_link(Self::rel(&src), &self.dir, Self::rel(&dst))?;
        Ok(())
    }

    fn resolve(&self, base: &str, path: &str) -> Result<String, SandboxError> {
        let input = if path.starts_with('/') || base.is_empty() {
            path.to_owned()
        } else {
            format!("{}/{}", base.trim_end_matches('/'), path)
        };
        // Normalization and confinement only; existence is not required.
        Ok(self.guard.validate(&input)?.virt)
    }
}

// ============================================================================
// Tests
// ============================================================================
