//! Path confinement: normalization, virtual-root mapping, and realpath
//! validation against the canonicalized workspace root.
//!
//! Every path a caller supplies — virtual, relative, adversarial — passes
//! through [`PathGuard`] before any component touches the host filesystem.
//! Validation resolves symlinks on every existing component and requires the
//! result to stay under the canonicalized workspace root; paths that do not
//! exist yet are validated through their nearest existing ancestor.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::{MAX_PATH_COMPONENT_BYTES, MAX_PATH_LENGTH};
use crate::error::SandboxError;

/// Fixed mount point of the virtual workspace inside the Python engine.
pub const VROOT: &str = "/workspace";

/// A caller path that passed confinement.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    /// Normalized virtual path, always `VROOT` or below (`/workspace/a/b`).
    pub virt: String,
    /// Path relative to the workspace root; empty for the root itself.
    pub rel: PathBuf,
    /// Absolute host path (`ROOT` joined with `rel`), not symlink-resolved.
    pub host: PathBuf,
}

impl ResolvedPath {
    /// Workspace-relative form for user-facing messages.
    pub fn display(&self) -> String {
        let text = self.rel.to_string_lossy();
        if text.is_empty() {
            ".".to_owned()
        } else {
            text.into_owned()
        }
    }
}

/// Validates caller paths against one workspace root.
#[derive(Debug)]
pub struct PathGuard {
    root: PathBuf,
    root_real: PathBuf,
}

impl PathGuard {
    /// Capture the canonicalized workspace root. The directory must exist.
    pub fn new(root: &Path) -> Result<Self, SandboxError> {
        let root_real = root.canonicalize().map_err(|e| {
            SandboxError::InvalidPath(format!("workspace root is not usable: {e}"))
        })?;
        Ok(Self {
            root: root.to_path_buf(),
            root_real,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The canonical root every confinement check compares against.
    pub fn root_real(&self) -> &Path {
        &self.root_real
    }

    /// Full validation: normalize, map to the host, resolve symlinks on
    /// every existing component, and require the result to stay confined.
    ///
    /// The final component of a not-yet-existing path is exempt from
    /// resolution (there is nothing to resolve); its nearest existing
    /// ancestor carries the check instead.
    pub fn validate(&self, input: &str) -> Result<ResolvedPath, SandboxError> {
        let resolved = self.map_to_host(input)?;
        let real = self.realpath_existing_prefix(&resolved)?;
        self.check_confined(&real, &resolved)?;
        Ok(resolved)
    }

    /// Validate the parent directory only, leaving the final component
    /// untouched. Used for lstat/readlink and for unlinking a symlink: the
    /// operation targets the link itself, not what it points to.
    pub fn validate_parent(&self, input: &str) -> Result<ResolvedPath, SandboxError> {
        let resolved = self.map_to_host(input)?;
        let parent_virt = match resolved.virt.rsplit_once('/') {
            Some((parent, _)) if parent.len() >= VROOT.len() => parent.to_owned(),
            _ => VROOT.to_owned(),
        };
        let parent = self.map_to_host(&parent_virt)?;
        let real = self.realpath_existing_prefix(&parent)?;
        self.check_confined(&real, &parent)?;
        Ok(resolved)
    }

    /// Validate a symlink creation: the link's parent must be confined, and
    /// the link *target*, resolved relative to that parent, must be confined
    /// as well — a link pointing outside is rejected even though the link
    /// itself would sit inside the workspace.
    pub fn validate_symlink(
        &self,
        link: &str,
        target: &str,
    ) -> Result<ResolvedPath, SandboxError> {
        let link_resolved = self.validate_parent(link)?;
        if target.is_empty() || target.contains('\0') {
            return Err(SandboxError::InvalidPath(
                "symlink target is empty or contains NUL".into(),
            ));
        }
        let target_virt = if target.starts_with('/') {
            target.to_owned()
        } else {
            // Relative targets resolve against the link's parent directory.
            let parent = match link_resolved.virt.rsplit_once('/') {
                Some((parent, _)) if parent.len() >= VROOT.len() => parent,
                _ => VROOT,
            };
            format!("{parent}/{target}")
        };
        // Confine the target like any other caller path; an escaping target
        // fails here with PathEscape/SymlinkEscape.
        self.validate(&target_virt)?;
        Ok(link_resolved)
    }

    /// Normalize `input` into virtual + host forms without touching the
    /// filesystem. Rejects NUL bytes, over-long paths, absolute paths
    /// outside the virtual root, and any traversal above it.
    fn map_to_host(&self, input: &str) -> Result<ResolvedPath, SandboxError> {
        if input.is_empty() {
            return Err(SandboxError::InvalidPath("path is empty".into()));
        }
        if input.contains('\0') {
            return Err(SandboxError::InvalidPath("path contains NUL byte".into()));
        }
        if input.len() > MAX_PATH_LENGTH {
            return Err(SandboxError::InvalidPath(format!(
                "path too long: {} bytes (max {})",
                input.len(),
                MAX_PATH_LENGTH
            )));
        }

        // Absolute inputs must name the virtual workspace; everything else
        // absolute is an escape by construction.
        let virtual_input = if let Some(rest) = input.strip_prefix(VROOT)
            && (rest.is_empty() || rest.starts_with('/'))
        {
            input.to_owned()
        } else if input.starts_with('/') {
            return Err(SandboxError::PathEscape(input.to_owned()));
        } else {
            format!("{VROOT}/{input}")
        };

        // POSIX normalization over the virtual path: collapse `.`, resolve
        // `..` segments, drop redundant separators. Popping past the virtual
        // root is an escape.
        let mut segments: Vec<&str> = Vec::new();
        for segment in virtual_input.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.len() <= 1 {
                        return Err(SandboxError::PathEscape(input.to_owned()));
                    }
                    segments.pop();
                }
                name => {
                    if name.len() > MAX_PATH_COMPONENT_BYTES {
                        return Err(SandboxError::InvalidPath(format!(
                            "path component too long: {} bytes (max {})",
                            name.len(),
                            MAX_PATH_COMPONENT_BYTES
                        )));
                    }
                    segments.push(name);
                }
            }
        }

        debug_assert_eq!(segments.first().copied(), Some("workspace"));
        let virt = format!("/{}", segments.join("/"));
        if virt != VROOT && !virt.starts_with("/workspace/") {
            return Err(SandboxError::PathEscape(input.to_owned()));
        }
        // Defense in depth: nothing above may have left a traversal segment.
        if segments.iter().any(|s| *s == "..") {
            return Err(SandboxError::PathEscape(input.to_owned()));
        }

        let rel: PathBuf = segments[1..].iter().collect();
        let host = self.root.join(&rel);
        Ok(ResolvedPath { virt, rel, host })
    }

    /// Canonicalize as much of `host` as exists, walking toward the root
    /// past missing components and re-appending them afterwards. A missing
    /// component that exists as a broken symlink is rejected outright —
    /// writing through it would materialize the file at the link target.
    fn realpath_existing_prefix(
        &self,
        resolved: &ResolvedPath,
    ) -> Result<PathBuf, SandboxError> {
        let mut cursor = resolved.host.clone();
        let mut missing: Vec<OsString> = Vec::new();
        loop {
            match cursor.canonicalize() {
                Ok(mut real) => {
                    for part in missing.iter().rev() {
                        real.push(part);
                    }
                    return Ok(real);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if cursor.symlink_metadata().is_ok() {
                        // Exists as a dangling symlink.
                        return Err(SandboxError::SymlinkEscape(resolved.display()));
                    }
                    let Some(name) = cursor.file_name() else {
                        return Err(SandboxError::InvalidPath(resolved.display()));
                    };
                    missing.push(name.to_os_string());
                    if !cursor.pop() {
                        return Err(SandboxError::InvalidPath(resolved.display()));
                    }
                }
                Err(_) => {
                    // Symlink loops and permission failures during resolution
                    // are treated as escapes: the path cannot be proven
                    // confined.
                    return Err(SandboxError::SymlinkEscape(resolved.display()));
                }
            }
        }
    }

    fn check_confined(
        &self,
        real: &Path,
        resolved: &ResolvedPath,
    ) -> Result<(), SandboxError> {
        if real == self.root_real || real.starts_with(&self.root_real) {
            Ok(())
        } else {
            Err(SandboxError::SymlinkEscape(resolved.display()))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
