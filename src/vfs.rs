//! The virtual filesystem the embedded Python engine mounts.
//!
//! [`VirtualFs`] is the capability contract the engine and the sync layer
//! share: mkdir-tree, read, write, stat, readdir, unlink, rmdir. [`MemFs`]
//! is the canonical in-memory tree, mounted at `/workspace` inside the
//! engine and shared with the sync engine on the host side.

use std::collections::BTreeMap;
use std::sync::Mutex;

use thiserror::Error;

/// Failures inside the virtual filesystem.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VfsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    #[error("invalid virtual path: {0}")]
    InvalidPath(String),
}

/// Metadata for one virtual entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtStat {
    pub is_directory: bool,
    pub size: u64,
}

/// Capability interface over the engine's in-memory filesystem.
///
/// Paths are absolute virtual paths (`/workspace/...`). All operations are
/// synchronous; the tree lives entirely in memory.
pub trait VirtualFs: Send + Sync {
    /// Create a directory and all missing ancestors. Existing directories
    /// are not an error.
    fn mkdir_tree(&self, path: &str) -> Result<(), VfsError>;
    /// Write a file, replacing any previous content. The parent directory
    /// must exist.
    fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), VfsError>;
    fn read_file(&self, path: &str) -> Result<Vec<u8>, VfsError>;
    fn stat(&self, path: &str) -> Result<VirtStat, VfsError>;
    fn read_dir(&self, path: &str) -> Result<Vec<String>, VfsError>;
    /// Remove a file. Directories are rejected with `IsADirectory`.
    fn unlink(&self, path: &str) -> Result<(), VfsError>;
    /// Remove an empty directory.
    fn rmdir(&self, path: &str) -> Result<(), VfsError>;
    fn exists(&self, path: &str) -> bool;
}

// ============================================================================
// MemFs
// ============================================================================

enum Node {
    File(Vec<u8>),
    Dir(BTreeMap<String, Node>),
}

impl Node {
    fn dir() -> Self {
        Node::Dir(BTreeMap::new())
    }
}

/// In-memory tree with a single root directory.
pub struct MemFs {
    root: Mutex<Node>,
}

impl MemFs {
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Node::dir()),
        }
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

/// Split an absolute virtual path into components. Rejects relative paths
/// and NUL bytes; `.`/`..` never reach the virtual layer (the path guard
/// normalizes first), so their presence here is an error.
fn components(path: &str) -> Result<Vec<&str>, VfsError> {
    if !path.starts_with('/') || path.contains('\0') {
        return Err(VfsError::InvalidPath(path.to_owned()));
    }
    let mut parts = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" => {}
            "." | ".." => return Err(VfsError::InvalidPath(path.to_owned())),
            name => parts.push(name),
        }
    }
    Ok(parts)
}

impl MemFs {
    /// Walk to the node at `parts`, immutably.
    fn with_node<T>(
        &self,
        path: &str,
        f: impl FnOnce(&Node) -> Result<T, VfsError>,
    ) -> Result<T, VfsError> {
        let parts = components(path)?;
        let root = self.root.lock().unwrap_or_else(|e| e.into_inner());
        let mut node: &Node = &root;
        for part in &parts {
            match node {
                Node::Dir(children) => {
                    node = children
                        .get(*part)
                        .ok_or_else(|| VfsError::NotFound(path.to_owned()))?;
                }
                Node::File(_) => return Err(VfsError::NotADirectory(path.to_owned())),
            }
        }
        f(node)
    }

    /// Walk to the parent directory of `path`, mutably, and hand the final
    /// component to `f`.
    fn with_parent<T>(
        &self,
        path: &str,
        f: impl FnOnce(&mut BTreeMap<String, Node>, &str) -> Result<T, VfsError>,
    ) -> Result<T, VfsError> {
        let parts = components(path)?;
        let Some((name, ancestors)) = parts.split_last() else {
            return Err(VfsError::InvalidPath(path.to_owned()));
        };
        let mut root = self.root.lock().unwrap_or_else(|e| e.into_inner());
        let mut node: &mut Node = &mut root;
        for part in ancestors {
            match node {
                Node::Dir(children) => {
                    node = children
                        .get_mut(*part)
                        .ok_or_else(|| VfsError::NotFound(path.to_owned()))?;
                }
                Node::File(_) => return Err(VfsError::NotADirectory(path.to_owned())),
            }
        }
        match node {
            Node::Dir(children) => f(children, name),
            Node::File(_) => Err(VfsError::NotADirectory(path.to_owned())),
        }
    }
}

impl VirtualFs for MemFs {
    fn mkdir_tree(&self, path: &str) -> Result<(), VfsError> {
        let parts = components(path)?;
        let mut root = self.root.lock().unwrap_or_else(|e| e.into_inner());
        let mut node: &mut Node = &mut root;
        for part in parts {
            match node {
                Node::Dir(children) => {
                    node = children.entry(part.to_owned()).or_insert_with(Node::dir);
                }
                Node::File(_) => return Err(VfsError::NotADirectory(path.to_owned())),
            }
        }
        match node {
            Node::Dir(_) => Ok(()),
            Node::File(_) => Err(VfsError::NotADirectory(path.to_owned())),
        }
    }

    fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), VfsError> {
        self.with_parent(path, |children, name| {
            if matches!(children.get(name), Some(Node::Dir(_))) {
                return Err(VfsError::IsADirectory(path.to_owned()));
            }
            children.insert(name.to_owned(), Node::File(bytes.to_vec()));
            Ok(())
        })
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>, VfsError> {
        self.with_node(path, |node| match node {
            Node::File(bytes) => Ok(bytes.clone()),
            Node::Dir(_) => Err(VfsError::IsADirectory(path.to_owned())),
        })
    }

    fn stat(&self, path: &str) -> Result<VirtStat, VfsError> {
        self.with_node(path, |node| {
            Ok(match node {
                Node::File(bytes) => VirtStat {
                    is_directory: false,
                    size: bytes.len() as u64,
                },
                Node::Dir(_) => VirtStat {
                    is_directory: true,
                    size: 0,
                },
            })
        })
    }

    fn read_dir(&self, path: &str) -> Result<Vec<String>, VfsError> {
        self.with_node(path, |node| match node {
            Node::Dir(children) => Ok(children.keys().cloned().collect()),
            Node::File(_) => Err(VfsError::NotADirectory(path.to_owned())),
        })
    }

    fn unlink(&self, path: &str) -> Result<(), VfsError> {
        self.with_parent(path, |children, name| match children.get(name) {
            Some(Node::File(_)) => {
                children.remove(name);
                Ok(())
            }
            Some(Node::Dir(_)) => Err(VfsError::IsADirectory(path.to_owned())),
            None => Err(VfsError::NotFound(path.to_owned())),
        })
    }

    fn rmdir(&self, path: &str) -> Result<(), VfsError> {
        self.with_parent(path, |children, name| match children.get(name) {
            Some(Node::Dir(entries)) => {
                if entries.is_empty() {
                    children.remove(name);
                    Ok(())
                } else {
                    Err(VfsError::DirectoryNotEmpty(path.to_owned()))
                }
            }
            Some(Node::File(_)) => Err(VfsError::NotADirectory(path.to_owned())),
            None => Err(VfsError::NotFound(path.to_owned())),
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.with_node(path, |_| Ok(())).is_ok()
    }
}

// ============================================================================
// Tests
// ============================================================================
