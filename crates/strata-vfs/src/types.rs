//! Shared data types for VFS and backend operations.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Kind of filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
    Symlink,
}

/// Metadata about a filesystem node.
///
/// Timestamps are optional; backends unable to track them omit them and
/// the adaptation layer defaults to the epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stat {
    /// Kind of node.
    pub kind: NodeKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time, if available.
    pub modified: Option<SystemTime>,
    /// Creation time, if available.
    pub created: Option<SystemTime>,
    /// False when the owning mount is read-only.
    pub writable: bool,
}

impl Stat {
    /// Metadata for a regular file of the given size.
    pub fn file(size: u64) -> Self {
        Self {
            kind: NodeKind::File,
            size,
            modified: None,
            created: None,
            writable: true,
        }
    }

    /// Metadata for a directory.
    pub fn directory() -> Self {
        Self {
            kind: NodeKind::Directory,
            size: 0,
            modified: None,
            created: None,
            writable: true,
        }
    }

    /// Metadata for a symbolic link.
    pub fn symlink() -> Self {
        Self {
            kind: NodeKind::Symlink,
            size: 0,
            modified: None,
            created: None,
            writable: true,
        }
    }

    /// Returns true if this node is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    /// Returns true if this node is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Returns true if this node is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.kind == NodeKind::Symlink
    }

    /// Modification time, defaulting to the epoch when unknown.
    pub fn modified_or_epoch(&self) -> SystemTime {
        self.modified.unwrap_or(SystemTime::UNIX_EPOCH)
    }

    /// Creation time, defaulting to the epoch when unknown.
    pub fn created_or_epoch(&self) -> SystemTime {
        self.created.unwrap_or(SystemTime::UNIX_EPOCH)
    }
}

/// A directory entry returned by `readdir`.
///
/// In a flat listing `name` is a single path segment. In a recursive
/// listing it is the full relative path from the queried directory,
/// joined with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name.
    pub name: String,
    /// Kind of entry.
    pub kind: NodeKind,
}

impl DirEntry {
    /// Create a file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::File,
        }
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Directory,
        }
    }

    /// Create a symlink entry.
    pub fn symlink(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Symlink,
        }
    }
}

/// Options for `write_file`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Append to existing content instead of replacing it.
    pub append: bool,
    /// Fail with `EEXIST` if the target already exists.
    pub exclusive: bool,
}

impl WriteOptions {
    /// Append mode.
    pub fn append() -> Self {
        Self {
            append: true,
            exclusive: false,
        }
    }

    /// Exclusive-create mode.
    pub fn exclusive() -> Self {
        Self {
            append: false,
            exclusive: true,
        }
    }
}

/// Options for `readdir`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadDirOptions {
    /// List the whole subtree. Entry names become relative paths from the
    /// queried directory. The derivation layer's own walk reports
    /// directories as distinct entries; a backend with a native recursive
    /// listing may omit implicit directories — callers must tolerate both.
    pub recursive: bool,
}

/// Options for `mkdir`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MkdirOptions {
    /// Create missing ancestors, and treat an existing directory at the
    /// target as success.
    pub recursive: bool,
}

/// Options for `rm`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RmOptions {
    /// Remove directories and their contents.
    pub recursive: bool,
    /// Ignore a missing target.
    pub force: bool,
}

/// Options for `cp`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOptions {
    /// Copy directories recursively. Without this, a directory source
    /// fails with `EISDIR`.
    pub recursive: bool,
}
