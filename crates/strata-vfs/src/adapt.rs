//! Adaptation between VFS types and the host runtime's native filesystem
//! types.
//!
//! Two directions: real-filesystem metadata and entries become [`Stat`]
//! and [`DirEntry`] (for fall-through), and [`VfsError`] becomes a
//! `std::io::Error` whose kind matches the POSIX code (for consumers that
//! speak `io::Result`). Timestamps unknown to a backend default to the
//! epoch at the edges, never inside the core.

use std::io;

use crate::error::VfsError;
use crate::types::{DirEntry, NodeKind, Stat};

impl From<VfsError> for io::Error {
    fn from(err: VfsError) -> Self {
        use io::ErrorKind;
        let kind = match &err {
            VfsError::NotFound(_) => ErrorKind::NotFound,
            VfsError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            VfsError::IsADirectory(_) => ErrorKind::IsADirectory,
            VfsError::NotADirectory(_) => ErrorKind::NotADirectory,
            VfsError::NotEmpty(_) => ErrorKind::DirectoryNotEmpty,
            VfsError::LinkLoop(_) => ErrorKind::FilesystemLoop,
            VfsError::Unsupported(_) => ErrorKind::Unsupported,
            VfsError::CrossMount(_, _) => ErrorKind::CrossesDevices,
            VfsError::Invalid(_)
            | VfsError::InvalidMount(_)
            | VfsError::AlreadyMounted(_)
            | VfsError::OverlappingMount(_, _) => ErrorKind::InvalidInput,
            VfsError::Io(_) => ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

/// Node kind from a real-filesystem file type.
pub fn kind_from_file_type(ft: std::fs::FileType) -> NodeKind {
    if ft.is_symlink() {
        NodeKind::Symlink
    } else if ft.is_dir() {
        NodeKind::Directory
    } else {
        NodeKind::File
    }
}

/// [`Stat`] from real-filesystem metadata.
pub fn stat_from_metadata(meta: &std::fs::Metadata) -> Stat {
    Stat {
        kind: kind_from_file_type(meta.file_type()),
        size: if meta.is_dir() { 0 } else { meta.len() },
        modified: meta.modified().ok(),
        created: meta.created().ok(),
        writable: !meta.permissions().readonly(),
    }
}

/// [`DirEntry`] from a real-filesystem entry name and type.
pub fn entry_from_file_type(name: String, ft: std::fs::FileType) -> DirEntry {
    DirEntry {
        name,
        kind: kind_from_file_type(ft),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vfs_error_keeps_kind_and_message() {
        let err: io::Error = VfsError::NotFound("/x".to_string()).into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("/x"));

        let err: io::Error = VfsError::NotEmpty("/d".to_string()).into();
        assert_eq!(err.kind(), io::ErrorKind::DirectoryNotEmpty);

        let err: io::Error = VfsError::CrossMount("/a".to_string(), "/b".to_string()).into();
        assert_eq!(err.kind(), io::ErrorKind::CrossesDevices);
    }

    #[test]
    fn metadata_adapts_to_stat() {
        let meta = std::fs::metadata(".").unwrap();
        let st = stat_from_metadata(&meta);
        assert!(st.is_dir());
        assert_eq!(st.size, 0);
    }
}
