//! Error taxonomy for VFS operations.
//!
//! Every failure carries exactly one machine-readable POSIX-style code,
//! available via [`VfsError::code`]. Registry configuration errors
//! (`InvalidMount`, `AlreadyMounted`, `OverlappingMount`) are raised
//! synchronously at mount time and are not filesystem I/O errors.

use std::io;
use thiserror::Error;

/// Result type for VFS operations.
pub type VfsResult<T> = Result<T, VfsError>;

/// VFS operation errors.
#[derive(Debug, Clone, Error)]
pub enum VfsError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("directory not empty: {0}")]
    NotEmpty(String),
    #[error("invalid argument: {0}")]
    Invalid(String),
    #[error("too many levels of symbolic links: {0}")]
    LinkLoop(String),
    #[error("operation not supported: {0}")]
    Unsupported(String),
    #[error("cross-mount operation: {0} -> {1}")]
    CrossMount(String, String),
    #[error("invalid mount point: {0}")]
    InvalidMount(String),
    #[error("already mounted: {0}")]
    AlreadyMounted(String),
    #[error("overlapping mount: {0} conflicts with {1}")]
    OverlappingMount(String, String),
    #[error("io error: {0}")]
    Io(String),
}

impl VfsError {
    /// The POSIX-style code string for this error.
    ///
    /// Registry configuration errors map to `EINVAL`; they never escape a
    /// successful `mount()` call into the I/O paths.
    pub fn code(&self) -> &'static str {
        match self {
            VfsError::NotFound(_) => "ENOENT",
            VfsError::AlreadyExists(_) => "EEXIST",
            VfsError::IsADirectory(_) => "EISDIR",
            VfsError::NotADirectory(_) => "ENOTDIR",
            VfsError::NotEmpty(_) => "ENOTEMPTY",
            VfsError::Invalid(_) => "EINVAL",
            VfsError::LinkLoop(_) => "ELOOP",
            VfsError::Unsupported(_) => "ENOSYS",
            VfsError::CrossMount(_, _) => "EXDEV",
            VfsError::InvalidMount(_)
            | VfsError::AlreadyMounted(_)
            | VfsError::OverlappingMount(_, _) => "EINVAL",
            VfsError::Io(_) => "EIO",
        }
    }

    /// True if this error means "the path does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound(_))
    }
}

impl From<io::Error> for VfsError {
    fn from(err: io::Error) -> Self {
        use io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => VfsError::NotFound(err.to_string()),
            ErrorKind::AlreadyExists => VfsError::AlreadyExists(err.to_string()),
            ErrorKind::IsADirectory => VfsError::IsADirectory(err.to_string()),
            ErrorKind::NotADirectory => VfsError::NotADirectory(err.to_string()),
            ErrorKind::DirectoryNotEmpty => VfsError::NotEmpty(err.to_string()),
            ErrorKind::InvalidInput => VfsError::Invalid(err.to_string()),
            ErrorKind::FilesystemLoop => VfsError::LinkLoop(err.to_string()),
            ErrorKind::Unsupported => VfsError::Unsupported(err.to_string()),
            ErrorKind::CrossesDevices => VfsError::CrossMount(err.to_string(), String::new()),
            _ => VfsError::Io(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_cover_the_fixed_vocabulary() {
        assert_eq!(VfsError::NotFound("x".into()).code(), "ENOENT");
        assert_eq!(VfsError::AlreadyExists("x".into()).code(), "EEXIST");
        assert_eq!(VfsError::IsADirectory("x".into()).code(), "EISDIR");
        assert_eq!(VfsError::NotADirectory("x".into()).code(), "ENOTDIR");
        assert_eq!(VfsError::NotEmpty("x".into()).code(), "ENOTEMPTY");
        assert_eq!(VfsError::Invalid("x".into()).code(), "EINVAL");
        assert_eq!(VfsError::LinkLoop("x".into()).code(), "ELOOP");
        assert_eq!(VfsError::Unsupported("x".into()).code(), "ENOSYS");
        assert_eq!(VfsError::CrossMount("a".into(), "b".into()).code(), "EXDEV");
    }

    #[test]
    fn io_error_round_trips_by_kind() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let vfs: VfsError = err.into();
        assert!(vfs.is_not_found());

        let err = io::Error::new(io::ErrorKind::DirectoryNotEmpty, "busy");
        let vfs: VfsError = err.into();
        assert_eq!(vfs.code(), "ENOTEMPTY");
    }
}
