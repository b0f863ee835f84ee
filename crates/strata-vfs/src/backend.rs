//! Primitive backend contracts.
//!
//! A mountable backend implements one (or both) of two interface shapes:
//!
//! - [`AsyncBackend`]: streaming contract — stat, readable-stream factory,
//!   writable-stream factory, readdir, mkdir, remove, optional symlinks.
//! - [`SyncBackend`]: the same operation set with direct byte buffers, for
//!   callers in a synchronous execution context.
//!
//! Everything richer (whole-file read/write, append, exclusive create,
//! rename, recursive copy, truncate, …) is derived from these primitives
//! by the [`crate::ops`] layer. Backends that can do better than the
//! derivation declare it in [`Capabilities`] and implement the matching
//! optional method; the descriptor is resolved once when the backend is
//! wrapped in a [`BackendHandle`], never re-probed per call.
//!
//! Paths handed to a backend are always normalized and rooted at the
//! backend itself (`/` = backend root). `stat` reports the node at exactly
//! the given path — symlink following is the derivation layer's job.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{VfsError, VfsResult};
use crate::types::{DirEntry, Stat};

/// Byte range for ranged reads. `end` is inclusive; `None` reads to EOF.
#[derive(Debug, Clone, Copy)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Range from `start` to EOF.
    pub fn from(start: u64) -> Self {
        Self { start, end: None }
    }

    /// Inclusive range `start..=end`.
    pub fn inclusive(start: u64, end: u64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// Slice `data` to this range (saturating at the buffer's length).
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let len = data.len() as u64;
        let start = self.start.min(len) as usize;
        let end = match self.end {
            Some(end) => end.saturating_add(1).min(len) as usize,
            None => data.len(),
        };
        &data[start..end.max(start)]
    }
}

/// Mode for write streams and buffered writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteFlags {
    /// Replace existing content (`w`).
    #[default]
    Truncate,
    /// Append to existing content (`a`).
    Append,
    /// Overwrite in place from `start`, zero-filling any gap beyond the
    /// current end (`r+`).
    Overwrite,
}

/// Options for opening a write stream (or a buffered write).
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteStreamOptions {
    pub flags: WriteFlags,
    /// Byte offset for [`WriteFlags::Overwrite`]; ignored otherwise.
    pub start: Option<u64>,
}

impl WriteStreamOptions {
    pub fn truncate() -> Self {
        Self::default()
    }

    pub fn append() -> Self {
        Self {
            flags: WriteFlags::Append,
            start: None,
        }
    }

    pub fn overwrite_at(start: u64) -> Self {
        Self {
            flags: WriteFlags::Overwrite,
            start: Some(start),
        }
    }
}

/// Capability descriptor for a backend, resolved once at mount time.
///
/// Flags only widen what the derivation layer may call; the primitive set
/// is always required.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    /// `symlink` / `read_link` are implemented.
    pub symlinks: bool,
    /// Ranged reads are honored without materializing the whole object.
    pub ranged_reads: bool,
    /// Whole-file `read_file` / `write_file` overrides are implemented.
    pub whole_file: bool,
    /// Native `rename` is implemented.
    pub rename: bool,
    /// `set_modified` is implemented.
    pub set_modified: bool,
}

/// Asynchronous streaming backend contract.
#[async_trait]
pub trait AsyncBackend: Send + Sync {
    /// Capability descriptor. Resolved once when the backend is mounted.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Backend kind identifier (e.g. "memory", "sqlite"), for diagnostics.
    fn kind(&self) -> &'static str;

    /// True if this backend rejects mutation.
    fn read_only(&self) -> bool {
        false
    }

    /// Metadata for the node at exactly `path`; `Ok(None)` when absent.
    async fn stat(&self, path: &str) -> VfsResult<Option<Stat>>;

    /// Open a byte stream over a file's content.
    async fn open_read(
        &self,
        path: &str,
        range: Option<ByteRange>,
    ) -> VfsResult<Box<dyn AsyncRead + Send + Unpin>>;

    /// Open a byte sink. Content becomes visible when the sink is shut
    /// down; an abandoned sink discards its buffer.
    async fn open_write(
        &self,
        path: &str,
        opts: WriteStreamOptions,
    ) -> VfsResult<Box<dyn AsyncWrite + Send + Unpin>>;

    /// List the direct children of a directory, in any order.
    async fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>>;

    /// Create a single directory; the parent is guaranteed to exist.
    async fn mkdir(&self, path: &str) -> VfsResult<()>;

    /// Remove a single node; a directory must be empty.
    async fn remove(&self, path: &str) -> VfsResult<()>;

    /// Create a symlink at `link` pointing at `target`.
    async fn symlink(&self, link: &str, target: &str) -> VfsResult<()> {
        let _ = target;
        Err(VfsError::Unsupported(format!("symlink: {link}")))
    }

    /// Read a symlink's target without following it.
    async fn read_link(&self, path: &str) -> VfsResult<String> {
        Err(VfsError::Unsupported(format!("readlink: {path}")))
    }

    /// Whole-file read override (`Capabilities::whole_file`).
    async fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        Err(VfsError::Unsupported(format!("read_file: {path}")))
    }

    /// Whole-file write override (`Capabilities::whole_file`).
    async fn write_file(&self, path: &str, data: &[u8], append: bool) -> VfsResult<()> {
        let _ = (data, append);
        Err(VfsError::Unsupported(format!("write_file: {path}")))
    }

    /// Native rename override (`Capabilities::rename`). Both paths are on
    /// this backend.
    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let _ = to;
        Err(VfsError::Unsupported(format!("rename: {from}")))
    }

    /// Set a node's modification time (`Capabilities::set_modified`).
    async fn set_modified(&self, path: &str, mtime: SystemTime) -> VfsResult<()> {
        let _ = mtime;
        Err(VfsError::Unsupported(format!("set_modified: {path}")))
    }
}

/// Synchronous buffered backend contract.
///
/// The same operation set as [`AsyncBackend`] with direct byte buffers in
/// place of streams. Calls never suspend; implementations must not block
/// for long (an embedded store is fine, a network hop is not).
pub trait SyncBackend: Send + Sync {
    /// Capability descriptor. Resolved once when the backend is mounted.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Backend kind identifier, for diagnostics.
    fn kind(&self) -> &'static str;

    /// True if this backend rejects mutation.
    fn read_only(&self) -> bool {
        false
    }

    /// Metadata for the node at exactly `path`; `Ok(None)` when absent.
    fn stat(&self, path: &str) -> VfsResult<Option<Stat>>;

    /// Read a file's content, optionally restricted to a byte range.
    fn read(&self, path: &str, range: Option<ByteRange>) -> VfsResult<Vec<u8>>;

    /// Write a buffer according to `opts`.
    fn write(&self, path: &str, data: &[u8], opts: WriteStreamOptions) -> VfsResult<()>;

    /// List the direct children of a directory, in any order.
    fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>>;

    /// Create a single directory; the parent is guaranteed to exist.
    fn mkdir(&self, path: &str) -> VfsResult<()>;

    /// Remove a single node; a directory must be empty.
    fn remove(&self, path: &str) -> VfsResult<()>;

    /// Create a symlink at `link` pointing at `target`.
    fn symlink(&self, link: &str, target: &str) -> VfsResult<()> {
        let _ = target;
        Err(VfsError::Unsupported(format!("symlink: {link}")))
    }

    /// Read a symlink's target without following it.
    fn read_link(&self, path: &str) -> VfsResult<String> {
        Err(VfsError::Unsupported(format!("readlink: {path}")))
    }

    /// Native rename override (`Capabilities::rename`).
    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let _ = to;
        Err(VfsError::Unsupported(format!("rename: {from}")))
    }

    /// Set a node's modification time (`Capabilities::set_modified`).
    fn set_modified(&self, path: &str, mtime: SystemTime) -> VfsResult<()> {
        let _ = mtime;
        Err(VfsError::Unsupported(format!("set_modified: {path}")))
    }
}

/// A mountable backend: an async arm, a sync arm, or both, plus the
/// capability descriptor resolved at construction.
///
/// The derivation layer prefers the async arm and falls back to the sync
/// arm; the sync consumer surface requires the sync arm. Handle identity
/// (`Arc::ptr_eq`) is what makes two paths "the same backend" for the
/// cross-mount rename check.
pub struct BackendHandle {
    async_arm: Option<Arc<dyn AsyncBackend>>,
    sync_arm: Option<Arc<dyn SyncBackend>>,
    caps: Capabilities,
    kind: &'static str,
    read_only: bool,
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle")
            .field("kind", &self.kind)
            .field("async", &self.async_arm.is_some())
            .field("sync", &self.sync_arm.is_some())
            .field("caps", &self.caps)
            .finish()
    }
}

impl BackendHandle {
    /// Wrap an async-only backend.
    pub fn from_async(fs: Arc<dyn AsyncBackend>) -> Arc<Self> {
        Arc::new(Self {
            caps: fs.capabilities(),
            kind: fs.kind(),
            read_only: fs.read_only(),
            async_arm: Some(fs),
            sync_arm: None,
        })
    }

    /// Wrap a sync-only backend.
    pub fn from_sync(fs: Arc<dyn SyncBackend>) -> Arc<Self> {
        Arc::new(Self {
            caps: fs.capabilities(),
            kind: fs.kind(),
            read_only: fs.read_only(),
            async_arm: None,
            sync_arm: Some(fs),
        })
    }

    /// Wrap a backend implementing both contracts. The capability
    /// descriptor is taken from the async arm.
    pub fn from_pair(async_fs: Arc<dyn AsyncBackend>, sync_fs: Arc<dyn SyncBackend>) -> Arc<Self> {
        Arc::new(Self {
            caps: async_fs.capabilities(),
            kind: async_fs.kind(),
            read_only: async_fs.read_only(),
            async_arm: Some(async_fs),
            sync_arm: Some(sync_fs),
        })
    }

    /// The capability descriptor resolved at construction.
    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// Backend kind identifier.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// True if the backend rejects mutation.
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn async_arm(&self) -> Option<&Arc<dyn AsyncBackend>> {
        self.async_arm.as_ref()
    }

    pub(crate) fn sync_arm(&self) -> Option<&Arc<dyn SyncBackend>> {
        self.sync_arm.as_ref()
    }

    /// The sync arm, or `ENOSYS` when this backend is async-only.
    pub(crate) fn require_sync(&self, path: &str) -> VfsResult<&Arc<dyn SyncBackend>> {
        self.sync_arm.as_ref().ok_or_else(|| {
            VfsError::Unsupported(format!("{}: no synchronous backend for {path}", self.kind))
        })
    }
}
