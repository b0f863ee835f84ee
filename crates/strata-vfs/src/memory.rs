//! In-memory backend.
//!
//! Ephemeral storage for scratch mounts and tests. Implements both the
//! async-streaming and the sync-buffered contracts over one shared node
//! table; cloning a `MemoryFs` shares the table.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::backend::{
    AsyncBackend, BackendHandle, ByteRange, Capabilities, SyncBackend, WriteFlags,
    WriteStreamOptions,
};
use crate::error::{VfsError, VfsResult};
use crate::path;
use crate::types::{DirEntry, NodeKind, Stat};

#[derive(Debug, Clone)]
enum NodeBody {
    File(Vec<u8>),
    Directory,
    Symlink(String),
}

#[derive(Debug, Clone)]
struct Node {
    body: NodeBody,
    created: SystemTime,
    modified: SystemTime,
}

impl Node {
    fn new(body: NodeBody) -> Self {
        let now = SystemTime::now();
        Self {
            body,
            created: now,
            modified: now,
        }
    }

    fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::File(_) => NodeKind::File,
            NodeBody::Directory => NodeKind::Directory,
            NodeBody::Symlink(_) => NodeKind::Symlink,
        }
    }
}

/// In-memory filesystem keyed by normalized path. The root `/` always
/// exists as a directory.
#[derive(Debug, Clone)]
pub struct MemoryFs {
    nodes: Arc<RwLock<BTreeMap<String, Node>>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::new(NodeBody::Directory));
        Self {
            nodes: Arc::new(RwLock::new(nodes)),
        }
    }

    /// Wrap this filesystem in a mountable handle exposing both contracts.
    pub fn into_handle(self) -> Arc<BackendHandle> {
        let fs = Arc::new(self);
        BackendHandle::from_pair(Arc::clone(&fs) as Arc<dyn AsyncBackend>, fs)
    }

    fn read_nodes(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Node>> {
        self.nodes.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_nodes(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Node>> {
        self.nodes.write().unwrap_or_else(|e| e.into_inner())
    }

    fn do_stat(&self, p: &str) -> Option<Stat> {
        let nodes = self.read_nodes();
        let node = nodes.get(p)?;
        let size = match &node.body {
            NodeBody::File(data) => data.len() as u64,
            _ => 0,
        };
        Some(Stat {
            kind: node.kind(),
            size,
            modified: Some(node.modified),
            created: Some(node.created),
            writable: true,
        })
    }

    fn do_read(&self, p: &str, range: Option<ByteRange>) -> VfsResult<Vec<u8>> {
        let nodes = self.read_nodes();
        match nodes.get(p).map(|n| &n.body) {
            None => Err(VfsError::NotFound(p.to_string())),
            Some(NodeBody::Directory) => Err(VfsError::IsADirectory(p.to_string())),
            Some(NodeBody::Symlink(_)) => Err(VfsError::Invalid(p.to_string())),
            Some(NodeBody::File(data)) => Ok(match range {
                Some(r) => r.slice(data).to_vec(),
                None => data.clone(),
            }),
        }
    }

    fn do_write(&self, p: &str, buf: &[u8], opts: WriteStreamOptions) -> VfsResult<()> {
        let mut nodes = self.write_nodes();
        match nodes.get(p).map(|n| &n.body) {
            Some(NodeBody::Directory) => return Err(VfsError::IsADirectory(p.to_string())),
            Some(NodeBody::Symlink(_)) => return Err(VfsError::Invalid(p.to_string())),
            Some(NodeBody::File(_)) => {}
            None => {
                let parent = path::parent_of(p);
                match nodes.get(&parent).map(|n| &n.body) {
                    Some(NodeBody::Directory) => {}
                    Some(_) => return Err(VfsError::NotADirectory(parent)),
                    None => return Err(VfsError::NotFound(parent)),
                }
            }
        }

        let existing = match nodes.get(p).map(|n| &n.body) {
            Some(NodeBody::File(data)) => data.clone(),
            _ => Vec::new(),
        };
        let data = match opts.flags {
            WriteFlags::Truncate => buf.to_vec(),
            WriteFlags::Append => {
                let mut data = existing;
                data.extend_from_slice(buf);
                data
            }
            WriteFlags::Overwrite => {
                let start = opts.start.unwrap_or(0) as usize;
                let mut data = existing;
                if data.len() < start {
                    data.resize(start, 0);
                }
                let end = start + buf.len();
                if data.len() < end {
                    data.resize(end, 0);
                }
                data[start..end].copy_from_slice(buf);
                data
            }
        };

        match nodes.get_mut(p) {
            Some(node) => {
                node.body = NodeBody::File(data);
                node.modified = SystemTime::now();
            }
            None => {
                nodes.insert(p.to_string(), Node::new(NodeBody::File(data)));
            }
        }
        Ok(())
    }

    fn do_readdir(&self, p: &str) -> VfsResult<Vec<DirEntry>> {
        let nodes = self.read_nodes();
        match nodes.get(p).map(|n| &n.body) {
            None => return Err(VfsError::NotFound(p.to_string())),
            Some(NodeBody::Directory) => {}
            Some(_) => return Err(VfsError::NotADirectory(p.to_string())),
        }

        let mut entries = Vec::new();
        for (key, node) in nodes.iter() {
            if key != "/" && path::parent_of(key) == *p {
                entries.push(DirEntry {
                    name: path::base_name(key),
                    kind: node.kind(),
                });
            }
        }
        Ok(entries)
    }

    fn do_mkdir(&self, p: &str) -> VfsResult<()> {
        let mut nodes = self.write_nodes();
        if nodes.contains_key(p) {
            return Err(VfsError::AlreadyExists(p.to_string()));
        }
        let parent = path::parent_of(p);
        match nodes.get(&parent).map(|n| &n.body) {
            Some(NodeBody::Directory) => {}
            Some(_) => return Err(VfsError::NotADirectory(parent)),
            None => return Err(VfsError::NotFound(parent)),
        }
        nodes.insert(p.to_string(), Node::new(NodeBody::Directory));
        Ok(())
    }

    fn do_remove(&self, p: &str) -> VfsResult<()> {
        if p == "/" {
            return Err(VfsError::Invalid("cannot remove root".to_string()));
        }
        let mut nodes = self.write_nodes();
        match nodes.get(p).map(|n| &n.body) {
            None => return Err(VfsError::NotFound(p.to_string())),
            Some(NodeBody::Directory) => {
                let has_children = nodes.keys().any(|k| k != "/" && path::parent_of(k) == *p);
                if has_children {
                    return Err(VfsError::NotEmpty(p.to_string()));
                }
            }
            Some(_) => {}
        }
        nodes.remove(p);
        Ok(())
    }

    fn do_symlink(&self, link: &str, target: &str) -> VfsResult<()> {
        let mut nodes = self.write_nodes();
        if nodes.contains_key(link) {
            return Err(VfsError::AlreadyExists(link.to_string()));
        }
        let parent = path::parent_of(link);
        match nodes.get(&parent).map(|n| &n.body) {
            Some(NodeBody::Directory) => {}
            Some(_) => return Err(VfsError::NotADirectory(parent)),
            None => return Err(VfsError::NotFound(parent)),
        }
        nodes.insert(
            link.to_string(),
            Node::new(NodeBody::Symlink(target.to_string())),
        );
        Ok(())
    }

    fn do_read_link(&self, p: &str) -> VfsResult<String> {
        let nodes = self.read_nodes();
        match nodes.get(p).map(|n| &n.body) {
            None => Err(VfsError::NotFound(p.to_string())),
            Some(NodeBody::Symlink(target)) => Ok(target.clone()),
            Some(_) => Err(VfsError::Invalid(p.to_string())),
        }
    }

    fn do_set_modified(&self, p: &str, mtime: SystemTime) -> VfsResult<()> {
        let mut nodes = self.write_nodes();
        match nodes.get_mut(p) {
            None => Err(VfsError::NotFound(p.to_string())),
            Some(node) => {
                node.modified = mtime;
                Ok(())
            }
        }
    }

    fn caps() -> Capabilities {
        Capabilities {
            symlinks: true,
            ranged_reads: true,
            whole_file: true,
            rename: false,
            set_modified: true,
        }
    }
}

#[async_trait]
impl AsyncBackend for MemoryFs {
    fn capabilities(&self) -> Capabilities {
        Self::caps()
    }

    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn stat(&self, path: &str) -> VfsResult<Option<Stat>> {
        Ok(self.do_stat(path))
    }

    async fn open_read(
        &self,
        path: &str,
        range: Option<ByteRange>,
    ) -> VfsResult<Box<dyn AsyncRead + Send + Unpin>> {
        let data = self.do_read(path, range)?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn open_write(
        &self,
        path: &str,
        opts: WriteStreamOptions,
    ) -> VfsResult<Box<dyn AsyncWrite + Send + Unpin>> {
        // Fail target/parent problems at open time, not at shutdown.
        self.do_write_precheck(path)?;
        Ok(Box::new(MemoryWriter {
            fs: self.clone(),
            path: path.to_string(),
            opts,
            buf: Vec::new(),
            committed: false,
        }))
    }

    async fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        self.do_readdir(path)
    }

    async fn mkdir(&self, path: &str) -> VfsResult<()> {
        self.do_mkdir(path)
    }

    async fn remove(&self, path: &str) -> VfsResult<()> {
        self.do_remove(path)
    }

    async fn symlink(&self, link: &str, target: &str) -> VfsResult<()> {
        self.do_symlink(link, target)
    }

    async fn read_link(&self, path: &str) -> VfsResult<String> {
        self.do_read_link(path)
    }

    async fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        self.do_read(path, None)
    }

    async fn write_file(&self, path: &str, data: &[u8], append: bool) -> VfsResult<()> {
        let opts = if append {
            WriteStreamOptions::append()
        } else {
            WriteStreamOptions::truncate()
        };
        self.do_write(path, data, opts)
    }

    async fn set_modified(&self, path: &str, mtime: SystemTime) -> VfsResult<()> {
        self.do_set_modified(path, mtime)
    }
}

impl SyncBackend for MemoryFs {
    fn capabilities(&self) -> Capabilities {
        Self::caps()
    }

    fn kind(&self) -> &'static str {
        "memory"
    }

    fn stat(&self, path: &str) -> VfsResult<Option<Stat>> {
        Ok(self.do_stat(path))
    }

    fn read(&self, path: &str, range: Option<ByteRange>) -> VfsResult<Vec<u8>> {
        self.do_read(path, range)
    }

    fn write(&self, path: &str, data: &[u8], opts: WriteStreamOptions) -> VfsResult<()> {
        self.do_write(path, data, opts)
    }

    fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        self.do_readdir(path)
    }

    fn mkdir(&self, path: &str) -> VfsResult<()> {
        self.do_mkdir(path)
    }

    fn remove(&self, path: &str) -> VfsResult<()> {
        self.do_remove(path)
    }

    fn symlink(&self, link: &str, target: &str) -> VfsResult<()> {
        self.do_symlink(link, target)
    }

    fn read_link(&self, path: &str) -> VfsResult<String> {
        self.do_read_link(path)
    }

    fn set_modified(&self, path: &str, mtime: SystemTime) -> VfsResult<()> {
        self.do_set_modified(path, mtime)
    }
}

impl MemoryFs {
    fn do_write_precheck(&self, p: &str) -> VfsResult<()> {
        let nodes = self.read_nodes();
        match nodes.get(p).map(|n| &n.body) {
            Some(NodeBody::Directory) => Err(VfsError::IsADirectory(p.to_string())),
            Some(NodeBody::Symlink(_)) => Err(VfsError::Invalid(p.to_string())),
            Some(NodeBody::File(_)) => Ok(()),
            None => {
                let parent = path::parent_of(p);
                match nodes.get(&parent).map(|n| &n.body) {
                    Some(NodeBody::Directory) => Ok(()),
                    Some(_) => Err(VfsError::NotADirectory(parent)),
                    None => Err(VfsError::NotFound(parent)),
                }
            }
        }
    }
}

/// Byte sink that buffers writes and commits the file on shutdown. An
/// abandoned writer discards its buffer.
struct MemoryWriter {
    fs: MemoryFs,
    path: String,
    opts: WriteStreamOptions,
    buf: Vec<u8>,
    committed: bool,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.buf.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        if !self.committed {
            self.committed = true;
            let this = &*self;
            this.fs
                .do_write(&this.path, &this.buf, this.opts)
                .map_err(std::io::Error::from)?;
        }
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn root_always_exists() {
        let fs = MemoryFs::new();
        let st = fs.do_stat("/").unwrap();
        assert!(st.is_dir());
    }

    #[test]
    fn write_then_read() {
        let fs = MemoryFs::new();
        fs.do_write("/f", b"hello", WriteStreamOptions::truncate()).unwrap();
        assert_eq!(fs.do_read("/f", None).unwrap(), b"hello");
        assert_eq!(
            fs.do_read("/f", Some(ByteRange::inclusive(1, 3))).unwrap(),
            b"ell"
        );
    }

    #[test]
    fn write_without_parent_fails() {
        let fs = MemoryFs::new();
        let err = fs
            .do_write("/a/b", b"x", WriteStreamOptions::truncate())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn overwrite_at_offset_zero_fills() {
        let fs = MemoryFs::new();
        fs.do_write("/f", b"ab", WriteStreamOptions::truncate()).unwrap();
        fs.do_write("/f", b"z", WriteStreamOptions::overwrite_at(4)).unwrap();
        assert_eq!(fs.do_read("/f", None).unwrap(), b"ab\0\0z");
    }

    #[test]
    fn remove_refuses_root_and_nonempty() {
        let fs = MemoryFs::new();
        assert_eq!(fs.do_remove("/").unwrap_err().code(), "EINVAL");

        fs.do_mkdir("/d").unwrap();
        fs.do_write("/d/f", b"x", WriteStreamOptions::truncate()).unwrap();
        assert_eq!(fs.do_remove("/d").unwrap_err().code(), "ENOTEMPTY");
    }

    #[tokio::test]
    async fn stream_read_and_write() {
        let fs = MemoryFs::new();

        let mut sink = AsyncBackend::open_write(&fs, "/f", WriteStreamOptions::truncate())
            .await
            .unwrap();
        sink.write_all(b"streamed").await.unwrap();
        sink.shutdown().await.unwrap();

        let mut reader = AsyncBackend::open_read(&fs, "/f", None).await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"streamed");
    }

    #[tokio::test]
    async fn abandoned_writer_discards() {
        let fs = MemoryFs::new();
        let sink = AsyncBackend::open_write(&fs, "/f", WriteStreamOptions::truncate())
            .await
            .unwrap();
        drop(sink);
        assert!(fs.do_stat("/f").is_none());
    }
}
