//! Consumer-facing filesystem surface.
//!
//! Drop-in hierarchical-filesystem API: every call resolves its path
//! against the current mount registry (the scope-local one inside
//! [`crate::scope::with_scope`], the process-wide one otherwise). Paths
//! under a mount are served by that mount's backend through the
//! derivation layer; unmounted paths fall through to the real local
//! filesystem (`tokio::fs` here, `std::fs` on the `*_sync` surface).
//!
//! Mount management lives here too: [`mount`], [`unmount`],
//! [`is_mounted`], [`mounts`].

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::adapt;
use crate::backend::BackendHandle;
use crate::error::{VfsError, VfsResult};
use crate::ops;
use crate::ops_sync;
use crate::path;
use crate::registry::{MountInfo, MountMatch};
use crate::scope;
use crate::types::{
    CopyOptions, DirEntry, MkdirOptions, NodeKind, ReadDirOptions, RmOptions, Stat, WriteOptions,
};

// ═══════════════════════════════════════════════════════════════════════════
// Mount management
// ═══════════════════════════════════════════════════════════════════════════

/// Register a backend at `prefix` in the current registry.
pub fn mount(prefix: &str, backend: Arc<BackendHandle>) -> VfsResult<()> {
    scope::current().mount(prefix, backend)
}

/// Remove the mount at `prefix` from the current registry. Returns
/// whether a mount was removed.
pub fn unmount(prefix: &str) -> bool {
    scope::current().unmount(prefix)
}

/// True if some mount in the current registry covers `path`.
pub fn is_mounted(path: &str) -> bool {
    scope::current().is_mounted(path)
}

/// List the current registry's mounts.
pub fn mounts() -> Vec<MountInfo> {
    scope::current().mounts()
}

fn resolve(p: &str) -> Option<MountMatch> {
    scope::current().resolve(p)
}

// ═══════════════════════════════════════════════════════════════════════════
// Async surface
// ═══════════════════════════════════════════════════════════════════════════

/// Read a file's entire content.
pub async fn read_file(p: &str) -> VfsResult<Vec<u8>> {
    match resolve(p) {
        Some(m) => ops::read_file(&m.backend, &m.rel).await,
        None => Ok(tokio::fs::read(Path::new(&path::normalize(p))).await?),
    }
}

/// Write a whole file, honoring [`WriteOptions`] append/exclusive flags.
pub async fn write_file(p: &str, data: &[u8], opts: WriteOptions) -> VfsResult<()> {
    match resolve(p) {
        Some(m) => ops::write_file(&m.backend, &m.rel, data, opts).await,
        None => {
            let full = path::normalize(p);
            let mut file = open_options(opts)
                .open_tokio(Path::new(&full))
                .await?;
            file.write_all(data).await?;
            file.flush().await?;
            Ok(())
        }
    }
}

/// Append to a file, creating it when absent.
pub async fn append_file(p: &str, data: &[u8]) -> VfsResult<()> {
    write_file(p, data, WriteOptions::append()).await
}

/// Read `length` bytes starting at `offset`.
pub async fn read_at(p: &str, offset: u64, length: u64) -> VfsResult<Vec<u8>> {
    match resolve(p) {
        Some(m) => ops::read_at(&m.backend, &m.rel, offset, length).await,
        None => {
            let mut file = tokio::fs::File::open(Path::new(&path::normalize(p))).await?;
            file.seek(SeekFrom::Start(offset)).await?;
            let mut buf = Vec::new();
            file.take(length).read_to_end(&mut buf).await?;
            Ok(buf)
        }
    }
}

/// Write `data` at `offset`, zero-filling any gap beyond the current end.
pub async fn write_at(p: &str, offset: u64, data: &[u8]) -> VfsResult<()> {
    match resolve(p) {
        Some(m) => ops::write_at(&m.backend, &m.rel, offset, data).await,
        None => {
            let mut file = tokio::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(Path::new(&path::normalize(p)))
                .await?;
            file.seek(SeekFrom::Start(offset)).await?;
            file.write_all(data).await?;
            file.flush().await?;
            Ok(())
        }
    }
}

/// Node metadata, following symlinks. `Ok(None)` when absent.
pub async fn stat(p: &str) -> VfsResult<Option<Stat>> {
    match resolve(p) {
        Some(m) => ops::stat(&m.backend, &m.rel, true).await,
        None => match tokio::fs::metadata(Path::new(&path::normalize(p))).await {
            Ok(meta) => Ok(Some(adapt::stat_from_metadata(&meta))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        },
    }
}

/// Node metadata without following a trailing symlink.
pub async fn lstat(p: &str) -> VfsResult<Option<Stat>> {
    match resolve(p) {
        Some(m) => ops::stat(&m.backend, &m.rel, false).await,
        None => match tokio::fs::symlink_metadata(Path::new(&path::normalize(p))).await {
            Ok(meta) => Ok(Some(adapt::stat_from_metadata(&meta))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        },
    }
}

/// List a directory; entries sorted by name.
pub async fn readdir(p: &str, opts: ReadDirOptions) -> VfsResult<Vec<DirEntry>> {
    match resolve(p) {
        Some(m) => ops::readdir(&m.backend, &m.rel, opts).await,
        None => {
            let root = path::normalize(p);
            let mut entries = real_readdir_once(Path::new(&root)).await?;
            if opts.recursive {
                let mut queue: Vec<(String, String)> = entries
                    .iter()
                    .filter(|e| e.kind == NodeKind::Directory)
                    .map(|e| (e.name.clone(), path::join(&root, &e.name)))
                    .collect();
                while let Some((rel, dir)) = queue.pop() {
                    for child in real_readdir_once(Path::new(&dir)).await? {
                        let child_rel = format!("{}/{}", rel, child.name);
                        if child.kind == NodeKind::Directory {
                            queue.push((child_rel.clone(), path::join(&dir, &child.name)));
                        }
                        entries.push(DirEntry {
                            name: child_rel,
                            kind: child.kind,
                        });
                    }
                }
            }
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(entries)
        }
    }
}

async fn real_readdir_once(dir: &Path) -> VfsResult<Vec<DirEntry>> {
    let mut out = Vec::new();
    let mut rd = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        let ft = entry.file_type().await?;
        out.push(adapt::entry_from_file_type(
            entry.file_name().to_string_lossy().into_owned(),
            ft,
        ));
    }
    Ok(out)
}

/// Create a directory. `Some(path)` when created, `None` when it already
/// existed under `recursive`.
pub async fn mkdir(p: &str, opts: MkdirOptions) -> VfsResult<Option<String>> {
    match resolve(p) {
        Some(m) => ops::mkdir(&m.backend, &m.rel, opts).await,
        None => {
            let full = path::normalize(p);
            let target = Path::new(&full);
            if opts.recursive {
                if tokio::fs::metadata(target).await.is_ok_and(|m| m.is_dir()) {
                    return Ok(None);
                }
                tokio::fs::create_dir_all(target).await?;
            } else {
                tokio::fs::create_dir(target).await?;
            }
            Ok(Some(full))
        }
    }
}

/// Remove a node per [`RmOptions`].
pub async fn rm(p: &str, opts: RmOptions) -> VfsResult<()> {
    match resolve(p) {
        Some(m) => ops::rm(&m.backend, &m.rel, opts).await,
        None => {
            let full = path::normalize(p);
            let target = Path::new(&full);
            let meta = match tokio::fs::symlink_metadata(target).await {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return if opts.force {
                        Ok(())
                    } else {
                        Err(VfsError::NotFound(full))
                    };
                }
                Err(e) => return Err(e.into()),
            };
            if meta.is_dir() {
                if opts.recursive {
                    Ok(tokio::fs::remove_dir_all(target).await?)
                } else {
                    Ok(tokio::fs::remove_dir(target).await?)
                }
            } else {
                Ok(tokio::fs::remove_file(target).await?)
            }
        }
    }
}

/// Remove an empty directory.
pub async fn rmdir(p: &str) -> VfsResult<()> {
    match resolve(p) {
        Some(m) => ops::rmdir(&m.backend, &m.rel).await,
        None => Ok(tokio::fs::remove_dir(Path::new(&path::normalize(p))).await?),
    }
}

/// Remove a single non-directory node.
pub async fn unlink(p: &str) -> VfsResult<()> {
    match resolve(p) {
        Some(m) => ops::unlink(&m.backend, &m.rel).await,
        None => {
            let full = path::normalize(p);
            let meta = tokio::fs::symlink_metadata(Path::new(&full)).await?;
            if meta.is_dir() {
                return Err(VfsError::IsADirectory(full));
            }
            Ok(tokio::fs::remove_file(Path::new(&full)).await?)
        }
    }
}

/// Move a node. Both paths must live on the same backend (or both on the
/// real filesystem); anything else fails `EXDEV` — no cross-backend move
/// is attempted automatically.
pub async fn rename(from: &str, to: &str) -> VfsResult<()> {
    let reg = scope::current();
    match (reg.resolve(from), reg.resolve(to)) {
        (Some(a), Some(b)) if Arc::ptr_eq(&a.backend, &b.backend) => {
            ops::rename(&a.backend, &a.rel, &b.rel).await
        }
        (None, None) => Ok(tokio::fs::rename(
            Path::new(&path::normalize(from)),
            Path::new(&path::normalize(to)),
        )
        .await?),
        _ => Err(VfsError::CrossMount(
            path::normalize(from),
            path::normalize(to),
        )),
    }
}

/// Copy a single file.
pub async fn copy_file(src: &str, dst: &str) -> VfsResult<()> {
    let st = lstat(src)
        .await?
        .ok_or_else(|| VfsError::NotFound(path::normalize(src)))?;
    if st.is_dir() {
        return Err(VfsError::IsADirectory(path::normalize(src)));
    }
    copy_one(src, dst, st.kind).await
}

/// Copy a node; directories require [`CopyOptions::recursive`].
///
/// Works across any combination of mounts and the real filesystem by
/// buffering each file wholly through memory.
pub async fn cp(src: &str, dst: &str, opts: CopyOptions) -> VfsResult<()> {
    let src = path::normalize(src);
    let dst = path::normalize(dst);
    let st = lstat(&src)
        .await?
        .ok_or_else(|| VfsError::NotFound(src.clone()))?;
    if dst == src || ops::is_inside(&src, &dst) {
        return Err(VfsError::Invalid(format!("{dst} is inside {src}")));
    }

    match st.kind {
        NodeKind::Directory if !opts.recursive => Err(VfsError::IsADirectory(src)),
        NodeKind::Directory => {
            mkdir(&dst, MkdirOptions { recursive: true }).await?;
            let mut queue = vec![(src, dst)];
            while let Some((src_dir, dst_dir)) = queue.pop() {
                for entry in readdir(&src_dir, ReadDirOptions::default()).await? {
                    let src_child = path::join(&src_dir, &entry.name);
                    let dst_child = path::join(&dst_dir, &entry.name);
                    if entry.kind == NodeKind::Directory {
                        mkdir(&dst_child, MkdirOptions { recursive: true }).await?;
                        queue.push((src_child, dst_child));
                    } else {
                        copy_one(&src_child, &dst_child, entry.kind).await?;
                    }
                }
            }
            Ok(())
        }
        kind => copy_one(&src, &dst, kind).await,
    }
}

/// Copy one non-directory node between any two locations.
async fn copy_one(src: &str, dst: &str, kind: NodeKind) -> VfsResult<()> {
    match kind {
        NodeKind::Symlink => {
            let target = read_link(src).await?;
            symlink(dst, &target).await
        }
        _ => {
            let data = read_file(src).await?;
            write_file(dst, &data, WriteOptions::default()).await
        }
    }
}

/// Existence/access check: `ENOENT` when absent. No permission modeling.
pub async fn access(p: &str) -> VfsResult<()> {
    match stat(p).await? {
        None => Err(VfsError::NotFound(path::normalize(p))),
        Some(_) => Ok(()),
    }
}

/// True if the path exists (following symlinks).
pub async fn exists(p: &str) -> VfsResult<bool> {
    Ok(stat(p).await?.is_some())
}

/// Truncate (or zero-extend) a file to `length` bytes.
pub async fn truncate(p: &str, length: u64) -> VfsResult<()> {
    match resolve(p) {
        Some(m) => ops::truncate(&m.backend, &m.rel, length).await,
        None => {
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .open(Path::new(&path::normalize(p)))
                .await?;
            Ok(file.set_len(length).await?)
        }
    }
}

/// Create a symlink at `link` pointing at `target`.
pub async fn symlink(link: &str, target: &str) -> VfsResult<()> {
    match resolve(link) {
        Some(m) => ops::symlink(&m.backend, &m.rel, target).await,
        None => Ok(tokio::fs::symlink(target, Path::new(&path::normalize(link))).await?),
    }
}

/// Read a symlink's target without following it.
pub async fn read_link(p: &str) -> VfsResult<String> {
    match resolve(p) {
        Some(m) => ops::read_link(&m.backend, &m.rel).await,
        None => {
            let target = tokio::fs::read_link(Path::new(&path::normalize(p))).await?;
            Ok(target.to_string_lossy().into_owned())
        }
    }
}

/// Fully resolve a path: bounded symlink resolution inside a mount,
/// canonicalization on the real filesystem.
pub async fn realpath(p: &str) -> VfsResult<String> {
    match resolve(p) {
        Some(m) => {
            let resolved = ops::resolve_links(&m.backend, &m.rel).await?;
            Ok(rejoin(&m.prefix, &resolved))
        }
        None => {
            let real = tokio::fs::canonicalize(Path::new(&path::normalize(p))).await?;
            Ok(real.to_string_lossy().into_owned())
        }
    }
}

/// Set a file's modification time.
pub async fn utimes(p: &str, mtime: SystemTime) -> VfsResult<()> {
    match resolve(p) {
        Some(m) => ops::utimes(&m.backend, &m.rel, mtime).await,
        None => real_set_modified(&path::normalize(p), mtime),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Sync surface
// ═══════════════════════════════════════════════════════════════════════════

/// Sync variant of [`read_file`].
pub fn read_file_sync(p: &str) -> VfsResult<Vec<u8>> {
    match resolve(p) {
        Some(m) => ops_sync::read_file(&m.backend, &m.rel),
        None => Ok(std::fs::read(Path::new(&path::normalize(p)))?),
    }
}

/// Sync variant of [`write_file`].
pub fn write_file_sync(p: &str, data: &[u8], opts: WriteOptions) -> VfsResult<()> {
    match resolve(p) {
        Some(m) => ops_sync::write_file(&m.backend, &m.rel, data, opts),
        None => {
            let full = path::normalize(p);
            let mut file = open_options(opts).open_std(Path::new(&full))?;
            file.write_all(data)?;
            Ok(())
        }
    }
}

/// Sync variant of [`append_file`].
pub fn append_file_sync(p: &str, data: &[u8]) -> VfsResult<()> {
    write_file_sync(p, data, WriteOptions::append())
}

/// Sync variant of [`read_at`].
pub fn read_at_sync(p: &str, offset: u64, length: u64) -> VfsResult<Vec<u8>> {
    match resolve(p) {
        Some(m) => {
            // Same checks as the async layer, over the sync arm.
            let rel = ops_sync::resolve_links(&m.backend, &m.rel)?;
            match ops_sync::stat(&m.backend, &rel, false)? {
                None => Err(VfsError::NotFound(rel)),
                Some(st) if st.is_dir() => Err(VfsError::IsADirectory(rel)),
                Some(_) if length == 0 => Ok(Vec::new()),
                Some(st) => {
                    let end = (offset + length).min(st.size);
                    let data = ops_sync::read_file(&m.backend, &rel)?;
                    let start = (offset as usize).min(data.len());
                    Ok(data[start..(end as usize).max(start)].to_vec())
                }
            }
        }
        None => {
            let mut file = std::fs::File::open(Path::new(&path::normalize(p)))?;
            file.seek(SeekFrom::Start(offset))?;
            let mut buf = Vec::new();
            file.take(length).read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Sync variant of [`write_at`].
pub fn write_at_sync(p: &str, offset: u64, data: &[u8]) -> VfsResult<()> {
    match resolve(p) {
        Some(m) => {
            let rel = ops_sync::resolve_links(&m.backend, &m.rel)?;
            match ops_sync::stat(&m.backend, &rel, false)? {
                Some(st) if st.is_dir() => Err(VfsError::IsADirectory(rel)),
                _ => m.backend.require_sync(&rel)?.write(
                    &rel,
                    data,
                    crate::backend::WriteStreamOptions::overwrite_at(offset),
                ),
            }
        }
        None => {
            let mut file = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(Path::new(&path::normalize(p)))?;
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(data)?;
            Ok(())
        }
    }
}

/// Sync variant of [`stat`].
pub fn stat_sync(p: &str) -> VfsResult<Option<Stat>> {
    match resolve(p) {
        Some(m) => ops_sync::stat(&m.backend, &m.rel, true),
        None => match std::fs::metadata(Path::new(&path::normalize(p))) {
            Ok(meta) => Ok(Some(adapt::stat_from_metadata(&meta))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        },
    }
}

/// Sync variant of [`lstat`].
pub fn lstat_sync(p: &str) -> VfsResult<Option<Stat>> {
    match resolve(p) {
        Some(m) => ops_sync::stat(&m.backend, &m.rel, false),
        None => match std::fs::symlink_metadata(Path::new(&path::normalize(p))) {
            Ok(meta) => Ok(Some(adapt::stat_from_metadata(&meta))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        },
    }
}

/// Sync variant of [`readdir`].
pub fn readdir_sync(p: &str, opts: ReadDirOptions) -> VfsResult<Vec<DirEntry>> {
    match resolve(p) {
        Some(m) => ops_sync::readdir(&m.backend, &m.rel, opts),
        None => {
            let root = path::normalize(p);
            let mut entries = real_readdir_once_sync(Path::new(&root))?;
            if opts.recursive {
                let mut queue: Vec<(String, String)> = entries
                    .iter()
                    .filter(|e| e.kind == NodeKind::Directory)
                    .map(|e| (e.name.clone(), path::join(&root, &e.name)))
                    .collect();
                while let Some((rel, dir)) = queue.pop() {
                    for child in real_readdir_once_sync(Path::new(&dir))? {
                        let child_rel = format!("{}/{}", rel, child.name);
                        if child.kind == NodeKind::Directory {
                            queue.push((child_rel.clone(), path::join(&dir, &child.name)));
                        }
                        entries.push(DirEntry {
                            name: child_rel,
                            kind: child.kind,
                        });
                    }
                }
            }
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(entries)
        }
    }
}

fn real_readdir_once_sync(dir: &Path) -> VfsResult<Vec<DirEntry>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        out.push(adapt::entry_from_file_type(
            entry.file_name().to_string_lossy().into_owned(),
            entry.file_type()?,
        ));
    }
    Ok(out)
}

/// Sync variant of [`mkdir`].
pub fn mkdir_sync(p: &str, opts: MkdirOptions) -> VfsResult<Option<String>> {
    match resolve(p) {
        Some(m) => ops_sync::mkdir(&m.backend, &m.rel, opts),
        None => {
            let full = path::normalize(p);
            let target = Path::new(&full);
            if opts.recursive {
                if std::fs::metadata(target).is_ok_and(|m| m.is_dir()) {
                    return Ok(None);
                }
                std::fs::create_dir_all(target)?;
            } else {
                std::fs::create_dir(target)?;
            }
            Ok(Some(full))
        }
    }
}

/// Sync variant of [`rm`].
pub fn rm_sync(p: &str, opts: RmOptions) -> VfsResult<()> {
    match resolve(p) {
        Some(m) => ops_sync::rm(&m.backend, &m.rel, opts),
        None => {
            let full = path::normalize(p);
            let target = Path::new(&full);
            let meta = match std::fs::symlink_metadata(target) {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return if opts.force {
                        Ok(())
                    } else {
                        Err(VfsError::NotFound(full))
                    };
                }
                Err(e) => return Err(e.into()),
            };
            if meta.is_dir() {
                if opts.recursive {
                    Ok(std::fs::remove_dir_all(target)?)
                } else {
                    Ok(std::fs::remove_dir(target)?)
                }
            } else {
                Ok(std::fs::remove_file(target)?)
            }
        }
    }
}

/// Sync variant of [`rmdir`].
pub fn rmdir_sync(p: &str) -> VfsResult<()> {
    match resolve(p) {
        Some(m) => ops_sync::rmdir(&m.backend, &m.rel),
        None => Ok(std::fs::remove_dir(Path::new(&path::normalize(p)))?),
    }
}

/// Sync variant of [`unlink`].
pub fn unlink_sync(p: &str) -> VfsResult<()> {
    match resolve(p) {
        Some(m) => ops_sync::unlink(&m.backend, &m.rel),
        None => {
            let full = path::normalize(p);
            let meta = std::fs::symlink_metadata(Path::new(&full))?;
            if meta.is_dir() {
                return Err(VfsError::IsADirectory(full));
            }
            Ok(std::fs::remove_file(Path::new(&full))?)
        }
    }
}

/// Sync variant of [`rename`].
pub fn rename_sync(from: &str, to: &str) -> VfsResult<()> {
    let reg = scope::current();
    match (reg.resolve(from), reg.resolve(to)) {
        (Some(a), Some(b)) if Arc::ptr_eq(&a.backend, &b.backend) => {
            ops_sync::rename(&a.backend, &a.rel, &b.rel)
        }
        (None, None) => Ok(std::fs::rename(
            Path::new(&path::normalize(from)),
            Path::new(&path::normalize(to)),
        )?),
        _ => Err(VfsError::CrossMount(
            path::normalize(from),
            path::normalize(to),
        )),
    }
}

/// Sync variant of [`copy_file`].
pub fn copy_file_sync(src: &str, dst: &str) -> VfsResult<()> {
    let st = lstat_sync(src)?.ok_or_else(|| VfsError::NotFound(path::normalize(src)))?;
    if st.is_dir() {
        return Err(VfsError::IsADirectory(path::normalize(src)));
    }
    copy_one_sync(src, dst, st.kind)
}

/// Sync variant of [`cp`].
pub fn cp_sync(src: &str, dst: &str, opts: CopyOptions) -> VfsResult<()> {
    let src = path::normalize(src);
    let dst = path::normalize(dst);
    let st = lstat_sync(&src)?.ok_or_else(|| VfsError::NotFound(src.clone()))?;
    if dst == src || ops::is_inside(&src, &dst) {
        return Err(VfsError::Invalid(format!("{dst} is inside {src}")));
    }

    match st.kind {
        NodeKind::Directory if !opts.recursive => Err(VfsError::IsADirectory(src)),
        NodeKind::Directory => {
            mkdir_sync(&dst, MkdirOptions { recursive: true })?;
            let mut queue = vec![(src, dst)];
            while let Some((src_dir, dst_dir)) = queue.pop() {
                for entry in readdir_sync(&src_dir, ReadDirOptions::default())? {
                    let src_child = path::join(&src_dir, &entry.name);
                    let dst_child = path::join(&dst_dir, &entry.name);
                    if entry.kind == NodeKind::Directory {
                        mkdir_sync(&dst_child, MkdirOptions { recursive: true })?;
                        queue.push((src_child, dst_child));
                    } else {
                        copy_one_sync(&src_child, &dst_child, entry.kind)?;
                    }
                }
            }
            Ok(())
        }
        kind => copy_one_sync(&src, &dst, kind),
    }
}

fn copy_one_sync(src: &str, dst: &str, kind: NodeKind) -> VfsResult<()> {
    match kind {
        NodeKind::Symlink => {
            let target = read_link_sync(src)?;
            symlink_sync(dst, &target)
        }
        _ => {
            let data = read_file_sync(src)?;
            write_file_sync(dst, &data, WriteOptions::default())
        }
    }
}

/// Sync variant of [`access`].
pub fn access_sync(p: &str) -> VfsResult<()> {
    match stat_sync(p)? {
        None => Err(VfsError::NotFound(path::normalize(p))),
        Some(_) => Ok(()),
    }
}

/// Sync variant of [`exists`].
pub fn exists_sync(p: &str) -> VfsResult<bool> {
    Ok(stat_sync(p)?.is_some())
}

/// Sync variant of [`truncate`].
pub fn truncate_sync(p: &str, length: u64) -> VfsResult<()> {
    match resolve(p) {
        Some(m) => ops_sync::truncate(&m.backend, &m.rel, length),
        None => {
            let file = std::fs::OpenOptions::new()
                .write(true)
                .open(Path::new(&path::normalize(p)))?;
            Ok(file.set_len(length)?)
        }
    }
}

/// Sync variant of [`symlink`].
pub fn symlink_sync(link: &str, target: &str) -> VfsResult<()> {
    match resolve(link) {
        Some(m) => ops_sync::symlink(&m.backend, &m.rel, target),
        None => Ok(std::os::unix::fs::symlink(
            target,
            Path::new(&path::normalize(link)),
        )?),
    }
}

/// Sync variant of [`read_link`].
pub fn read_link_sync(p: &str) -> VfsResult<String> {
    match resolve(p) {
        Some(m) => ops_sync::read_link(&m.backend, &m.rel),
        None => {
            let target = std::fs::read_link(Path::new(&path::normalize(p)))?;
            Ok(target.to_string_lossy().into_owned())
        }
    }
}

/// Sync variant of [`realpath`].
pub fn realpath_sync(p: &str) -> VfsResult<String> {
    match resolve(p) {
        Some(m) => {
            let resolved = ops_sync::resolve_links(&m.backend, &m.rel)?;
            Ok(rejoin(&m.prefix, &resolved))
        }
        None => {
            let real = std::fs::canonicalize(Path::new(&path::normalize(p)))?;
            Ok(real.to_string_lossy().into_owned())
        }
    }
}

/// Sync variant of [`utimes`].
pub fn utimes_sync(p: &str, mtime: SystemTime) -> VfsResult<()> {
    match resolve(p) {
        Some(m) => ops_sync::utimes(&m.backend, &m.rel, mtime),
        None => real_set_modified(&path::normalize(p), mtime),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════

/// Re-attach a backend-relative path to its mount prefix.
fn rejoin(prefix: &str, rel: &str) -> String {
    if rel == "/" {
        prefix.to_string()
    } else {
        format!("{prefix}{rel}")
    }
}

fn real_set_modified(full: &str, mtime: SystemTime) -> VfsResult<()> {
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(Path::new(full))?;
    Ok(file.set_modified(mtime)?)
}

/// Open-option translation shared by the async and sync fall-through.
struct OpenSpec {
    append: bool,
    exclusive: bool,
}

fn open_options(opts: WriteOptions) -> OpenSpec {
    OpenSpec {
        append: opts.append,
        exclusive: opts.exclusive,
    }
}

impl OpenSpec {
    async fn open_tokio(&self, p: &Path) -> std::io::Result<tokio::fs::File> {
        let mut oo = tokio::fs::OpenOptions::new();
        oo.write(true);
        if self.exclusive {
            oo.create_new(true);
        } else {
            oo.create(true);
        }
        if self.append {
            oo.append(true);
        } else {
            oo.truncate(true);
        }
        oo.open(p).await
    }

    fn open_std(&self, p: &Path) -> std::io::Result<std::fs::File> {
        let mut oo = std::fs::OpenOptions::new();
        oo.write(true);
        if self.exclusive {
            oo.create_new(true);
        } else {
            oo.create(true);
        }
        if self.append {
            oo.append(true);
        } else {
            oo.truncate(true);
        }
        oo.open(p)
    }
}
