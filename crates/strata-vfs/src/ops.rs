//! Operation derivation: the rich filesystem API composed from backend
//! primitives.
//!
//! Every function here takes a resolved backend and a backend-relative
//! path (the mount registry has already been consulted). Each primitive
//! call dispatches in two branches — async arm preferred, sync arm as the
//! fallback — so a backend only has to implement one contract.
//!
//! Symlink policy: the derivation layer owns the bounded hop loop.
//! Backends report symlink nodes verbatim from `stat` and only ever see
//! primitive calls on fully resolved paths.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::backend::{BackendHandle, ByteRange, WriteFlags, WriteStreamOptions};
use crate::error::{VfsError, VfsResult};
use crate::path;
use crate::types::{
    CopyOptions, DirEntry, MkdirOptions, NodeKind, ReadDirOptions, RmOptions, Stat, WriteOptions,
};

/// Maximum symlink hops before a resolution fails with `ELOOP`.
pub const MAX_LINK_HOPS: usize = 40;

/// True if `p` lives strictly inside the directory `dir`. Guards the
/// copy-based rename/copy paths against recursing into their own output.
pub(crate) fn is_inside(dir: &str, p: &str) -> bool {
    if dir == "/" {
        p != "/"
    } else {
        p.len() > dir.len() && p.starts_with(dir) && p.as_bytes()[dir.len()] == b'/'
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Primitive dispatch (async arm preferred, sync arm fallback)
// ═══════════════════════════════════════════════════════════════════════════

async fn prim_stat(b: &BackendHandle, p: &str) -> VfsResult<Option<Stat>> {
    match b.async_arm() {
        Some(fs) => fs.stat(p).await,
        None => b.require_sync(p)?.stat(p),
    }
}

async fn prim_read(b: &BackendHandle, p: &str, range: Option<ByteRange>) -> VfsResult<Vec<u8>> {
    let caps = b.capabilities();
    // Backends that cannot serve ranges get asked for the whole object and
    // we slice locally.
    let pass = if caps.ranged_reads { range } else { None };

    let data = match b.async_arm() {
        Some(fs) => {
            if caps.whole_file && pass.is_none() {
                fs.read_file(p).await?
            } else {
                let mut reader = fs.open_read(p, pass).await?;
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                buf
            }
        }
        None => b.require_sync(p)?.read(p, pass)?,
    };

    match (pass, range) {
        (None, Some(r)) => Ok(r.slice(&data).to_vec()),
        _ => Ok(data),
    }
}

async fn prim_write(
    b: &BackendHandle,
    p: &str,
    data: &[u8],
    opts: WriteStreamOptions,
) -> VfsResult<()> {
    let caps = b.capabilities();
    match b.async_arm() {
        Some(fs) => {
            if caps.whole_file && opts.flags != WriteFlags::Overwrite {
                return fs.write_file(p, data, opts.flags == WriteFlags::Append).await;
            }
            let mut sink = fs.open_write(p, opts).await?;
            sink.write_all(data).await?;
            sink.shutdown().await?;
            Ok(())
        }
        None => b.require_sync(p)?.write(p, data, opts),
    }
}

async fn prim_readdir(b: &BackendHandle, p: &str) -> VfsResult<Vec<DirEntry>> {
    match b.async_arm() {
        Some(fs) => fs.readdir(p).await,
        None => b.require_sync(p)?.readdir(p),
    }
}

async fn prim_mkdir(b: &BackendHandle, p: &str) -> VfsResult<()> {
    match b.async_arm() {
        Some(fs) => fs.mkdir(p).await,
        None => b.require_sync(p)?.mkdir(p),
    }
}

async fn prim_remove(b: &BackendHandle, p: &str) -> VfsResult<()> {
    match b.async_arm() {
        Some(fs) => fs.remove(p).await,
        None => b.require_sync(p)?.remove(p),
    }
}

async fn prim_symlink(b: &BackendHandle, link: &str, target: &str) -> VfsResult<()> {
    match b.async_arm() {
        Some(fs) => fs.symlink(link, target).await,
        None => b.require_sync(link)?.symlink(link, target),
    }
}

async fn prim_readlink(b: &BackendHandle, p: &str) -> VfsResult<String> {
    match b.async_arm() {
        Some(fs) => fs.read_link(p).await,
        None => b.require_sync(p)?.read_link(p),
    }
}

async fn prim_rename(b: &BackendHandle, from: &str, to: &str) -> VfsResult<()> {
    match b.async_arm() {
        Some(fs) => fs.rename(from, to).await,
        None => b.require_sync(from)?.rename(from, to),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Symlink resolution
// ═══════════════════════════════════════════════════════════════════════════

/// Follow symlinks starting at `p` until a non-symlink (or missing) node
/// is reached. A relative target resolves against the link's own parent
/// directory. More than [`MAX_LINK_HOPS`] hops fails `ELOOP`.
pub(crate) async fn resolve_links(b: &BackendHandle, p: &str) -> VfsResult<String> {
    let mut current = path::normalize(p);
    if !b.capabilities().symlinks {
        return Ok(current);
    }
    for _ in 0..MAX_LINK_HOPS {
        match prim_stat(b, &current).await? {
            Some(st) if st.is_symlink() => {
                let target = prim_readlink(b, &current).await?;
                current = path::resolve_relative(&path::parent_of(&current), &target);
            }
            _ => return Ok(current),
        }
    }
    Err(VfsError::LinkLoop(path::normalize(p)))
}

// ═══════════════════════════════════════════════════════════════════════════
// Derived operations
// ═══════════════════════════════════════════════════════════════════════════

/// Node metadata; `follow` toggles lstat vs stat semantics. `Ok(None)`
/// for a missing node — absence is an outcome, not an error.
pub async fn stat(b: &BackendHandle, p: &str, follow: bool) -> VfsResult<Option<Stat>> {
    let target = if follow {
        resolve_links(b, p).await?
    } else {
        path::normalize(p)
    };
    let mut st = prim_stat(b, &target).await?;
    if b.read_only()
        && let Some(st) = st.as_mut()
    {
        st.writable = false;
    }
    Ok(st)
}

/// Read a file's entire content.
pub async fn read_file(b: &BackendHandle, p: &str) -> VfsResult<Vec<u8>> {
    let p = resolve_links(b, p).await?;
    match prim_stat(b, &p).await? {
        None => Err(VfsError::NotFound(p)),
        Some(st) if st.is_dir() => Err(VfsError::IsADirectory(p)),
        Some(_) => prim_read(b, &p, None).await,
    }
}

/// Read `length` bytes starting at `offset`.
pub async fn read_at(b: &BackendHandle, p: &str, offset: u64, length: u64) -> VfsResult<Vec<u8>> {
    let p = resolve_links(b, p).await?;
    match prim_stat(b, &p).await? {
        None => Err(VfsError::NotFound(p)),
        Some(st) if st.is_dir() => Err(VfsError::IsADirectory(p)),
        Some(_) if length == 0 => Ok(Vec::new()),
        Some(_) => {
            prim_read(b, &p, Some(ByteRange::inclusive(offset, offset + length - 1))).await
        }
    }
}

/// Check that the parent of `p` exists and is a directory.
async fn require_parent_dir(b: &BackendHandle, p: &str) -> VfsResult<()> {
    let parent = path::parent_of(p);
    if parent == *p {
        return Ok(());
    }
    match prim_stat(b, &parent).await? {
        None => Err(VfsError::NotFound(parent)),
        Some(st) if !st.is_dir() => Err(VfsError::NotADirectory(parent)),
        Some(_) => Ok(()),
    }
}

/// Write a whole file. Creates the file when absent (parent must exist);
/// `append` accumulates, `exclusive` fails `EEXIST` on collision.
pub async fn write_file(
    b: &BackendHandle,
    p: &str,
    data: &[u8],
    opts: WriteOptions,
) -> VfsResult<()> {
    let p = resolve_links(b, p).await?;
    match prim_stat(b, &p).await? {
        Some(_) if opts.exclusive => return Err(VfsError::AlreadyExists(p)),
        Some(st) if st.is_dir() => return Err(VfsError::IsADirectory(p)),
        Some(_) => {}
        None => require_parent_dir(b, &p).await?,
    }
    let stream_opts = if opts.append {
        WriteStreamOptions::append()
    } else {
        WriteStreamOptions::truncate()
    };
    prim_write(b, &p, data, stream_opts).await
}

/// Write `data` at `offset`, zero-filling any gap beyond the current end.
/// Creates the file when absent (parent must exist).
pub async fn write_at(b: &BackendHandle, p: &str, offset: u64, data: &[u8]) -> VfsResult<()> {
    let p = resolve_links(b, p).await?;
    match prim_stat(b, &p).await? {
        Some(st) if st.is_dir() => return Err(VfsError::IsADirectory(p)),
        Some(_) => {}
        None => require_parent_dir(b, &p).await?,
    }
    prim_write(b, &p, data, WriteStreamOptions::overwrite_at(offset)).await
}

/// List a directory. Entries come back sorted by name; recursive listings
/// use slash-joined relative paths and include directories as entries.
pub async fn readdir(
    b: &BackendHandle,
    p: &str,
    opts: ReadDirOptions,
) -> VfsResult<Vec<DirEntry>> {
    let root = resolve_links(b, p).await?;
    let mut entries = prim_readdir(b, &root).await?;
    if opts.recursive {
        // Breadth-first expansion; each directory entry is re-listed with
        // its relative name as the prefix for its children.
        let mut queue: Vec<(String, String)> = entries
            .iter()
            .filter(|e| e.kind == NodeKind::Directory)
            .map(|e| (e.name.clone(), path::join(&root, &e.name)))
            .collect();
        while let Some((rel, dir)) = queue.pop() {
            for child in prim_readdir(b, &dir).await? {
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

/// Create a directory. Returns the created path, or `None` when the
/// directory already existed and `recursive` made that a no-op.
pub async fn mkdir(b: &BackendHandle, p: &str, opts: MkdirOptions) -> VfsResult<Option<String>> {
    let p = path::normalize(p);
    match prim_stat(b, &p).await? {
        Some(st) if st.is_dir() && opts.recursive => return Ok(None),
        Some(_) => return Err(VfsError::AlreadyExists(p)),
        None => {}
    }

    // Walk up to the nearest existing ancestor, then create downward.
    let mut missing = vec![p.clone()];
    let mut cursor = path::parent_of(&p);
    while cursor != "/" {
        match prim_stat(b, &cursor).await? {
            Some(st) if st.is_dir() => break,
            Some(_) => return Err(VfsError::NotADirectory(cursor)),
            None => {
                if !opts.recursive {
                    return Err(VfsError::NotFound(cursor));
                }
                missing.push(cursor.clone());
                cursor = path::parent_of(&cursor);
            }
        }
    }
    for dir in missing.iter().rev() {
        prim_mkdir(b, dir).await?;
    }
    Ok(Some(p))
}

/// Remove a node. Missing targets fail `ENOENT` unless `force`; non-empty
/// directories fail `ENOTEMPTY` unless `recursive`. Symlinks are removed,
/// never followed.
pub async fn rm(b: &BackendHandle, p: &str, opts: RmOptions) -> VfsResult<()> {
    let p = path::normalize(p);
    match prim_stat(b, &p).await? {
        None => {
            if opts.force {
                Ok(())
            } else {
                Err(VfsError::NotFound(p))
            }
        }
        Some(st) if st.is_dir() => {
            if opts.recursive {
                remove_tree(b, &p).await
            } else {
                let entries = prim_readdir(b, &p).await?;
                if entries.is_empty() {
                    prim_remove(b, &p).await
                } else {
                    Err(VfsError::NotEmpty(p))
                }
            }
        }
        Some(_) => prim_remove(b, &p).await,
    }
}

/// Delete a directory subtree: leaves first, then their parents.
async fn remove_tree(b: &BackendHandle, root: &str) -> VfsResult<()> {
    // Discovery order lists every directory before its children, so the
    // reversed list deletes children before parents.
    let mut dirs = vec![root.to_string()];
    let mut stack = vec![root.to_string()];
    let mut leaves = Vec::new();
    while let Some(dir) = stack.pop() {
        for entry in prim_readdir(b, &dir).await? {
            let child = path::join(&dir, &entry.name);
            if entry.kind == NodeKind::Directory {
                dirs.push(child.clone());
                stack.push(child);
            } else {
                leaves.push(child);
            }
        }
    }
    for leaf in &leaves {
        prim_remove(b, leaf).await?;
    }
    for dir in dirs.iter().rev() {
        prim_remove(b, dir).await?;
    }
    Ok(())
}

/// Remove a single non-directory node.
pub async fn unlink(b: &BackendHandle, p: &str) -> VfsResult<()> {
    let p = path::normalize(p);
    match prim_stat(b, &p).await? {
        None => Err(VfsError::NotFound(p)),
        Some(st) if st.is_dir() => Err(VfsError::IsADirectory(p)),
        Some(_) => prim_remove(b, &p).await,
    }
}

/// Remove an empty directory.
pub async fn rmdir(b: &BackendHandle, p: &str) -> VfsResult<()> {
    let p = path::normalize(p);
    match prim_stat(b, &p).await? {
        None => Err(VfsError::NotFound(p)),
        Some(st) if !st.is_dir() => Err(VfsError::NotADirectory(p)),
        Some(_) => rm(b, &p, RmOptions::default()).await,
    }
}

/// Move a node within one backend. Uses the backend's native rename when
/// declared, otherwise copies (recursively for directories, re-creating
/// symlinks by target) and removes the original.
///
/// The caller has already established that both paths resolve to this
/// backend; cross-backend renames fail `EXDEV` before reaching here.
pub async fn rename(b: &BackendHandle, from: &str, to: &str) -> VfsResult<()> {
    let from = path::normalize(from);
    let to = path::normalize(to);
    let st = prim_stat(b, &from)
        .await?
        .ok_or_else(|| VfsError::NotFound(from.clone()))?;
    if to == from {
        return Ok(());
    }
    if is_inside(&from, &to) {
        return Err(VfsError::Invalid(format!("{to} is inside {from}")));
    }

    if b.capabilities().rename {
        return prim_rename(b, &from, &to).await;
    }

    tracing::trace!(from = %from, to = %to, "rename emulated by copy+delete");
    match st.kind {
        NodeKind::Directory => {
            copy_tree(b, &from, b, &to).await?;
            remove_tree(b, &from).await
        }
        NodeKind::Symlink => {
            let target = prim_readlink(b, &from).await?;
            rm(b, &to, RmOptions { recursive: false, force: true }).await?;
            prim_symlink(b, &to, &target).await?;
            prim_remove(b, &from).await
        }
        NodeKind::File => {
            copy_file_content(b, &from, b, &to).await?;
            prim_remove(b, &from).await
        }
    }
}

/// Copy a node, possibly across backends (or across mounts). Cross-backend
/// copies buffer each file wholly through memory — there is no common
/// streaming bridge between arbitrary backend kinds.
pub async fn copy(
    src_b: &BackendHandle,
    src: &str,
    dst_b: &BackendHandle,
    dst: &str,
    opts: CopyOptions,
) -> VfsResult<()> {
    let src = path::normalize(src);
    let dst = path::normalize(dst);
    let st = prim_stat(src_b, &src)
        .await?
        .ok_or_else(|| VfsError::NotFound(src.clone()))?;
    if std::ptr::eq(src_b, dst_b) && (dst == src || is_inside(&src, &dst)) {
        return Err(VfsError::Invalid(format!("{dst} is inside {src}")));
    }

    match st.kind {
        NodeKind::Directory if !opts.recursive => Err(VfsError::IsADirectory(src)),
        NodeKind::Directory => copy_tree(src_b, &src, dst_b, &dst).await,
        NodeKind::Symlink => {
            let target = prim_readlink(src_b, &src).await?;
            prim_symlink(dst_b, &dst, &target).await
        }
        NodeKind::File => copy_file_content(src_b, &src, dst_b, &dst).await,
    }
}

/// Buffer one file through memory from source to destination.
async fn copy_file_content(
    src_b: &BackendHandle,
    src: &str,
    dst_b: &BackendHandle,
    dst: &str,
) -> VfsResult<()> {
    if let Some(st) = prim_stat(dst_b, dst).await?
        && st.is_dir()
    {
        return Err(VfsError::IsADirectory(dst.to_string()));
    }
    let data = prim_read(src_b, src, None).await?;
    prim_write(dst_b, dst, &data, WriteStreamOptions::truncate()).await
}

/// Replicate a directory tree. Work-queue walk; order within the tree is
/// not significant.
async fn copy_tree(
    src_b: &BackendHandle,
    src_root: &str,
    dst_b: &BackendHandle,
    dst_root: &str,
) -> VfsResult<()> {
    mkdir(dst_b, dst_root, MkdirOptions { recursive: true }).await?;
    let mut queue = vec![(src_root.to_string(), dst_root.to_string())];
    while let Some((src_dir, dst_dir)) = queue.pop() {
        for entry in prim_readdir(src_b, &src_dir).await? {
            let src_child = path::join(&src_dir, &entry.name);
            let dst_child = path::join(&dst_dir, &entry.name);
            match entry.kind {
                NodeKind::Directory => {
                    mkdir(dst_b, &dst_child, MkdirOptions { recursive: true }).await?;
                    queue.push((src_child, dst_child));
                }
                NodeKind::Symlink => {
                    let target = prim_readlink(src_b, &src_child).await?;
                    prim_symlink(dst_b, &dst_child, &target).await?;
                }
                NodeKind::File => {
                    copy_file_content(src_b, &src_child, dst_b, &dst_child).await?;
                }
            }
        }
    }
    Ok(())
}

/// Truncate (or extend with zeros) a file to `length` bytes.
pub async fn truncate(b: &BackendHandle, p: &str, length: u64) -> VfsResult<()> {
    let p = resolve_links(b, p).await?;
    let st = match prim_stat(b, &p).await? {
        None => return Err(VfsError::NotFound(p)),
        Some(st) if st.is_dir() => return Err(VfsError::IsADirectory(p)),
        Some(st) => st,
    };

    let data = if length == 0 {
        Vec::new()
    } else if length >= st.size {
        let mut data = prim_read(b, &p, None).await?;
        data.resize(length as usize, 0);
        data
    } else {
        // Shrink: a partial range read avoids materializing the tail when
        // the backend can serve ranges.
        prim_read(b, &p, Some(ByteRange::inclusive(0, length - 1))).await?
    };
    prim_write(b, &p, &data, WriteStreamOptions::truncate()).await
}

/// Create a symlink at `link` pointing at `target`. The target string is
/// stored verbatim; relative targets resolve at follow time.
pub async fn symlink(b: &BackendHandle, link: &str, target: &str) -> VfsResult<()> {
    if !b.capabilities().symlinks {
        return Err(VfsError::Unsupported(format!("symlink: {link}")));
    }
    let link = path::normalize(link);
    if prim_stat(b, &link).await?.is_some() {
        return Err(VfsError::AlreadyExists(link));
    }
    require_parent_dir(b, &link).await?;
    prim_symlink(b, &link, target).await
}

/// Read a symlink's target without following it.
pub async fn read_link(b: &BackendHandle, p: &str) -> VfsResult<String> {
    if !b.capabilities().symlinks {
        return Err(VfsError::Unsupported(format!("readlink: {p}")));
    }
    let p = path::normalize(p);
    match prim_stat(b, &p).await? {
        None => Err(VfsError::NotFound(p)),
        Some(st) if !st.is_symlink() => Err(VfsError::Invalid(p)),
        Some(_) => prim_readlink(b, &p).await,
    }
}

/// Existence check: `ENOENT` when absent, success otherwise. No
/// permission modeling.
pub async fn access(b: &BackendHandle, p: &str) -> VfsResult<()> {
    match stat(b, p, true).await? {
        None => Err(VfsError::NotFound(path::normalize(p))),
        Some(_) => Ok(()),
    }
}

/// Set a node's modification time.
pub async fn utimes(b: &BackendHandle, p: &str, mtime: std::time::SystemTime) -> VfsResult<()> {
    if !b.capabilities().set_modified {
        return Err(VfsError::Unsupported(format!("utimes: {p}")));
    }
    let p = resolve_links(b, p).await?;
    if prim_stat(b, &p).await?.is_none() {
        return Err(VfsError::NotFound(p));
    }
    match b.async_arm() {
        Some(fs) => fs.set_modified(&p, mtime).await,
        None => b.require_sync(&p)?.set_modified(&p, mtime),
    }
}
