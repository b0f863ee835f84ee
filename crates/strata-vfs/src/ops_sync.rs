//! Synchronous operation derivation.
//!
//! The sync rendition of [`crate::ops`], for callers in a synchronous
//! execution context. Only the sync arm of a backend is used; a mount
//! whose backend is async-only fails `ENOSYS` here rather than blocking
//! on a runtime. Semantics match the async layer exactly.

use crate::backend::{BackendHandle, ByteRange, SyncBackend, WriteStreamOptions};
use crate::error::{VfsError, VfsResult};
use crate::ops::MAX_LINK_HOPS;
use crate::path;
use crate::types::{
    CopyOptions, DirEntry, MkdirOptions, NodeKind, ReadDirOptions, RmOptions, Stat, WriteOptions,
};

fn arm<'a>(b: &'a BackendHandle, p: &str) -> VfsResult<&'a dyn SyncBackend> {
    b.require_sync(p).map(|fs| fs.as_ref())
}

fn prim_read(b: &BackendHandle, p: &str, range: Option<ByteRange>) -> VfsResult<Vec<u8>> {
    let pass = if b.capabilities().ranged_reads { range } else { None };
    let data = arm(b, p)?.read(p, pass)?;
    match (pass, range) {
        (None, Some(r)) => Ok(r.slice(&data).to_vec()),
        _ => Ok(data),
    }
}

pub(crate) fn resolve_links(b: &BackendHandle, p: &str) -> VfsResult<String> {
    let mut current = path::normalize(p);
    if !b.capabilities().symlinks {
        return Ok(current);
    }
    for _ in 0..MAX_LINK_HOPS {
        match arm(b, &current)?.stat(&current)? {
            Some(st) if st.is_symlink() => {
                let target = arm(b, &current)?.read_link(&current)?;
                current = path::resolve_relative(&path::parent_of(&current), &target);
            }
            _ => return Ok(current),
        }
    }
    Err(VfsError::LinkLoop(path::normalize(p)))
}

pub fn stat(b: &BackendHandle, p: &str, follow: bool) -> VfsResult<Option<Stat>> {
    let target = if follow {
        resolve_links(b, p)?
    } else {
        path::normalize(p)
    };
    let mut st = arm(b, &target)?.stat(&target)?;
    if b.read_only()
        && let Some(st) = st.as_mut()
    {
        st.writable = false;
    }
    Ok(st)
}

pub fn read_file(b: &BackendHandle, p: &str) -> VfsResult<Vec<u8>> {
    let p = resolve_links(b, p)?;
    match arm(b, &p)?.stat(&p)? {
        None => Err(VfsError::NotFound(p)),
        Some(st) if st.is_dir() => Err(VfsError::IsADirectory(p)),
        Some(_) => prim_read(b, &p, None),
    }
}

fn require_parent_dir(b: &BackendHandle, p: &str) -> VfsResult<()> {
    let parent = path::parent_of(p);
    if parent == *p {
        return Ok(());
    }
    match arm(b, &parent)?.stat(&parent)? {
        None => Err(VfsError::NotFound(parent)),
        Some(st) if !st.is_dir() => Err(VfsError::NotADirectory(parent)),
        Some(_) => Ok(()),
    }
}

pub fn write_file(b: &BackendHandle, p: &str, data: &[u8], opts: WriteOptions) -> VfsResult<()> {
    let p = resolve_links(b, p)?;
    match arm(b, &p)?.stat(&p)? {
        Some(_) if opts.exclusive => return Err(VfsError::AlreadyExists(p)),
        Some(st) if st.is_dir() => return Err(VfsError::IsADirectory(p)),
        Some(_) => {}
        None => require_parent_dir(b, &p)?,
    }
    let stream_opts = if opts.append {
        WriteStreamOptions::append()
    } else {
        WriteStreamOptions::truncate()
    };
    arm(b, &p)?.write(&p, data, stream_opts)
}

pub fn readdir(b: &BackendHandle, p: &str, opts: ReadDirOptions) -> VfsResult<Vec<DirEntry>> {
    let root = resolve_links(b, p)?;
    let mut entries = arm(b, &root)?.readdir(&root)?;
    if opts.recursive {
        let mut queue: Vec<(String, String)> = entries
            .iter()
            .filter(|e| e.kind == NodeKind::Directory)
            .map(|e| (e.name.clone(), path::join(&root, &e.name)))
            .collect();
        while let Some((rel, dir)) = queue.pop() {
            for child in arm(b, &dir)?.readdir(&dir)? {
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

pub fn mkdir(b: &BackendHandle, p: &str, opts: MkdirOptions) -> VfsResult<Option<String>> {
    let p = path::normalize(p);
    match arm(b, &p)?.stat(&p)? {
        Some(st) if st.is_dir() && opts.recursive => return Ok(None),
        Some(_) => return Err(VfsError::AlreadyExists(p)),
        None => {}
    }

    let mut missing = vec![p.clone()];
    let mut cursor = path::parent_of(&p);
    while cursor != "/" {
        match arm(b, &cursor)?.stat(&cursor)? {
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
        arm(b, dir)?.mkdir(dir)?;
    }
    Ok(Some(p))
}

pub fn rm(b: &BackendHandle, p: &str, opts: RmOptions) -> VfsResult<()> {
    let p = path::normalize(p);
    match arm(b, &p)?.stat(&p)? {
        None => {
            if opts.force {
                Ok(())
            } else {
                Err(VfsError::NotFound(p))
            }
        }
        Some(st) if st.is_dir() => {
            if opts.recursive {
                remove_tree(b, &p)
            } else {
                let entries = arm(b, &p)?.readdir(&p)?;
                if entries.is_empty() {
                    arm(b, &p)?.remove(&p)
                } else {
                    Err(VfsError::NotEmpty(p))
                }
            }
        }
        Some(_) => arm(b, &p)?.remove(&p),
    }
}

fn remove_tree(b: &BackendHandle, root: &str) -> VfsResult<()> {
    let mut dirs = vec![root.to_string()];
    let mut stack = vec![root.to_string()];
    let mut leaves = Vec::new();
    while let Some(dir) = stack.pop() {
        for entry in arm(b, &dir)?.readdir(&dir)? {
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
        arm(b, leaf)?.remove(leaf)?;
    }
    for dir in dirs.iter().rev() {
        arm(b, dir)?.remove(dir)?;
    }
    Ok(())
}

pub fn unlink(b: &BackendHandle, p: &str) -> VfsResult<()> {
    let p = path::normalize(p);
    match arm(b, &p)?.stat(&p)? {
        None => Err(VfsError::NotFound(p)),
        Some(st) if st.is_dir() => Err(VfsError::IsADirectory(p)),
        Some(_) => arm(b, &p)?.remove(&p),
    }
}

pub fn rmdir(b: &BackendHandle, p: &str) -> VfsResult<()> {
    let p = path::normalize(p);
    match arm(b, &p)?.stat(&p)? {
        None => Err(VfsError::NotFound(p)),
        Some(st) if !st.is_dir() => Err(VfsError::NotADirectory(p)),
        Some(_) => rm(b, &p, RmOptions::default()),
    }
}

pub fn rename(b: &BackendHandle, from: &str, to: &str) -> VfsResult<()> {
    let from = path::normalize(from);
    let to = path::normalize(to);
    let st = arm(b, &from)?
        .stat(&from)?
        .ok_or_else(|| VfsError::NotFound(from.clone()))?;
    if to == from {
        return Ok(());
    }
    if crate::ops::is_inside(&from, &to) {
        return Err(VfsError::Invalid(format!("{to} is inside {from}")));
    }

    if b.capabilities().rename {
        return arm(b, &from)?.rename(&from, &to);
    }

    tracing::trace!(from = %from, to = %to, "rename emulated by copy+delete");
    match st.kind {
        NodeKind::Directory => {
            copy_tree(b, &from, b, &to)?;
            remove_tree(b, &from)
        }
        NodeKind::Symlink => {
            let target = arm(b, &from)?.read_link(&from)?;
            rm(b, &to, RmOptions { recursive: false, force: true })?;
            arm(b, &to)?.symlink(&to, &target)?;
            arm(b, &from)?.remove(&from)
        }
        NodeKind::File => {
            copy_file_content(b, &from, b, &to)?;
            arm(b, &from)?.remove(&from)
        }
    }
}

pub fn copy(
    src_b: &BackendHandle,
    src: &str,
    dst_b: &BackendHandle,
    dst: &str,
    opts: CopyOptions,
) -> VfsResult<()> {
    let src = path::normalize(src);
    let dst = path::normalize(dst);
    let st = arm(src_b, &src)?
        .stat(&src)?
        .ok_or_else(|| VfsError::NotFound(src.clone()))?;
    if std::ptr::eq(src_b, dst_b) && (dst == src || crate::ops::is_inside(&src, &dst)) {
        return Err(VfsError::Invalid(format!("{dst} is inside {src}")));
    }

    match st.kind {
        NodeKind::Directory if !opts.recursive => Err(VfsError::IsADirectory(src)),
        NodeKind::Directory => copy_tree(src_b, &src, dst_b, &dst),
        NodeKind::Symlink => {
            let target = arm(src_b, &src)?.read_link(&src)?;
            arm(dst_b, &dst)?.symlink(&dst, &target)
        }
        NodeKind::File => copy_file_content(src_b, &src, dst_b, &dst),
    }
}

fn copy_file_content(
    src_b: &BackendHandle,
    src: &str,
    dst_b: &BackendHandle,
    dst: &str,
) -> VfsResult<()> {
    if let Some(st) = arm(dst_b, dst)?.stat(dst)?
        && st.is_dir()
    {
        return Err(VfsError::IsADirectory(dst.to_string()));
    }
    let data = prim_read(src_b, src, None)?;
    arm(dst_b, dst)?.write(dst, &data, WriteStreamOptions::truncate())
}

fn copy_tree(
    src_b: &BackendHandle,
    src_root: &str,
    dst_b: &BackendHandle,
    dst_root: &str,
) -> VfsResult<()> {
    mkdir(dst_b, dst_root, MkdirOptions { recursive: true })?;
    let mut queue = vec![(src_root.to_string(), dst_root.to_string())];
    while let Some((src_dir, dst_dir)) = queue.pop() {
        for entry in arm(src_b, &src_dir)?.readdir(&src_dir)? {
            let src_child = path::join(&src_dir, &entry.name);
            let dst_child = path::join(&dst_dir, &entry.name);
            match entry.kind {
                NodeKind::Directory => {
                    mkdir(dst_b, &dst_child, MkdirOptions { recursive: true })?;
                    queue.push((src_child, dst_child));
                }
                NodeKind::Symlink => {
                    let target = arm(src_b, &src_child)?.read_link(&src_child)?;
                    arm(dst_b, &dst_child)?.symlink(&dst_child, &target)?;
                }
                NodeKind::File => {
                    copy_file_content(src_b, &src_child, dst_b, &dst_child)?;
                }
            }
        }
    }
    Ok(())
}

pub fn truncate(b: &BackendHandle, p: &str, length: u64) -> VfsResult<()> {
    let p = resolve_links(b, p)?;
    let st = match arm(b, &p)?.stat(&p)? {
        None => return Err(VfsError::NotFound(p)),
        Some(st) if st.is_dir() => return Err(VfsError::IsADirectory(p)),
        Some(st) => st,
    };

    let data = if length == 0 {
        Vec::new()
    } else if length >= st.size {
        let mut data = prim_read(b, &p, None)?;
        data.resize(length as usize, 0);
        data
    } else {
        prim_read(b, &p, Some(ByteRange::inclusive(0, length - 1)))?
    };
    arm(b, &p)?.write(&p, &data, WriteStreamOptions::truncate())
}

pub fn symlink(b: &BackendHandle, link: &str, target: &str) -> VfsResult<()> {
    if !b.capabilities().symlinks {
        return Err(VfsError::Unsupported(format!("symlink: {link}")));
    }
    let link = path::normalize(link);
    if arm(b, &link)?.stat(&link)?.is_some() {
        return Err(VfsError::AlreadyExists(link));
    }
    require_parent_dir(b, &link)?;
    arm(b, &link)?.symlink(&link, target)
}

pub fn read_link(b: &BackendHandle, p: &str) -> VfsResult<String> {
    if !b.capabilities().symlinks {
        return Err(VfsError::Unsupported(format!("readlink: {p}")));
    }
    let p = path::normalize(p);
    match arm(b, &p)?.stat(&p)? {
        None => Err(VfsError::NotFound(p)),
        Some(st) if !st.is_symlink() => Err(VfsError::Invalid(p)),
        Some(_) => arm(b, &p)?.read_link(&p),
    }
}

pub fn access(b: &BackendHandle, p: &str) -> VfsResult<()> {
    match stat(b, p, true)? {
        None => Err(VfsError::NotFound(path::normalize(p))),
        Some(_) => Ok(()),
    }
}

pub fn utimes(b: &BackendHandle, p: &str, mtime: std::time::SystemTime) -> VfsResult<()> {
    if !b.capabilities().set_modified {
        return Err(VfsError::Unsupported(format!("utimes: {p}")));
    }
    let p = resolve_links(b, p)?;
    if arm(b, &p)?.stat(&p)?.is_none() {
        return Err(VfsError::NotFound(p));
    }
    arm(b, &p)?.set_modified(&p, mtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFs;
    use std::sync::Arc;

    fn mem() -> Arc<BackendHandle> {
        MemoryFs::new().into_handle()
    }

    #[test]
    fn sync_surface_round_trip() {
        let b = mem();
        write_file(&b, "/f", b"hello", WriteOptions::default()).unwrap();
        assert_eq!(read_file(&b, "/f").unwrap(), b"hello");

        write_file(&b, "/f", b" world", WriteOptions::append()).unwrap();
        assert_eq!(read_file(&b, "/f").unwrap(), b"hello world");
    }

    #[test]
    fn sync_mkdir_rm() {
        let b = mem();
        mkdir(&b, "/a/b", MkdirOptions { recursive: true }).unwrap();
        write_file(&b, "/a/b/f", b"x", WriteOptions::default()).unwrap();

        let err = rm(&b, "/a", RmOptions::default()).unwrap_err();
        assert_eq!(err.code(), "ENOTEMPTY");
        rm(&b, "/a", RmOptions { recursive: true, force: false }).unwrap();
        assert!(stat(&b, "/a", true).unwrap().is_none());
    }

    #[test]
    fn sync_symlinks_follow() {
        let b = mem();
        write_file(&b, "/t", b"v", WriteOptions::default()).unwrap();
        symlink(&b, "/l", "/t").unwrap();
        assert_eq!(read_file(&b, "/l").unwrap(), b"v");
        assert!(stat(&b, "/l", false).unwrap().unwrap().is_symlink());
    }

    #[test]
    fn sync_rename_and_truncate() {
        let b = mem();
        write_file(&b, "/o", b"1234567890", WriteOptions::default()).unwrap();
        rename(&b, "/o", "/n").unwrap();
        truncate(&b, "/n", 5).unwrap();
        assert_eq!(read_file(&b, "/n").unwrap(), b"12345");
        assert!(stat(&b, "/o", true).unwrap().is_none());
    }
}
