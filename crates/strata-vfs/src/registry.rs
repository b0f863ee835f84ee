//! Mount registry: path prefix → backend handle.
//!
//! A registry maps normalized mount prefixes to backends. Prefixes never
//! nest and never duplicate, so any path resolves to at most one mount and
//! resolution order cannot matter. A handful of prefixes are reserved for
//! the host runtime and can never be mounted.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::backend::BackendHandle;
use crate::error::{VfsError, VfsResult};
use crate::path;

/// Prefixes owned by the host runtime; never mountable.
const RESERVED_PREFIXES: &[&str] = &["/", "/dev", "/proc", "/sys"];

/// Information about a mount point.
#[derive(Debug, Clone)]
pub struct MountInfo {
    /// The mount prefix (e.g. "/mnt/project").
    pub prefix: String,
    /// Backend kind identifier.
    pub kind: &'static str,
    /// Whether the backend rejects mutation.
    pub read_only: bool,
}

/// The result of resolving a path against a registry: the owning mount and
/// the remainder relative to its prefix (`/` when the path is the prefix
/// itself).
#[derive(Clone)]
pub struct MountMatch {
    /// Prefix of the matched mount.
    pub prefix: String,
    /// Backend mounted at that prefix.
    pub backend: Arc<BackendHandle>,
    /// Path relative to the mount, in normal form.
    pub rel: String,
}

impl std::fmt::Debug for MountMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountMatch")
            .field("prefix", &self.prefix)
            .field("kind", &self.backend.kind())
            .field("rel", &self.rel)
            .finish()
    }
}

/// A table of mounts. One process-wide instance lives for the process
/// lifetime; request-scoped instances are owned by [`crate::scope`] and
/// die with their scope.
#[derive(Default)]
pub struct MountRegistry {
    mounts: RwLock<BTreeMap<String, Arc<BackendHandle>>>,
}

impl std::fmt::Debug for MountRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountRegistry")
            .field("mounts", &self.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MountRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // Mutations under the lock are single map inserts/removes, so a
    // poisoned lock cannot hold a half-applied table; recover the guard.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Arc<BackendHandle>>> {
        self.mounts.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Arc<BackendHandle>>> {
        self.mounts.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `backend` at `prefix`.
    ///
    /// Fails with `InvalidMount` for non-mountable prefixes (the root, a
    /// reserved path, or anything nested inside one), `AlreadyMounted` for
    /// an exact duplicate, and `OverlappingMount` when the prefix is an
    /// ancestor or descendant of an existing mount.
    pub fn mount(&self, prefix: &str, backend: Arc<BackendHandle>) -> VfsResult<()> {
        let prefix = path::normalize(prefix);
        for reserved in RESERVED_PREFIXES {
            if prefix == *reserved || prefix.starts_with(&format!("{reserved}/")) {
                return Err(VfsError::InvalidMount(prefix));
            }
        }

        let mut mounts = self.write();
        if mounts.contains_key(&prefix) {
            return Err(VfsError::AlreadyMounted(prefix));
        }
        for existing in mounts.keys() {
            if is_ancestor(existing, &prefix) || is_ancestor(&prefix, existing) {
                return Err(VfsError::OverlappingMount(prefix, existing.clone()));
            }
        }

        tracing::debug!(prefix = %prefix, kind = backend.kind(), "mount");
        mounts.insert(prefix, backend);
        Ok(())
    }

    /// Remove the mount at `prefix`.
    ///
    /// Returns `true` if a mount was removed, `false` if nothing was
    /// mounted there; never an error.
    pub fn unmount(&self, prefix: &str) -> bool {
        let prefix = path::normalize(prefix);
        let removed = self.write().remove(&prefix).is_some();
        if removed {
            tracing::debug!(prefix = %prefix, "unmount");
        }
        removed
    }

    /// Resolve a path to its owning mount, or `None` if no mount covers it.
    ///
    /// With the non-overlap invariant at most one mount can match; if the
    /// invariant were ever violated the longest matching prefix still wins,
    /// to fail safe.
    pub fn resolve(&self, raw: &str) -> Option<MountMatch> {
        let full = path::normalize(raw);
        let mounts = self.read();

        let mut best: Option<(&String, &Arc<BackendHandle>)> = None;
        for (prefix, backend) in mounts.iter() {
            if full == *prefix || is_ancestor(prefix, &full) {
                match best {
                    Some((current, _)) if current.len() >= prefix.len() => {}
                    _ => best = Some((prefix, backend)),
                }
            }
        }

        best.map(|(prefix, backend)| {
            let rel = if full == *prefix {
                "/".to_string()
            } else {
                full[prefix.len()..].to_string()
            };
            MountMatch {
                prefix: prefix.clone(),
                backend: Arc::clone(backend),
                rel,
            }
        })
    }

    /// True if some mount covers `path`.
    pub fn is_mounted(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    /// List all current mounts.
    pub fn mounts(&self) -> Vec<MountInfo> {
        self.read()
            .iter()
            .map(|(prefix, backend)| MountInfo {
                prefix: prefix.clone(),
                kind: backend.kind(),
                read_only: backend.read_only(),
            })
            .collect()
    }
}

/// True if `ancestor` is a strict path ancestor of `path`.
fn is_ancestor(ancestor: &str, path: &str) -> bool {
    if ancestor == "/" {
        path != "/"
    } else {
        path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path.as_bytes()[ancestor.len()] == b'/'
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFs;

    fn handle() -> Arc<BackendHandle> {
        MemoryFs::new().into_handle()
    }

    #[test]
    fn mount_and_resolve() {
        let reg = MountRegistry::new();
        reg.mount("/mnt/data", handle()).unwrap();

        let m = reg.resolve("/mnt/data/a/b.txt").unwrap();
        assert_eq!(m.prefix, "/mnt/data");
        assert_eq!(m.rel, "/a/b.txt");

        let m = reg.resolve("/mnt/data").unwrap();
        assert_eq!(m.rel, "/");

        assert!(reg.resolve("/mnt/other").is_none());
        assert!(reg.resolve("/mnt/datafile").is_none());
    }

    #[test]
    fn resolve_normalizes_first() {
        let reg = MountRegistry::new();
        reg.mount("/mnt//data/", handle()).unwrap();

        let m = reg.resolve("mnt/data/./x//y").unwrap();
        assert_eq!(m.rel, "/x/y");
    }

    #[test]
    fn duplicate_prefix_rejected() {
        let reg = MountRegistry::new();
        reg.mount("/a", handle()).unwrap();
        let err = reg.mount("/a", handle()).unwrap_err();
        assert!(matches!(err, VfsError::AlreadyMounted(_)));
    }

    #[test]
    fn nested_prefix_rejected_both_directions() {
        let reg = MountRegistry::new();
        reg.mount("/a", handle()).unwrap();
        let err = reg.mount("/a/b", handle()).unwrap_err();
        assert!(matches!(err, VfsError::OverlappingMount(_, _)));

        let reg = MountRegistry::new();
        reg.mount("/a/b", handle()).unwrap();
        let err = reg.mount("/a", handle()).unwrap_err();
        assert!(matches!(err, VfsError::OverlappingMount(_, _)));
    }

    #[test]
    fn siblings_are_fine() {
        let reg = MountRegistry::new();
        reg.mount("/a/b", handle()).unwrap();
        reg.mount("/a/c", handle()).unwrap();
        assert_eq!(reg.mounts().len(), 2);
    }

    #[test]
    fn reserved_prefixes_rejected() {
        let reg = MountRegistry::new();
        for prefix in ["/", "/dev", "/proc", "/sys", "/dev/shm"] {
            let err = reg.mount(prefix, handle()).unwrap_err();
            assert!(matches!(err, VfsError::InvalidMount(_)), "{prefix}");
        }
    }

    #[test]
    fn unmount_reports_removal() {
        let reg = MountRegistry::new();
        reg.mount("/a", handle()).unwrap();
        assert!(reg.unmount("/a"));
        assert!(!reg.unmount("/a"));
        assert!(!reg.is_mounted("/a/x"));
    }

    #[test]
    fn mount_info_lists_kind() {
        let reg = MountRegistry::new();
        reg.mount("/scratch", handle()).unwrap();
        let mounts = reg.mounts();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].prefix, "/scratch");
        assert_eq!(mounts[0].kind, "memory");
        assert!(!mounts[0].read_only);
    }
}
