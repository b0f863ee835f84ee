#![feature(io_error_more)]
//! strata-vfs: a mountable virtual filesystem for request-scoped runtimes.
//!
//! This crate provides:
//!
//! - **Path**: normalization for virtual paths (`/`-separated strings)
//! - **Registry**: mount table mapping path prefixes to backends, with
//!   strict non-overlap invariants
//! - **Scope**: request-scoped registries so concurrent requests never
//!   observe each other's mounts
//! - **Backend**: the minimal primitive contracts (async-streaming and
//!   sync-buffered) a storage backend implements
//! - **Ops**: the rich filesystem API derived from those primitives
//! - **Facade**: the consumer surface — mounted paths route to backends,
//!   unmounted paths fall through to the real local filesystem
//! - **Memory**: an in-memory backend for scratch mounts and tests
//!
//! # Design
//!
//! Backends are mounted at path prefixes; the registry resolves each call
//! to at most one mount:
//!
//! ```text
//! /                      # real filesystem (fall-through)
//! ├── /scratch/          # MemoryFs (ephemeral)
//! └── /mnt/blob/         # any backend implementing the contracts
//! ```
//!
//! Mount prefixes never nest, so resolution is unambiguous. Inside
//! [`scope::with_scope`] all mount operations act on a private registry
//! that dies with the scope.

pub mod adapt;
pub mod backend;
pub mod error;
pub mod facade;
pub mod memory;
pub mod ops;
pub mod ops_sync;
pub mod path;
pub mod registry;
pub mod scope;
pub mod types;

pub use backend::{
    AsyncBackend, BackendHandle, ByteRange, Capabilities, SyncBackend, WriteFlags,
    WriteStreamOptions,
};
pub use error::{VfsError, VfsResult};
pub use memory::MemoryFs;
pub use registry::{MountInfo, MountMatch, MountRegistry};
pub use scope::{in_scope, with_scope};
pub use types::{
    CopyOptions, DirEntry, MkdirOptions, NodeKind, ReadDirOptions, RmOptions, Stat, WriteOptions,
};

// The consumer surface doubles as the crate-level API.
pub use facade::{
    access, access_sync, append_file, append_file_sync, copy_file, copy_file_sync, cp, cp_sync,
    exists, exists_sync, is_mounted, lstat, lstat_sync, mkdir, mkdir_sync, mount, mounts,
    read_at, read_at_sync, read_file, read_file_sync, read_link, read_link_sync, readdir,
    readdir_sync, realpath, realpath_sync, rename, rename_sync, rm, rm_sync, rmdir, rmdir_sync,
    stat, stat_sync, symlink, symlink_sync, truncate, truncate_sync, unlink, unlink_sync,
    unmount, utimes, utimes_sync, write_at, write_at_sync, write_file, write_file_sync,
};
