//! Integration tests for the VFS surface: mounted routing, scope
//! isolation, and fall-through to the real filesystem.
//!
//! Every test that mounts anything runs inside `with_scope` so the
//! process-wide registry stays untouched and tests cannot observe each
//! other's mounts.

use rstest::rstest;
use std::sync::Arc;

use strata_vfs::{
    self as vfs, BackendHandle, CopyOptions, MemoryFs, MkdirOptions, NodeKind, ReadDirOptions,
    RmOptions, WriteOptions, with_scope,
};

fn mem() -> Arc<BackendHandle> {
    MemoryFs::new().into_handle()
}

// ============================================================================
// Path normalization
// ============================================================================

#[rstest]
#[case::empty("")]
#[case::root("/")]
#[case::plain("/a/b/c")]
#[case::repeated("//a///b")]
#[case::trailing("/a/b/")]
#[case::dots("/a/./b/../c")]
#[case::relative("a/b")]
#[case::messy("..//.//x//")]
fn normalization_is_idempotent(#[case] input: &str) {
    let once = strata_vfs::path::normalize(input);
    assert_eq!(strata_vfs::path::normalize(&once), once);
    assert!(once.starts_with('/'));
}

// ============================================================================
// Routing and round trips
// ============================================================================

#[tokio::test]
async fn write_read_round_trip_through_mount() {
    with_scope(async {
        vfs::mount("/data", mem()).unwrap();

        for payload in [
            b"".to_vec(),
            b"hello".to_vec(),
            "snow \u{2744} and kanji \u{6f22}".as_bytes().to_vec(),
            vec![0xAB; 64 * 1024],
        ] {
            vfs::write_file("/data/f.bin", &payload, WriteOptions::default())
                .await
                .unwrap();
            assert_eq!(vfs::read_file("/data/f.bin").await.unwrap(), payload);
        }
    })
    .await;
}

#[tokio::test]
async fn append_and_exclusive_semantics() {
    with_scope(async {
        vfs::mount("/data", mem()).unwrap();

        vfs::write_file("/data/f", b"A", WriteOptions::default()).await.unwrap();
        vfs::append_file("/data/f", b"B").await.unwrap();
        assert_eq!(vfs::read_file("/data/f").await.unwrap(), b"AB");

        let err = vfs::write_file("/data/f", b"C", WriteOptions::exclusive())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EEXIST");
        assert_eq!(vfs::read_file("/data/f").await.unwrap(), b"AB");
    })
    .await;
}

#[tokio::test]
async fn unresolved_paths_error_like_the_real_fs() {
    with_scope(async {
        vfs::mount("/data", mem()).unwrap();
        // A path outside the mount goes to the real filesystem.
        let err = vfs::read_file("/no-such-strata-path/x").await.unwrap_err();
        assert_eq!(err.code(), "ENOENT");
    })
    .await;
}

// ============================================================================
// Scope isolation
// ============================================================================

#[tokio::test]
async fn concurrent_scopes_mount_same_prefix_independently() {
    let task = |tag: &'static [u8]| {
        with_scope(async move {
            vfs::mount("/iso", mem()).unwrap();
            vfs::write_file("/iso/f", tag, WriteOptions::default())
                .await
                .unwrap();
            // Yield so the other scope's mount and write interleave.
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            vfs::read_file("/iso/f").await.unwrap()
        })
    };

    let (a, b) = tokio::join!(tokio::spawn(task(b"alpha")), tokio::spawn(task(b"beta")));
    assert_eq!(a.unwrap(), b"alpha");
    assert_eq!(b.unwrap(), b"beta");
}

#[tokio::test]
async fn scoped_mounts_are_invisible_outside() {
    with_scope(async {
        vfs::mount("/private", mem()).unwrap();
        assert!(vfs::is_mounted("/private/x"));
        assert!(strata_vfs::in_scope());
    })
    .await;

    assert!(!vfs::is_mounted("/private/x"));
    assert!(!strata_vfs::in_scope());
}

// ============================================================================
// Directory operations
// ============================================================================

#[tokio::test]
async fn mkdir_recursive_then_list() {
    with_scope(async {
        vfs::mount("/data", mem()).unwrap();

        vfs::mkdir("/data/x/y/z", MkdirOptions { recursive: true })
            .await
            .unwrap();
        for dir in ["/data/x", "/data/x/y", "/data/x/y/z"] {
            assert!(vfs::stat(dir).await.unwrap().unwrap().is_dir(), "{dir}");
        }

        vfs::write_file("/data/x/y/f.txt", b"leaf", WriteOptions::default())
            .await
            .unwrap();
        let deep = vfs::readdir("/data/x", ReadDirOptions { recursive: true })
            .await
            .unwrap();
        let names: Vec<_> = deep.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["y", "y/f.txt", "y/z"]);
    })
    .await;
}

#[tokio::test]
async fn rm_semantics() {
    with_scope(async {
        vfs::mount("/data", mem()).unwrap();
        vfs::mkdir("/data/d", MkdirOptions::default()).await.unwrap();
        vfs::write_file("/data/d/f", b"x", WriteOptions::default())
            .await
            .unwrap();

        let err = vfs::rm("/data/d", RmOptions::default()).await.unwrap_err();
        assert_eq!(err.code(), "ENOTEMPTY");

        vfs::rm("/data/d", RmOptions { recursive: true, force: false })
            .await
            .unwrap();
        assert!(vfs::stat("/data/d").await.unwrap().is_none());
    })
    .await;
}

// ============================================================================
// Rename and copy
// ============================================================================

#[tokio::test]
async fn rename_within_mount_moves_content() {
    with_scope(async {
        vfs::mount("/data", mem()).unwrap();
        vfs::write_file("/data/o", b"c", WriteOptions::default())
            .await
            .unwrap();
        vfs::rename("/data/o", "/data/n").await.unwrap();
        assert!(vfs::stat("/data/o").await.unwrap().is_none());
        assert_eq!(vfs::read_file("/data/n").await.unwrap(), b"c");
    })
    .await;
}

#[tokio::test]
async fn rename_across_mounts_is_exdev() {
    with_scope(async {
        vfs::mount("/m1", mem()).unwrap();
        vfs::mount("/m2", mem()).unwrap();
        vfs::write_file("/m1/f", b"x", WriteOptions::default())
            .await
            .unwrap();

        let err = vfs::rename("/m1/f", "/m2/f").await.unwrap_err();
        assert_eq!(err.code(), "EXDEV");

        // Mount → real filesystem is cross-backend too.
        let err = vfs::rename("/m1/f", "/tmp/strata-exdev").await.unwrap_err();
        assert_eq!(err.code(), "EXDEV");
    })
    .await;
}

#[tokio::test]
async fn cp_across_mounts_buffers_recursively() {
    with_scope(async {
        vfs::mount("/m1", mem()).unwrap();
        vfs::mount("/m2", mem()).unwrap();

        vfs::mkdir("/m1/tree/sub", MkdirOptions { recursive: true })
            .await
            .unwrap();
        vfs::write_file("/m1/tree/a", b"1", WriteOptions::default())
            .await
            .unwrap();
        vfs::write_file("/m1/tree/sub/b", b"2", WriteOptions::default())
            .await
            .unwrap();

        let err = vfs::cp("/m1/tree", "/m2/copy", CopyOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EISDIR");

        vfs::cp("/m1/tree", "/m2/copy", CopyOptions { recursive: true })
            .await
            .unwrap();
        assert_eq!(vfs::read_file("/m2/copy/a").await.unwrap(), b"1");
        assert_eq!(vfs::read_file("/m2/copy/sub/b").await.unwrap(), b"2");
    })
    .await;
}

// ============================================================================
// Symlinks and truncate
// ============================================================================

#[tokio::test]
async fn symlink_transparency_through_facade() {
    with_scope(async {
        vfs::mount("/data", mem()).unwrap();
        vfs::write_file("/data/t", b"v", WriteOptions::default())
            .await
            .unwrap();
        vfs::symlink("/data/l", "/t").await.unwrap();

        assert_eq!(vfs::read_file("/data/l").await.unwrap(), b"v");
        assert_eq!(
            vfs::lstat("/data/l").await.unwrap().unwrap().kind,
            NodeKind::Symlink
        );
        assert_eq!(
            vfs::stat("/data/l").await.unwrap().unwrap().kind,
            NodeKind::File
        );
        assert_eq!(vfs::realpath("/data/l").await.unwrap(), "/data/t");
    })
    .await;
}

#[tokio::test]
async fn truncate_shrink_grow_zero() {
    with_scope(async {
        vfs::mount("/data", mem()).unwrap();
        vfs::write_file("/data/f", b"1234567890", WriteOptions::default())
            .await
            .unwrap();

        vfs::truncate("/data/f", 5).await.unwrap();
        assert_eq!(vfs::read_file("/data/f").await.unwrap(), b"12345");

        vfs::truncate("/data/f", 0).await.unwrap();
        assert_eq!(vfs::read_file("/data/f").await.unwrap(), b"");
    })
    .await;
}

// ============================================================================
// Sync surface
// ============================================================================

#[tokio::test]
async fn sync_surface_works_on_sync_capable_mounts() {
    with_scope(async {
        vfs::mount("/data", mem()).unwrap();

        vfs::write_file_sync("/data/f", b"sync", WriteOptions::default()).unwrap();
        assert_eq!(vfs::read_file_sync("/data/f").unwrap(), b"sync");
        assert!(vfs::stat_sync("/data/f").unwrap().unwrap().is_file());

        vfs::mkdir_sync("/data/d", MkdirOptions::default()).unwrap();
        let entries = vfs::readdir_sync("/data", ReadDirOptions::default()).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["d", "f"]);
    })
    .await;
}

// ============================================================================
// Fall-through to the real filesystem
// ============================================================================

#[tokio::test]
async fn fall_through_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().to_string_lossy().into_owned();

    let f = format!("{base}/file.txt");
    vfs::write_file(&f, b"on disk", WriteOptions::default())
        .await
        .unwrap();
    assert_eq!(vfs::read_file(&f).await.unwrap(), b"on disk");
    assert_eq!(std::fs::read(&f).unwrap(), b"on disk");

    vfs::append_file(&f, b"!").await.unwrap();
    assert_eq!(std::fs::read(&f).unwrap(), b"on disk!");

    let err = vfs::write_file(&f, b"x", WriteOptions::exclusive())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "EEXIST");

    let entries = vfs::readdir(&base, ReadDirOptions::default()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "file.txt");

    vfs::rename(&f, &format!("{base}/moved.txt")).await.unwrap();
    assert!(vfs::stat(&f).await.unwrap().is_none());
    assert!(
        vfs::stat(&format!("{base}/moved.txt"))
            .await
            .unwrap()
            .unwrap()
            .is_file()
    );
}

#[tokio::test]
async fn fall_through_mkdir_rm_and_truncate() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().to_string_lossy().into_owned();

    let sub = format!("{base}/a/b/c");
    vfs::mkdir(&sub, MkdirOptions { recursive: true }).await.unwrap();
    assert!(vfs::stat(&sub).await.unwrap().unwrap().is_dir());

    let f = format!("{base}/a/f.txt");
    vfs::write_file(&f, b"1234567890", WriteOptions::default())
        .await
        .unwrap();
    vfs::truncate(&f, 4).await.unwrap();
    assert_eq!(vfs::read_file(&f).await.unwrap(), b"1234");

    let err = vfs::rm(&format!("{base}/a"), RmOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ENOTEMPTY");
    vfs::rm(&format!("{base}/a"), RmOptions { recursive: true, force: false })
        .await
        .unwrap();
    assert!(vfs::stat(&format!("{base}/a")).await.unwrap().is_none());
}

#[tokio::test]
async fn copy_from_mount_to_real_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().to_string_lossy().into_owned();

    with_scope(async move {
        vfs::mount("/data", mem()).unwrap();
        vfs::write_file("/data/src.txt", b"bridged", WriteOptions::default())
            .await
            .unwrap();

        let dst = format!("{base}/dst.txt");
        vfs::copy_file("/data/src.txt", &dst).await.unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"bridged");

        // And back the other way.
        vfs::copy_file(&dst, "/data/back.txt").await.unwrap();
        assert_eq!(vfs::read_file("/data/back.txt").await.unwrap(), b"bridged");
    })
    .await;
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test]
async fn end_to_end_mount_use_unmount() {
    with_scope(async {
        vfs::mount("/mnt", mem()).unwrap();

        vfs::mkdir("/mnt/a", MkdirOptions { recursive: true })
            .await
            .unwrap();
        vfs::write_file("/mnt/a/b.txt", b"hi", WriteOptions::default())
            .await
            .unwrap();

        let entries = vfs::readdir("/mnt/a", ReadDirOptions::default())
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "b.txt");
        assert_eq!(entries[0].kind, NodeKind::File);

        assert!(vfs::unmount("/mnt"));

        // With the mount gone the same path falls through to the real
        // filesystem, where it does not exist.
        assert!(vfs::stat("/mnt/a/b.txt").await.unwrap().is_none());
    })
    .await;
}
