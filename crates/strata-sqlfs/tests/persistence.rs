//! Persistence and facade-level tests for the SQL backend.

use strata_vfs::{
    self as vfs, MkdirOptions, ReadDirOptions, WriteOptions, ops_sync, with_scope,
};
use strata_sqlfs::SqliteFs;

#[test]
fn contents_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("fs.db");

    {
        let b = SqliteFs::open(&db).unwrap().into_handle();
        ops_sync::mkdir(&b, "/docs", MkdirOptions::default()).unwrap();
        ops_sync::write_file(&b, "/docs/note.txt", b"durable", WriteOptions::default()).unwrap();
        ops_sync::symlink(&b, "/latest", "/docs/note.txt").unwrap();
    }

    let b = SqliteFs::open(&db).unwrap().into_handle();
    assert_eq!(ops_sync::read_file(&b, "/docs/note.txt").unwrap(), b"durable");
    assert_eq!(ops_sync::read_file(&b, "/latest").unwrap(), b"durable");

    let st = ops_sync::stat(&b, "/docs/note.txt", true).unwrap().unwrap();
    assert!(st.is_file());
    assert_eq!(st.size, 7);
    assert!(st.modified.is_some());
}

#[tokio::test]
async fn async_surface_drives_the_sync_backend() {
    // The derivation layer falls back to the sync arm, so an async-facade
    // mount over SqliteFs works end to end.
    with_scope(async {
        vfs::mount("/db", SqliteFs::open_in_memory().unwrap().into_handle()).unwrap();

        vfs::mkdir("/db/a", MkdirOptions { recursive: true }).await.unwrap();
        vfs::write_file("/db/a/f", b"via async", WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(vfs::read_file("/db/a/f").await.unwrap(), b"via async");

        let entries = vfs::readdir("/db/a", ReadDirOptions::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "f");

        // The sync surface sees the same mount.
        assert_eq!(vfs::read_file_sync("/db/a/f").unwrap(), b"via async");
    })
    .await;
}
