//! Embedded-SQL backend for strata-vfs.
//!
//! One row per filesystem node, keyed by full normalized path: parent
//! path, leaf name, type tag, size, raw content (NULL for non-files),
//! symlink target (NULL for non-links), creation and modification
//! timestamps. An index on the parent column serves direct-child
//! listings; the root `/` row is seeded when the database is opened.
//!
//! The connection sits behind a `Mutex`, so all callers in one process
//! serialize naturally — SQLite's single-writer model does the rest for
//! a database file shared between processes.

use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use strata_vfs::path as vpath;
use strata_vfs::{
    BackendHandle, ByteRange, Capabilities, DirEntry, NodeKind, Stat, SyncBackend, VfsError,
    VfsResult, WriteFlags, WriteStreamOptions,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    path     TEXT PRIMARY KEY,
    parent   TEXT NOT NULL,
    name     TEXT NOT NULL,
    kind     TEXT NOT NULL,
    size     INTEGER NOT NULL DEFAULT 0,
    data     BLOB,
    target   TEXT,
    created  INTEGER NOT NULL,
    modified INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS nodes_by_parent ON nodes(parent);
";

/// SQL-backed filesystem implementing the synchronous backend contract.
pub struct SqliteFs {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteFs").finish_non_exhaustive()
    }
}

fn db_err(err: rusqlite::Error) -> VfsError {
    VfsError::Io(err.to_string())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn time_to_ms(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

fn ms_to_time(ms: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms.max(0) as u64)
}

fn kind_tag(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::File => "file",
        NodeKind::Directory => "directory",
        NodeKind::Symlink => "symlink",
    }
}

fn tag_kind(tag: &str) -> NodeKind {
    match tag {
        "directory" => NodeKind::Directory,
        "symlink" => NodeKind::Symlink,
        _ => NodeKind::File,
    }
}

impl SqliteFs {
    /// Open (or create) a database file and seed the root directory.
    pub fn open(db_path: impl AsRef<Path>) -> VfsResult<Self> {
        tracing::debug!(db = %db_path.as_ref().display(), "opening sqlfs database");
        let conn = Connection::open(db_path).map_err(db_err)?;
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> VfsResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> VfsResult<Self> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        let now = now_ms();
        conn.execute(
            "INSERT OR IGNORE INTO nodes (path, parent, name, kind, size, created, modified)
             VALUES ('/', '', '', 'directory', 0, ?1, ?1)",
            params![now],
        )
        .map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Wrap this backend in a mountable handle.
    pub fn into_handle(self) -> Arc<BackendHandle> {
        BackendHandle::from_sync(Arc::new(self))
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn row_kind(conn: &Connection, p: &str) -> VfsResult<Option<NodeKind>> {
        conn.query_row(
            "SELECT kind FROM nodes WHERE path = ?1",
            params![p],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(db_err)
        .map(|tag| tag.map(|t| tag_kind(&t)))
    }

    fn require_parent_dir(conn: &Connection, p: &str) -> VfsResult<()> {
        let parent = vpath::parent_of(p);
        match Self::row_kind(conn, &parent)? {
            Some(NodeKind::Directory) => Ok(()),
            Some(_) => Err(VfsError::NotADirectory(parent)),
            None => Err(VfsError::NotFound(parent)),
        }
    }

    fn has_children(conn: &Connection, p: &str) -> VfsResult<bool> {
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM nodes WHERE parent = ?1 AND path != '/'",
                params![p],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }
}

impl SyncBackend for SqliteFs {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            symlinks: true,
            ranged_reads: true,
            whole_file: false,
            rename: false,
            set_modified: true,
        }
    }

    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn stat(&self, path: &str) -> VfsResult<Option<Stat>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT kind, size, created, modified FROM nodes WHERE path = ?1",
            params![path],
            |row| {
                Ok(Stat {
                    kind: tag_kind(&row.get::<_, String>(0)?),
                    size: row.get::<_, i64>(1)?.max(0) as u64,
                    created: Some(ms_to_time(row.get(2)?)),
                    modified: Some(ms_to_time(row.get(3)?)),
                    writable: true,
                })
            },
        )
        .optional()
        .map_err(db_err)
    }

    fn read(&self, path: &str, range: Option<ByteRange>) -> VfsResult<Vec<u8>> {
        let conn = self.lock();
        match Self::row_kind(&conn, path)? {
            None => return Err(VfsError::NotFound(path.to_string())),
            Some(NodeKind::Directory) => return Err(VfsError::IsADirectory(path.to_string())),
            Some(NodeKind::Symlink) => return Err(VfsError::Invalid(path.to_string())),
            Some(NodeKind::File) => {}
        }

        // substr slices the blob inside SQLite, so a ranged read never
        // materializes the whole object in this process.
        let data: Option<Vec<u8>> = match range {
            None => conn
                .query_row(
                    "SELECT data FROM nodes WHERE path = ?1",
                    params![path],
                    |row| row.get(0),
                )
                .map_err(db_err)?,
            Some(ByteRange { start, end: None }) => conn
                .query_row(
                    "SELECT substr(data, ?2) FROM nodes WHERE path = ?1",
                    params![path, start as i64 + 1],
                    |row| row.get(0),
                )
                .map_err(db_err)?,
            Some(ByteRange {
                start,
                end: Some(end),
            }) => {
                let len = end.saturating_sub(start).saturating_add(1);
                conn.query_row(
                    "SELECT substr(data, ?2, ?3) FROM nodes WHERE path = ?1",
                    params![path, start as i64 + 1, len as i64],
                    |row| row.get(0),
                )
                .map_err(db_err)?
            }
        };
        Ok(data.unwrap_or_default())
    }

    fn write(&self, path: &str, data: &[u8], opts: WriteStreamOptions) -> VfsResult<()> {
        let conn = self.lock();
        let existing: Option<(NodeKind, Option<Vec<u8>>)> = conn
            .query_row(
                "SELECT kind, data FROM nodes WHERE path = ?1",
                params![path],
                |row| Ok((row.get::<_, String>(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?
            .map(|(tag, data)| (tag_kind(&tag), data));

        let prior = match existing {
            Some((NodeKind::Directory, _)) => {
                return Err(VfsError::IsADirectory(path.to_string()));
            }
            Some((NodeKind::Symlink, _)) => return Err(VfsError::Invalid(path.to_string())),
            Some((NodeKind::File, data)) => Some(data.unwrap_or_default()),
            None => {
                Self::require_parent_dir(&conn, path)?;
                None
            }
        };

        let content = match opts.flags {
            WriteFlags::Truncate => data.to_vec(),
            WriteFlags::Append => {
                let mut content = prior.clone().unwrap_or_default();
                content.extend_from_slice(data);
                content
            }
            WriteFlags::Overwrite => {
                let start = opts.start.unwrap_or(0) as usize;
                let mut content = prior.clone().unwrap_or_default();
                if content.len() < start {
                    content.resize(start, 0);
                }
                let end = start + data.len();
                if content.len() < end {
                    content.resize(end, 0);
                }
                content[start..end].copy_from_slice(data);
                content
            }
        };

        let now = now_ms();
        if prior.is_some() {
            conn.execute(
                "UPDATE nodes SET data = ?2, size = ?3, modified = ?4 WHERE path = ?1",
                params![path, content, content.len() as i64, now],
            )
            .map_err(db_err)?;
        } else {
            conn.execute(
                "INSERT INTO nodes (path, parent, name, kind, size, data, created, modified)
                 VALUES (?1, ?2, ?3, 'file', ?4, ?5, ?6, ?6)",
                params![
                    path,
                    vpath::parent_of(path),
                    vpath::base_name(path),
                    content.len() as i64,
                    content,
                    now
                ],
            )
            .map_err(db_err)?;
        }
        Ok(())
    }

    fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let conn = self.lock();
        match Self::row_kind(&conn, path)? {
            None => return Err(VfsError::NotFound(path.to_string())),
            Some(NodeKind::Directory) => {}
            Some(_) => return Err(VfsError::NotADirectory(path.to_string())),
        }

        let mut stmt = conn
            .prepare("SELECT name, kind FROM nodes WHERE parent = ?1 AND path != '/'")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![path], |row| {
                Ok(DirEntry {
                    name: row.get(0)?,
                    kind: tag_kind(&row.get::<_, String>(1)?),
                })
            })
            .map_err(db_err)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?);
        }
        Ok(entries)
    }

    fn mkdir(&self, path: &str) -> VfsResult<()> {
        let conn = self.lock();
        if Self::row_kind(&conn, path)?.is_some() {
            return Err(VfsError::AlreadyExists(path.to_string()));
        }
        Self::require_parent_dir(&conn, path)?;
        let now = now_ms();
        conn.execute(
            "INSERT INTO nodes (path, parent, name, kind, size, created, modified)
             VALUES (?1, ?2, ?3, 'directory', 0, ?4, ?4)",
            params![path, vpath::parent_of(path), vpath::base_name(path), now],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn remove(&self, path: &str) -> VfsResult<()> {
        if path == "/" {
            return Err(VfsError::Invalid("cannot remove root".to_string()));
        }
        let conn = self.lock();
        match Self::row_kind(&conn, path)? {
            None => return Err(VfsError::NotFound(path.to_string())),
            Some(NodeKind::Directory) => {
                if Self::has_children(&conn, path)? {
                    return Err(VfsError::NotEmpty(path.to_string()));
                }
            }
            Some(_) => {}
        }
        conn.execute("DELETE FROM nodes WHERE path = ?1", params![path])
            .map_err(db_err)?;
        Ok(())
    }

    fn symlink(&self, link: &str, target: &str) -> VfsResult<()> {
        let conn = self.lock();
        if Self::row_kind(&conn, link)?.is_some() {
            return Err(VfsError::AlreadyExists(link.to_string()));
        }
        Self::require_parent_dir(&conn, link)?;
        let now = now_ms();
        conn.execute(
            "INSERT INTO nodes (path, parent, name, kind, size, target, created, modified)
             VALUES (?1, ?2, ?3, 'symlink', 0, ?4, ?5, ?5)",
            params![
                link,
                vpath::parent_of(link),
                vpath::base_name(link),
                target,
                now
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn read_link(&self, path: &str) -> VfsResult<String> {
        let conn = self.lock();
        match Self::row_kind(&conn, path)? {
            None => Err(VfsError::NotFound(path.to_string())),
            Some(NodeKind::Symlink) => conn
                .query_row(
                    "SELECT target FROM nodes WHERE path = ?1",
                    params![path],
                    |row| row.get::<_, Option<String>>(0),
                )
                .map_err(db_err)?
                .ok_or_else(|| VfsError::Invalid(path.to_string())),
            Some(_) => Err(VfsError::Invalid(path.to_string())),
        }
    }

    fn set_modified(&self, path: &str, mtime: SystemTime) -> VfsResult<()> {
        let conn = self.lock();
        let changed = conn
            .execute(
                "UPDATE nodes SET modified = ?2 WHERE path = ?1",
                params![path, time_to_ms(mtime)],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(VfsError::NotFound(path.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_vfs::{MkdirOptions, ReadDirOptions, RmOptions, WriteOptions, ops_sync};

    fn handle() -> Arc<BackendHandle> {
        SqliteFs::open_in_memory().unwrap().into_handle()
    }

    #[test]
    fn root_is_seeded() {
        let fs = SqliteFs::open_in_memory().unwrap();
        let st = fs.stat("/").unwrap().unwrap();
        assert!(st.is_dir());
    }

    #[test]
    fn write_read_round_trip() {
        let b = handle();
        ops_sync::write_file(&b, "/f", b"hello", WriteOptions::default()).unwrap();
        assert_eq!(ops_sync::read_file(&b, "/f").unwrap(), b"hello");

        ops_sync::write_file(&b, "/f", b" world", WriteOptions::append()).unwrap();
        assert_eq!(ops_sync::read_file(&b, "/f").unwrap(), b"hello world");
    }

    #[test]
    fn ranged_read_uses_blob_slice() {
        let fs = SqliteFs::open_in_memory().unwrap();
        fs.write("/f", b"0123456789", WriteStreamOptions::truncate()).unwrap();
        assert_eq!(
            fs.read("/f", Some(ByteRange::inclusive(2, 4))).unwrap(),
            b"234"
        );
        assert_eq!(fs.read("/f", Some(ByteRange::from(7))).unwrap(), b"789");
    }

    #[test]
    fn directory_tree_and_listing() {
        let b = handle();
        ops_sync::mkdir(&b, "/a/b", MkdirOptions { recursive: true }).unwrap();
        ops_sync::write_file(&b, "/a/b/f", b"x", WriteOptions::default()).unwrap();
        ops_sync::write_file(&b, "/a/g", b"y", WriteOptions::default()).unwrap();

        let entries = ops_sync::readdir(&b, "/a", ReadDirOptions { recursive: true }).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["b", "b/f", "g"]);
    }

    #[test]
    fn remove_semantics() {
        let b = handle();
        ops_sync::mkdir(&b, "/d", MkdirOptions::default()).unwrap();
        ops_sync::write_file(&b, "/d/f", b"x", WriteOptions::default()).unwrap();

        let err = ops_sync::rm(&b, "/d", RmOptions::default()).unwrap_err();
        assert_eq!(err.code(), "ENOTEMPTY");
        ops_sync::rm(&b, "/d", RmOptions { recursive: true, force: false }).unwrap();
        assert!(ops_sync::stat(&b, "/d", true).unwrap().is_none());
    }

    #[test]
    fn symlink_round_trip() {
        let b = handle();
        ops_sync::write_file(&b, "/t", b"v", WriteOptions::default()).unwrap();
        ops_sync::symlink(&b, "/l", "/t").unwrap();
        assert_eq!(ops_sync::read_file(&b, "/l").unwrap(), b"v");
        assert_eq!(ops_sync::read_link(&b, "/l").unwrap(), "/t");
        assert!(ops_sync::stat(&b, "/l", false).unwrap().unwrap().is_symlink());
    }

    #[test]
    fn rename_derived_from_copy_and_delete() {
        let b = handle();
        ops_sync::mkdir(&b, "/d", MkdirOptions::default()).unwrap();
        ops_sync::write_file(&b, "/d/f", b"deep", WriteOptions::default()).unwrap();
        ops_sync::rename(&b, "/d", "/moved").unwrap();
        assert!(ops_sync::stat(&b, "/d", true).unwrap().is_none());
        assert_eq!(ops_sync::read_file(&b, "/moved/f").unwrap(), b"deep");
    }

    #[test]
    fn set_modified_round_trips() {
        let fs = SqliteFs::open_in_memory().unwrap();
        fs.write("/f", b"x", WriteStreamOptions::truncate()).unwrap();
        let mtime = UNIX_EPOCH + Duration::from_millis(12_345);
        fs.set_modified("/f", mtime).unwrap();
        assert_eq!(fs.stat("/f").unwrap().unwrap().modified, Some(mtime));
    }
}
