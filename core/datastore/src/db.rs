//! SQLite-backed byte cache.
//!
//! Payloads survive datastore restarts, which lets a client reopen a capture
//! whose device is long gone. The schema is a single write-once table.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

use crate::cache::{ByteCache, CacheError};

pub struct Db {
    path: PathBuf,
}

impl Db {
    pub fn new(path: PathBuf) -> Result<Self, CacheError> {
        let db = Self { path };
        db.init_schema()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_bytes(&self, id: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.with_connection(|conn| {
            let contents = conn
                .query_row(
                    "SELECT contents FROM bytes WHERE id = ?1",
                    params![id],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .optional()?;
            Ok(contents)
        })
    }

    pub fn insert_bytes(&self, id: &str, contents: &[u8]) -> Result<(), CacheError> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO bytes (id, contents) VALUES (?1, ?2) \
                 ON CONFLICT(id) DO NOTHING",
                params![id, contents],
            )?;
            Ok(())
        })
    }

    pub fn count_bytes(&self) -> Result<usize, CacheError> {
        let count = self.with_connection(|conn| {
            let count = conn.query_row("SELECT COUNT(*) FROM bytes", [], |row| {
                row.get::<_, i64>(0)
            })?;
            Ok(count)
        })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn init_schema(&self) -> Result<(), CacheError> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS bytes (
                    id TEXT PRIMARY KEY,
                    contents BLOB NOT NULL
                 );
                 COMMIT;",
            )?;
            Ok(())
        })
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let mut conn = self.open()?;
        op(&mut conn)
    }

    fn open(&self) -> Result<Connection, CacheError> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent).map_err(|source| CacheError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;

        Ok(conn)
    }
}

impl ByteCache for Db {
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.get_bytes(id)
    }

    fn put(&self, id: &str, contents: &[u8]) -> Result<(), CacheError> {
        self.insert_bytes(id, contents)
    }

    fn len(&self) -> Result<usize, CacheError> {
        self.count_bytes()
    }
}
