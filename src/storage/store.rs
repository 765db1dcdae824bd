//! SQLite table set: one `(id, blob)` table per record type plus `tbl_attr`

use std::path::{Path, PathBuf};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use crate::config::{Mode, BATCH_SIZE};
use crate::error::{OsmdbError, Result};
use crate::storage::record::RecordType;

/// Owner of the SQLite connection.
///
/// Writes made between `begin` and `commit` are grouped into one transaction
/// that is committed every `BATCH_SIZE` operations.
pub struct Store {
    conn: Connection,
    path: PathBuf,
    mode: Mode,
    in_batch: bool,
    batch_ops: usize,
}

impl Store {
    /// Open the record table set, creating the schema in `Mode::Create`
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self> {
        let store = Self::open_raw(path, mode)?;
        if mode == Mode::Create {
            let tables: Vec<String> = RecordType::ALL
                .iter()
                .map(|kind| kind.table_name().to_string())
                .collect();
            store.create_schema(&tables)?;
        }
        Ok(store)
    }

    /// Open a connection with the pragmas shared by every osmdb database
    pub(crate) fn open_raw<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let flags = match mode {
            Mode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            Mode::Create => {
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX
            }
            Mode::Append => OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        };
        let conn = Connection::open_with_flags(&path, flags)?;

        if mode.is_writable() {
            let _: String = conn.pragma_update_and_check(None, "journal_mode", "OFF", |row| row.get(0))?;
        }
        let _: String = conn.pragma_update_and_check(None, "locking_mode", "EXCLUSIVE", |row| row.get(0))?;

        tracing::debug!("Opened {:?} ({:?})", path, mode);

        Ok(Self {
            conn,
            path,
            mode,
            in_batch: false,
            batch_ops: 0,
        })
    }

    pub(crate) fn create_schema(&self, tables: &[String]) -> Result<()> {
        self.require_writable("create schema")?;
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS tbl_attr (key TEXT UNIQUE, val TEXT)",
            [],
        )?;
        for table in tables {
            self.conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS tbl_{} (id INTEGER PRIMARY KEY NOT NULL, blob BLOB)",
                    table
                ),
                [],
            )?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn require_writable(&self, what: &str) -> Result<()> {
        if !self.mode.is_writable() {
            return Err(OsmdbError::Protocol(format!("{} in read-only mode", what)));
        }
        Ok(())
    }

    /// Load the blob of entry `(kind, major)`, `None` when absent
    pub fn load(&self, kind: RecordType, major: i64) -> Result<Option<Vec<u8>>> {
        self.load_table(kind.table_name(), major)
    }

    pub(crate) fn load_table(&self, table: &str, id: i64) -> Result<Option<Vec<u8>>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT blob FROM tbl_{} WHERE id=?1", table))?;
        let blob = stmt
            .query_row(params![id], |row| row.get::<_, Vec<u8>>(0))
            .optional()?;
        Ok(blob)
    }

    /// Write (insert or replace) the blob of entry `(kind, major)`
    pub fn save(&mut self, kind: RecordType, major: i64, blob: &[u8]) -> Result<()> {
        self.save_table(kind.table_name(), major, blob)
    }

    pub(crate) fn save_table(&mut self, table: &str, id: i64, blob: &[u8]) -> Result<()> {
        self.require_writable("save")?;
        {
            let mut stmt = self.conn.prepare_cached(&format!(
                "INSERT OR REPLACE INTO tbl_{} (id, blob) VALUES (?1, ?2)",
                table
            ))?;
            stmt.execute(params![id, blob])?;
        }
        self.count_batch_op()
    }

    /// Number of rows in a record table
    pub fn count(&self, kind: RecordType) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM tbl_{}", kind.table_name()),
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Start a batched transaction (no-op if one is open)
    pub fn begin(&mut self) -> Result<()> {
        self.require_writable("begin")?;
        if !self.in_batch {
            self.conn.execute_batch("BEGIN")?;
            self.in_batch = true;
            self.batch_ops = 0;
        }
        Ok(())
    }

    /// Commit the batched transaction (no-op if none is open).
    ///
    /// The batch flag is cleared before committing so that a failed commit
    /// lets the next `begin` open a fresh transaction.
    pub fn commit(&mut self) -> Result<()> {
        if self.in_batch {
            self.in_batch = false;
            tracing::debug!("Committing batch of {} ops to {:?}", self.batch_ops, self.path);
            self.batch_ops = 0;
            if let Err(e) = self.conn.execute_batch("COMMIT") {
                // leave no dangling transaction behind
                let _ = self.conn.execute_batch("ROLLBACK");
                return Err(e.into());
            }
        }
        Ok(())
    }

    pub fn in_batch(&self) -> bool {
        self.in_batch
    }

    fn count_batch_op(&mut self) -> Result<()> {
        if self.in_batch {
            self.batch_ops += 1;
            if self.batch_ops >= BATCH_SIZE {
                self.commit()?;
                self.begin()?;
            }
        }
        Ok(())
    }

    /// Dataset version from `tbl_attr`, 0 when absent
    pub fn changeset(&self) -> Result<i64> {
        let val: Option<String> = self
            .conn
            .query_row(
                "SELECT val FROM tbl_attr WHERE key='changeset'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match val {
            Some(s) => s.trim().parse::<i64>().map_err(|_| {
                OsmdbError::Corruption(format!("changeset attribute {:?} is not a number", s))
            }),
            None => Ok(0),
        }
    }

    pub fn set_changeset(&mut self, changeset: i64) -> Result<()> {
        self.require_writable("set changeset")?;
        self.conn.execute(
            "INSERT OR REPLACE INTO tbl_attr (key, val) VALUES ('changeset', ?1)",
            params![changeset.to_string()],
        )?;
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.commit() {
            tracing::error!("Final commit of {:?} failed: {}", self.path, e);
        }
    }
}
