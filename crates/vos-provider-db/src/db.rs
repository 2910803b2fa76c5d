//! `WorkspaceDb`: owns the sqlite connection and the migration-on-open
//! lifecycle, in the style of the workspace database this crate is grounded
//! on: open is idempotent, and every schema change is expressed as a
//! [`crate::migration::Migration`].

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::Connection;
use vos_provider::VfsResult;

use crate::migration::{self, sql_err, Migration};

const DOMAIN: &str = "files";

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "create_files",
    sql: "CREATE TABLE IF NOT EXISTS files (
        path TEXT NOT NULL UNIQUE,
        content BLOB,
        is_dir INTEGER NOT NULL,
        perm INTEGER NOT NULL,
        modified INTEGER NOT NULL,
        version INTEGER NOT NULL DEFAULT 1,
        meta TEXT
    );",
}];

pub struct WorkspaceDb {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl WorkspaceDb {
    pub fn open(path: impl Into<PathBuf>) -> VfsResult<Self> {
        let path = path.into();
        let conn = Connection::open(&path).map_err(sql_err)?;
        migration::run(&conn, DOMAIN, MIGRATIONS)?;
        ensure_version_column(&conn)?;
        Ok(WorkspaceDb {
            conn: Mutex::new(conn),
            path,
        })
    }

    #[must_use]
    pub fn open_in_memory() -> VfsResult<Self> {
        let conn = Connection::open_in_memory().map_err(sql_err)?;
        migration::run(&conn, DOMAIN, MIGRATIONS)?;
        ensure_version_column(&conn)?;
        Ok(WorkspaceDb {
            conn: Mutex::new(conn),
            path: PathBuf::new(),
        })
    }

    #[must_use]
    pub fn connection(&self) -> &Mutex<Connection> {
        &self.conn
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.path
    }
}

/// Forward compatibility (§4.6): add the `version` column, defaulting
/// existing rows to `1`, if an older schema lacks it.
fn ensure_version_column(conn: &Connection) -> VfsResult<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(files)").map_err(sql_err)?;
    let has_version = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(sql_err)?
        .filter_map(Result::ok)
        .any(|name| name == "version");
    drop(stmt);

    if !has_version {
        conn.execute_batch("ALTER TABLE files ADD COLUMN version INTEGER NOT NULL DEFAULT 1;")
            .map_err(sql_err)?;
    }
    Ok(())
}
