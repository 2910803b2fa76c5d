//! A small migration runner, modeled on the workspace database's
//! `_migrations` bookkeeping table: each domain tracks its own set of
//! applied versions so unrelated schemas never collide.

use rusqlite::Connection;
use vos_provider::{VfsError, VfsResult};

/// One forward-only schema change, identified by a monotonically increasing
/// `version` within its `domain`.
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

pub fn ensure_migrations_table(conn: &Connection) -> VfsResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            domain TEXT NOT NULL,
            version INTEGER NOT NULL,
            name TEXT NOT NULL,
            applied_at INTEGER NOT NULL,
            PRIMARY KEY (domain, version)
        );",
    )
    .map_err(sql_err)
}

/// Apply every migration in `migrations` whose version has not already been
/// recorded for `domain`, in ascending version order.
pub fn run(conn: &Connection, domain: &str, migrations: &[Migration]) -> VfsResult<()> {
    ensure_migrations_table(conn)?;

    let mut applied: Vec<i64> = {
        let mut stmt = conn
            .prepare("SELECT version FROM _migrations WHERE domain = ?1")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([domain], |row| row.get::<_, i64>(0))
            .map_err(sql_err)?;
        rows.collect::<Result<_, _>>().map_err(sql_err)?
    };
    applied.sort_unstable();

    for migration in migrations {
        if applied.binary_search(&migration.version).is_ok() {
            continue;
        }
        conn.execute_batch(migration.sql).map_err(sql_err)?;
        conn.execute(
            "INSERT INTO _migrations (domain, version, name, applied_at) VALUES (?1, ?2, ?3, strftime('%s','now'))",
            rusqlite::params![domain, migration.version, migration.name],
        )
        .map_err(sql_err)?;
        tracing::info!(domain, version = migration.version, name = migration.name, "applied migration");
    }
    Ok(())
}

pub fn sql_err(err: rusqlite::Error) -> VfsError {
    VfsError::Other {
        message: err.to_string(),
    }
}
