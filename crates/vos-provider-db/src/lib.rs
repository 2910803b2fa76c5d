//! The embedded-store provider (§4.6): a single logical `files` table in a
//! `rusqlite` database gives a virtual filesystem durable, versioned
//! semantics. Grounded on the workspace database's open/migrate lifecycle:
//! `WorkspaceDb::open` is idempotent and every schema change is a tracked
//! [`migration::Migration`].

mod db;
mod migration;

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, OptionalExtension};
use vos_provider::{
    ByteReader, Entry, ListOptions, Mutable, Permission, Provider, Readable, Touchable, VfsError,
    VfsFile, VfsResult, Writable,
};

pub use db::WorkspaceDb;
pub use migration::Migration;

fn key(path: &str) -> String {
    vos_path::normalize(path).trim_start_matches('/').to_string()
}

fn display_path(k: &str) -> String {
    if k.is_empty() {
        "/".to_string()
    } else {
        format!("/{k}")
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn secs_to_datetime(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

struct Row {
    content: Option<Vec<u8>>,
    is_dir: bool,
    perm: i64,
    modified: i64,
    version: i64,
    meta: Option<String>,
}

fn decode_meta(meta: &Option<String>) -> HashMap<String, String> {
    meta.as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

fn encode_meta(meta: &HashMap<String, String>) -> String {
    serde_json::to_string(meta).unwrap_or_else(|_| "{}".to_string())
}

fn entry_from_row(k: &str, row: &Row) -> Entry {
    let perm = Permission::from_bits(row.perm as u8);
    let mut meta = decode_meta(&row.meta);
    meta.insert("version".to_string(), row.version.to_string());

    let mut entry = if row.is_dir {
        Entry::dir(display_path(k), perm)
    } else {
        Entry::file(display_path(k), perm, row.content.as_ref().map_or(0, Vec::len) as u64)
    }
    .with_modified(secs_to_datetime(row.modified));

    for (k, v) in meta {
        entry = entry.with_meta(k, v);
    }
    entry
}

/// A provider backed by a single `files` table in an embedded `rusqlite`
/// database (§4.6).
pub struct EmbeddedStoreProvider {
    db: WorkspaceDb,
}

impl EmbeddedStoreProvider {
    pub fn open(path: impl Into<std::path::PathBuf>) -> VfsResult<Self> {
        Ok(EmbeddedStoreProvider {
            db: WorkspaceDb::open(path)?,
        })
    }

    pub fn open_in_memory() -> VfsResult<Self> {
        Ok(EmbeddedStoreProvider {
            db: WorkspaceDb::open_in_memory()?,
        })
    }

    fn fetch_row(&self, k: &str) -> VfsResult<Option<Row>> {
        let conn = self.db.connection().lock().map_err(lock_err)?;
        conn.query_row(
            "SELECT content, is_dir, perm, modified, version, meta FROM files WHERE path = ?1",
            params![k],
            |r| {
                Ok(Row {
                    content: r.get(0)?,
                    is_dir: r.get::<_, i64>(1)? != 0,
                    perm: r.get(2)?,
                    modified: r.get(3)?,
                    version: r.get(4)?,
                    meta: r.get(5)?,
                })
            },
        )
        .optional()
        .map_err(migration::sql_err)
    }

    fn has_descendants(&self, k: &str) -> VfsResult<bool> {
        let conn = self.db.connection().lock().map_err(lock_err)?;
        let prefix = format!("{k}/%");
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM files WHERE path LIKE ?1 ESCAPE '\\'",
                params![prefix],
                |r| r.get(0),
            )
            .map_err(migration::sql_err)?;
        Ok(count > 0)
    }

    /// Overwrite content and metadata atomically, bumping `version` (§4.6
    /// `WriteFile`).
    pub fn write_file(&self, path: &str, bytes: Vec<u8>, meta: &HashMap<String, String>) -> VfsResult<()> {
        let k = key(path);
        let conn = self.db.connection().lock().map_err(lock_err)?;
        let meta_json = encode_meta(meta);
        let now = now_secs();

        let existing: Option<i64> = conn
            .query_row("SELECT version FROM files WHERE path = ?1", params![k], |r| r.get(0))
            .optional()
            .map_err(migration::sql_err)?;

        match existing {
            Some(version) => {
                conn.execute(
                    "UPDATE files SET content = ?2, is_dir = 0, modified = ?3, version = ?4, meta = ?5 WHERE path = ?1",
                    params![k, bytes, now, version + 1, meta_json],
                )
                .map_err(migration::sql_err)?;
            }
            None => {
                conn.execute(
                    "INSERT INTO files (path, content, is_dir, perm, modified, version, meta) VALUES (?1, ?2, 0, ?3, ?4, 1, ?5)",
                    params![k, bytes, Permission::RW.bits() as i64, now, meta_json],
                )
                .map_err(migration::sql_err)?;
            }
        }
        Ok(())
    }

    /// Update only the meta column, without bumping `version` (§4.6
    /// `WriteMeta`). Fails with `NotFound` when the row is missing.
    pub fn write_meta(&self, path: &str, meta: &HashMap<String, String>) -> VfsResult<()> {
        let k = key(path);
        let conn = self.db.connection().lock().map_err(lock_err)?;
        let meta_json = encode_meta(meta);
        let changed = conn
            .execute("UPDATE files SET meta = ?2 WHERE path = ?1", params![k, meta_json])
            .map_err(migration::sql_err)?;
        if changed == 0 {
            return Err(VfsError::not_found(display_path(&k)));
        }
        Ok(())
    }

    /// Delete non-directory rows whose modification time is older than
    /// `older_than` seconds ago (§4.6 `Purge`).
    pub fn purge(&self, older_than_secs: i64) -> VfsResult<usize> {
        let conn = self.db.connection().lock().map_err(lock_err)?;
        let cutoff = now_secs() - older_than_secs;
        conn.execute(
            "DELETE FROM files WHERE is_dir = 0 AND modified < ?1",
            params![cutoff],
        )
        .map_err(migration::sql_err)
    }

    /// Delete the exact row at `prefix` plus every descendant (§4.6
    /// `PurgeByPrefix`).
    pub fn purge_by_prefix(&self, prefix: &str) -> VfsResult<usize> {
        let k = key(prefix);
        let conn = self.db.connection().lock().map_err(lock_err)?;
        let child_prefix = format!("{k}/%");
        let deleted = conn
            .execute("DELETE FROM files WHERE path = ?1 OR path LIKE ?2", params![k, child_prefix])
            .map_err(migration::sql_err)?;
        Ok(deleted)
    }

    /// Aggregate stored byte size over non-directory rows (§4.6 `TotalSize`).
    pub fn total_size(&self) -> VfsResult<u64> {
        let conn = self.db.connection().lock().map_err(lock_err)?;
        let total: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(content)), 0) FROM files WHERE is_dir = 0",
                [],
                |r| r.get(0),
            )
            .map_err(migration::sql_err)?;
        Ok(total.max(0) as u64)
    }

    /// Count non-directory rows (§4.6 `Count`).
    pub fn count(&self) -> VfsResult<u64> {
        let conn = self.db.connection().lock().map_err(lock_err)?;
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM files WHERE is_dir = 0", [], |r| r.get(0))
            .map_err(migration::sql_err)?;
        Ok(total.max(0) as u64)
    }
}

fn lock_err<T>(_: std::sync::PoisonError<T>) -> VfsError {
    VfsError::Other {
        message: "embedded store connection lock poisoned".to_string(),
    }
}

#[async_trait]
impl Provider for EmbeddedStoreProvider {
    async fn stat(&self, path: &str) -> VfsResult<Entry> {
        let k = key(path);
        if let Some(row) = self.fetch_row(&k)? {
            return Ok(entry_from_row(&k, &row));
        }
        if k.is_empty() || self.has_descendants(&k)? {
            return Ok(Entry::dir(display_path(&k), Permission::RX));
        }
        Err(VfsError::not_found(display_path(&k)))
    }

    async fn list(&self, path: &str, opts: &ListOptions) -> VfsResult<Vec<Entry>> {
        let k = key(path);
        if !k.is_empty() && self.fetch_row(&k)?.is_none() && !self.has_descendants(&k)? {
            return Err(VfsError::not_found(display_path(&k)));
        }

        let prefix = if k.is_empty() { String::new() } else { format!("{k}/") };
        let like_pattern = format!("{prefix}%");

        let rows: Vec<(String, Row)> = {
            let conn = self.db.connection().lock().map_err(lock_err)?;
            let mut stmt = conn
                .prepare("SELECT path, content, is_dir, perm, modified, version, meta FROM files WHERE path LIKE ?1")
                .map_err(migration::sql_err)?;
            let iter = stmt
                .query_map(params![like_pattern], |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        Row {
                            content: r.get(1)?,
                            is_dir: r.get::<_, i64>(2)? != 0,
                            perm: r.get(3)?,
                            modified: r.get(4)?,
                            version: r.get(5)?,
                            meta: r.get(6)?,
                        },
                    ))
                })
                .map_err(migration::sql_err)?;
            iter.collect::<Result<_, _>>().map_err(migration::sql_err)?
        };

        let mut seen_dirs = std::collections::BTreeSet::new();
        let mut out = Vec::new();

        for (child_key, row) in &rows {
            let Some(rest) = child_key.strip_prefix(prefix.as_str()) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                None => out.push(entry_from_row(child_key, row)),
                Some((name, _)) => {
                    if seen_dirs.insert(name.to_string()) {
                        let child_full = format!("{prefix}{name}");
                        out.push(Entry::dir(display_path(&child_full), Permission::RX));
                    }
                }
            }
        }

        out.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(max) = opts.max_results {
            out.truncate(max);
        }
        Ok(out)
    }

    fn as_readable(&self) -> Option<&dyn Readable> {
        Some(self)
    }

    fn as_writable(&self) -> Option<&dyn Writable> {
        Some(self)
    }

    fn as_mutable(&self) -> Option<&dyn Mutable> {
        Some(self)
    }

    fn as_touchable(&self) -> Option<&dyn Touchable> {
        Some(self)
    }
}

#[async_trait]
impl Readable for EmbeddedStoreProvider {
    async fn open(&self, path: &str) -> VfsResult<VfsFile> {
        let k = key(path);
        let row = self
            .fetch_row(&k)?
            .ok_or_else(|| VfsError::not_found(display_path(&k)))?;
        if row.is_dir {
            return Err(VfsError::IsDir { path: display_path(&k) });
        }
        let bytes = row.content.unwrap_or_default();
        Ok(VfsFile::from_reader(display_path(&k), Box::new(std::io::Cursor::new(bytes))))
    }
}

#[async_trait]
impl Writable for EmbeddedStoreProvider {
    async fn write(&self, path: &str, mut reader: ByteReader) -> VfsResult<()> {
        use tokio::io::AsyncReadExt;
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| VfsError::io(display_path(path), e))?;
        self.write_file(path, bytes, &HashMap::new())
    }
}

#[async_trait]
impl Mutable for EmbeddedStoreProvider {
    async fn mkdir(&self, path: &str, perm: Permission) -> VfsResult<()> {
        let k = key(path);
        let conn = self.db.connection().lock().map_err(lock_err)?;
        let now = now_secs();
        conn.execute(
            "INSERT INTO files (path, content, is_dir, perm, modified, version, meta) VALUES (?1, NULL, 1, ?2, ?3, 1, NULL)
             ON CONFLICT(path) DO UPDATE SET is_dir = 1, perm = ?2, modified = ?3",
            params![k, perm.bits() as i64, now],
        )
        .map_err(migration::sql_err)?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> VfsResult<()> {
        let k = key(path);
        let conn = self.db.connection().lock().map_err(lock_err)?;
        let child_prefix = format!("{k}/%");
        let deleted = conn
            .execute("DELETE FROM files WHERE path = ?1 OR path LIKE ?2", params![k, child_prefix])
            .map_err(migration::sql_err)?;
        if deleted == 0 {
            return Err(VfsError::not_found(display_path(&k)));
        }
        Ok(())
    }

    /// Atomic within one transaction: updates the row's path and rewrites
    /// the prefix of every child row; rolls back on failure (§4.6).
    async fn rename(&self, old: &str, new: &str) -> VfsResult<()> {
        let old_key = key(old);
        let new_key = key(new);
        let mut conn = self.db.connection().lock().map_err(lock_err)?;
        let tx = conn.transaction().map_err(migration::sql_err)?;

        let changed = tx
            .execute("UPDATE files SET path = ?2 WHERE path = ?1", params![old_key, new_key])
            .map_err(migration::sql_err)?;
        if changed == 0 {
            return Err(VfsError::not_found(display_path(&old_key)));
        }

        let old_prefix = format!("{old_key}/");
        let children: Vec<String> = {
            let mut stmt = tx
                .prepare("SELECT path FROM files WHERE path LIKE ?1")
                .map_err(migration::sql_err)?;
            let iter = stmt
                .query_map(params![format!("{old_prefix}%")], |r| r.get::<_, String>(0))
                .map_err(migration::sql_err)?;
            iter.collect::<Result<_, _>>().map_err(migration::sql_err)?
        };

        for child in children {
            let suffix = &child[old_prefix.len()..];
            let new_child = format!("{new_key}/{suffix}");
            tx.execute("UPDATE files SET path = ?2 WHERE path = ?1", params![child, new_child])
                .map_err(migration::sql_err)?;
        }

        tx.commit().map_err(migration::sql_err)?;
        Ok(())
    }
}

#[async_trait]
impl Touchable for EmbeddedStoreProvider {
    async fn touch(&self, path: &str) -> VfsResult<()> {
        let k = key(path);
        let conn = self.db.connection().lock().map_err(lock_err)?;
        let now = now_secs();
        let changed = conn
            .execute("UPDATE files SET modified = ?2 WHERE path = ?1", params![k, now])
            .map_err(migration::sql_err)?;
        if changed == 0 {
            conn.execute(
                "INSERT INTO files (path, content, is_dir, perm, modified, version, meta) VALUES (?1, x'', 0, ?2, ?3, 1, NULL)",
                params![k, Permission::RW.bits() as i64, now],
            )
            .map_err(migration::sql_err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> EmbeddedStoreProvider {
        EmbeddedStoreProvider::open_in_memory().unwrap()
    }

    #[tokio::test]
    async fn write_then_stat_reports_version_in_meta() {
        let p = provider();
        p.as_writable().unwrap().write("a.txt", Box::new(std::io::Cursor::new(b"x".to_vec()))).await.unwrap();
        let entry = p.stat("a.txt").await.unwrap();
        assert_eq!(entry.meta.get("version").map(String::as_str), Some("1"));

        p.as_writable().unwrap().write("a.txt", Box::new(std::io::Cursor::new(b"y".to_vec()))).await.unwrap();
        let entry = p.stat("a.txt").await.unwrap();
        assert_eq!(entry.meta.get("version").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn stat_reports_implicit_directory() {
        let p = provider();
        p.write_file("a/b.txt", b"x".to_vec(), &HashMap::new()).unwrap();
        let entry = p.stat("a").await.unwrap();
        assert!(entry.is_dir);
    }

    #[tokio::test]
    async fn write_meta_does_not_bump_version() {
        let p = provider();
        p.write_file("a.txt", b"x".to_vec(), &HashMap::new()).unwrap();
        let mut meta = HashMap::new();
        meta.insert("tag".to_string(), "v1".to_string());
        p.write_meta("a.txt", &meta).unwrap();
        let entry = p.stat("a.txt").await.unwrap();
        assert_eq!(entry.meta.get("version").map(String::as_str), Some("1"));
        assert_eq!(entry.meta.get("tag").map(String::as_str), Some("v1"));
    }

    #[tokio::test]
    async fn write_meta_on_missing_row_is_not_found() {
        let p = provider();
        let err = p.write_meta("nope", &HashMap::new()).unwrap_err();
        assert!(matches!(err, VfsError::NotFound { .. }));
    }

    #[tokio::test]
    async fn remove_cascades_to_descendants() {
        let p = provider();
        p.write_file("a/b.txt", b"x".to_vec(), &HashMap::new()).unwrap();
        p.write_file("a/c/d.txt", b"y".to_vec(), &HashMap::new()).unwrap();
        p.as_mutable().unwrap().remove("a").await.unwrap();
        assert!(p.stat("a").await.is_err());
    }

    #[tokio::test]
    async fn rename_is_atomic_across_descendants() {
        let p = provider();
        p.write_file("a/b.txt", b"x".to_vec(), &HashMap::new()).unwrap();
        p.write_file("a/c/d.txt", b"y".to_vec(), &HashMap::new()).unwrap();
        p.as_mutable().unwrap().rename("a", "z").await.unwrap();
        assert!(p.stat("a").await.is_err());
        assert!(p.stat("z/b.txt").await.is_ok());
        assert!(p.stat("z/c/d.txt").await.is_ok());
    }

    #[tokio::test]
    async fn purge_by_prefix_deletes_row_and_descendants() {
        let p = provider();
        p.write_file("a/b.txt", b"x".to_vec(), &HashMap::new()).unwrap();
        p.write_file("a/c.txt", b"y".to_vec(), &HashMap::new()).unwrap();
        let deleted = p.purge_by_prefix("a").unwrap();
        assert_eq!(deleted, 2);
    }

    #[tokio::test]
    async fn total_size_and_count_are_aggregates_over_files_only() {
        let p = provider();
        p.write_file("a.txt", b"abc".to_vec(), &HashMap::new()).unwrap();
        p.write_file("b.txt", b"de".to_vec(), &HashMap::new()).unwrap();
        p.as_mutable().unwrap().mkdir("dir", Permission::RX).await.unwrap();
        assert_eq!(p.total_size().unwrap(), 5);
        assert_eq!(p.count().unwrap(), 2);
    }
}
