//! The in-memory provider (§4.4): a map from normalized inner path to a
//! record, seeded by `add_file`/`add_dir`/`add_func`/`add_exec_func`.
//!
//! Keys are stored the way the mount table hands paths to a provider:
//! relative, with no leading slash, and the empty string for the provider's
//! own root. Paths that are not explicit records but are a prefix of some
//! other record's path are *implicit directories* and must be reported as
//! such by `stat` and `list`.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use vos_provider::{
    ByteReader, Entry, Environment, Executable, Executor, ListOptions, Mutable, Permission,
    Provider, Readable, Touchable, VfsError, VfsFile, VfsResult, Writable,
};

/// A synchronous function backing an executable in-memory entry.
///
/// Registered via `add_func`/`add_exec_func`; invoked by `Exec` (or by
/// opening the entry and calling `VfsFile::exec`) with the argument vector,
/// an optional stdin stream, and the calling shell's per-call environment
/// (§3, §9), producing a byte stream of output.
#[async_trait]
pub trait MemoryFunc: Send + Sync {
    async fn call(&self, args: Vec<String>, stdin: Option<ByteReader>, env: &Environment) -> VfsResult<ByteReader>;
}

struct FnExecutor(Arc<dyn MemoryFunc>);

#[async_trait]
impl Executor for FnExecutor {
    async fn exec(&self, args: Vec<String>, stdin: Option<ByteReader>, env: &Environment) -> VfsResult<ByteReader> {
        self.0.call(args, stdin, env).await
    }
}

#[derive(Clone)]
enum Body {
    File(Vec<u8>),
    Dir,
    Func {
        help: String,
        func: Arc<dyn MemoryFunc>,
    },
}

#[derive(Clone)]
struct Record {
    body: Body,
    perm: Permission,
    modified: DateTime<Utc>,
    meta: std::collections::HashMap<String, String>,
}

/// Normalize a (possibly absolute, possibly relative) path into the
/// provider's own key space: no leading slash, empty string for the root.
fn key(path: &str) -> String {
    vos_path::normalize(path).trim_start_matches('/').to_string()
}

/// The absolute display path for a key, for building `Entry` values.
fn display_path(key: &str) -> String {
    if key.is_empty() {
        "/".to_string()
    } else {
        format!("/{key}")
    }
}

/// An in-memory, namespace-owning provider.
///
/// `stat`/`list`/`open` are the base and `Readable` surface; `write`,
/// `mkdir`/`remove`/`rename` are supported unconditionally (§4.4 describes no
/// read-only mode), so `as_writable`/`as_mutable`/`as_executable` always
/// return `Some`.
pub struct MemoryProvider {
    records: RwLock<BTreeMap<String, Record>>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        MemoryProvider {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Seed a file at `path` with `perm` and `content`.
    pub fn add_file(&self, path: &str, perm: Permission, content: impl Into<Vec<u8>>) {
        self.records.write().insert(
            key(path),
            Record {
                body: Body::File(content.into()),
                perm,
                modified: Utc::now(),
                meta: std::collections::HashMap::new(),
            },
        );
    }

    /// Seed an explicit directory record at `path`. Directories are also
    /// implied by any descendant's path, so this is only needed for empty
    /// directories.
    pub fn add_dir(&self, path: &str, perm: Permission) {
        self.records.write().insert(
            key(path),
            Record {
                body: Body::Dir,
                perm,
                modified: Utc::now(),
                meta: std::collections::HashMap::new(),
            },
        );
    }

    /// Seed a function-backed executable entry at `path`. `help` is the
    /// synthetic document returned by `open` (§4.4: "name - description\\nUsage: …").
    pub fn add_func(&self, path: &str, help: impl Into<String>, func: Arc<dyn MemoryFunc>) {
        self.add_exec_func(path, help, func);
    }

    /// Alias kept distinct from [`Self::add_func`] so callers reading §4.4's
    /// `AddFunc`/`AddExecFunc` pair find both names; behavior is identical.
    pub fn add_exec_func(&self, path: &str, help: impl Into<String>, func: Arc<dyn MemoryFunc>) {
        self.records.write().insert(
            key(path),
            Record {
                body: Body::Func {
                    help: help.into(),
                    func,
                },
                perm: Permission::RX,
                modified: Utc::now(),
                meta: std::collections::HashMap::new(),
            },
        );
    }

    /// Remove a function previously registered with `add_func`, so the slot
    /// can be reused as a plain file (§4.4: "a hint to call RemoveFunc first").
    pub fn remove_func(&self, path: &str) {
        self.records.write().remove(&key(path));
    }

    fn entry_for(&self, k: &str, record: &Record) -> Entry {
        let path = display_path(k);
        let is_dir = matches!(record.body, Body::Dir);
        let size = match &record.body {
            Body::File(bytes) => bytes.len() as u64,
            Body::Dir | Body::Func { .. } => 0,
        };
        let mut entry = if is_dir {
            Entry::dir(path, record.perm)
        } else {
            Entry::file(path, record.perm, size)
        }
        .with_modified(record.modified);
        for (k, v) in &record.meta {
            entry = entry.with_meta(k.clone(), v.clone());
        }
        entry
    }

    fn is_implicit_dir(records: &BTreeMap<String, Record>, k: &str) -> bool {
        let prefix = if k.is_empty() {
            String::new()
        } else {
            format!("{k}/")
        };
        records.keys().any(|other| other != k && other.starts_with(&prefix))
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    async fn stat(&self, path: &str) -> VfsResult<Entry> {
        let k = key(path);
        let records = self.records.read();

        if let Some(record) = records.get(&k) {
            return Ok(self.entry_for(&k, record));
        }
        if k.is_empty() || Self::is_implicit_dir(&records, &k) {
            return Ok(Entry::dir(display_path(&k), Permission::RX));
        }
        Err(VfsError::not_found(display_path(&k)))
    }

    async fn list(&self, path: &str, opts: &ListOptions) -> VfsResult<Vec<Entry>> {
        let k = key(path);
        let records = self.records.read();

        if !k.is_empty() && !records.contains_key(&k) && !Self::is_implicit_dir(&records, &k) {
            return Err(VfsError::not_found(display_path(&k)));
        }

        let prefix = if k.is_empty() { String::new() } else { format!("{k}/") };

        let mut seen_dirs = std::collections::BTreeSet::new();
        let mut out: Vec<Entry> = Vec::new();

        for (child_key, record) in records.iter() {
            let Some(rest) = child_key.strip_prefix(prefix.as_str()) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                None => out.push(self.entry_for(child_key, record)),
                Some((child_name, _)) => {
                    if seen_dirs.insert(child_name.to_string()) {
                        let child_key_full = format!("{prefix}{child_name}");
                        out.push(Entry::dir(display_path(&child_key_full), Permission::RX));
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

    fn as_executable(&self) -> Option<&dyn Executable> {
        Some(self)
    }
}

#[async_trait]
impl Readable for MemoryProvider {
    async fn open(&self, path: &str) -> VfsResult<VfsFile> {
        let k = key(path);
        let records = self.records.read();
        let record = records.get(&k).ok_or_else(|| VfsError::not_found(display_path(&k)))?;

        match &record.body {
            Body::File(bytes) => Ok(VfsFile::from_reader(display_path(&k), Box::new(Cursor::new(bytes.clone())))),
            Body::Dir => Err(VfsError::IsDir { path: display_path(&k) }),
            Body::Func { help, func } => Ok(VfsFile::from_executable(
                display_path(&k),
                Box::new(Cursor::new(help.clone().into_bytes())),
                Box::new(FnExecutor(Arc::clone(func))),
            )),
        }
    }
}

#[async_trait]
impl Writable for MemoryProvider {
    async fn write(&self, path: &str, mut reader: ByteReader) -> VfsResult<()> {
        let k = key(path);
        {
            let records = self.records.read();
            if let Some(Record { body: Body::Func { .. }, .. }) = records.get(&k) {
                return Err(VfsError::NotWritable { path: display_path(&k) });
            }
        }

        use tokio::io::AsyncReadExt;
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| VfsError::io(display_path(&k), e))?;

        let mut records = self.records.write();
        match records.get_mut(&k) {
            Some(record) => {
                record.body = Body::File(bytes);
                record.modified = Utc::now();
            }
            None => {
                records.insert(
                    k,
                    Record {
                        body: Body::File(bytes),
                        perm: Permission::RW,
                        modified: Utc::now(),
                        meta: std::collections::HashMap::new(),
                    },
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Mutable for MemoryProvider {
    async fn mkdir(&self, path: &str, perm: Permission) -> VfsResult<()> {
        self.records.write().insert(
            key(path),
            Record {
                body: Body::Dir,
                perm,
                modified: Utc::now(),
                meta: std::collections::HashMap::new(),
            },
        );
        Ok(())
    }

    async fn remove(&self, path: &str) -> VfsResult<()> {
        let k = key(path);
        let mut records = self.records.write();

        let had_exact = records.remove(&k).is_some();
        let child_prefix = format!("{k}/");
        let child_keys: Vec<String> = records
            .keys()
            .filter(|other| other.starts_with(&child_prefix))
            .cloned()
            .collect();
        for ck in &child_keys {
            records.remove(ck);
        }

        if !had_exact && child_keys.is_empty() {
            return Err(VfsError::not_found(display_path(&k)));
        }
        Ok(())
    }

    async fn rename(&self, old: &str, new: &str) -> VfsResult<()> {
        let old_key = key(old);
        let new_key = key(new);
        let mut records = self.records.write();

        let old_record = records
            .remove(&old_key)
            .ok_or_else(|| VfsError::not_found(display_path(&old_key)))?;

        let old_prefix = format!("{old_key}/");
        let children: Vec<(String, Record)> = records
            .iter()
            .filter(|(k, _)| k.starts_with(&old_prefix))
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect();

        records.insert(new_key.clone(), old_record);
        for (child_key, record) in children {
            records.remove(&child_key);
            let suffix = &child_key[old_prefix.len()..];
            records.insert(format!("{new_key}/{suffix}"), record);
        }
        Ok(())
    }
}

#[async_trait]
impl Touchable for MemoryProvider {
    async fn touch(&self, path: &str) -> VfsResult<()> {
        let k = key(path);
        let mut records = self.records.write();
        match records.get_mut(&k) {
            Some(record) => {
                record.modified = Utc::now();
            }
            None => {
                records.insert(
                    k,
                    Record {
                        body: Body::File(Vec::new()),
                        perm: Permission::RW,
                        modified: Utc::now(),
                        meta: std::collections::HashMap::new(),
                    },
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Executable for MemoryProvider {
    async fn exec(
        &self,
        path: &str,
        args: Vec<String>,
        stdin: Option<ByteReader>,
        env: &Environment,
    ) -> VfsResult<ByteReader> {
        let k = key(path);
        let func = {
            let records = self.records.read();
            match records.get(&k) {
                Some(Record { body: Body::Func { func, .. }, .. }) => Arc::clone(func),
                Some(_) => return Err(VfsError::NotExecutable { path: display_path(&k) }),
                None => return Err(VfsError::not_found(display_path(&k))),
            }
        };
        func.call(args, stdin, env).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stat_reports_implicit_directory() {
        let p = MemoryProvider::new();
        p.add_file("/a/b.txt", Permission::RW, b"x".to_vec());
        let entry = p.stat("a").await.unwrap();
        assert!(entry.is_dir);
    }

    #[tokio::test]
    async fn list_dedups_and_marks_implicit_children() {
        let p = MemoryProvider::new();
        p.add_file("/a/b.txt", Permission::RW, b"x".to_vec());
        p.add_file("/a/c/d.txt", Permission::RW, b"y".to_vec());
        let entries = p.list("a", &ListOptions::default()).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b.txt", "c"]);
        assert!(entries.iter().find(|e| e.name == "c").unwrap().is_dir);
    }

    #[tokio::test]
    async fn remove_cascades_to_descendants() {
        let p = MemoryProvider::new();
        p.add_file("/a/b.txt", Permission::RW, b"x".to_vec());
        p.add_file("/a/c/d.txt", Permission::RW, b"y".to_vec());
        p.as_mutable().unwrap().remove("a").await.unwrap();
        assert!(p.stat("a").await.is_err());
    }

    #[tokio::test]
    async fn remove_missing_path_is_not_found() {
        let p = MemoryProvider::new();
        let err = p.as_mutable().unwrap().remove("nope").await.unwrap_err();
        assert!(matches!(err, VfsError::NotFound { .. }));
    }

    #[tokio::test]
    async fn rename_relocates_subtree() {
        let p = MemoryProvider::new();
        p.add_file("/a/b.txt", Permission::RW, b"x".to_vec());
        p.add_file("/a/c/d.txt", Permission::RW, b"y".to_vec());
        p.as_mutable().unwrap().rename("a", "z").await.unwrap();
        assert!(p.stat("a").await.is_err());
        assert!(p.stat("z/b.txt").await.is_ok());
        assert!(p.stat("z/c/d.txt").await.is_ok());
    }

    struct Echo;
    #[async_trait]
    impl MemoryFunc for Echo {
        async fn call(&self, args: Vec<String>, _stdin: Option<ByteReader>, _env: &Environment) -> VfsResult<ByteReader> {
            Ok(Box::new(Cursor::new(args.join(" ").into_bytes())))
        }
    }

    #[tokio::test]
    async fn func_entry_is_executable_and_open_returns_help() {
        let p = MemoryProvider::new();
        p.add_func("/bin/echo", "echo - echoes args\nUsage: echo [args...]", Arc::new(Echo));

        let mut help = p.as_readable().unwrap().open("bin/echo").await.unwrap();
        let help_bytes = help.read_to_end().await.unwrap();
        assert!(String::from_utf8(help_bytes).unwrap().starts_with("echo"));

        use tokio::io::AsyncReadExt;
        let mut out = p
            .as_executable()
            .unwrap()
            .exec("bin/echo", vec!["hi".into(), "there".into()], None, &Environment::new())
            .await
            .unwrap();
        let mut buf = Vec::new();
        out.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hi there");
    }

    #[tokio::test]
    async fn write_to_func_entry_fails_not_writable() {
        let p = MemoryProvider::new();
        p.add_func("/bin/echo", "help", Arc::new(Echo));
        let err = p
            .as_writable()
            .unwrap()
            .write("bin/echo", Box::new(Cursor::new(b"x".to_vec())))
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::NotWritable { .. }));
    }
}
