//! The mount table: maps `{prefix -> provider}` and resolves absolute paths
//! to `(provider, inner_path)` for routing (§4.2).

use std::sync::Arc;

use parking_lot::RwLock;
use vos_provider::{Provider, VfsError, VfsResult};

/// One `(prefix, provider)` record. `prefix` is always a normalized,
/// trailing-slash-free absolute path (root stored as `/`).
struct Record {
    prefix: String,
    provider: Arc<dyn Provider>,
}

/// A snapshot of one mount, safe to hand out without holding the table's
/// lock (§4.2 `AllInfo`).
#[derive(Clone)]
pub struct MountInfo {
    pub prefix: String,
    pub description: Option<String>,
}

/// The result of resolving an absolute path: the provider that owns it and
/// the path relative to that provider's own root.
pub struct Resolved {
    pub provider: Arc<dyn Provider>,
    pub inner_path: String,
    pub mount_prefix: String,
}

/// Owns the mapping `{prefix -> provider}`.
///
/// Reads (`resolve`, `all_info`, `all`) take a shared lock and proceed in
/// parallel; `mount`/`unmount` take an exclusive lock. `resolve` never calls
/// into a provider while holding the lock: it only clones an `Arc` and
/// releases (§5).
pub struct MountTable {
    records: RwLock<Vec<Record>>,
}

impl MountTable {
    /// Create a table with `/` already mounted on `root`, per the §3
    /// invariant that the root mount is created once and never removed.
    #[must_use]
    pub fn new(root: Arc<dyn Provider>) -> Self {
        MountTable {
            records: RwLock::new(vec![Record {
                prefix: "/".to_string(),
                provider: root,
            }]),
        }
    }

    /// Mount `provider` at `path`. Fails with [`VfsError::AlreadyMounted`]
    /// if a record with that exact normalized prefix already exists.
    pub fn mount(&self, path: &str, provider: Arc<dyn Provider>) -> VfsResult<()> {
        let prefix = vos_path::normalize(path);
        let mut records = self.records.write();
        if records.iter().any(|r| r.prefix == prefix) {
            return Err(VfsError::AlreadyMounted { path: prefix });
        }
        tracing::info!(prefix = %prefix, "mounted provider");
        records.push(Record { prefix, provider });
        Ok(())
    }

    /// Unmount the provider at `path`. Refuses to unmount `/`.
    pub fn unmount(&self, path: &str) -> VfsResult<()> {
        let prefix = vos_path::normalize(path);
        if prefix == "/" {
            return Err(VfsError::not_supported("/", "unmount root"));
        }
        let mut records = self.records.write();
        let idx = records
            .iter()
            .position(|r| r.prefix == prefix)
            .ok_or_else(|| VfsError::not_found(prefix.clone()))?;
        records.remove(idx);
        tracing::info!(prefix = %prefix, "unmounted provider");
        Ok(())
    }

    /// Resolve `path` to the provider whose prefix is the longest that is
    /// equal to or a proper ancestor of `path`.
    ///
    /// A path that lies exactly on a prefix resolves to that prefix's own
    /// provider, not an ancestor's (§4.2).
    pub fn resolve(&self, path: &str) -> VfsResult<Resolved> {
        let path = vos_path::normalize(path);
        let records = self.records.read();

        let best = records
            .iter()
            .filter(|r| is_prefix_of(&r.prefix, &path))
            .max_by_key(|r| r.prefix.len())
            .ok_or_else(|| VfsError::not_found(path.clone()))?;

        let inner_path = vos_path::strip_prefix(&best.prefix, &path).unwrap_or_default();

        Ok(Resolved {
            provider: Arc::clone(&best.provider),
            inner_path,
            mount_prefix: best.prefix.clone(),
        })
    }

    /// Snapshot of every mount, sorted lexicographically by prefix.
    #[must_use]
    pub fn all_info(&self) -> Vec<MountInfo> {
        let records = self.records.read();
        let mut infos: Vec<MountInfo> = records
            .iter()
            .map(|r| MountInfo {
                prefix: r.prefix.clone(),
                description: r.provider.as_mount_info().map(|m| m.describe()),
            })
            .collect();
        infos.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        infos
    }

    /// Convenience: prefixes only, sorted.
    #[must_use]
    pub fn all(&self) -> Vec<String> {
        self.all_info().into_iter().map(|i| i.prefix).collect()
    }

    /// Snapshot of every `(prefix, provider)` pair, for fan-out operations
    /// like `Search` that need to inspect every mount's capabilities.
    #[must_use]
    pub fn providers(&self) -> Vec<(String, Arc<dyn Provider>)> {
        self.records
            .read()
            .iter()
            .map(|r| (r.prefix.clone(), Arc::clone(&r.provider)))
            .collect()
    }
}

/// Whether `prefix` is `path` itself or a proper ancestor directory of it.
fn is_prefix_of(prefix: &str, path: &str) -> bool {
    if prefix == path {
        return true;
    }
    if prefix == "/" {
        return true;
    }
    path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vos_provider::{Entry, ListOptions, Permission};

    struct Stub(&'static str);

    #[async_trait]
    impl Provider for Stub {
        async fn stat(&self, path: &str) -> VfsResult<Entry> {
            Ok(Entry::dir(format!("/{path}"), Permission::RX))
        }
        async fn list(&self, _path: &str, _opts: &ListOptions) -> VfsResult<Vec<Entry>> {
            Ok(vec![])
        }
    }

    fn stub(name: &'static str) -> Arc<dyn Provider> {
        Arc::new(Stub(name))
    }

    #[test]
    fn root_mount_exists_and_cannot_be_removed() {
        let table = MountTable::new(stub("root"));
        assert!(table.unmount("/").is_err());
        assert_eq!(table.all(), vec!["/".to_string()]);
    }

    #[test]
    fn mount_rejects_duplicate_prefix() {
        let table = MountTable::new(stub("root"));
        table.mount("/a", stub("a")).unwrap();
        let err = table.mount("/a", stub("a2")).unwrap_err();
        assert!(matches!(err, VfsError::AlreadyMounted { .. }));
    }

    #[test]
    fn resolve_routes_by_longest_prefix() {
        let table = MountTable::new(stub("root"));
        table.mount("/a", stub("a")).unwrap();
        table.mount("/a/b", stub("ab")).unwrap();

        assert_eq!(table.resolve("/a/b/c").unwrap().mount_prefix, "/a/b");
        assert_eq!(table.resolve("/a/b/c").unwrap().inner_path, "c");
        assert_eq!(table.resolve("/a/x").unwrap().mount_prefix, "/a");
        assert_eq!(table.resolve("/a/x").unwrap().inner_path, "x");
        assert_eq!(table.resolve("/other").unwrap().mount_prefix, "/");
        assert_eq!(table.resolve("/other").unwrap().inner_path, "other");
    }

    #[test]
    fn resolve_on_exact_prefix_routes_to_that_mount() {
        let table = MountTable::new(stub("root"));
        table.mount("/a", stub("a")).unwrap();
        let resolved = table.resolve("/a").unwrap();
        assert_eq!(resolved.mount_prefix, "/a");
        assert_eq!(resolved.inner_path, "");
    }

    #[test]
    fn unmount_then_resolve_falls_back_to_ancestor() {
        let table = MountTable::new(stub("root"));
        table.mount("/a", stub("a")).unwrap();
        table.unmount("/a").unwrap();
        assert_eq!(table.resolve("/a/b").unwrap().mount_prefix, "/");
    }

    #[test]
    fn all_info_sorted_lexicographically() {
        let table = MountTable::new(stub("root"));
        table.mount("/z", stub("z")).unwrap();
        table.mount("/a", stub("a")).unwrap();
        let prefixes: Vec<String> = table.all_info().into_iter().map(|i| i.prefix).collect();
        assert_eq!(prefixes, vec!["/".to_string(), "/a".to_string(), "/z".to_string()]);
    }
}
