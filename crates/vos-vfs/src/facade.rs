//! The virtual OS façade (§4.3): single entry point for every filesystem
//! operation. Resolves paths, checks capabilities, injects environment, and
//! translates provider-local errors into canonical ones (by not touching
//! them at all, see §7: "The façade does not swallow errors; it adds no
//! context by default").

use std::sync::{Arc, RwLock as StdRwLock};

use vos_mount::MountTable;
use vos_provider::{
    ByteReader, Entry, Environment, ListOptions, Permission, Provider, SearchOptions,
    SearchResult, VfsError, VfsFile, VfsResult,
};

use crate::events::{Event, Watcher};

/// Owns the mount table and routes every filesystem operation to the
/// resolved provider.
pub struct VirtualOs {
    mounts: MountTable,
    watcher: StdRwLock<Option<Arc<dyn Watcher>>>,
}

impl VirtualOs {
    /// Create a virtual OS rooted at `root`.
    #[must_use]
    pub fn new(root: Arc<dyn Provider>) -> Self {
        VirtualOs {
            mounts: MountTable::new(root),
            watcher: StdRwLock::new(None),
        }
    }

    /// Register (or replace) the event watcher.
    pub fn set_watcher(&self, watcher: Arc<dyn Watcher>) {
        *self.watcher.write().unwrap_or_else(|e| e.into_inner()) = Some(watcher);
    }

    #[must_use]
    pub fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    pub fn mount(&self, path: &str, provider: Arc<dyn Provider>) -> VfsResult<()> {
        self.mounts.mount(path, provider)
    }

    pub fn unmount(&self, path: &str) -> VfsResult<()> {
        self.mounts.unmount(path)
    }

    /// Dispatch an event to the registered watcher, if any. Delivery is
    /// best-effort; a missing watcher is not an error (§4.3).
    fn notify(&self, event: Event, path: &str) {
        if let Some(w) = self.watcher.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            w.notify(event, path);
        }
    }

    pub async fn stat(&self, path: &str) -> VfsResult<Entry> {
        let resolved = self.mounts.resolve(path)?;
        let mut entry = resolved.provider.stat(&resolved.inner_path).await?;
        entry.ensure_path(path);
        Ok(entry)
    }

    pub async fn list(&self, path: &str, opts: &ListOptions) -> VfsResult<Vec<Entry>> {
        let resolved = self.mounts.resolve(path)?;
        resolved.provider.list(&resolved.inner_path, opts).await
    }

    pub async fn open(&self, path: &str) -> VfsResult<VfsFile> {
        let resolved = self.mounts.resolve(path)?;
        let readable = resolved
            .provider
            .as_readable()
            .ok_or_else(|| VfsError::not_supported(path, "read"))?;
        readable.open(&resolved.inner_path).await
    }

    pub async fn write(&self, path: &str, reader: ByteReader) -> VfsResult<()> {
        let resolved = self.mounts.resolve(path)?;
        let writable = resolved
            .provider
            .as_writable()
            .ok_or_else(|| VfsError::not_supported(path, "write"))?;
        writable.write(&resolved.inner_path, reader).await?;
        self.notify(Event::Write, path);
        Ok(())
    }

    pub async fn mkdir(&self, path: &str, perm: Permission) -> VfsResult<()> {
        let resolved = self.mounts.resolve(path)?;
        let mutable = resolved
            .provider
            .as_mutable()
            .ok_or_else(|| VfsError::not_supported(path, "mutate"))?;
        mutable.mkdir(&resolved.inner_path, perm).await?;
        self.notify(Event::Create, path);
        Ok(())
    }

    pub async fn remove(&self, path: &str) -> VfsResult<()> {
        let resolved = self.mounts.resolve(path)?;
        let mutable = resolved
            .provider
            .as_mutable()
            .ok_or_else(|| VfsError::not_supported(path, "mutate"))?;
        mutable.remove(&resolved.inner_path).await?;
        self.notify(Event::Remove, path);
        Ok(())
    }

    /// Rename within a single provider. Cross-provider rename is not
    /// supported (§4.3).
    pub async fn rename(&self, old: &str, new: &str) -> VfsResult<()> {
        let old_resolved = self.mounts.resolve(old)?;
        let new_resolved = self.mounts.resolve(new)?;
        if old_resolved.mount_prefix != new_resolved.mount_prefix {
            return Err(VfsError::not_supported(old, "cross-provider rename"));
        }
        let mutable = old_resolved
            .provider
            .as_mutable()
            .ok_or_else(|| VfsError::not_supported(old, "mutate"))?;
        mutable
            .rename(&old_resolved.inner_path, &new_resolved.inner_path)
            .await?;
        self.notify(Event::Write, new);
        Ok(())
    }

    /// Update modification time, preferring `Touchable`, falling back to
    /// `Open+Write` on a `Writable` provider, per §4.3.
    pub async fn touch(&self, path: &str) -> VfsResult<()> {
        let resolved = self.mounts.resolve(path)?;

        if let Some(touchable) = resolved.provider.as_touchable() {
            touchable.touch(&resolved.inner_path).await?;
            self.notify(Event::Create, path);
            return Ok(());
        }

        let writable = resolved
            .provider
            .as_writable()
            .ok_or_else(|| VfsError::not_supported(path, "touch"))?;

        let existing: Vec<u8> = if let Some(readable) = resolved.provider.as_readable() {
            match readable.open(&resolved.inner_path).await {
                Ok(mut file) => file.read_to_end().await.unwrap_or_default(),
                Err(_) => Vec::new(),
            }
        } else {
            Vec::new()
        };

        writable
            .write(&resolved.inner_path, Box::new(std::io::Cursor::new(existing)))
            .await?;
        self.notify(Event::Create, path);
        Ok(())
    }

    pub async fn exec(
        &self,
        path: &str,
        args: Vec<String>,
        stdin: Option<ByteReader>,
        env: &Environment,
    ) -> VfsResult<ByteReader> {
        let resolved = self.mounts.resolve(path)?;
        let executable = resolved
            .provider
            .as_executable()
            .ok_or_else(|| VfsError::not_supported(path, "exec"))?;
        executable.exec(&resolved.inner_path, args, stdin, env).await
    }

    /// Fan out to every `Searchable` provider whose mount intersects
    /// `opts.scope` (or all when scope is empty); merge, sort by descending
    /// score, cap at `opts.max_results` (default 20).
    pub async fn search(&self, query: &str, opts: &SearchOptions) -> VfsResult<Vec<SearchResult>> {
        let mut merged: Vec<SearchResult> = Vec::new();

        for (prefix, provider) in self.mounts.providers() {
            if !opts.scope.is_empty() && !opts.scope.iter().any(|s| scope_matches(s, &prefix)) {
                continue;
            }
            let Some(searchable) = provider.as_searchable() else {
                continue;
            };
            match searchable.search(query, opts).await {
                Ok(mut results) => merged.append(&mut results),
                Err(e) => {
                    tracing::warn!(prefix = %prefix, error = %e, "search provider failed");
                }
            }
        }

        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        merged.truncate(opts.max_results_or_default());
        Ok(merged)
    }

    pub fn env_get<'a>(&self, env: &'a Environment, key: &str) -> Option<&'a str> {
        env.get(key)
    }
}

fn scope_matches(scope: &str, prefix: &str) -> bool {
    let scope = vos_path::normalize(scope);
    scope == prefix || prefix.starts_with(&format!("{scope}/")) || scope.starts_with(&format!("{prefix}/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vos_provider_memory::MemoryProvider;

    fn os_with_memory() -> VirtualOs {
        VirtualOs::new(Arc::new(MemoryProvider::new()))
    }

    #[tokio::test]
    async fn stat_on_missing_path_is_not_found() {
        let os = os_with_memory();
        let err = os.stat("/nope").await.unwrap_err();
        assert!(matches!(err, VfsError::NotFound { .. }));
    }

    #[tokio::test]
    async fn write_then_open_roundtrips() {
        let os = os_with_memory();
        os.write("/a.txt", Box::new(std::io::Cursor::new(b"hi".to_vec())))
            .await
            .unwrap();
        let mut f = os.open("/a.txt").await.unwrap();
        assert_eq!(f.read_to_end().await.unwrap(), b"hi");
    }

    #[tokio::test]
    async fn rename_across_mounts_is_not_supported() {
        let os = os_with_memory();
        os.mount("/other", Arc::new(MemoryProvider::new())).unwrap();
        os.write("/a.txt", Box::new(std::io::Cursor::new(b"hi".to_vec())))
            .await
            .unwrap();
        let err = os.rename("/a.txt", "/other/a.txt").await.unwrap_err();
        assert!(matches!(err, VfsError::NotSupported { .. }));
    }

    #[tokio::test]
    async fn touch_creates_empty_file_via_write_fallback() {
        let os = os_with_memory();
        os.touch("/new.txt").await.unwrap();
        let entry = os.stat("/new.txt").await.unwrap();
        assert!(!entry.is_dir);
        assert_eq!(entry.size, 0);
    }
}
