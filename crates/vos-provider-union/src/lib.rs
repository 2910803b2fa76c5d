//! The union/overlay provider (§4.8): composes an ordered list of layers,
//! each a provider plus a bind mode and optional cache/TTL behavior.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use vos_provider::{
    ByteReader, Entry, ListOptions, Mutable, Permission, Provider, Readable, Touchable, VfsError,
    VfsFile, VfsResult, Writable,
};

/// Where a newly bound layer lands in the ordered list (§4.8 `Bind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    Before,
    After,
    Replace,
}

struct Layer {
    provider: Arc<dyn Provider>,
    cache: bool,
    ttl: Option<Duration>,
}

/// An ordered overlay of providers. Reads check layers front-to-back; the
/// first layer to answer wins. See module docs for per-operation semantics.
pub struct UnionProvider {
    layers: RwLock<Vec<Layer>>,
    purge: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Default for UnionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl UnionProvider {
    #[must_use]
    pub fn new() -> Self {
        UnionProvider {
            layers: RwLock::new(Vec::new()),
            purge: parking_lot::Mutex::new(None),
        }
    }

    /// `CachedUnion(cache, origin, ttl)` is exactly `[Before cache with TTL,
    /// After origin]` (§4.8).
    #[must_use]
    pub fn cached(cache: Arc<dyn Provider>, origin: Arc<dyn Provider>, ttl: Duration) -> Self {
        let union = Self::new();
        union.bind(cache, true, Some(ttl), BindMode::Before);
        union.bind(origin, false, None, BindMode::After);
        union
    }

    /// Add, prepend, or replace the layer list with `provider` (§4.8 `Bind`).
    pub fn bind(&self, provider: Arc<dyn Provider>, cache: bool, ttl: Option<Duration>, mode: BindMode) {
        let layer = Layer { provider, cache, ttl };
        let mut layers = self.layers.write();
        match mode {
            BindMode::Before => layers.insert(0, layer),
            BindMode::After => layers.push(layer),
            BindMode::Replace => *layers = vec![layer],
        }
    }

    fn snapshot(&self) -> Vec<(Arc<dyn Provider>, bool, Option<Duration>)> {
        self.layers
            .read()
            .iter()
            .map(|l| (Arc::clone(&l.provider), l.cache, l.ttl))
            .collect()
    }

    /// Start a background loop that calls `callback` every `interval`, until
    /// [`Self::stop_purge`] is called (§4.8).
    pub fn start_purge<F>(&self, interval: Duration, callback: F)
    where
        F: Fn() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                callback();
            }
        });
        *self.purge.lock() = Some(handle);
    }

    /// Cancel the background purge loop, if running.
    pub fn stop_purge(&self) {
        if let Some(handle) = self.purge.lock().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Provider for UnionProvider {
    async fn stat(&self, path: &str) -> VfsResult<Entry> {
        for (provider, cache, ttl) in self.snapshot() {
            let Ok(mut entry) = provider.stat(path).await else {
                continue;
            };
            if cache {
                if let Some(ttl) = ttl {
                    let age = Utc::now().signed_duration_since(entry.modified);
                    if age > chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::max_value()) {
                        continue;
                    }
                }
            }
            entry.ensure_path(path);
            return Ok(entry);
        }
        Err(VfsError::not_found(path))
    }

    async fn list(&self, path: &str, opts: &ListOptions) -> VfsResult<Vec<Entry>> {
        let mut seen = std::collections::HashSet::new();
        let mut merged = Vec::new();
        let mut any_layer_answered = false;

        for (provider, _cache, _ttl) in self.snapshot() {
            if let Ok(entries) = provider.list(path, opts).await {
                any_layer_answered = true;
                for entry in entries {
                    if seen.insert(entry.name.clone()) {
                        merged.push(entry);
                    }
                }
            }
        }

        if !any_layer_answered && !vos_path::is_root(path) {
            return Err(VfsError::not_found(path));
        }

        merged.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(max) = opts.max_results {
            merged.truncate(max);
        }
        Ok(merged)
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
impl Readable for UnionProvider {
    async fn open(&self, path: &str) -> VfsResult<VfsFile> {
        let layers = self.snapshot();

        // First pass: cache layers, fresh entries only.
        for (provider, cache, ttl) in &layers {
            if !cache {
                continue;
            }
            let Some(readable) = provider.as_readable() else {
                continue;
            };
            if let Ok(entry) = provider.stat(path).await {
                if let Some(ttl) = ttl {
                    let age = Utc::now().signed_duration_since(entry.modified);
                    if age > chrono::Duration::from_std(*ttl).unwrap_or(chrono::Duration::max_value()) {
                        continue;
                    }
                }
                if let Ok(file) = readable.open(path).await {
                    return Ok(file);
                }
            }
        }

        // Second pass: non-cache readable layers; read through and backfill
        // the first writable cache layer.
        for (provider, cache, _ttl) in &layers {
            if *cache {
                continue;
            }
            let Some(readable) = provider.as_readable() else {
                continue;
            };
            let Ok(mut file) = readable.open(path).await else {
                continue;
            };
            let bytes = file.read_to_end().await?;

            for (backfill_provider, backfill_cache, _) in &layers {
                if !backfill_cache {
                    continue;
                }
                if let Some(writable) = backfill_provider.as_writable() {
                    if let Err(e) = writable.write(path, Box::new(Cursor::new(bytes.clone()))).await {
                        tracing::warn!(path, error = %e, "union cache backfill failed");
                    }
                    break;
                }
            }

            return Ok(VfsFile::from_reader(path, Box::new(Cursor::new(bytes))));
        }

        Err(VfsError::not_found(path))
    }
}

#[async_trait]
impl Writable for UnionProvider {
    async fn write(&self, path: &str, reader: ByteReader) -> VfsResult<()> {
        for (provider, _, _) in self.snapshot() {
            if let Some(writable) = provider.as_writable() {
                return writable.write(path, reader).await;
            }
        }
        Err(VfsError::not_supported(path, "write"))
    }
}

#[async_trait]
impl Mutable for UnionProvider {
    async fn mkdir(&self, path: &str, perm: Permission) -> VfsResult<()> {
        for (provider, _, _) in self.snapshot() {
            if let Some(mutable) = provider.as_mutable() {
                return mutable.mkdir(path, perm).await;
            }
        }
        Err(VfsError::not_supported(path, "mutate"))
    }

    async fn remove(&self, path: &str) -> VfsResult<()> {
        for (provider, _, _) in self.snapshot() {
            let Some(mutable) = provider.as_mutable() else {
                continue;
            };
            if provider.stat(path).await.is_ok() {
                return mutable.remove(path).await;
            }
        }
        Err(VfsError::not_found(path))
    }

    async fn rename(&self, old: &str, new: &str) -> VfsResult<()> {
        for (provider, _, _) in self.snapshot() {
            let Some(mutable) = provider.as_mutable() else {
                continue;
            };
            if provider.stat(old).await.is_ok() {
                return mutable.rename(old, new).await;
            }
        }
        Err(VfsError::not_found(old))
    }
}

#[async_trait]
impl Touchable for UnionProvider {
    async fn touch(&self, path: &str) -> VfsResult<()> {
        let layers = self.snapshot();

        for (provider, _, _) in &layers {
            let Some(touchable) = provider.as_touchable() else {
                continue;
            };
            if provider.stat(path).await.is_ok() {
                return touchable.touch(path).await;
            }
        }

        for (provider, _, _) in &layers {
            let (Some(readable), Some(writable)) = (provider.as_readable(), provider.as_writable()) else {
                continue;
            };
            let bytes = match readable.open(path).await {
                Ok(mut f) => f.read_to_end().await.unwrap_or_default(),
                Err(_) => Vec::new(),
            };
            return writable.write(path, Box::new(Cursor::new(bytes))).await;
        }

        Err(VfsError::not_supported(path, "touch"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vos_provider_memory::MemoryProvider;

    fn mem() -> Arc<MemoryProvider> {
        Arc::new(MemoryProvider::new())
    }

    #[tokio::test]
    async fn stat_returns_first_layer_that_has_the_path() {
        let cache = mem();
        let origin = mem();
        origin.add_file("/a.txt", Permission::RW, b"origin".to_vec());

        let union = UnionProvider::new();
        union.bind(origin, false, None, BindMode::After);
        union.bind(cache, true, None, BindMode::Before);

        let entry = union.stat("/a.txt").await.unwrap();
        assert_eq!(entry.size, 6);
    }

    #[tokio::test]
    async fn open_reads_through_origin_and_backfills_cache() {
        let cache = mem();
        let origin = mem();
        origin.add_file("/a.txt", Permission::RW, b"from-origin".to_vec());

        let union = UnionProvider::cached(cache.clone(), origin, Duration::from_secs(60));

        let mut file = union.as_readable().unwrap().open("/a.txt").await.unwrap();
        assert_eq!(file.read_to_end().await.unwrap(), b"from-origin");

        // Backfilled into the cache layer directly.
        let mut cached_file = cache.as_readable().unwrap().open("/a.txt").await.unwrap();
        assert_eq!(cached_file.read_to_end().await.unwrap(), b"from-origin");
    }

    #[tokio::test]
    async fn list_merges_layers_first_writer_wins() {
        let first = mem();
        let second = mem();
        first.add_file("/a.txt", Permission::RW, b"1".to_vec());
        second.add_file("/a.txt", Permission::RW, b"22".to_vec());
        second.add_file("/b.txt", Permission::RW, b"3".to_vec());

        let union = UnionProvider::new();
        union.bind(first, false, None, BindMode::After);
        union.bind(second, false, None, BindMode::After);

        let entries = union.list("/", &ListOptions::default()).await.unwrap();
        let a = entries.iter().find(|e| e.name == "a.txt").unwrap();
        assert_eq!(a.size, 1);
        assert!(entries.iter().any(|e| e.name == "b.txt"));
    }

    #[tokio::test]
    async fn bind_replace_substitutes_whole_list() {
        let a = mem();
        let b = mem();
        b.add_file("/x.txt", Permission::RW, b"x".to_vec());

        let union = UnionProvider::new();
        union.bind(a, false, None, BindMode::After);
        union.bind(b, false, None, BindMode::Replace);

        assert_eq!(union.layers.read().len(), 1);
        assert!(union.stat("/x.txt").await.is_ok());
    }
}
