//! The HTTP-polling provider (§4.7): a namespace of `<source>/<slug>`
//! files kept in sync with a remote URL by conditional-GET polling.
//!
//! Unlike the in-memory provider this one has a background life of its own:
//! each source runs its own poll loop as a spawned task, independent of any
//! call into the provider. Writes from that loop therefore can't flow
//! through the virtual OS façade's own watcher dispatch, since the
//! provider never holds a handle back to its façade. So the provider keeps
//! a second, identically-shaped watcher slot and notifies it directly,
//! mirroring the façade's mechanism rather than composing with it.
//! Recorded in DESIGN.md.

mod loader;
mod parser;
mod slug;
mod source;

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock as SyncRwLock;
use reqwest::Client;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use vos_provider::{
    ByteReader, Entry, ListOptions, Mutable, Permission, Provider, Readable, VfsError, VfsFile,
    VfsResult, Writable,
};

pub use loader::{load_openapi, load_schema};
pub use parser::Parser;
pub use source::SourceConfig;

/// A namespace event, mirroring [`vos_vfs::Event`] without depending on
/// `vos-vfs` for it (this crate only needs to emit, never to route).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpEvent {
    Create,
    Write,
}

pub trait HttpWatcher: Send + Sync {
    fn notify(&self, event: HttpEvent, path: &str);
}

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider-internal state for one source: its behavior plus its running
/// poll task, if started.
struct Registered {
    state: Arc<Mutex<source::SourceState>>,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

/// The HTTP-polling provider. Namespace: root lists source names as
/// directories; each source directory lists its parsed files.
pub struct HttpProvider {
    client: Client,
    sources: Mutex<HashMap<String, Registered>>,
    watcher: SyncRwLock<Option<Arc<dyn HttpWatcher>>>,
}

impl Default for HttpProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProvider {
    #[must_use]
    pub fn new() -> Self {
        HttpProvider {
            client: Client::builder().timeout(DEFAULT_TIMEOUT).build().unwrap_or_default(),
            sources: Mutex::new(HashMap::new()),
            watcher: SyncRwLock::new(None),
        }
    }

    pub fn set_watcher(&self, watcher: Arc<dyn HttpWatcher>) {
        *self.watcher.write() = Some(watcher);
    }

    fn notify(&self, event: HttpEvent, path: &str) {
        if let Some(w) = self.watcher.read().as_ref() {
            w.notify(event, path);
        }
    }

    /// Register a source without starting its poll loop (§4.7 `Add`).
    pub async fn add(&self, config: SourceConfig, interval: Option<Duration>) {
        let name = config.name.clone();
        let state = Arc::new(Mutex::new(source::SourceState::new(config)));
        self.sources.lock().await.insert(
            name,
            Registered { state, interval: interval.unwrap_or(DEFAULT_POLL_INTERVAL), task: None },
        );
    }

    /// Fetch every source lacking a running poll loop once, then spawn its
    /// loop (§4.7, §5: "runs each source's loop in its own … task").
    /// Idempotent: a source already polling is left alone, so calling this
    /// again after [`Self::write`] registered a new source by URL picks up
    /// just that one.
    pub async fn start(self: &Arc<Self>) {
        let names: Vec<String> = {
            let sources = self.sources.lock().await;
            sources.iter().filter(|(_, reg)| reg.task.is_none()).map(|(name, _)| name.clone()).collect()
        };
        for name in names {
            self.fetch_one(&name).await;
            self.spawn_loop(name).await;
        }
    }

    /// Cancel every source's poll loop and wait for it to stop (§4.7
    /// `Stop`, §5: "cancels the shared polling context and waits").
    pub async fn stop(&self) {
        let mut sources = self.sources.lock().await;
        for reg in sources.values_mut() {
            if let Some(task) = reg.task.take() {
                task.abort();
                let _ = task.await;
            }
        }
    }

    async fn spawn_loop(self: &Arc<Self>, name: String) {
        let interval = {
            let sources = self.sources.lock().await;
            match sources.get(&name) {
                Some(reg) => reg.interval,
                None => return,
            }
        };
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; start() already did the initial fetch
            loop {
                ticker.tick().await;
                this.fetch_one(&name).await;
            }
        });
        if let Some(reg) = self.sources.lock().await.get_mut(&name) {
            reg.task = Some(task);
        }
    }

    async fn fetch_one(&self, name: &str) {
        let state = {
            let sources = self.sources.lock().await;
            match sources.get(name) {
                Some(reg) => Arc::clone(&reg.state),
                None => return,
            }
        };
        let mut state = state.lock().await;
        match state.fetch(&self.client).await {
            Ok(delta) => {
                for slug in &delta.created {
                    self.notify(HttpEvent::Create, &format!("/{name}/{slug}"));
                }
                for slug in &delta.updated {
                    self.notify(HttpEvent::Write, &format!("/{name}/{slug}"));
                }
            }
            Err(e) => tracing::warn!(source = name, error = %e, "http source fetch failed"),
        }
    }

    /// Register (or re-register, cancelling any prior loop) `name` with
    /// the `Auto` parser and fetch it once. Background polling for it
    /// begins the next time [`Self::start`] is called, which only spawns
    /// loops for sources not already polling.
    async fn subscribe(&self, name: &str, url: &str) {
        let mut sources = self.sources.lock().await;
        if let Some(mut old) = sources.remove(name) {
            if let Some(task) = old.task.take() {
                task.abort();
            }
        }
        let state = Arc::new(Mutex::new(source::SourceState::new(SourceConfig {
            name: name.to_string(),
            url: url.to_string(),
            parser: Parser::Auto,
            headers: HashMap::new(),
        })));
        sources.insert(name.to_string(), Registered { state, interval: DEFAULT_POLL_INTERVAL, task: None });
        drop(sources);
        self.fetch_one(name).await;
    }
}

fn split_source_and_slug(path: &str) -> (String, Option<String>) {
    let trimmed = path.trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((source, rest)) if !rest.is_empty() => (source.to_string(), Some(rest.to_string())),
        _ => (trimmed.to_string(), None),
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn stat(&self, path: &str) -> VfsResult<Entry> {
        let (source, slug) = split_source_and_slug(path);
        if source.is_empty() {
            return Ok(Entry::dir("/", Permission::RX));
        }
        let sources = self.sources.lock().await;
        let reg = sources.get(&source).ok_or_else(|| VfsError::not_found(path))?;
        let state = reg.state.lock().await;
        match slug {
            None => Ok(Entry::dir(format!("/{source}"), Permission::RX)),
            Some(slug) => {
                let file = state.files.get(&slug).ok_or_else(|| VfsError::not_found(path))?;
                Ok(Entry::file(format!("/{source}/{slug}"), Permission::RW, file.content.len() as u64).with_modified(file.modified))
            }
        }
    }

    async fn list(&self, path: &str, opts: &ListOptions) -> VfsResult<Vec<Entry>> {
        let (source, slug) = split_source_and_slug(path);
        if slug.is_some() {
            return Err(VfsError::NotDir { path: path.to_string() });
        }
        let sources = self.sources.lock().await;

        let mut out = Vec::new();
        if source.is_empty() {
            for name in sources.keys() {
                out.push(Entry::dir(format!("/{name}"), Permission::RX));
            }
        } else {
            let reg = sources.get(&source).ok_or_else(|| VfsError::not_found(path))?;
            let state = reg.state.lock().await;
            for file in state.files.values() {
                out.push(
                    Entry::file(format!("/{source}/{}", file.slug), Permission::RW, file.content.len() as u64)
                        .with_modified(file.modified),
                );
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
}

#[async_trait]
impl Readable for HttpProvider {
    async fn open(&self, path: &str) -> VfsResult<VfsFile> {
        let (source, slug) = split_source_and_slug(path);
        let Some(slug) = slug else {
            return Err(VfsError::IsDir { path: path.to_string() });
        };
        let sources = self.sources.lock().await;
        let reg = sources.get(&source).ok_or_else(|| VfsError::not_found(path))?;
        let state = reg.state.lock().await;
        let file = state.files.get(&slug).ok_or_else(|| VfsError::not_found(path))?;
        Ok(VfsFile::from_reader(path, Box::new(Cursor::new(file.content.clone()))))
    }
}

#[async_trait]
impl Writable for HttpProvider {
    /// Writing a URL to a bare name (no `/`) subscribes (or resets) that
    /// source with the `Auto` parser (§4.7: "Write semantics at the shell
    /// interface"). Writing beneath a source is not writable.
    async fn write(&self, path: &str, mut reader: ByteReader) -> VfsResult<()> {
        use tokio::io::AsyncReadExt;
        let (source, slug) = split_source_and_slug(path);
        if slug.is_some() {
            return Err(VfsError::NotWritable { path: path.to_string() });
        }
        let mut url = Vec::new();
        reader.read_to_end(&mut url).await.map_err(|e| VfsError::io(path, e))?;
        let url = String::from_utf8_lossy(&url).trim().to_string();
        self.subscribe(&source, &url).await;
        Ok(())
    }
}

#[async_trait]
impl Mutable for HttpProvider {
    async fn mkdir(&self, path: &str, _perm: Permission) -> VfsResult<()> {
        Err(VfsError::not_supported(path, "mkdir"))
    }

    /// `Remove` only accepts a source name, no sub-paths (§4.7).
    async fn remove(&self, path: &str) -> VfsResult<()> {
        let (source, slug) = split_source_and_slug(path);
        if slug.is_some() {
            return Err(VfsError::not_supported(path, "remove"));
        }
        let mut sources = self.sources.lock().await;
        match sources.remove(&source) {
            Some(mut reg) => {
                if let Some(task) = reg.task.take() {
                    task.abort();
                }
                Ok(())
            }
            None => Err(VfsError::not_found(path)),
        }
    }

    async fn rename(&self, old: &str, _new: &str) -> VfsResult<()> {
        Err(VfsError::not_supported(old, "rename"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config(name: &str) -> SourceConfig {
        SourceConfig { name: name.to_string(), url: format!("https://example.test/{name}"), parser: Parser::Auto, headers: HashMap::new() }
    }

    #[tokio::test]
    async fn root_lists_registered_source_names() {
        let provider = HttpProvider::new();
        provider.add(sample_config("blog"), None).await;
        provider.add(sample_config("changelog"), None).await;

        let entries = provider.list("/", &ListOptions::default()).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["blog", "changelog"]);
        assert!(entries.iter().all(|e| e.is_dir));
    }

    #[tokio::test]
    async fn stat_on_empty_source_directory_succeeds() {
        let provider = HttpProvider::new();
        provider.add(sample_config("blog"), None).await;
        let entry = provider.stat("/blog").await.unwrap();
        assert!(entry.is_dir);

        let listing = provider.list("/blog", &ListOptions::default()).await.unwrap();
        assert!(listing.is_empty());
    }

    #[tokio::test]
    async fn stat_unknown_source_fails() {
        let provider = HttpProvider::new();
        assert!(provider.stat("/missing").await.is_err());
    }

    #[tokio::test]
    async fn write_beneath_a_source_is_not_writable() {
        let provider = HttpProvider::new();
        provider.add(sample_config("blog"), None).await;
        let reader: ByteReader = Box::new(std::io::Cursor::new(b"https://x".to_vec()));
        let err = Writable::write(&provider, "/blog/post.txt", reader).await.unwrap_err();
        assert!(matches!(err, VfsError::NotWritable { .. }));
    }

    #[tokio::test]
    async fn remove_only_accepts_a_bare_source_name() {
        let provider = HttpProvider::new();
        provider.add(sample_config("blog"), None).await;

        assert!(Mutable::remove(&provider, "/blog/post.txt").await.is_err());
        assert!(Mutable::remove(&provider, "/blog").await.is_ok());
        assert!(provider.stat("/blog").await.is_err());
    }

    #[tokio::test]
    async fn remove_unknown_source_is_not_found() {
        let provider = HttpProvider::new();
        assert!(matches!(Mutable::remove(&provider, "/ghost").await, Err(VfsError::NotFound { .. })));
    }
}
