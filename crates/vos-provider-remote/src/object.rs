//! The remote object-service provider (§6: "a small set of methods …
//! returning the provider's own domain types"): a namespace backed by a
//! remote key/value object store reached through an [`ObjectClient`].
//!
//! Transport is the implementer's choice (§6); [`HttpObjectClient`] is the
//! bundled `reqwest`-based one, grounded on `vos-provider-http`'s `Client`
//! usage in the same workspace.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use vos_provider::{
    ByteReader, Entry, ListOptions, Mutable, Permission, Provider, Readable, SearchOptions,
    SearchResult, Searchable, VfsError, VfsFile, VfsResult, Writable,
};

/// One object's metadata, as reported by [`ObjectClient::list`] or
/// [`ObjectClient::stat`].
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Key relative to the provider's own root, no leading `/`.
    pub key: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub etag: Option<String>,
}

/// The contract a remote object service must satisfy for
/// [`RemoteObjectProvider`] to expose it as a namespace (§6).
///
/// Every method is keyed on the provider-relative inner path, with no
/// leading `/`; the provider translates the virtual namespace's paths
/// before calling in and back again on the way out.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// List every object whose key starts with `prefix` (empty for the
    /// root), one level deep: directories are synthesized from common
    /// key prefixes the same way `List` is for other providers.
    async fn list(&self, prefix: &str) -> VfsResult<Vec<ObjectMeta>>;

    async fn stat(&self, key: &str) -> VfsResult<ObjectMeta>;

    async fn get(&self, key: &str) -> VfsResult<Vec<u8>>;

    async fn put(&self, key: &str, body: Vec<u8>) -> VfsResult<()>;

    async fn delete(&self, key: &str) -> VfsResult<()>;

    /// Fan out to the remote service's own search endpoint, when it has
    /// one. The default falls back to a case-insensitive substring match
    /// over a full listing, mirroring the host-directory provider's
    /// `Search` (§4.5) for services that expose none.
    async fn search(&self, query: &str, max_results: usize) -> VfsResult<Vec<ObjectMeta>> {
        let query_lower = query.to_lowercase();
        let mut out = Vec::new();
        for meta in self.list("").await? {
            if out.len() >= max_results {
                break;
            }
            let name = meta.key.rsplit('/').next().unwrap_or(&meta.key);
            if name.to_lowercase().contains(&query_lower) {
                out.push(meta);
            }
        }
        Ok(out)
    }
}

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

fn entry_from_meta(meta: &ObjectMeta, perm: Permission) -> Entry {
    let path = display_path(&meta.key);
    let entry = if meta.is_dir {
        Entry::dir(path, perm)
    } else {
        Entry::file(path, perm, meta.size)
    }
    .with_modified(meta.modified);
    match &meta.etag {
        Some(etag) => entry.with_meta("etag", etag.clone()),
        None => entry,
    }
}

/// A provider whose namespace is a remote object service, reached through
/// `C: ObjectClient`. Permissions are a single provider-wide mask, as in
/// the host-directory provider (§4.5): remote object services rarely
/// expose per-key ACLs any richer than that.
pub struct RemoteObjectProvider<C: ObjectClient> {
    client: C,
    perm: Permission,
}

impl<C: ObjectClient> RemoteObjectProvider<C> {
    #[must_use]
    pub fn new(client: C, perm: Permission) -> Self {
        RemoteObjectProvider { client, perm }
    }
}

#[async_trait]
impl<C: ObjectClient> Provider for RemoteObjectProvider<C> {
    async fn stat(&self, path: &str) -> VfsResult<Entry> {
        let k = key(path);
        if k.is_empty() {
            return Ok(Entry::dir("/", self.perm | Permission::EXECUTE));
        }
        let meta = self.client.stat(&k).await?;
        let perm = if meta.is_dir { self.perm | Permission::EXECUTE } else { self.perm };
        Ok(entry_from_meta(&meta, perm))
    }

    async fn list(&self, path: &str, opts: &ListOptions) -> VfsResult<Vec<Entry>> {
        let k = key(path);
        let metas = self.client.list(&k).await?;
        let mut out: Vec<Entry> = metas
            .iter()
            .map(|m| {
                let perm = if m.is_dir { self.perm | Permission::EXECUTE } else { self.perm };
                entry_from_meta(m, perm)
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        if !opts.recursive {
            // `ObjectClient::list` is already one level deep by contract.
        }
        if let Some(max) = opts.max_results {
            out.truncate(max);
        }
        Ok(out)
    }

    fn as_readable(&self) -> Option<&dyn Readable> {
        self.perm.can_read().then_some(self)
    }

    fn as_writable(&self) -> Option<&dyn Writable> {
        self.perm.can_write().then_some(self)
    }

    fn as_mutable(&self) -> Option<&dyn Mutable> {
        self.perm.can_write().then_some(self)
    }

    fn as_searchable(&self) -> Option<&dyn Searchable> {
        self.perm.can_read().then_some(self)
    }
}

#[async_trait]
impl<C: ObjectClient> Readable for RemoteObjectProvider<C> {
    async fn open(&self, path: &str) -> VfsResult<VfsFile> {
        let k = key(path);
        let bytes = self.client.get(&k).await?;
        Ok(VfsFile::from_reader(display_path(&k), Box::new(std::io::Cursor::new(bytes))))
    }
}

#[async_trait]
impl<C: ObjectClient> Writable for RemoteObjectProvider<C> {
    async fn write(&self, path: &str, mut reader: ByteReader) -> VfsResult<()> {
        use tokio::io::AsyncReadExt;
        let k = key(path);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await.map_err(|e| VfsError::io(display_path(&k), e))?;
        self.client.put(&k, bytes).await
    }
}

#[async_trait]
impl<C: ObjectClient> Mutable for RemoteObjectProvider<C> {
    async fn mkdir(&self, path: &str, _perm: Permission) -> VfsResult<()> {
        // Object stores have no directories of their own; a zero-byte
        // marker key stands in, matching how many real services (S3,
        // GCS) represent an explicit "folder".
        let k = key(path);
        self.client.put(&format!("{k}/"), Vec::new()).await
    }

    async fn remove(&self, path: &str) -> VfsResult<()> {
        let k = key(path);
        self.client.delete(&k).await
    }

    /// Remote object services rarely support an atomic rename; emulate it
    /// as get + put + delete, the same emulation the façade itself falls
    /// back to for `Touch` on a `Writable`-only provider (§4.3).
    async fn rename(&self, old: &str, new: &str) -> VfsResult<()> {
        let old_key = key(old);
        let new_key = key(new);
        let bytes = self.client.get(&old_key).await?;
        self.client.put(&new_key, bytes).await?;
        self.client.delete(&old_key).await
    }
}

#[async_trait]
impl<C: ObjectClient> Searchable for RemoteObjectProvider<C> {
    async fn search(&self, query: &str, opts: &SearchOptions) -> VfsResult<Vec<SearchResult>> {
        let metas = self.client.search(query, opts.max_results_or_default()).await?;
        Ok(metas
            .iter()
            .map(|m| SearchResult {
                entry: entry_from_meta(m, self.perm),
                score: 1.0,
            })
            .collect())
    }
}

/// A header injected on every outbound request: plain `name: value`, or a
/// bearer token folded into `Authorization` (§1: "network security beyond
/// bearer/header injection" is the extent of what this provider supports).
#[derive(Debug, Clone)]
pub enum AuthHeader {
    Bearer(String),
    Header(String, String),
}

/// The bundled `reqwest`-based [`ObjectClient`], speaking a small REST
/// convention: `GET {base}/{key}` to read, `PUT {base}/{key}` to write,
/// `DELETE {base}/{key}` to remove, and `GET {base}/?prefix={prefix}`
/// returning a JSON array of `{key, is_dir, size, modified, etag}` to list.
pub struct HttpObjectClient {
    client: Client,
    base_url: String,
    headers: Vec<AuthHeader>,
}

impl HttpObjectClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpObjectClient {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, header: AuthHeader) -> Self {
        self.headers.push(header);
        self
    }

    fn apply_headers(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for header in &self.headers {
            builder = match header {
                AuthHeader::Bearer(token) => builder.bearer_auth(token),
                AuthHeader::Header(name, value) => builder.header(name, value),
            };
        }
        builder
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

#[derive(serde::Deserialize)]
struct WireObjectMeta {
    key: String,
    #[serde(default)]
    is_dir: bool,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    modified: Option<DateTime<Utc>>,
    #[serde(default)]
    etag: Option<String>,
}

impl From<WireObjectMeta> for ObjectMeta {
    fn from(w: WireObjectMeta) -> Self {
        ObjectMeta {
            key: w.key,
            is_dir: w.is_dir,
            size: w.size,
            modified: w.modified.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            etag: w.etag,
        }
    }
}

fn http_err(key: &str, status: reqwest::StatusCode) -> VfsError {
    if status == reqwest::StatusCode::NOT_FOUND {
        VfsError::not_found(display_path(key))
    } else {
        VfsError::Other {
            message: format!("{key}: remote object service returned {status}"),
        }
    }
}

#[async_trait]
impl ObjectClient for HttpObjectClient {
    async fn list(&self, prefix: &str) -> VfsResult<Vec<ObjectMeta>> {
        let resp = self
            .apply_headers(self.client.get(&self.base_url).query(&[("prefix", prefix)]))
            .send()
            .await
            .map_err(|e| VfsError::Other { message: e.to_string() })?;
        if !resp.status().is_success() {
            return Err(http_err(prefix, resp.status()));
        }
        let metas: Vec<WireObjectMeta> = resp
            .json()
            .await
            .map_err(|e| VfsError::Other { message: format!("bad listing payload: {e}") })?;
        Ok(metas.into_iter().map(Into::into).collect())
    }

    async fn stat(&self, key: &str) -> VfsResult<ObjectMeta> {
        let resp = self
            .apply_headers(self.client.head(self.url_for(key)))
            .send()
            .await
            .map_err(|e| VfsError::Other { message: e.to_string() })?;
        if !resp.status().is_success() {
            return Err(http_err(key, resp.status()));
        }
        let size = resp
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let etag = resp
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(ObjectMeta {
            key: key.to_string(),
            is_dir: key.ends_with('/'),
            size,
            modified: DateTime::<Utc>::UNIX_EPOCH,
            etag,
        })
    }

    async fn get(&self, key: &str) -> VfsResult<Vec<u8>> {
        let resp = self
            .apply_headers(self.client.get(self.url_for(key)))
            .send()
            .await
            .map_err(|e| VfsError::Other { message: e.to_string() })?;
        if !resp.status().is_success() {
            return Err(http_err(key, resp.status()));
        }
        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| VfsError::Other { message: e.to_string() })
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> VfsResult<()> {
        let resp = self
            .apply_headers(self.client.put(self.url_for(key)))
            .body(body)
            .send()
            .await
            .map_err(|e| VfsError::Other { message: e.to_string() })?;
        if !resp.status().is_success() {
            return Err(http_err(key, resp.status()));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> VfsResult<()> {
        let resp = self
            .apply_headers(self.client.delete(self.url_for(key)))
            .send()
            .await
            .map_err(|e| VfsError::Other { message: e.to_string() })?;
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(http_err(key, resp.status()));
        }
        Ok(())
    }
}

/// An in-memory [`ObjectClient`] used by tests and by callers who want the
/// remote-provider namespace shape without a real network dependency.
pub struct InMemoryObjectClient {
    objects: parking_lot::RwLock<HashMap<String, (Vec<u8>, DateTime<Utc>)>>,
}

impl Default for InMemoryObjectClient {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryObjectClient {
    #[must_use]
    pub fn new() -> Self {
        InMemoryObjectClient {
            objects: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    pub fn seed(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.objects.write().insert(key.into(), (bytes.into(), Utc::now()));
    }
}

#[async_trait]
impl ObjectClient for InMemoryObjectClient {
    async fn list(&self, prefix: &str) -> VfsResult<Vec<ObjectMeta>> {
        let objects = self.objects.read();
        let mut seen_dirs = std::collections::BTreeSet::new();
        let mut out = Vec::new();
        let scan_prefix = if prefix.is_empty() { String::new() } else { format!("{prefix}/") };
        for (k, (bytes, modified)) in objects.iter() {
            let Some(rest) = k.strip_prefix(scan_prefix.as_str()) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                None => out.push(ObjectMeta {
                    key: k.clone(),
                    is_dir: false,
                    size: bytes.len() as u64,
                    modified: *modified,
                    etag: None,
                }),
                Some((name, _)) => {
                    if seen_dirs.insert(name.to_string()) {
                        out.push(ObjectMeta {
                            key: format!("{scan_prefix}{name}"),
                            is_dir: true,
                            size: 0,
                            modified: *modified,
                            etag: None,
                        });
                    }
                }
            }
        }
        Ok(out)
    }

    async fn stat(&self, key: &str) -> VfsResult<ObjectMeta> {
        if let Some((bytes, modified)) = self.objects.read().get(key) {
            return Ok(ObjectMeta {
                key: key.to_string(),
                is_dir: false,
                size: bytes.len() as u64,
                modified: *modified,
                etag: None,
            });
        }
        let prefix = format!("{key}/");
        if self.objects.read().keys().any(|k| k.starts_with(&prefix)) {
            return Ok(ObjectMeta {
                key: key.to_string(),
                is_dir: true,
                size: 0,
                modified: Utc::now(),
                etag: None,
            });
        }
        Err(VfsError::not_found(display_path(key)))
    }

    async fn get(&self, key: &str) -> VfsResult<Vec<u8>> {
        self.objects
            .read()
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| VfsError::not_found(display_path(key)))
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> VfsResult<()> {
        self.objects.write().insert(key.to_string(), (body, Utc::now()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> VfsResult<()> {
        let prefix = format!("{key}/");
        let mut objects = self.objects.write();
        let had = objects.remove(key).is_some();
        let had_children = {
            let to_remove: Vec<String> = objects.keys().filter(|k| k.starts_with(&prefix)).cloned().collect();
            let any = !to_remove.is_empty();
            for k in to_remove {
                objects.remove(&k);
            }
            any
        };
        if !had && !had_children {
            return Err(VfsError::not_found(display_path(key)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> RemoteObjectProvider<InMemoryObjectClient> {
        RemoteObjectProvider::new(InMemoryObjectClient::new(), Permission::RWX)
    }

    #[tokio::test]
    async fn write_then_read_roundtrips() {
        let p = provider();
        p.as_writable().unwrap().write("a.txt", Box::new(std::io::Cursor::new(b"hi".to_vec()))).await.unwrap();
        let mut f = p.as_readable().unwrap().open("a.txt").await.unwrap();
        assert_eq!(f.read_to_end().await.unwrap(), b"hi");
    }

    #[tokio::test]
    async fn list_groups_common_prefixes_into_directories() {
        let p = provider();
        let w = p.as_writable().unwrap();
        w.write("docs/a.txt", Box::new(std::io::Cursor::new(b"x".to_vec()))).await.unwrap();
        w.write("docs/b.txt", Box::new(std::io::Cursor::new(b"y".to_vec()))).await.unwrap();
        w.write("readme.txt", Box::new(std::io::Cursor::new(b"z".to_vec()))).await.unwrap();

        let entries = p.list("", &ListOptions::default()).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["docs", "readme.txt"]);
        assert!(entries[0].is_dir);
    }

    #[tokio::test]
    async fn rename_is_emulated_as_get_put_delete() {
        let p = provider();
        p.as_writable().unwrap().write("old.txt", Box::new(std::io::Cursor::new(b"v".to_vec()))).await.unwrap();
        p.as_mutable().unwrap().rename("old.txt", "new.txt").await.unwrap();
        assert!(p.stat("old.txt").await.is_err());
        let mut f = p.as_readable().unwrap().open("new.txt").await.unwrap();
        assert_eq!(f.read_to_end().await.unwrap(), b"v");
    }

    #[tokio::test]
    async fn search_matches_substring_on_key_basename() {
        let p = provider();
        p.as_writable().unwrap().write("notes/todo.txt", Box::new(std::io::Cursor::new(b"x".to_vec()))).await.unwrap();
        p.as_writable().unwrap().write("other.txt", Box::new(std::io::Cursor::new(b"x".to_vec()))).await.unwrap();
        let results = p.as_searchable().unwrap().search("todo", &SearchOptions::default()).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
