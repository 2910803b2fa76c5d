//! The host-directory provider (§4.5): maps a provider-root subtree onto a
//! real host directory, translating every virtual path into a host path by
//! joining the root with the inner path.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vos_provider::{
    ByteReader, Entry, Environment, Executable, ListOptions, Mutable, Permission, Provider,
    Readable, SearchOptions, SearchResult, Searchable, Touchable, VfsError, VfsFile, VfsResult,
    Writable,
};

/// Maps this provider's namespace onto `root` on the host filesystem.
///
/// Permissions are a single provider-wide bitmask fixed at construction;
/// directories additionally report `execute` whenever the provider itself is
/// readable (§4.5).
pub struct HostFsProvider {
    root: PathBuf,
    perm: Permission,
}

impl HostFsProvider {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, perm: Permission) -> Self {
        HostFsProvider {
            root: root.into(),
            perm,
        }
    }

    fn host_path(&self, inner: &str) -> PathBuf {
        let inner = inner.trim_start_matches('/');
        if inner.is_empty() {
            self.root.clone()
        } else {
            self.root.join(inner)
        }
    }

    fn dir_perm(&self) -> Permission {
        if self.perm.can_read() {
            self.perm | Permission::EXECUTE
        } else {
            self.perm
        }
    }

    async fn entry_from_metadata(&self, inner: &str, path: &Path) -> VfsResult<Entry> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| VfsError::from_io(display_path(inner), &e))?;
        let modified: DateTime<Utc> = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        Ok(if meta.is_dir() {
            Entry::dir(display_path(inner), self.dir_perm()).with_modified(modified)
        } else {
            Entry::file(display_path(inner), self.perm, meta.len()).with_modified(modified)
        })
    }
}

fn display_path(inner: &str) -> String {
    let inner = inner.trim_start_matches('/');
    if inner.is_empty() {
        "/".to_string()
    } else {
        format!("/{inner}")
    }
}

#[async_trait]
impl Provider for HostFsProvider {
    async fn stat(&self, path: &str) -> VfsResult<Entry> {
        let host = self.host_path(path);
        self.entry_from_metadata(path, &host).await
    }

    async fn list(&self, path: &str, opts: &ListOptions) -> VfsResult<Vec<Entry>> {
        let host = self.host_path(path);
        let mut out = Vec::new();
        self.list_into(path, &host, opts.recursive, &mut out).await?;
        out.sort_by(|a: &Entry, b: &Entry| a.path.cmp(&b.path));
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

    fn as_touchable(&self) -> Option<&dyn Touchable> {
        self.perm.can_write().then_some(self)
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        self.perm.can_execute().then_some(self)
    }

    fn as_searchable(&self) -> Option<&dyn Searchable> {
        self.perm.can_read().then_some(self)
    }
}

impl HostFsProvider {
    #[async_recursion::async_recursion]
    async fn list_into(
        &self,
        inner: &str,
        host: &Path,
        recursive: bool,
        out: &mut Vec<Entry>,
    ) -> VfsResult<()> {
        let mut read_dir = tokio::fs::read_dir(host)
            .await
            .map_err(|e| VfsError::from_io(display_path(inner), &e))?;

        while let Some(child) = read_dir
            .next_entry()
            .await
            .map_err(|e| VfsError::from_io(display_path(inner), &e))?
        {
            let name = child.file_name().to_string_lossy().to_string();
            let child_inner = if inner.trim_start_matches('/').is_empty() {
                name.clone()
            } else {
                format!("{}/{name}", inner.trim_start_matches('/'))
            };
            let child_host = child.path();
            let entry = self.entry_from_metadata(&child_inner, &child_host).await?;
            let is_dir = entry.is_dir;
            out.push(entry);
            if recursive && is_dir {
                self.list_into(&child_inner, &child_host, recursive, out).await?;
            }
        }
        Ok(())
    }

    #[async_recursion::async_recursion]
    async fn search_into(
        &self,
        inner: &str,
        host: &Path,
        query_lower: &str,
        out: &mut Vec<SearchResult>,
        max_results: usize,
    ) -> VfsResult<()> {
        if out.len() >= max_results {
            return Ok(());
        }
        let mut read_dir = match tokio::fs::read_dir(host).await {
            Ok(rd) => rd,
            Err(_) => return Ok(()),
        };

        while let Some(child) = read_dir.next_entry().await.ok().flatten() {
            if out.len() >= max_results {
                return Ok(());
            }
            let name = child.file_name().to_string_lossy().to_string();
            let child_inner = if inner.is_empty() {
                name.clone()
            } else {
                format!("{inner}/{name}")
            };
            let child_host = child.path();

            if name.to_lowercase().contains(query_lower) {
                if let Ok(entry) = self.entry_from_metadata(&child_inner, &child_host).await {
                    out.push(SearchResult { entry, score: 1.0 });
                }
            }

            if child_host.is_dir() {
                self.search_into(&child_inner, &child_host, query_lower, out, max_results)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Readable for HostFsProvider {
    async fn open(&self, path: &str) -> VfsResult<VfsFile> {
        let host = self.host_path(path);
        let file = tokio::fs::File::open(&host)
            .await
            .map_err(|e| VfsError::from_io(display_path(path), &e))?;
        Ok(VfsFile::from_seekable(display_path(path), Box::new(file)))
    }
}

#[async_trait]
impl Writable for HostFsProvider {
    async fn write(&self, path: &str, mut reader: ByteReader) -> VfsResult<()> {
        let host = self.host_path(path);
        if let Some(parent) = host.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| VfsError::from_io(display_path(path), &e))?;
        }
        let mut file = tokio::fs::File::create(&host)
            .await
            .map_err(|e| VfsError::from_io(display_path(path), &e))?;
        use tokio::io::AsyncWriteExt;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| VfsError::from_io(display_path(path), &e))?;
        file.flush().await.map_err(|e| VfsError::from_io(display_path(path), &e))?;
        Ok(())
    }
}

#[async_trait]
impl Mutable for HostFsProvider {
    async fn mkdir(&self, path: &str, _perm: Permission) -> VfsResult<()> {
        let host = self.host_path(path);
        tokio::fs::create_dir_all(&host)
            .await
            .map_err(|e| VfsError::from_io(display_path(path), &e))
    }

    async fn remove(&self, path: &str) -> VfsResult<()> {
        let host = self.host_path(path);
        let meta = tokio::fs::metadata(&host)
            .await
            .map_err(|e| VfsError::from_io(display_path(path), &e))?;
        if meta.is_dir() {
            tokio::fs::remove_dir_all(&host)
                .await
                .map_err(|e| VfsError::from_io(display_path(path), &e))
        } else {
            tokio::fs::remove_file(&host)
                .await
                .map_err(|e| VfsError::from_io(display_path(path), &e))
        }
    }

    async fn rename(&self, old: &str, new: &str) -> VfsResult<()> {
        let old_host = self.host_path(old);
        let new_host = self.host_path(new);
        if let Some(parent) = new_host.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| VfsError::from_io(display_path(new), &e))?;
        }
        tokio::fs::rename(&old_host, &new_host)
            .await
            .map_err(|e| VfsError::from_io(display_path(old), &e))
    }
}

#[async_trait]
impl Touchable for HostFsProvider {
    async fn touch(&self, path: &str) -> VfsResult<()> {
        let host = self.host_path(path);
        if let Some(parent) = host.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| VfsError::from_io(display_path(path), &e))?;
        }
        if !tokio::fs::try_exists(&host).await.unwrap_or(false) {
            tokio::fs::File::create(&host)
                .await
                .map_err(|e| VfsError::from_io(display_path(path), &e))?;
            return Ok(());
        }
        let host = host.clone();
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&host)?;
            file.set_modified(std::time::SystemTime::now())
        })
        .await
        .map_err(|e| VfsError::io(display_path(path), e))?
        .map_err(|e| VfsError::from_io(display_path(path), &e))
    }
}

#[async_trait]
impl Executable for HostFsProvider {
    async fn exec(
        &self,
        path: &str,
        _args: Vec<String>,
        _stdin: Option<ByteReader>,
        _env: &Environment,
    ) -> VfsResult<ByteReader> {
        Err(VfsError::NotExecutable {
            path: display_path(path),
        })
    }
}

#[async_trait]
impl Searchable for HostFsProvider {
    async fn search(&self, query: &str, opts: &SearchOptions) -> VfsResult<Vec<SearchResult>> {
        let query_lower = query.to_lowercase();
        let mut out = Vec::new();
        self.search_into("", &self.root, &query_lower, &mut out, opts.max_results_or_default())
            .await?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn provider() -> (tempfile::TempDir, HostFsProvider) {
        let dir = tempfile::tempdir().unwrap();
        let provider = HostFsProvider::new(dir.path(), Permission::RWX);
        (dir, provider)
    }

    #[tokio::test]
    async fn write_creates_missing_parents() {
        let (_dir, p) = provider();
        p.as_writable()
            .unwrap()
            .write("a/b/c.txt", Box::new(Cursor::new(b"hi".to_vec())))
            .await
            .unwrap();
        let entry = p.stat("a/b/c.txt").await.unwrap();
        assert_eq!(entry.size, 2);
    }

    #[tokio::test]
    async fn write_overwrites_existing_file() {
        let (_dir, p) = provider();
        let writable = p.as_writable().unwrap();
        writable.write("x.txt", Box::new(Cursor::new(b"one".to_vec()))).await.unwrap();
        writable.write("x.txt", Box::new(Cursor::new(b"two".to_vec()))).await.unwrap();
        let mut f = p.as_readable().unwrap().open("x.txt").await.unwrap();
        assert_eq!(f.read_to_end().await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn remove_is_recursive() {
        let (_dir, p) = provider();
        p.as_writable()
            .unwrap()
            .write("a/b.txt", Box::new(Cursor::new(b"x".to_vec())))
            .await
            .unwrap();
        p.as_mutable().unwrap().remove("a").await.unwrap();
        assert!(p.stat("a").await.is_err());
    }

    #[tokio::test]
    async fn missing_path_normalizes_to_not_found() {
        let (_dir, p) = provider();
        let err = p.stat("nope.txt").await.unwrap_err();
        assert!(matches!(err, VfsError::NotFound { .. }));
    }

    #[tokio::test]
    async fn search_matches_substring_case_insensitively() {
        let (_dir, p) = provider();
        let writable = p.as_writable().unwrap();
        writable.write("Readme.md", Box::new(Cursor::new(b"x".to_vec()))).await.unwrap();
        writable
            .write("docs/readme-notes.txt", Box::new(Cursor::new(b"x".to_vec())))
            .await
            .unwrap();
        writable.write("other.txt", Box::new(Cursor::new(b"x".to_vec()))).await.unwrap();

        let results = p
            .as_searchable()
            .unwrap()
            .search("readme", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.score == 1.0));
    }
}
