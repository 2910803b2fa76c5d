//! Optional capability traits (§3, §9 "Capability polymorphism").
//!
//! A provider implements the base [`crate::Provider`] trait and then any
//! subset of these. The façade detects support at call time through the
//! `as_*` accessors on `Provider` rather than assuming a capability a
//! provider did not advertise.

use async_trait::async_trait;

use crate::env::Environment;
use crate::error::VfsResult;
use crate::file::{ByteReader, VfsFile};
use crate::options::{ListOptions, SearchOptions, SearchResult};
use crate::permission::Permission;

#[async_trait]
pub trait Readable: Send + Sync {
    /// Open `path` (inner, provider-relative) for reading.
    async fn open(&self, path: &str) -> VfsResult<VfsFile>;
}

#[async_trait]
pub trait Writable: Send + Sync {
    /// Write `reader` to `path`, consuming it fully, creating or
    /// overwriting the target.
    async fn write(&self, path: &str, reader: ByteReader) -> VfsResult<()>;
}

#[async_trait]
pub trait Mutable: Send + Sync {
    async fn mkdir(&self, path: &str, perm: Permission) -> VfsResult<()>;
    async fn remove(&self, path: &str) -> VfsResult<()>;
    async fn rename(&self, old: &str, new: &str) -> VfsResult<()>;
}

#[async_trait]
pub trait Touchable: Send + Sync {
    /// Update the modification time of an existing entry, or create an
    /// empty file if none exists.
    async fn touch(&self, path: &str) -> VfsResult<()>;
}

#[async_trait]
pub trait Executable: Send + Sync {
    /// `env` carries the per-call `PWD`/`PATH`/`USER`/`HOME` context (§3,
    /// §9 "Shell state as context") so a function-backed command can
    /// resolve relative arguments without any process-global state.
    async fn exec(
        &self,
        path: &str,
        args: Vec<String>,
        stdin: Option<ByteReader>,
        env: &Environment,
    ) -> VfsResult<ByteReader>;
}

#[async_trait]
pub trait Searchable: Send + Sync {
    async fn search(&self, query: &str, opts: &SearchOptions) -> VfsResult<Vec<SearchResult>>;
}

pub trait MountInfoProvider: Send + Sync {
    /// A short, human-readable description of what this provider is mounted
    /// on top of (e.g. `"host directory: /srv/data"`).
    fn describe(&self) -> String;
}
