//! The base `Provider` trait (§3, §4.3).

use async_trait::async_trait;

use crate::capability::{
    Executable, MountInfoProvider, Mutable, Readable, Searchable, Touchable, Writable,
};
use crate::entry::Entry;
use crate::error::VfsResult;
use crate::options::ListOptions;

/// A capability-polymorphic object owning a private namespace.
///
/// Every provider supports the base capability `{Stat, List}`. The `as_*`
/// methods default to `None`; a provider overrides the ones matching the
/// optional capabilities it implements. The mount table and façade must
/// never assume a capability a provider did not advertise here: they
/// detect it at call time and surface [`crate::VfsError::NotSupported`]
/// with the offending path when it is missing.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Describe the entry at `path` (provider-relative, no leading mount
    /// prefix).
    async fn stat(&self, path: &str) -> VfsResult<Entry>;

    /// List the direct (or recursive) children of `path`.
    async fn list(&self, path: &str, opts: &ListOptions) -> VfsResult<Vec<Entry>>;

    fn as_readable(&self) -> Option<&dyn Readable> {
        None
    }

    fn as_writable(&self) -> Option<&dyn Writable> {
        None
    }

    fn as_mutable(&self) -> Option<&dyn Mutable> {
        None
    }

    fn as_touchable(&self) -> Option<&dyn Touchable> {
        None
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        None
    }

    fn as_searchable(&self) -> Option<&dyn Searchable> {
        None
    }

    fn as_mount_info(&self) -> Option<&dyn MountInfoProvider> {
        None
    }
}
