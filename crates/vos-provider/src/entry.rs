//! Entry: an immutable snapshot of one namespace element (§3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::permission::Permission;

/// A value describing one namespace element.
///
/// Entries are produced transiently by providers; callers must not assume
/// any entry reflects later state (§3 "Lifecycle").
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Entry {
    /// The leaf name (final path segment).
    pub name: String,
    /// The absolute path within the virtual namespace.
    pub path: String,
    pub is_dir: bool,
    pub perm: Permission,
    /// Zero for directories.
    pub size: u64,
    pub mime_type: Option<String>,
    /// May be the Unix epoch when a provider has no notion of modification
    /// time (§3: "may be zero").
    pub modified: DateTime<Utc>,
    /// Open-ended string-to-string metadata. Keys are unique; insertion
    /// order is not meaningful.
    pub meta: HashMap<String, String>,
}

impl Entry {
    /// Build a directory entry with no metadata.
    #[must_use]
    pub fn dir(path: impl Into<String>, perm: Permission) -> Self {
        let path = vos_path::normalize(&path.into());
        let name = vos_path::basename(&path);
        Entry {
            name,
            path,
            is_dir: true,
            perm,
            size: 0,
            mime_type: None,
            modified: DateTime::<Utc>::UNIX_EPOCH,
            meta: HashMap::new(),
        }
    }

    /// Build a file entry with no metadata.
    #[must_use]
    pub fn file(path: impl Into<String>, perm: Permission, size: u64) -> Self {
        let path = vos_path::normalize(&path.into());
        let name = vos_path::basename(&path);
        Entry {
            name,
            path,
            is_dir: false,
            perm,
            size,
            mime_type: None,
            modified: DateTime::<Utc>::UNIX_EPOCH,
            meta: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = modified;
        self
    }

    #[must_use]
    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Fix up a blank absolute path, as the façade does for providers that
    /// leave it empty (§4.3).
    pub fn ensure_path(&mut self, path: &str) {
        if self.path.is_empty() {
            self.path = vos_path::normalize(path);
            self.name = vos_path::basename(&self.path);
        }
    }
}
