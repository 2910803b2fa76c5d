//! Canonical error kinds every component must surface (§7).

/// The result type for every virtual OS operation.
pub type VfsResult<T> = Result<T, VfsError>;

/// Canonical error hierarchy.
///
/// Mirrors the tool/session split discipline of `AgentError` in the agent
/// crate this workspace is grounded on: every variant names the offending
/// path (or capability) so the façade and shell can format a useful message
/// without adding context of their own (§7: "The façade does not swallow
/// errors; it adds no context by default").
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VfsError {
    #[error("{path}: not found")]
    NotFound { path: String },

    #[error("{path}: already mounted")]
    AlreadyMounted { path: String },

    #[error("{path}: not readable")]
    NotReadable { path: String },

    #[error("{path}: not writable")]
    NotWritable { path: String },

    #[error("{path}: not executable")]
    NotExecutable { path: String },

    #[error("{path}: is a directory")]
    IsDir { path: String },

    #[error("{path}: not a directory")]
    NotDir { path: String },

    #[error("{path}: not supported ({capability})")]
    NotSupported { path: String, capability: String },

    #[error("{path}: i/o error: {message}")]
    Io { path: String, message: String },

    #[error("{message}")]
    Other { message: String },
}

impl VfsError {
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        VfsError::NotFound { path: path.into() }
    }

    #[must_use]
    pub fn not_supported(path: impl Into<String>, capability: impl Into<String>) -> Self {
        VfsError::NotSupported {
            path: path.into(),
            capability: capability.into(),
        }
    }

    #[must_use]
    pub fn io(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        VfsError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Translate a host I/O error, normalizing "not found" per §4.5.
    #[must_use]
    pub fn from_io(path: impl Into<String>, err: &std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            VfsError::NotFound { path }
        } else {
            VfsError::Io {
                path,
                message: err.to_string(),
            }
        }
    }

    /// The offending path, when this variant carries one.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            VfsError::NotFound { path }
            | VfsError::AlreadyMounted { path }
            | VfsError::NotReadable { path }
            | VfsError::NotWritable { path }
            | VfsError::NotExecutable { path }
            | VfsError::IsDir { path }
            | VfsError::NotDir { path }
            | VfsError::NotSupported { path, .. }
            | VfsError::Io { path, .. } => Some(path),
            VfsError::Other { .. } => None,
        }
    }
}
