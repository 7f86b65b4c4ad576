//! Error taxonomy for store operations.
//!
//! Every failure in the core maps to one of these kinds so callers can tell
//! a missing file from a name collision from a metadata fault. The HTTP
//! layer owns the mapping to status codes; nothing in this crate knows about
//! transports.

use std::path::PathBuf;

/// Result alias used throughout the store crate.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors returned by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The named file does not exist under the storage root.
    #[error("file not found: {0}")]
    NotFound(String),

    /// A file already exists at the target name.
    #[error("file already exists: {0}")]
    Conflict(String),

    /// A client-supplied name is not a safe storage-relative path.
    #[error("invalid file name: {0}")]
    InvalidName(String),

    /// The store was opened with an unusable directory layout.
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),

    /// A read, write or copy on a file under the storage root failed.
    #[error("i/o failure on {path}: {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The metadata record file exists but cannot be parsed. Startup must
    /// treat this as fatal rather than silently truncating the index.
    #[error("corrupt metadata record {path}: {source}", path = path.display())]
    CorruptMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Writing the metadata record file failed. The in-memory index is left
    /// on the previous committed state when this is returned.
    #[error("failed to persist metadata record {path}: {source}", path = path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
