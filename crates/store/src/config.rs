//! Store configuration.
//!
//! Paths are resolved once at process startup and handed to
//! [`FileStore::open`](crate::FileStore::open); request handlers never read
//! the environment themselves.

use std::path::{Component, Path, PathBuf};

use crate::error::{StoreError, StoreResult};

/// Default storage root for uploaded files.
pub const DEFAULT_DATA_DIR: &str = "./uploads";

/// Default directory for the metadata record file.
pub const DEFAULT_METADATA_DIR: &str = "./metadata";

/// Name of the metadata record file kept inside the metadata directory.
pub const RECORD_FILE_NAME: &str = "fileHashes.json";

/// Directory layout of a store.
///
/// `data_dir` holds the uploaded files under their client-supplied,
/// storage-relative names. `metadata_dir` holds the single JSON record file
/// named [`RECORD_FILE_NAME`]. The two directories are created on open if
/// they do not exist.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    data_dir: PathBuf,
    metadata_dir: PathBuf,
}

impl StoreConfig {
    /// Builds a configuration from the two directory paths.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] when either path is empty or
    /// when the metadata directory sits inside the storage root, where the
    /// record file would be listed and counted as stored content.
    pub fn new(
        data_dir: impl Into<PathBuf>,
        metadata_dir: impl Into<PathBuf>,
    ) -> StoreResult<Self> {
        let data_dir = data_dir.into();
        let metadata_dir = metadata_dir.into();

        if data_dir.as_os_str().is_empty() {
            return Err(StoreError::InvalidConfig(
                "storage directory path cannot be empty".to_owned(),
            ));
        }
        if metadata_dir.as_os_str().is_empty() {
            return Err(StoreError::InvalidConfig(
                "metadata directory path cannot be empty".to_owned(),
            ));
        }
        if normalized(&metadata_dir).starts_with(normalized(&data_dir)) {
            return Err(StoreError::InvalidConfig(format!(
                "metadata directory {} cannot live inside the storage root {}",
                metadata_dir.display(),
                data_dir.display()
            )));
        }

        Ok(Self {
            data_dir,
            metadata_dir,
        })
    }

    /// Storage root holding the uploaded files.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding the metadata record file.
    pub fn metadata_dir(&self) -> &Path {
        &self.metadata_dir
    }

    /// Full path of the metadata record file.
    pub fn record_file(&self) -> PathBuf {
        self.metadata_dir.join(RECORD_FILE_NAME)
    }
}

/// Component-wise view of a path with `.` components dropped, so the
/// nesting check sees `./uploads` and `uploads` as the same directory.
fn normalized(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_sibling_directories() {
        let config = StoreConfig::new("./uploads", "./metadata")
            .expect("sibling directories should be accepted");
        assert_eq!(config.data_dir(), Path::new("./uploads"));
        assert_eq!(config.metadata_dir(), Path::new("./metadata"));
    }

    #[test]
    fn test_record_file_lives_in_metadata_dir() {
        let config = StoreConfig::new("/srv/depot/files", "/srv/depot/meta")
            .expect("config should be valid");
        assert_eq!(
            config.record_file(),
            Path::new("/srv/depot/meta").join(RECORD_FILE_NAME)
        );
    }

    #[test]
    fn test_rejects_empty_paths() {
        assert!(matches!(
            StoreConfig::new("", "./metadata"),
            Err(StoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            StoreConfig::new("./uploads", ""),
            Err(StoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_metadata_inside_storage_root() {
        assert!(matches!(
            StoreConfig::new("./uploads", "./uploads/metadata"),
            Err(StoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            StoreConfig::new("./uploads", "./uploads"),
            Err(StoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_nested_metadata_spelled_differently() {
        assert!(matches!(
            StoreConfig::new("./uploads", "uploads/metadata"),
            Err(StoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            StoreConfig::new("uploads", "./uploads/metadata"),
            Err(StoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_accepts_sibling_sharing_a_name_prefix() {
        StoreConfig::new("./uploads", "./uploads-meta")
            .expect("a sibling directory sharing a name prefix is not nested");
    }
}
