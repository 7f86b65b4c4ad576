//! File store operations.
//!
//! A [`FileStore`] keeps client-named files under a storage root and a
//! write-through hash index describing them:
//!
//! ```text
//! <data_dir>/               # stored files, possibly nested
//! ├── report.txt
//! └── notes/
//!     └── 2026/plan.txt
//! <metadata_dir>/
//! └── fileHashes.json       # JSON array of {fileName, hash} records
//! ```
//!
//! ## Consistency contract
//!
//! Names are canonicalised to storage-relative paths before use, so the
//! index, the lock table and the filesystem all key on the same string.
//! Every mutation holds the write lock for the name(s) it touches, mutates
//! the filesystem first, then commits the index change through
//! [`DurableIndex`]. When that commit fails, content written for a name the
//! index has never seen is removed again; content that already existed
//! cannot be restored and the error tells the caller the index may be
//! stale for that name.

use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::config::StoreConfig;
use crate::digest::HashingWriter;
use crate::error::{StoreError, StoreResult};
use crate::index::{HashIndex, HashRecord};
use crate::locks::NameLocks;
use crate::metadata::{DurableIndex, MetadataStore};

/// Hash-indexed file storage rooted at a local directory.
#[derive(Debug)]
pub struct FileStore {
    data_dir: PathBuf,
    index: DurableIndex,
    locks: NameLocks,
}

impl FileStore {
    /// Opens the store described by `config`.
    ///
    /// Creates the storage and metadata directories when missing and loads
    /// the persisted index.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when a directory cannot be created and
    /// [`StoreError::CorruptMetadata`] when the record file exists but does
    /// not parse; callers should refuse to start in the latter case.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        fs::create_dir_all(config.data_dir())
            .map_err(|e| StoreError::io(config.data_dir(), e))?;
        fs::create_dir_all(config.metadata_dir())
            .map_err(|e| StoreError::io(config.metadata_dir(), e))?;
        let data_dir = config
            .data_dir()
            .canonicalize()
            .map_err(|e| StoreError::io(config.data_dir(), e))?;
        let index = DurableIndex::open(MetadataStore::new(config.record_file()))?;

        Ok(Self {
            data_dir,
            index,
            locks: NameLocks::new(),
        })
    }

    /// Canonicalised storage root.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Point-in-time copy of the hash index.
    pub fn snapshot(&self) -> HashIndex {
        self.index.snapshot()
    }

    /// Name of the first stored file whose record carries `hash`.
    ///
    /// Ties between files with identical content resolve to the earliest
    /// surviving record.
    pub fn find_match(&self, hash: &str) -> Option<String> {
        self.index.find_match(hash)
    }

    /// Stores a new file under `name`.
    ///
    /// The content is streamed to disk and hashed in the same pass. When
    /// `supplied_hash` is absent or empty the computed sha-256 digest is
    /// recorded instead.
    ///
    /// # Arguments
    ///
    /// * `name` - Storage-relative path for the new file.
    /// * `content` - Reader yielding the file content.
    /// * `supplied_hash` - Caller-provided digest to record, if any.
    ///
    /// # Returns
    ///
    /// The hash recorded in the index.
    ///
    /// # Errors
    ///
    /// * [`StoreError::Conflict`] when a file with that name already exists;
    ///   nothing is modified.
    /// * [`StoreError::Persistence`] when the record file cannot be
    ///   rewritten; the written content is removed again so disk and index
    ///   stay in step.
    pub fn upload<R: Read>(
        &self,
        name: &str,
        mut content: R,
        supplied_hash: Option<&str>,
    ) -> StoreResult<String> {
        let name = canonical_name(name)?;
        let path = self.entry_path(&name);
        let lock = self.locks.lock_for(&name);
        let _guard = lock.write();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::Conflict(name));
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let mut writer = HashingWriter::new(file);
        if let Err(e) = io::copy(&mut content, &mut writer) {
            drop(writer);
            let _ = fs::remove_file(&path);
            return Err(StoreError::io(&path, e));
        }
        let (_, computed) = writer.finalize();
        let hash = chosen_hash(supplied_hash, computed);

        if let Err(e) = self.index.upsert(HashRecord::new(name.clone(), hash.clone())) {
            // the index never learned about this file; do not keep the orphan
            if let Err(cleanup) = fs::remove_file(&path) {
                tracing::warn!(
                    "failed to remove unindexed upload {}: {}",
                    path.display(),
                    cleanup
                );
            }
            return Err(e);
        }
        Ok(hash)
    }

    /// Replaces the content of `name`, creating the file if absent.
    ///
    /// Content is written in place with truncation and hashed as it is
    /// written; the recorded hash always describes the bytes on disk.
    /// Repeating an update with the same content converges on the same file
    /// and index state.
    ///
    /// # Returns
    ///
    /// The sha-256 digest recorded for the new content.
    ///
    /// # Errors
    ///
    /// * [`StoreError::NotFound`] when the file cannot be opened at that
    ///   name.
    /// * [`StoreError::Io`] when writing fails part-way; the file may hold
    ///   partial content while the index keeps the previous record.
    /// * [`StoreError::Persistence`] when the index commit fails; the new
    ///   content stays on disk and the index keeps the previous record.
    pub fn update<R: Read>(&self, name: &str, mut content: R) -> StoreResult<String> {
        let name = canonical_name(name)?;
        let path = self.entry_path(&name);
        let lock = self.locks.lock_for(&name);
        let _guard = lock.write();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let file = match fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name));
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let mut writer = HashingWriter::new(file);
        io::copy(&mut content, &mut writer).map_err(|e| StoreError::io(&path, e))?;
        let (_, hash) = writer.finalize();

        self.index.upsert(HashRecord::new(name, hash.clone()))?;
        Ok(hash)
    }

    /// Removes the file stored under `name` together with its index record.
    ///
    /// # Errors
    ///
    /// * [`StoreError::NotFound`] when no such file exists; nothing is
    ///   modified.
    /// * [`StoreError::Persistence`] when the record file cannot be
    ///   rewritten after the file was removed; the stale record survives
    ///   until a later mutation commits.
    pub fn delete(&self, name: &str) -> StoreResult<()> {
        let name = canonical_name(name)?;
        let path = self.entry_path(&name);
        let lock = self.locks.lock_for(&name);
        let _guard = lock.write();

        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name));
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        }
        self.index.remove(&name)?;
        Ok(())
    }

    /// Duplicates the content of `src` to `dest`, overwriting `dest` if it
    /// exists, and records a hash for the destination.
    ///
    /// Bytes are streamed from source to destination and hashed on the way
    /// through; when `supplied_hash` is absent or empty the destination is
    /// recorded under the digest of the copied bytes.
    ///
    /// # Returns
    ///
    /// The hash recorded for `dest`.
    ///
    /// # Errors
    ///
    /// * [`StoreError::NotFound`] when `src` does not exist.
    /// * [`StoreError::InvalidName`] when `src` and `dest` name the same
    ///   file.
    /// * [`StoreError::Persistence`] when the index commit fails; a
    ///   destination created by this call is removed again, an overwritten
    ///   one keeps the copied bytes with its previous record.
    pub fn copy_file(
        &self,
        src: &str,
        dest: &str,
        supplied_hash: Option<&str>,
    ) -> StoreResult<String> {
        let src = canonical_name(src)?;
        let dest = canonical_name(dest)?;
        if src == dest {
            return Err(StoreError::InvalidName(
                "source and destination name the same file".to_owned(),
            ));
        }
        let src_path = self.entry_path(&src);
        let dest_path = self.entry_path(&dest);
        let (first, second) = self.locks.lock_pair(&src, &dest);
        let _first_guard = first.write();
        let _second_guard = second.write();

        let mut src_file = match fs::File::open(&src_path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(src));
            }
            Err(e) => return Err(StoreError::io(&src_path, e)),
        };
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let dest_existed = dest_path.exists();
        let dest_file =
            fs::File::create(&dest_path).map_err(|e| StoreError::io(&dest_path, e))?;

        let mut writer = HashingWriter::new(dest_file);
        if let Err(e) = io::copy(&mut src_file, &mut writer) {
            drop(writer);
            if !dest_existed {
                let _ = fs::remove_file(&dest_path);
            }
            return Err(StoreError::io(&dest_path, e));
        }
        let (_, computed) = writer.finalize();
        let hash = chosen_hash(supplied_hash, computed);

        if let Err(e) = self.index.upsert(HashRecord::new(dest.clone(), hash.clone())) {
            if !dest_existed {
                if let Err(cleanup) = fs::remove_file(&dest_path) {
                    tracing::warn!(
                        "failed to remove unindexed copy {}: {}",
                        dest_path.display(),
                        cleanup
                    );
                }
            }
            return Err(e);
        }
        Ok(hash)
    }

    /// Returns the stored content of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no such file exists.
    pub fn read(&self, name: &str) -> StoreResult<Vec<u8>> {
        let name = canonical_name(name)?;
        let path = self.entry_path(&name);
        let lock = self.locks.lock_for(&name);
        let _guard = lock.read();

        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(name)),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// Storage-relative paths of every stored file, in lexicographic walk
    /// order.
    pub fn list(&self) -> StoreResult<Vec<String>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.data_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| self.walk_error(e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.data_dir)
                .unwrap_or(entry.path());
            files.push(relative.to_string_lossy().into_owned());
        }
        Ok(files)
    }

    /// Total count of whitespace-separated words across every stored file.
    ///
    /// Content is interpreted as UTF-8, lossily, so binary files still
    /// contribute a defined count.
    pub fn word_count(&self) -> StoreResult<u64> {
        let mut total = 0u64;
        for entry in WalkDir::new(&self.data_dir) {
            let entry = entry.map_err(|e| self.walk_error(e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let raw = fs::read(entry.path()).map_err(|e| StoreError::io(entry.path(), e))?;
            total += String::from_utf8_lossy(&raw).split_whitespace().count() as u64;
        }
        Ok(total)
    }

    fn entry_path(&self, canonical: &str) -> PathBuf {
        self.data_dir.join(canonical)
    }

    fn walk_error(&self, e: walkdir::Error) -> StoreError {
        let path = e
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.data_dir.clone());
        StoreError::io(path, e.into())
    }
}

/// Validates a client-supplied name and returns its canonical
/// storage-relative form, components joined by `/`.
///
/// Absolute paths, `..` components and drive prefixes are rejected; `.`
/// components and redundant separators are normalised away.
fn canonical_name(name: &str) -> StoreResult<String> {
    if name.trim().is_empty() {
        return Err(StoreError::InvalidName("file name cannot be empty".to_owned()));
    }

    let mut parts: Vec<&str> = Vec::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => parts.push(part),
                None => {
                    return Err(StoreError::InvalidName(format!(
                        "file name is not valid UTF-8: {name:?}"
                    )));
                }
            },
            Component::CurDir => {}
            _ => {
                return Err(StoreError::InvalidName(format!(
                    "file name must be a storage-relative path without '..' or a root: {name:?}"
                )));
            }
        }
    }
    if parts.is_empty() {
        return Err(StoreError::InvalidName(format!(
            "file name has no usable components: {name:?}"
        )));
    }
    Ok(parts.join("/"))
}

fn chosen_hash(supplied: Option<&str>, computed: String) -> String {
    match supplied {
        Some(hash) if !hash.is_empty() => hash.to_owned(),
        _ => computed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::force_save_error_for_current_thread;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn test_config(temp: &TempDir) -> StoreConfig {
        StoreConfig::new(temp.path().join("uploads"), temp.path().join("metadata"))
            .expect("test layout should be valid")
    }

    fn test_store(temp: &TempDir) -> FileStore {
        FileStore::open(test_config(temp)).expect("store should open")
    }

    #[test]
    fn test_upload_then_find_match() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);

        store
            .upload("a.txt", "hello".as_bytes(), Some("h1"))
            .expect("upload should succeed");

        assert_eq!(store.find_match("h1").as_deref(), Some("a.txt"));
        assert_eq!(
            fs::read_to_string(store.data_dir().join("a.txt")).expect("file should exist"),
            "hello"
        );
    }

    #[test]
    fn test_upload_computes_hash_when_not_supplied() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);

        let hash = store
            .upload("a.txt", "hello".as_bytes(), None)
            .expect("upload should succeed");

        assert_eq!(hash, HELLO_SHA256);
        assert_eq!(store.find_match(HELLO_SHA256).as_deref(), Some("a.txt"));
    }

    #[test]
    fn test_upload_treats_empty_supplied_hash_as_absent() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);

        let hash = store
            .upload("a.txt", "hello".as_bytes(), Some(""))
            .expect("upload should succeed");

        assert_eq!(hash, HELLO_SHA256);
    }

    #[test]
    fn test_upload_conflict_preserves_existing_state() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);
        store
            .upload("a.txt", "original".as_bytes(), Some("h1"))
            .expect("first upload should succeed");

        let err = store
            .upload("a.txt", "impostor".as_bytes(), Some("h2"))
            .expect_err("second upload of the same name should fail");
        assert!(matches!(err, StoreError::Conflict(_)));

        assert_eq!(
            fs::read_to_string(store.data_dir().join("a.txt")).expect("file should exist"),
            "original"
        );
        assert_eq!(store.snapshot().hash_for("a.txt"), Some("h1"));
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn test_upload_creates_nested_parents() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);

        store
            .upload("notes/2026/plan.txt", "deep".as_bytes(), None)
            .expect("nested upload should succeed");

        assert!(store.data_dir().join("notes/2026/plan.txt").is_file());
        assert!(store.snapshot().hash_for("notes/2026/plan.txt").is_some());
    }

    #[test]
    fn test_names_are_canonicalised_before_use() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);

        store
            .upload("./notes//today.txt", "x".as_bytes(), Some("h1"))
            .expect("upload should succeed");

        assert_eq!(store.find_match("h1").as_deref(), Some("notes/today.txt"));
        // the canonical spelling addresses the same file
        store.delete("notes/today.txt").expect("delete should succeed");
        assert!(store.find_match("h1").is_none());
    }

    #[test]
    fn test_escaping_names_are_rejected() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);

        for name in ["", "   ", "../escape.txt", "/etc/passwd", "a/../../b.txt", "."] {
            let err = store
                .upload(name, "x".as_bytes(), None)
                .expect_err("unsafe name should be rejected");
            assert!(matches!(err, StoreError::InvalidName(_)), "name: {name:?}");
        }
        assert!(store.snapshot().is_empty());
        assert_eq!(store.list().expect("list should succeed").len(), 0);
    }

    #[test]
    fn test_update_is_idempotent() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);
        store
            .upload("a.txt", "v1".as_bytes(), None)
            .expect("upload should succeed");

        let first = store
            .update("a.txt", "v2".as_bytes())
            .expect("update should succeed");
        let second = store
            .update("a.txt", "v2".as_bytes())
            .expect("repeated update should succeed");

        assert_eq!(first, second);
        assert_eq!(
            fs::read_to_string(store.data_dir().join("a.txt")).expect("file should exist"),
            "v2"
        );
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn test_update_replaces_record_in_place() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);
        store
            .upload("a.txt", "v1".as_bytes(), None)
            .expect("upload should succeed");
        store
            .upload("b.txt", "other".as_bytes(), None)
            .expect("upload should succeed");

        let new_hash = store
            .update("a.txt", "v2".as_bytes())
            .expect("update should succeed");

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2, "update must not duplicate the record");
        assert_eq!(snapshot.records()[0].file_name, "a.txt", "position must survive");
        assert_eq!(snapshot.records()[0].hash, new_hash);
    }

    #[test]
    fn test_update_creates_missing_file() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);

        store
            .update("fresh.txt", "content".as_bytes())
            .expect("update of a missing file creates it");

        assert!(store.data_dir().join("fresh.txt").is_file());
        assert!(store.snapshot().hash_for("fresh.txt").is_some());
    }

    #[test]
    fn test_delete_removes_file_and_record() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);
        store
            .upload("a.txt", "hello".as_bytes(), Some("h1"))
            .expect("upload should succeed");

        store.delete("a.txt").expect("delete should succeed");

        assert!(!store.data_dir().join("a.txt").exists());
        assert!(store.find_match("h1").is_none());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_delete_missing_file_is_not_found_and_mutates_nothing() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);
        store
            .upload("keep.txt", "x".as_bytes(), Some("h1"))
            .expect("upload should succeed");

        let err = store.delete("missing.txt").expect_err("delete should fail");
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.snapshot().len(), 1);
        assert!(store.data_dir().join("keep.txt").is_file());
    }

    #[test]
    fn test_copy_duplicates_content_and_records_supplied_hash() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);
        store
            .upload("src.txt", "payload".as_bytes(), Some("h-src"))
            .expect("upload should succeed");

        let hash = store
            .copy_file("src.txt", "dest.txt", Some("h-dest"))
            .expect("copy should succeed");

        assert_eq!(hash, "h-dest");
        assert_eq!(
            fs::read(store.data_dir().join("src.txt")).expect("src should exist"),
            fs::read(store.data_dir().join("dest.txt")).expect("dest should exist"),
        );
        assert_eq!(store.snapshot().hash_for("dest.txt"), Some("h-dest"));
        assert_eq!(store.snapshot().hash_for("src.txt"), Some("h-src"));
    }

    #[test]
    fn test_copy_computes_hash_from_copied_bytes() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);
        store
            .upload("src.txt", "hello".as_bytes(), Some("opaque-tag"))
            .expect("upload should succeed");

        let hash = store
            .copy_file("src.txt", "dest.txt", None)
            .expect("copy should succeed");

        // the destination hash describes the bytes, not the source record
        assert_eq!(hash, HELLO_SHA256);
        assert_eq!(store.snapshot().hash_for("dest.txt"), Some(HELLO_SHA256));
    }

    #[test]
    fn test_copy_overwrites_existing_destination() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);
        store
            .upload("src.txt", "new content".as_bytes(), None)
            .expect("upload should succeed");
        store
            .upload("dest.txt", "old content that is longer".as_bytes(), None)
            .expect("upload should succeed");

        store
            .copy_file("src.txt", "dest.txt", None)
            .expect("copy should overwrite");

        assert_eq!(
            fs::read_to_string(store.data_dir().join("dest.txt")).expect("dest should exist"),
            "new content"
        );
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn test_copy_missing_source_is_not_found() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);

        let err = store
            .copy_file("missing.txt", "dest.txt", None)
            .expect_err("copy should fail");
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!store.data_dir().join("dest.txt").exists());
    }

    #[test]
    fn test_copy_onto_itself_is_rejected() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);
        store
            .upload("a.txt", "x".as_bytes(), None)
            .expect("upload should succeed");

        let err = store
            .copy_file("a.txt", "./a.txt", None)
            .expect_err("self-copy should be rejected");
        assert!(matches!(err, StoreError::InvalidName(_)));
        assert_eq!(
            fs::read_to_string(store.data_dir().join("a.txt")).expect("file should exist"),
            "x"
        );
    }

    #[test]
    fn test_read_returns_stored_bytes() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);
        store
            .upload("a.txt", "hello".as_bytes(), None)
            .expect("upload should succeed");

        assert_eq!(store.read("a.txt").expect("read should succeed"), b"hello");
        assert!(matches!(
            store.read("missing.txt"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_walks_nested_files_in_order() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);
        store
            .upload("c.txt", "3".as_bytes(), None)
            .expect("upload should succeed");
        store
            .upload("a/x.txt", "1".as_bytes(), None)
            .expect("upload should succeed");
        store
            .upload("b.txt", "2".as_bytes(), None)
            .expect("upload should succeed");

        let files = store.list().expect("list should succeed");
        assert_eq!(files, ["a/x.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn test_list_of_empty_store_is_empty() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);
        assert!(store.list().expect("list should succeed").is_empty());
    }

    #[test]
    fn test_word_count_totals_all_files() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);
        store
            .upload("a.txt", "one two\nthree".as_bytes(), None)
            .expect("upload should succeed");
        store
            .upload("nested/b.txt", "  four  ".as_bytes(), None)
            .expect("upload should succeed");
        store
            .upload("empty.txt", "".as_bytes(), None)
            .expect("upload should succeed");

        assert_eq!(store.word_count().expect("count should succeed"), 4);
    }

    #[test]
    fn test_restart_reloads_persisted_index() {
        let temp = TempDir::new().expect("temp dir should be created");
        let config = test_config(&temp);

        {
            let store = FileStore::open(config.clone()).expect("store should open");
            store
                .upload("a.txt", "hello".as_bytes(), Some("h1"))
                .expect("upload should succeed");
            assert_eq!(store.find_match("h1").as_deref(), Some("a.txt"));
        }

        {
            let store = FileStore::open(config.clone()).expect("store should reopen");
            assert_eq!(
                store.find_match("h1").as_deref(),
                Some("a.txt"),
                "index must survive a restart"
            );
            store.delete("a.txt").expect("delete should succeed");
            assert!(store.find_match("h1").is_none());
        }

        let store = FileStore::open(config).expect("store should reopen again");
        assert!(store.find_match("h1").is_none(), "deletion must survive a restart");
    }

    #[test]
    fn test_open_fails_on_corrupt_record_file() {
        let temp = TempDir::new().expect("temp dir should be created");
        let config = test_config(&temp);
        fs::create_dir_all(config.metadata_dir()).expect("metadata dir should be created");
        fs::write(config.record_file(), "][ definitely not json")
            .expect("record file should be writable");

        let err = FileStore::open(config).expect_err("open should refuse corrupt metadata");
        assert!(matches!(err, StoreError::CorruptMetadata { .. }));
    }

    #[test]
    fn test_persistence_failure_rolls_back_upload() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);

        force_save_error_for_current_thread();
        let err = store
            .upload("doomed.txt", "data".as_bytes(), None)
            .expect_err("upload should surface the save failure");
        assert!(matches!(err, StoreError::Persistence { .. }));

        assert!(
            !store.data_dir().join("doomed.txt").exists(),
            "content the index never saw must not linger"
        );
        assert!(store.snapshot().is_empty());

        store
            .upload("fine.txt", "data".as_bytes(), None)
            .expect("the store stays usable after a failed save");
    }

    #[test]
    fn test_persistence_failure_on_delete_keeps_stale_record() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = test_store(&temp);
        store
            .upload("a.txt", "hello".as_bytes(), Some("h1"))
            .expect("upload should succeed");

        force_save_error_for_current_thread();
        let err = store.delete("a.txt").expect_err("delete should surface the save failure");
        assert!(matches!(err, StoreError::Persistence { .. }));

        assert!(!store.data_dir().join("a.txt").exists(), "the file removal already happened");
        assert_eq!(
            store.snapshot().hash_for("a.txt"),
            Some("h1"),
            "the record outlives the file until a save goes through"
        );
    }

    #[test]
    fn test_concurrent_uploads_of_distinct_names() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = Arc::new(test_store(&temp));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let name = format!("file-{i}.txt");
                let content = format!("content {i}");
                store
                    .upload(&name, content.as_bytes(), None)
                    .expect("upload should succeed");
            }));
        }
        for handle in handles {
            handle.join().expect("thread should not panic");
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 8);
        for i in 0..8 {
            let name = format!("file-{i}.txt");
            let occurrences = snapshot
                .records()
                .iter()
                .filter(|r| r.file_name == name)
                .count();
            assert_eq!(occurrences, 1, "{name} must appear exactly once");
            assert!(store.data_dir().join(&name).is_file());
        }

        let temp_path = temp.path().to_path_buf();
        drop(store);
        let reopened = FileStore::open(
            StoreConfig::new(temp_path.join("uploads"), temp_path.join("metadata"))
                .expect("test layout should be valid"),
        )
        .expect("store should reopen");
        assert_eq!(reopened.snapshot().len(), 8, "all records must reach disk");
    }

    #[test]
    fn test_concurrent_uploads_of_the_same_name_store_once() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = Arc::new(test_store(&temp));
        let barrier = Arc::new(Barrier::new(2));

        let mut handles = Vec::new();
        for i in 0..2 {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                let content = format!("from thread {i}");
                barrier.wait();
                store.upload("contested.txt", content.as_bytes(), None)
            }));
        }
        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .collect();

        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::Conflict(_))))
            .count();
        assert_eq!(wins, 1, "exactly one upload claims the name");
        assert_eq!(conflicts, 1, "the loser sees a conflict");
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn test_update_delete_race_keeps_disk_and_index_in_step() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = Arc::new(test_store(&temp));

        for round in 0..40 {
            let updater = {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let content = format!("round {round}");
                    store
                        .update("contested.txt", content.as_bytes())
                        .expect("update should succeed");
                })
            };
            let deleter = {
                let store = Arc::clone(&store);
                thread::spawn(move || match store.delete("contested.txt") {
                    Ok(()) | Err(StoreError::NotFound(_)) => {}
                    Err(e) => panic!("unexpected delete failure: {e:?}"),
                })
            };
            updater.join().expect("thread should not panic");
            deleter.join().expect("thread should not panic");

            let on_disk = store.data_dir().join("contested.txt").is_file();
            let indexed = store.snapshot().hash_for("contested.txt").is_some();
            assert_eq!(on_disk, indexed, "round {round}: file and record must agree");
        }
    }

    #[test]
    fn test_opposing_copies_progress_without_deadlock() {
        let temp = TempDir::new().expect("temp dir should be created");
        let store = Arc::new(test_store(&temp));
        store
            .upload("left.txt", "left content".as_bytes(), None)
            .expect("upload should succeed");
        store
            .upload("right.txt", "right content".as_bytes(), None)
            .expect("upload should succeed");

        let forward = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..100 {
                    store
                        .copy_file("left.txt", "right.txt", None)
                        .expect("copy should succeed");
                }
            })
        };
        let backward = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..100 {
                    store
                        .copy_file("right.txt", "left.txt", None)
                        .expect("copy should succeed");
                }
            })
        };
        forward.join().expect("thread should not panic");
        backward.join().expect("thread should not panic");

        // both locks are held across write and upsert, so the final record
        // for each name must describe exactly the bytes on disk
        let snapshot = store.snapshot();
        for name in ["left.txt", "right.txt"] {
            let mut file =
                fs::File::open(store.data_dir().join(name)).expect("file should exist");
            let on_disk = crate::digest::hash_reader(&mut file).expect("file should hash");
            assert_eq!(
                snapshot.hash_for(name),
                Some(on_disk.as_str()),
                "{name} record must describe the bytes on disk"
            );
        }
    }
}
