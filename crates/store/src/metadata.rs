//! Durable metadata store.
//!
//! The hash index persists as a single JSON record file, a plain array of
//! `{"fileName": …, "hash": …}` objects. Saves are full rewrites through a
//! temp file in the same directory followed by a rename, so an interrupted
//! save leaves the previous snapshot intact and loadable.
//!
//! [`DurableIndex`] layers the write-through discipline on top: a mutation
//! is applied to a working copy of the index, saved, and only then swapped
//! into memory, all under one exclusive lock. A failed save therefore never
//! leaves memory ahead of disk.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::index::{HashIndex, HashRecord};

#[cfg(test)]
use std::collections::HashSet;
#[cfg(test)]
use std::sync::LazyLock;

/// Thread ids for which the next [`MetadataStore::save`] call fails.
///
/// Keyed by thread id so parallel tests cannot trip each other's forced
/// failures. Entries are consumed by the save call that observes them.
#[cfg(test)]
static FORCE_SAVE_ERROR_FOR_THREADS: LazyLock<Mutex<HashSet<std::thread::ThreadId>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Makes the next save on the current thread fail with an i/o error.
#[cfg(test)]
pub(crate) fn force_save_error_for_current_thread() {
    FORCE_SAVE_ERROR_FOR_THREADS
        .lock()
        .insert(std::thread::current().id());
}

/// Reads and writes the hash index record file.
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the record file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted index.
    ///
    /// A missing, empty or whitespace-only record file is a legitimate fresh
    /// state and loads as an empty index.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CorruptMetadata`] when the file holds content
    /// that does not parse as a record array; callers are expected to treat
    /// that as fatal rather than start from an empty index and later
    /// overwrite records they could not read.
    pub fn load(&self) -> StoreResult<HashIndex> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashIndex::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };
        if raw.iter().all(|byte| byte.is_ascii_whitespace()) {
            return Ok(HashIndex::new());
        }

        let records: Vec<HashRecord> =
            serde_json::from_slice(&raw).map_err(|e| StoreError::CorruptMetadata {
                path: self.path.clone(),
                source: e,
            })?;
        Ok(HashIndex::from_records(records))
    }

    /// Rewrites the record file with the full contents of `index`.
    ///
    /// The snapshot is written to a sibling temp file, synced, and renamed
    /// over the record file. Callers serialise saves through
    /// [`DurableIndex`], so the fixed temp name cannot collide.
    ///
    /// # Errors
    ///
    /// Every failure on this path is [`StoreError::Persistence`].
    pub fn save(&self, index: &HashIndex) -> StoreResult<()> {
        #[cfg(test)]
        {
            if FORCE_SAVE_ERROR_FOR_THREADS
                .lock()
                .remove(&std::thread::current().id())
            {
                return Err(self.persistence(io::Error::other("forced save failure (test hook)")));
            }
        }

        let bytes = serde_json::to_vec_pretty(index.records())
            .map_err(|e| self.persistence(io::Error::other(e)))?;

        let tmp = self.temp_path();
        if let Err(e) = write_snapshot(&tmp, &bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(self.persistence(e));
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(self.persistence(e));
        }
        Ok(())
    }

    /// Sibling of the record file so the rename never crosses filesystems.
    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn persistence(&self, source: io::Error) -> StoreError {
        StoreError::Persistence {
            path: self.path.clone(),
            source,
        }
    }
}

fn write_snapshot(tmp: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(tmp)?;
    file.write_all(bytes)?;
    // the rename must publish a complete snapshot
    file.sync_all()?;
    Ok(())
}

/// The hash index and its record file behind one exclusive lock.
///
/// Every mutation goes clone, mutate, save, swap; the in-memory index only
/// advances once the record file holds the new state.
#[derive(Debug)]
pub struct DurableIndex {
    index: Mutex<HashIndex>,
    store: MetadataStore,
}

impl DurableIndex {
    /// Loads the persisted index and wraps it for shared use.
    ///
    /// # Errors
    ///
    /// Propagates [`MetadataStore::load`] failures, including
    /// [`StoreError::CorruptMetadata`].
    pub fn open(store: MetadataStore) -> StoreResult<Self> {
        let index = store.load()?;
        Ok(Self {
            index: Mutex::new(index),
            store,
        })
    }

    /// Path of the backing record file.
    pub fn record_path(&self) -> &Path {
        self.store.path()
    }

    /// Name of the first record carrying `hash`, in insertion order.
    pub fn find_match(&self, hash: &str) -> Option<String> {
        self.index.lock().lookup_by_hash(hash).map(str::to_owned)
    }

    /// Point-in-time copy of the index.
    pub fn snapshot(&self) -> HashIndex {
        self.index.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.lock().is_empty()
    }

    /// Inserts or replaces the record for `record.file_name`, write-through.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the record file cannot be
    /// rewritten; the in-memory index is left unchanged in that case.
    pub fn upsert(&self, record: HashRecord) -> StoreResult<()> {
        let mut guard = self.index.lock();
        let mut working = guard.clone();
        working.upsert(record);
        self.store.save(&working)?;
        *guard = working;
        Ok(())
    }

    /// Removes the record for `file_name`, write-through, returning it.
    ///
    /// Removing a name with no record is a no-op and skips the save.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the record file cannot be
    /// rewritten; the in-memory index is left unchanged in that case.
    pub fn remove(&self, file_name: &str) -> StoreResult<Option<HashRecord>> {
        let mut guard = self.index.lock();
        let mut working = guard.clone();
        match working.remove_by_file_name(file_name) {
            Some(record) => {
                self.store.save(&working)?;
                *guard = working;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}
