//! In-memory hash index.
//!
//! The index is an insertion-ordered collection of filename to content-hash
//! records, at most one record per file name. It is the authoritative view
//! the rest of the store queries; durability is layered on top by
//! [`crate::metadata`].

use serde::{Deserialize, Serialize};

/// A single filename to content-hash association.
///
/// Serialised with camelCase field names; the persisted record file is a
/// plain JSON array of these objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashRecord {
    /// Storage-relative path identifying the stored file.
    pub file_name: String,
    /// Content digest. Lowercase sha-256 hex when computed by the store;
    /// callers may supply their own opaque printable identifier instead.
    pub hash: String,
}

impl HashRecord {
    pub fn new(file_name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            hash: hash.into(),
        }
    }
}

/// Insertion-ordered set of hash records, keyed by file name.
///
/// Two files with identical content legitimately produce two records with
/// the same hash; [`HashIndex::lookup_by_hash`] resolves such ties by
/// returning the earliest surviving record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashIndex {
    records: Vec<HashRecord>,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from loaded records.
    ///
    /// Records are applied in order through [`HashIndex::upsert`], so a
    /// record file written by an older append-only implementation collapses
    /// to one record per name, keeping the first position and the last hash.
    pub fn from_records(records: Vec<HashRecord>) -> Self {
        let mut index = Self::new();
        for record in records {
            index.upsert(record);
        }
        index
    }

    /// Records in insertion order.
    pub fn records(&self) -> &[HashRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Name of the first record carrying `hash`, in insertion order.
    pub fn lookup_by_hash(&self, hash: &str) -> Option<&str> {
        self.records
            .iter()
            .find(|record| record.hash == hash)
            .map(|record| record.file_name.as_str())
    }

    /// Hash recorded for `file_name`, if any.
    pub fn hash_for(&self, file_name: &str) -> Option<&str> {
        self.records
            .iter()
            .find(|record| record.file_name == file_name)
            .map(|record| record.hash.as_str())
    }

    /// Replaces the hash of an existing record for the same name, keeping
    /// its position, or appends a new record.
    pub fn upsert(&mut self, record: HashRecord) {
        match self
            .records
            .iter_mut()
            .find(|existing| existing.file_name == record.file_name)
        {
            Some(existing) => existing.hash = record.hash,
            None => self.records.push(record),
        }
    }

    /// Removes the record for `file_name` and returns it. Removing a name
    /// with no record is a no-op.
    pub fn remove_by_file_name(&mut self, file_name: &str) -> Option<HashRecord> {
        let position = self
            .records
            .iter()
            .position(|record| record.file_name == file_name)?;
        Some(self.records.remove(position))
    }
}
