//! # Depot Store
//!
//! Hash-indexed local file storage. Files live under a storage root with
//! client-supplied, storage-relative names; alongside them the store keeps
//! a durable index mapping each file name to a content hash, which makes
//! content lookups ("which file has this digest?") a single index scan
//! instead of a filesystem walk.
//!
//! ## Design
//!
//! - **Write-through index**: every mutation commits the index change to
//!   the record file before the in-memory view advances, so a crash never
//!   leaves memory ahead of disk.
//! - **Atomic record saves**: the record file is rewritten in full via a
//!   temp file and rename; an interrupted save leaves the previous
//!   snapshot loadable.
//! - **Streamed hashing**: content is hashed with sha-256 in the same pass
//!   that writes it, never buffered whole.
//! - **Per-name locking**: operations on the same name serialise,
//!   operations on distinct names run concurrently.
//!
//! ## Example
//!
//! ```no_run
//! use depot_store::{FileStore, StoreConfig};
//!
//! # fn main() -> Result<(), depot_store::StoreError> {
//! let store = FileStore::open(StoreConfig::new("./uploads", "./metadata")?)?;
//! let hash = store.upload("notes/hello.txt", "hello".as_bytes(), None)?;
//! assert_eq!(store.find_match(&hash).as_deref(), Some("notes/hello.txt"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod digest;
pub mod error;
pub mod index;
pub mod locks;
pub mod metadata;
pub mod store;

pub use config::{StoreConfig, DEFAULT_DATA_DIR, DEFAULT_METADATA_DIR, RECORD_FILE_NAME};
pub use error::{StoreError, StoreResult};
pub use index::{HashIndex, HashRecord};
pub use metadata::{DurableIndex, MetadataStore};
pub use store::FileStore;
