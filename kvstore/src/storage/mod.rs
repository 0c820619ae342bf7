//! Single-file paged storage for the key/value store.
//!
//! # File Format
//!
//! The store is one file: an 8-byte header followed by fixed-size pages,
//! one B-tree node per page.
//!
//! - Bytes 0-3: layout version
//! - Bytes 4-7: root node id
//! - Page `i`: bytes `8 + i * page_size` up to `8 + (i + 1) * page_size`
//!
//! # Usage
//!
//! ```ignore
//! use storage::{BTree, NodeStorage, PageLayout, StorageFile};
//!
//! let file = StorageFile::open_or_create(path)?;
//! let nodes = NodeStorage::open_or_create(file, PageLayout::new(1024, 11))?;
//! let tree = BTree::new(nodes, 11)?;
//!
//! tree.put(b"key", b"value")?;
//! tree.close()?;
//! ```

pub mod btree;
mod file;
mod header;
mod io;
mod node_storage;
mod stats;

pub use btree::{BTree, BTreeError, NodeId, PageLayout};
pub use file::StorageFile;
pub use header::{FileHeader, HEADER_SIZE, HeaderError, LAYOUT_VERSION};
pub use io::{Storage, StorageError};
pub use node_storage::{ALLOCATION_BATCH_PAGES, NodeStorage, NodeStorageError};
pub use stats::Statistics;
