//! B-tree over byte keys, stored one node per page.
//!
//! # Structure
//!
//! - `compare`: streaming lexicographic comparison against a `Read` source
//! - `node`: page layout, tuple placement and compaction for a single node
//! - `tree`: search and split-before-descend insertion
//!
//! # Usage
//!
//! ```
//! use kvstore::simulation::SimulatedStorage;
//! use kvstore::storage::NodeStorage;
//! use kvstore::storage::btree::{BTree, PageLayout};
//!
//! let layout = PageLayout::new(1024, 11);
//! let storage = NodeStorage::create(SimulatedStorage::new(0), layout).unwrap();
//! let tree = BTree::new(storage, 11).unwrap();
//!
//! tree.put(b"key", b"value").unwrap();
//! assert_eq!(tree.get(b"key").unwrap(), Some(b"value".to_vec()));
//! assert_eq!(tree.get(b"other").unwrap(), None);
//! ```

mod compare;
mod node;
mod tree;

pub use compare::{COMPARE_CHUNK_SIZE, compare, compare_chunked};
pub use node::{
    ByteRange, FLAG_ALLOCATED, FLAG_LEAF, NO_CHILD, Node, NodeError, NodeId, PAGE_HEADER_SIZE,
    PageLayout, TUPLE_HEADER_SIZE, Tuple,
};
pub use tree::{BTree, BTreeError};
