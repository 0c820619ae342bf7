//! Disk-resident B-tree over variable-length byte keys.
//!
//! Insertion splits full nodes on the way down, so a node is never split
//! after its parent has been passed. The root is split before descending,
//! which is the only place the tree grows in height.
//!
//! Splits copy the pivot key up: the pivot stays the first key of the new
//! right node and is also inserted into the parent. For an internal node
//! `child(i)` holds keys `< key(i)` and `child(i + 1)` holds keys `>= key(i)`.
//!
//! A split internal node keeps `[0, pivot)` and hands `[pivot, end)` to the
//! sibling, whose first child slot is the unused `NO_CHILD` sentinel. With
//! small `max_keys` this leaves right-hand nodes sparse, so ascending inserts
//! grow the height roughly by one level per `max_keys` keys, while
//! descending or random inserts stay logarithmic.
//!
//! Updating an existing key only rewrites its leaf: key counts and the
//! shape of the tree never change.

use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard};

use crate::storage::btree::compare::compare;
use crate::storage::btree::node::{NO_CHILD, Node, NodeId, TUPLE_HEADER_SIZE};
use crate::storage::io::Storage;
use crate::storage::node_storage::{NodeStorage, NodeStorageError};
use crate::storage::stats::Statistics;

/// Errors that can occur during B-tree operations.
#[derive(Debug)]
pub enum BTreeError {
    /// Node storage error.
    Storage(NodeStorageError),
    /// Reading a key for comparison failed.
    Compare(std::io::Error),
    /// `max_keys` is even, below 3, or above what the page layout holds.
    InvalidMaxKeys { max_keys: usize, limit: usize },
    /// The key and value don't fit the per-tuple budget.
    TupleTooLarge { size: usize, budget: usize },
    /// A thread panicked while holding the tree lock.
    LockPoisoned,
    /// An internal node pointed at the `NO_CHILD` sentinel.
    DanglingChild { parent: NodeId, index: usize },
}

impl std::fmt::Display for BTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Compare(e) => write!(f, "key comparison failed: {e}"),
            Self::InvalidMaxKeys { max_keys, limit } => write!(
                f,
                "max keys must be odd and between 3 and {limit}, got {max_keys}"
            ),
            Self::TupleTooLarge { size, budget } => write!(
                f,
                "key and value take {size} bytes, at most {budget} allowed"
            ),
            Self::LockPoisoned => write!(f, "tree lock poisoned"),
            Self::DanglingChild { parent, index } => {
                write!(f, "node {parent} has no child at index {index}")
            }
        }
    }
}

impl std::error::Error for BTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Compare(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NodeStorageError> for BTreeError {
    fn from(e: NodeStorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<std::io::Error> for BTreeError {
    fn from(e: std::io::Error) -> Self {
        Self::Compare(e)
    }
}

/// A B-tree backed by node storage.
///
/// All operations take one lock over the whole tree, so the handle can be
/// shared between threads.
pub struct BTree<S: Storage> {
    inner: Mutex<NodeStorage<S>>,
    max_keys: usize,
}

impl<S: Storage> BTree<S> {
    /// Build a tree over `storage` holding at most `max_keys` keys per node.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMaxKeys` unless `max_keys` is odd, at least 3, and no
    /// larger than the storage layout's `max_keys`.
    pub fn new(storage: NodeStorage<S>, max_keys: usize) -> Result<Self, BTreeError> {
        let limit = storage.layout().max_keys as usize;
        if max_keys < 3 || max_keys % 2 == 0 || max_keys > limit {
            return Err(BTreeError::InvalidMaxKeys { max_keys, limit });
        }

        Ok(Self {
            inner: Mutex::new(storage),
            max_keys,
        })
    }

    #[must_use]
    pub const fn max_keys(&self) -> usize {
        self.max_keys
    }

    /// Look up the value stored under `key`.
    ///
    /// Reads one page per level.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BTreeError> {
        let mut storage = self.lock()?;
        let root = storage.root_node()?;
        let (leaf, index, found) = find_leaf(&mut *storage, root, key)?;
        Ok(found.then(|| leaf.value(index - 1).to_vec()))
    }

    /// Insert `key` with `value`, replacing the value if the key exists.
    ///
    /// An update is found by a read-only descent first; only a new key
    /// splits full nodes on the way down.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), BTreeError> {
        let mut storage = self.lock()?;

        let size = TUPLE_HEADER_SIZE + key.len() + value.len();
        let budget = storage.layout().tuple_budget();
        if size > budget {
            return Err(BTreeError::TupleTooLarge { size, budget });
        }

        let root = storage.root_node()?;
        let root_id = root.id();
        let (mut leaf, index, found) = find_leaf(&mut *storage, root, key)?;
        if found {
            leaf.update_value(index - 1, value);
            storage.save_node(&mut leaf)?;
            return Ok(());
        }

        let mut node = if leaf.id() == root_id {
            leaf
        } else {
            storage.root_node()?
        };
        if node.key_count() == self.max_keys {
            let mut new_root = storage.allocate_root_node()?;
            split_child(&mut *storage, &mut new_root, 0, &mut node)?;
            node = new_root;
        }

        self.insert_non_full(&mut *storage, node, key, value)
    }

    /// Number of levels, counting the root as one.
    pub fn height(&self) -> Result<usize, BTreeError> {
        let mut storage = self.lock()?;
        let mut node = storage.root_node()?;
        let mut height = 1;

        while !node.is_leaf() {
            let rightmost = node.key_count();
            node = load_child(&mut *storage, &node, rightmost)?;
            height += 1;
        }
        Ok(height)
    }

    pub fn statistics(&self) -> Result<Statistics, BTreeError> {
        Ok(self.lock()?.statistics())
    }

    /// Ids of pages not holding a node, in ascending order.
    pub fn free_page_ids(&self) -> Result<Vec<NodeId>, BTreeError> {
        Ok(self.lock()?.free_page_ids())
    }

    /// Sync and release the underlying storage. Calling it again is a no-op.
    pub fn close(&self) -> Result<(), BTreeError> {
        self.lock()?.close()?;
        Ok(())
    }

    /// Give back the node storage.
    pub fn into_node_storage(self) -> Result<NodeStorage<S>, BTreeError> {
        self.inner.into_inner().map_err(|_| BTreeError::LockPoisoned)
    }

    /// Insert into the subtree rooted at `node`, which must not be full.
    fn insert_non_full(
        &self,
        storage: &mut NodeStorage<S>,
        mut node: Node,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), BTreeError> {
        loop {
            let (index, found) = locate(&node, key)?;

            if node.is_leaf() {
                if found {
                    node.update_value(index - 1, value);
                } else {
                    node.insert_key_value(key, value, index);
                }
                storage.save_node(&mut node)?;
                return Ok(());
            }

            let mut child = load_child(storage, &node, index)?;
            if child.key_count() == self.max_keys {
                let (pivot, sibling) = split_child(storage, &mut node, index, &mut child)?;
                if compare(key, pivot.as_slice())? != Ordering::Less {
                    child = sibling;
                }
            }
            node = child;
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, NodeStorage<S>>, BTreeError> {
        self.inner.lock().map_err(|_| BTreeError::LockPoisoned)
    }
}

impl<S: Storage> std::fmt::Debug for BTree<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BTree")
            .field("max_keys", &self.max_keys)
            .finish_non_exhaustive()
    }
}

/// Number of keys in `node` that are `<= key`, and whether the last of them
/// equals `key`.
fn locate(node: &Node, key: &[u8]) -> Result<(usize, bool), BTreeError> {
    for i in (0..node.key_count()).rev() {
        match compare(key, node.key(i))? {
            Ordering::Less => {}
            Ordering::Equal => return Ok((i + 1, true)),
            Ordering::Greater => return Ok((i + 1, false)),
        }
    }
    Ok((0, false))
}

/// Walk from `node` down to the leaf whose range covers `key`. Returns the
/// leaf along with the result of `locate` on it.
fn find_leaf<S: Storage>(
    storage: &mut NodeStorage<S>,
    mut node: Node,
    key: &[u8],
) -> Result<(Node, usize, bool), BTreeError> {
    loop {
        let (index, found) = locate(&node, key)?;
        if node.is_leaf() {
            return Ok((node, index, found));
        }
        node = load_child(storage, &node, index)?;
    }
}

fn load_child<S: Storage>(
    storage: &mut NodeStorage<S>,
    node: &Node,
    index: usize,
) -> Result<Node, BTreeError> {
    let id = node.child(index);
    if id == NO_CHILD {
        return Err(BTreeError::DanglingChild {
            parent: node.id(),
            index,
        });
    }
    Ok(storage.load_node(id)?)
}

/// Split the full `child`, found at `child_index` in `parent`, around its
/// middle key.
///
/// The pivot key goes into `parent` at `child_index` and the new right
/// sibling right after `child`. Parent, child and sibling are saved in that
/// order. Returns the pivot key and the sibling.
fn split_child<S: Storage>(
    storage: &mut NodeStorage<S>,
    parent: &mut Node,
    child_index: usize,
    child: &mut Node,
) -> Result<(Vec<u8>, Node), BTreeError> {
    let pivot = child.key_count() / 2;
    let pivot_key = child.key_full(pivot);
    let mut sibling = storage.allocate_node(child.is_leaf())?;

    parent.insert_key(&pivot_key, child_index);
    parent.insert_child(sibling.id(), child_index + 1);
    child.split_at(pivot, &mut sibling);

    storage.save_node(parent)?;
    storage.save_node(child)?;
    storage.save_node(&mut sibling)?;

    Ok((pivot_key, sibling))
}
