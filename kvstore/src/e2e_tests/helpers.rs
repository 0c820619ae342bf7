//! Common helpers for end-to-end tests.

use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tempfile::TempDir;

use crate::simulation::SimulatedStorage;
use crate::storage::{BTree, NodeStorage, PageLayout, StorageFile};

/// A fresh directory plus the path of a store file inside it. The file
/// is removed when the directory guard drops.
pub fn temp_store_path() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("store.db");
    (dir, path)
}

/// Open the store at `path`, creating it if missing.
pub fn open_file_tree(path: &Path, page_size: u32, max_keys: u32) -> BTree<StorageFile> {
    let file = StorageFile::open_or_create(path).expect("open store file");
    let storage = NodeStorage::open_or_create(file, PageLayout::new(page_size, max_keys))
        .expect("open node storage");
    BTree::new(storage, max_keys as usize).expect("build tree")
}

/// A tree over fault-free simulated storage.
pub fn simulated_tree(page_size: u32, max_keys: u32) -> BTree<SimulatedStorage> {
    let storage = NodeStorage::create(
        SimulatedStorage::new(42),
        PageLayout::new(page_size, max_keys),
    )
    .expect("create node storage");
    BTree::new(storage, max_keys as usize).expect("build tree")
}

/// Entries `key-<i>` -> `value-<i>` for `i` in `range`, shuffled with `seed`.
pub fn shuffled_entries(range: std::ops::Range<usize>, seed: u64) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut entries: Vec<(Vec<u8>, Vec<u8>)> = range
        .map(|i| {
            (
                format!("key-{i:05}").into_bytes(),
                format!("value-{i}").into_bytes(),
            )
        })
        .collect();
    entries.shuffle(&mut StdRng::seed_from_u64(seed));
    entries
}
