//! Test: a store survives close and reopen.

use super::helpers::{open_file_tree, shuffled_entries, temp_store_path};
use crate::storage::{
    ALLOCATION_BATCH_PAGES, BTree, NodeStorage, NodeStorageError, PageLayout, StorageFile,
};

#[test]
fn test_reopen_keeps_entries_and_free_pages() {
    let (_dir, path) = temp_store_path();
    let first = shuffled_entries(0..300, 1);

    let tree = open_file_tree(&path, 256, 3);
    for (key, value) in &first {
        tree.put(key, value).expect("put");
    }
    let height = tree.height().expect("height");
    assert!(height > 2, "height {height}");
    let free_before = tree.free_page_ids().expect("free pages");
    let mut storage = tree.into_node_storage().expect("into storage");
    let root_before = storage.root_id();
    let pages_before = storage.page_count();
    storage.close().expect("close");

    let tree = open_file_tree(&path, 256, 3);
    assert_eq!(tree.free_page_ids().expect("free pages"), free_before);
    let reopened = tree.into_node_storage().expect("into storage");
    assert_eq!(reopened.root_id(), root_before);
    assert_eq!(reopened.page_count(), pages_before);
    let tree = BTree::new(reopened, 3).expect("build tree");
    assert_eq!(tree.height().expect("height"), height);
    for (key, value) in &first {
        assert_eq!(tree.get(key).expect("get").as_deref(), Some(value.as_slice()));
    }

    let second = shuffled_entries(300..600, 2);
    for (key, value) in &second {
        tree.put(key, value).expect("put");
    }
    for (key, value) in first.iter().chain(&second) {
        assert_eq!(tree.get(key).expect("get").as_deref(), Some(value.as_slice()));
    }
    tree.close().expect("close");

    let storage = open_file_tree(&path, 256, 3)
        .into_node_storage()
        .expect("into storage");
    assert!(storage.page_count() >= pages_before);
    assert_eq!(storage.page_count() % ALLOCATION_BATCH_PAGES, 0);
}

#[test]
fn test_reopen_sees_updates() {
    let (_dir, path) = temp_store_path();

    let tree = open_file_tree(&path, 1024, 11);
    tree.put(b"color", b"red").expect("put");
    tree.put(b"shape", b"square").expect("put");
    tree.close().expect("close");

    let tree = open_file_tree(&path, 1024, 11);
    tree.put(b"color", b"blue").expect("put");
    tree.close().expect("close");

    let tree = open_file_tree(&path, 1024, 11);
    assert_eq!(tree.get(b"color").expect("get"), Some(b"blue".to_vec()));
    assert_eq!(tree.get(b"shape").expect("get"), Some(b"square".to_vec()));
    assert_eq!(tree.get(b"size").expect("get"), None);
}

#[test]
fn test_reopen_rejects_other_page_size() {
    let (_dir, path) = temp_store_path();

    let tree = open_file_tree(&path, 1024, 11);
    tree.put(b"k", b"v").expect("put");
    tree.close().expect("close");

    // 8 + 100 * 1024 bytes is not a whole number of 1000-byte pages.
    let file = StorageFile::open(&path).expect("open file");
    let result = NodeStorage::open(file, PageLayout::new(1000, 11));
    assert!(matches!(
        result,
        Err(NodeStorageError::InvalidFileSize { .. })
    ));
}
