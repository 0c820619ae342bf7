//! Test: keys longer than one comparison chunk.

use super::helpers::simulated_tree;
use crate::storage::btree::COMPARE_CHUNK_SIZE;

/// A key of `len` bytes that is all `a` except for `tag` at `position`.
fn long_key(len: usize, position: usize, tag: u8) -> Vec<u8> {
    let mut key = vec![b'a'; len];
    key[position] = tag;
    key
}

#[test]
fn test_keys_differing_past_first_chunk() {
    let tree = simulated_tree(65536, 3);
    let len = COMPARE_CHUNK_SIZE * 3;
    let position = COMPARE_CHUNK_SIZE * 2 + 17;

    let keys: Vec<Vec<u8>> = (b'b'..=b'k')
        .rev()
        .map(|tag| long_key(len, position, tag))
        .collect();
    for (i, key) in keys.iter().enumerate() {
        tree.put(key, i.to_string().as_bytes()).expect("put");
    }

    assert!(tree.height().expect("height") > 1);
    for (i, key) in keys.iter().enumerate() {
        assert_eq!(
            tree.get(key).expect("get"),
            Some(i.to_string().into_bytes())
        );
    }
    assert_eq!(tree.get(&long_key(len, position, b'z')).expect("get"), None);
    assert_eq!(tree.get(&long_key(len - 1, position, b'b')).expect("get"), None);
}

#[test]
fn test_prefix_keys_are_distinct() {
    let tree = simulated_tree(65536, 3);
    let base = vec![b'p'; COMPARE_CHUNK_SIZE + 1];

    for len in [1, 2, COMPARE_CHUNK_SIZE, COMPARE_CHUNK_SIZE + 1] {
        tree.put(&base[..len], len.to_string().as_bytes())
            .expect("put");
    }
    tree.put(b"", b"empty").expect("put");

    for len in [1, 2, COMPARE_CHUNK_SIZE, COMPARE_CHUNK_SIZE + 1] {
        assert_eq!(
            tree.get(&base[..len]).expect("get"),
            Some(len.to_string().into_bytes())
        );
    }
    assert_eq!(tree.get(b"").expect("get"), Some(b"empty".to_vec()));
    assert_eq!(tree.get(&base[..3]).expect("get"), None);
}
