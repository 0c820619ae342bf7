//! Test: many threads writing to one file-backed tree.

use std::sync::Arc;
use std::thread;

use super::helpers::{open_file_tree, temp_store_path};

#[test]
fn test_concurrent_writers_then_reopen() {
    let (_dir, path) = temp_store_path();
    let tree = Arc::new(open_file_tree(&path, 512, 5));

    let handles: Vec<_> = (0..8)
        .map(|writer| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for i in 0..50 {
                    let key = format!("w{writer}-k{i:03}");
                    let value = format!("{writer}:{i}");
                    tree.put(key.as_bytes(), value.as_bytes()).expect("put");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer panicked");
    }

    tree.close().expect("close");
    drop(tree);

    let tree = open_file_tree(&path, 512, 5);
    for writer in 0..8 {
        for i in 0..50 {
            let key = format!("w{writer}-k{i:03}");
            let value = format!("{writer}:{i}");
            assert_eq!(
                tree.get(key.as_bytes()).expect("get"),
                Some(value.into_bytes()),
                "{key}"
            );
        }
    }
}

#[test]
fn test_readers_and_writers_interleave() {
    let (_dir, path) = temp_store_path();
    let tree = Arc::new(open_file_tree(&path, 512, 5));
    tree.put(b"stable", b"value").expect("put");

    let writer = {
        let tree = Arc::clone(&tree);
        thread::spawn(move || {
            for i in 0..200 {
                let key = format!("key-{i:03}");
                tree.put(key.as_bytes(), b"x").expect("put");
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for _ in 0..200 {
                    assert_eq!(tree.get(b"stable").expect("get"), Some(b"value".to_vec()));
                }
            })
        })
        .collect();

    writer.join().expect("writer panicked");
    for reader in readers {
        reader.join().expect("reader panicked");
    }
    assert_eq!(tree.get(b"key-199").expect("get"), Some(b"x".to_vec()));
}
