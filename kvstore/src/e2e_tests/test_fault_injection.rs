//! Test: the tree under injected storage faults.
//!
//! Faults must surface as errors, never as panics.

use crate::simulation::{FaultConfig, SimulatedStorage};
use crate::storage::{BTree, NodeStorage, PageLayout};

fn faulty_tree(seed: u64, config: FaultConfig) -> Option<BTree<SimulatedStorage>> {
    let storage = SimulatedStorage::with_config(seed, config);
    let storage = NodeStorage::create(storage, PageLayout::new(256, 3)).ok()?;
    Some(BTree::new(storage, 3).expect("build tree"))
}

#[test]
fn test_io_faults_surface_as_errors() {
    let config = FaultConfig {
        corruption_rate: 0.0,
        ..FaultConfig::high_faults()
    };

    let mut trees = 0;
    let mut failures = 0;
    for seed in 0..20 {
        let Some(tree) = faulty_tree(seed, config.clone()) else {
            continue;
        };
        trees += 1;

        for i in 0..200 {
            let key = format!("key-{:03}", (i * 37) % 200);
            if tree.put(key.as_bytes(), b"value").is_err() {
                failures += 1;
            }
            if tree.get(key.as_bytes()).is_err() {
                failures += 1;
            }
        }
        let _ = tree.close();
    }

    assert!(trees > 0, "every create failed");
    assert!(failures > 0, "no fault was injected");
}

#[test]
fn test_fault_free_baseline() {
    let tree = faulty_tree(7, FaultConfig::no_faults()).expect("create");
    for i in 0..200 {
        let key = format!("key-{i:03}");
        tree.put(key.as_bytes(), b"value").expect("put");
    }
    for i in 0..200 {
        let key = format!("key-{i:03}");
        assert_eq!(tree.get(key.as_bytes()).expect("get"), Some(b"value".to_vec()));
    }
    tree.close().expect("close");
}
