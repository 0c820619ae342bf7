// Life of a request:
// 1. Bytes arrive on a connection and are decoded into `$`-framed messages
// 2. Messages are validated into get or put requests
// 3. Get walks the B-tree from the root, one page per level
//    Put splits full nodes on the way down, then writes into a leaf
// 4. Nodes are read from and written to fixed-size pages of one file
//
// System components:
//  - Wire decoder and TCP listener
//  - B-tree over variable-length byte keys
//  - Paged node storage with a free-page list
#![cfg_attr(test, allow(clippy::disallowed_methods))]

pub mod config;
pub mod server;
pub mod simulation;
pub mod storage;

mod e2e_tests;
