//! End-to-end tests across the storage, tree and server layers.
//!
//! Each test file covers one scenario: durability across reopen, concurrent
//! writers, the TCP protocol against a real tree, and behavior under
//! injected storage faults.

#![cfg(test)]

mod helpers;

mod test_concurrent_writers;
mod test_fault_injection;
mod test_long_keys;
mod test_reopen;
mod test_server_round_trip;
