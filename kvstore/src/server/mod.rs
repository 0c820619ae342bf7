//! TCP front end for the key/value store.
//!
//! Clients speak a small `$`-framed protocol (see [`wire`]). Every connection
//! is served by its own task; store calls run on the blocking thread pool.

mod listener;
pub mod wire;

use std::collections::HashMap;
use std::sync::RwLock;

use crate::storage::{BTree, BTreeError, Storage};

pub use listener::serve;

/// The operations the server needs from a store.
pub trait KeyValueStore: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Value stored under `key`, if any.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Self::Error>;
}

impl<S: Storage + Send + 'static> KeyValueStore for BTree<S> {
    type Error = BTreeError;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Self::Error> {
        Self::get(self, key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Self::Error> {
        Self::put(self, key, value)
    }
}

/// Errors from [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryStoreError {
    /// A thread panicked while holding the map lock.
    LockPoisoned,
}

impl std::fmt::Display for MemoryStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LockPoisoned => write!(f, "memory store lock poisoned"),
        }
    }
}

impl std::error::Error for MemoryStoreError {}

/// A map-backed store, for exercising the network layer without pages.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    type Error = MemoryStoreError;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Self::Error> {
        let entries = self
            .entries
            .read()
            .map_err(|_| MemoryStoreError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Self::Error> {
        self.entries
            .write()
            .map_err(|_| MemoryStoreError::LockPoisoned)?
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}
