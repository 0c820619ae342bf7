//! Storage abstraction for the node store.
//!
//! This module provides a `Storage` trait that abstracts over positional byte
//! I/O, allowing the node store to run on a real file in production and on
//! simulated in-memory storage in tests.
//!
//! # Design
//!
//! The trait is a minimal abstraction over the operations the node store
//! needs:
//! - Exact positional reads and writes
//! - Current length of the backing storage
//! - Synchronization
//!
//! Reads and writes are all-or-nothing from the caller's point of view: a
//! short read or short write is reported as an error and never retried or
//! padded.

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error.
    Io(std::io::Error),
    /// Fewer bytes than requested were read.
    ShortRead {
        offset: u64,
        expected: usize,
        read: usize,
    },
    /// Fewer bytes than requested were written.
    ShortWrite {
        offset: u64,
        expected: usize,
        written: usize,
    },
    /// Injected fault for simulation.
    InjectedFault(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::ShortRead {
                offset,
                expected,
                read,
            } => write!(
                f,
                "short read at offset {offset}: read {read} of {expected} bytes"
            ),
            Self::ShortWrite {
                offset,
                expected,
                written,
            } => write!(
                f,
                "short write at offset {offset}: wrote {written} of {expected} bytes"
            ),
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Abstraction over positional byte storage.
///
/// # Implementation Notes
///
/// Implementations must ensure:
/// - `read_at` fills the whole buffer or fails
/// - `write_at` writes the whole slice or fails; writing past the current end
///   extends the storage, zero-filling any gap
/// - `len` reflects every successful write
pub trait Storage {
    /// Read exactly `buf.len()` bytes starting at `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Write all of `data` starting at `offset`.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), StorageError>;

    /// Current length of the storage in bytes.
    fn len(&self) -> Result<u64, StorageError>;

    /// Whether the storage holds no bytes at all.
    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Sync all pending writes to durable storage.
    fn sync(&mut self) -> Result<(), StorageError>;
}
