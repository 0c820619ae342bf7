//! Simulated in-memory storage for deterministic testing.
//!
//! This module provides an in-memory implementation of the `Storage` trait
//! with support for fault injection:
//! - Read, write and sync errors
//! - Byte-level corruption (bit flips) on read
//! - Short writes that persist only a prefix of the data

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::storage::{Storage, StorageError};

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of a read error (0.0 - 1.0).
    pub read_error_rate: f64,
    /// Probability of a write error (0.0 - 1.0).
    pub write_error_rate: f64,
    /// Probability of a sync error (0.0 - 1.0).
    pub sync_error_rate: f64,
    /// Probability of corrupting the bytes returned by a read (0.0 - 1.0).
    pub corruption_rate: f64,
    /// Probability of a short write (0.0 - 1.0).
    pub short_write_rate: f64,
}

impl FaultConfig {
    /// Create a fault config with no faults (for baseline testing).
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    /// Create a fault config with low fault rates (for stress testing).
    #[must_use]
    pub const fn low_faults() -> Self {
        Self {
            read_error_rate: 0.001,
            write_error_rate: 0.001,
            sync_error_rate: 0.001,
            corruption_rate: 0.001,
            short_write_rate: 0.001,
        }
    }

    /// Create a fault config with high fault rates (for extreme testing).
    #[must_use]
    pub const fn high_faults() -> Self {
        Self {
            read_error_rate: 0.05,
            write_error_rate: 0.05,
            sync_error_rate: 0.05,
            corruption_rate: 0.05,
            short_write_rate: 0.05,
        }
    }
}

/// Statistics about simulated storage operations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimulatedStorageStats {
    /// Number of read calls.
    pub reads: u64,
    /// Number of write calls.
    pub writes: u64,
    /// Number of syncs.
    pub syncs: u64,
    /// Number of injected read errors.
    pub injected_read_errors: u64,
    /// Number of injected write errors.
    pub injected_write_errors: u64,
    /// Number of injected sync errors.
    pub injected_sync_errors: u64,
    /// Number of reads that returned corrupted bytes.
    pub corrupted_reads: u64,
    /// Number of short writes.
    pub short_writes: u64,
}

/// In-memory storage implementation for deterministic testing.
///
/// Bytes live in a single growable buffer. Given the same seed and the same
/// sequence of calls, the same faults are injected.
pub struct SimulatedStorage {
    data: Vec<u8>,
    fault_config: FaultConfig,
    rng: StdRng,
    stats: SimulatedStorageStats,
}

impl SimulatedStorage {
    /// Create a new simulated storage with the given seed and no faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, FaultConfig::default())
    }

    /// Create a new simulated storage with custom fault configuration.
    #[must_use]
    pub fn with_config(seed: u64, fault_config: FaultConfig) -> Self {
        Self {
            data: Vec::new(),
            fault_config,
            rng: StdRng::seed_from_u64(seed),
            stats: SimulatedStorageStats::default(),
        }
    }

    /// Get the current statistics.
    #[must_use]
    pub const fn stats(&self) -> &SimulatedStorageStats {
        &self.stats
    }

    /// Reset statistics.
    pub fn reset_stats(&mut self) {
        self.stats = SimulatedStorageStats::default();
    }

    /// Update the fault configuration.
    pub fn set_fault_config(&mut self, config: FaultConfig) {
        self.fault_config = config;
    }

    /// Raw contents, for inspecting what reached "disk".
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Check if a fault should be injected based on the given rate.
    fn should_inject_fault(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < rate
    }

    /// Flip 1-8 random bits in `buf`.
    fn corrupt(&mut self, buf: &mut [u8]) {
        if buf.is_empty() {
            return;
        }
        let num_flips = self.rng.random_range(1..=8);
        for _ in 0..num_flips {
            let byte_offset = self.rng.random_range(0..buf.len());
            let bit = self.rng.random_range(0..8u8);
            buf[byte_offset] ^= 1 << bit;
        }
    }

    fn write_bytes(&mut self, offset: usize, data: &[u8]) {
        let end = offset + data.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[offset..end].copy_from_slice(data);
    }
}

impl std::fmt::Debug for SimulatedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedStorage")
            .field("len", &self.data.len())
            .field("fault_config", &self.fault_config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Storage for SimulatedStorage {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        self.stats.reads += 1;

        if self.should_inject_fault(self.fault_config.read_error_rate) {
            self.stats.injected_read_errors += 1;
            return Err(StorageError::InjectedFault(
                "simulated read error".to_string(),
            ));
        }

        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(self.data.len());
        let available = self.data.len() - start;
        let read = available.min(buf.len());
        buf[..read].copy_from_slice(&self.data[start..start + read]);
        if read != buf.len() {
            return Err(StorageError::ShortRead {
                offset,
                expected: buf.len(),
                read,
            });
        }

        if self.should_inject_fault(self.fault_config.corruption_rate) {
            self.stats.corrupted_reads += 1;
            self.corrupt(buf);
        }

        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), StorageError> {
        self.stats.writes += 1;

        if self.should_inject_fault(self.fault_config.write_error_rate) {
            self.stats.injected_write_errors += 1;
            return Err(StorageError::InjectedFault(
                "simulated write error".to_string(),
            ));
        }

        let start = usize::try_from(offset)
            .map_err(|_| StorageError::InjectedFault(format!("offset {offset} too large")))?;

        if !data.is_empty() && self.should_inject_fault(self.fault_config.short_write_rate) {
            self.stats.short_writes += 1;
            let written = self.rng.random_range(0..data.len());
            self.write_bytes(start, &data[..written]);
            return Err(StorageError::ShortWrite {
                offset,
                expected: data.len(),
                written,
            });
        }

        self.write_bytes(start, data);
        Ok(())
    }

    fn len(&self) -> Result<u64, StorageError> {
        Ok(self.data.len() as u64)
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.stats.syncs += 1;

        if self.should_inject_fault(self.fault_config.sync_error_rate) {
            self.stats.injected_sync_errors += 1;
            return Err(StorageError::InjectedFault(
                "simulated sync error".to_string(),
            ));
        }

        // Writes are already "durable" in memory.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_read_write() {
        let mut storage = SimulatedStorage::new(42);
        assert!(storage.is_empty().expect("is_empty"));

        storage.write_at(4, b"data").expect("write");
        assert_eq!(storage.len().expect("len"), 8);
        assert_eq!(storage.as_bytes(), b"\0\0\0\0data");

        let mut buf = [0u8; 4];
        storage.read_at(4, &mut buf).expect("read");
        assert_eq!(&buf, b"data");
    }

    #[test]
    fn test_read_past_end() {
        let mut storage = SimulatedStorage::new(42);
        storage.write_at(0, b"abc").expect("write");

        let mut buf = [0u8; 4];
        assert!(matches!(
            storage.read_at(1, &mut buf),
            Err(StorageError::ShortRead {
                offset: 1,
                expected: 4,
                read: 2
            })
        ));
        assert!(matches!(
            storage.read_at(100, &mut buf),
            Err(StorageError::ShortRead { read: 0, .. })
        ));
    }

    #[test]
    fn test_deterministic_faults() {
        let config = FaultConfig {
            write_error_rate: 0.5,
            ..Default::default()
        };

        let outcomes = |seed| {
            let mut storage = SimulatedStorage::with_config(seed, config.clone());
            (0..32)
                .map(|i| storage.write_at(i, b"x").is_ok())
                .collect::<Vec<_>>()
        };

        let first = outcomes(12345);
        assert_eq!(first, outcomes(12345));
        assert!(first.iter().any(|ok| *ok));
        assert!(first.iter().any(|ok| !*ok));
    }

    #[test]
    fn test_short_write_persists_prefix() {
        let config = FaultConfig {
            short_write_rate: 1.0,
            ..Default::default()
        };
        let mut storage = SimulatedStorage::with_config(7, config);

        let result = storage.write_at(0, b"0123456789");
        let Err(StorageError::ShortWrite { written, .. }) = result else {
            panic!("expected short write, got {result:?}");
        };
        assert!(written < 10);
        assert_eq!(storage.as_bytes(), &b"0123456789"[..written]);
        assert_eq!(storage.stats().short_writes, 1);
    }

    #[test]
    fn test_corruption_flips_bits() {
        let config = FaultConfig {
            corruption_rate: 1.0,
            ..Default::default()
        };
        let mut storage = SimulatedStorage::with_config(9, config);
        storage.write_at(0, &[0u8; 64]).expect("write");

        let mut buf = [0u8; 64];
        storage.read_at(0, &mut buf).expect("read");
        assert!(buf.iter().any(|b| *b != 0));
        assert_eq!(storage.as_bytes(), &[0u8; 64]);
        assert_eq!(storage.stats().corrupted_reads, 1);
    }

    #[test]
    fn test_sync_errors() {
        let config = FaultConfig {
            sync_error_rate: 1.0,
            ..Default::default()
        };
        let mut storage = SimulatedStorage::with_config(1, config);
        assert!(matches!(
            storage.sync(),
            Err(StorageError::InjectedFault(_))
        ));
        assert_eq!(storage.stats().injected_sync_errors, 1);

        storage.set_fault_config(FaultConfig::no_faults());
        storage.sync().expect("sync");
        assert_eq!(storage.stats().syncs, 2);

        storage.reset_stats();
        assert_eq!(storage.stats(), &SimulatedStorageStats::default());
    }
}
