//! I/O counters for the node store.

/// Read and write counters, cumulative since the store was opened.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    /// Number of read calls issued against the storage.
    pub read_calls: u64,
    /// Total bytes read.
    pub bytes_read: u64,
    /// Number of write calls issued against the storage.
    pub write_calls: u64,
    /// Total bytes written.
    pub bytes_written: u64,
}

impl Statistics {
    /// Record one read of `bytes` bytes.
    pub const fn record_read(&mut self, bytes: usize) {
        self.read_calls += 1;
        self.bytes_read += bytes as u64;
    }

    /// Record one write of `bytes` bytes.
    pub const fn record_write(&mut self, bytes: usize) {
        self.write_calls += 1;
        self.bytes_written += bytes as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_accumulate() {
        let mut stats = Statistics::default();
        stats.record_read(1024);
        stats.record_read(4);
        stats.record_write(8);

        assert_eq!(
            stats,
            Statistics {
                read_calls: 2,
                bytes_read: 1028,
                write_calls: 1,
                bytes_written: 8,
            }
        );
    }
}
