//! File-backed storage.
//!
//! This module handles positional reads and writes against the store file.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
#[cfg(not(unix))]
use std::io::{Read, Seek, SeekFrom};
#[cfg(unix)]
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::storage::io::{Storage, StorageError};

/// A store file handle with low-level positional I/O.
pub struct StorageFile {
    file: File,
    path: PathBuf,
}

impl StorageFile {
    /// Create a new, empty store file at the given path.
    ///
    /// Returns an error if the file already exists.
    pub fn create(path: &Path) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing store file.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open the store file, creating an empty one if it doesn't exist.
    pub fn open_or_create(path: &Path) -> Result<Self, StorageError> {
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for StorageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageFile")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl StorageFile {
    /// Bytes the file holds in `[offset, offset + wanted)`.
    fn available_at(&self, offset: u64, wanted: usize) -> Result<usize, StorageError> {
        let available = self.file.metadata()?.len().saturating_sub(offset);
        Ok(usize::try_from(available).map_or(wanted, |available| available.min(wanted)))
    }

    #[cfg(unix)]
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(not(unix))]
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)
    }

    #[cfg(unix)]
    fn write_all_at(&mut self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    #[cfg(not(unix))]
    fn write_all_at(&mut self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)
    }
}

impl Storage for StorageFile {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        match self.read_exact_at(offset, buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(StorageError::ShortRead {
                offset,
                expected: buf.len(),
                read: self.available_at(offset, buf.len())?,
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), StorageError> {
        match self.write_all_at(offset, data) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WriteZero => Err(StorageError::ShortWrite {
                offset,
                expected: data.len(),
                written: self.available_at(offset, data.len())?,
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn len(&self) -> Result<u64, StorageError> {
        Ok(self.file.metadata()?.len())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_reopen() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.db");

        {
            let mut file = StorageFile::create(&path).expect("create file");
            assert_eq!(file.len().expect("len"), 0);
            file.write_at(0, b"hello").expect("write");
            file.sync().expect("sync");
        }

        {
            let mut file = StorageFile::open(&path).expect("open file");
            assert_eq!(file.len().expect("len"), 5);
            let mut buf = [0u8; 5];
            file.read_at(0, &mut buf).expect("read");
            assert_eq!(&buf, b"hello");
        }
    }

    #[test]
    fn test_create_already_exists() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.db");

        fs::write(&path, b"existing").expect("write file");

        let result = StorageFile::create(&path);
        assert!(matches!(result, Err(StorageError::Io(_))));
    }

    #[test]
    fn test_write_past_end_zero_fills() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.db");

        let mut file = StorageFile::create(&path).expect("create file");
        file.write_at(16, &[0xAB; 4]).expect("write");
        assert_eq!(file.len().expect("len"), 20);

        let mut buf = [0xFFu8; 20];
        file.read_at(0, &mut buf).expect("read");
        assert_eq!(&buf[..16], &[0u8; 16]);
        assert_eq!(&buf[16..], &[0xAB; 4]);
    }

    #[test]
    fn test_read_past_end_is_short_read() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.db");

        let mut file = StorageFile::create(&path).expect("create file");
        file.write_at(0, b"abc").expect("write");

        let mut buf = [0u8; 8];
        let result = file.read_at(0, &mut buf);
        assert!(matches!(
            result,
            Err(StorageError::ShortRead {
                expected: 8,
                read: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_large_write_round_trips() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.db");
        let mut file = StorageFile::create(&path).expect("create file");

        // As large as a batch of 100 pages of 64 KiB.
        let data: Vec<u8> = (0..100 * 65536).map(|i: usize| (i % 251) as u8).collect();
        file.write_at(8, &data).expect("write");
        assert_eq!(file.len().expect("len"), 8 + data.len() as u64);

        let mut buf = vec![0u8; data.len()];
        file.read_at(8, &mut buf).expect("read");
        assert_eq!(buf, data);

        let mut tail = [0u8; 16];
        assert!(matches!(
            file.read_at(data.len() as u64, &mut tail),
            Err(StorageError::ShortRead { read: 8, .. })
        ));
    }

    #[test]
    fn test_open_or_create() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.db");

        let file = StorageFile::open_or_create(&path).expect("create");
        assert_eq!(file.path(), path.as_path());
        drop(file);
        assert!(path.exists());

        let file = StorageFile::open_or_create(&path).expect("open");
        assert_eq!(file.len().expect("len"), 0);
    }
}
