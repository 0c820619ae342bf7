//! Streaming byte-string comparison.
//!
//! Keys on disk are compared without materializing them: the right-hand side
//! is any `Read` source and is pulled in fixed-size chunks.

use std::cmp::Ordering;
use std::io::{ErrorKind, Read};

/// Number of bytes pulled from the reader per step.
pub const COMPARE_CHUNK_SIZE: usize = 1024;

/// Compare `lhs` against the bytes produced by `rhs`, lexicographically.
///
/// A strict prefix orders before the longer string.
///
/// # Errors
///
/// Returns any read error other than `Interrupted`, which is retried.
pub fn compare<R: Read>(lhs: &[u8], rhs: R) -> std::io::Result<Ordering> {
    let mut chunk = [0u8; COMPARE_CHUNK_SIZE];
    compare_with_buffer(lhs, rhs, &mut chunk)
}

/// Like [`compare`], reading at most `chunk_size` bytes per call.
///
/// # Errors
///
/// Returns any read error other than `Interrupted`, which is retried.
pub fn compare_chunked<R: Read>(
    lhs: &[u8],
    rhs: R,
    chunk_size: usize,
) -> std::io::Result<Ordering> {
    let mut chunk = vec![0u8; chunk_size.max(1)];
    compare_with_buffer(lhs, rhs, &mut chunk)
}

fn compare_with_buffer<R: Read>(
    lhs: &[u8],
    mut rhs: R,
    chunk: &mut [u8],
) -> std::io::Result<Ordering> {
    let mut rest = lhs;

    loop {
        let read = match rhs.read(chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        // End of input.
        if read == 0 {
            return Ok(if rest.is_empty() {
                Ordering::Equal
            } else {
                Ordering::Greater
            });
        }

        let common = rest.len().min(read);
        match rest[..common].cmp(&chunk[..common]) {
            Ordering::Equal => {}
            other => return Ok(other),
        }

        if rest.len() < read {
            return Ok(Ordering::Less);
        }
        rest = &rest[read..];
    }
}
