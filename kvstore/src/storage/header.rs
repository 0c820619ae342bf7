//! File header structure and serialization.
//!
//! The header occupies the first 8 bytes of the store file and records the
//! layout version and the id of the current root node. All integers are
//! big-endian.

use crate::storage::btree::NodeId;

/// Current layout version.
pub const LAYOUT_VERSION: u32 = 1;

/// Size of the header in bytes. Page 0 starts right after it.
pub const HEADER_SIZE: usize = 8;

/// Header field offsets.
mod offsets {
    pub const LAYOUT_VERSION: usize = 0;
    pub const ROOT_NODE_ID: usize = 4;
}

/// Errors that can occur while decoding the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// The file was written with a layout this build doesn't understand.
    UnsupportedVersion(u32),
    /// Fewer than `HEADER_SIZE` bytes were supplied.
    Truncated { len: usize },
}

impl std::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedVersion(v) => write!(
                f,
                "unsupported layout version {v} (expected {LAYOUT_VERSION})"
            ),
            Self::Truncated { len } => {
                write!(f, "header truncated: {len} of {HEADER_SIZE} bytes")
            }
        }
    }
}

impl std::error::Error for HeaderError {}

/// The file header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Layout version number.
    pub layout_version: u32,
    /// Id of the page holding the root node.
    pub root_node_id: NodeId,
}

impl FileHeader {
    /// Create a header for the current layout pointing at `root_node_id`.
    #[must_use]
    pub const fn new(root_node_id: NodeId) -> Self {
        Self {
            layout_version: LAYOUT_VERSION,
            root_node_id,
        }
    }

    /// Serialize the header.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[offsets::LAYOUT_VERSION..offsets::LAYOUT_VERSION + 4]
            .copy_from_slice(&self.layout_version.to_be_bytes());
        buf[offsets::ROOT_NODE_ID..offsets::ROOT_NODE_ID + 4]
            .copy_from_slice(&self.root_node_id.to_be_bytes());
        buf
    }

    /// Deserialize and validate a header.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than `HEADER_SIZE` bytes are given or the
    /// layout version isn't `LAYOUT_VERSION`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < HEADER_SIZE {
            return Err(HeaderError::Truncated { len: bytes.len() });
        }

        let layout_version = read_u32(bytes, offsets::LAYOUT_VERSION);
        if layout_version != LAYOUT_VERSION {
            return Err(HeaderError::UnsupportedVersion(layout_version));
        }

        Ok(Self {
            layout_version,
            root_node_id: read_u32(bytes, offsets::ROOT_NODE_ID),
        })
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_be_bytes(buf)
}
