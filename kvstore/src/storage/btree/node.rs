//! B-tree node types and page serialization.
//!
//! One node occupies one page. The page layout is:
//!
//! ```text
//! [0]                     flags (bit 0 = allocated, bit 1 = leaf)
//! [1..5)                  tuple count (u32)
//! [5..5+8n)               offset table, one {start: u32, end: u32} per tuple
//! [5+8n..5+8n+4(n+1))     child ids (internal nodes only)
//! ...                     free space
//! [..page_size)           tuples, packed downward from the page end
//! ```
//!
//! A tuple is a `u32` key length followed by the key and the value. Internal
//! tuples have an empty value. All integers are big-endian.
//!
//! The header, offset table and child table together occupy a fixed reserved
//! region sized for `max_keys` tuples, so the tuple area never moves.

// Page sizes and offsets are u32 on disk; all in-memory sizes fit.
#![allow(clippy::cast_possible_truncation)]

/// Id of a node. Equal to the index of the page holding it.
pub type NodeId = u32;

/// Child id marking the absent left neighbor of a split-off internal node.
pub const NO_CHILD: NodeId = u32::MAX;

/// Flags byte plus tuple count.
pub const PAGE_HEADER_SIZE: usize = 5;

/// Flag bit set on every page that holds a node.
pub const FLAG_ALLOCATED: u8 = 0x01;

/// Flag bit set on leaf pages.
pub const FLAG_LEAF: u8 = 0x02;

/// Size of the key length prefix of a tuple.
pub const TUPLE_HEADER_SIZE: usize = 4;

const OFFSET_ENTRY_SIZE: usize = 8;
const CHILD_ENTRY_SIZE: usize = 4;

/// Page geometry shared by every node in a store file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    /// Page size in bytes.
    pub page_size: u32,
    /// Maximum number of tuples a node may hold.
    pub max_keys: u32,
}

impl PageLayout {
    #[must_use]
    pub const fn new(page_size: u32, max_keys: u32) -> Self {
        Self {
            page_size,
            max_keys,
        }
    }

    /// Bytes at the start of every page that tuples may not occupy.
    #[must_use]
    pub const fn reserved_bytes(&self) -> usize {
        let max_keys = self.max_keys as usize;
        PAGE_HEADER_SIZE + OFFSET_ENTRY_SIZE * max_keys + CHILD_ENTRY_SIZE * (max_keys + 1)
    }

    /// Largest tuple (length prefix, key and value) a node accepts, such
    /// that `max_keys` of them always fit in one page.
    #[must_use]
    pub const fn tuple_budget(&self) -> usize {
        let reserved = self.reserved_bytes();
        let page_size = self.page_size as usize;
        if self.max_keys == 0 || reserved >= page_size {
            return 0;
        }
        (page_size - reserved) / self.max_keys as usize
    }

    #[must_use]
    pub const fn page_size_usize(&self) -> usize {
        self.page_size as usize
    }

    /// Check that the layout can hold `max_keys` minimal tuples.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::InvalidLayout` if `max_keys` is zero or the
    /// per-tuple budget can't hold a tuple header.
    pub const fn validate(&self) -> Result<(), NodeError> {
        if self.max_keys == 0 || self.tuple_budget() < TUPLE_HEADER_SIZE {
            return Err(NodeError::InvalidLayout {
                page_size: self.page_size,
                max_keys: self.max_keys,
            });
        }
        Ok(())
    }
}

/// A half-open byte range `[start, end)` within a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u32,
    pub end: u32,
}

impl ByteRange {
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    const fn as_usize(self) -> std::ops::Range<usize> {
        self.start as usize..self.end as usize
    }
}

/// A key with its value, either already placed in the page or waiting to
/// be placed on the next save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tuple {
    Stored(ByteRange),
    Dirty { key: Vec<u8>, value: Vec<u8> },
}

/// Errors that can occur while decoding or encoding a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The page's allocated flag is clear.
    NotAllocated(NodeId),
    /// The page buffer doesn't match the layout's page size.
    PageSizeMismatch { expected: usize, actual: usize },
    /// More tuples than the layout allows.
    TooManyTuples { count: usize, max: usize },
    /// A tuple's byte range is out of bounds, overlaps another one, or
    /// can't hold its key.
    InvalidTupleOffsets { index: usize },
    /// An internal node doesn't have exactly one more child than keys.
    ChildCountMismatch { keys: usize, children: usize },
    /// Not enough free space left in the page, even after compaction.
    PageFull { needed: usize, available: usize },
    /// The page size can't hold `max_keys` tuples.
    InvalidLayout { page_size: u32, max_keys: u32 },
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAllocated(id) => write!(f, "page {id} does not hold a node"),
            Self::PageSizeMismatch { expected, actual } => {
                write!(f, "page buffer is {actual} bytes, expected {expected}")
            }
            Self::TooManyTuples { count, max } => {
                write!(f, "node holds {count} tuples, at most {max} allowed")
            }
            Self::InvalidTupleOffsets { index } => {
                write!(f, "invalid byte range for tuple {index}")
            }
            Self::ChildCountMismatch { keys, children } => write!(
                f,
                "internal node with {keys} keys has {children} children"
            ),
            Self::PageFull { needed, available } => write!(
                f,
                "page full: need {needed} bytes, {available} available"
            ),
            Self::InvalidLayout {
                page_size,
                max_keys,
            } => write!(
                f,
                "page size {page_size} cannot hold {max_keys} keys"
            ),
        }
    }
}

impl std::error::Error for NodeError {}

/// In-memory view of one node page.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    is_leaf: bool,
    layout: PageLayout,
    page: Vec<u8>,
    tuples: Vec<Tuple>,
    children: Vec<NodeId>,
}

impl Node {
    /// Create an empty node backed by a zeroed page.
    #[must_use]
    pub fn new(id: NodeId, is_leaf: bool, layout: PageLayout) -> Self {
        Self {
            id,
            is_leaf,
            layout,
            page: vec![0u8; layout.page_size_usize()],
            tuples: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Decode a node from its page bytes.
    ///
    /// Every byte range is bounds-checked, so accessors never read outside
    /// the page.
    ///
    /// # Errors
    ///
    /// Returns an error if the page is unallocated or malformed.
    pub fn from_page(id: NodeId, layout: PageLayout, page: Vec<u8>) -> Result<Self, NodeError> {
        let page_size = layout.page_size_usize();
        if page.len() != page_size {
            return Err(NodeError::PageSizeMismatch {
                expected: page_size,
                actual: page.len(),
            });
        }

        let flags = page[0];
        if flags & FLAG_ALLOCATED == 0 {
            return Err(NodeError::NotAllocated(id));
        }
        let is_leaf = flags & FLAG_LEAF != 0;

        let count = read_u32(&page, 1) as usize;
        let max_keys = layout.max_keys as usize;
        if count > max_keys {
            return Err(NodeError::TooManyTuples {
                count,
                max: max_keys,
            });
        }

        let reserved = layout.reserved_bytes();
        let mut tuples = Vec::with_capacity(count);
        for index in 0..count {
            let entry = PAGE_HEADER_SIZE + OFFSET_ENTRY_SIZE * index;
            let range = ByteRange::new(read_u32(&page, entry), read_u32(&page, entry + 4));
            let (start, end) = (range.start as usize, range.end as usize);

            if start < reserved || start + TUPLE_HEADER_SIZE > end || end > page_size {
                return Err(NodeError::InvalidTupleOffsets { index });
            }
            let key_len = read_u32(&page, start) as usize;
            if key_len > end - start - TUPLE_HEADER_SIZE {
                return Err(NodeError::InvalidTupleOffsets { index });
            }
            tuples.push(Tuple::Stored(range));
        }

        let mut ranges: Vec<(usize, ByteRange)> = tuples
            .iter()
            .enumerate()
            .filter_map(|(i, t)| match t {
                Tuple::Stored(r) => Some((i, *r)),
                Tuple::Dirty { .. } => None,
            })
            .collect();
        ranges.sort_by_key(|(_, r)| r.start);
        for pair in ranges.windows(2) {
            if pair[0].1.end > pair[1].1.start {
                return Err(NodeError::InvalidTupleOffsets { index: pair[1].0 });
            }
        }

        let children = if is_leaf {
            Vec::new()
        } else {
            let base = PAGE_HEADER_SIZE + OFFSET_ENTRY_SIZE * count;
            (0..=count)
                .map(|j| read_u32(&page, base + CHILD_ENTRY_SIZE * j))
                .collect()
        };

        Ok(Self {
            id,
            is_leaf,
            layout,
            page,
            tuples,
            children,
        })
    }

    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    #[must_use]
    pub const fn layout(&self) -> PageLayout {
        self.layout
    }

    #[must_use]
    pub fn key_count(&self) -> usize {
        self.tuples.len()
    }

    /// Borrowed view of key `i`.
    #[must_use]
    pub fn key(&self, i: usize) -> &[u8] {
        match &self.tuples[i] {
            Tuple::Stored(range) => {
                let start = range.start as usize + TUPLE_HEADER_SIZE;
                let key_len = read_u32(&self.page, range.start as usize) as usize;
                &self.page[start..start + key_len]
            }
            Tuple::Dirty { key, .. } => key,
        }
    }

    /// Owned copy of key `i`.
    #[must_use]
    pub fn key_full(&self, i: usize) -> Vec<u8> {
        self.key(i).to_vec()
    }

    /// Value of tuple `i`. Always empty on internal nodes.
    #[must_use]
    pub fn value(&self, i: usize) -> &[u8] {
        match &self.tuples[i] {
            Tuple::Stored(range) => {
                let key_len = read_u32(&self.page, range.start as usize) as usize;
                let start = range.start as usize + TUPLE_HEADER_SIZE + key_len;
                &self.page[start..range.end as usize]
            }
            Tuple::Dirty { value, .. } => value,
        }
    }

    /// Child `i`, for `i` in `0..=key_count()`. Internal nodes only.
    #[must_use]
    pub fn child(&self, i: usize) -> NodeId {
        self.children[i]
    }

    /// Insert a key with no value at position `at`, shifting later tuples
    /// right.
    pub fn insert_key(&mut self, key: &[u8], at: usize) {
        self.insert_key_value(key, &[], at);
    }

    /// Insert a key and value at position `at`, shifting later tuples right.
    pub fn insert_key_value(&mut self, key: &[u8], value: &[u8], at: usize) {
        self.tuples.insert(
            at,
            Tuple::Dirty {
                key: key.to_vec(),
                value: value.to_vec(),
            },
        );
    }

    /// Insert a child id at position `at`, shifting later children right.
    pub fn insert_child(&mut self, child_id: NodeId, at: usize) {
        self.children.insert(at, child_id);
    }

    /// Replace the value of tuple `i`. Its old bytes become free space.
    pub fn update_value(&mut self, i: usize, value: &[u8]) {
        let key = self.key_full(i);
        self.tuples[i] = Tuple::Dirty {
            key,
            value: value.to_vec(),
        };
    }

    /// Move tuples `[pivot, end)` into `sibling`, which must be empty.
    ///
    /// On internal nodes children `[pivot + 1, end]` move as well, behind a
    /// leading `NO_CHILD`. The pivot key stays the first key of the sibling.
    pub fn split_at(&mut self, pivot: usize, sibling: &mut Self) {
        let moved = self.tuples.split_off(pivot);
        sibling.tuples = moved
            .into_iter()
            .map(|tuple| match tuple {
                Tuple::Stored(range) => {
                    let (key, value) = self.stored_parts(range);
                    Tuple::Dirty {
                        key: key.to_vec(),
                        value: value.to_vec(),
                    }
                }
                dirty @ Tuple::Dirty { .. } => dirty,
            })
            .collect();

        if !self.is_leaf {
            let mut children = Vec::with_capacity(self.children.len() - pivot);
            children.push(NO_CHILD);
            children.extend(self.children.split_off(pivot + 1));
            sibling.children = children;
        }
    }

    /// Byte ranges not used by the reserved region or any stored tuple,
    /// sorted by start.
    #[must_use]
    pub fn free_ranges(&self) -> Vec<ByteRange> {
        let mut used: Vec<ByteRange> = self
            .tuples
            .iter()
            .filter_map(|t| match t {
                Tuple::Stored(r) => Some(*r),
                Tuple::Dirty { .. } => None,
            })
            .collect();
        used.sort_by_key(|r| r.start);

        let mut free = Vec::new();
        let mut cursor = self.layout.reserved_bytes() as u32;
        for range in used {
            if range.start > cursor {
                free.push(ByteRange::new(cursor, range.start));
            }
            cursor = cursor.max(range.end);
        }
        if self.layout.page_size > cursor {
            free.push(ByteRange::new(cursor, self.layout.page_size));
        }
        free
    }

    /// Pack every stored tuple against the end of the page, leaving a single
    /// free range after the reserved region.
    pub fn defragment(&mut self) {
        let mut stored: Vec<(usize, ByteRange)> = self
            .tuples
            .iter()
            .enumerate()
            .filter_map(|(i, t)| match t {
                Tuple::Stored(r) => Some((i, *r)),
                Tuple::Dirty { .. } => None,
            })
            .collect();
        stored.sort_by_key(|(_, r)| std::cmp::Reverse(r.start));

        let mut cursor = self.layout.page_size;
        for (index, range) in stored {
            let start = cursor - range.len() as u32;
            self.page.copy_within(range.as_usize(), start as usize);
            self.tuples[index] = Tuple::Stored(ByteRange::new(start, cursor));
            cursor = start;
        }

        let reserved = self.layout.reserved_bytes();
        self.page[reserved..cursor as usize].fill(0);
    }

    /// Place dirty tuples and serialize the node into its page buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the node has too many tuples, an internal node's
    /// child count is off, or the tuples don't fit.
    pub(crate) fn encode(&mut self) -> Result<&[u8], NodeError> {
        let count = self.tuples.len();
        let max_keys = self.layout.max_keys as usize;
        if count > max_keys {
            return Err(NodeError::TooManyTuples {
                count,
                max: max_keys,
            });
        }
        if !self.is_leaf && self.children.len() != count + 1 {
            return Err(NodeError::ChildCountMismatch {
                keys: count,
                children: self.children.len(),
            });
        }

        self.place_dirty_tuples()?;

        let reserved = self.layout.reserved_bytes();
        self.page[..reserved].fill(0);

        let mut flags = FLAG_ALLOCATED;
        if self.is_leaf {
            flags |= FLAG_LEAF;
        }
        self.page[0] = flags;
        write_u32(&mut self.page, 1, count as u32);

        for (index, tuple) in self.tuples.iter().enumerate() {
            if let Tuple::Stored(range) = tuple {
                let entry = PAGE_HEADER_SIZE + OFFSET_ENTRY_SIZE * index;
                write_u32(&mut self.page, entry, range.start);
                write_u32(&mut self.page, entry + 4, range.end);
            }
        }

        let base = PAGE_HEADER_SIZE + OFFSET_ENTRY_SIZE * count;
        for (j, child) in self.children.iter().enumerate() {
            write_u32(&mut self.page, base + CHILD_ENTRY_SIZE * j, *child);
        }

        Ok(self.page.as_slice())
    }

    /// Write every dirty tuple into free space, highest free range first.
    fn place_dirty_tuples(&mut self) -> Result<(), NodeError> {
        let needed: usize = self
            .tuples
            .iter()
            .map(|t| match t {
                Tuple::Dirty { key, value } => TUPLE_HEADER_SIZE + key.len() + value.len(),
                Tuple::Stored(_) => 0,
            })
            .sum();
        if needed == 0 {
            return Ok(());
        }

        let mut free = self.free_ranges();
        let available: usize = free.iter().map(ByteRange::len).sum();
        if needed > available {
            return Err(NodeError::PageFull { needed, available });
        }

        let mut defragmented = false;
        let mut index = 0;
        while index < self.tuples.len() {
            let size = match &self.tuples[index] {
                Tuple::Dirty { key, value } => TUPLE_HEADER_SIZE + key.len() + value.len(),
                Tuple::Stored(_) => {
                    index += 1;
                    continue;
                }
            };

            let slot = free.iter_mut().rev().find(|r| r.len() >= size);
            let Some(slot) = slot else {
                if defragmented {
                    let largest = free.iter().map(ByteRange::len).max().unwrap_or(0);
                    return Err(NodeError::PageFull {
                        needed: size,
                        available: largest,
                    });
                }
                self.defragment();
                free = self.free_ranges();
                defragmented = true;
                continue;
            };

            let range = ByteRange::new(slot.end - size as u32, slot.end);
            slot.end = range.start;

            if let Tuple::Dirty { key, value } = &self.tuples[index] {
                write_tuple(&mut self.page[range.as_usize()], key, value);
            }
            self.tuples[index] = Tuple::Stored(range);
            index += 1;
        }
        Ok(())
    }

    fn stored_parts(&self, range: ByteRange) -> (&[u8], &[u8]) {
        let start = range.start as usize;
        let key_len = read_u32(&self.page, start) as usize;
        let key_start = start + TUPLE_HEADER_SIZE;
        (
            &self.page[key_start..key_start + key_len],
            &self.page[key_start + key_len..range.end as usize],
        )
    }
}

fn write_tuple(dest: &mut [u8], key: &[u8], value: &[u8]) {
    write_u32(dest, 0, key.len() as u32);
    let key_end = TUPLE_HEADER_SIZE + key.len();
    dest[TUPLE_HEADER_SIZE..key_end].copy_from_slice(key);
    dest[key_end..key_end + value.len()].copy_from_slice(value);
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_be_bytes(buf)
}

fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    // reserved = 5 + 8 * 3 + 4 * 4 = 45, budget = (256 - 45) / 3 = 70
    const SMALL: PageLayout = PageLayout::new(256, 3);

    fn reload(node: &mut Node) -> Node {
        let page = node.encode().expect("encode").to_vec();
        Node::from_page(node.id(), node.layout(), page).expect("decode")
    }

    #[test]
    fn test_layout_budget() {
        assert_eq!(SMALL.reserved_bytes(), 45);
        assert_eq!(SMALL.tuple_budget(), 70);
        assert!(SMALL.validate().is_ok());

        let default = PageLayout::new(1024, 11);
        assert_eq!(default.reserved_bytes(), 5 + 88 + 48);
        assert_eq!(default.tuple_budget(), (1024 - 141) / 11);
    }

    #[test]
    fn test_layout_rejects_tiny_pages() {
        assert_eq!(
            PageLayout::new(64, 11).validate(),
            Err(NodeError::InvalidLayout {
                page_size: 64,
                max_keys: 11
            })
        );
        assert!(PageLayout::new(1024, 0).validate().is_err());
    }

    #[test]
    fn test_leaf_round_trip() {
        let mut node = Node::new(4, true, SMALL);
        node.insert_key_value(b"Charles", b"Darwin", 0);
        node.insert_key_value(b"Barbara", b"Liskov", 0);

        let decoded = reload(&mut node);
        assert!(decoded.is_leaf());
        assert_eq!(decoded.id(), 4);
        assert_eq!(decoded.key_count(), 2);
        assert_eq!(decoded.key(0), b"Barbara");
        assert_eq!(decoded.value(0), b"Liskov");
        assert_eq!(decoded.key(1), b"Charles");
        assert_eq!(decoded.value(1), b"Darwin");
    }

    #[test]
    fn test_tuples_grow_down_from_page_end() {
        let mut node = Node::new(0, true, SMALL);
        node.insert_key_value(b"k", b"vvv", 0);
        node.encode().expect("encode");

        // 4 + 1 + 3 = 8 bytes at the very end of the page.
        assert_eq!(
            node.free_ranges(),
            vec![ByteRange::new(45, 248)]
        );
        let page = node.encode().expect("encode");
        assert_eq!(page[0], FLAG_ALLOCATED | FLAG_LEAF);
        assert_eq!(&page[1..5], &[0, 0, 0, 1]);
        assert_eq!(&page[5..13], &[0, 0, 0, 248, 0, 0, 1, 0]);
        assert_eq!(&page[248..256], &[0, 0, 0, 1, b'k', b'v', b'v', b'v']);
    }

    #[test]
    fn test_internal_round_trip() {
        let mut node = Node::new(1, false, SMALL);
        node.insert_child(7, 0);
        node.insert_key(b"m", 0);
        node.insert_child(9, 1);

        let decoded = reload(&mut node);
        assert!(!decoded.is_leaf());
        assert_eq!(decoded.key_count(), 1);
        assert_eq!(decoded.key(0), b"m");
        assert!(decoded.value(0).is_empty());
        assert_eq!(decoded.child(0), 7);
        assert_eq!(decoded.child(1), 9);
    }

    #[test]
    fn test_insert_shifts_right() {
        let mut node = Node::new(0, true, SMALL);
        node.insert_key_value(b"a", b"1", 0);
        node.insert_key_value(b"c", b"3", 1);
        node.insert_key_value(b"b", b"2", 1);

        let decoded = reload(&mut node);
        let keys: Vec<Vec<u8>> = (0..decoded.key_count()).map(|i| decoded.key_full(i)).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_child_count_mismatch_rejected() {
        let mut node = Node::new(0, false, SMALL);
        node.insert_key(b"a", 0);
        node.insert_child(1, 0);
        assert_eq!(
            node.encode().map(<[u8]>::len),
            Err(NodeError::ChildCountMismatch {
                keys: 1,
                children: 1
            })
        );
    }

    #[test]
    fn test_update_value_releases_old_bytes() {
        let mut node = Node::new(0, true, SMALL);
        node.insert_key_value(b"a", b"long value", 0);
        let mut node = reload(&mut node);

        node.update_value(0, b"v");
        assert_eq!(node.value(0), b"v");
        // The dirty tuple no longer owns any page bytes.
        assert_eq!(node.free_ranges(), vec![ByteRange::new(45, 256)]);

        let decoded = reload(&mut node);
        assert_eq!(decoded.key(0), b"a");
        assert_eq!(decoded.value(0), b"v");
        let free: usize = decoded.free_ranges().iter().map(ByteRange::len).sum();
        assert_eq!(free, 256 - 45 - (4 + 1 + 1));
    }

    #[test]
    fn test_fragmented_page_is_compacted() {
        let mut node = Node::new(0, true, SMALL);
        // Three 60-byte tuples: [196, 256), [136, 196), [76, 136).
        node.insert_key_value(b"a", &[b'x'; 55], 0);
        node.insert_key_value(b"b", &[b'y'; 55], 1);
        node.insert_key_value(b"c", &[b'z'; 55], 2);
        let mut node = reload(&mut node);

        // Releasing b leaves 31 + 60 free bytes in two ranges. A 70-byte
        // tuple only fits after compaction.
        node.update_value(1, &[b'w'; 65]);
        assert_eq!(
            node.free_ranges(),
            vec![ByteRange::new(45, 76), ByteRange::new(136, 196)]
        );

        let decoded = reload(&mut node);
        assert_eq!(decoded.value(0), &[b'x'; 55]);
        assert_eq!(decoded.value(1), &[b'w'; 65]);
        assert_eq!(decoded.value(2), &[b'z'; 55]);
        assert_eq!(decoded.free_ranges(), vec![ByteRange::new(45, 66)]);
    }

    #[test]
    fn test_page_full() {
        let mut node = Node::new(0, true, SMALL);
        node.insert_key_value(b"big", &[0u8; 250], 0);
        assert_eq!(
            node.encode().map(<[u8]>::len),
            Err(NodeError::PageFull {
                needed: 257,
                available: 211
            })
        );
    }

    #[test]
    fn test_too_many_tuples() {
        let mut node = Node::new(0, true, SMALL);
        for (i, key) in [b"a", b"b", b"c", b"d"].iter().enumerate() {
            node.insert_key_value(*key, b"", i);
        }
        assert_eq!(
            node.encode().map(<[u8]>::len),
            Err(NodeError::TooManyTuples { count: 4, max: 3 })
        );
    }

    #[test]
    fn test_split_leaf() {
        let mut node = Node::new(0, true, SMALL);
        node.insert_key_value(b"a", b"1", 0);
        node.insert_key_value(b"b", b"2", 1);
        node.insert_key_value(b"c", b"3", 2);
        let mut node = reload(&mut node);

        let mut sibling = Node::new(1, true, SMALL);
        node.split_at(1, &mut sibling);

        assert_eq!(node.key_count(), 1);
        assert_eq!(node.key(0), b"a");
        assert_eq!(sibling.key_count(), 2);
        assert_eq!(sibling.key(0), b"b");
        assert_eq!(sibling.value(1), b"3");

        let left = reload(&mut node);
        let right = reload(&mut sibling);
        assert_eq!(left.value(0), b"1");
        assert_eq!(right.key(1), b"c");
    }

    #[test]
    fn test_split_internal_moves_children() {
        let mut node = Node::new(0, false, SMALL);
        for (i, key) in [b"b", b"d", b"f"].iter().enumerate() {
            node.insert_key(*key, i);
        }
        for (i, child) in [10, 11, 12, 13].into_iter().enumerate() {
            node.insert_child(child, i);
        }
        let mut node = reload(&mut node);

        let mut sibling = Node::new(1, false, SMALL);
        node.split_at(1, &mut sibling);

        assert_eq!(node.key_count(), 1);
        assert_eq!(node.child(0), 10);
        assert_eq!(node.child(1), 11);

        assert_eq!(sibling.key_count(), 2);
        assert_eq!(sibling.key(0), b"d");
        assert_eq!(sibling.child(0), NO_CHILD);
        assert_eq!(sibling.child(1), 12);
        assert_eq!(sibling.child(2), 13);

        let right = reload(&mut sibling);
        assert_eq!(right.child(0), NO_CHILD);
    }

    #[test]
    fn test_decode_rejects_free_page() {
        let page = vec![0u8; 256];
        assert_eq!(
            Node::from_page(3, SMALL, page).map(|n| n.key_count()),
            Err(NodeError::NotAllocated(3))
        );
    }

    #[test]
    fn test_decode_rejects_bad_offsets() {
        let mut page = vec![0u8; 256];
        page[0] = FLAG_ALLOCATED | FLAG_LEAF;
        write_u32(&mut page, 1, 1);
        // Starts inside the reserved region.
        write_u32(&mut page, 5, 10);
        write_u32(&mut page, 9, 20);
        assert_eq!(
            Node::from_page(0, SMALL, page.clone()).map(|n| n.key_count()),
            Err(NodeError::InvalidTupleOffsets { index: 0 })
        );

        // Key length runs past the tuple end.
        write_u32(&mut page, 5, 250);
        write_u32(&mut page, 9, 256);
        write_u32(&mut page, 250, 5);
        assert_eq!(
            Node::from_page(0, SMALL, page.clone()).map(|n| n.key_count()),
            Err(NodeError::InvalidTupleOffsets { index: 0 })
        );

        // Past the page end.
        write_u32(&mut page, 9, 300);
        assert_eq!(
            Node::from_page(0, SMALL, page).map(|n| n.key_count()),
            Err(NodeError::InvalidTupleOffsets { index: 0 })
        );
    }

    #[test]
    fn test_decode_rejects_overlapping_tuples() {
        let mut node = Node::new(0, true, SMALL);
        node.insert_key_value(b"a", b"1", 0);
        node.insert_key_value(b"b", b"2", 1);
        let mut page = node.encode().expect("encode").to_vec();

        // Point the second tuple at the first one's bytes.
        let first_start = read_u32(&page, 5);
        let first_end = read_u32(&page, 9);
        write_u32(&mut page, 13, first_start);
        write_u32(&mut page, 17, first_end);
        assert!(matches!(
            Node::from_page(0, SMALL, page),
            Err(NodeError::InvalidTupleOffsets { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_page_size() {
        assert_eq!(
            Node::from_page(0, SMALL, vec![0u8; 128]).map(|n| n.key_count()),
            Err(NodeError::PageSizeMismatch {
                expected: 256,
                actual: 128
            })
        );
    }
}
