//! Paged node storage.
//!
//! `NodeStorage` owns the storage handle and is the only component that
//! reads or writes it. It maintains the file header, allocates pages for new
//! nodes and moves node pages between disk and memory.
//!
//! # File Layout
//!
//! ```text
//! [0..8)                           header (layout version, root node id)
//! [8 + i * page_size, +page_size)  page i, holding node i
//! ```
//!
//! Free pages are not tracked on disk. On open every page's flags byte is
//! read and pages without the allocated bit are put back on the free list.
//! When the free list runs dry the file grows by `ALLOCATION_BATCH_PAGES`
//! zeroed pages at once.

use std::collections::VecDeque;

use crate::storage::btree::{FLAG_ALLOCATED, Node, NodeError, NodeId, NO_CHILD, PageLayout};
use crate::storage::header::{FileHeader, HEADER_SIZE, HeaderError};
use crate::storage::io::{Storage, StorageError};
use crate::storage::stats::Statistics;

/// Number of pages added to the file when no free page is left.
pub const ALLOCATION_BATCH_PAGES: u32 = 100;

/// Errors that can occur in node storage operations.
#[derive(Debug)]
pub enum NodeStorageError {
    /// Underlying storage error.
    Storage(StorageError),
    /// A node page couldn't be decoded or encoded.
    Node(NodeError),
    /// The header couldn't be decoded.
    Header(HeaderError),
    /// The file isn't a header followed by whole pages.
    InvalidFileSize { size: u64, page_size: u32 },
    /// `create` was called on storage that already holds data.
    NotEmpty { size: u64 },
    /// The storage has been closed.
    Closed,
    /// The node id is past the end of the file.
    PageOutOfBounds { id: NodeId, page_count: u32 },
    /// The header points at a page that doesn't hold a node.
    InvalidRoot(NodeId),
    /// No root node has been allocated yet.
    NoRoot,
    /// The file can't grow any further.
    OutOfPages,
    /// The root node can't be freed.
    CannotFreeRoot(NodeId),
    /// The page is already on the free list.
    AlreadyFree(NodeId),
}

impl std::fmt::Display for NodeStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Node(e) => write!(f, "node error: {e}"),
            Self::Header(e) => write!(f, "header error: {e}"),
            Self::InvalidFileSize { size, page_size } => write!(
                f,
                "file size {size} is not an {HEADER_SIZE}-byte header plus whole {page_size}-byte pages"
            ),
            Self::NotEmpty { size } => {
                write!(f, "cannot create a store in non-empty storage ({size} bytes)")
            }
            Self::Closed => write!(f, "node storage is closed"),
            Self::PageOutOfBounds { id, page_count } => {
                write!(f, "node {id} out of bounds (file has {page_count} pages)")
            }
            Self::InvalidRoot(id) => write!(f, "root node {id} is not an allocated page"),
            Self::NoRoot => write!(f, "no root node allocated"),
            Self::OutOfPages => write!(f, "no node ids left"),
            Self::CannotFreeRoot(id) => write!(f, "cannot free root node {id}"),
            Self::AlreadyFree(id) => write!(f, "node {id} is already free"),
        }
    }
}

impl std::error::Error for NodeStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Node(e) => Some(e),
            Self::Header(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for NodeStorageError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<NodeError> for NodeStorageError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}

impl From<HeaderError> for NodeStorageError {
    fn from(e: HeaderError) -> Self {
        Self::Header(e)
    }
}

/// Node pages stored in a single `Storage`.
pub struct NodeStorage<S: Storage> {
    /// `None` once closed.
    storage: Option<S>,
    layout: PageLayout,
    root_id: Option<NodeId>,
    /// Number of pages in the file. Also the id the next batch starts at.
    page_count: u32,
    free_page_ids: VecDeque<NodeId>,
    stats: Statistics,
}

impl<S: Storage> NodeStorage<S> {
    /// Initialize a new store in empty storage with a single empty leaf as
    /// the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the layout is invalid, the storage already holds
    /// data, or writing fails.
    pub fn create(storage: S, layout: PageLayout) -> Result<Self, NodeStorageError> {
        layout.validate()?;

        let size = storage.len()?;
        if size != 0 {
            return Err(NodeStorageError::NotEmpty { size });
        }

        let mut node_storage = Self {
            storage: Some(storage),
            layout,
            root_id: None,
            page_count: 0,
            free_page_ids: VecDeque::new(),
            stats: Statistics::default(),
        };
        let root = node_storage.allocate_root_node()?;
        node_storage.sync()?;

        tracing::info!(
            "Created node storage (page size {}, max keys {}, root {})",
            layout.page_size,
            layout.max_keys,
            root.id()
        );
        Ok(node_storage)
    }

    /// Open an existing store.
    ///
    /// Reads the header, rebuilds the free list from every page's flags
    /// byte and loads the root to validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file size, header or root node is invalid, or
    /// reading fails.
    pub fn open(mut storage: S, layout: PageLayout) -> Result<Self, NodeStorageError> {
        layout.validate()?;

        let size = storage.len()?;
        let page_size = u64::from(layout.page_size);
        let header_size = HEADER_SIZE as u64;
        if size < header_size || (size - header_size) % page_size != 0 {
            return Err(NodeStorageError::InvalidFileSize {
                size,
                page_size: layout.page_size,
            });
        }
        let page_count = u32::try_from((size - header_size) / page_size).map_err(|_| {
            NodeStorageError::InvalidFileSize {
                size,
                page_size: layout.page_size,
            }
        })?;

        let mut stats = Statistics::default();

        let mut header_bytes = [0u8; HEADER_SIZE];
        storage.read_at(0, &mut header_bytes)?;
        stats.record_read(HEADER_SIZE);
        let header = FileHeader::from_bytes(&header_bytes)?;

        let mut free_page_ids = VecDeque::new();
        let mut flags = [0u8; 1];
        for id in 0..page_count {
            storage.read_at(page_offset(layout, id), &mut flags)?;
            stats.record_read(flags.len());
            if flags[0] & FLAG_ALLOCATED == 0 {
                free_page_ids.push_back(id);
            }
        }

        let root_id = header.root_node_id;
        if root_id >= page_count || free_page_ids.contains(&root_id) {
            return Err(NodeStorageError::InvalidRoot(root_id));
        }

        let mut node_storage = Self {
            storage: Some(storage),
            layout,
            root_id: Some(root_id),
            page_count,
            free_page_ids,
            stats,
        };
        node_storage.root_node()?;

        tracing::info!(
            "Opened node storage ({} pages, {} free, root {})",
            page_count,
            node_storage.free_page_ids.len(),
            root_id
        );
        Ok(node_storage)
    }

    /// Open the store if the storage holds data, otherwise create it.
    ///
    /// # Errors
    ///
    /// See [`Self::open`] and [`Self::create`].
    pub fn open_or_create(storage: S, layout: PageLayout) -> Result<Self, NodeStorageError> {
        if storage.is_empty()? {
            Self::create(storage, layout)
        } else {
            Self::open(storage, layout)
        }
    }

    #[must_use]
    pub const fn layout(&self) -> PageLayout {
        self.layout
    }

    #[must_use]
    pub const fn root_id(&self) -> Option<NodeId> {
        self.root_id
    }

    /// Total number of pages in the file, free or not.
    #[must_use]
    pub const fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Ids of pages not holding a node, in ascending order.
    #[must_use]
    pub fn free_page_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.free_page_ids.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub const fn statistics(&self) -> Statistics {
        self.stats
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.storage.is_none()
    }

    /// Load the current root node.
    ///
    /// # Errors
    ///
    /// Returns an error if no root exists or loading fails.
    pub fn root_node(&mut self) -> Result<Node, NodeStorageError> {
        let root_id = self.root_id.ok_or(NodeStorageError::NoRoot)?;
        self.load_node(root_id)
    }

    /// Take a free page id and return an empty, unsaved node for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file has to grow and that fails.
    pub fn allocate_node(&mut self, is_leaf: bool) -> Result<Node, NodeStorageError> {
        self.ensure_open()?;

        if self.free_page_ids.is_empty() {
            self.extend()?;
        }
        let id = self
            .free_page_ids
            .pop_front()
            .ok_or(NodeStorageError::OutOfPages)?;

        Ok(Node::new(id, is_leaf, self.layout))
    }

    /// Allocate and save a new root.
    ///
    /// If a root exists the new root is an internal node whose only child
    /// is the old root; otherwise it is an empty leaf. The header is
    /// rewritten to point at the new root.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation or writing fails.
    pub fn allocate_root_node(&mut self) -> Result<Node, NodeStorageError> {
        let old_root = self.root_id;
        let mut node = self.allocate_node(old_root.is_none())?;
        if let Some(old_root) = old_root {
            node.insert_child(old_root, 0);
        }
        self.save_node(&mut node)?;

        self.root_id = Some(node.id());
        self.write_header()?;

        if let Some(old_root) = old_root {
            tracing::debug!("New root {} above {}", node.id(), old_root);
        }
        Ok(node)
    }

    /// Read and decode node `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is out of bounds, the page is free or
    /// malformed, or reading fails.
    pub fn load_node(&mut self, id: NodeId) -> Result<Node, NodeStorageError> {
        self.check_bounds(id)?;

        let mut page = vec![0u8; self.layout.page_size_usize()];
        let offset = page_offset(self.layout, id);
        self.storage_mut()?.read_at(offset, &mut page)?;
        self.stats.record_read(page.len());

        Ok(Node::from_page(id, self.layout, page)?)
    }

    /// Encode `node` and write its whole page.
    ///
    /// # Errors
    ///
    /// Returns an error if the node doesn't fit its page or writing fails.
    pub fn save_node(&mut self, node: &mut Node) -> Result<(), NodeStorageError> {
        self.check_bounds(node.id())?;

        let offset = page_offset(self.layout, node.id());
        let page = node.encode()?;
        let written = page.len();
        self.storage_mut()?.write_at(offset, page)?;
        self.stats.record_write(written);
        Ok(())
    }

    /// Zero node `id`'s page and return the id to the free list.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is the root, already free, out of bounds,
    /// or writing fails.
    pub fn free_node(&mut self, id: NodeId) -> Result<(), NodeStorageError> {
        if self.root_id == Some(id) {
            return Err(NodeStorageError::CannotFreeRoot(id));
        }
        self.check_bounds(id)?;
        if self.free_page_ids.contains(&id) {
            return Err(NodeStorageError::AlreadyFree(id));
        }

        let page = vec![0u8; self.layout.page_size_usize()];
        let offset = page_offset(self.layout, id);
        self.storage_mut()?.write_at(offset, &page)?;
        self.stats.record_write(page.len());

        self.free_page_ids.push_back(id);
        Ok(())
    }

    /// Sync pending writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if closed or syncing fails.
    pub fn sync(&mut self) -> Result<(), NodeStorageError> {
        self.storage_mut()?.sync()?;
        Ok(())
    }

    /// Sync and release the storage. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails. The storage is released
    /// either way.
    pub fn close(&mut self) -> Result<(), NodeStorageError> {
        if let Some(mut storage) = self.storage.take() {
            storage.sync()?;
            tracing::info!("Closed node storage ({} pages)", self.page_count);
        }
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), NodeStorageError> {
        let root_id = self.root_id.ok_or(NodeStorageError::NoRoot)?;
        let bytes = FileHeader::new(root_id).to_bytes();
        self.storage_mut()?.write_at(0, &bytes)?;
        self.stats.record_write(bytes.len());
        Ok(())
    }

    /// Grow the file by a batch of zeroed pages and put them on the free
    /// list.
    fn extend(&mut self) -> Result<(), NodeStorageError> {
        let first = self.page_count;
        let end = first
            .checked_add(ALLOCATION_BATCH_PAGES)
            .filter(|&end| end <= NO_CHILD)
            .ok_or(NodeStorageError::OutOfPages)?;

        let zeroes = vec![0u8; ALLOCATION_BATCH_PAGES as usize * self.layout.page_size_usize()];
        let offset = page_offset(self.layout, first);
        self.storage_mut()?.write_at(offset, &zeroes)?;
        self.stats.record_write(zeroes.len());

        self.free_page_ids.extend(first..end);
        self.page_count = end;

        tracing::debug!("Extended node storage to {} pages", end);
        Ok(())
    }

    fn check_bounds(&self, id: NodeId) -> Result<(), NodeStorageError> {
        self.ensure_open()?;
        if id >= self.page_count {
            return Err(NodeStorageError::PageOutOfBounds {
                id,
                page_count: self.page_count,
            });
        }
        Ok(())
    }

    const fn ensure_open(&self) -> Result<(), NodeStorageError> {
        if self.storage.is_none() {
            return Err(NodeStorageError::Closed);
        }
        Ok(())
    }

    fn storage_mut(&mut self) -> Result<&mut S, NodeStorageError> {
        self.storage.as_mut().ok_or(NodeStorageError::Closed)
    }
}

impl<S: Storage> std::fmt::Debug for NodeStorage<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStorage")
            .field("layout", &self.layout)
            .field("root_id", &self.root_id)
            .field("page_count", &self.page_count)
            .field("free_pages", &self.free_page_ids.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Byte offset of page `id`.
fn page_offset(layout: PageLayout, id: NodeId) -> u64 {
    HEADER_SIZE as u64 + u64::from(id) * u64::from(layout.page_size)
}
