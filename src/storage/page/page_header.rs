//! Page header and type definitions.
//!
//! Every page starts with a [`PageHeader`] containing metadata:
//! - [`PageType`] discriminator
//! - CRC32 checksum for integrity
//! - LSN for WAL/recovery
//! - slotted-page bookkeeping (slot count, free-space bounds, sibling links)

/// Type of page stored on disk.
///
/// Uses `#[repr(u8)]` to guarantee a 1-byte representation for serialization.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// Uninitialized or corrupted page.
    #[default]
    Invalid = 0,
    /// Generic data page.
    Data = 1,
    /// B-tree internal (non-leaf) node.
    BTreeInternal = 2,
    /// B-tree leaf node.
    BTreeLeaf = 3,
    /// Page on the free list.
    Free = 4,
    /// The page-0 superblock.
    Superblock = 5,
    /// Continuation page for a value too large to fit inline.
    Overflow = 6,
}

impl PageType {
    /// Convert from u8, returning Invalid for unknown values.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PageType::Data,
            2 => PageType::BTreeInternal,
            3 => PageType::BTreeLeaf,
            4 => PageType::Free,
            5 => PageType::Superblock,
            6 => PageType::Overflow,
            _ => PageType::Invalid,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, PageType::BTreeLeaf)
    }
}

/// Sentinel meaning "no page" wherever a page id field would otherwise point
/// to a sibling, child, or overflow continuation.
pub const NO_PAGE: u32 = u32::MAX;

/// Metadata stored at the beginning of every page.
///
/// # Layout (32 bytes)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       1     page_type (PageType as u8)
/// 1       4     checksum (CRC32, little-endian)
/// 5       8     lsn (Log Sequence Number, little-endian)
/// 13      1     flags
/// 14      2     slot_count
/// 16      2     free_start (slot directory high-water mark)
/// 18      2     free_end (record area low-water mark)
/// 20      4     next_leaf (leaf sibling chain, or `next_overflow`)
/// 24      4     prev_leaf
/// 28      4     right_child (internal nodes only)
/// ```
///
/// # Checksum
/// The checksum is computed over the entire page with the checksum field
/// itself set to zero. This allows verification without special handling.
///
/// # LSN (Log Sequence Number)
/// Set to the LSN of the WAL record that last produced this page image, so
/// recovery can skip redoing a page whose on-disk LSN already dominates the
/// log record being replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Type of this page.
    pub page_type: PageType,
    /// CRC32 checksum of the page contents.
    pub checksum: u32,
    /// Log Sequence Number of last modification.
    pub lsn: u64,
    /// Type-specific bit flags (e.g. leaf-has-overflow-values).
    pub flags: u8,
    /// Number of slots in the slotted directory.
    pub slot_count: u16,
    /// Offset where the slot directory's free space begins (grows forward).
    pub free_start: u16,
    /// Offset where record storage's free space ends (grows backward, i.e.
    /// the lowest offset currently occupied by a record body).
    pub free_end: u16,
    /// Next leaf in sibling order, or next page of an overflow chain.
    pub next_leaf: u32,
    /// Previous leaf in sibling order.
    pub prev_leaf: u32,
    /// Rightmost child pointer for an internal B+Tree node.
    pub right_child: u32,
}

impl Default for PageHeader {
    fn default() -> Self {
        Self {
            page_type: PageType::Invalid,
            checksum: 0,
            lsn: 0,
            flags: 0,
            slot_count: 0,
            free_start: Self::SIZE as u16,
            free_end: 0,
            next_leaf: NO_PAGE,
            prev_leaf: NO_PAGE,
            right_child: NO_PAGE,
        }
    }
}

impl PageHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 32;

    /// Offset of each field within the header.
    pub const OFFSET_PAGE_TYPE: usize = 0;
    pub const OFFSET_CHECKSUM: usize = 1;
    pub const OFFSET_LSN: usize = 5;
    pub const OFFSET_FLAGS: usize = 13;
    pub const OFFSET_SLOT_COUNT: usize = 14;
    pub const OFFSET_FREE_START: usize = 16;
    pub const OFFSET_FREE_END: usize = 18;
    pub const OFFSET_NEXT_LEAF: usize = 20;
    pub const OFFSET_PREV_LEAF: usize = 24;
    pub const OFFSET_RIGHT_CHILD: usize = 28;

    /// Create a new header with the given page type, sized for a page of
    /// `page_size` bytes (checksum/lsn start at zero, free space spans the
    /// whole usable body).
    pub fn new(page_type: PageType, page_size: usize) -> Self {
        Self {
            page_type,
            free_end: page_size as u16,
            ..Self::default()
        }
    }

    /// Read a header from the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < PageHeader::SIZE`.
    pub fn from_bytes(data: &[u8]) -> Self {
        assert!(data.len() >= Self::SIZE, "buffer too small for PageHeader");

        let page_type = PageType::from_u8(data[Self::OFFSET_PAGE_TYPE]);

        let checksum = u32::from_le_bytes(
            data[Self::OFFSET_CHECKSUM..Self::OFFSET_CHECKSUM + 4]
                .try_into()
                .unwrap(),
        );

        let lsn = u64::from_le_bytes(
            data[Self::OFFSET_LSN..Self::OFFSET_LSN + 8]
                .try_into()
                .unwrap(),
        );

        let flags = data[Self::OFFSET_FLAGS];
        let slot_count = u16::from_le_bytes(
            data[Self::OFFSET_SLOT_COUNT..Self::OFFSET_SLOT_COUNT + 2]
                .try_into()
                .unwrap(),
        );
        let free_start = u16::from_le_bytes(
            data[Self::OFFSET_FREE_START..Self::OFFSET_FREE_START + 2]
                .try_into()
                .unwrap(),
        );
        let free_end = u16::from_le_bytes(
            data[Self::OFFSET_FREE_END..Self::OFFSET_FREE_END + 2]
                .try_into()
                .unwrap(),
        );
        let next_leaf = u32::from_le_bytes(
            data[Self::OFFSET_NEXT_LEAF..Self::OFFSET_NEXT_LEAF + 4]
                .try_into()
                .unwrap(),
        );
        let prev_leaf = u32::from_le_bytes(
            data[Self::OFFSET_PREV_LEAF..Self::OFFSET_PREV_LEAF + 4]
                .try_into()
                .unwrap(),
        );
        let right_child = u32::from_le_bytes(
            data[Self::OFFSET_RIGHT_CHILD..Self::OFFSET_RIGHT_CHILD + 4]
                .try_into()
                .unwrap(),
        );

        Self {
            page_type,
            checksum,
            lsn,
            flags,
            slot_count,
            free_start,
            free_end,
            next_leaf,
            prev_leaf,
            right_child,
        }
    }

    /// Write this header to the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < PageHeader::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for PageHeader");

        data[Self::OFFSET_PAGE_TYPE] = self.page_type as u8;
        data[Self::OFFSET_CHECKSUM..Self::OFFSET_CHECKSUM + 4]
            .copy_from_slice(&self.checksum.to_le_bytes());
        data[Self::OFFSET_LSN..Self::OFFSET_LSN + 8].copy_from_slice(&self.lsn.to_le_bytes());
        data[Self::OFFSET_FLAGS] = self.flags;
        data[Self::OFFSET_SLOT_COUNT..Self::OFFSET_SLOT_COUNT + 2]
            .copy_from_slice(&self.slot_count.to_le_bytes());
        data[Self::OFFSET_FREE_START..Self::OFFSET_FREE_START + 2]
            .copy_from_slice(&self.free_start.to_le_bytes());
        data[Self::OFFSET_FREE_END..Self::OFFSET_FREE_END + 2]
            .copy_from_slice(&self.free_end.to_le_bytes());
        data[Self::OFFSET_NEXT_LEAF..Self::OFFSET_NEXT_LEAF + 4]
            .copy_from_slice(&self.next_leaf.to_le_bytes());
        data[Self::OFFSET_PREV_LEAF..Self::OFFSET_PREV_LEAF + 4]
            .copy_from_slice(&self.prev_leaf.to_le_bytes());
        data[Self::OFFSET_RIGHT_CHILD..Self::OFFSET_RIGHT_CHILD + 4]
            .copy_from_slice(&self.right_child.to_le_bytes());
    }

    /// Compute CRC32 checksum of a page.
    ///
    /// The checksum is computed with the checksum field zeroed out, so the
    /// checksum doesn't include itself.
    ///
    /// # Arguments
    /// * `page_data` - The full page data (page_size bytes)
    ///
    /// # Returns
    /// CRC32 checksum as u32
    pub fn compute_checksum(page_data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();

        // Hash bytes before the checksum field (just byte 0: page_type).
        hasher.update(&page_data[..Self::OFFSET_CHECKSUM]);

        // Skip checksum field by feeding zeros instead.
        hasher.update(&[0u8; 4]);

        // Hash everything after the checksum field.
        hasher.update(&page_data[Self::OFFSET_CHECKSUM + 4..]);

        hasher.finalize()
    }

    /// Verify that the stored checksum matches the computed checksum.
    ///
    /// # Arguments
    /// * `page_data` - The full page data (page_size bytes)
    ///
    /// # Returns
    /// `true` if checksum is valid, `false` otherwise
    pub fn verify_checksum(&self, page_data: &[u8]) -> bool {
        self.checksum == Self::compute_checksum(page_data)
    }

    /// Free space available between the slot directory and record area.
    pub fn free_space(&self) -> usize {
        self.free_end.saturating_sub(self.free_start) as usize
    }
}

// ============================================================================
// TESTS
// ============================================================================
