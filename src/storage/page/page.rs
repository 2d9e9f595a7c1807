//! Page - the fundamental unit of storage.
//!
//! A [`Page`] is a raw byte buffer, sized to the database's configured
//! `page_size` (4KiB-64KiB, see [`DatabaseConfig`](crate::common::config::DatabaseConfig)),
//! that serves as the unit of I/O between disk and memory. Pages are stored
//! in [`Frame`]s within the buffer pool.

use crate::common::config::PAGE_SIZE;

use super::page_header::PageHeader;

/// A page of data, boxed to its configured size.
///
/// This is the fundamental unit of I/O between disk and memory.
/// The buffer pool manages these in frames.
///
/// # Memory Layout
/// Pages default to 4096 bytes but any power of two from 4096 to 65536 is
/// valid; the size is fixed per-database at construction time and every page
/// in a given file shares it.
///
/// # Clone Implementation
/// `Page` does NOT implement `Clone` in production code to match production
/// database behavior (copying a full page is expensive and should be
/// explicit). A `#[cfg(test)]` Clone is provided for tests.
///
/// # Example
/// ```
/// use interchangedb::storage::page::Page;
///
/// let mut page = Page::new();
/// page.as_mut_slice()[0] = 0xFF;
/// assert_eq!(page.as_slice()[0], 0xFF);
/// ```
pub struct Page {
    data: Box<[u8]>,
}

impl Page {
    /// Create a new zeroed page at the default page size.
    #[inline]
    pub fn new() -> Self {
        Self::with_size(PAGE_SIZE)
    }

    /// Create a new zeroed page of exactly `page_size` bytes.
    #[inline]
    pub fn with_size(page_size: usize) -> Self {
        Self {
            data: vec![0u8; page_size].into_boxed_slice(),
        }
    }

    /// Get immutable slice of page data.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable slice of page data.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero out the entire page.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// The size of this page in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Read the page header.
    pub fn header(&self) -> PageHeader {
        PageHeader::from_bytes(&self.data)
    }

    /// Write a page header.
    pub fn set_header(&mut self, header: &PageHeader) {
        header.write_to(&mut self.data);
    }

    /// Compute and store checksum in the header.
    ///
    /// Call this after all modifications to the page are complete.
    pub fn update_checksum(&mut self) {
        let checksum = PageHeader::compute_checksum(&self.data);
        let checksum_bytes = checksum.to_le_bytes();
        self.data[PageHeader::OFFSET_CHECKSUM..PageHeader::OFFSET_CHECKSUM + 4]
            .copy_from_slice(&checksum_bytes);
    }

    /// Verify the page checksum is valid.
    pub fn verify_checksum(&self) -> bool {
        self.header().verify_checksum(&self.data)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

// Clone only available in tests - forces explicit copying in production
#[cfg(test)]
impl Clone for Page {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_default_size() {
        let page = Page::new();
        assert_eq!(page.size(), PAGE_SIZE);
        assert_eq!(page.as_slice().len(), 4096);
    }

    #[test]
    fn test_page_custom_size() {
        let page = Page::with_size(16384);
        assert_eq!(page.size(), 16384);
    }

    #[test]
    fn test_page_read_write() {
        let mut page = Page::new();

        page.as_mut_slice()[0] = 0xFF;
        page.as_mut_slice()[100] = 0xAB;
        let last = page.size() - 1;
        page.as_mut_slice()[last] = 0xCD;

        assert_eq!(page.as_slice()[0], 0xFF);
        assert_eq!(page.as_slice()[100], 0xAB);
        assert_eq!(page.as_slice()[last], 0xCD);
    }

    #[test]
    fn test_page_reset() {
        let mut page = Page::new();
        page.as_mut_slice()[0] = 0xFF;
        page.as_mut_slice()[100] = 0xAB;

        page.reset();

        assert_eq!(page.as_slice()[0], 0);
        assert_eq!(page.as_slice()[100], 0);
    }

    #[test]
    fn test_page_clone_in_tests() {
        let mut page = Page::new();
        page.as_mut_slice()[0] = 0xAB;

        let cloned = page.clone();
        assert_eq!(cloned.as_slice()[0], 0xAB);
        assert_eq!(page.as_slice()[0], 0xAB);
    }

    #[test]
    fn test_checksum_roundtrip() {
        let mut page = Page::new();
        page.as_mut_slice()[50] = 0x42;
        page.update_checksum();
        assert!(page.verify_checksum());

        page.as_mut_slice()[50] = 0x43;
        assert!(!page.verify_checksum());
    }
}
