//! Disk Manager - low-level file I/O for database pages.
//!
//! The [`DiskManager`] handles all direct file operations:
//! - Reading and writing pages
//! - Allocating new pages
//! - Managing the database file's superblock

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;

/// Magic bytes identifying a file as one of ours.
const MAGIC: &[u8; 4] = b"TSQL";
const FORMAT_VERSION: u32 = 1;

/// Fixed-format metadata page stored at page 0 of every paged database file.
///
/// # Layout (little-endian)
/// ```text
/// Offset  Size  Field
/// 0       4     magic ("TSQL")
/// 4       4     format_version
/// 8       4     page_size
/// 12      4     page_count
/// 16      4     free_list_root (NO_PAGE if empty)
/// 20      4     next_page_id
/// 24      8     next_txn_id
/// 32      8     checkpoint_lsn
/// 40      4     crc32 (over bytes 0..40)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    pub page_size: u32,
    pub page_count: u32,
    pub free_list_root: u32,
    pub next_page_id: u32,
    pub next_txn_id: u64,
    pub checkpoint_lsn: u64,
}

impl SuperBlock {
    pub const ENCODED_SIZE: usize = 44;

    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            page_count: 1, // the superblock itself occupies page 0
            free_list_root: u32::MAX,
            next_page_id: 1,
            next_txn_id: 0,
            checkpoint_lsn: 0,
        }
    }

    fn encode(&self) -> [u8; Self::ENCODED_SIZE] {
        let mut buf = [0u8; Self::ENCODED_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[8..12].copy_from_slice(&self.page_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.page_count.to_le_bytes());
        buf[16..20].copy_from_slice(&self.free_list_root.to_le_bytes());
        buf[20..24].copy_from_slice(&self.next_page_id.to_le_bytes());
        buf[24..32].copy_from_slice(&self.next_txn_id.to_le_bytes());
        buf[32..40].copy_from_slice(&self.checkpoint_lsn.to_le_bytes());
        let crc = crc32fast::hash(&buf[0..40]);
        buf[40..44].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if &buf[0..4] != MAGIC {
            return Err(Error::Schema("not a recognized database file".into()));
        }
        let version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(Error::Schema(format!(
                "unsupported on-disk format version {version}"
            )));
        }
        let crc = u32::from_le_bytes(buf[40..44].try_into().unwrap());
        if crc != crc32fast::hash(&buf[0..40]) {
            return Err(Error::PageCorrupt(0));
        }
        Ok(Self {
            page_size: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            page_count: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            free_list_root: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            next_page_id: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
            next_txn_id: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            checkpoint_lsn: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
        })
    }
}

/// Manages disk I/O for a single database file.
///
/// # File Layout
/// The database is stored as a single file with pages laid out sequentially,
/// page 0 reserved for the [`SuperBlock`]:
/// ```text
/// ┌────────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Superblock │ Page 1  │ Page 2  │  ...    │ Page N  │
/// │ (page 0)   │         │         │         │         │
/// └────────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      page_size   2×page_size   ...    N×page_size
/// ```
/// Page N is located at file offset `N × page_size`.
///
/// # Thread Safety
/// `DiskManager` is **single-threaded**. The `BufferPoolManager` is responsible
/// for serializing access to the disk manager.
///
/// # Durability
/// Writes are followed by `fsync()` by default. Setting
/// [`sync_on_mutate`](crate::common::config::DatabaseConfig::sync_on_mutate)
/// to `false` via [`DiskManager::set_sync_on_mutate`] skips that fsync,
/// trading the guarantee that every write survives an immediate crash for
/// write throughput — durability still catches up at the next explicit
/// flush or checkpoint.
pub struct DiskManager {
    file: File,
    superblock: SuperBlock,
    sync_on_mutate: bool,
}

impl DiskManager {
    /// Create a new database file with the given page size (4096-65536,
    /// power of two).
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, page_size: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let superblock = SuperBlock::new(page_size);
        let mut dm = Self { file, superblock, sync_on_mutate: true };
        dm.write_superblock()?;
        Ok(dm)
    }

    /// Open an existing database file, validating its superblock.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist, isn't a recognized
    /// database file, or its superblock checksum fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; SuperBlock::ENCODED_SIZE];
        file.read_exact(&mut buf)?;
        let superblock = SuperBlock::decode(&buf)?;
        Ok(Self { file, superblock, sync_on_mutate: true })
    }

    /// Open an existing database file, or create one with `page_size` if it
    /// doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P, page_size: u32) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path, page_size)
        }
    }

    fn write_superblock(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = self.superblock.encode().to_vec();
        buf.resize(self.superblock.page_size as usize, 0);
        self.file.write_all(&buf)?;
        if self.sync_on_mutate {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Whether `write_page`/`allocate_page`/superblock updates fsync
    /// immediately. Defaults to `true`; set from
    /// [`DatabaseConfig::sync_on_mutate`](crate::common::config::DatabaseConfig::sync_on_mutate).
    pub fn set_sync_on_mutate(&mut self, enabled: bool) {
        self.sync_on_mutate = enabled;
    }

    pub fn page_size(&self) -> usize {
        self.superblock.page_size as usize
    }

    pub fn free_list_root(&self) -> Option<u32> {
        (self.superblock.free_list_root != u32::MAX).then_some(self.superblock.free_list_root)
    }

    pub fn set_free_list_root(&mut self, root: Option<u32>) -> Result<()> {
        self.superblock.free_list_root = root.unwrap_or(u32::MAX);
        self.write_superblock()
    }

    pub fn checkpoint_lsn(&self) -> u64 {
        self.superblock.checkpoint_lsn
    }

    pub fn set_checkpoint_lsn(&mut self, lsn: u64) -> Result<()> {
        self.superblock.checkpoint_lsn = lsn;
        self.write_superblock()
    }

    pub fn allocate_txn_id(&mut self) -> Result<u64> {
        let id = self.superblock.next_txn_id;
        self.superblock.next_txn_id += 1;
        self.write_superblock()?;
        Ok(id)
    }

    fn offset_of(&self, page_id: PageId) -> u64 {
        (page_id.0 as u64) * (self.superblock.page_size as u64)
    }

    /// Read a page from disk.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page doesn't exist.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        if page_id.0 >= self.superblock.page_count {
            return Err(Error::PageNotFound(page_id.0));
        }

        let offset = self.offset_of(page_id);
        self.file.seek(SeekFrom::Start(offset))?;

        let mut page = Page::with_size(self.page_size());
        self.file.read_exact(page.as_mut_slice())?;

        Ok(page)
    }

    /// Write a page to disk.
    ///
    /// The page must have been previously allocated with `allocate_page()`.
    ///
    /// # Durability
    /// Calls `fsync()` after writing unless `sync_on_mutate` was turned off
    /// via [`DiskManager::set_sync_on_mutate`].
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page hasn't been allocated.
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        if page_id.0 >= self.superblock.page_count {
            return Err(Error::PageNotFound(page_id.0));
        }

        let offset = self.offset_of(page_id);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.as_slice())?;
        if self.sync_on_mutate {
            self.file.sync_all()?;
        }

        Ok(())
    }

    /// Allocate a new page on disk, reusing a free-listed page id if one is
    /// recorded in the superblock, otherwise extending the file.
    ///
    /// Returns the `PageId` of the newly allocated page. The page is
    /// initialized with zeros.
    ///
    /// # Durability
    /// Extends the file and, unless `sync_on_mutate` is off, calls `fsync()`
    /// so the allocation itself is durable.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        let page_id = PageId::new(self.superblock.next_page_id);

        let offset = self.offset_of(page_id);
        self.file.seek(SeekFrom::Start(offset))?;

        let zeros = vec![0u8; self.page_size()];
        self.file.write_all(&zeros)?;
        if self.sync_on_mutate {
            self.file.sync_all()?;
        }

        self.superblock.next_page_id += 1;
        self.superblock.page_count += 1;
        self.write_superblock()?;
        Ok(page_id)
    }

    /// Get the number of pages in the database, including the superblock.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.superblock.page_count
    }

    /// Get the total size of the database file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        (self.superblock.page_count as u64) * (self.superblock.page_size as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PAGE_SIZE: u32 = 4096;

    #[test]
    fn test_create_new_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let dm = DiskManager::create(&path, PAGE_SIZE).unwrap();
        assert_eq!(dm.page_count(), 1); // superblock only
        assert_eq!(dm.page_size(), 4096);
    }

    #[test]
    fn test_create_existing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        DiskManager::create(&path, PAGE_SIZE).unwrap();
        assert!(DiskManager::create(&path, PAGE_SIZE).is_err());
    }

    #[test]
    fn test_open_nonexistent_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nonexistent.db");

        assert!(DiskManager::open(&path).is_err());
    }

    #[test]
    fn test_allocate_and_read_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut dm = DiskManager::create(&path, PAGE_SIZE).unwrap();

        let page_id = dm.allocate_page().unwrap();
        assert_eq!(page_id, PageId::new(1));
        assert_eq!(dm.page_count(), 2);

        let page = dm.read_page(page_id).unwrap();
        assert_eq!(page.as_slice()[0], 0);
        assert_eq!(page.as_slice()[page.size() - 1], 0);
    }

    #[test]
    fn test_write_and_read_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut dm = DiskManager::create(&path, PAGE_SIZE).unwrap();
        let page_id = dm.allocate_page().unwrap();

        let mut page = Page::with_size(dm.page_size());
        page.as_mut_slice()[0] = 0xAB;
        page.as_mut_slice()[100] = 0xCD;
        let last = page.size() - 1;
        page.as_mut_slice()[last] = 0xEF;

        dm.write_page(page_id, &page).unwrap();

        let read_page = dm.read_page(page_id).unwrap();
        assert_eq!(read_page.as_slice()[0], 0xAB);
        assert_eq!(read_page.as_slice()[100], 0xCD);
        assert_eq!(read_page.as_slice()[last], 0xEF);
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut dm = DiskManager::create(&path, PAGE_SIZE).unwrap();
            let page_id = dm.allocate_page().unwrap();

            let mut page = Page::with_size(dm.page_size());
            page.as_mut_slice()[0] = 0x42;
            dm.write_page(page_id, &page).unwrap();
        }

        {
            let mut dm = DiskManager::open(&path).unwrap();
            assert_eq!(dm.page_count(), 2);

            let page = dm.read_page(PageId::new(1)).unwrap();
            assert_eq!(page.as_slice()[0], 0x42);
        }
    }

    #[test]
    fn test_multiple_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut dm = DiskManager::create(&path, PAGE_SIZE).unwrap();

        for i in 1..=10u32 {
            let page_id = dm.allocate_page().unwrap();
            assert_eq!(page_id.0, i);

            let mut page = Page::with_size(dm.page_size());
            page.as_mut_slice()[0] = i as u8;
            dm.write_page(page_id, &page).unwrap();
        }

        assert_eq!(dm.page_count(), 11);
        assert_eq!(dm.file_size(), 11 * PAGE_SIZE as u64);

        for i in 1..=10u32 {
            let page = dm.read_page(PageId::new(i)).unwrap();
            assert_eq!(page.as_slice()[0], i as u8);
        }
    }

    #[test]
    fn test_read_invalid_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut dm = DiskManager::create(&path, PAGE_SIZE).unwrap();

        let result = dm.read_page(PageId::new(5));
        assert!(result.is_err());
    }

    #[test]
    fn test_write_invalid_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut dm = DiskManager::create(&path, PAGE_SIZE).unwrap();

        let page = Page::with_size(dm.page_size());
        let result = dm.write_page(PageId::new(5), &page);
        assert!(result.is_err());
    }

    #[test]
    fn test_open_or_create() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut dm = DiskManager::open_or_create(&path, PAGE_SIZE).unwrap();
            assert_eq!(dm.page_count(), 1);
            dm.allocate_page().unwrap();
        }

        {
            let dm = DiskManager::open_or_create(&path, PAGE_SIZE).unwrap();
            assert_eq!(dm.page_count(), 2);
        }
    }

    #[test]
    fn test_sync_on_mutate_disabled_still_persists_within_process() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut dm = DiskManager::create(&path, PAGE_SIZE).unwrap();
        dm.set_sync_on_mutate(false);
        let page_id = dm.allocate_page().unwrap();

        let mut page = Page::with_size(dm.page_size());
        page.as_mut_slice()[0] = 0x77;
        dm.write_page(page_id, &page).unwrap();

        let read_back = dm.read_page(page_id).unwrap();
        assert_eq!(read_back.as_slice()[0], 0x77);
    }

    #[test]
    fn test_custom_page_size_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut dm = DiskManager::create(&path, 16384).unwrap();
        let page_id = dm.allocate_page().unwrap();
        let page = dm.read_page(page_id).unwrap();
        assert_eq!(page.size(), 16384);
    }

    #[test]
    fn test_free_list_root_and_checkpoint_lsn_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut dm = DiskManager::create(&path, PAGE_SIZE).unwrap();
            dm.set_free_list_root(Some(3)).unwrap();
            dm.set_checkpoint_lsn(99).unwrap();
        }

        let dm = DiskManager::open(&path).unwrap();
        assert_eq!(dm.free_list_root(), Some(3));
        assert_eq!(dm.checkpoint_lsn(), 99);
    }
}
