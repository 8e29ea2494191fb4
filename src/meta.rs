//! Meta page and database metadata management
//!
//! Three meta pages (0, 1, 2) rotate across commits: transaction `N` writes
//! page `N mod 3`. Each meta page brackets its content with the committing
//! transaction id written both before and after the body, so a torn write
//! (a crash mid-flush) is detectable: the two ids will disagree and the page
//! is discarded in favor of the next-highest intact meta.

use crate::error::{Error, PageId, Result, TransactionId};
use crate::page::{Page, PageFlags, PAGE_SIZE};
use crc32fast::Hasher;
use static_assertions::const_assert;
use std::mem::size_of;

/// Page ID for meta page 0
pub const META_PAGE_0: PageId = PageId(0);
/// Page ID for meta page 1
pub const META_PAGE_1: PageId = PageId(1);
/// Page ID for meta page 2
pub const META_PAGE_2: PageId = PageId(2);

/// The three rotating meta page IDs, in order.
pub const META_PAGES: [PageId; 3] = [META_PAGE_0, META_PAGE_1, META_PAGE_2];

/// Version of the on-disk format.
pub const DB_VERSION: u8 = 1;

/// 56-bit prime base; the magic is this shifted left 8 bits with the
/// 8-bit data version appended in the low byte.
const MAGIC_PRIME: u64 = 0x59659DBDEF4C11;

/// Magic number identifying a database file, including the format version.
pub const MAGIC: u64 = (MAGIC_PRIME << 8) | DB_VERSION as u64;

/// Data-sync signature: the page has never been synced.
pub const DATASYNC_NONE: u64 = 0;
/// Data-sync signature: content is internally consistent but not fsynced.
pub const DATASYNC_WEAK: u64 = 1;
/// Signatures at or above this value are "steady": fsynced, and the value
/// itself is a CRC32 of the meta body (so it also detects bit-rot).
pub const DATASYNC_STEADY_MIN: u64 = 2;

/// Database statistics (aggregate, user-facing summary of an AA descriptor)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DbStats {
    /// Size of database in pages
    pub psize: u32,
    /// Depth of B-tree
    pub depth: u32,
    /// Number of internal pages
    pub branch_pages: u64,
    /// Number of leaf pages
    pub leaf_pages: u64,
    /// Number of overflow pages
    pub overflow_pages: u64,
    /// Number of entries
    pub entries: u64,
}

/// Datafile geometry, all fields in pages.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    /// Minimum allowed file size
    pub lower: u64,
    /// Maximum allowed file size
    pub upper: u64,
    /// Current file size
    pub now: u64,
    /// Page number of the next unallocated page
    pub next: u64,
    /// Growth step when the file must be extended
    pub grow: u32,
    /// Shrink threshold (0 disables auto-shrink)
    pub shrink: u32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self { lower: 0, upper: 0, now: 0, next: 0, grow: 0, shrink: 0 }
    }
}

/// Associative array (AA) descriptor: persistent metadata for one B+tree.
///
/// The two core descriptors (the free-space tree, index 0, and the main
/// user tree, index 1) live directly in the meta page. Named sub-databases
/// carry this same shape inside `SUBTREE` nodes of the main tree.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DbInfo {
    /// Database flags (duplicates sorted/fixed, integer key/value, ...)
    pub flags: u32,
    /// Depth of tree
    pub depth: u32,
    /// Number of branch pages
    pub branch_pages: u64,
    /// Number of leaf pages
    pub leaf_pages: u64,
    /// Number of overflow pages
    pub overflow_pages: u64,
    /// Number of entries
    pub entries: u64,
    /// Root page number
    pub root: PageId,
    /// Last key page for append optimization (0 = not cached)
    pub last_key_page: PageId,
    /// Dense-fixed-leaf element size (0 when the tree isn't DUPFIXED)
    pub xsize: u32,
    /// Per-array monotonic sequence counter, bumped on every structural change
    pub genseq: u64,
    /// Transaction id at which this array was created
    pub created: TransactionId,
    /// Rolling CRC32 over the counters above; a cheap corruption tripwire,
    /// not a cryptographic guarantee
    pub merkle: u32,
}

impl Default for DbInfo {
    fn default() -> Self {
        Self {
            flags: 0,
            depth: 0,
            branch_pages: 0,
            leaf_pages: 0,
            overflow_pages: 0,
            entries: 0,
            root: PageId(0),
            last_key_page: PageId(0),
            xsize: 0,
            genseq: 0,
            created: TransactionId(0),
            merkle: 0,
        }
    }
}

impl DbInfo {
    /// Recompute `merkle` and bump `genseq`. Call after any structural
    /// change (insert/delete/split/merge) that alters entries, depth, or
    /// page counts.
    pub fn touch(&mut self, txn_id: TransactionId) {
        self.genseq += 1;
        if self.created.0 == 0 {
            self.created = txn_id;
        }
        self.merkle = self.compute_merkle();
    }

    fn compute_merkle(&self) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(&self.flags.to_le_bytes());
        hasher.update(&self.depth.to_le_bytes());
        hasher.update(&self.branch_pages.to_le_bytes());
        hasher.update(&self.leaf_pages.to_le_bytes());
        hasher.update(&self.overflow_pages.to_le_bytes());
        hasher.update(&self.entries.to_le_bytes());
        hasher.update(&self.root.0.to_le_bytes());
        hasher.update(&self.genseq.to_le_bytes());
        hasher.finalize()
    }
}

/// Meta page structure - contains database metadata.
///
/// The two transaction-id fields (`txnid_a` at the front, `txnid_b` at the
/// back) bracket the body: a clean write leaves them equal, a write torn by
/// a crash leaves them different, and [`MetaPage::validate`] rejects it.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MetaPage {
    /// Magic number plus format version
    pub magic: u64,
    /// Leading bracket: transaction id that wrote this page
    pub txnid_a: TransactionId,
    /// Database flags
    pub flags: u32,
    /// Database page size
    pub psize: u32,
    /// Max reader slots
    pub maxreaders: u32,
    /// Number of named databases tracked via the catalog
    pub dbs: u32,
    /// Last page number in use in the database
    pub last_pg: PageId,
    /// Total map size
    pub mapsize: u64,
    /// Datafile geometry
    pub geo: Geometry,
    /// Main (user) database descriptor
    pub main_db: DbInfo,
    /// Free-space (GACO) database descriptor
    pub free_db: DbInfo,
    /// User-visible canary value, opaque to the engine
    pub canary: u64,
    /// Data-sync signature: 0 undefined, 1 weak, >=2 steady (a CRC32 of the body)
    pub datasync_sign: u64,
    /// Trailing bracket: must equal `txnid_a` for the page to be intact
    pub txnid_b: TransactionId,
}

impl Default for MetaPage {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaPage {
    /// Create a new, empty meta page at transaction 0.
    pub fn new() -> Self {
        Self {
            magic: MAGIC,
            txnid_a: TransactionId(0),
            flags: 0,
            psize: PAGE_SIZE as u32,
            maxreaders: 126,
            dbs: 2,
            last_pg: PageId(1),
            mapsize: 0,
            geo: Geometry::default(),
            main_db: DbInfo::default(),
            free_db: DbInfo::default(),
            canary: 0,
            datasync_sign: DATASYNC_NONE,
            txnid_b: TransactionId(0),
        }
    }

    /// The transaction id that committed this meta page.
    ///
    /// Only meaningful once [`validate`](Self::validate) confirms the page
    /// isn't torn (the two bracket fields agree).
    pub fn last_txnid(&self) -> TransactionId {
        self.txnid_a
    }

    /// Set both bracket fields to `id`, marking this page as committed by
    /// transaction `id`. The in-memory struct always has both set at once;
    /// the torn-write detection matters only for the bytes actually landed
    /// on disk by a crash mid-write.
    pub fn set_txnid(&mut self, id: TransactionId) {
        self.txnid_a = id;
        self.txnid_b = id;
    }

    /// Whether this page is "steady": fsynced, with a durable signature.
    pub fn is_steady(&self) -> bool {
        self.datasync_sign >= DATASYNC_STEADY_MIN
    }

    /// Mark this page as steady, storing a CRC32 of the body as the signature.
    pub fn mark_steady(&mut self) {
        self.datasync_sign = self.compute_body_crc().max(DATASYNC_STEADY_MIN);
    }

    /// Mark this page as weak: written, not yet fsynced.
    pub fn mark_weak(&mut self) {
        self.datasync_sign = DATASYNC_WEAK;
    }

    fn compute_body_crc(&self) -> u64 {
        let mut hasher = Hasher::new();
        hasher.update(&self.magic.to_le_bytes());
        hasher.update(&self.txnid_a.0.to_le_bytes());
        hasher.update(&self.flags.to_le_bytes());
        hasher.update(&self.psize.to_le_bytes());
        hasher.update(&self.last_pg.0.to_le_bytes());
        hasher.update(&self.mapsize.to_le_bytes());
        hasher.update(&self.main_db.merkle.to_le_bytes());
        hasher.update(&self.free_db.merkle.to_le_bytes());
        hasher.finalize() as u64
    }

    /// Validate the meta page: magic, version, page size, and the
    /// bracketing-txnid torn-write check.
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            let found_version = (self.magic & 0xff) as u32;
            if self.magic >> 8 == MAGIC_PRIME {
                return Err(Error::VersionMismatch { expected: DB_VERSION as u32, found: found_version });
            }
            return Err(Error::Corruption {
                details: format!("Invalid magic number: 0x{:x}", self.magic),
                page_id: None,
            });
        }

        if self.psize as usize != PAGE_SIZE {
            return Err(Error::Corruption {
                details: format!("Invalid page size: {}", self.psize),
                page_id: None,
            });
        }

        if self.txnid_a != self.txnid_b {
            return Err(Error::Corruption {
                details: format!(
                    "Torn meta page: leading txnid {} != trailing txnid {}",
                    self.txnid_a.0, self.txnid_b.0
                ),
                page_id: None,
            });
        }

        Ok(())
    }

    /// Convert to a page at the given page number.
    pub fn to_page(&self, pgno: u64) -> Box<Page> {
        let mut page = Page::new(PageId(pgno), PageFlags::META);

        unsafe {
            let meta_ptr = page.data.as_mut_ptr() as *mut MetaPage;
            *meta_ptr = *self;
        }

        page
    }

    /// Read a meta page out of a page's data area.
    pub fn from_page(page: &Page) -> Result<&Self> {
        if !page.header.flags.contains(PageFlags::META) {
            return Err(Error::InvalidPageType {
                expected: crate::error::PageType::Meta,
                found: page.header.page_type(),
            });
        }

        let meta = unsafe { &*(page.data.as_ptr() as *const MetaPage) };
        meta.validate()?;
        Ok(meta)
    }
}

const_assert!(size_of::<MetaPage>() < PAGE_SIZE - size_of::<crate::page::PageHeader>());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_page_size() {
        assert!(size_of::<MetaPage>() < PAGE_SIZE - size_of::<crate::page::PageHeader>());
    }

    #[test]
    fn test_meta_page_validation() {
        let mut meta = MetaPage::new();
        meta.set_txnid(TransactionId(1));
        assert!(meta.validate().is_ok());

        let mut bad_magic = meta;
        bad_magic.magic = 0xDEADBEEF;
        assert!(bad_magic.validate().is_err());

        let mut torn = meta;
        torn.txnid_b = TransactionId(2);
        assert!(torn.validate().is_err());
    }

    #[test]
    fn test_meta_page_conversion() {
        let mut meta = MetaPage::new();
        meta.set_txnid(TransactionId(1));
        let page = meta.to_page(0);

        assert!(page.header.flags.contains(PageFlags::META));

        let meta2 = MetaPage::from_page(&page).unwrap();
        assert_eq!(meta2.magic, MAGIC);
        assert_eq!(meta2.last_txnid(), TransactionId(1));
    }

    #[test]
    fn test_datasync_signature_levels() {
        let mut meta = MetaPage::new();
        assert_eq!(meta.datasync_sign, DATASYNC_NONE);
        assert!(!meta.is_steady());

        meta.mark_weak();
        assert_eq!(meta.datasync_sign, DATASYNC_WEAK);
        assert!(!meta.is_steady());

        meta.mark_steady();
        assert!(meta.is_steady());
    }

    #[test]
    fn test_db_info_touch_bumps_genseq_and_merkle() {
        let mut info = DbInfo::default();
        assert_eq!(info.genseq, 0);
        assert_eq!(info.created, TransactionId(0));

        info.touch(TransactionId(5));
        assert_eq!(info.genseq, 1);
        assert_eq!(info.created, TransactionId(5));
        let first_merkle = info.merkle;

        info.entries += 1;
        info.touch(TransactionId(6));
        assert_eq!(info.genseq, 2);
        // created is sticky to the first touch
        assert_eq!(info.created, TransactionId(5));
        assert_ne!(info.merkle, first_merkle);
    }
}
