//! Environment management with type-state pattern

use parking_lot::Mutex;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::mem::size_of;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, RwLock};

use crate::error::{Error, PageId, Result, TransactionId};
use crate::io::{IoBackend, MmapBackend};
use crate::meta::{DbInfo, MetaPage, META_PAGES};
use crate::page::Page;
use crate::reader::ReaderTable;
use crate::txn::{Read, Transaction, Write};



/// Environment state marker traits
pub mod state {
    /// Sealed trait for environment states
    mod sealed {
        pub trait Sealed {}
    }

    /// Environment state trait
    pub trait State: sealed::Sealed {}

    /// Closed environment state
    #[derive(Debug)]
    pub struct Closed;
    impl sealed::Sealed for Closed {}
    impl State for Closed {}

    /// Open environment state
    #[derive(Debug)]
    pub struct Open;
    impl sealed::Sealed for Open {}
    impl State for Open {}

    /// Read-only environment state
    #[derive(Debug)]
    pub struct ReadOnly;
    impl sealed::Sealed for ReadOnly {}
    impl State for ReadOnly {}
}

use state::*;

/// Maximum number of named databases
pub const MAX_DBS: u32 = 128;

/// Default map size (1GB)
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;

/// Durability modes for write transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// No sync - fastest but no durability guarantees
    NoSync,
    /// Async sync - data is flushed asynchronously (default)
    AsyncFlush,
    /// Sync data pages only - metadata might be lost
    SyncData,
    /// Full sync - both data and metadata are synced (safest)
    FullSync,
}



/// Shared environment data
pub(crate) struct EnvInner {
    /// Path to the database
    _path: PathBuf,
    /// I/O backend
    pub(crate) io: Box<dyn IoBackend>,
    /// Current map size
    pub(crate) map_size: usize,
    /// Current transaction ID
    pub(crate) txn_id: AtomicU64,
    /// Write lock
    pub(crate) write_lock: Mutex<()>,
    /// Reader table
    pub(crate) readers: ReaderTable,
    /// Named databases
    pub(crate) databases: RwLock<HashMap<Option<String>, DbInfo>>,
    /// Free pages tracking
    pub(crate) _free_pages: RwLock<Vec<PageId>>,
    /// Durability mode
    pub(crate) durability: DurabilityMode,
    /// Whether reclaimed GACO pages are consumed LIFO (most-recently-freed
    /// first) instead of the default FIFO (oldest-safe-txn first)
    pub(crate) lifo_reclaimed: bool,

    /// Next page ID to allocate
    pub(crate) next_page_id: AtomicU64,


}

// Safety: EnvInner is Send/Sync because IoBackend is Send/Sync
unsafe impl Send for EnvInner {}
unsafe impl Sync for EnvInner {}

impl EnvInner {
    /// Read and validate all three meta pages, discarding any that are torn
    /// (mismatched bracketing txnids) or fail the magic/size checks.
    fn read_candidate_metas(&self) -> Result<Vec<MetaPage>> {
        let mut candidates = Vec::with_capacity(META_PAGES.len());

        for &page_id in META_PAGES.iter() {
            let raw = match self.io.read_page(page_id) {
                Ok(page) => page,
                Err(_) => continue,
            };

            if size_of::<MetaPage>() > raw.data.len() {
                return Err(Error::Corruption {
                    details: "MetaPage size exceeds page data".into(),
                    page_id: Some(page_id),
                });
            }
            if raw.data.as_ptr() as usize % std::mem::align_of::<MetaPage>() != 0 {
                return Err(Error::Corruption {
                    details: "MetaPage not properly aligned".into(),
                    page_id: Some(page_id),
                });
            }

            let meta = unsafe { &*(raw.data.as_ptr() as *const MetaPage) };
            if meta.validate().is_ok() {
                candidates.push(*meta);
            } else {
                tracing::debug!(?page_id, "discarding torn or invalid meta page");
            }
        }

        Ok(candidates)
    }

    /// Get the current meta page: the highest-txnid steady meta wins; if
    /// none is steady but at least one is intact, the highest-txnid weak
    /// meta is accepted.
    pub(crate) fn meta(&self) -> Result<MetaPage> {
        let candidates = self.read_candidate_metas()?;

        let steady = candidates
            .iter()
            .filter(|m| m.is_steady())
            .max_by_key(|m| m.last_txnid().0);
        if let Some(meta) = steady {
            tracing::trace!(txnid = meta.last_txnid().0, "selected steady meta page");
            return Ok(*meta);
        }

        let fallback = candidates
            .iter()
            .max_by_key(|m| m.last_txnid().0)
            .copied()
            .ok_or(Error::Corrupted)?;
        tracing::warn!(
            txnid = fallback.last_txnid().0,
            "no steady meta page found, falling back to highest-txnid weak meta"
        );
        Ok(fallback)
    }

    /// Get the meta page ID the next commit should write to: transaction
    /// `N` writes page `N mod 3`.
    pub(crate) fn next_meta_page_id(&self) -> Result<PageId> {
        let meta = self.meta()?;
        let next_txnid = meta.last_txnid().0 + 1;
        Ok(META_PAGES[(next_txnid % META_PAGES.len() as u64) as usize])
    }
}

/// Database environment
pub struct Environment<S: State = Closed> {
    inner: Option<Arc<EnvInner>>,
    _state: PhantomData<S>,
}

/// Builder for creating environments
pub struct EnvBuilder {
    map_size: usize,
    max_readers: u32,
    max_dbs: u32,
    _flags: u32,
    durability: DurabilityMode,
    lifo_reclaimed: bool,
}

impl EnvBuilder {
    /// Create a new environment builder
    pub fn new() -> Self {
        Self {
            map_size: DEFAULT_MAP_SIZE,
            max_readers: 126,
            max_dbs: MAX_DBS,
            _flags: 0,
            durability: DurabilityMode::AsyncFlush,
            lifo_reclaimed: false,
        }
    }

    /// Set the map size
    pub fn map_size(mut self, size: usize) -> Self {
        self.map_size = size;
        self
    }

    /// Set the maximum number of readers
    pub fn max_readers(mut self, readers: u32) -> Self {
        self.max_readers = readers;
        self
    }

    /// Set the maximum number of named databases
    pub fn max_dbs(mut self, dbs: u32) -> Self {
        self.max_dbs = dbs.min(MAX_DBS);
        self
    }

    /// Set the durability mode
    pub fn durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode;
        self
    }

    /// Reclaim GACO pages LIFO (most-recently-freed first) instead of the
    /// default FIFO (oldest-safe-txn first). Keeps hot pages hot at the
    /// cost of letting cold pages sit unreclaimed longer.
    pub fn lifo_reclaim(mut self, enabled: bool) -> Self {
        self.lifo_reclaimed = enabled;
        self
    }


    /// Build and open the environment
    pub fn open(self, path: impl AsRef<Path>) -> Result<Environment<Open>> {
        let path = path.as_ref();

        // Create directory if it doesn't exist
        std::fs::create_dir_all(path)?;

        let data_path = path.join("data.mdb");
        let _lock_path = path.join("lock.mdb");

        // Create I/O backend
        let mut io: Box<dyn IoBackend> =
            Box::new(MmapBackend::with_options(&data_path, self.map_size as u64)?);

        // Check if this is a new database by trying to read meta page 0
        let is_new_db = match io.read_page(crate::meta::META_PAGE_0) {
            Ok(page) => {
                let meta = unsafe { &*(page.data.as_ptr() as *const MetaPage) };
                meta.magic != crate::meta::MAGIC
            }
            Err(_) => true,
        };

        // Page layout: meta0, meta1, meta2, free-db root (3), main-db root (4).
        const FREE_DB_ROOT: u64 = 3;
        const MAIN_DB_ROOT: u64 = 4;

        let last_txn_id;
        let mut last_page_id = MAIN_DB_ROOT;
        let meta_info;

        if is_new_db {
            // Initialize new database
            let mut meta = MetaPage::new();
            meta.mapsize = self.map_size as u64;
            meta.maxreaders = self.max_readers;
            meta.dbs = self.max_dbs;
            meta.free_db.root = PageId(FREE_DB_ROOT);
            meta.main_db.root = PageId(MAIN_DB_ROOT);
            meta.last_pg = PageId(MAIN_DB_ROOT);
            meta.geo.now = MAIN_DB_ROOT + 1;
            meta.geo.next = MAIN_DB_ROOT + 1;
            meta.set_txnid(TransactionId(1));
            meta.mark_steady();

            // All three meta pages start out identical and steady; the
            // first write transaction will rotate onto page 1.
            for &page_id in crate::meta::META_PAGES.iter() {
                let meta_page = Page::from_meta(&meta, page_id);
                io.write_page(&meta_page)?;
            }

            // Initialize free DB root page
            let free_page = Page::new(PageId(FREE_DB_ROOT), crate::page::PageFlags::LEAF);
            io.write_page(&free_page)?;

            // Initialize main DB root page
            let main_page = Page::new(PageId(MAIN_DB_ROOT), crate::page::PageFlags::LEAF);
            io.write_page(&main_page)?;

            // Sync to disk
            io.sync()?;

            last_txn_id = 1;
            meta_info = meta;
        } else {
            // Load existing meta info
            let inner = Arc::new(EnvInner {
                _path: path.to_path_buf(),
                io,
                map_size: self.map_size,
                txn_id: AtomicU64::new(0),
                write_lock: Mutex::new(()),
                readers: ReaderTable::new(self.max_readers as usize),
                databases: RwLock::new(HashMap::new()),
                _free_pages: RwLock::new(Vec::new()),
                durability: self.durability,
                lifo_reclaimed: self.lifo_reclaimed,
                next_page_id: AtomicU64::new(0),
            });

            meta_info = inner.meta()?;
            last_txn_id = meta_info.last_txnid().0;
            last_page_id = meta_info.last_pg.0;

            // Recreate with correct values
            drop(inner);
            io = Box::new(MmapBackend::with_options(&data_path, self.map_size as u64)?);
        }

        // Initialize reader table
        let readers = ReaderTable::new(self.max_readers as usize);

        let inner = Arc::new(EnvInner {
            _path: path.to_path_buf(),
            io,
            map_size: self.map_size,
            txn_id: AtomicU64::new(last_txn_id),
            write_lock: Mutex::new(()),
            readers,
            databases: RwLock::new(HashMap::new()),
            _free_pages: RwLock::new(Vec::new()),
            durability: self.durability,
            lifo_reclaimed: self.lifo_reclaimed,
            next_page_id: AtomicU64::new(last_page_id + 1),
        });

        // Initialize main database entry
        {
            let mut dbs = inner.databases.write()
                .expect("Failed to acquire database lock during initialization");
            dbs.insert(None, meta_info.main_db);
        }

        // Note: Named databases will be loaded on-demand from the catalog
        // We can't load them here because we'd need a transaction, but the
        // environment isn't fully constructed yet

        Ok(Environment { inner: Some(inner), _state: PhantomData })
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for Environment<Closed> {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment<Closed> {
    /// Create a new closed environment
    pub fn new() -> Self {
        Self { inner: None, _state: PhantomData }
    }

    /// Open the environment
    pub fn open(self, path: impl AsRef<Path>) -> Result<Environment<Open>> {
        EnvBuilder::new().open(path)
    }
}

impl Environment<Open> {
    /// Begin a read transaction
    pub fn read_txn(&self) -> Result<Transaction<'_, Read>> {
        Transaction::new_read(self)
    }

    /// Begin a write transaction
    pub fn write_txn(&self) -> Result<Transaction<'_, Write>> {
        Transaction::new_write(self)
    }

    /// Get inner reference (for internal use)
    pub(crate) fn inner(&self) -> &Arc<EnvInner> {
        self.inner.as_ref().expect("Environment not open")
    }



    /// Get inner reference (for testing)
    #[cfg(test)]
    #[allow(dead_code)]
    pub(crate) fn inner_test(&self) -> &Arc<EnvInner> {
        self.inner()
    }

    /// Sync data to disk
    pub fn sync(&self) -> Result<()> {
        let inner = self.inner();
        match inner.durability {
            DurabilityMode::NoSync => {
                // No sync requested
                Ok(())
            }
            DurabilityMode::AsyncFlush | DurabilityMode::SyncData | DurabilityMode::FullSync => {
                inner.io.sync()?;
                Ok(())
            }
        }
    }

    /// Force a full synchronous sync regardless of durability mode
    pub fn force_sync(&self) -> Result<()> {
        let inner = self.inner();
        inner.io.sync()?;
        Ok(())
    }
    
    /// Get current space usage information
    pub fn space_info(&self) -> Result<crate::space_info::SpaceInfo> {
        let inner = self.inner();
        let total_pages = inner.io.size_in_pages();
        let next_page_id = inner.next_page_id.load(std::sync::atomic::Ordering::Acquire);
        
        // Get free pages count from a read transaction
        let free_pages = {
            let _txn = self.read_txn()?;
            // Count regular freelist pages
            total_pages.saturating_sub(next_page_id)
        };
        
        let used_pages = next_page_id;
        let map_size = inner.map_size as u64;
        
        Ok(crate::space_info::SpaceInfo::new(
            total_pages,
            used_pages,
            free_pages,
            map_size,
        ))
    }

    /// Get environment statistics
    pub fn stat(&self) -> Result<crate::meta::DbStats> {
        let inner = self.inner();
        let meta = inner.meta()?;

        Ok(crate::meta::DbStats {
            psize: meta.psize,
            depth: meta.main_db.depth,
            branch_pages: meta.main_db.branch_pages,
            leaf_pages: meta.main_db.leaf_pages,
            overflow_pages: meta.main_db.overflow_pages,
            entries: meta.main_db.entries,
        })
    }
}

impl<S: State> Drop for Environment<S> {
    fn drop(&mut self) {
        if let Some(_inner) = self.inner.take() {
            // Meta page alternation handled in commit
        }
    }
}
