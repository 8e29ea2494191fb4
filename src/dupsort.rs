//! Duplicate key support (DUPSORT) implementation
//!
//! This module provides support for storing multiple values per key in a sorted manner.
//! When DUPSORT is enabled, a key's duplicate values live in one of three tiers,
//! promoted as the set grows and demoted again as it shrinks:
//!
//!  1. a single inline value (`SINGLE_VALUE_MARKER`)
//!  2. a handful of values packed into an inline mini-page living in the
//!     node's own value bytes (`InlineSubPage`, the `SUBP` tier)
//!  3. a persistent sub-tree once the run no longer fits inline
//!     (`SUB_DB_MARKER`), optionally a dense-fixed-leaf (`DflPage`) when the
//!     owning database is `DUP_FIXED` and the whole run still fits one page
//!
//! Optimizations:
//! - Single value optimization (avoid sub-database for single values)
//! - Inline mini-page optimization (avoid a sub-database for small runs)
//! - Proper page freeing when deleting keys
//! - Full B+Tree traversal in iterator

use crate::btree::BTree;
use crate::comparator::LexicographicComparator;
use crate::dfl::DflPage;
use crate::error::{Error, PageId, Result};
use crate::meta::DbInfo;
use crate::page::{PageFlags, SearchResult};
use crate::subpage::InlineSubPage;
use crate::txn::{Transaction, Write};

/// Duplicate sort node - stores multiple values for a single key
#[derive(Debug)]
pub struct DupNode {
    /// The key
    pub key: Vec<u8>,
    /// Database info for the sub-database containing values
    pub sub_db: DbInfo,
}

/// Magic byte to distinguish single values from sub-databases
const SINGLE_VALUE_MARKER: u8 = 0xFF;
const SUB_DB_MARKER: u8 = 0xFE;

/// Duplicate sort handler
pub struct DupSort;

impl DupSort {
    /// Check if a database has duplicate sort enabled
    pub fn is_dupsort(flags: u32) -> bool {
        flags & crate::db::DatabaseFlags::DUP_SORT.bits() != 0
    }

    /// Check if a value is a sub-database reference
    pub fn is_sub_db(value: &[u8]) -> bool {
        !value.is_empty()
            && value[0] == SUB_DB_MARKER
            && value.len() == 1 + std::mem::size_of::<DbInfo>()
    }

    /// Check if a value is a single value (optimization for single duplicate)
    pub fn is_single_value(value: &[u8]) -> bool {
        !value.is_empty() && value[0] == SINGLE_VALUE_MARKER
    }

    /// Encode a single value with marker
    fn encode_single_value(value: &[u8]) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(1 + value.len());
        encoded.push(SINGLE_VALUE_MARKER);
        encoded.extend_from_slice(value);
        encoded
    }

    /// Decode a single value
    pub fn decode_single_value(data: &[u8]) -> Result<&[u8]> {
        if !data.is_empty() && data[0] == SINGLE_VALUE_MARKER {
            Ok(&data[1..])
        } else {
            Err(Error::Custom("Not a single value".into()))
        }
    }

    /// Width to pack duplicate values at when the owning database is
    /// `DUP_FIXED` and every value in `values` shares that width. `None`
    /// when the database isn't fixed-width or the run isn't uniform, in
    /// which case the inline/persistent tiers fall back to variable-length
    /// encoding.
    fn uniform_xsize(parent_flags: u32, values: &[Vec<u8>]) -> Option<u16> {
        if parent_flags & crate::db::DatabaseFlags::DUP_FIXED.bits() == 0 {
            return None;
        }
        let width = values.first()?.len();
        if width == 0 || width > u16::MAX as usize {
            return None;
        }
        if values.iter().all(|v| v.len() == width) {
            Some(width as u16)
        } else {
            None
        }
    }

    /// Replace the node value for `key`, which already exists, with a new
    /// encoding of its duplicate set. The outer key isn't changing, only
    /// the bytes stored for it, so this goes through `update_value` rather
    /// than a delete+insert pair.
    fn replace_value(
        txn: &mut Transaction<'_, Write>,
        db_info: &DbInfo,
        key: &[u8],
        encoded: &[u8],
    ) -> Result<()> {
        BTree::<LexicographicComparator>::update_value(txn, db_info.root, key, encoded)
    }

    /// Build a fresh sub-database root holding `values`. Packs a
    /// dense-fixed-leaf when the parent database is `DUP_FIXED`, every
    /// value shares a width, and the whole run fits one page; otherwise
    /// builds an ordinary node-based sub-tree.
    fn build_sub_db(
        txn: &mut Transaction<'_, Write>,
        parent_flags: u32,
        values: &[Vec<u8>],
    ) -> Result<DbInfo> {
        if let Some(xsize) = Self::uniform_xsize(parent_flags, values) {
            if values.len() <= DflPage::capacity(xsize as usize) {
                let txn_id = txn.id();
                let (root, page) = txn.alloc_page(PageFlags::LEAF)?;
                DflPage::init(page, xsize as u32);
                for v in values {
                    DflPage::insert(page, v)?;
                }
                let mut sub_db = DbInfo {
                    flags: crate::db::DatabaseFlags::DUP_SORT.bits()
                        | crate::db::DatabaseFlags::DUP_FIXED.bits(),
                    depth: 0,
                    branch_pages: 0,
                    leaf_pages: 1,
                    overflow_pages: 0,
                    entries: values.len() as u64,
                    root,
                    last_key_page: PageId(0),
                    xsize: xsize as u32,
                    ..Default::default()
                };
                sub_db.touch(txn_id);
                return Ok(sub_db);
            }
        }

        let (sub_root, _) = txn.alloc_page(PageFlags::LEAF)?;
        let mut sub_db = DbInfo {
            flags: crate::db::DatabaseFlags::DUP_SORT.bits(),
            depth: 0,
            branch_pages: 0,
            leaf_pages: 1,
            overflow_pages: 0,
            entries: 0,
            root: sub_root,
            last_key_page: PageId(0),
            ..Default::default()
        };

        let mut sub_root = sub_db.root;
        for v in values {
            BTree::<LexicographicComparator>::insert(txn, &mut sub_root, &mut sub_db, v, &[])?;
        }
        sub_db.root = sub_root;
        Ok(sub_db)
    }

    /// Convert a dense-fixed-leaf root that just overflowed its single-page
    /// capacity back into an ordinary node-based sub-tree holding the same
    /// values, reusing the root page id.
    fn demote_dfl_root(txn: &mut Transaction<'_, Write>, sub_db: &mut DbInfo) -> Result<()> {
        let page = txn.get_page(sub_db.root)?;
        let n = page.header.num_keys as usize;
        let mut values = Vec::with_capacity(n);
        for i in 0..n {
            values.push(DflPage::get(page, i)?.to_vec());
        }

        let page = txn.get_page_mut(sub_db.root)?;
        page.header.flags.remove(PageFlags::DUPFIXED);
        page.header.overflow = 0;
        page.header.num_keys = 0;
        page.header.lower = crate::page::PageHeader::SIZE as u16;
        page.header.upper = crate::page::PAGE_SIZE as u16;

        sub_db.entries = 0;
        sub_db.xsize = 0;
        sub_db.flags &= !crate::db::DatabaseFlags::DUP_FIXED.bits();

        let mut sub_root = sub_db.root;
        for v in &values {
            BTree::<LexicographicComparator>::insert(txn, &mut sub_root, sub_db, v, &[])?;
        }
        sub_db.root = sub_root;
        Ok(())
    }

    /// Insert `value` into an existing sub-database, routing through the
    /// dense-fixed-leaf path when the root is still packed that way and
    /// falling back to the ordinary node-based sub-tree once it overflows
    /// a single page.
    fn sub_db_insert_value(
        txn: &mut Transaction<'_, Write>,
        sub_db: &mut DbInfo,
        value: &[u8],
    ) -> Result<()> {
        let is_dfl_root = txn.get_page(sub_db.root)?.header.flags.contains(PageFlags::DUPFIXED);

        if is_dfl_root {
            let page = txn.get_page_mut(sub_db.root)?;
            match DflPage::insert(page, value) {
                Ok(_) => {
                    sub_db.entries += 1;
                    sub_db.touch(txn.id());
                    Ok(())
                }
                Err(Error::Custom(ref msg)) if msg.as_ref() == "Duplicate value already exists" => Ok(()),
                Err(Error::Custom(ref msg)) if msg.as_ref() == "Page full" => {
                    Self::demote_dfl_root(txn, sub_db)?;
                    let mut sub_root = sub_db.root;
                    BTree::<LexicographicComparator>::insert(txn, &mut sub_root, sub_db, value, &[])?;
                    sub_db.root = sub_root;
                    Ok(())
                }
                Err(e) => Err(e),
            }
        } else {
            let mut sub_root = sub_db.root;
            BTree::<LexicographicComparator>::insert(txn, &mut sub_root, sub_db, value, &[])?;
            sub_db.root = sub_root;
            Ok(())
        }
    }

    /// Remove `value` from a sub-database, dense-fixed-leaf aware. Returns
    /// whether the value was actually present.
    fn sub_db_remove_value(
        txn: &mut Transaction<'_, Write>,
        sub_db: &mut DbInfo,
        value: &[u8],
    ) -> Result<bool> {
        let is_dfl_root = txn.get_page(sub_db.root)?.header.flags.contains(PageFlags::DUPFIXED);

        if is_dfl_root {
            let page = txn.get_page(sub_db.root)?;
            match DflPage::search(page, value) {
                Ok(SearchResult::Found { index }) => {
                    let page = txn.get_page_mut(sub_db.root)?;
                    DflPage::remove(page, index)?;
                    sub_db.entries -= 1;
                    sub_db.touch(txn.id());
                    Ok(true)
                }
                Ok(SearchResult::NotFound { .. }) => Ok(false),
                Err(_) => Ok(false),
            }
        } else {
            let mut sub_root = sub_db.root;
            let result = BTree::<LexicographicComparator>::delete(txn, &mut sub_root, sub_db, value)?;
            sub_db.root = sub_root;
            Ok(result.is_some())
        }
    }

    /// Read the lone remaining value out of a one-entry sub-database, DFL
    /// root or ordinary leaf alike.
    fn sole_sub_db_value(txn: &Transaction<'_, Write>, sub_db: &DbInfo) -> Result<Vec<u8>> {
        let page = txn.get_page(sub_db.root)?;
        if page.header.flags.contains(PageFlags::DUPFIXED) {
            Ok(DflPage::get(page, 0)?.to_vec())
        } else if page.header.num_keys > 0 {
            Ok(page.node(0)?.key()?.to_vec())
        } else {
            Err(Error::Corruption {
                details: "Sub-database has 1 entry but no keys".into(),
                page_id: Some(sub_db.root),
            })
        }
    }

    /// Insert a duplicate value
    pub fn insert(
        txn: &mut Transaction<'_, Write>,
        db_info: &mut DbInfo,
        key: &[u8],
        value: &[u8],
    ) -> Result<bool> {
        // First, search for the key in the main database
        let search_result = BTree::<LexicographicComparator>::search(
            txn as &Transaction<'_, Write>,
            db_info.root,
            key,
        )?;
        match search_result {
            Some(existing_data) => {
                let existing_data = existing_data.into_owned();

                if Self::is_single_value(&existing_data) {
                    // Optimization: Only one value exists
                    let existing_value = Self::decode_single_value(&existing_data)?.to_vec();
                    if existing_value == value {
                        return Ok(false); // Same value, nothing to do
                    }

                    let mut values = vec![existing_value, value.to_vec()];
                    values.sort();
                    values.dedup();

                    let xsize = Self::uniform_xsize(db_info.flags, &values);
                    let inline = InlineSubPage::encode(&values, xsize);

                    if inline.len() <= crate::page::MAX_VALUE_SIZE {
                        Self::replace_value(txn, db_info, key, &inline)?;
                    } else {
                        let sub_db = Self::build_sub_db(txn, db_info.flags, &values)?;
                        let encoded = Self::encode_sub_db(&sub_db);
                        Self::replace_value(txn, db_info, key, &encoded)?;
                    }
                    Ok(false)
                } else if InlineSubPage::is_inline_subp(&existing_data) {
                    // Inline mini-page tier: merge the new value in, sorted.
                    let mut values = InlineSubPage::decode(&existing_data)?;
                    match values.binary_search(&value.to_vec()) {
                        Ok(_) => return Ok(false), // already present
                        Err(pos) => values.insert(pos, value.to_vec()),
                    }

                    let xsize = Self::uniform_xsize(db_info.flags, &values);
                    let inline = InlineSubPage::encode(&values, xsize);

                    if inline.len() <= crate::page::MAX_VALUE_SIZE {
                        Self::replace_value(txn, db_info, key, &inline)?;
                    } else {
                        // Outgrown the inline tier, promote to a real sub-tree.
                        let sub_db = Self::build_sub_db(txn, db_info.flags, &values)?;
                        let encoded = Self::encode_sub_db(&sub_db);
                        Self::replace_value(txn, db_info, key, &encoded)?;
                    }
                    Ok(false)
                } else if Self::is_sub_db(&existing_data) {
                    // It's already a sub-database, add to it
                    let mut sub_db = Self::decode_sub_db(&existing_data)?;
                    Self::sub_db_insert_value(txn, &mut sub_db, value)?;
                    let encoded = Self::encode_sub_db(&sub_db);
                    Self::replace_value(txn, db_info, key, &encoded)?;
                    Ok(false) // Key already existed
                } else {
                    // Not marked as single value, inline, or sub-db - legacy
                    // case where the value is stored directly. Promote it.
                    if existing_data == value {
                        return Ok(false);
                    }

                    let mut values = vec![existing_data, value.to_vec()];
                    values.sort();
                    values.dedup();

                    let xsize = Self::uniform_xsize(db_info.flags, &values);
                    let inline = InlineSubPage::encode(&values, xsize);

                    if inline.len() <= crate::page::MAX_VALUE_SIZE {
                        Self::replace_value(txn, db_info, key, &inline)?;
                    } else {
                        let sub_db = Self::build_sub_db(txn, db_info.flags, &values)?;
                        let encoded = Self::encode_sub_db(&sub_db);
                        Self::replace_value(txn, db_info, key, &encoded)?;
                    }
                    Ok(false) // Key already existed
                }
            }
            None => {
                // Key doesn't exist - optimization: store as single value
                let encoded = Self::encode_single_value(value);
                let mut root = db_info.root;
                BTree::<LexicographicComparator>::insert(txn, &mut root, db_info, key, &encoded)?;
                db_info.root = root;
                Ok(true) // New key
            }
        }
    }

    /// Get all values for a key
    pub fn get_all<'txn>(
        txn: &Transaction<'txn, impl crate::txn::mode::Mode>,
        root: PageId,
        key: &[u8],
    ) -> Result<Vec<Vec<u8>>> {
        match BTree::<LexicographicComparator>::search(txn, root, key)? {
            Some(value) => {
                if Self::is_single_value(&value) {
                    // Single value optimization
                    let single_value = Self::decode_single_value(&value)?;
                    Ok(vec![single_value.to_vec()])
                } else if InlineSubPage::is_inline_subp(&value) {
                    InlineSubPage::decode(&value)
                } else if Self::is_sub_db(&value) {
                    // It's a sub-database, iterate through all values
                    let sub_db = Self::decode_sub_db(&value)?;
                    let root_page = txn.get_page(sub_db.root)?;

                    if root_page.header.flags.contains(PageFlags::DUPFIXED) {
                        let n = root_page.header.num_keys as usize;
                        let mut values = Vec::with_capacity(n);
                        for i in 0..n {
                            values.push(DflPage::get(root_page, i)?.to_vec());
                        }
                        Ok(values)
                    } else {
                        let mut values = Vec::new();

                        // Use cursor to iterate through sub-database
                        let mut stack = vec![sub_db.root];
                        while let Some(page_id) = stack.pop() {
                            let page = txn.get_page(page_id)?;

                            if page.header.flags.contains(PageFlags::LEAF) {
                                for i in 0..page.header.num_keys as usize {
                                    let node = page.node(i)?;
                                    // In DUPSORT sub-databases, values are stored as keys
                                    // The actual value is the key of the sub-database node
                                    values.push(node.key()?.to_vec());
                                }
                            } else {
                                // Branch page - add children in reverse order for DFS
                                for i in (0..page.header.num_keys as usize).rev() {
                                    let node = page.node(i)?;
                                    stack.push(node.page_number()?);
                                }
                                stack.push(crate::branch::BranchPage::get_leftmost_child(page)?);
                            }
                        }

                        Ok(values)
                    }
                } else {
                    // Legacy case - value stored directly
                    Ok(vec![value.into_owned()])
                }
            }
            None => Ok(Vec::new()),
        }
    }

    /// Delete a specific value for a key
    pub fn delete(
        txn: &mut Transaction<'_, Write>,
        db_info: &mut DbInfo,
        key: &[u8],
        value: &[u8],
    ) -> Result<bool> {
        match BTree::<LexicographicComparator>::search(txn, db_info.root, key)? {
            Some(existing_value) => {
                let existing_value = existing_value.into_owned();

                if Self::is_single_value(&existing_value) {
                    // Single value optimization
                    let single_value = Self::decode_single_value(&existing_value)?;
                    if single_value == value {
                        // Single value matches, delete it
                        let mut root = db_info.root;
                        BTree::<LexicographicComparator>::delete(txn, &mut root, db_info, key)?;
                        db_info.root = root;
                        Ok(true)
                    } else {
                        // Single value doesn't match
                        Ok(false)
                    }
                } else if InlineSubPage::is_inline_subp(&existing_value) {
                    let mut values = InlineSubPage::decode(&existing_value)?;
                    match values.binary_search(&value.to_vec()) {
                        Ok(idx) => {
                            values.remove(idx);
                            if values.is_empty() {
                                let mut root = db_info.root;
                                BTree::<LexicographicComparator>::delete(txn, &mut root, db_info, key)?;
                                db_info.root = root;
                            } else if values.len() == 1 {
                                let encoded = Self::encode_single_value(&values[0]);
                                Self::replace_value(txn, db_info, key, &encoded)?;
                            } else {
                                let xsize = Self::uniform_xsize(db_info.flags, &values);
                                let encoded = InlineSubPage::encode(&values, xsize);
                                Self::replace_value(txn, db_info, key, &encoded)?;
                            }
                            Ok(true)
                        }
                        Err(_) => Ok(false),
                    }
                } else if Self::is_sub_db(&existing_value) {
                    // It's a sub-database
                    let mut sub_db = Self::decode_sub_db(&existing_value)?;

                    if Self::sub_db_remove_value(txn, &mut sub_db, value)? {
                        if sub_db.entries == 0 {
                            // Sub-database is empty, remove the key entirely
                            Self::free_sub_db_pages(txn, sub_db.root)?;
                            let mut root = db_info.root;
                            BTree::<LexicographicComparator>::delete(txn, &mut root, db_info, key)?;
                            db_info.root = root;
                        } else if sub_db.entries == 1 {
                            // Only one value left, convert back to single value optimization
                            let remaining_value = Self::sole_sub_db_value(txn, &sub_db)?;
                            Self::free_sub_db_pages(txn, sub_db.root)?;

                            let encoded = Self::encode_single_value(&remaining_value);
                            Self::replace_value(txn, db_info, key, &encoded)?;
                        } else {
                            // Update sub-database info
                            let encoded = Self::encode_sub_db(&sub_db);
                            Self::replace_value(txn, db_info, key, &encoded)?;
                        }
                        Ok(true)
                    } else {
                        Ok(false)
                    }
                } else {
                    // Legacy case - value stored directly
                    if existing_value == value {
                        // Value matches, delete it
                        let mut root = db_info.root;
                        BTree::<LexicographicComparator>::delete(txn, &mut root, db_info, key)?;
                        db_info.root = root;
                        Ok(true)
                    } else {
                        // Value doesn't match
                        Ok(false)
                    }
                }
            }
            None => Ok(false),
        }
    }

    /// Delete all values for a key
    pub fn delete_all(
        txn: &mut Transaction<'_, Write>,
        db_info: &mut DbInfo,
        key: &[u8],
    ) -> Result<bool> {
        let mut root = db_info.root;
        match BTree::<LexicographicComparator>::delete(txn, &mut root, db_info, key)? {
            Some(value) => {
                db_info.root = root;
                if Self::is_sub_db(&value) {
                    // It was a sub-database, free all its pages
                    let sub_db = Self::decode_sub_db(&value)?;
                    Self::free_sub_db_pages(txn, sub_db.root)?;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Free all pages in a sub-database recursively
    pub(crate) fn free_sub_db_pages(txn: &mut Transaction<'_, Write>, root: PageId) -> Result<()> {
        let mut stack = vec![root];

        while let Some(page_id) = stack.pop() {
            let page = txn.get_page(page_id)?;

            if !page.header.flags.contains(PageFlags::LEAF) {
                // Branch page - add all children to stack
                for i in 0..page.header.num_keys as usize {
                    let node = page.node(i)?;
                    stack.push(node.page_number()?);
                }

                // Also get leftmost child if it's a branch_v2 page
                if let Ok(leftmost) = crate::branch::BranchPage::get_leftmost_child(page) {
                    stack.push(leftmost);
                }
            }

            // Free this page
            txn.free_page(page_id)?;
        }

        Ok(())
    }

    /// Count values for a key
    pub fn count_values<'txn>(
        txn: &Transaction<'txn, impl crate::txn::mode::Mode>,
        root: PageId,
        key: &[u8],
    ) -> Result<usize> {
        match BTree::<LexicographicComparator>::search(txn, root, key)? {
            Some(value) => {
                if Self::is_single_value(&value) {
                    // Single value optimization
                    Ok(1)
                } else if InlineSubPage::is_inline_subp(&value) {
                    Ok(InlineSubPage::len(&value))
                } else if Self::is_sub_db(&value) {
                    let sub_db = Self::decode_sub_db(&value)?;
                    Ok(sub_db.entries as usize)
                } else {
                    // Legacy case - value stored directly
                    Ok(1)
                }
            }
            None => Ok(0),
        }
    }

    /// Encode sub-database info
    fn encode_sub_db(db_info: &DbInfo) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + std::mem::size_of::<DbInfo>());
        bytes.push(SUB_DB_MARKER);
        unsafe {
            let ptr = db_info as *const _ as *const u8;
            bytes.extend_from_slice(std::slice::from_raw_parts(ptr, std::mem::size_of::<DbInfo>()));
        }
        bytes
    }

    /// Decode sub-database info
    pub fn decode_sub_db(bytes: &[u8]) -> Result<DbInfo> {
        if bytes.len() != 1 + std::mem::size_of::<DbInfo>() || bytes[0] != SUB_DB_MARKER {
            return Err(Error::Corruption {
                details: "Invalid sub-database info format".into(),
                page_id: None,
            });
        }

        let mut db_info = DbInfo::default();
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr().add(1),
                &mut db_info as *mut _ as *mut u8,
                std::mem::size_of::<DbInfo>(),
            );
        }
        Ok(db_info)
    }
}

/// Tracks where a `DupCursor` currently reads its duplicate run from.
enum DupCursorState {
    /// Key not found, or found with no duplicates to walk.
    None,
    /// Single value or inline mini-page tier: the whole run is already in
    /// memory.
    Inline { values: Vec<Vec<u8>>, index: usize },
    /// Persistent sub-database tier: walk leaf pages, dense-fixed or
    /// ordinary node-based.
    SubDb { sub_db: DbInfo, current_page: Option<PageId>, current_index: usize },
}

/// Cursor for iterating over duplicate values
pub struct DupCursor<'txn, M: crate::txn::mode::Mode> {
    txn: &'txn Transaction<'txn, M>,
    state: DupCursorState,
}

impl<'txn, M: crate::txn::mode::Mode> DupCursor<'txn, M> {
    /// Create a new duplicate cursor
    pub fn new(txn: &'txn Transaction<'txn, M>, root: PageId, key: &[u8]) -> Result<Self> {
        let state = match BTree::<LexicographicComparator>::search(txn, root, key)? {
            Some(value) => {
                if DupSort::is_sub_db(&value) {
                    let sub_db = DupSort::decode_sub_db(&value)?;
                    DupCursorState::SubDb { current_page: Some(sub_db.root), current_index: 0, sub_db }
                } else if InlineSubPage::is_inline_subp(&value) {
                    let values = InlineSubPage::decode(&value)?;
                    DupCursorState::Inline { values, index: 0 }
                } else if DupSort::is_single_value(&value) {
                    let v = DupSort::decode_single_value(&value)?.to_vec();
                    DupCursorState::Inline { values: vec![v], index: 0 }
                } else {
                    DupCursorState::None
                }
            }
            None => DupCursorState::None,
        };

        Ok(Self { txn, state })
    }

    /// Move to first duplicate
    pub fn first(&mut self) -> Result<Option<Vec<u8>>> {
        match &mut self.state {
            DupCursorState::None => return Ok(None),
            DupCursorState::Inline { index, .. } => *index = 0,
            DupCursorState::SubDb { sub_db, current_page, current_index } => {
                *current_page = Some(sub_db.root);
                *current_index = 0;
            }
        }
        self.next()
    }

    /// Move to next duplicate
    pub fn next(&mut self) -> Result<Option<Vec<u8>>> {
        if let DupCursorState::Inline { values, index } = &mut self.state {
            return if *index < values.len() {
                let v = values[*index].clone();
                *index += 1;
                Ok(Some(v))
            } else {
                Ok(None)
            };
        }

        let (page_id, cur_index) = match &self.state {
            DupCursorState::None => return Ok(None),
            DupCursorState::Inline { .. } => unreachable!(),
            DupCursorState::SubDb { current_page, current_index, .. } => match current_page {
                Some(p) => (*p, *current_index),
                None => return Ok(None),
            },
        };

        let page = self.txn.get_page(page_id)?;

        if page.header.flags.contains(PageFlags::DUPFIXED) {
            // Dense-fixed-leaf sub-tree: scoped to a single leaf.
            if cur_index < page.header.num_keys as usize {
                let v = DflPage::get(page, cur_index)?.to_vec();
                if let DupCursorState::SubDb { current_index, .. } = &mut self.state {
                    *current_index += 1;
                }
                return Ok(Some(v));
            }
            if let DupCursorState::SubDb { current_page, .. } = &mut self.state {
                *current_page = None;
            }
            return Ok(None);
        }

        if cur_index < page.header.num_keys as usize {
            let node = page.node(cur_index)?;
            let v = node.key()?.to_vec();
            if let DupCursorState::SubDb { current_index, .. } = &mut self.state {
                *current_index += 1;
            }
            Ok(Some(v))
        } else if page.header.next_pgno != 0 {
            // Leaf exhausted; sub-database leaves are chained the same
            // way the primary tree's leaves are.
            let next_pgno = page.header.next_pgno;
            if let DupCursorState::SubDb { current_page, current_index, .. } = &mut self.state {
                *current_page = Some(PageId(next_pgno));
                *current_index = 0;
            }
            self.next()
        } else {
            if let DupCursorState::SubDb { current_page, .. } = &mut self.state {
                *current_page = None;
            }
            Ok(None)
        }
    }
}
