//! Dense-fixed-leaf (DFL) packing.
//!
//! A DUPFIXED sub-tree's duplicate values all share one size (`xsize`,
//! carried on the owning `DbInfo`). Rather than go through the normal
//! node machinery (a `NodeHeader` plus a pointer per entry), a DFL leaf
//! packs the values contiguously right after the page header and finds
//! one by binary search over a fixed stride. This is what `GET_MULTIPLE`/
//! `NEXT_MULTIPLE`/`PREV_MULTIPLE` hand back as one contiguous slice.
//!
//! A DFL leaf stashes its element size in `PageHeader::overflow` (unused
//! by leaf pages otherwise) so the page is self-describing.
//!
//! Scope: this pass keeps a DUPFIXED sub-tree to a single leaf — once a
//! key's duplicate set would outgrow one packed page, the caller falls
//! back to the ordinary node-based sub-tree representation (see
//! `dupsort.rs`) rather than growing a DFL leaf into a DFL branch level.

use crate::error::{Error, PageId, Result};
use crate::page::{Page, PageFlags, PageHeader, SearchResult, PAGE_SIZE};
use std::cmp::Ordering;
use std::ptr;

/// Static helpers over a page packed in DFL format.
pub struct DflPage;

impl DflPage {
    /// Maximum number of `xsize`-byte elements a fresh leaf can hold.
    pub fn capacity(xsize: usize) -> usize {
        if xsize == 0 {
            0
        } else {
            (PAGE_SIZE - PageHeader::SIZE) / xsize
        }
    }

    /// Turn a freshly allocated leaf page into an empty DFL leaf.
    pub fn init(page: &mut Page, xsize: u32) {
        page.header.flags.insert(PageFlags::LEAF);
        page.header.flags.insert(PageFlags::DUPFIXED);
        page.header.num_keys = 0;
        page.header.overflow = xsize;
        page.header.lower = PageHeader::SIZE as u16;
        page.header.upper = PAGE_SIZE as u16;
    }

    /// Element size this leaf was initialized with.
    pub fn xsize(page: &Page) -> usize {
        page.header.overflow as usize
    }

    fn check_xsize(page: &Page, value: &[u8]) -> Result<usize> {
        let xsize = Self::xsize(page);
        if xsize == 0 || value.len() != xsize {
            return Err(Error::InvalidParameter("value size does not match DUPFIXED element size"));
        }
        Ok(xsize)
    }

    /// Get the element at `index`.
    pub fn get(page: &Page, index: usize) -> Result<&[u8]> {
        let xsize = Self::xsize(page);
        let n = page.header.num_keys as usize;
        if index >= n {
            return Err(Error::InvalidParameter("DFL index out of bounds"));
        }
        let start = index * xsize;
        if start + xsize > page.data.len() {
            return Err(Error::Corruption {
                details: "DFL element extends beyond page".into(),
                page_id: Some(PageId(page.header.pgno)),
            });
        }
        Ok(&page.data[start..start + xsize])
    }

    /// Binary search for `value` (must be exactly `xsize` bytes).
    pub fn search(page: &Page, value: &[u8]) -> Result<SearchResult> {
        Self::check_xsize(page, value)?;
        let mut left = 0usize;
        let mut right = page.header.num_keys as usize;

        while left < right {
            let mid = left + (right - left) / 2;
            let elem = Self::get(page, mid)?;
            match value.cmp(elem) {
                Ordering::Less => right = mid,
                Ordering::Greater => left = mid + 1,
                Ordering::Equal => return Ok(SearchResult::Found { index: mid }),
            }
        }

        Ok(SearchResult::NotFound { insert_pos: left })
    }

    /// Insert `value` in sorted position. Returns `Err("Page full")` when
    /// the leaf is already at capacity, same convention as
    /// `Page::add_node_sorted_internal_with_comparator`.
    pub fn insert(page: &mut Page, value: &[u8]) -> Result<usize> {
        let xsize = Self::check_xsize(page, value)?;
        let n = page.header.num_keys as usize;

        let insert_pos = match Self::search(page, value)? {
            SearchResult::Found { .. } => return Err(Error::Custom("Duplicate value already exists".into())),
            SearchResult::NotFound { insert_pos } => insert_pos,
        };

        if n >= Self::capacity(xsize) {
            return Err(Error::Custom("Page full".into()));
        }

        unsafe {
            let base = page.data.as_mut_ptr();
            let move_len = (n - insert_pos) * xsize;
            if move_len > 0 {
                ptr::copy(base.add(insert_pos * xsize), base.add((insert_pos + 1) * xsize), move_len);
            }
            ptr::copy_nonoverlapping(value.as_ptr(), base.add(insert_pos * xsize), xsize);
        }

        page.header.num_keys += 1;
        page.header.lower += xsize as u16;
        Ok(insert_pos)
    }

    /// Remove the element at `index`.
    pub fn remove(page: &mut Page, index: usize) -> Result<()> {
        let xsize = Self::xsize(page);
        let n = page.header.num_keys as usize;
        if index >= n {
            return Err(Error::InvalidParameter("DFL index out of bounds"));
        }

        unsafe {
            let base = page.data.as_mut_ptr();
            let move_len = (n - index - 1) * xsize;
            if move_len > 0 {
                ptr::copy(base.add((index + 1) * xsize), base.add(index * xsize), move_len);
            }
        }

        page.header.num_keys -= 1;
        page.header.lower -= xsize as u16;
        Ok(())
    }

    /// The whole leaf's packed values as one contiguous slice — what
    /// `GET_MULTIPLE`/`NEXT_MULTIPLE`/`PREV_MULTIPLE` hand back.
    pub fn packed_slice(page: &Page) -> &[u8] {
        let xsize = Self::xsize(page);
        let n = page.header.num_keys as usize;
        &page.data[0..n * xsize]
    }
}
