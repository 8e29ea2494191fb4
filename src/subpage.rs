//! Inline "SUBP" mini-page: the middle tier of the dup-set ladder.
//!
//! A `DUPSORT` key's values live in one of three places, promoted as the
//! set grows: a single inline value, a small run of values packed right
//! into the leaf node's own value bytes (this module), or a persistent
//! sub-tree once the run no longer fits inline. The mini-page format
//! mirrors `DflPage` for `DUPFIXED` databases (packed fixed-stride
//! elements) and falls back to a length-prefixed layout for ordinary
//! variable-length duplicates.
//!
//! The page's own `SUBP`/`DUPFIXED` flags are stored as the first two
//! bytes, so the blob is self-describing the same way a real page is —
//! a sub-cursor positioned on it is really just pointing at a tiny page
//! living inside its parent leaf's memory.

use crate::error::{Error, Result};
use crate::page::PageFlags;

const HEADER_LEN: usize = 2 /* flags */ + 2 /* count */ + 2 /* xsize, 0 = variable */;

/// Static helpers over an inline mini-page's encoded bytes.
pub struct InlineSubPage;

impl InlineSubPage {
    fn flags(bytes: &[u8]) -> Option<PageFlags> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        Some(PageFlags::from_bits_truncate(u16::from_le_bytes([bytes[0], bytes[1]])))
    }

    /// Whether `bytes` is an inline mini-page (as opposed to a single
    /// value or a persistent sub-database descriptor).
    pub fn is_inline_subp(bytes: &[u8]) -> bool {
        Self::flags(bytes).map(|f| f.contains(PageFlags::SUBP)).unwrap_or(false)
    }

    fn count(bytes: &[u8]) -> usize {
        u16::from_le_bytes([bytes[2], bytes[3]]) as usize
    }

    fn xsize(bytes: &[u8]) -> usize {
        u16::from_le_bytes([bytes[4], bytes[5]]) as usize
    }

    /// Encode a sorted, deduplicated set of values. `xsize` fixes every
    /// element to that width (DUPFIXED); `None` uses a length-prefixed
    /// variable layout.
    pub fn encode(values: &[Vec<u8>], xsize: Option<u16>) -> Vec<u8> {
        let mut flags = PageFlags::SUBP;
        if xsize.is_some() {
            flags.insert(PageFlags::DUPFIXED);
        }

        let body_size: usize = values
            .iter()
            .map(|v| if xsize.is_some() { v.len() } else { v.len() + 2 })
            .sum();
        let mut out = Vec::with_capacity(HEADER_LEN + body_size);
        out.extend_from_slice(&flags.bits().to_le_bytes());
        out.extend_from_slice(&(values.len() as u16).to_le_bytes());
        out.extend_from_slice(&xsize.unwrap_or(0).to_le_bytes());

        for v in values {
            if xsize.is_some() {
                out.extend_from_slice(v);
            } else {
                out.extend_from_slice(&(v.len() as u16).to_le_bytes());
                out.extend_from_slice(v);
            }
        }

        out
    }

    /// Decode every value, in sorted order.
    pub fn decode(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Corruption { details: "inline sub-page truncated".into(), page_id: None });
        }

        let count = Self::count(bytes);
        let xsize = Self::xsize(bytes);
        let mut values = Vec::with_capacity(count);
        let mut pos = HEADER_LEN;

        for _ in 0..count {
            if xsize != 0 {
                if pos + xsize > bytes.len() {
                    return Err(Error::Corruption {
                        details: "inline sub-page element extends past end".into(),
                        page_id: None,
                    });
                }
                values.push(bytes[pos..pos + xsize].to_vec());
                pos += xsize;
            } else {
                if pos + 2 > bytes.len() {
                    return Err(Error::Corruption {
                        details: "inline sub-page length prefix truncated".into(),
                        page_id: None,
                    });
                }
                let len = u16::from_le_bytes([bytes[pos], bytes[pos + 1]]) as usize;
                pos += 2;
                if pos + len > bytes.len() {
                    return Err(Error::Corruption {
                        details: "inline sub-page value extends past end".into(),
                        page_id: None,
                    });
                }
                values.push(bytes[pos..pos + len].to_vec());
                pos += len;
            }
        }

        Ok(values)
    }

    /// Get the value at `index` without decoding the whole run.
    pub fn get(bytes: &[u8], index: usize) -> Result<Vec<u8>> {
        let values = Self::decode(bytes)?;
        values
            .into_iter()
            .nth(index)
            .ok_or(Error::InvalidParameter("inline sub-page index out of bounds"))
    }

    /// Number of values packed into this mini-page.
    pub fn len(bytes: &[u8]) -> usize {
        Self::count(bytes)
    }

    /// Merge `value` in, sorted, deduplicated. The caller decides whether
    /// the resulting encoding still fits inline (compare against
    /// `crate::page::MAX_VALUE_SIZE`) or whether to promote to a
    /// persistent sub-tree instead.
    pub fn insert(bytes: &[u8], value: &[u8], xsize: Option<u16>) -> Result<Vec<u8>> {
        let mut values = Self::decode(bytes)?;
        match values.binary_search(&value.to_vec()) {
            Ok(_) => {}
            Err(pos) => values.insert(pos, value.to_vec()),
        }
        Ok(Self::encode(&values, xsize))
    }

    /// Remove `value`. Returns the re-encoded bytes and whether it was
    /// actually present.
    pub fn remove(bytes: &[u8], value: &[u8], xsize: Option<u16>) -> Result<(Vec<u8>, bool)> {
        let mut values = Self::decode(bytes)?;
        let found = match values.binary_search(&value.to_vec()) {
            Ok(pos) => {
                values.remove(pos);
                true
            }
            Err(_) => false,
        };
        Ok((Self::encode(&values, xsize), found))
    }
}
