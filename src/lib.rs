//! An embedded, memory-mapped, copy-on-write B+tree storage engine with MVCC.
//!
//! Many concurrent readers coexist with at most one writer; each reader sees
//! a consistent historical snapshot without ever locking a data page. Values
//! are grouped into named associative arrays sharing a single backing file.

#![warn(missing_docs)]
#![cfg_attr(not(test), warn(clippy::unwrap_used))]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod branch;
pub mod btree;
pub mod catalog;
pub mod checksum;
pub mod comparator;
pub mod cursor;
pub mod cursor_iter;
pub mod db;
pub mod dfl;
pub mod dupsort;
pub mod env;
pub mod error;
pub mod fixed_size;
pub mod freelist;
pub mod io;
pub mod meta;
pub mod nested_txn;
pub mod node;
pub mod node_utils;
pub mod overflow;
pub mod page;
pub mod reader;
pub mod space_info;
pub mod subpage;
pub mod txn;

// Re-exports
pub use db::{Database, DatabaseFlags, Key, Value};
pub use env::{EnvBuilder, Environment};
pub use error::{Error, Result};
pub use txn::{ReadTransaction, Transaction, WriteTransaction};

// Type aliases for common use cases
/// A read-only transaction
pub type RoTxn<'env> = Transaction<'env, txn::Read>;
/// A read-write transaction
pub type RwTxn<'env> = Transaction<'env, txn::Write>;

/// The default page size (4KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Maximum key size (when not using longer-keys feature)


/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
