//! Column-oriented, append-only, multi-version storage engine for
//! fixed-width signed 64-bit integer tables.
//!
//! Rows are stored as a base record plus a lineage of tail records: an
//! update never overwrites a value in place, it appends a tail that
//! supplies new values for the columns it changed. [`page_directory`]
//! owns the base/tail segments and the lineage walk; [`index::btree`] and
//! [`index::manager`] provide the per-column ordered index that accelerates
//! lookups; [`table`] and [`query`] compose the two into a caller-facing
//! API.

mod error;
pub mod index;
pub mod page;
pub mod page_directory;
pub mod query;
pub mod rid;
pub mod table;

pub use crate::error::{Error, Result};

/// Bytes per page.
pub const PAGE_SIZE: usize = 4096;
/// Bytes per stored integer (signed 64-bit, little-endian).
pub const INT_SIZE: usize = 8;
/// Integers per page.
pub const SLOTS_PER_PAGE: usize = PAGE_SIZE / INT_SIZE;
/// Logical pages per base or tail segment of a range.
pub const PAGES_PER_RANGE: usize = 16;
/// Base (or tail) records a single range can hold.
pub const RECORDS_PER_RANGE: usize = PAGES_PER_RANGE * SLOTS_PER_PAGE;
/// RID address space reserved per range: one `RECORDS_PER_RANGE`-sized
/// block for the base segment, one for the tail segment.
pub const RANGE_CAP: usize = 2 * RECORDS_PER_RANGE;
/// Ranges a fresh table starts with.
pub const INITIAL_RANGES: usize = 1;

/// Meta columns on a base record: `indirection, rid, timestamp, schema_encoding`.
pub const BASE_META: usize = 4;
/// Meta columns on a tail record: the base ones plus `base_rid`.
pub const TAIL_META: usize = 5;

pub const IDX_INDIRECTION: usize = 0;
pub const IDX_RID: usize = 1;
pub const IDX_TIMESTAMP: usize = 2;
pub const IDX_SCHEMA_ENCODING: usize = 3;
pub const IDX_BASE_RID: usize = 4;

/// Sentinel for "no value" / "unchanged in this tail".
pub const NULL: i64 = i64::MIN;
/// Sentinel written into a base record's indirection slot to tombstone it.
pub const DELETED: i64 = -1;

/// Default B+ tree order for every column index.
pub const B_TREE_ORDER: usize = 32;
