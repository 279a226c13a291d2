use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("column count mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: usize, got: usize },

    #[error("tail range {range_id} is full, merge required before further updates")]
    TailRangeFull { range_id: u64 },

    #[error("record {0:?} is deleted")]
    RecordDeleted(crate::rid::Rid),

    #[error("slot {slot} out of bounds (have {len})")]
    OutOfBounds { slot: usize, len: usize },

    #[error("column {0} is not a valid index for this table")]
    InvalidColumn(usize),

    #[error("key already exists")]
    KeyExists,
}
