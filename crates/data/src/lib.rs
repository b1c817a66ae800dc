//! # Data — log records and data files
//!
//! The durable representation of the store: every mutation is framed as a
//! [`LogRecord`] and appended to a [`DataFile`] segment. The keydir refers
//! back into segments through [`LogRecordPos`] triples.
//!
//! ## Binary Record Format
//!
//! ```text
//! +---------+------+------------+--------------+------+--------+
//! |  crc32  | type | varint(ks) | varint(vs)   |  key | value  |
//! +---------+------+------------+--------------+------+--------+
//!    4B       1B    1-5B         1-5B            ks     vs
//! ```
//!
//! The CRC-32 covers everything from `type` through the end of `value`. A
//! header whose CRC and both sizes are zero marks the end of a segment.

mod data_file;
mod log_record;
pub mod varint;

pub use data_file::{
    DataFile, DATA_FILE_SUFFIX, HINT_FILE_NAME, MERGE_FINISHED_FILE_NAME, SEQ_NO_FILE_NAME,
};
pub use log_record::{
    LogRecord, LogRecordPos, LogRecordType, MAX_LOG_RECORD_HEADER_SIZE,
};

use thiserror::Error;

/// Errors surfaced by the record codec and the data-file layer.
#[derive(Debug, Error)]
pub enum DataError {
    /// An underlying file-system error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The recomputed CRC differs from the stored one.
    #[error("invalid record crc")]
    InvalidCrc,

    /// The zero-header sentinel was hit, or too few bytes remain for a
    /// complete record. Terminates a sequential scan normally.
    #[error("end of data stream")]
    EndOfStream,

    /// A record decoded cleanly but carries a malformed field, e.g. an
    /// unknown record type or a truncated position triple.
    #[error("corrupted record")]
    Corrupted,
}

pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests;
