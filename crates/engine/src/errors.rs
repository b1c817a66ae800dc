use thiserror::Error;

/// Everything that can go wrong inside the engine. All operations return
/// these by value; nothing panics on user input.
#[derive(Debug, Error)]
pub enum Error {
    /// The key has length zero.
    #[error("the key is empty")]
    KeyEmpty,

    /// The key is absent from the keydir, or its latest record is a
    /// tombstone.
    #[error("key not found in database")]
    KeyNotFound,

    /// The keydir references a file id that is not open.
    #[error("data file not found in database")]
    DataFileNotFound,

    /// A file name could not be parsed, or a record is malformed beyond
    /// recovery.
    #[error("the database directory may be corrupted")]
    DataDirectoryCorrupted,

    /// The keydir rejected a mutation.
    #[error("failed to update index: {0}")]
    IndexUpdateFailed(#[from] index::IndexError),

    /// More operations staged than `WriteBatchOptions::max_batch_num`.
    #[error("exceed the max batch num")]
    ExceedMaxBatchNum,

    /// Another merge is already running.
    #[error("merge is in progress, try again later")]
    MergeInProgress,

    /// `reclaim_size / total_size` has not reached the configured ratio.
    #[error("the merge ratio do not reach the option")]
    MergeRatioUnreached,

    /// Not enough free disk space to hold the post-merge data set.
    #[error("no enough disk space for merge")]
    NoEnoughSpaceForMerge,

    /// Another process holds the directory lock.
    #[error("the database directory is used by another process")]
    DatabaseLocked,

    /// An underlying file-system error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A record failed its CRC check.
    #[error("invalid record crc")]
    InvalidCrc,

    /// An option carries an invalid value.
    #[error("invalid option: {0}")]
    InvalidOptions(&'static str),
}

impl From<data::DataError> for Error {
    fn from(e: data::DataError) -> Self {
        match e {
            data::DataError::Io(err) => Error::Io(err),
            data::DataError::InvalidCrc => Error::InvalidCrc,
            // a dangling or truncated reference means the directory contents
            // no longer line up with the keydir
            data::DataError::EndOfStream | data::DataError::Corrupted => {
                Error::DataDirectoryCorrupted
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
