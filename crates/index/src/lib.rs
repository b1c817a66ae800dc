//! # Index — the in-memory keydir
//!
//! Maps every live key to the [`LogRecordPos`] of its latest Normal record.
//! Three interchangeable implementations sit behind the [`Indexer`] trait:
//!
//! | Variant | Backing | Notes |
//! |---------|---------|-------|
//! | [`BTreeIndexer`] | `std::collections::BTreeMap` | default in-memory ordered tree |
//! | [`ArtIndexer`] | adaptive radix tree | same semantics, byte-wise trie |
//! | [`BPlusTreeIndexer`] | on-disk paged B+ tree | write-through pages, O(1) `len` |
//!
//! All variants serialize their own mutations; readers run concurrently with
//! each other. Iteration order is lexicographic on the raw key bytes.

mod art;
mod bptree;
mod btree;

pub use art::ArtIndexer;
pub use bptree::{BPlusTreeIndexer, BPTREE_INDEX_FILE_NAME};
pub use btree::BTreeIndexer;

use data::LogRecordPos;
use std::path::Path;
use thiserror::Error;

/// Errors surfaced by keydir mutations. Only the on-disk variant can
/// actually fail; the in-memory trees are infallible.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The on-disk tree could not persist a page.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The key does not fit in a B+ tree page.
    #[error("key of {0} bytes exceeds the index page limit")]
    KeyTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Which keydir implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// In-memory ordered tree.
    BTree,
    /// In-memory adaptive radix tree.
    Art,
    /// On-disk B+ tree.
    BPlusTree,
}

/// Capability set of the keydir.
pub trait Indexer: Send + Sync {
    /// Inserts or replaces the position for `key`, returning the displaced
    /// position if the key was already present.
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> Result<Option<LogRecordPos>>;

    /// Looks up the position of `key`.
    fn get(&self, key: &[u8]) -> Option<LogRecordPos>;

    /// Removes `key`, returning the position it held if it was present.
    fn delete(&self, key: &[u8]) -> Result<Option<LogRecordPos>>;

    /// Number of live keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every `(key, pos)` pair in lexicographic key order, or
    /// reversed. Taken under the variant's own lock and then released, so
    /// callers iterate without blocking writers.
    fn list(&self, reverse: bool) -> Vec<(Vec<u8>, LogRecordPos)>;

    /// Persists and releases the index. A no-op for the in-memory variants.
    fn close(&self) -> Result<()>;
}

/// Builds the keydir variant selected by `index_type`. `dir_path` is only
/// used by the on-disk B+ tree, which keeps its page file there.
pub fn new_indexer(index_type: IndexType, dir_path: &Path) -> Result<Box<dyn Indexer>> {
    match index_type {
        IndexType::BTree => Ok(Box::new(BTreeIndexer::new())),
        IndexType::Art => Ok(Box::new(ArtIndexer::new())),
        IndexType::BPlusTree => Ok(Box::new(BPlusTreeIndexer::open(dir_path)?)),
    }
}
