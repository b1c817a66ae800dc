use std::path::PathBuf;

pub use index::IndexType;

/// Engine configuration. Start from [`Options::default`] and override what
/// the workload needs.
#[derive(Debug, Clone)]
pub struct Options {
    /// Root of all on-disk state.
    pub dir_path: PathBuf,

    /// Rotation threshold: when an append would push the active file past
    /// this size, the file is sealed and a new one is opened.
    pub data_file_size: u64,

    /// Fsync after every single append.
    pub sync_writes: bool,

    /// If non-zero, fsync once the bytes written since the last sync exceed
    /// this threshold. Independent of `sync_writes`.
    pub bytes_per_sync: u64,

    /// Which keydir implementation to use.
    pub index_type: IndexType,

    /// Scan segments through a memory map during startup recovery.
    pub mmap_at_startup: bool,

    /// Minimum `reclaim_size / total_size` before `merge` will run.
    pub data_file_merge_ratio: f32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir_path: std::env::temp_dir().join("bitcask-data"),
            data_file_size: 256 * 1024 * 1024,
            sync_writes: false,
            bytes_per_sync: 0,
            index_type: IndexType::BPlusTree,
            mmap_at_startup: true,
            data_file_merge_ratio: 0.5,
        }
    }
}

/// Options for [`Engine::iter`](crate::Engine::iter).
#[derive(Debug, Clone, Default)]
pub struct IteratorOptions {
    /// Only yield keys starting with this prefix. Empty means all keys.
    pub prefix: Vec<u8>,

    /// Iterate in descending key order.
    pub reverse: bool,
}

/// Options for [`Engine::new_write_batch`](crate::Engine::new_write_batch).
#[derive(Debug, Clone)]
pub struct WriteBatchOptions {
    /// Hard cap on the number of staged operations per batch.
    pub max_batch_num: usize,

    /// Fsync the active file once the whole batch has been appended.
    pub sync_writes: bool,
}

impl Default for WriteBatchOptions {
    fn default() -> Self {
        Self {
            max_batch_num: 10_000,
            sync_writes: true,
        }
    }
}
