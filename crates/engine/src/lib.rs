//! # Engine — Bitcask storage engine core
//!
//! Ties together the [`fio`], [`data`], and [`index`] crates into a
//! single-node, embeddable key-value store in the Bitcask family: an
//! append-only log on disk, an in-memory keydir pointing at the latest
//! record for every live key, and point lookups in at most one disk read.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌─────────────────────────────────────────────────┐
//! │                    ENGINE                       │
//! │                                                 │
//! │ write.rs → append to active file → keydir put   │
//! │               |                                 │
//! │               | (file size threshold?)          │
//! │               v                                 │
//! │        rotate: seal active, open next id        │
//! │                                                 │
//! │ read.rs  → keydir lookup → one positional read  │
//! │                                                 │
//! │ batch.rs → staged ops, one seq no, txn-fin mark │
//! │ merge.rs → rewrite live records + hint file     │
//! │ recovery.rs → rebuild keydir at open            │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module       | Purpose                                            |
//! |--------------|----------------------------------------------------|
//! | `lib.rs`     | `Engine` struct, `open`, stat/backup/sync/close    |
//! | [`write`]    | `put`, `delete`, the append + rotation protocol    |
//! | [`read`]     | `get`, positional value reads                      |
//! | [`batch`]    | atomic multi-op commit under one seq number        |
//! | [`merge`]    | compaction into a side directory + promotion       |
//! | [`recovery`] | segment loading, hint fast path, log replay        |
//! | [`iterator`] | snapshot iteration, `list_keys`, `fold`            |
//!
//! ## Crash Safety
//!
//! Acknowledged writes are durable per the sync policy. Batches become
//! visible only once their txn-finished marker is on disk; replay discards
//! unterminated batches. A merge builds a complete side directory first and
//! is promoted atomically at the next open, so an interrupted merge never
//! touches live data.

mod batch;
mod errors;
mod iterator;
mod merge;
mod options;
mod read;
mod recovery;
mod util;
mod write;

pub use batch::WriteBatch;
pub use errors::{Error, Result};
pub use iterator::Iter;
pub use options::{IndexType, IteratorOptions, Options, WriteBatchOptions};

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use data::{DataFile, LogRecord, LogRecordType, SEQ_NO_FILE_NAME};
use fio::IoType;
use fs2::FileExt;
use index::Indexer;
use log::warn;
use parking_lot::{Mutex, RwLock};

/// Name of the advisory lock file inside the data directory.
pub(crate) const FILE_LOCK_NAME: &str = "flock";

/// Key under which the latest committed seq number is persisted at close.
const SEQ_NO_KEY: &[u8] = b"seq.no";

/// The storage engine instance.
///
/// All methods take `&self`; the engine is safe to share across threads
/// (typically behind an `Arc`). Mutations serialize on an internal writer
/// lock while readers proceed concurrently against the keydir and the
/// immutable file catalog.
pub struct Engine {
    pub(crate) options: Options,

    /// The single file open for appends. Highest file id in the directory.
    pub(crate) active_file: RwLock<DataFile>,

    /// Sealed segments, keyed by file id. Entries are inserted at rotation
    /// and removed only by merge promotion at the next open; readers clone
    /// the `Arc` briefly for positional reads.
    pub(crate) older_files: RwLock<HashMap<u32, Arc<DataFile>>>,

    /// The keydir.
    pub(crate) index: Box<dyn Indexer>,

    /// Serializes the whole append path, batch commits, and the merge
    /// prologue. Readers never take it.
    pub(crate) write_lock: Mutex<()>,

    /// Latest batch sequence number handed out.
    pub(crate) seq_no: AtomicU64,

    /// Bytes occupied by records that have been superseded or tombstoned.
    pub(crate) reclaim_size: AtomicU64,

    /// Bytes appended since the last fsync, for the `bytes_per_sync` policy.
    pub(crate) bytes_since_sync: AtomicU64,

    /// At most one merge at a time.
    pub(crate) is_merging: AtomicBool,

    /// Advisory lock on the data directory, held for the engine's lifetime.
    _lock_file: File,
}

/// A point-in-time view of engine statistics.
#[derive(Debug, Clone)]
pub struct Stat {
    /// Number of live keys.
    pub key_num: usize,
    /// Number of open data files, active included.
    pub data_file_num: usize,
    /// Bytes a merge could reclaim right now.
    pub reclaimable_size: u64,
    /// Total bytes under the data directory.
    pub disk_size: u64,
}

impl Engine {
    /// Opens (or creates) the engine rooted at `options.dir_path`,
    /// recovering the keydir from the segments on disk.
    ///
    /// # Recovery Steps
    ///
    /// 1. Validate options and create the data directory if missing.
    /// 2. Acquire the directory lock (fails with [`Error::DatabaseLocked`]).
    /// 3. Promote a completed merge, if one is waiting in the side directory.
    /// 4. Open every segment, highest id becoming the active file.
    /// 5. Load the keydir from the hint file when present, then replay all
    ///    segments at or above the merge floor.
    /// 6. Adopt the sequence number (persisted one for the B+ tree keydir,
    ///    otherwise the highest seen during replay).
    pub fn open(options: Options) -> Result<Self> {
        check_options(&options)?;

        let dir_path = options.dir_path.clone();
        if !dir_path.is_dir() {
            fs::create_dir_all(&dir_path)?;
        }
        let lock_file = acquire_dir_lock(&dir_path)?;

        // bring a completed merge home before scanning segments
        merge::load_merge_files(&dir_path)?;

        let startup_io_type = if options.mmap_at_startup {
            IoType::MemoryMap
        } else {
            IoType::StandardFile
        };
        let mut data_files = recovery::load_data_files(&dir_path, startup_io_type)?;

        let index = index::new_indexer(options.index_type, &dir_path)?;
        recovery::load_index_from_hint_file(&dir_path, index.as_ref())?;

        let replay_floor = merge::non_merge_file_id(&dir_path)?;
        let replayed =
            recovery::load_index_from_data_files(&data_files, replay_floor, index.as_ref())?;

        // recovery is done: swap the startup mmaps back to standard handles
        if options.mmap_at_startup {
            for file in &mut data_files {
                file.set_io_manager(&dir_path, IoType::StandardFile)?;
            }
        }

        let mut active = match data_files.pop() {
            Some(file) => file,
            None => DataFile::open(&dir_path, 0, IoType::StandardFile)?,
        };
        active.set_write_off(replayed.active_write_off);

        // A crash can leave a torn record behind the last decodable one. Cut
        // it off so the write cursor and the physical file length agree and
        // the next append lands exactly at `write_off`.
        let active_path = DataFile::file_name(&dir_path, active.file_id());
        if fs::metadata(&active_path)?.len() > replayed.active_write_off {
            let file = OpenOptions::new().write(true).open(&active_path)?;
            file.set_len(replayed.active_write_off)?;
            file.sync_all()?;
        }

        let mut seq_no = replayed.max_seq;
        if options.index_type == IndexType::BPlusTree {
            if let Some(persisted) = recovery::load_seq_no(&dir_path)? {
                seq_no = seq_no.max(persisted);
            }
        }

        let older_files: HashMap<u32, Arc<DataFile>> = data_files
            .into_iter()
            .map(|file| (file.file_id(), Arc::new(file)))
            .collect();

        Ok(Self {
            options,
            active_file: RwLock::new(active),
            older_files: RwLock::new(older_files),
            index,
            write_lock: Mutex::new(()),
            seq_no: AtomicU64::new(seq_no),
            reclaim_size: AtomicU64::new(replayed.reclaim_size),
            bytes_since_sync: AtomicU64::new(0),
            is_merging: AtomicBool::new(false),
            _lock_file: lock_file,
        })
    }

    /// Flushes the active file to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.active_file.read().sync()?;
        Ok(())
    }

    /// Syncs, persists the sequence number for the on-disk keydir, and
    /// releases the index. The directory lock drops with the engine.
    pub fn close(&self) -> Result<()> {
        if self.options.index_type == IndexType::BPlusTree {
            let seq_path = self.options.dir_path.join(SEQ_NO_FILE_NAME);
            if seq_path.exists() {
                fs::remove_file(&seq_path)?;
            }
            let mut seq_file = DataFile::seq_no_file(&self.options.dir_path)?;
            let record = LogRecord {
                key: SEQ_NO_KEY.to_vec(),
                value: self
                    .seq_no
                    .load(Ordering::SeqCst)
                    .to_string()
                    .into_bytes(),
                rec_type: LogRecordType::Normal,
            };
            seq_file.append(&record.encode())?;
            seq_file.sync()?;
        }
        self.index.close()?;
        self.active_file.read().sync()?;
        Ok(())
    }

    /// Returns live statistics about the engine.
    pub fn stat(&self) -> Result<Stat> {
        let older = self.older_files.read();
        Ok(Stat {
            key_num: self.index.len(),
            data_file_num: older.len() + 1,
            reclaimable_size: self.reclaim_size.load(Ordering::SeqCst),
            disk_size: util::dir_size(&self.options.dir_path)?,
        })
    }

    /// Copies the data directory to `dest`, excluding the lock file.
    pub fn backup(&self, dest: &Path) -> Result<()> {
        util::copy_dir(&self.options.dir_path, dest, &[FILE_LOCK_NAME])?;
        Ok(())
    }
}

/// Best-effort close on drop. Errors are swallowed: the log itself is the
/// source of truth and will be replayed on the next open.
impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to close engine cleanly: {e}");
        }
    }
}

fn check_options(options: &Options) -> Result<()> {
    if options.dir_path.as_os_str().is_empty() {
        return Err(Error::InvalidOptions("dir path is empty"));
    }
    if options.data_file_size == 0 {
        return Err(Error::InvalidOptions("data file size must be positive"));
    }
    if !(0.0..=1.0).contains(&options.data_file_merge_ratio) {
        return Err(Error::InvalidOptions("merge ratio must be between 0 and 1"));
    }
    Ok(())
}

fn acquire_dir_lock(dir_path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(dir_path.join(FILE_LOCK_NAME))?;
    file.try_lock_exclusive()
        .map_err(|_| Error::DatabaseLocked)?;
    Ok(file)
}

#[cfg(test)]
mod tests;
