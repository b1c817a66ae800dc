/// Merge: compact sealed segments into a side directory, then promote the
/// result into the data directory at the next open.
///
/// The merge scans every sealed segment and copies only records the keydir
/// still points at into a temporary engine rooted at `<dirpath>-merge`,
/// writing a hint record per live key as it goes. A merge-finished marker
/// recording the first untouched file id makes the side directory eligible
/// for promotion; without it the directory is discarded unchanged.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use data::{
    DataError, DataFile, LogRecord, LogRecordType, MERGE_FINISHED_FILE_NAME, SEQ_NO_FILE_NAME,
};
use fio::IoType;
use index::BPTREE_INDEX_FILE_NAME;
use log::{debug, warn};

use crate::batch::{encode_key_with_seq, parse_key_with_seq, NON_TXN_SEQ_NO};
use crate::{util, Engine, Error, IndexType, Result, FILE_LOCK_NAME};

const MERGE_DIR_SUFFIX: &str = "-merge";
const MERGE_FINISHED_KEY: &[u8] = b"merge.finished";

/// Clears the merge latch when the merge ends, successfully or not.
struct MergingGuard<'a>(&'a Engine);

impl Drop for MergingGuard<'_> {
    fn drop(&mut self) {
        self.0.is_merging.store(false, Ordering::SeqCst);
    }
}

impl Engine {
    /// Reclaims space by rewriting live records into a fresh segment set.
    ///
    /// # Preconditions
    ///
    /// - no merge already running ([`Error::MergeInProgress`]),
    /// - `reclaim_size / total_size` at or above
    ///   `options.data_file_merge_ratio` ([`Error::MergeRatioUnreached`]),
    /// - enough free disk space for the surviving data
    ///   ([`Error::NoEnoughSpaceForMerge`]).
    ///
    /// The writer lock is held only to seal the active file and snapshot the
    /// segment list; the rewrite itself runs alongside normal writes. Any
    /// error aborts the merge and leaves the live directory untouched.
    pub fn merge(&self) -> Result<()> {
        // lock order everywhere is active before older; take these one at a
        // time so the check cannot deadlock against a rotating writer
        let active_empty = self.active_file.read().write_off() == 0;
        let older_empty = self.older_files.read().is_empty();
        if active_empty && older_empty {
            return Ok(());
        }

        let (merge_files, non_merge_file_id) = self.prepare_merge()?;
        let _latch = MergingGuard(self);

        let result = self.rewrite_live_records(&merge_files, non_merge_file_id);
        if let Err(e) = &result {
            warn!("merge aborted, side directory will be discarded: {e}");
        }
        result
    }

    /// Synchronous prologue, under the writer lock: precondition checks,
    /// sealing the active file, and snapshotting the segments to merge.
    fn prepare_merge(&self) -> Result<(Vec<Arc<DataFile>>, u32)> {
        let guard = self.write_lock.lock();

        if self.is_merging.load(Ordering::SeqCst) {
            return Err(Error::MergeInProgress);
        }

        let total_size = util::dir_size(&self.options.dir_path)?;
        let reclaim_size = self.reclaim_size.load(Ordering::SeqCst);
        if (reclaim_size as f32) < self.options.data_file_merge_ratio * (total_size as f32) {
            return Err(Error::MergeRatioUnreached);
        }
        let available = util::available_disk_size(&self.options.dir_path)?;
        if total_size - reclaim_size > available {
            return Err(Error::NoEnoughSpaceForMerge);
        }

        // seal the active file so everything being merged is immutable
        {
            let mut active = self.active_file.write();
            active.sync()?;
            let next_id = active.file_id() + 1;
            let new_file = DataFile::open(&self.options.dir_path, next_id, IoType::StandardFile)?;
            let sealed = std::mem::replace(&mut *active, new_file);
            self.older_files
                .write()
                .insert(sealed.file_id(), Arc::new(sealed));
        }

        let non_merge_file_id = self.active_file.read().file_id();
        let mut merge_files: Vec<Arc<DataFile>> =
            self.older_files.read().values().cloned().collect();
        merge_files.sort_by_key(|f| f.file_id());

        self.is_merging.store(true, Ordering::SeqCst);
        drop(guard);
        Ok((merge_files, non_merge_file_id))
    }

    /// Copies every record the keydir still points at into the side
    /// directory, then seals the result with the merge-finished marker.
    fn rewrite_live_records(
        &self,
        merge_files: &[Arc<DataFile>],
        non_merge_file_id: u32,
    ) -> Result<()> {
        let merge_path = merge_path(&self.options.dir_path);
        if merge_path.exists() {
            fs::remove_dir_all(&merge_path)?;
        }
        fs::create_dir_all(&merge_path)?;

        let mut merge_options = self.options.clone();
        merge_options.dir_path = merge_path.clone();
        merge_options.sync_writes = false;
        // the rewrite only needs a scratch keydir; nothing may leave an
        // index file behind in the side directory
        merge_options.index_type = IndexType::BTree;
        let merge_engine = Engine::open(merge_options)?;

        let mut hint_file = DataFile::hint_file(&merge_path)?;

        for file in merge_files {
            let mut offset = 0u64;
            loop {
                let (record, size) = match file.read_log_record(offset) {
                    Ok(v) => v,
                    Err(DataError::EndOfStream) => break,
                    Err(e) => return Err(e.into()),
                };

                let (key, _) = parse_key_with_seq(&record.key)?;
                // live iff the keydir still points exactly here
                if let Some(pos) = self.index.get(&key) {
                    if pos.file_id == file.file_id() && pos.offset == offset {
                        let new_pos = merge_engine.append_log_record_with_lock(&LogRecord {
                            key: encode_key_with_seq(&key, NON_TXN_SEQ_NO),
                            value: record.value,
                            rec_type: LogRecordType::Normal,
                        })?;
                        hint_file.append_hint_record(&key, &new_pos)?;
                    }
                }
                offset += size;
            }
        }

        hint_file.sync()?;
        merge_engine.sync()?;

        // the marker makes the side directory promotable; its value is the
        // first file id the merge did not cover
        let mut finished_file = DataFile::merge_finished_file(&merge_path)?;
        let record = LogRecord {
            key: MERGE_FINISHED_KEY.to_vec(),
            value: non_merge_file_id.to_string().into_bytes(),
            rec_type: LogRecordType::Normal,
        };
        finished_file.append(&record.encode())?;
        finished_file.sync()?;

        debug!("merge finished, first non-merged file id {non_merge_file_id}");
        Ok(())
    }
}

/// `<dirpath>-merge`, as a sibling of the data directory.
fn merge_path(dir_path: &Path) -> PathBuf {
    let parent = dir_path.parent().unwrap_or_else(|| Path::new("/"));
    let mut name = dir_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(MERGE_DIR_SUFFIX);
    parent.join(name)
}

/// Promotes a completed merge at open time.
///
/// With the marker present: deletes every segment below the recorded floor,
/// then moves the merged segment set, the hint file, and the marker into the
/// data directory. Without it the side directory is the residue of a crashed
/// merge and is thrown away. Either way the side directory is gone
/// afterwards.
pub(crate) fn load_merge_files(dir_path: &Path) -> Result<()> {
    let merge_path = merge_path(dir_path);
    if !merge_path.exists() {
        return Ok(());
    }

    let result = promote(dir_path, &merge_path);
    let _ = fs::remove_dir_all(&merge_path);
    result
}

fn promote(dir_path: &Path, merge_path: &Path) -> Result<()> {
    let mut merge_finished = false;
    let mut names: Vec<String> = Vec::new();
    for entry in fs::read_dir(merge_path)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name == MERGE_FINISHED_FILE_NAME {
            merge_finished = true;
        }
        if name == SEQ_NO_FILE_NAME || name == FILE_LOCK_NAME || name == BPTREE_INDEX_FILE_NAME {
            continue;
        }
        names.push(name.to_string());
    }

    if !merge_finished {
        warn!("discarding incomplete merge directory");
        return Ok(());
    }

    let floor = read_non_merge_file_id(merge_path)?;

    for file_id in 0..floor {
        let path = DataFile::file_name(dir_path, file_id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
    }

    for name in names {
        fs::rename(merge_path.join(&name), dir_path.join(&name))?;
    }
    Ok(())
}

/// The replay floor: segments below this id are covered by the hint file.
/// Zero when no merge has ever completed.
pub(crate) fn non_merge_file_id(dir_path: &Path) -> Result<u32> {
    if !dir_path.join(MERGE_FINISHED_FILE_NAME).exists() {
        return Ok(0);
    }
    read_non_merge_file_id(dir_path)
}

fn read_non_merge_file_id(dir_path: &Path) -> Result<u32> {
    let finished_file = DataFile::merge_finished_file(dir_path)?;
    let (record, _) = finished_file.read_log_record(0)?;
    let text = std::str::from_utf8(&record.value).map_err(|_| Error::DataDirectoryCorrupted)?;
    text.parse::<u32>().map_err(|_| Error::DataDirectoryCorrupted)
}
