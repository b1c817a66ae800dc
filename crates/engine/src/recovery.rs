/// Cold-start recovery: enumerate segments, load the hint fast path, replay
/// the log into the keydir, and restore the sequence number.
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use data::{
    DataError, DataFile, LogRecordPos, LogRecordType, DATA_FILE_SUFFIX, HINT_FILE_NAME,
    SEQ_NO_FILE_NAME,
};
use fio::IoType;
use index::Indexer;
use log::debug;

use crate::batch::{parse_key_with_seq, NON_TXN_SEQ_NO};
use crate::{Error, Result};

/// What replay learned about the directory.
pub(crate) struct ReplayOutcome {
    /// Highest batch sequence number seen.
    pub max_seq: u64,
    /// Bytes occupied by superseded and tombstoned records.
    pub reclaim_size: u64,
    /// End of the last successfully decoded record in the highest-id file.
    pub active_write_off: u64,
}

/// Opens every `*.data` segment in ascending id order.
///
/// A segment whose name does not parse as a nine-digit id means the
/// directory has been tampered with and recovery cannot trust it.
pub(crate) fn load_data_files(dir_path: &Path, io_type: IoType) -> Result<Vec<DataFile>> {
    let mut file_ids = Vec::new();
    for entry in fs::read_dir(dir_path)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(stem) = name.strip_suffix(DATA_FILE_SUFFIX) {
            let id: u32 = stem.parse().map_err(|_| Error::DataDirectoryCorrupted)?;
            file_ids.push(id);
        }
    }
    file_ids.sort_unstable();

    let mut files = Vec::with_capacity(file_ids.len());
    for id in file_ids {
        files.push(DataFile::open(dir_path, id, io_type)?);
    }
    Ok(files)
}

/// Fast path: populate the keydir from the hint file left by the last merge.
/// Covers every segment below the merge floor.
pub(crate) fn load_index_from_hint_file(dir_path: &Path, index: &dyn Indexer) -> Result<()> {
    if !dir_path.join(HINT_FILE_NAME).exists() {
        return Ok(());
    }

    let hint_file = DataFile::hint_file(dir_path)?;
    let mut offset = 0u64;
    let mut loaded = 0usize;
    loop {
        let (record, size) = match hint_file.read_log_record(offset) {
            Ok(v) => v,
            Err(DataError::EndOfStream) => break,
            Err(e) => return Err(e.into()),
        };
        let pos = LogRecordPos::decode(&record.value)?;
        index.put(record.key, pos)?;
        loaded += 1;
        offset += size;
    }
    debug!("loaded {loaded} keydir entries from the hint file");
    Ok(())
}

/// Replays every segment with id at or above `floor` into the keydir.
///
/// Records written directly (seq 0) apply immediately. Records belonging to
/// a batch are buffered under their seq number and applied in order when the
/// batch's txn-finished marker turns up; buffers still pending at the end of
/// replay belong to batches that never committed and are discarded.
pub(crate) fn load_index_from_data_files(
    files: &[DataFile],
    floor: u32,
    index: &dyn Indexer,
) -> Result<ReplayOutcome> {
    let mut outcome = ReplayOutcome {
        max_seq: 0,
        reclaim_size: 0,
        active_write_off: 0,
    };
    if files.is_empty() {
        return Ok(outcome);
    }

    let mut txn_buf: HashMap<u64, Vec<(Vec<u8>, LogRecordType, LogRecordPos)>> = HashMap::new();
    let last = files.len() - 1;

    for (i, file) in files.iter().enumerate() {
        if file.file_id() < floor {
            continue;
        }

        let mut offset = 0u64;
        loop {
            let (record, size) = match file.read_log_record(offset) {
                Ok(v) => v,
                Err(DataError::EndOfStream) => break,
                Err(e) => return Err(e.into()),
            };

            let pos = LogRecordPos {
                file_id: file.file_id(),
                offset,
                size: size as u32,
            };
            let (key, seq_no) = parse_key_with_seq(&record.key)?;

            if record.rec_type == LogRecordType::TxnFinished {
                // the batch committed: apply its records in original order
                if let Some(buffered) = txn_buf.remove(&seq_no) {
                    for (k, t, p) in buffered {
                        apply_to_index(index, k, t, p, &mut outcome.reclaim_size)?;
                    }
                }
            } else if seq_no == NON_TXN_SEQ_NO {
                apply_to_index(index, key, record.rec_type, pos, &mut outcome.reclaim_size)?;
            } else {
                txn_buf.entry(seq_no).or_default().push((key, record.rec_type, pos));
            }

            if seq_no > outcome.max_seq {
                outcome.max_seq = seq_no;
            }
            offset += size;
        }

        if i == last {
            outcome.active_write_off = offset;
        }
    }

    if !txn_buf.is_empty() {
        debug!("discarded {} unterminated batches during replay", txn_buf.len());
    }
    Ok(outcome)
}

fn apply_to_index(
    index: &dyn Indexer,
    key: Vec<u8>,
    rec_type: LogRecordType,
    pos: LogRecordPos,
    reclaim_size: &mut u64,
) -> Result<()> {
    let old = match rec_type {
        LogRecordType::Deleted => {
            // the tombstone itself is garbage from the moment it lands
            *reclaim_size += u64::from(pos.size);
            index.delete(&key)?
        }
        _ => index.put(key, pos)?,
    };
    if let Some(old) = old {
        *reclaim_size += u64::from(old.size);
    }
    Ok(())
}

/// Reads (and consumes) the persisted sequence number, if any. Only the
/// on-disk B+ tree keydir writes one at close; a missing file means the
/// counter starts from whatever replay observed.
pub(crate) fn load_seq_no(dir_path: &Path) -> Result<Option<u64>> {
    let path = dir_path.join(SEQ_NO_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }

    let seq_file = DataFile::seq_no_file(dir_path)?;
    let (record, _) = seq_file.read_log_record(0)?;
    let text = std::str::from_utf8(&record.value).map_err(|_| Error::DataDirectoryCorrupted)?;
    let seq_no = text.parse::<u64>().map_err(|_| Error::DataDirectoryCorrupted)?;

    // stale after this run starts writing; rewritten at the next clean close
    fs::remove_file(&path)?;
    Ok(Some(seq_no))
}
