/// Atomic batch writes.
///
/// A batch stages `put`/`delete` operations in memory and commits them under
/// one fresh sequence number. The last record of a committed batch is a
/// txn-finished marker; recovery only applies batches whose marker made it
/// to disk, which makes the commit all-or-nothing across crashes.
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

use data::{varint, LogRecord, LogRecordType};
use parking_lot::Mutex;

use crate::{Engine, Error, Result, WriteBatchOptions};

/// Seq number reserved for direct, non-batched writes.
pub(crate) const NON_TXN_SEQ_NO: u64 = 0;

/// Reserved key of the txn-finished marker record.
pub(crate) const TXN_FIN_KEY: &[u8] = b"txn-fin";

/// Prefixes `key` with the uvarint-encoded sequence number, producing the
/// on-disk key form.
pub(crate) fn encode_key_with_seq(key: &[u8], seq_no: u64) -> Vec<u8> {
    let mut enc = Vec::with_capacity(varint::MAX_VARINT_LEN64 + key.len());
    varint::put_uvarint(&mut enc, seq_no);
    enc.extend_from_slice(key);
    enc
}

/// Splits an on-disk key back into the user key and its sequence number.
pub(crate) fn parse_key_with_seq(enc: &[u8]) -> Result<(Vec<u8>, u64)> {
    let (seq_no, n) = varint::uvarint(enc).ok_or(Error::DataDirectoryCorrupted)?;
    Ok((enc[n..].to_vec(), seq_no))
}

/// A set of operations that commit atomically.
///
/// Staged operations are keyed by user key, so a later `put` replaces an
/// earlier one and commit order is deterministic (ascending key order).
/// Nothing touches disk until [`commit`](WriteBatch::commit).
pub struct WriteBatch<'a> {
    engine: &'a Engine,
    options: WriteBatchOptions,
    pending: Mutex<BTreeMap<Vec<u8>, LogRecord>>,
}

impl Engine {
    /// Creates an empty batch bound to this engine.
    pub fn new_write_batch(&self, options: WriteBatchOptions) -> WriteBatch<'_> {
        WriteBatch {
            engine: self,
            options,
            pending: Mutex::new(BTreeMap::new()),
        }
    }
}

impl WriteBatch<'_> {
    /// Stages a put. Replaces any pending operation on the same key.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        let mut pending = self.pending.lock();
        pending.insert(
            key.clone(),
            LogRecord {
                key,
                value,
                rec_type: LogRecordType::Normal,
            },
        );
        Ok(())
    }

    /// Stages a delete.
    ///
    /// If the key has no committed keydir entry, there is nothing durable to
    /// shadow: a pending put for it is simply dropped and no tombstone is
    /// staged. Otherwise a tombstone replaces whatever was pending.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        let mut pending = self.pending.lock();
        if self.engine.index.get(key).is_none() {
            pending.remove(key);
            return Ok(());
        }
        pending.insert(
            key.to_vec(),
            LogRecord {
                key: key.to_vec(),
                value: Vec::new(),
                rec_type: LogRecordType::Deleted,
            },
        );
        Ok(())
    }

    /// Commits every staged operation atomically.
    ///
    /// Holding the engine writer lock for the whole commit: appends each
    /// record under a fresh sequence number, appends the txn-finished
    /// marker, optionally syncs, and only then applies the keydir updates.
    /// An empty batch is a no-op.
    pub fn commit(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return Ok(());
        }
        if pending.len() > self.options.max_batch_num {
            return Err(Error::ExceedMaxBatchNum);
        }

        let _guard = self.engine.write_lock.lock();

        let seq_no = self.engine.seq_no.fetch_add(1, Ordering::SeqCst) + 1;

        let mut positions = Vec::with_capacity(pending.len());
        for (key, record) in pending.iter() {
            let pos = self.engine.append_log_record(&LogRecord {
                key: encode_key_with_seq(key, seq_no),
                value: record.value.clone(),
                rec_type: record.rec_type,
            })?;
            positions.push((key.clone(), record.rec_type, pos));
        }

        // the marker is what makes the batch visible to recovery
        self.engine.append_log_record(&LogRecord {
            key: encode_key_with_seq(TXN_FIN_KEY, seq_no),
            value: Vec::new(),
            rec_type: LogRecordType::TxnFinished,
        })?;

        if self.options.sync_writes {
            self.engine.active_file.read().sync()?;
        }

        for (key, rec_type, pos) in positions {
            let old = match rec_type {
                LogRecordType::Normal => self.engine.index.put(key, pos)?,
                LogRecordType::Deleted => self.engine.index.delete(&key)?,
                LogRecordType::TxnFinished => None,
            };
            if let Some(old) = old {
                self.engine
                    .reclaim_size
                    .fetch_add(u64::from(old.size), Ordering::SeqCst);
            }
        }

        pending.clear();
        Ok(())
    }
}
