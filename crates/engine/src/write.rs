/// Write path: `put`, `delete`, and the append + rotation protocol.
///
/// Every mutation becomes a log record appended to the active file under the
/// writer lock, followed by a keydir update. Bytes displaced from the keydir
/// feed the reclaim counter that drives merge.
use std::sync::atomic::Ordering;
use std::sync::Arc;

use data::{DataFile, LogRecord, LogRecordPos, LogRecordType};
use fio::IoType;

use crate::batch::{encode_key_with_seq, NON_TXN_SEQ_NO};
use crate::{Engine, Error, Result};

impl Engine {
    /// Stores `value` under `key`, overwriting any previous value.
    ///
    /// Durability follows the sync policy: immediate when
    /// `options.sync_writes` is set, otherwise deferred to the
    /// `bytes_per_sync` threshold or an explicit [`sync`](Engine::sync).
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }

        let record = LogRecord {
            key: encode_key_with_seq(&key, NON_TXN_SEQ_NO),
            value,
            rec_type: LogRecordType::Normal,
        };

        let _guard = self.write_lock.lock();
        let pos = self.append_log_record(&record)?;
        if let Some(old) = self.index.put(key, pos)? {
            self.reclaim_size
                .fetch_add(u64::from(old.size), Ordering::SeqCst);
        }
        Ok(())
    }

    /// Removes `key` by appending a tombstone.
    ///
    /// A no-op when the key does not exist: nothing is appended and no error
    /// is returned. The tombstone itself is garbage the moment it lands, so
    /// its size counts toward the reclaimable total right away.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        if self.index.get(key).is_none() {
            return Ok(());
        }

        let record = LogRecord {
            key: encode_key_with_seq(key, NON_TXN_SEQ_NO),
            value: Vec::new(),
            rec_type: LogRecordType::Deleted,
        };

        let _guard = self.write_lock.lock();
        let pos = self.append_log_record(&record)?;
        self.reclaim_size
            .fetch_add(u64::from(pos.size), Ordering::SeqCst);
        if let Some(old) = self.index.delete(key)? {
            self.reclaim_size
                .fetch_add(u64::from(old.size), Ordering::SeqCst);
        }
        Ok(())
    }

    /// Convenience wrapper that takes the writer lock around a single
    /// append.
    pub(crate) fn append_log_record_with_lock(&self, record: &LogRecord) -> Result<LogRecordPos> {
        let _guard = self.write_lock.lock();
        self.append_log_record(record)
    }

    /// Appends one encoded record to the active file, rotating first when
    /// the record would push it past `options.data_file_size`.
    ///
    /// Callers must hold the writer lock; batch commit and merge hold it
    /// across several appends.
    pub(crate) fn append_log_record(&self, record: &LogRecord) -> Result<LogRecordPos> {
        let enc = record.encode();
        let size = enc.len() as u64;

        let mut active = self.active_file.write();

        if active.write_off() + size > self.options.data_file_size {
            // seal the current file and open the next id
            active.sync()?;
            let next_id = active.file_id() + 1;
            let new_file = DataFile::open(&self.options.dir_path, next_id, IoType::StandardFile)?;
            let sealed = std::mem::replace(&mut *active, new_file);
            self.older_files
                .write()
                .insert(sealed.file_id(), Arc::new(sealed));
        }

        let offset = active.append(&enc)?;

        let written = self.bytes_since_sync.fetch_add(size, Ordering::SeqCst) + size;
        let need_sync = self.options.sync_writes
            || (self.options.bytes_per_sync > 0 && written >= self.options.bytes_per_sync);
        if need_sync {
            active.sync()?;
            self.bytes_since_sync.store(0, Ordering::SeqCst);
        }

        Ok(LogRecordPos {
            file_id: active.file_id(),
            offset,
            size: size as u32,
        })
    }
}
