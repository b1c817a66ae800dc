/// Read path: keydir lookup, then exactly one positional read against the
/// referenced data file.
use std::sync::Arc;

use data::{DataFile, LogRecordPos, LogRecordType};

use crate::{Engine, Error, Result};

impl Engine {
    /// Returns the current value of `key`.
    ///
    /// # Errors
    ///
    /// [`Error::KeyNotFound`] when the key is absent or deleted;
    /// [`Error::InvalidCrc`] when the referenced record is damaged on disk.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        let pos = self.index.get(key).ok_or(Error::KeyNotFound)?;
        self.get_value_by_position(&pos)
    }

    /// Reads the value of the record at `pos`.
    pub(crate) fn get_value_by_position(&self, pos: &LogRecordPos) -> Result<Vec<u8>> {
        let record = {
            let active = self.active_file.read();
            if active.file_id() == pos.file_id {
                active.read_log_record(pos.offset)?.0
            } else {
                drop(active);
                let file = self.older_file(pos.file_id)?;
                file.read_log_record(pos.offset)?.0
            }
        };

        if record.rec_type == LogRecordType::Deleted {
            return Err(Error::KeyNotFound);
        }
        Ok(record.value)
    }

    /// Clones the catalog entry for `file_id` out from under the lock.
    pub(crate) fn older_file(&self, file_id: u32) -> Result<Arc<DataFile>> {
        self.older_files
            .read()
            .get(&file_id)
            .cloned()
            .ok_or(Error::DataFileNotFound)
    }
}
