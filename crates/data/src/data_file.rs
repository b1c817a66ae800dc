use std::path::{Path, PathBuf};

use fio::{new_io_manager, IoManager, IoType};

use crate::log_record::{decode_header, record_crc};
use crate::{DataError, LogRecord, LogRecordPos, LogRecordType, Result, MAX_LOG_RECORD_HEADER_SIZE};

/// Extension carried by every log segment, e.g. `000000003.data`.
pub const DATA_FILE_SUFFIX: &str = ".data";
/// Fast-recovery index written by merge: user key -> encoded position.
pub const HINT_FILE_NAME: &str = "hint-index";
/// Marker whose value is the first file id untouched by the last merge.
pub const MERGE_FINISHED_FILE_NAME: &str = "merge-finished";
/// Latest committed sequence number, persisted at close for the on-disk
/// B+ tree index.
pub const SEQ_NO_FILE_NAME: &str = "seq-no";

/// A single append-only segment plus its write cursor.
///
/// The file with the highest id is the active file and the only one that is
/// ever appended to; all lower ids are immutable and shared read-only.
pub struct DataFile {
    file_id: u32,
    write_off: u64,
    io: Box<dyn IoManager>,
}

impl DataFile {
    /// Opens the segment `dir_path/{file_id:09}.data`, creating it if absent.
    pub fn open(dir_path: &Path, file_id: u32, io_type: IoType) -> Result<Self> {
        let name = Self::file_name(dir_path, file_id);
        Self::new(&name, file_id, io_type)
    }

    /// Opens the hint file inside `dir_path`.
    pub fn hint_file(dir_path: &Path) -> Result<Self> {
        Self::new(&dir_path.join(HINT_FILE_NAME), 0, IoType::StandardFile)
    }

    /// Opens the merge-finished marker inside `dir_path`.
    pub fn merge_finished_file(dir_path: &Path) -> Result<Self> {
        Self::new(
            &dir_path.join(MERGE_FINISHED_FILE_NAME),
            0,
            IoType::StandardFile,
        )
    }

    /// Opens the seq-no file inside `dir_path`.
    pub fn seq_no_file(dir_path: &Path) -> Result<Self> {
        Self::new(&dir_path.join(SEQ_NO_FILE_NAME), 0, IoType::StandardFile)
    }

    /// Returns the full path of the segment with the given id.
    pub fn file_name(dir_path: &Path, file_id: u32) -> PathBuf {
        dir_path.join(format!("{:09}{}", file_id, DATA_FILE_SUFFIX))
    }

    fn new(path: &Path, file_id: u32, io_type: IoType) -> Result<Self> {
        let io = new_io_manager(path, io_type)?;
        Ok(Self {
            file_id,
            write_off: 0,
            io,
        })
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    pub fn write_off(&self) -> u64 {
        self.write_off
    }

    /// Restores the write cursor after recovery has scanned the file.
    pub fn set_write_off(&mut self, off: u64) {
        self.write_off = off;
    }

    /// Appends raw encoded bytes and returns the offset they were written at.
    pub fn append(&mut self, buf: &[u8]) -> Result<u64> {
        let offset = self.write_off;
        let n = self.io.write(buf)?;
        self.write_off += n as u64;
        Ok(offset)
    }

    /// Appends a hint record: the user key with the encoded position as its
    /// value.
    pub fn append_hint_record(&mut self, key: &[u8], pos: &LogRecordPos) -> Result<()> {
        let record = LogRecord {
            key: key.to_vec(),
            value: pos.encode(),
            rec_type: LogRecordType::Normal,
        };
        self.append(&record.encode())?;
        Ok(())
    }

    /// Reads and validates one record starting at `offset`.
    ///
    /// Returns the decoded record and its size on disk, so sequential scans
    /// can advance to the next record. `EndOfStream` means the scan is done:
    /// the offset is at (or past) the end of the written data, the zero
    /// header sentinel was hit, or a torn tail record is missing bytes.
    /// `InvalidCrc` means the record is present but damaged.
    pub fn read_log_record(&self, offset: u64) -> Result<(LogRecord, u64)> {
        let file_size = self.io.size()?;
        if offset >= file_size {
            return Err(DataError::EndOfStream);
        }

        // Near the end of the file there may be fewer than a full header's
        // worth of bytes left; clamp instead of over-reading.
        let header_len = (MAX_LOG_RECORD_HEADER_SIZE as u64).min(file_size - offset);
        let header_buf = self.read_n_bytes(header_len as usize, offset)?;

        let Some((header, header_size)) = decode_header(&header_buf) else {
            return Err(DataError::EndOfStream);
        };
        if header.crc == 0 && header.key_size == 0 && header.value_size == 0 {
            return Err(DataError::EndOfStream);
        }

        let key_size = header.key_size as u64;
        let value_size = header.value_size as u64;
        let record_size = header_size as u64 + key_size + value_size;

        let mut key = Vec::new();
        let mut value = Vec::new();
        if key_size + value_size > 0 {
            if offset + record_size > file_size {
                // torn tail from a crash mid-append
                return Err(DataError::EndOfStream);
            }
            let kv = self.read_n_bytes((key_size + value_size) as usize, offset + header_size as u64)?;
            value = kv[key_size as usize..].to_vec();
            key = kv;
            key.truncate(key_size as usize);
        }

        let crc = record_crc(&header_buf[4..header_size], &key, &value);
        if crc != header.crc {
            return Err(DataError::InvalidCrc);
        }

        let rec_type = LogRecordType::from_u8(header.rec_type).ok_or(DataError::Corrupted)?;
        Ok((
            LogRecord {
                key,
                value,
                rec_type,
            },
            record_size,
        ))
    }

    /// Flushes the file to stable storage.
    pub fn sync(&self) -> Result<()> {
        Ok(self.io.sync()?)
    }

    /// Releases the underlying I/O manager.
    pub fn close(&self) -> Result<()> {
        Ok(self.io.close()?)
    }

    /// Swaps the I/O backend, e.g. from the startup mmap back to a standard
    /// file handle once recovery is done. The write cursor is preserved.
    pub fn set_io_manager(&mut self, dir_path: &Path, io_type: IoType) -> Result<()> {
        self.io = new_io_manager(&Self::file_name(dir_path, self.file_id), io_type)?;
        Ok(())
    }

    fn read_n_bytes(&self, n: usize, offset: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let read = self.io.read(&mut buf, offset)?;
        if read < n {
            return Err(DataError::EndOfStream);
        }
        Ok(buf)
    }
}
