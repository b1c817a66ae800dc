use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::IoManager;

/// Standard file-backed I/O.
///
/// The file is opened in append mode, so every `write` lands at the end of
/// the file regardless of interleaved positional reads. Positional reads use
/// `pread` and never move a shared cursor, which makes concurrent readers
/// safe without any locking here.
pub struct FileIo {
    file: File,
}

impl FileIo {
    /// Opens (or creates) `path` for appending and positional reads.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        Ok(Self { file })
    }
}

impl IoManager for FileIo {
    fn read(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut read = 0;
        while read < buf.len() {
            let n = self.file.read_at(&mut buf[read..], offset + read as u64)?;
            if n == 0 {
                break;
            }
            read += n;
        }
        Ok(read)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut f = &self.file;
        f.write_all(buf)?;
        Ok(buf.len())
    }

    fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    fn close(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}
