use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use memmap2::Mmap;

use crate::IoManager;

/// Read-only memory-mapped I/O.
///
/// Only used while replaying segments at startup, where the whole file is
/// scanned sequentially and page-cache-backed reads beat `pread` calls. A
/// zero-length file maps to nothing; reads on it return 0 bytes.
pub struct MmapIo {
    map: Option<Mmap>,
}

impl MmapIo {
    /// Maps `path` read-only, creating the file if it does not exist.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).read(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        let map = if len == 0 {
            None
        } else {
            // Safety: the engine never truncates or rewrites a mapped file;
            // data files are append-only and the map is dropped before any
            // further appends happen through the standard backend.
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(Self { map })
    }
}

impl IoManager for MmapIo {
    fn read(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let Some(map) = &self.map else {
            return Ok(0);
        };
        let len = map.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let n = buf.len().min((len - offset) as usize);
        buf[..n].copy_from_slice(&map[offset as usize..offset as usize + n]);
        Ok(n)
    }

    fn write(&self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "memory-mapped files are read-only",
        ))
    }

    fn sync(&self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "memory-mapped files are read-only",
        ))
    }

    fn close(&self) -> io::Result<()> {
        Ok(())
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.map.as_ref().map_or(0, |m| m.len() as u64))
    }
}
