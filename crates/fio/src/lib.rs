//! # FIO — File I/O Management
//!
//! Abstracts positional reads and append writes over a single file so that the
//! data-file layer can switch between two backends:
//!
//! - [`FileIo`] — a standard read/write file handle, used for all normal
//!   operation.
//! - [`MmapIo`] — a read-only memory-mapped view, used only while replaying
//!   segments at startup. It refuses `write` and `sync`.
//!
//! The backend is selected through [`IoType`] and the [`new_io_manager`]
//! factory.

mod file_io;
mod mmap;

pub use file_io::FileIo;
pub use mmap::MmapIo;

use std::io;
use std::path::Path;

/// Which I/O backend to open a file with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoType {
    /// Standard `File`-backed reads and appends.
    StandardFile,
    /// Read-only memory map. Used to speed up the sequential startup scan.
    MemoryMap,
}

/// Capability set shared by every I/O backend.
///
/// `read` is positional and side-effect free, so readers may call it
/// concurrently. `write` has append semantics: bytes always land at the
/// current end of the file.
pub trait IoManager: Send + Sync {
    /// Reads up to `buf.len()` bytes starting at `offset`. Returns the number
    /// of bytes actually read, which is smaller than `buf.len()` only at end
    /// of file.
    fn read(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Appends `buf` to the end of the file and returns the number of bytes
    /// written.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Flushes written data to stable storage (`fsync`).
    fn sync(&self) -> io::Result<()>;

    /// Releases the backend. For file-backed I/O this syncs; the descriptor
    /// itself is closed on drop.
    fn close(&self) -> io::Result<()>;

    /// Returns the current size of the file in bytes.
    fn size(&self) -> io::Result<u64>;
}

/// Opens an I/O manager of the requested type for `path`, creating the file
/// if it does not exist.
pub fn new_io_manager(path: &Path, io_type: IoType) -> io::Result<Box<dyn IoManager>> {
    match io_type {
        IoType::StandardFile => Ok(Box::new(FileIo::new(path)?)),
        IoType::MemoryMap => Ok(Box::new(MmapIo::new(path)?)),
    }
}
