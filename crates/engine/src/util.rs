/// Small file-system helpers: directory sizing, free-space queries, and the
/// backup copy.
use std::fs;
use std::io;
use std::path::Path;

/// Total size in bytes of every file under `dir`, recursively.
pub(crate) fn dir_size(dir: &Path) -> io::Result<u64> {
    let mut size = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            size += dir_size(&entry.path())?;
        } else {
            size += meta.len();
        }
    }
    Ok(size)
}

/// Free bytes available on the file system holding `dir`.
pub(crate) fn available_disk_size(dir: &Path) -> io::Result<u64> {
    fs2::available_space(dir)
}

/// Recursively copies `src` into `dest`, skipping any entry whose file name
/// is in `exclude`.
pub(crate) fn copy_dir(src: &Path, dest: &Path, exclude: &[&str]) -> io::Result<()> {
    if !dest.is_dir() {
        fs::create_dir_all(dest)?;
    }
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(name) = name.to_str() {
            if exclude.contains(&name) {
                continue;
            }
        }
        let target = dest.join(&name);
        if entry.metadata()?.is_dir() {
            copy_dir(&entry.path(), &target, exclude)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}
