use std::fs;
use std::path::Path;

use crate::{IndexType, Options};

/// Options tuned for tests: tiny thresholds, in-memory keydir, no mmap.
pub fn test_options(dir: &Path) -> Options {
    Options {
        dir_path: dir.to_path_buf(),
        data_file_size: 64 * 1024 * 1024,
        sync_writes: false,
        bytes_per_sync: 0,
        index_type: IndexType::BTree,
        mmap_at_startup: false,
        data_file_merge_ratio: 0.5,
    }
}

pub fn count_data_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == "data")
                .unwrap_or(false)
        })
        .count()
}

pub fn key(i: usize) -> Vec<u8> {
    format!("key-{i:06}").into_bytes()
}

pub fn value(i: usize) -> Vec<u8> {
    format!("value-{i:06}").into_bytes()
}
