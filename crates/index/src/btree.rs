use std::collections::BTreeMap;

use data::LogRecordPos;
use parking_lot::RwLock;

use crate::{Indexer, Result};

/// The default keydir: an ordered map under a reader-writer lock.
pub struct BTreeIndexer {
    tree: RwLock<BTreeMap<Vec<u8>, LogRecordPos>>,
}

impl BTreeIndexer {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for BTreeIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexer for BTreeIndexer {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> Result<Option<LogRecordPos>> {
        Ok(self.tree.write().insert(key, pos))
    }

    fn get(&self, key: &[u8]) -> Option<LogRecordPos> {
        self.tree.read().get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> Result<Option<LogRecordPos>> {
        Ok(self.tree.write().remove(key))
    }

    fn len(&self) -> usize {
        self.tree.read().len()
    }

    fn list(&self, reverse: bool) -> Vec<(Vec<u8>, LogRecordPos)> {
        let tree = self.tree.read();
        if reverse {
            tree.iter().rev().map(|(k, p)| (k.clone(), *p)).collect()
        } else {
            tree.iter().map(|(k, p)| (k.clone(), *p)).collect()
        }
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
