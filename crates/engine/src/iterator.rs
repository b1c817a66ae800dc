/// Snapshot iteration over live keys.
///
/// An iterator captures the keydir's key list once, under the indexer lock,
/// and then reads values by position as it advances. There is no snapshot
/// isolation beyond that: a key overwritten mid-iteration yields the value
/// current at the time `next` runs, and a key whose segment was merged away
/// surfaces an error for that entry.
use data::LogRecordPos;

use crate::{Engine, IteratorOptions, Result};

/// Iterator over `(key, value)` pairs, in key order.
pub struct Iter<'a> {
    engine: &'a Engine,
    items: Vec<(Vec<u8>, LogRecordPos)>,
    cursor: usize,
}

impl Engine {
    /// Returns an iterator over the live keys, optionally filtered by prefix
    /// and reversed.
    pub fn iter(&self, options: IteratorOptions) -> Iter<'_> {
        let mut items = self.index.list(options.reverse);
        if !options.prefix.is_empty() {
            items.retain(|(key, _)| key.starts_with(&options.prefix));
        }
        Iter {
            engine: self,
            items,
            cursor: 0,
        }
    }

    /// Snapshot of every live key, in lexicographic order.
    pub fn list_keys(&self) -> Vec<Vec<u8>> {
        self.index
            .list(false)
            .into_iter()
            .map(|(key, _)| key)
            .collect()
    }

    /// Calls `f` for every live entry, in key order, until `f` returns
    /// `false`.
    pub fn fold<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], Vec<u8>) -> bool,
    {
        for (key, pos) in self.index.list(false) {
            let value = self.get_value_by_position(&pos)?;
            if !f(&key, value) {
                break;
            }
        }
        Ok(())
    }
}

impl Iterator for Iter<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, pos) = self.items.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(
            self.engine
                .get_value_by_position(&pos)
                .map(|value| (key, value)),
        )
    }
}
