use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use data::LogRecordPos;
use parking_lot::RwLock;

use crate::{IndexError, Indexer, Result};

/// Page file kept in the data directory by the on-disk keydir.
pub const BPTREE_INDEX_FILE_NAME: &str = "bptree-index";

const PAGE_SIZE: usize = 4096;
const META_MAGIC: u32 = 0x4250_4b31; // "BPK1"

/// Upper bound on key length for this variant; a key plus its slot overhead
/// must leave room for at least two entries per page so splits always make
/// progress.
const MAX_BPTREE_KEY_SIZE: usize = 1024;

/// On-disk B+ tree keydir.
///
/// Pages are 4 KiB. Page 0 is the meta page (magic, root id, page count, key
/// count); every other page is one tree node. Values live only in leaves;
/// interior nodes route by separator keys. The whole node set is kept in
/// memory and written through to the page file on every mutation, with an
/// fsync at [`close`](Indexer::close).
///
/// The page file is removed and rebuilt from the log on every open, so a
/// stale tree can never disagree with the data files. Deletes do not
/// rebalance; emptied leaves are reused by later inserts.
pub struct BPlusTreeIndexer {
    inner: RwLock<BpTree>,
}

struct BpTree {
    file: File,
    root: u32,
    page_count: u32,
    key_count: u64,
    nodes: HashMap<u32, BpNode>,
}

struct BpNode {
    is_leaf: bool,
    keys: Vec<Vec<u8>>,
    /// Internal nodes: `keys.len() + 1` child page ids.
    children: Vec<u32>,
    /// Leaves: one position per key.
    values: Vec<LogRecordPos>,
}

impl BpNode {
    fn leaf() -> Self {
        Self {
            is_leaf: true,
            keys: Vec::new(),
            children: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Serialized byte size of this node's page image.
    fn page_len(&self) -> usize {
        let mut n = 1 + 2;
        if self.is_leaf {
            for k in &self.keys {
                n += 2 + k.len() + 4 + 8 + 4;
            }
        } else {
            n += 4 * self.children.len();
            for k in &self.keys {
                n += 2 + k.len();
            }
        }
        n
    }
}

impl BPlusTreeIndexer {
    /// Creates a fresh page file under `dir_path`, replacing any stale one
    /// from a previous run.
    pub fn open(dir_path: &Path) -> Result<Self> {
        let path = dir_path.join(BPTREE_INDEX_FILE_NAME);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let mut nodes = HashMap::new();
        nodes.insert(1, BpNode::leaf());
        let tree = BpTree {
            file,
            root: 1,
            page_count: 2,
            key_count: 0,
            nodes,
        };
        tree.write_page(1)?;
        tree.write_meta()?;
        Ok(Self {
            inner: RwLock::new(tree),
        })
    }
}

impl BpTree {
    fn node(&self, pid: u32) -> &BpNode {
        match self.nodes.get(&pid) {
            Some(n) => n,
            None => unreachable!("dangling page id {pid}"),
        }
    }

    fn node_mut(&mut self, pid: u32) -> &mut BpNode {
        match self.nodes.get_mut(&pid) {
            Some(n) => n,
            None => unreachable!("dangling page id {pid}"),
        }
    }

    /// Descends to the leaf responsible for `key`, returning the leaf page id
    /// and the interior path above it (root first).
    fn find_leaf(&self, key: &[u8]) -> (u32, Vec<u32>) {
        let mut pid = self.root;
        let mut path = Vec::new();
        loop {
            let node = self.node(pid);
            if node.is_leaf {
                return (pid, path);
            }
            path.push(pid);
            let i = node.keys.partition_point(|k| k.as_slice() <= key);
            pid = node.children[i];
        }
    }

    fn insert(&mut self, key: Vec<u8>, pos: LogRecordPos) -> Result<Option<LogRecordPos>> {
        let (leaf_pid, path) = self.find_leaf(&key);
        let leaf = self.node_mut(leaf_pid);
        match leaf.keys.binary_search_by(|k| k.as_slice().cmp(&key)) {
            Ok(i) => {
                let old = leaf.values[i];
                leaf.values[i] = pos;
                self.write_page(leaf_pid)?;
                Ok(Some(old))
            }
            Err(i) => {
                leaf.keys.insert(i, key);
                leaf.values.insert(i, pos);
                self.key_count += 1;
                self.split_if_needed(leaf_pid, path)?;
                self.write_meta()?;
                Ok(None)
            }
        }
    }

    fn remove(&mut self, key: &[u8]) -> Result<Option<LogRecordPos>> {
        let (leaf_pid, _) = self.find_leaf(key);
        let leaf = self.node_mut(leaf_pid);
        match leaf.keys.binary_search_by(|k| k.as_slice().cmp(key)) {
            Ok(i) => {
                leaf.keys.remove(i);
                let old = leaf.values.remove(i);
                self.key_count -= 1;
                self.write_page(leaf_pid)?;
                self.write_meta()?;
                Ok(Some(old))
            }
            Err(_) => Ok(None),
        }
    }

    /// Splits `pid` and its ancestors until every page on the path fits.
    fn split_if_needed(&mut self, pid: u32, mut path: Vec<u32>) -> Result<()> {
        let mut pid = pid;
        loop {
            if self.node(pid).page_len() <= PAGE_SIZE {
                self.write_page(pid)?;
                return Ok(());
            }

            let new_pid = self.page_count;
            self.page_count += 1;

            let node = self.node_mut(pid);
            let (sep, right) = if node.is_leaf {
                let mid = node.keys.len() / 2;
                let rkeys = node.keys.split_off(mid);
                let rvalues = node.values.split_off(mid);
                let sep = rkeys[0].clone();
                (
                    sep,
                    BpNode {
                        is_leaf: true,
                        keys: rkeys,
                        children: Vec::new(),
                        values: rvalues,
                    },
                )
            } else {
                // the middle separator moves up instead of being copied
                let mid = node.keys.len() / 2;
                let rkeys = node.keys.split_off(mid + 1);
                let rchildren = node.children.split_off(mid + 1);
                let sep = match node.keys.pop() {
                    Some(k) => k,
                    None => unreachable!("oversized interior node with no keys"),
                };
                (
                    sep,
                    BpNode {
                        is_leaf: false,
                        keys: rkeys,
                        children: rchildren,
                        values: Vec::new(),
                    },
                )
            };
            self.nodes.insert(new_pid, right);
            self.write_page(pid)?;
            self.write_page(new_pid)?;

            match path.pop() {
                Some(parent_pid) => {
                    let parent = self.node_mut(parent_pid);
                    let at = parent.keys.partition_point(|k| k.as_slice() < sep.as_slice());
                    parent.keys.insert(at, sep);
                    parent.children.insert(at + 1, new_pid);
                    pid = parent_pid;
                }
                None => {
                    let new_root = self.page_count;
                    self.page_count += 1;
                    self.nodes.insert(
                        new_root,
                        BpNode {
                            is_leaf: false,
                            keys: vec![sep],
                            children: vec![pid, new_pid],
                            values: Vec::new(),
                        },
                    );
                    self.root = new_root;
                    self.write_page(new_root)?;
                    return Ok(());
                }
            }
        }
    }

    fn collect(&self, pid: u32, out: &mut Vec<(Vec<u8>, LogRecordPos)>) {
        let node = self.node(pid);
        if node.is_leaf {
            for (k, v) in node.keys.iter().zip(node.values.iter()) {
                out.push((k.clone(), *v));
            }
        } else {
            for &child in &node.children {
                self.collect(child, out);
            }
        }
    }

    fn write_meta(&self) -> Result<()> {
        let mut buf = Vec::with_capacity(20);
        buf.write_u32::<LittleEndian>(META_MAGIC)?;
        buf.write_u32::<LittleEndian>(self.root)?;
        buf.write_u32::<LittleEndian>(self.page_count)?;
        buf.write_u64::<LittleEndian>(self.key_count)?;
        buf.resize(PAGE_SIZE, 0);
        self.file.write_all_at(&buf, 0)?;
        Ok(())
    }

    fn write_page(&self, pid: u32) -> Result<()> {
        let node = self.node(pid);
        let mut buf = Vec::with_capacity(PAGE_SIZE);
        buf.push(u8::from(node.is_leaf));
        buf.write_u16::<LittleEndian>(node.keys.len() as u16)?;
        if node.is_leaf {
            for (k, v) in node.keys.iter().zip(node.values.iter()) {
                buf.write_u16::<LittleEndian>(k.len() as u16)?;
                buf.extend_from_slice(k);
                buf.write_u32::<LittleEndian>(v.file_id)?;
                buf.write_u64::<LittleEndian>(v.offset)?;
                buf.write_u32::<LittleEndian>(v.size)?;
            }
        } else {
            for &child in &node.children {
                buf.write_u32::<LittleEndian>(child)?;
            }
            for k in &node.keys {
                buf.write_u16::<LittleEndian>(k.len() as u16)?;
                buf.extend_from_slice(k);
            }
        }
        if buf.len() > PAGE_SIZE {
            return Err(IndexError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "page overflow",
            )));
        }
        buf.resize(PAGE_SIZE, 0);
        self.file
            .write_all_at(&buf, pid as u64 * PAGE_SIZE as u64)?;
        Ok(())
    }
}

impl Indexer for BPlusTreeIndexer {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> Result<Option<LogRecordPos>> {
        if key.len() > MAX_BPTREE_KEY_SIZE {
            return Err(IndexError::KeyTooLarge(key.len()));
        }
        self.inner.write().insert(key, pos)
    }

    fn get(&self, key: &[u8]) -> Option<LogRecordPos> {
        let tree = self.inner.read();
        let (leaf_pid, _) = tree.find_leaf(key);
        let leaf = tree.node(leaf_pid);
        leaf.keys
            .binary_search_by(|k| k.as_slice().cmp(key))
            .ok()
            .map(|i| leaf.values[i])
    }

    fn delete(&self, key: &[u8]) -> Result<Option<LogRecordPos>> {
        self.inner.write().remove(key)
    }

    fn len(&self) -> usize {
        self.inner.read().key_count as usize
    }

    fn list(&self, reverse: bool) -> Vec<(Vec<u8>, LogRecordPos)> {
        let tree = self.inner.read();
        let mut out = Vec::with_capacity(tree.key_count as usize);
        tree.collect(tree.root, &mut out);
        if reverse {
            out.reverse();
        }
        out
    }

    fn close(&self) -> Result<()> {
        let tree = self.inner.read();
        tree.write_meta()?;
        tree.file.sync_all()?;
        Ok(())
    }
}
