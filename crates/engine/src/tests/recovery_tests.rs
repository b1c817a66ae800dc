use super::helpers::{key, test_options, value};
use crate::{Engine, Error, IndexType};
use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use tempfile::tempdir;

#[test]
fn reopen_restores_the_keydir() -> Result<()> {
    let dir = tempdir()?;
    {
        let engine = Engine::open(test_options(dir.path()))?;
        engine.put(b"a".to_vec(), b"1".to_vec())?;
        engine.put(b"b".to_vec(), b"2".to_vec())?;
        engine.put(b"a".to_vec(), b"3".to_vec())?;
    }

    let engine = Engine::open(test_options(dir.path()))?;
    assert_eq!(engine.get(b"a")?, b"3");
    assert_eq!(engine.get(b"b")?, b"2");
    assert_eq!(engine.stat()?.key_num, 2);
    Ok(())
}

#[test]
fn reopen_restores_deletes() -> Result<()> {
    let dir = tempdir()?;
    {
        let engine = Engine::open(test_options(dir.path()))?;
        engine.put(b"gone".to_vec(), b"v".to_vec())?;
        engine.put(b"kept".to_vec(), b"v".to_vec())?;
        engine.delete(b"gone")?;
    }

    let engine = Engine::open(test_options(dir.path()))?;
    assert!(matches!(engine.get(b"gone"), Err(Error::KeyNotFound)));
    assert_eq!(engine.get(b"kept")?, b"v");
    Ok(())
}

#[test]
fn appends_continue_where_recovery_left_off() -> Result<()> {
    let dir = tempdir()?;
    {
        let engine = Engine::open(test_options(dir.path()))?;
        engine.put(b"before".to_vec(), b"restart".to_vec())?;
    }
    {
        let engine = Engine::open(test_options(dir.path()))?;
        engine.put(b"after".to_vec(), b"restart".to_vec())?;
    }

    let engine = Engine::open(test_options(dir.path()))?;
    assert_eq!(engine.get(b"before")?, b"restart");
    assert_eq!(engine.get(b"after")?, b"restart");
    Ok(())
}

#[test]
fn every_index_type_recovers() -> Result<()> {
    for index_type in [IndexType::BTree, IndexType::Art, IndexType::BPlusTree] {
        let dir = tempdir()?;
        let mut opts = test_options(dir.path());
        opts.index_type = index_type;

        {
            let engine = Engine::open(opts.clone())?;
            for i in 0..50 {
                engine.put(key(i), value(i))?;
            }
            engine.delete(&key(0))?;
            engine.close()?;
        }

        let engine = Engine::open(opts)?;
        assert_eq!(engine.stat()?.key_num, 49);
        assert!(matches!(engine.get(&key(0)), Err(Error::KeyNotFound)));
        for i in 1..50 {
            assert_eq!(engine.get(&key(i))?, value(i));
        }
    }
    Ok(())
}

#[test]
fn bptree_close_persists_the_sequence_number() -> Result<()> {
    let dir = tempdir()?;
    let mut opts = test_options(dir.path());
    opts.index_type = IndexType::BPlusTree;

    {
        let engine = Engine::open(opts.clone())?;
        let batch = engine.new_write_batch(Default::default());
        batch.put(b"k".to_vec(), b"v".to_vec())?;
        batch.commit()?;
        engine.close()?;
        assert!(dir.path().join("seq-no").exists());
    }

    let engine = Engine::open(opts)?;
    // the file is consumed at open and the counter picks up where it left off
    assert!(!dir.path().join("seq-no").exists());
    assert_eq!(engine.seq_no.load(std::sync::atomic::Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn mmap_startup_recovers_the_same_state() -> Result<()> {
    let dir = tempdir()?;
    let mut opts = test_options(dir.path());
    opts.data_file_size = 1024;

    {
        let engine = Engine::open(opts.clone())?;
        for i in 0..100 {
            engine.put(key(i), value(i))?;
        }
    }

    opts.mmap_at_startup = true;
    let engine = Engine::open(opts)?;
    for i in 0..100 {
        assert_eq!(engine.get(&key(i))?, value(i));
    }
    // normal operation continues on standard file handles
    engine.put(b"post-mmap".to_vec(), b"write".to_vec())?;
    assert_eq!(engine.get(b"post-mmap")?, b"write");
    Ok(())
}

#[test]
fn second_process_is_locked_out() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;

    assert!(matches!(
        Engine::open(test_options(dir.path())),
        Err(Error::DatabaseLocked)
    ));

    drop(engine);
    let reopened = Engine::open(test_options(dir.path()))?;
    drop(reopened);
    Ok(())
}

#[test]
fn torn_tail_bytes_are_ignored_on_reopen() -> Result<()> {
    let dir = tempdir()?;
    {
        let engine = Engine::open(test_options(dir.path()))?;
        engine.put(b"safe".to_vec(), b"landed".to_vec())?;
    }

    // a crash can leave fewer bytes than even a record header
    let mut file = OpenOptions::new()
        .append(true)
        .open(dir.path().join("000000000.data"))?;
    file.write_all(&[0xde, 0xad, 0xbe])?;
    file.sync_all()?;
    drop(file);

    let engine = Engine::open(test_options(dir.path()))?;
    assert_eq!(engine.get(b"safe")?, b"landed");
    engine.put(b"next".to_vec(), b"write".to_vec())?;
    assert_eq!(engine.get(b"next")?, b"write");
    Ok(())
}

#[test]
fn corrupt_record_fails_recovery() -> Result<()> {
    let dir = tempdir()?;
    {
        let engine = Engine::open(test_options(dir.path()))?;
        engine.put(b"key-one".to_vec(), b"value-one".to_vec())?;
        engine.put(b"key-two".to_vec(), b"value-two".to_vec())?;
    }

    // flip a byte inside the first record's value
    let segment = dir.path().join("000000000.data");
    let mut bytes = std::fs::read(&segment)?;
    bytes[12] ^= 0xff;
    std::fs::write(&segment, &bytes)?;

    assert!(matches!(
        Engine::open(test_options(dir.path())),
        Err(Error::InvalidCrc)
    ));
    Ok(())
}

#[test]
fn unparseable_segment_name_fails_recovery() -> Result<()> {
    let dir = tempdir()?;
    {
        let engine = Engine::open(test_options(dir.path()))?;
        engine.put(b"k".to_vec(), b"v".to_vec())?;
    }
    std::fs::write(dir.path().join("not-a-number.data"), b"")?;

    assert!(matches!(
        Engine::open(test_options(dir.path())),
        Err(Error::DataDirectoryCorrupted)
    ));
    Ok(())
}
