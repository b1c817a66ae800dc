use super::helpers::{key, test_options, value};
use crate::Engine;
use anyhow::Result;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

/// One writer, several readers. A reader must never miss a key the writer
/// has already acknowledged, and no read may surface a CRC error.
#[test]
fn readers_never_miss_acknowledged_writes() -> Result<()> {
    const TOTAL: usize = 5_000;
    const READERS: usize = 8;

    let dir = tempdir()?;
    let mut opts = test_options(dir.path());
    opts.data_file_size = 64 * 1024; // force a few rotations along the way
    let engine = Arc::new(Engine::open(opts)?);
    let written = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();

    for _ in 0..READERS {
        let engine = Arc::clone(&engine);
        let written = Arc::clone(&written);
        handles.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            loop {
                let n = written.load(Ordering::Acquire);
                if n >= TOTAL {
                    break;
                }
                if n == 0 {
                    continue;
                }
                let i = rng.gen_range(0..n);
                let got = engine.get(&key(i)).expect("acknowledged key must be readable");
                assert_eq!(got, value(i));
            }
        }));
    }

    {
        let engine = Arc::clone(&engine);
        let written = Arc::clone(&written);
        handles.push(thread::spawn(move || {
            for i in 0..TOTAL {
                engine.put(key(i), value(i)).expect("put failed");
                written.store(i + 1, Ordering::Release);
            }
        }));
    }

    for handle in handles {
        if handle.join().is_err() {
            anyhow::bail!("a worker thread panicked");
        }
    }

    for i in 0..TOTAL {
        assert_eq!(engine.get(&key(i))?, value(i));
    }
    Ok(())
}

/// Batches and direct writes interleave without tearing each other.
#[test]
fn concurrent_batches_commit_atomically() -> Result<()> {
    const BATCHES: usize = 20;
    const OPS_PER_BATCH: usize = 25;

    let dir = tempdir()?;
    let engine = Arc::new(Engine::open(test_options(dir.path()))?);

    let mut handles = Vec::new();
    for b in 0..BATCHES {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            let batch = engine.new_write_batch(Default::default());
            for i in 0..OPS_PER_BATCH {
                batch
                    .put(
                        format!("batch-{b:03}-key-{i:03}").into_bytes(),
                        format!("batch-{b:03}-val-{i:03}").into_bytes(),
                    )
                    .expect("stage failed");
            }
            batch.commit().expect("commit failed");
        }));
    }
    for handle in handles {
        if handle.join().is_err() {
            anyhow::bail!("a batch thread panicked");
        }
    }

    assert_eq!(engine.stat()?.key_num, BATCHES * OPS_PER_BATCH);
    for b in 0..BATCHES {
        for i in 0..OPS_PER_BATCH {
            assert_eq!(
                engine.get(format!("batch-{b:03}-key-{i:03}").as_bytes())?,
                format!("batch-{b:03}-val-{i:03}").into_bytes()
            );
        }
    }
    Ok(())
}

/// Iteration snapshots stay internally consistent while a writer churns.
#[test]
fn snapshot_iteration_during_writes() -> Result<()> {
    let dir = tempdir()?;
    let engine = Arc::new(Engine::open(test_options(dir.path()))?);

    for i in 0..500 {
        engine.put(key(i), value(i))?;
    }

    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for i in 500..1_000 {
                engine.put(key(i), value(i)).expect("put failed");
            }
        })
    };

    // every key listed in a snapshot existed at snapshot time, so each must
    // resolve to its (never overwritten) value
    for _ in 0..20 {
        for k in engine.list_keys() {
            let got = engine.get(&k).expect("snapshot key must resolve");
            assert_eq!(&got[6..], &k[4..], "value suffix must match key suffix");
        }
    }

    if writer.join().is_err() {
        anyhow::bail!("writer thread panicked");
    }
    assert_eq!(engine.stat()?.key_num, 1_000);
    Ok(())
}
