use super::helpers::{key, test_options, value};
use crate::{Engine, IteratorOptions};
use anyhow::Result;
use tempfile::tempdir;

#[test]
fn reads_reach_into_sealed_segments() -> Result<()> {
    let dir = tempdir()?;
    let mut opts = test_options(dir.path());
    opts.data_file_size = 256;
    let engine = Engine::open(opts)?;

    for i in 0..100 {
        engine.put(key(i), value(i))?;
    }
    assert!(engine.active_file.read().file_id() > 0);

    // early keys now live in sealed files, late keys in the active one
    for i in 0..100 {
        assert_eq!(engine.get(&key(i))?, value(i));
    }
    Ok(())
}

#[test]
fn list_keys_is_sorted_snapshot() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;

    for k in [b"cherry".to_vec(), b"apple".to_vec(), b"banana".to_vec()] {
        engine.put(k, b"fruit".to_vec())?;
    }
    engine.delete(b"banana")?;

    assert_eq!(
        engine.list_keys(),
        vec![b"apple".to_vec(), b"cherry".to_vec()]
    );
    Ok(())
}

#[test]
fn fold_visits_until_false() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;

    for i in 0..10 {
        engine.put(key(i), value(i))?;
    }

    let mut seen = Vec::new();
    engine.fold(|k, v| {
        seen.push((k.to_vec(), v));
        seen.len() < 4
    })?;
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[0].0, key(0));
    assert_eq!(seen[3].1, value(3));
    Ok(())
}

// --------------------- Iterator ---------------------

#[test]
fn iterator_yields_pairs_in_key_order() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;

    for i in (0..20).rev() {
        engine.put(key(i), value(i))?;
    }

    let pairs: Vec<_> = engine
        .iter(IteratorOptions::default())
        .collect::<crate::Result<Vec<_>>>()?;
    assert_eq!(pairs.len(), 20);
    for (i, (k, v)) in pairs.iter().enumerate() {
        assert_eq!(k, &key(i));
        assert_eq!(v, &value(i));
    }
    Ok(())
}

#[test]
fn iterator_reverse() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;

    for i in 0..5 {
        engine.put(key(i), value(i))?;
    }

    let opts = IteratorOptions {
        reverse: true,
        ..Default::default()
    };
    let pairs: Vec<_> = engine.iter(opts).collect::<crate::Result<Vec<_>>>()?;
    assert_eq!(pairs[0].0, key(4));
    assert_eq!(pairs[4].0, key(0));
    Ok(())
}

#[test]
fn iterator_prefix_filter() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;

    engine.put(b"user:1".to_vec(), b"alice".to_vec())?;
    engine.put(b"user:2".to_vec(), b"bob".to_vec())?;
    engine.put(b"session:1".to_vec(), b"xyz".to_vec())?;

    let opts = IteratorOptions {
        prefix: b"user:".to_vec(),
        ..Default::default()
    };
    let pairs: Vec<_> = engine.iter(opts).collect::<crate::Result<Vec<_>>>()?;
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].0, b"user:1");
    assert_eq!(pairs[1].0, b"user:2");
    Ok(())
}

#[test]
fn iterator_on_empty_engine() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_options(dir.path()))?;
    assert_eq!(engine.iter(IteratorOptions::default()).count(), 0);
    Ok(())
}
