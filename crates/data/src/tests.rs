use super::*;
use fio::IoType;
use tempfile::tempdir;

fn record(key: &[u8], value: &[u8], rec_type: LogRecordType) -> LogRecord {
    LogRecord {
        key: key.to_vec(),
        value: value.to_vec(),
        rec_type,
    }
}

// -------------------- Record codec --------------------

#[test]
fn encode_layout_of_small_record() {
    let rec = record(b"name", b"bitcask", LogRecordType::Normal);
    let enc = rec.encode();

    // crc(4) + type(1) + varint(4)=1 + varint(7)=1 + key(4) + value(7)
    assert_eq!(enc.len(), 4 + 1 + 1 + 1 + 4 + 7);
    assert_eq!(enc[4], 0); // Normal
    assert_eq!(&enc[7..11], b"name");
    assert_eq!(&enc[11..], b"bitcask");
}

#[test]
fn tombstone_has_no_value_bytes() {
    let rec = record(b"k", b"", LogRecordType::Deleted);
    let enc = rec.encode();
    assert_eq!(enc.len(), 4 + 1 + 1 + 1 + 1);
    assert_eq!(enc[4], 1); // Deleted
}

#[test]
fn pos_roundtrip() {
    let pos = LogRecordPos {
        file_id: 7,
        offset: 1024,
        size: 33,
    };
    let decoded = LogRecordPos::decode(&pos.encode()).unwrap();
    assert_eq!(decoded, pos);
}

#[test]
fn pos_decode_rejects_truncated_buffer() {
    let pos = LogRecordPos {
        file_id: 1,
        offset: 4096,
        size: 99,
    };
    let enc = pos.encode();
    assert!(matches!(
        LogRecordPos::decode(&enc[..1]),
        Err(DataError::Corrupted)
    ));
}

// -------------------- Data file append / read --------------------

#[test]
fn append_returns_pre_write_offset() {
    let dir = tempdir().unwrap();
    let mut df = DataFile::open(dir.path(), 0, IoType::StandardFile).unwrap();

    let first = record(b"a", b"1", LogRecordType::Normal).encode();
    let second = record(b"b", b"2", LogRecordType::Normal).encode();

    assert_eq!(df.append(&first).unwrap(), 0);
    assert_eq!(df.append(&second).unwrap(), first.len() as u64);
    assert_eq!(df.write_off(), (first.len() + second.len()) as u64);
}

#[test]
fn read_back_sequence_of_records() {
    let dir = tempdir().unwrap();
    let mut df = DataFile::open(dir.path(), 1, IoType::StandardFile).unwrap();

    let recs = vec![
        record(b"alpha", b"one", LogRecordType::Normal),
        record(b"beta", b"", LogRecordType::Deleted),
        record(b"gamma", b"three", LogRecordType::Normal),
    ];
    for r in &recs {
        df.append(&r.encode()).unwrap();
    }

    let mut offset = 0;
    let mut seen = Vec::new();
    loop {
        match df.read_log_record(offset) {
            Ok((rec, size)) => {
                seen.push(rec);
                offset += size;
            }
            Err(DataError::EndOfStream) => break,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(seen, recs);
}

#[test]
fn read_at_end_is_end_of_stream() {
    let dir = tempdir().unwrap();
    let mut df = DataFile::open(dir.path(), 2, IoType::StandardFile).unwrap();
    let enc = record(b"k", b"v", LogRecordType::Normal).encode();
    df.append(&enc).unwrap();

    assert!(matches!(
        df.read_log_record(enc.len() as u64),
        Err(DataError::EndOfStream)
    ));
}

#[test]
fn single_byte_corruption_is_detected() {
    let dir = tempdir().unwrap();
    let path = DataFile::file_name(dir.path(), 3);
    {
        let mut df = DataFile::open(dir.path(), 3, IoType::StandardFile).unwrap();
        df.append(&record(b"key", b"value", LogRecordType::Normal).encode())
            .unwrap();
        df.sync().unwrap();
    }

    // Flip one byte inside the value.
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&path, &bytes).unwrap();

    let df = DataFile::open(dir.path(), 3, IoType::StandardFile).unwrap();
    assert!(matches!(
        df.read_log_record(0),
        Err(DataError::InvalidCrc)
    ));
}

#[test]
fn torn_tail_record_reads_as_end_of_stream() {
    let dir = tempdir().unwrap();
    let path = DataFile::file_name(dir.path(), 4);
    {
        let mut df = DataFile::open(dir.path(), 4, IoType::StandardFile).unwrap();
        df.append(&record(b"whole", b"record", LogRecordType::Normal).encode())
            .unwrap();
        df.append(&record(b"torn", b"tail-bytes", LogRecordType::Normal).encode())
            .unwrap();
        df.sync().unwrap();
    }

    // Cut the last record short, as if the process died mid-append.
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 6]).unwrap();

    let df = DataFile::open(dir.path(), 4, IoType::StandardFile).unwrap();
    let (first, size) = df.read_log_record(0).unwrap();
    assert_eq!(first.key, b"whole");
    assert!(matches!(
        df.read_log_record(size),
        Err(DataError::EndOfStream)
    ));
}

#[test]
fn hint_record_roundtrip() {
    let dir = tempdir().unwrap();
    let mut hint = DataFile::hint_file(dir.path()).unwrap();
    let pos = LogRecordPos {
        file_id: 5,
        offset: 777,
        size: 41,
    };
    hint.append_hint_record(b"user-key", &pos).unwrap();

    let hint = DataFile::hint_file(dir.path()).unwrap();
    let (rec, _) = hint.read_log_record(0).unwrap();
    assert_eq!(rec.key, b"user-key");
    assert_eq!(LogRecordPos::decode(&rec.value).unwrap(), pos);
}

#[test]
fn mmap_reads_agree_with_standard_io() {
    let dir = tempdir().unwrap();
    let recs = vec![
        record(b"one", b"1", LogRecordType::Normal),
        record(b"two", b"22", LogRecordType::Normal),
    ];
    {
        let mut df = DataFile::open(dir.path(), 6, IoType::StandardFile).unwrap();
        for r in &recs {
            df.append(&r.encode()).unwrap();
        }
        df.sync().unwrap();
    }

    let df = DataFile::open(dir.path(), 6, IoType::MemoryMap).unwrap();
    let (first, size) = df.read_log_record(0).unwrap();
    let (second, _) = df.read_log_record(size).unwrap();
    assert_eq!(first, recs[0]);
    assert_eq!(second, recs[1]);
}

#[test]
fn file_names_are_nine_digit_zero_padded() {
    let name = DataFile::file_name(std::path::Path::new("/tmp/kv"), 42);
    assert!(name.to_string_lossy().ends_with("000000042.data"));
}
