use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;

use crate::varint::{self, MAX_VARINT_LEN32};
use crate::{DataError, Result};

/// Maximum serialized header size: crc (4) + type (1) + two 32-bit varints
/// (5 each). Decoders read at most this many bytes before the body.
pub const MAX_LOG_RECORD_HEADER_SIZE: usize = 4 + 1 + MAX_VARINT_LEN32 * 2;

/// What a log record means to the keydir.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecordType {
    /// A live key/value pair.
    Normal,
    /// A tombstone: the key is deleted. Carries no value.
    Deleted,
    /// Marks the successful end of an atomic batch with a given seq number.
    TxnFinished,
}

impl LogRecordType {
    pub(crate) fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(LogRecordType::Normal),
            1 => Some(LogRecordType::Deleted),
            2 => Some(LogRecordType::TxnFinished),
            _ => None,
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            LogRecordType::Normal => 0,
            LogRecordType::Deleted => 1,
            LogRecordType::TxnFinished => 2,
        }
    }
}

/// A single record appended to a data file. Immutable once written.
///
/// The `key` here is the on-disk form, i.e. `uvarint(seq_no) || user_key`;
/// the engine owns that encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub rec_type: LogRecordType,
}

impl LogRecord {
    /// Serializes the record into its on-disk frame.
    ///
    /// The returned buffer's length is the record's size on disk, which is
    /// also what goes into [`LogRecordPos::size`].
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            MAX_LOG_RECORD_HEADER_SIZE + self.key.len() + self.value.len(),
        );
        // crc placeholder, patched below
        buf.extend_from_slice(&[0u8; 4]);
        buf.push(self.rec_type.as_u8());
        varint::put_varint(&mut buf, self.key.len() as i64);
        varint::put_varint(&mut buf, self.value.len() as i64);
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);

        let mut hasher = Crc32::new();
        hasher.update(&buf[4..]);
        let crc = hasher.finalize();
        LittleEndian::write_u32(&mut buf[..4], crc);
        buf
    }
}

/// Decoded header prefix of a record. The `rec_type` byte stays raw until the
/// CRC has been verified.
pub(crate) struct RecordHeader {
    pub crc: u32,
    pub rec_type: u8,
    pub key_size: u32,
    pub value_size: u32,
}

/// Parses the header prefix out of `buf`, returning the header and its
/// encoded length. `None` means too few bytes remain for a header, which a
/// sequential scan treats as end of stream.
pub(crate) fn decode_header(buf: &[u8]) -> Option<(RecordHeader, usize)> {
    if buf.len() <= 4 {
        return None;
    }
    let crc = LittleEndian::read_u32(&buf[..4]);
    let rec_type = buf[4];
    let mut idx = 5;
    let (key_size, n) = varint::varint(&buf[idx..])?;
    idx += n;
    let (value_size, n) = varint::varint(&buf[idx..])?;
    idx += n;
    Some((
        RecordHeader {
            crc,
            rec_type,
            key_size: key_size as u32,
            value_size: value_size as u32,
        },
        idx,
    ))
}

/// Recomputes the record CRC over the header tail (everything after the crc
/// field) plus key and value.
pub(crate) fn record_crc(header_tail: &[u8], key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(header_tail);
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

/// Where a record lives on disk: which file, at what offset, and how many
/// bytes it occupies. One of these per live key in the keydir.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecordPos {
    pub file_id: u32,
    pub offset: u64,
    pub size: u32,
}

impl LogRecordPos {
    /// Serializes the position as three signed varints: `file_id`, `offset`,
    /// `size`. This is the value payload of hint records.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MAX_VARINT_LEN32 * 2 + varint::MAX_VARINT_LEN64);
        varint::put_varint(&mut buf, self.file_id as i64);
        varint::put_varint(&mut buf, self.offset as i64);
        varint::put_varint(&mut buf, self.size as i64);
        buf
    }

    /// Decodes a position triple produced by [`encode`](Self::encode).
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (file_id, n) = varint::varint(buf).ok_or(DataError::Corrupted)?;
        let mut idx = n;
        let (offset, n) = varint::varint(&buf[idx..]).ok_or(DataError::Corrupted)?;
        idx += n;
        let (size, _) = varint::varint(&buf[idx..]).ok_or(DataError::Corrupted)?;
        Ok(LogRecordPos {
            file_id: file_id as u32,
            offset: offset as u64,
            size: size as u32,
        })
    }
}
