//! WAL record format:
//!
//! ```text
//! rec_len:u32 | op:u8 | ts:i64 | body[rec_len-13] | rec_crc32:u32
//! ```
//!
//! `body` here is `id_len:u16 | id[..] | tag_count:u32 |
//! (ts:i64 | tag_len:u16 | tag[..])×tag_count | content_present:u8 |
//! (content_len:u32 | content[..])?`. WAL records never intern tag strings —
//! interning only happens when a record is folded into the entity section
//! at checkpoint — so replay never depends on the index section
//! being present or correct.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use entitydb_core::{EntityId, Tag, TagError, Timestamp};

/// The operation a WAL record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalOp {
    /// A new entity was created.
    Create,
    /// Tags were appended (and/or content replaced) on an existing entity.
    Update,
    /// A logical delete (`status:deleted` tag append).
    Delete,
    /// A chunk child entity was created as part of a chunked content write.
    ChunkWrite,
}

impl WalOp {
    fn to_byte(self) -> u8 {
        match self {
            WalOp::Create => 0,
            WalOp::Update => 1,
            WalOp::Delete => 2,
            WalOp::ChunkWrite => 3,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(WalOp::Create),
            1 => Some(WalOp::Update),
            2 => Some(WalOp::Delete),
            3 => Some(WalOp::ChunkWrite),
            _ => None,
        }
    }
}

/// A decoded WAL record: the operation, the entity it applies to, the tags
/// it appends, and the new content (if any was supplied).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// The kind of operation.
    pub op: WalOp,
    /// The commit timestamp of the operation.
    pub timestamp: Timestamp,
    /// Target entity id.
    pub entity_id: EntityId,
    /// Tags appended by this operation.
    pub tags: Vec<(Timestamp, Tag)>,
    /// New content, if this operation replaces it. `None` means "leave
    /// content unchanged" for `Update`; always `Some` for `Create`/
    /// `ChunkWrite` (possibly empty bytes).
    pub content: Option<Vec<u8>>,
}

/// Errors returned while decoding a WAL record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WalRecordError {
    /// The buffer ended before a complete record could be read.
    #[error("truncated WAL record")]
    Truncated,
    /// The trailing CRC32 did not match — this record, and everything after
    /// it, is considered garbage.
    #[error("WAL record checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },
    /// The op discriminant byte was not one of the four known operations.
    #[error("unknown WAL op byte {0}")]
    UnknownOp(u8),
    /// A tag string failed namespace validation.
    #[error("invalid tag in WAL record: {0}")]
    InvalidTag(#[from] TagError),
}

impl WalRecord {
    /// Encode this record to its on-disk byte representation, including the
    /// leading `rec_len` and trailing CRC32.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        let id_bytes = self.entity_id.as_str().as_bytes();
        body.extend_from_slice(&(id_bytes.len() as u16).to_le_bytes());
        body.extend_from_slice(id_bytes);

        body.extend_from_slice(&(self.tags.len() as u32).to_le_bytes());
        for (ts, tag) in &self.tags {
            body.extend_from_slice(&ts.as_nanos().to_le_bytes());
            let tag_bytes = tag.as_str().as_bytes();
            body.extend_from_slice(&(tag_bytes.len() as u16).to_le_bytes());
            body.extend_from_slice(tag_bytes);
        }

        match &self.content {
            None => body.push(0),
            Some(content) => {
                body.push(1);
                body.extend_from_slice(&(content.len() as u32).to_le_bytes());
                body.extend_from_slice(content);
            }
        }

        let mut rec = Vec::with_capacity(4 + 1 + 8 + body.len() + 4);
        // placeholder for rec_len, filled in below
        rec.extend_from_slice(&[0u8; 4]);
        rec.push(self.op.to_byte());
        rec.extend_from_slice(&self.timestamp.as_nanos().to_le_bytes());
        rec.extend_from_slice(&body);
        let crc = crc32fast::hash(&rec[4..]);
        rec.extend_from_slice(&crc.to_le_bytes());
        let rec_len = (rec.len() - 4) as u32;
        LittleEndian::write_u32(&mut rec[0..4], rec_len);
        rec
    }

    /// Decode a single record starting at `buf[0]`. Returns the record and
    /// the number of bytes consumed (`4 + rec_len`).
    pub fn from_bytes(buf: &[u8]) -> Result<(Self, usize), WalRecordError> {
        if buf.len() < 4 {
            return Err(WalRecordError::Truncated);
        }
        let rec_len = LittleEndian::read_u32(&buf[0..4]) as usize;
        let total = 4 + rec_len;
        if rec_len < 13 || buf.len() < total {
            return Err(WalRecordError::Truncated);
        }
        let rest = &buf[4..total];
        let (payload, crc_bytes) = rest.split_at(rest.len() - 4);
        let expected = LittleEndian::read_u32(crc_bytes);
        let computed = crc32fast::hash(payload);
        if expected != computed {
            return Err(WalRecordError::ChecksumMismatch { expected, computed });
        }

        let op = WalOp::from_byte(payload[0]).ok_or(WalRecordError::UnknownOp(payload[0]))?;
        let ts = Timestamp::from_nanos(LittleEndian::read_i64(&payload[1..9]));
        let mut cursor = 9usize;

        let id_len = read_u16(payload, &mut cursor)?;
        let id_bytes = read_slice(payload, &mut cursor, id_len)?;
        let entity_id = EntityId::from_str_unchecked(
            std::str::from_utf8(id_bytes).map_err(|_| WalRecordError::Truncated)?,
        );

        let tag_count = read_u32(payload, &mut cursor)?;
        let mut tags = Vec::with_capacity(tag_count as usize);
        for _ in 0..tag_count {
            let tag_ts = read_i64(payload, &mut cursor)?;
            let tag_len = read_u16(payload, &mut cursor)?;
            let tag_bytes = read_slice(payload, &mut cursor, tag_len)?;
            let tag_str =
                std::str::from_utf8(tag_bytes).map_err(|_| WalRecordError::Truncated)?;
            tags.push((Timestamp::from_nanos(tag_ts), Tag::parse(tag_str)?));
        }

        let content_present = *payload.get(cursor).ok_or(WalRecordError::Truncated)?;
        cursor += 1;
        let content = if content_present == 1 {
            let len = read_u32(payload, &mut cursor)? as usize;
            Some(read_slice(payload, &mut cursor, len)?.to_vec())
        } else {
            None
        };

        Ok((
            WalRecord {
                op,
                timestamp: ts,
                entity_id,
                tags,
                content,
            },
            total,
        ))
    }
}

fn read_u16(buf: &[u8], cursor: &mut usize) -> Result<usize, WalRecordError> {
    let slice = buf.get(*cursor..*cursor + 2).ok_or(WalRecordError::Truncated)?;
    *cursor += 2;
    Ok(LittleEndian::read_u16(slice) as usize)
}

fn read_u32(buf: &[u8], cursor: &mut usize) -> Result<u32, WalRecordError> {
    let slice = buf.get(*cursor..*cursor + 4).ok_or(WalRecordError::Truncated)?;
    *cursor += 4;
    Ok(LittleEndian::read_u32(slice))
}

fn read_i64(buf: &[u8], cursor: &mut usize) -> Result<i64, WalRecordError> {
    let slice = buf.get(*cursor..*cursor + 8).ok_or(WalRecordError::Truncated)?;
    *cursor += 8;
    Ok(LittleEndian::read_i64(slice))
}

fn read_slice<'a>(buf: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8], WalRecordError> {
    let slice = buf.get(*cursor..*cursor + len).ok_or(WalRecordError::Truncated)?;
    *cursor += len;
    Ok(slice)
}
