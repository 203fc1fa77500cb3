//! On-disk entity record format:
//!
//! ```text
//! record_len:u32 | id_len:u16 | id[id_len] | tag_count:u32
//!   | ( ts:i64 | tag_id:varint | inline_tag? )×tag_count
//!   | content_len:u32 | content[content_len] | record_crc32:u32
//! ```
//!
//! `record_len` covers every byte that follows it, including the trailing
//! CRC32, so a reader can skip a whole record without decoding it.
//!
//! A 1-byte tag discriminates the shape of what follows; serialization is
//! plain `Vec<u8>`-builder code, no external serde derive.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use entitydb_core::{Entity, EntityId, Tag, TagError, TagRecord, Timestamp};

use super::interner::StringTable;
use super::varint;

const TAG_INTERNED: u8 = 0;
const TAG_INLINE: u8 = 1;

/// Errors returned while decoding an entity record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer ended before a complete record could be read.
    #[error("truncated entity record")]
    Truncated,
    /// The trailing CRC32 did not match.
    #[error("entity record checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },
    /// A tag referenced an interned id that is not present in the string
    /// table handed to the decoder.
    #[error("dangling interned tag id {0}")]
    DanglingTagId(u32),
    /// The id or a tag string was not valid UTF-8.
    #[error("invalid utf-8 in entity record")]
    InvalidUtf8,
    /// A tag string failed namespace validation on decode.
    #[error("invalid tag in entity record: {0}")]
    InvalidTag(#[from] TagError),
    /// A tag entry's discriminant byte was neither `TAG_INTERNED` nor
    /// `TAG_INLINE`.
    #[error("unknown tag encoding flag byte {0}")]
    UnknownTagFlag(u8),
}

/// Encode `entity` as a single on-disk record, interning tag strings into
/// `table` where budget allows and falling back to inline storage
/// otherwise.
pub fn encode_entity(entity: &Entity, table: &mut StringTable) -> Vec<u8> {
    let id_bytes = entity.id().as_str().as_bytes();
    let mut body = Vec::new();

    body.extend_from_slice(&(id_bytes.len() as u16).to_le_bytes());
    body.extend_from_slice(id_bytes);

    body.extend_from_slice(&(entity.tags().len() as u32).to_le_bytes());
    for record in entity.tags() {
        body.extend_from_slice(&record.timestamp.as_nanos().to_le_bytes());
        match table.intern(record.tag.as_str()) {
            Some(id) => {
                body.push(TAG_INTERNED);
                varint::write_u32(&mut body, id);
            }
            None => {
                body.push(TAG_INLINE);
                let bytes = record.tag.as_str().as_bytes();
                body.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
                body.extend_from_slice(bytes);
            }
        }
    }

    body.extend_from_slice(&(entity.content().len() as u32).to_le_bytes());
    body.extend_from_slice(entity.content());

    let crc = crc32fast::hash(&body);
    body.extend_from_slice(&crc.to_le_bytes());

    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// Decode a single entity record starting at `buf[0]`, using `table` to
/// resolve interned tag ids. Returns the decoded entity and the number of
/// bytes consumed (`4 + record_len`).
pub fn decode_entity(buf: &[u8], table: &StringTable) -> Result<(Entity, usize), CodecError> {
    if buf.len() < 4 {
        return Err(CodecError::Truncated);
    }
    let record_len = LittleEndian::read_u32(&buf[0..4]) as usize;
    let total = 4 + record_len;
    if buf.len() < total {
        return Err(CodecError::Truncated);
    }
    let body = &buf[4..total];
    if body.len() < 4 {
        return Err(CodecError::Truncated);
    }
    let (payload, crc_bytes) = body.split_at(body.len() - 4);
    let expected = LittleEndian::read_u32(crc_bytes);
    let computed = crc32fast::hash(payload);
    if expected != computed {
        return Err(CodecError::ChecksumMismatch { expected, computed });
    }

    let mut cursor = 0usize;
    let id_len = read_u16(payload, &mut cursor)?;
    let id_bytes = read_slice(payload, &mut cursor, id_len)?;
    let id = EntityId::from_str_unchecked(
        std::str::from_utf8(id_bytes).map_err(|_| CodecError::InvalidUtf8)?,
    );

    let tag_count = read_u32(payload, &mut cursor)?;
    let mut tags = Vec::with_capacity(tag_count as usize);
    for _ in 0..tag_count {
        let ts = read_i64(payload, &mut cursor)?;
        let flag = read_u8(payload, &mut cursor)?;
        let tag_str = match flag {
            TAG_INTERNED => {
                let (id, used) = varint::read_u32(&payload[cursor..])
                    .ok_or(CodecError::Truncated)?;
                cursor += used;
                table
                    .resolve(id)
                    .ok_or(CodecError::DanglingTagId(id))?
                    .to_string()
            }
            TAG_INLINE => {
                let len = read_u16(payload, &mut cursor)?;
                let bytes = read_slice(payload, &mut cursor, len)?;
                std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?.to_string()
            }
            other => return Err(CodecError::UnknownTagFlag(other)),
        };
        let tag = Tag::parse(tag_str)?;
        tags.push(TagRecord::new(Timestamp::from_nanos(ts), tag));
    }

    let content_len = read_u32(payload, &mut cursor)? as usize;
    let content = read_slice(payload, &mut cursor, content_len)?.to_vec();

    Ok((Entity::from_parts(id, tags, content), total))
}

fn read_u8(buf: &[u8], cursor: &mut usize) -> Result<u8, CodecError> {
    let b = *buf.get(*cursor).ok_or(CodecError::Truncated)?;
    *cursor += 1;
    Ok(b)
}

fn read_u16(buf: &[u8], cursor: &mut usize) -> Result<usize, CodecError> {
    let slice = buf.get(*cursor..*cursor + 2).ok_or(CodecError::Truncated)?;
    *cursor += 2;
    Ok(LittleEndian::read_u16(slice) as usize)
}

fn read_u32(buf: &[u8], cursor: &mut usize) -> Result<u32, CodecError> {
    let slice = buf.get(*cursor..*cursor + 4).ok_or(CodecError::Truncated)?;
    *cursor += 4;
    Ok(LittleEndian::read_u32(slice))
}

fn read_i64(buf: &[u8], cursor: &mut usize) -> Result<i64, CodecError> {
    let slice = buf.get(*cursor..*cursor + 8).ok_or(CodecError::Truncated)?;
    *cursor += 8;
    Ok(LittleEndian::read_i64(slice))
}

fn read_slice<'a>(buf: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8], CodecError> {
    let slice = buf.get(*cursor..*cursor + len).ok_or(CodecError::Truncated)?;
    *cursor += len;
    Ok(slice)
}
