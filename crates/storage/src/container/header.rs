//! The 128-byte file header.
//!
//! ```text
//! magic[4]="EDBU" | version:u32 | created_ns:i64 | entity_count:u64
//! | wal_offset:u64 | wal_length:u64 | index_offset:u64 | index_length:u64
//! | header_crc32:u32 | reserved[...]
//! ```
//!
//! Magic bytes, a version field, and a trailing CRC32 over everything
//! before it, with a `to_bytes`/`from_bytes` pair as the only place that
//! knows the byte layout. This header is embedded as the first 128 bytes of
//! the single unified file rather than living in a side file.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Magic bytes identifying an EntityDB unified file.
pub const MAGIC: [u8; 4] = *b"EDBU";

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Fixed size of the header, in bytes.
pub const HEADER_SIZE: usize = 128;

const CRC_OFFSET: usize = 68;

/// Errors returned while parsing a header.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    /// The buffer was shorter than [`HEADER_SIZE`].
    #[error("header buffer too short: {0} < {HEADER_SIZE}")]
    TooShort(usize),
    /// The magic bytes did not match [`MAGIC`].
    #[error("bad magic bytes: {0:?}")]
    BadMagic([u8; 4]),
    /// The trailing CRC32 did not match the computed checksum.
    #[error("header checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },
}

/// The file header: a consistent description of the three logical regions
/// (entity section, WAL section, index section) of the unified file.
///
/// `entity_count`, `wal_offset`/`wal_length`, and `index_offset`/`index_length`
/// describe a consistent prefix of the file — anything appended past these
/// offsets without a corresponding header update is a torn write and is
/// truncated at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// On-disk format version.
    pub version: u32,
    /// Database creation time, nanoseconds since epoch.
    pub created_ns: i64,
    /// Number of entity records in the entity section.
    pub entity_count: u64,
    /// Byte offset of the WAL region.
    pub wal_offset: u64,
    /// Byte length of the WAL region currently in use.
    pub wal_length: u64,
    /// Byte offset of the index section.
    pub index_offset: u64,
    /// Byte length of the index section.
    pub index_length: u64,
}

impl Header {
    /// Build a fresh header for a brand-new database file. The entity
    /// section immediately follows the header; WAL and index regions are
    /// empty until the first checkpoint.
    pub fn new_empty(created_ns: i64) -> Self {
        Header {
            version: FORMAT_VERSION,
            created_ns,
            entity_count: 0,
            wal_offset: HEADER_SIZE as u64,
            wal_length: 0,
            index_offset: HEADER_SIZE as u64,
            index_length: 0,
        }
    }

    /// The offset immediately following the entity section, i.e. where the
    /// WAL region begins, given a running entity-section byte length.
    /// Stored separately because the entity section always starts right
    /// after the header.
    pub const ENTITY_SECTION_START: u64 = HEADER_SIZE as u64;

    /// Serialize to the fixed 128-byte on-disk layout, with a freshly
    /// computed trailing CRC32.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        LittleEndian::write_u32(&mut buf[4..8], self.version);
        LittleEndian::write_i64(&mut buf[8..16], self.created_ns);
        LittleEndian::write_u64(&mut buf[16..24], self.entity_count);
        LittleEndian::write_u64(&mut buf[24..32], self.wal_offset);
        LittleEndian::write_u64(&mut buf[32..40], self.wal_length);
        LittleEndian::write_u64(&mut buf[40..48], self.index_offset);
        LittleEndian::write_u64(&mut buf[48..56], self.index_length);
        // bytes 56..68 reserved-but-covered-by-crc, left zero for now.
        let crc = crc32fast::hash(&buf[..CRC_OFFSET]);
        LittleEndian::write_u32(&mut buf[CRC_OFFSET..CRC_OFFSET + 4], crc);
        buf
    }

    /// Parse a header from the first [`HEADER_SIZE`] bytes of the file,
    /// verifying magic and checksum.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, HeaderError> {
        if buf.len() < HEADER_SIZE {
            return Err(HeaderError::TooShort(buf.len()));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&buf[0..4]);
        if magic != MAGIC {
            return Err(HeaderError::BadMagic(magic));
        }
        let expected = LittleEndian::read_u32(&buf[CRC_OFFSET..CRC_OFFSET + 4]);
        let computed = crc32fast::hash(&buf[..CRC_OFFSET]);
        if expected != computed {
            return Err(HeaderError::ChecksumMismatch { expected, computed });
        }
        Ok(Header {
            version: LittleEndian::read_u32(&buf[4..8]),
            created_ns: LittleEndian::read_i64(&buf[8..16]),
            entity_count: LittleEndian::read_u64(&buf[16..24]),
            wal_offset: LittleEndian::read_u64(&buf[24..32]),
            wal_length: LittleEndian::read_u64(&buf[32..40]),
            index_offset: LittleEndian::read_u64(&buf[40..48]),
            index_length: LittleEndian::read_u64(&buf[48..56]),
        })
    }
}
