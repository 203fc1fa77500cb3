//! Content chunking for payloads over the configured threshold.
//!
//! Splitting and reassembly are pure functions over bytes: they never touch
//! the container or WAL directly. `entitydb-engine`'s repository is the
//! caller that turns a `Plan` into actual chunk entities (each its own
//! WAL-backed create) and that fetches chunk entities back by id to
//! reassemble.

use sha2::{Digest, Sha256};

use entitydb_core::{Entity, EntityId, Tag, Timestamp};

/// Default chunk size: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Default threshold above which content is chunked instead of stored
/// inline: 4 MiB.
pub const DEFAULT_CHUNK_THRESHOLD: usize = 4 * 1024 * 1024;

/// One slice of a chunked payload, not yet attached to an entity id.
pub struct ChunkSlice {
    /// Position of this chunk among its siblings, starting at 0.
    pub index: usize,
    /// The chunk's bytes.
    pub bytes: Vec<u8>,
    /// sha256 of `bytes`, hex-encoded.
    pub sha256_hex: String,
}

/// The result of planning a chunked write: the parent's bookkeeping tags
/// and the ordered child slices still needing entity ids.
pub struct ChunkPlan {
    /// `content:chunks:<count>`, `content:chunk-size:<bytes>`,
    /// `content:sha256:<hex>`, `content:size:<total_bytes>`.
    pub parent_tags: Vec<Tag>,
    /// The chunk slices, in order.
    pub slices: Vec<ChunkSlice>,
}

/// Split `content` into fixed-size slices of `chunk_size` bytes (the last
/// one possibly short) and compute the parent's bookkeeping tags. Does
/// nothing content-size-threshold-aware — callers decide whether chunking
/// is warranted at all.
pub fn plan_chunks(content: &[u8], chunk_size: usize) -> ChunkPlan {
    debug_assert!(chunk_size > 0);
    let total_sha = hex_sha256(content);
    let slices: Vec<ChunkSlice> = content
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, bytes)| ChunkSlice {
            index,
            bytes: bytes.to_vec(),
            sha256_hex: hex_sha256(bytes),
        })
            .collect();

    let parent_tags = vec![
        Tag::from_parts("content", &format!("chunks:{}", slices.len())),
        Tag::from_parts("content", &format!("chunk-size:{chunk_size}")),
        Tag::from_parts("content", &format!("sha256:{total_sha}")),
        Tag::from_parts("content", &format!("size:{}", content.len())),
    ];

    ChunkPlan { parent_tags, slices }
}

/// Build the entity for one chunk slice, as a child of `parent_id`.
///
/// Tags: `type:chunk`, `parent:<parent_id>`, `chunk:index:<N>`,
/// `chunk:size:<bytes>`, `chunk:sha256:<hex>`. The chunk's own
/// id is left to the caller (`Create` on the repository assigns it exactly
/// like any other entity).
pub fn chunk_entity(id: EntityId, parent_id: &EntityId, slice: &ChunkSlice, at: Timestamp) -> Entity {
    let mut entity = Entity::new(id);
    entity.append_tags(
        at,
        [
            Tag::from_parts("type", "chunk"),
            Tag::from_parts("parent", parent_id.as_str()),
            Tag::from_parts("chunk", &format!("index:{}", slice.index)),
            Tag::from_parts("chunk", &format!("size:{}", slice.bytes.len())),
            Tag::from_parts("chunk", &format!("sha256:{}", slice.sha256_hex)),
        ],
    );
    entity.set_content(slice.bytes.clone());
    entity
}

/// Reassemble chunk entities, already fetched and ordered by `chunk:index`,
/// into the original byte payload, verifying the total sha256 against
/// `expected_sha256_hex`.
pub fn reassemble<'a>(
    ordered_chunks: impl Iterator<Item = &'a [u8]>,
    expected_sha256_hex: &str,
) -> Result<Vec<u8>, ChunkIntegrityError> {
    let mut out = Vec::new();
    for chunk in ordered_chunks {
        out.extend_from_slice(chunk);
    }
    let actual = hex_sha256(&out);
    if actual != expected_sha256_hex {
        return Err(ChunkIntegrityError::Sha256Mismatch {
            expected: expected_sha256_hex.to_string(),
            actual,
        });
    }
    Ok(out)
}

/// Errors detected while reassembling a chunked payload.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChunkIntegrityError {
    /// The reassembled bytes' sha256 did not match `content:sha256`.
    #[error("chunk reassembly sha256 mismatch: expected {expected}, got {actual}")]
    Sha256Mismatch { expected: String, actual: String },
}

fn hex_sha256(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_exact_multiple() {
        let content = vec![7u8; 12];
        let plan = plan_chunks(&content, 4);
        assert_eq!(plan.slices.len(), 3);
        assert!(plan.slices.iter().all(|s| s.bytes.len() == 4));
    }

    #[test]
    fn last_chunk_is_short() {
        let content = vec![1u8; 10];
        let plan = plan_chunks(&content, 4);
        assert_eq!(plan.slices.len(), 3);
        assert_eq!(plan.slices[2].bytes.len(), 2);
    }

    #[test]
    fn round_trips_large_payload() {
        // 10x the default chunk threshold round-trips.
        let content: Vec<u8> = (0..(DEFAULT_CHUNK_SIZE * 3 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        let plan = plan_chunks(&content, DEFAULT_CHUNK_SIZE);
        assert_eq!(plan.slices.len(), 4);
        let expected_sha = plan
            .parent_tags
            .iter()
            .find(|t| t.namespace() == "content" && t.value().starts_with("sha256:"))
            .unwrap()
            .value()
            .trim_start_matches("sha256:")
            .to_string();
        let reassembled = reassemble(plan.slices.iter().map(|s| s.bytes.as_slice()), &expected_sha).unwrap();
        assert_eq!(reassembled, content);
    }

    #[test]
    fn detects_tampered_chunk() {
        let content = vec![9u8; 100];
        let plan = plan_chunks(&content, 32);
        let mut tampered: Vec<Vec<u8>> = plan.slices.iter().map(|s| s.bytes.clone()).collect();
        tampered[0][0] ^= 0xFF;
        let expected_sha = hex_sha256(&content);
        let result = reassemble(tampered.iter().map(|v| v.as_slice()), &expected_sha);
        assert!(matches!(result, Err(ChunkIntegrityError::Sha256Mismatch {.. })));
    }

    #[test]
    fn chunk_entity_carries_parent_back_reference() {
        let parent = EntityId::from_str_unchecked("parent-1");
        let slice = ChunkSlice { index: 2, bytes: vec![1, 2, 3], sha256_hex: "abc".into() };
        let entity = chunk_entity(EntityId::from_str_unchecked("chunk-1"), &parent, &slice, Timestamp::from_nanos(1));
        let tags: Vec<&str> = entity.tags().iter().map(|t| t.tag.as_str()).collect();
        assert!(tags.contains(&"parent:parent-1"));
        assert!(tags.contains(&"chunk:index:2"));
    }
}
