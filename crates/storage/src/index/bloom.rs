//! A fixed-size Bloom filter over tag strings.
//!
//! A negative lookup here lets `ListByTag` and wildcard queries short-circuit
//! on a tag that has never been written, without touching the (much bigger)
//! tag→entity-ids shards. False positives are expected and harmless — a
//! positive just falls through to the real index; false negatives are not
//! allowed, since they would hide real data.

use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

const NUM_HASHES: u32 = 4;

/// A simple bit-array Bloom filter, sized in bits.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
}

impl BloomFilter {
    /// Build an empty filter with room for roughly `expected_items` entries
    /// at a reasonable false-positive rate (~1%). Sizing follows the
    /// standard `-n*ln(p) / (ln(2)^2)` bits-per-item formula.
    pub fn new(expected_items: usize) -> Self {
        let n = expected_items.max(1) as f64;
        let bits_needed = (-(n * 0.01_f64.ln()) / (2f64.ln().powi(2))).ceil() as u64;
        let num_bits = bits_needed.max(64).next_power_of_two();
        BloomFilter {
            bits: vec![0u64; (num_bits / 64) as usize],
            num_bits,
        }
    }

    fn hash_at(&self, s: &str, seed: u64) -> u64 {
        let mut hasher = FxHasher::default();
        seed.hash(&mut hasher);
        s.hash(&mut hasher);
        hasher.finish() % self.num_bits
    }

    /// Record that `s` exists.
    pub fn insert(&mut self, s: &str) {
        for i in 0..NUM_HASHES {
            let bit = self.hash_at(s, i as u64);
            self.bits[(bit / 64) as usize] |= 1 << (bit % 64);
        }
    }

    /// `true` means "maybe present"; `false` means "definitely absent".
    pub fn might_contain(&self, s: &str) -> bool {
        (0..NUM_HASHES).all(|i| {
            let bit = self.hash_at(s, i as u64);
            self.bits[(bit / 64) as usize] & (1 << (bit % 64)) != 0
        })
    }

    /// Serialize as `num_bits:u64 | word_count:u32 | words[..]:u64`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + self.bits.len() * 8);
        out.extend_from_slice(&self.num_bits.to_le_bytes());
        out.extend_from_slice(&(self.bits.len() as u32).to_le_bytes());
        for word in &self.bits {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Deserialize a filter written by [`BloomFilter::to_bytes`]. Returns
    /// the filter and the number of bytes consumed.
    pub fn from_bytes(buf: &[u8]) -> Option<(Self, usize)> {
        if buf.len() < 12 {
            return None;
        }
        let num_bits = u64::from_le_bytes(buf[0..8].try_into().ok()?);
        let word_count = u32::from_le_bytes(buf[8..12].try_into().ok()?) as usize;
        let mut cursor = 12;
        let mut bits = Vec::with_capacity(word_count);
        for _ in 0..word_count {
            let word = u64::from_le_bytes(buf.get(cursor..cursor + 8)?.try_into().ok()?);
            bits.push(word);
            cursor += 8;
        }
        Some((BloomFilter { bits, num_bits }, cursor))
    }
}
