//! Hash functions for the membership filter
//!
//! Double hashing needs two independent streams: `h1` is a Murmur3 32-bit
//! pass (fast on short URL-length keys), `h2` is a seeded XxHash64 (distinct
//! algorithm, distinct seed). Bit positions are derived as
//! `(h1 + i * h2) mod m`, following Kirsch & Mitzenmacher.

use std::hash::Hasher;

use twox_hash::XxHash64;

/// Seed for the Murmur3 pass.
const SEED_H1: u32 = 0x9e3779b9; // Golden ratio
/// Seed for the XxHash64 pass.
const SEED_H2: u64 = 0x85eb_ca6b_c2b2_ae35;

/// Murmur3 32-bit hash implementation.
/// Optimized for short strings (typical URL lengths).
#[inline]
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let len = data.len();
    let mut h = seed;
    let mut i = 0;

    // Process 4-byte chunks
    let chunks = (len >> 2) << 2; // Round down to multiple of 4
    while i < chunks {
        let k = u32::from_le_bytes([
            data[i],
            data[i + 1],
            data[i + 2],
            data[i + 3],
        ]);

        let k = k.wrapping_mul(0xcc9e2d51);
        let k = k.rotate_left(15);
        let k = k.wrapping_mul(0x1b873593);

        h ^= k;
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe6546b64);

        i += 4;
    }

    // Process remaining bytes
    let mut k: u32 = 0;
    let remainder = len & 3;
    if remainder >= 3 {
        k ^= (data[i + 2] as u32) << 16;
    }
    if remainder >= 2 {
        k ^= (data[i + 1] as u32) << 8;
    }
    if remainder >= 1 {
        k ^= data[i] as u32;
        let k = k.wrapping_mul(0xcc9e2d51);
        let k = k.rotate_left(15);
        let k = k.wrapping_mul(0x1b873593);
        h ^= k;
    }

    // Finalization
    h ^= len as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;

    h
}

/// XxHash64 with a fixed seed, the second stream of the double hash.
#[inline]
pub fn xxhash64(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(SEED_H2);
    hasher.write(data);
    hasher.finish()
}

/// The two hash values a key contributes to the filter.
///
/// Positions are materialized lazily so callers can stop at the first unset
/// bit during lookups.
#[derive(Debug, Clone, Copy)]
pub struct IndexPair {
    h1: u64,
    h2: u64,
}

impl IndexPair {
    /// Hash a key into the two independent streams.
    #[inline]
    pub fn of(key: &str) -> Self {
        Self {
            h1: murmur3_32(key.as_bytes(), SEED_H1) as u64,
            h2: xxhash64(key.as_bytes()),
        }
    }

    /// The i-th bit position in a filter of `bits` bits.
    #[inline]
    pub fn position(&self, i: u32, bits: u32) -> u32 {
        (self.h1.wrapping_add((i as u64).wrapping_mul(self.h2)) % bits as u64) as u32
    }
}
