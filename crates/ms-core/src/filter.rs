//! Bit-vector membership filter
//!
//! A Bloom filter sized from an expected item count and a target
//! false-positive rate. `contains` never reports false for a key that was
//! added; false positives stay bounded by the construction parameters.
//!
//! The filter is replaced wholesale on rebuild and never partially rolled
//! back, so the only mutation is `add`.

use serde::Serialize;
use thiserror::Error;

use crate::hash::IndexPair;

/// Serialized header: `bits`, `hashes`, `items` as little-endian u32.
const HEADER_BYTES: usize = 12;

/// Error type for filter deserialization.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("filter data too short: {0} bytes")]
    Truncated(usize),
    #[error("degenerate filter parameters: bits={bits}, hashes={hashes}")]
    BadParameters { bits: u32, hashes: u32 },
    #[error("bit array length mismatch: header says {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Size and load statistics for a filter instance.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterStats {
    /// Bit-array size `m`.
    pub bits: u32,
    /// Hash-function count `k`.
    pub hashes: u32,
    /// Number of `add` calls since construction.
    pub items: u32,
    /// Bit-array footprint in bytes.
    pub byte_size: usize,
    /// Estimated current false-positive rate `(1 - e^(-k*n/m))^k`.
    pub estimated_false_positive_rate: f64,
}

/// Space-efficient probabilistic membership set.
pub struct MembershipFilter {
    bits: Vec<u8>,
    num_bits: u32,
    num_hashes: u32,
    items: u32,
}

impl MembershipFilter {
    /// Create a filter sized for `expected_items` at `false_positive_rate`.
    ///
    /// `m = ceil(-n * ln(p) / ln(2)^2)`, `k = ceil((m / n) * ln 2)`.
    /// Zero expected items sizes as one so an empty collection still yields
    /// a valid filter.
    pub fn new(expected_items: u32, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = false_positive_rate.clamp(1e-9, 0.5);
        let ln2 = std::f64::consts::LN_2;
        let m = (-(n * p.ln()) / (ln2 * ln2)).ceil().max(8.0);
        let k = ((m / n) * ln2).ceil().max(1.0);

        let num_bits = m as u32;
        Self {
            bits: vec![0u8; (num_bits as usize + 7) / 8],
            num_bits,
            num_hashes: k as u32,
            items: 0,
        }
    }

    /// Set the `k` double-hashed bits for `key`. Idempotent at the bit level.
    pub fn add(&mut self, key: &str) {
        let pair = IndexPair::of(key);
        for i in 0..self.num_hashes {
            let pos = pair.position(i, self.num_bits);
            self.bits[(pos / 8) as usize] |= 1 << (pos % 8);
        }
        self.items = self.items.saturating_add(1);
    }

    /// Probe the `k` bits for `key`.
    ///
    /// False on the first unset bit (definite absence). True only when every
    /// bit is set: probable presence, never a false negative.
    pub fn contains(&self, key: &str) -> bool {
        let pair = IndexPair::of(key);
        for i in 0..self.num_hashes {
            let pos = pair.position(i, self.num_bits);
            if self.bits[(pos / 8) as usize] & (1 << (pos % 8)) == 0 {
                return false;
            }
        }
        true
    }

    /// Byte-exact encoding: `(m, k, items)` as three u32 LE, then the raw
    /// bit-array bytes. Text-safe transport (base64) happens at the store
    /// boundary, not here.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_BYTES + self.bits.len());
        buf.extend_from_slice(&self.num_bits.to_le_bytes());
        buf.extend_from_slice(&self.num_hashes.to_le_bytes());
        buf.extend_from_slice(&self.items.to_le_bytes());
        buf.extend_from_slice(&self.bits);
        buf
    }

    /// Decode a filter previously produced by [`serialize`](Self::serialize).
    ///
    /// Truncated or length-inconsistent input is fatal to this call; the
    /// caller falls back to a full rebuild.
    pub fn deserialize(data: &[u8]) -> Result<Self, FilterError> {
        if data.len() < HEADER_BYTES {
            return Err(FilterError::Truncated(data.len()));
        }

        let num_bits = read_u32_le(data, 0);
        let num_hashes = read_u32_le(data, 4);
        let items = read_u32_le(data, 8);

        if num_bits == 0 || num_hashes == 0 {
            return Err(FilterError::BadParameters {
                bits: num_bits,
                hashes: num_hashes,
            });
        }

        let expected = (num_bits as usize + 7) / 8;
        let actual = data.len() - HEADER_BYTES;
        if expected != actual {
            return Err(FilterError::LengthMismatch { expected, actual });
        }

        Ok(Self {
            bits: data[HEADER_BYTES..].to_vec(),
            num_bits,
            num_hashes,
            items,
        })
    }

    /// Current size and load statistics.
    pub fn stats(&self) -> FilterStats {
        let m = self.num_bits as f64;
        let k = self.num_hashes as f64;
        let n = self.items as f64;
        let fill = 1.0 - (-k * n / m).exp();

        FilterStats {
            bits: self.num_bits,
            hashes: self.num_hashes,
            items: self.items,
            byte_size: self.bits.len(),
            estimated_false_positive_rate: fill.powf(k),
        }
    }

    /// Number of `add` calls since construction.
    pub fn item_count(&self) -> u32 {
        self.items
    }

    /// Bit-array footprint in bytes.
    pub fn byte_size(&self) -> usize {
        self.bits.len()
    }
}

/// Read u32 little-endian.
#[inline]
fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_url(i: usize) -> String {
        format!("https://example.com/articles/{}/comments", i)
    }

    fn disjoint_url(i: usize) -> String {
        format!("https://other.example.net/posts/{}", i)
    }

    #[test]
    fn test_added_keys_are_found() {
        let mut filter = MembershipFilter::new(100, 0.01);
        filter.add("https://example.com/a");
        filter.add("https://example.com/b");
        assert!(filter.contains("https://example.com/a"));
        assert!(filter.contains("https://example.com/b"));
    }

    #[test]
    fn test_no_forgetting_after_further_adds() {
        let mut filter = MembershipFilter::new(1000, 0.01);
        filter.add("https://example.com/first");
        assert!(filter.contains("https://example.com/first"));
        for i in 0..1000 {
            filter.add(&synthetic_url(i));
            assert!(filter.contains("https://example.com/first"));
        }
    }

    #[test]
    fn test_empty_filter_contains_nothing() {
        let filter = MembershipFilter::new(100, 0.01);
        assert!(!filter.contains("https://example.com/a"));
        assert!(!filter.contains(""));
    }

    #[test]
    fn test_zero_expected_items_is_usable() {
        let mut filter = MembershipFilter::new(0, 0.01);
        filter.add("https://example.com/only");
        assert!(filter.contains("https://example.com/only"));
    }

    #[test]
    fn test_sizing_formula() {
        // n=1000, p=0.001: m = ceil(1000 * 6.9078 / 0.4805) = 14378, k = 10.
        let filter = MembershipFilter::new(1000, 0.001);
        assert_eq!(filter.num_bits, 14378);
        assert_eq!(filter.num_hashes, 10);
        assert_eq!(filter.bits.len(), (14378 + 7) / 8);
    }

    #[test]
    fn test_scenario_thousand_urls_point_001() {
        let mut filter = MembershipFilter::new(1000, 0.001);
        for i in 0..1000 {
            filter.add(&synthetic_url(i));
        }
        for i in 0..1000 {
            assert!(filter.contains(&synthetic_url(i)), "false negative at {}", i);
        }

        let false_positives = (0..1000)
            .filter(|i| filter.contains(&disjoint_url(*i)))
            .count();
        // Expected ~1 at p=0.001 over 1000 probes; 10 leaves ample slack
        // while still catching a broken hash scheme outright.
        assert!(false_positives <= 10, "{} false positives", false_positives);
    }

    #[test]
    fn test_false_positive_rate_at_scale() {
        let target = 0.01;
        let inserted = 100_000;
        let mut filter = MembershipFilter::new(inserted, target);
        for i in 0..inserted as usize {
            filter.add(&synthetic_url(i));
        }

        let probes = 100_000usize;
        let false_positives = (0..probes)
            .filter(|i| filter.contains(&disjoint_url(*i)))
            .count();
        let observed = false_positives as f64 / probes as f64;
        assert!(
            observed <= target * 2.0,
            "observed fp rate {} exceeds tolerance {}",
            observed,
            target * 2.0
        );
    }

    #[test]
    fn test_serialize_roundtrip_preserves_contains() {
        let mut filter = MembershipFilter::new(500, 0.01);
        for i in 0..500 {
            filter.add(&synthetic_url(i));
        }

        let restored = MembershipFilter::deserialize(&filter.serialize()).unwrap();
        assert_eq!(restored.num_bits, filter.num_bits);
        assert_eq!(restored.num_hashes, filter.num_hashes);
        assert_eq!(restored.items, filter.items);
        for i in 0..500 {
            assert_eq!(
                restored.contains(&synthetic_url(i)),
                filter.contains(&synthetic_url(i))
            );
        }
        for i in 0..500 {
            assert_eq!(
                restored.contains(&disjoint_url(i)),
                filter.contains(&disjoint_url(i))
            );
        }
    }

    #[test]
    fn test_deserialize_truncated() {
        assert!(matches!(
            MembershipFilter::deserialize(&[1, 2, 3]),
            Err(FilterError::Truncated(3))
        ));
    }

    #[test]
    fn test_deserialize_length_mismatch() {
        let mut data = MembershipFilter::new(100, 0.01).serialize();
        data.pop();
        assert!(matches!(
            MembershipFilter::deserialize(&data),
            Err(FilterError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_deserialize_zero_bits() {
        let mut data = vec![0u8; 12];
        data[4] = 1; // hashes = 1, bits = 0
        assert!(matches!(
            MembershipFilter::deserialize(&data),
            Err(FilterError::BadParameters { bits: 0, .. })
        ));
    }

    #[test]
    fn test_stats_estimate() {
        let mut filter = MembershipFilter::new(1000, 0.01);
        let empty = filter.stats();
        assert_eq!(empty.items, 0);
        assert_eq!(empty.estimated_false_positive_rate, 0.0);

        for i in 0..1000 {
            filter.add(&synthetic_url(i));
        }
        let loaded = filter.stats();
        assert_eq!(loaded.items, 1000);
        assert!(loaded.estimated_false_positive_rate > 0.0);
        // At design load the estimate should sit near the configured target.
        assert!(loaded.estimated_false_positive_rate < 0.02);
    }
}
