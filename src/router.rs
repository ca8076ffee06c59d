//! Deterministic routing from a key to a shard.
//!
//! Every tier (ingestion, consumer, query) derives the owning shard from
//! the same byte string with the same function: 32-bit FNV-1a modulo the
//! shard count. The log partition and the target shard are both keyed on
//! the actor's `user_id`, so the function must be byte-for-byte stable
//! across processes and versions. The shard count is fixed for the life
//! of the deployment; changing it requires an offline redistribution.

/// FNV-1a 32-bit hash.
///
/// Non-cryptographic and cheap; distribution on opaque user identifiers
/// is good enough, and cross-process stability is what actually matters
/// here.
#[must_use]
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Maps routing keys to shard ids in `[0, shard_count)`.
///
/// Copyable and pure; a `Router` is created once from the registry
/// snapshot and shared by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Router {
    shard_count: u32,
}

impl Router {
    /// Create a router over `shard_count` shards.
    ///
    /// # Panics
    ///
    /// Panics if `shard_count` is zero; an empty registry aborts startup
    /// long before a router is built.
    #[must_use]
    pub fn new(shard_count: u32) -> Self {
        assert!(shard_count > 0, "router requires at least one shard");
        Self { shard_count }
    }

    /// Number of shards this router distributes over.
    #[must_use]
    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    /// Owning shard for a routing key.
    #[must_use]
    pub fn route(&self, key: &str) -> u32 {
        fnv1a_32(key.as_bytes()) % self.shard_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_reference_vectors() {
        // Published FNV-1a 32-bit test vectors.
        assert_eq!(fnv1a_32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a_32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a_32(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_route_is_stable() {
        let router = Router::new(3);
        let first = router.route("alice");
        for _ in 0..100 {
            assert_eq!(router.route("alice"), first);
        }
    }

    #[test]
    fn test_route_in_range() {
        let router = Router::new(3);
        for i in 0..1000 {
            let key = format!("user-{}", i);
            assert!(router.route(&key) < 3);
        }
    }

    #[test]
    fn test_single_shard_routes_everything_to_zero() {
        let router = Router::new(1);
        assert_eq!(router.route("anything"), 0);
        assert_eq!(router.route(""), 0);
    }

    #[test]
    #[should_panic(expected = "at least one shard")]
    fn test_zero_shards_panics() {
        let _ = Router::new(0);
    }

    #[test]
    fn test_distribution_not_degenerate() {
        // Not a statistical test, just a sanity check that FNV-1a spreads
        // sequential user ids over all shards.
        let router = Router::new(4);
        let mut hits = [0usize; 4];
        for i in 0..10_000 {
            hits[router.route(&format!("user-{}", i)) as usize] += 1;
        }
        for (shard, &count) in hits.iter().enumerate() {
            assert!(count > 1000, "shard {} starved: {} hits", shard, count);
        }
    }
}
