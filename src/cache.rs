//! Bounded record cache with TTL and max-size eviction
//!
//! Holds terminal attestation records keyed by message hash so repeated polls
//! of a finished message never reach the authority again. Memory stays bounded
//! under long runtimes.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Bounded cache for values keyed by 32-byte hashes.
///
/// - **Max capacity:** when full, the oldest entry is evicted on insert.
/// - **TTL:** entries older than TTL are invisible and dropped on the next insert.
/// - **Eviction:** on insert, first evict expired entries, then evict the oldest
///   remaining entry by insertion time until there is room.
#[derive(Debug)]
pub struct BoundedCache<V> {
    /// Hash -> (insertion timestamp, value)
    map: HashMap<[u8; 32], (Instant, V)>,
    max_size: usize,
    ttl: Duration,
}

impl<V: Clone> BoundedCache<V> {
    /// Create a new bounded cache.
    ///
    /// - `max_size`: maximum number of entries; oldest evicted when exceeded.
    /// - `ttl_secs`: entries older than this are treated as absent.
    pub fn new(max_size: usize, ttl_secs: u64) -> Self {
        Self {
            map: HashMap::new(),
            max_size: max_size.max(1),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// Value for `hash` if present and not expired
    pub fn get(&self, hash: &[u8; 32]) -> Option<V> {
        self.map
            .get(hash)
            .filter(|(t, _)| t.elapsed() < self.ttl)
            .map(|(_, v)| v.clone())
    }

    /// Returns true if the hash is present and not expired.
    pub fn contains(&self, hash: &[u8; 32]) -> bool {
        self.get(hash).is_some()
    }

    /// Insert a value. Evicts expired/oldest entries if at capacity.
    pub fn insert(&mut self, hash: [u8; 32], value: V) {
        let now = Instant::now();
        let ttl = self.ttl;

        self.map.retain(|_, (t, _)| now.duration_since(*t) < ttl);
        self.map.remove(&hash);

        while self.map.len() >= self.max_size {
            let oldest = self.map.iter().min_by_key(|(_, (t, _))| *t).map(|(h, _)| *h);
            match oldest {
                Some(h) => {
                    self.map.remove(&h);
                }
                None => break,
            }
        }

        self.map.insert(hash, (now, value));
    }

    /// Current number of entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Returns (current len, max_size).
    pub fn capacity_info(&self) -> (usize, usize) {
        (self.map.len(), self.max_size)
    }
}
