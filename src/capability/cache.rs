//! Verdict caching for comparators.
//!
//! Judging is by far the most expensive call in a replay, and batch runs
//! over related walkthroughs ask the same questions repeatedly. The cache
//! keys a verdict by the full comparison input, so a hit is exact: same
//! goal, same prediction, same candidates in the same order.
//!
//! Only successful verdicts are cached. A failed judge call is retried at
//! the engine's discretion, never replayed from here.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use super::agent::Prediction;
use super::comparator::{CandidateLeaf, Comparator, VerdictMap};
use super::error::ComparatorResult;

/// Statistics about verdict cache usage.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Total cache hits.
    pub hits: u64,
    /// Total cache misses.
    pub misses: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate.
    ///
    /// Hit rate as a value between 0.0 and 1.0, or 0.0 if no accesses.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Get the total number of cache accesses.
    pub fn total_accesses(&self) -> u64 {
        self.hits + self.misses
    }
}

/// A comparator wrapper that memoizes verdicts.
pub struct CachedComparator {
    inner: Arc<dyn Comparator>,
    name: String,
    entries: RwLock<HashMap<String, VerdictMap>>,
    stats: RwLock<CacheStats>,
}

impl CachedComparator {
    /// Wrap a comparator with an in-memory verdict cache.
    pub fn new(inner: Arc<dyn Comparator>) -> Self {
        let name = format!("cached-{}", inner.name());
        Self {
            inner,
            name,
            entries: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Get current cache statistics.
    pub fn stats(&self) -> CacheStats {
        *self.stats.read().expect("stats read lock poisoned")
    }

    /// Number of cached verdicts.
    pub fn len(&self) -> usize {
        self.entries.read().expect("cache read lock poisoned").len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hash the full comparison input into a cache key.
fn cache_key(goal: &str, prediction: &Prediction, candidates: &[CandidateLeaf]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(goal.as_bytes());
    hasher.update([0u8]);
    hasher.update(prediction.command.as_bytes());
    for candidate in candidates {
        hasher.update([0u8]);
        hasher.update(candidate.id.0.to_le_bytes());
        hasher.update(candidate.command.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[async_trait]
impl Comparator for CachedComparator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn compare(
        &self,
        goal: &str,
        prediction: &Prediction,
        candidates: &[CandidateLeaf],
    ) -> ComparatorResult<VerdictMap> {
        let key = cache_key(goal, prediction, candidates);

        {
            let entries = self.entries.read().expect("cache read lock poisoned");
            if let Some(hit) = entries.get(&key) {
                let verdicts = hit.clone();
                drop(entries);
                self.stats.write().expect("stats write lock poisoned").hits += 1;
                debug!(key = %&key[..12], "Verdict cache hit");
                return Ok(verdicts);
            }
        }
        self.stats.write().expect("stats write lock poisoned").misses += 1;

        let verdicts = self.inner.compare(goal, prediction, candidates).await?;

        self.entries
            .write()
            .expect("cache write lock poisoned")
            .insert(key, verdicts.clone());
        Ok(verdicts)
    }
}
