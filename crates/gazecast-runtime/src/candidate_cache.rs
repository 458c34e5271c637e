//! [`CandidateCache`] – time-windowed set of focusable entities.
//!
//! Every entity discovered by the object finder is remembered together with
//! the tick time it was last seen.  Entries expire once they have been idle
//! for longer than the retention window, or as soon as the scene reports the
//! entity gone.  The cache holds identifiers only; entity lifetime stays
//! with the scene.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use gazecast_runtime::candidate_cache::CandidateCache;
//! use gazecast_types::EntityId;
//!
//! let mut cache = CandidateCache::new(Duration::from_secs(1), 10);
//! cache.merge(0, &[EntityId(7)]);
//!
//! cache.evict(900_000, |_| true);
//! assert!(cache.contains(EntityId(7)));
//!
//! cache.evict(1_100_000, |_| true);
//! assert!(cache.is_empty());
//! ```

use std::collections::HashMap;
use std::time::Duration;

use gazecast_types::EntityId;

/// One tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub entity: EntityId,
    /// Tick time, in microseconds, of the most recent discovery.
    pub last_seen_us: u64,
}

#[derive(Debug)]
pub struct CandidateCache {
    entries: HashMap<EntityId, Candidate>,
    retention_us: u64,
    evicted: Vec<EntityId>,
}

impl CandidateCache {
    /// Create an empty cache whose entries expire after `retention` of
    /// idleness.  `capacity_hint` pre-sizes the table.
    pub fn new(retention: Duration, capacity_hint: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity_hint),
            retention_us: u64::try_from(retention.as_micros()).unwrap_or(u64::MAX),
            evicted: Vec::with_capacity(capacity_hint),
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_micros(self.retention_us)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.entries.contains_key(&entity)
    }

    pub fn get(&self, entity: EntityId) -> Option<&Candidate> {
        self.entries.get(&entity)
    }

    /// All tracked candidates.  Order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.entries.values()
    }

    /// Insert newly found entities and refresh the last-seen time of known
    /// ones.  Returns how many were new.
    pub fn merge(&mut self, now_us: u64, found: &[EntityId]) -> usize {
        let mut inserted = 0;
        for &entity in found {
            self.entries
                .entry(entity)
                .and_modify(|c| c.last_seen_us = now_us)
                .or_insert_with(|| {
                    inserted += 1;
                    Candidate {
                        entity,
                        last_seen_us: now_us,
                    }
                });
        }
        inserted
    }

    /// Drop entries idle for longer than the retention window, and entries
    /// whose entity `is_alive` rejects regardless of age.
    ///
    /// Returns the evicted identifiers.
    pub fn evict(&mut self, now_us: u64, is_alive: impl Fn(EntityId) -> bool) -> &[EntityId] {
        let retention_us = self.retention_us;
        self.evicted.clear();
        for candidate in self.entries.values() {
            let idle_us = now_us.saturating_sub(candidate.last_seen_us);
            if idle_us > retention_us || !is_alive(candidate.entity) {
                self.evicted.push(candidate.entity);
            }
        }
        for entity in &self.evicted {
            self.entries.remove(entity);
        }
        &self.evicted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
