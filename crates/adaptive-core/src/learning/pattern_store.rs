//! Pattern Store - keyed patterns with LRU retention
//!
//! Each module owns one store. Keys are module-defined condition/action
//! signatures. When the store is full the least recently used pattern is
//! evicted.

use super::types::Pattern;
use std::collections::{HashMap, VecDeque};

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

/// Bounded pattern map with LRU eviction
#[derive(Debug)]
pub struct PatternStore {
    capacity: usize,
    patterns: HashMap<String, Pattern>,
    /// LRU queue (most recent at back)
    lru_queue: VecDeque<String>,
    evicted: u64,
}

impl PatternStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            patterns: HashMap::new(),
            lru_queue: VecDeque::new(),
            evicted: 0,
        }
    }

    /// Exercise the pattern under `key`, creating it with `create` if absent
    pub fn upsert<F>(&mut self, key: &str, outcome: f64, example: Option<String>, create: F) -> Upsert
    where
        F: FnOnce() -> Pattern,
    {
        if let Some(pattern) = self.patterns.get_mut(key) {
            pattern.record_use(outcome, example);
            self.touch(key);
            return Upsert::Updated;
        }

        if self.patterns.len() >= self.capacity {
            self.evict_lru();
        }

        let mut pattern = create();
        pattern.record_use(outcome, example);
        self.patterns.insert(key.to_string(), pattern);
        self.lru_queue.push_back(key.to_string());
        Upsert::Created
    }

    fn touch(&mut self, key: &str) {
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.to_string());
    }

    fn evict_lru(&mut self) {
        if let Some(key) = self.lru_queue.pop_front() {
            if let Some(pattern) = self.patterns.remove(&key) {
                self.evicted += 1;
                tracing::debug!(
                    key = %key,
                    paradigm = %pattern.paradigm,
                    usage = pattern.usage_count,
                    "Evicted least recently used pattern"
                );
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Pattern> {
        self.patterns.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.patterns.contains_key(key)
    }

    /// All patterns, unordered
    pub fn values(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.values()
    }

    /// Mean confidence over all patterns, 0.0 when empty
    pub fn mean_confidence(&self) -> f64 {
        if self.patterns.is_empty() {
            return 0.0;
        }
        self.patterns.values().map(|p| p.confidence).sum::<f64>() / self.patterns.len() as f64
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of patterns evicted so far
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn clear(&mut self) {
        self.patterns.clear();
        self.lru_queue.clear();
    }
}
