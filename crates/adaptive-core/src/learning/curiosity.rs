//! Curiosity - novelty tracking and intrinsic reward
//!
//! Inputs are identified by the content hash of their canonical JSON. The
//! first sighting is fully novel; every repeat decays novelty geometrically.

use crate::config::CuriosityConfig;
use crate::types::{now, ContentHash, Timestamp};
use chrono::Duration;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone)]
struct Sighting {
    novelty: f64,
    first_seen: Timestamp,
    last_seen: Timestamp,
    count: u64,
}

/// Novelty map over everything the engine has seen
#[derive(Debug)]
pub struct CuriosityExplorer {
    config: CuriosityConfig,
    seen: HashMap<ContentHash, Sighting>,
    evicted: u64,
}

impl CuriosityExplorer {
    pub fn new(config: &CuriosityConfig) -> Self {
        Self {
            config: config.clone(),
            seen: HashMap::new(),
            evicted: 0,
        }
    }

    /// Record a sighting and return the input's novelty after it
    pub fn novelty(&mut self, input: &Value) -> f64 {
        self.novelty_at(input, now())
    }

    pub fn novelty_at(&mut self, input: &Value, at: Timestamp) -> f64 {
        let key = ContentHash::of_value(input);
        if let Some(sighting) = self.seen.get_mut(&key) {
            sighting.novelty *= self.config.decay;
            sighting.last_seen = at;
            sighting.count += 1;
            return sighting.novelty;
        }

        if self.seen.len() >= self.config.max_tracked {
            self.evict_stalest();
        }
        self.seen.insert(
            key,
            Sighting {
                novelty: 1.0,
                first_seen: at,
                last_seen: at,
                count: 1,
            },
        );
        1.0
    }

    /// Novelty the next sighting would have, without recording it
    pub fn peek_novelty(&self, input: &Value) -> f64 {
        self.seen
            .get(&ContentHash::of_value(input))
            .map_or(1.0, |s| s.novelty * self.config.decay)
    }

    /// Intrinsic reward: novelty × (1 − confidence)
    pub fn reward(&mut self, input: &Value, prediction_confidence: f64) -> f64 {
        let novelty = self.novelty(input);
        novelty * (1.0 - prediction_confidence.clamp(0.0, 1.0))
    }

    /// Whether too few new inputs arrived within the exploration window
    pub fn should_explore(&self) -> bool {
        self.should_explore_at(now())
    }

    pub fn should_explore_at(&self, at: Timestamp) -> bool {
        self.recent_novel_count(at) < self.config.exploration_budget
    }

    /// Distinct inputs first seen within the window ending at `at`
    pub fn recent_novel_count(&self, at: Timestamp) -> usize {
        // A window reaching past the representable range covers all history
        let since = self.window_start(at);
        self.seen
            .values()
            .filter(|s| s.first_seen <= at && since.map_or(true, |since| s.first_seen > since))
            .count()
    }

    fn window_start(&self, at: Timestamp) -> Option<Timestamp> {
        let secs = i64::try_from(self.config.exploration_window_secs).ok()?;
        at.checked_sub_signed(Duration::try_seconds(secs)?)
    }

    /// Times a given input has been seen
    pub fn sightings(&self, input: &Value) -> u64 {
        self.seen
            .get(&ContentHash::of_value(input))
            .map_or(0, |s| s.count)
    }

    pub fn tracked_count(&self) -> usize {
        self.seen.len()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn reset(&mut self) {
        self.seen.clear();
        self.evicted = 0;
    }

    fn evict_stalest(&mut self) {
        let stalest = self
            .seen
            .iter()
            .min_by_key(|(_, s)| s.last_seen)
            .map(|(k, _)| *k);
        if let Some(key) = stalest {
            self.seen.remove(&key);
            self.evicted += 1;
            debug!(key = %key.short_hex(12), "Evicted stalest novelty entry");
        }
    }
}
