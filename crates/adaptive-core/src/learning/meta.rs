//! Meta-Learning Module - strategy selection from observed performance
//!
//! Every experience reports which strategy was used and how well it did.
//! Observations are kept per strategy, both globally and per learning
//! context. The engine-wide current strategy is adapted after each
//! observation; recommendations favour the strategy with the best recent
//! mean, discounted by how erratic it has been.

use super::buffer::ExperienceBuffer;
use super::features::value_label;
use super::pattern_store::{PatternStore, Upsert};
use super::types::{Experience, Paradigm, Pattern};
use super::{LearnDetail, LearningModule, Prediction};
use crate::config::RetentionConfig;
use crate::error::{LearningError, Result};
use crate::types::{ema, mean_and_variance};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Observations retained per strategy
const HISTORY_LIMIT: usize = 100;

/// Observations considered "recent"
const RECENT_WINDOW: usize = 10;

/// Above this the current strategy is kept
const KEEP_THRESHOLD: f64 = 0.8;

/// Below this the current strategy is rotated
const SWITCH_THRESHOLD: f64 = 0.3;

/// Observations needed before a strategy can become a preference pattern
const PREFERENCE_MIN_OBSERVATIONS: usize = 3;

pub const STRATEGY_KEY: &str = "strategy_used";
pub const PERFORMANCE_KEY: &str = "performance";
pub const CONTEXT_KEY: &str = "learning_context";

/// Learning strategy
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Exploration,
    Exploitation,
    #[default]
    Balanced,
    Conservative,
    Aggressive,
}

impl Strategy {
    /// All strategies, in rotation order
    pub const ALL: [Strategy; 5] = [
        Strategy::Exploration,
        Strategy::Exploitation,
        Strategy::Balanced,
        Strategy::Conservative,
        Strategy::Aggressive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Exploration => "exploration",
            Strategy::Exploitation => "exploitation",
            Strategy::Balanced => "balanced",
            Strategy::Conservative => "conservative",
            Strategy::Aggressive => "aggressive",
        }
    }

    /// Successor in the fixed rotation
    pub fn next(self) -> Self {
        match self {
            Strategy::Exploration => Strategy::Exploitation,
            Strategy::Exploitation => Strategy::Balanced,
            Strategy::Balanced => Strategy::Conservative,
            Strategy::Conservative => Strategy::Aggressive,
            Strategy::Aggressive => Strategy::Exploration,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = LearningError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        Strategy::ALL
            .into_iter()
            .find(|st| st.as_str() == normalized)
            .ok_or_else(|| LearningError::InvalidField {
                field: STRATEGY_KEY,
                reason: format!("unknown strategy '{}'", s),
            })
    }
}

/// Summary of one strategy's track record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub strategy: Strategy,
    pub observations: u64,
    pub recent_mean: f64,
    pub recent_variance: f64,
}

type History = BTreeMap<Strategy, VecDeque<f64>>;

fn recent_stats(history: &VecDeque<f64>) -> Option<(f64, f64)> {
    let recent: Vec<f64> = history.iter().rev().take(RECENT_WINDOW).copied().collect();
    mean_and_variance(&recent)
}

/// Highest recent mean, ties to the earliest strategy in rotation order
fn best_strategy(history: &History) -> Option<(Strategy, f64, f64)> {
    history
        .iter()
        .filter_map(|(s, h)| recent_stats(h).map(|(mean, var)| (*s, mean, var)))
        .fold(None, |best, (s, mean, var)| match best {
            Some((_, best_mean, _)) if best_mean >= mean => best,
            _ => Some((s, mean, var)),
        })
}

fn record(history: &mut History, strategy: Strategy, performance: f64) -> &VecDeque<f64> {
    let entries = history.entry(strategy).or_default();
    entries.push_back(performance);
    while entries.len() > HISTORY_LIMIT {
        entries.pop_front();
    }
    entries
}

/// Strategy learner
#[derive(Debug)]
pub struct MetaLearningModule {
    global: History,
    by_context: HashMap<String, History>,
    observations: BTreeMap<Strategy, u64>,
    current: Strategy,
    switches: u64,
    experiences: ExperienceBuffer<Experience>,
    patterns: PatternStore,
    accuracy: f64,
    smoothing: f64,
}

impl MetaLearningModule {
    pub fn new(retention: &RetentionConfig, smoothing: f64) -> Self {
        Self {
            global: BTreeMap::new(),
            by_context: HashMap::new(),
            observations: BTreeMap::new(),
            current: Strategy::default(),
            switches: 0,
            experiences: ExperienceBuffer::new(
                retention.experience_capacity,
                retention.experience_retain,
            ),
            patterns: PatternStore::with_capacity(retention.max_patterns),
            accuracy: 0.0,
            smoothing,
        }
    }

    /// Strategy the engine is currently running
    pub fn current_strategy(&self) -> Strategy {
        self.current
    }

    /// Times the current strategy was rotated
    pub fn switch_count(&self) -> u64 {
        self.switches
    }

    /// Track record of every strategy observed so far
    pub fn strategy_stats(&self) -> Vec<StrategyStats> {
        self.global
            .iter()
            .filter_map(|(strategy, history)| {
                let (recent_mean, recent_variance) = recent_stats(history)?;
                Some(StrategyStats {
                    strategy: *strategy,
                    observations: self.observations.get(strategy).copied().unwrap_or(0),
                    recent_mean,
                    recent_variance,
                })
            })
            .collect()
    }

    /// Recommendation for a named context
    pub fn recommend(&self, context: &str) -> Prediction {
        let history = self
            .by_context
            .get(context)
            .filter(|h| !h.is_empty())
            .unwrap_or(&self.global);

        match best_strategy(history) {
            Some((strategy, mean, variance)) => {
                Prediction::new(strategy.as_str(), mean / (1.0 + variance))
            }
            None => Prediction::none(),
        }
    }

    fn read_strategy(experience: &Experience) -> Result<Strategy> {
        let value = experience
            .meta(STRATEGY_KEY)
            .ok_or(LearningError::MissingRequiredField {
                paradigm: Paradigm::Meta,
                field: STRATEGY_KEY,
            })?;
        match value {
            Value::String(s) => s.parse(),
            other => Err(LearningError::InvalidField {
                field: STRATEGY_KEY,
                reason: format!("expected a strategy name, got {}", other),
            }),
        }
    }

    fn read_performance(experience: &Experience) -> Result<f64> {
        if let Some(value) = experience.meta(PERFORMANCE_KEY) {
            let performance = value.as_f64().ok_or_else(|| LearningError::InvalidField {
                field: PERFORMANCE_KEY,
                reason: format!("expected a number, got {}", value),
            })?;
            if !(0.0..=1.0).contains(&performance) {
                return Err(LearningError::InvalidField {
                    field: PERFORMANCE_KEY,
                    reason: format!("must be within [0, 1], got {}", performance),
                });
            }
            return Ok(performance);
        }

        // Feedback lives in [-1, 1]
        experience
            .feedback
            .map(|f| ((f + 1.0) / 2.0).clamp(0.0, 1.0))
            .ok_or(LearningError::MissingRequiredField {
                paradigm: Paradigm::Meta,
                field: PERFORMANCE_KEY,
            })
    }

    fn read_context(experience: &Experience) -> String {
        experience
            .meta(CONTEXT_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| experience.context.clone())
    }

    fn adapt(&mut self, performance: f64) -> bool {
        if performance > KEEP_THRESHOLD {
            return false;
        }
        if performance < SWITCH_THRESHOLD {
            let previous = self.current;
            self.current = previous.next();
            self.switches += 1;
            info!(
                from = %previous,
                to = %self.current,
                performance,
                "Strategy rotated after poor performance"
            );
            return true;
        }
        false
    }
}

impl LearningModule for MetaLearningModule {
    fn paradigm(&self) -> Paradigm {
        Paradigm::Meta
    }

    fn learn(&mut self, experience: &Experience) -> Result<LearnDetail> {
        let strategy = Self::read_strategy(experience)?;
        let performance = Self::read_performance(experience)?;
        let context = Self::read_context(experience);

        record(&mut self.global, strategy, performance);
        let context_history = self.by_context.entry(context.clone()).or_default();
        let recent = recent_stats(record(context_history, strategy, performance));
        let context_observations = context_history.get(&strategy).map_or(0, VecDeque::len);
        *self.observations.entry(strategy).or_insert(0) += 1;

        let switched = self.adapt(performance);
        self.accuracy = ema(self.accuracy, performance, self.smoothing);
        self.experiences.push(experience.clone());

        if let Some((mean, _)) = recent {
            if mean > KEEP_THRESHOLD && context_observations >= PREFERENCE_MIN_OBSERVATIONS {
                let upsert = self.patterns.upsert(
                    &format!("prefer:{}:{}", context, strategy),
                    mean,
                    Some(format!("performance={:.2}", performance)),
                    || {
                        Pattern::new(
                            Paradigm::Meta,
                            format!("Prefer {} strategy in '{}'", strategy, context),
                            vec![format!("learning_context == {}", context)],
                            strategy.as_str(),
                        )
                    },
                );
                if upsert == Upsert::Created {
                    info!(context = %context, strategy = %strategy, mean, "Strategy preference learned");
                }
            }
        }

        debug!(
            context = %context,
            strategy = %strategy,
            performance,
            current = %self.current,
            "Strategy observation recorded"
        );

        Ok(LearnDetail::Meta {
            context,
            strategy,
            performance,
            current_strategy: self.current,
            switched,
        })
    }

    fn estimate(&self, input: &Value) -> Result<Prediction> {
        Ok(self.recommend(&value_label(input)))
    }

    fn patterns(&self) -> &PatternStore {
        &self.patterns
    }

    fn accuracy(&self) -> f64 {
        self.accuracy
    }

    fn experience_count(&self) -> usize {
        self.experiences.len()
    }

    fn reset(&mut self) {
        self.global.clear();
        self.by_context.clear();
        self.observations.clear();
        self.current = Strategy::default();
        self.switches = 0;
        self.experiences.clear();
        self.patterns.clear();
        self.accuracy = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn module() -> MetaLearningModule {
        MetaLearningModule::new(&RetentionConfig::default(), 0.1)
    }

    fn observation(context: &str, strategy: &str, performance: f64) -> Experience {
        Experience::builder(context)
            .paradigm(Paradigm::Meta)
            .metadata(CONTEXT_KEY, context)
            .metadata(STRATEGY_KEY, strategy)
            .metadata(PERFORMANCE_KEY, performance)
            .build()
            .unwrap()
    }

    #[test]
    fn test_rotation_cycles_through_all() {
        let mut s = Strategy::Exploration;
        for expected in Strategy::ALL.iter().skip(1) {
            s = s.next();
            assert_eq!(s, *expected);
        }
        assert_eq!(s.next(), Strategy::Exploration);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Aggressive".parse::<Strategy>().unwrap(), Strategy::Aggressive);
        assert!("reckless".parse::<Strategy>().is_err());
        assert_eq!(serde_json::to_string(&Strategy::Balanced).unwrap(), "\"balanced\"");
    }

    #[test]
    fn test_poor_performance_rotates_strategy() {
        let mut m = module();
        assert_eq!(m.current_strategy(), Strategy::Balanced);

        let detail = m.learn(&observation("task", "balanced", 0.1)).unwrap();
        assert!(matches!(
            detail,
            LearnDetail::Meta {
                switched: true,
                current_strategy: Strategy::Conservative,
                ..
            }
        ));
        assert_eq!(m.switch_count(), 1);
    }

    #[test]
    fn test_good_and_middling_performance_keep_strategy() {
        let mut m = module();
        m.learn(&observation("task", "balanced", 0.9)).unwrap();
        m.learn(&observation("task", "balanced", 0.5)).unwrap();
        assert_eq!(m.current_strategy(), Strategy::Balanced);
        assert_eq!(m.switch_count(), 0);
    }

    #[test]
    fn test_recommends_best_recent_mean() {
        let mut m = module();
        for _ in 0..4 {
            m.learn(&observation("task", "exploitation", 0.9)).unwrap();
            m.learn(&observation("task", "aggressive", 0.4)).unwrap();
        }

        let p = m.estimate(&json!("task")).unwrap();
        assert_eq!(p.value.as_deref(), Some("exploitation"));
        // Constant history: variance 0, confidence equals the mean
        assert!((p.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_variance_lowers_confidence() {
        let mut m = module();
        for perf in [0.2, 1.0, 0.2, 1.0] {
            m.learn(&observation("noisy", "aggressive", perf)).unwrap();
        }
        let p = m.recommend("noisy");
        // mean 0.6, variance 0.16
        assert!((p.confidence - 0.6 / 1.16).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_context_falls_back_to_global() {
        let mut m = module();
        assert_eq!(m.recommend("anything"), Prediction::none());

        m.learn(&observation("task", "conservative", 0.7)).unwrap();
        let p = m.recommend("never-seen");
        assert_eq!(p.value.as_deref(), Some("conservative"));
    }

    #[test]
    fn test_missing_strategy_is_rejected() {
        let mut m = module();
        let exp = Experience::builder("task")
            .metadata(PERFORMANCE_KEY, 0.5)
            .build()
            .unwrap();
        let err = m.learn(&exp).unwrap_err();
        assert!(err.is_rejection());
    }

    #[test]
    fn test_feedback_stands_in_for_performance() {
        let mut m = module();
        let exp = Experience::builder("task")
            .metadata(STRATEGY_KEY, "balanced")
            .feedback(0.0)
            .build()
            .unwrap();
        let detail = m.learn(&exp).unwrap();
        assert!(matches!(detail, LearnDetail::Meta { performance, .. } if (performance - 0.5).abs() < 1e-12));
    }

    #[test]
    fn test_out_of_range_performance_is_rejected() {
        let mut m = module();
        let err = m.learn(&observation("task", "balanced", 1.5)).unwrap_err();
        assert!(matches!(err, LearningError::InvalidField { field: PERFORMANCE_KEY, .. }));
    }

    #[test]
    fn test_preference_pattern_after_consistent_success() {
        let mut m = module();
        m.learn(&observation("deploy", "conservative", 0.95)).unwrap();
        m.learn(&observation("deploy", "conservative", 0.9)).unwrap();
        assert!(m.patterns().is_empty());

        m.learn(&observation("deploy", "conservative", 0.92)).unwrap();
        let pattern = m.patterns().get("prefer:deploy:conservative").unwrap();
        assert_eq!(pattern.action, "conservative");

        let stats = m.strategy_stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].observations, 3);
    }
}
