//! Reinforcement Module - tabular Q-learning
//!
//! States are the string form of the experience input, actions the string
//! form of its actual output. Feedback is the reward.

use super::buffer::ExperienceBuffer;
use super::features::value_label;
use super::pattern_store::{PatternStore, Upsert};
use super::types::{Experience, Paradigm, Pattern};
use super::{LearnDetail, LearningModule, Prediction};
use crate::config::{ReinforcementConfig, RetentionConfig};
use crate::error::{LearningError, Result};
use crate::types::ema;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Action suggested for a state the module has never seen
pub const EXPLORE_ACTION: &str = "explore";

/// Confidence attached to exploratory suggestions
pub const EXPLORATION_CONFIDENCE: f64 = 0.1;

/// |Q| above which a state/action pair becomes a pattern
const PATTERN_Q_THRESHOLD: f64 = 0.5;

/// Q-learning over discrete states and actions
#[derive(Debug)]
pub struct ReinforcementModule {
    /// state → action → Q
    q_table: HashMap<String, BTreeMap<String, f64>>,
    visits: HashMap<(String, String), u64>,
    alpha: f64,
    gamma: f64,
    epsilon: f64,
    rng: StdRng,
    exploration_count: u64,
    experiences: ExperienceBuffer<Experience>,
    patterns: PatternStore,
    accuracy: f64,
    smoothing: f64,
}

impl ReinforcementModule {
    pub fn new(config: &ReinforcementConfig, retention: &RetentionConfig, smoothing: f64) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            q_table: HashMap::new(),
            visits: HashMap::new(),
            alpha: config.alpha,
            gamma: config.gamma,
            epsilon: config.epsilon,
            rng,
            exploration_count: 0,
            experiences: ExperienceBuffer::new(
                retention.experience_capacity,
                retention.experience_retain,
            ),
            patterns: PatternStore::with_capacity(retention.max_patterns),
            accuracy: 0.0,
            smoothing,
        }
    }

    /// Current Q-value of a state/action pair
    pub fn q_value(&self, state: &str, action: &str) -> Option<f64> {
        self.q_table.get(state)?.get(action).copied()
    }

    /// Times a state/action pair has been learned
    pub fn visits(&self, state: &str, action: &str) -> u64 {
        self.visits
            .get(&(state.to_string(), action.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of exploratory predictions made so far
    pub fn exploration_count(&self) -> u64 {
        self.exploration_count
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon.clamp(0.0, 1.0);
    }

    pub fn state_count(&self) -> usize {
        self.q_table.len()
    }

    /// Highest-valued action of a known state, ties broken alphabetically
    fn greedy_action(actions: &BTreeMap<String, f64>) -> Option<(&String, f64)> {
        actions
            .iter()
            .fold(None::<(&String, f64)>, |best, (action, &q)| match best {
                Some((_, best_q)) if best_q >= q => best,
                _ => Some((action, q)),
            })
    }
}

impl LearningModule for ReinforcementModule {
    fn paradigm(&self) -> Paradigm {
        Paradigm::Reinforcement
    }

    fn learn(&mut self, experience: &Experience) -> Result<LearnDetail> {
        let reward = experience
            .feedback
            .ok_or(LearningError::MissingRequiredField {
                paradigm: Paradigm::Reinforcement,
                field: "feedback",
            })?;
        let action_value = experience
            .actual_output
            .as_ref()
            .or(experience.expected_output.as_ref())
            .ok_or(LearningError::MissingRequiredField {
                paradigm: Paradigm::Reinforcement,
                field: "actual_output",
            })?;

        let state = value_label(&experience.input);
        let action = value_label(action_value);

        let actions = self.q_table.entry(state.clone()).or_default();
        let previous_q = actions.get(&action).copied().unwrap_or(0.0);

        // No transition model is tracked, so the best value of the same state
        // stands in for max_a' Q(s', a'). Revisit once next states are recorded.
        let max_next = actions.values().copied().reduce(f64::max).unwrap_or(0.0);

        let q = previous_q + self.alpha * (reward + self.gamma * max_next - previous_q);
        actions.insert(action.clone(), q);
        *self
            .visits
            .entry((state.clone(), action.clone()))
            .or_insert(0) += 1;

        let agreement = 1.0 - ((reward - previous_q).abs() / 2.0).min(1.0);
        self.accuracy = ema(self.accuracy, agreement, self.smoothing);
        self.experiences.push(experience.clone());

        if q.abs() > PATTERN_Q_THRESHOLD {
            let verb = if q > 0.0 { "Take" } else { "Avoid" };
            let upsert = self.patterns.upsert(
                &format!("q:{}->{}", state, action),
                q.abs().min(1.0),
                Some(format!("reward={:.2}", reward)),
                || {
                    Pattern::new(
                        Paradigm::Reinforcement,
                        format!("{} '{}' in state '{}'", verb, action, state),
                        vec![format!("state == {}", state)],
                        action.clone(),
                    )
                },
            );
            if upsert == Upsert::Created {
                info!(state = %state, action = %action, q, "Q-value crossed pattern threshold");
            }
        }

        debug!(state = %state, action = %action, reward, previous_q, q, "Q-value updated");

        Ok(LearnDetail::Reinforcement {
            state,
            action,
            previous_q,
            q_value: q,
        })
    }

    fn estimate(&self, input: &Value) -> Result<Prediction> {
        if self.q_table.is_empty() {
            return Ok(Prediction::none());
        }
        let state = value_label(input);
        let Some(actions) = self.q_table.get(&state) else {
            return Ok(Prediction::new(EXPLORE_ACTION, EXPLORATION_CONFIDENCE));
        };

        Ok(Self::greedy_action(actions)
            .map(|(action, q)| Prediction::new(action.clone(), q.abs().min(1.0)))
            .unwrap_or_else(|| Prediction::new(EXPLORE_ACTION, EXPLORATION_CONFIDENCE)))
    }

    /// ε-greedy: with probability ε a uniformly random known action
    fn predict(&mut self, input: &Value) -> Result<Prediction> {
        let state = value_label(input);
        let explore = self.epsilon > 0.0 && self.rng.gen::<f64>() < self.epsilon;

        if explore {
            if let Some(actions) = self.q_table.get(&state).filter(|a| !a.is_empty()) {
                let index = self.rng.gen_range(0..actions.len());
                if let Some(action) = actions.keys().nth(index) {
                    self.exploration_count += 1;
                    debug!(state = %state, action = %action, "Exploratory action chosen");
                    return Ok(Prediction::new(action.clone(), EXPLORATION_CONFIDENCE));
                }
            }
        }

        self.estimate(input)
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
        self.q_table.clear();
        self.visits.clear();
        self.exploration_count = 0;
        self.experiences.clear();
        self.patterns.clear();
        self.accuracy = 0.0;
    }
}
