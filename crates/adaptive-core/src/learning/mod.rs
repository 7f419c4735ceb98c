//! Multi-paradigm learning modules
//!
//! Each paradigm owns its own state: a bounded experience ring, a pattern
//! store and whatever model it learns. Modules never share state; the engine
//! aggregates their results.

pub mod buffer;
pub mod curiosity;
pub mod features;
pub mod meta;
pub mod pattern_store;
pub mod reinforcement;
pub mod supervised;
pub mod types;
pub mod unsupervised;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// Re-exports
pub use buffer::ExperienceBuffer;
pub use curiosity::CuriosityExplorer;
pub use features::{extract_features, jaccard, value_label, Featurize};
pub use meta::{MetaLearningModule, Strategy, StrategyStats};
pub use pattern_store::{PatternStore, Upsert};
pub use reinforcement::ReinforcementModule;
pub use supervised::SupervisedModule;
pub use types::*;
pub use unsupervised::UnsupervisedModule;

/// A (value, confidence) pair; confidence 0.0 means no usable knowledge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub value: Option<String>,
    pub confidence: f64,
}

impl Prediction {
    /// Neutral result for a module that has nothing to say yet
    pub fn none() -> Self {
        Self {
            value: None,
            confidence: 0.0,
        }
    }

    pub fn new(value: impl Into<String>, confidence: f64) -> Self {
        Self {
            value: Some(value.into()),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Whether the module had usable knowledge
    pub fn is_known(&self) -> bool {
        self.value.is_some() && self.confidence > 0.0
    }
}

/// What a module did with one experience
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "paradigm", rename_all = "snake_case")]
pub enum LearnDetail {
    Supervised {
        label: String,
        features: usize,
        new_class: bool,
        prior_correct: bool,
    },
    Reinforcement {
        state: String,
        action: String,
        previous_q: f64,
        q_value: f64,
    },
    Unsupervised {
        cluster_id: usize,
        new_cluster: bool,
        similarity: f64,
        anomaly: bool,
    },
    Meta {
        context: String,
        strategy: Strategy,
        performance: f64,
        current_strategy: Strategy,
        switched: bool,
    },
}

/// Performance snapshot of one module, derived on demand
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModulePerformance {
    pub accuracy: f64,
    pub mean_confidence: f64,
    pub experience_count: usize,
    pub pattern_count: usize,
}

/// Common surface of every learning paradigm
pub trait LearningModule: fmt::Debug + Send {
    /// Paradigm handled by this module
    fn paradigm(&self) -> Paradigm;

    /// Update the module from one experience
    fn learn(&mut self, experience: &Experience) -> Result<LearnDetail>;

    /// Best guess for an input without touching any state
    fn estimate(&self, input: &Value) -> Result<Prediction>;

    /// Prediction for callers; may update exploration bookkeeping
    fn predict(&mut self, input: &Value) -> Result<Prediction> {
        self.estimate(input)
    }

    /// Patterns learned so far
    fn patterns(&self) -> &PatternStore;

    /// Rolling accuracy in [0, 1]
    fn accuracy(&self) -> f64;

    /// Experiences currently retained
    fn experience_count(&self) -> usize;

    /// Forget everything learned
    fn reset(&mut self);

    fn performance(&self) -> ModulePerformance {
        let patterns = self.patterns();
        ModulePerformance {
            accuracy: self.accuracy(),
            mean_confidence: patterns.mean_confidence(),
            experience_count: self.experience_count(),
            pattern_count: patterns.len(),
        }
    }
}
