//! Core types for multi-paradigm learning

use crate::error::{LearningError, Result};
use crate::types::{ema, now, ContentHash, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum number of examples kept on a pattern
pub const PATTERN_EXAMPLE_LIMIT: usize = 5;

/// EMA rate for pattern success rates
pub const SUCCESS_RATE_SMOOTHING: f64 = 0.1;

/// Usage count at which a pattern reaches ~63% of its attainable confidence
pub const USAGE_SATURATION: f64 = 5.0;

/// Learning paradigm tag carried by an experience
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Paradigm {
    Supervised,
    Unsupervised,
    Reinforcement,
    FewShot,
    Continual,
    Meta,
    SelfSupervised,
}

impl Paradigm {
    /// Paradigms backed by a learning module, in dispatch order
    pub const MODULES: [Paradigm; 4] = [
        Paradigm::Supervised,
        Paradigm::Reinforcement,
        Paradigm::Unsupervised,
        Paradigm::Meta,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Paradigm::Supervised => "supervised",
            Paradigm::Unsupervised => "unsupervised",
            Paradigm::Reinforcement => "reinforcement",
            Paradigm::FewShot => "few-shot",
            Paradigm::Continual => "continual",
            Paradigm::Meta => "meta",
            Paradigm::SelfSupervised => "self-supervised",
        }
    }

    /// Whether a dedicated module handles this paradigm
    pub fn has_module(self) -> bool {
        Self::MODULES.contains(&self)
    }
}

impl fmt::Display for Paradigm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Paradigm {
    type Err = LearningError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "supervised" => Ok(Paradigm::Supervised),
            "unsupervised" => Ok(Paradigm::Unsupervised),
            "reinforcement" => Ok(Paradigm::Reinforcement),
            "few-shot" => Ok(Paradigm::FewShot),
            "continual" => Ok(Paradigm::Continual),
            "meta" => Ok(Paradigm::Meta),
            "self-supervised" => Ok(Paradigm::SelfSupervised),
            other => Err(LearningError::InvalidField {
                field: "paradigm",
                reason: format!("unknown paradigm '{}'", other),
            }),
        }
    }
}

/// Unique experience identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExperienceId(pub String);

impl ExperienceId {
    /// Derive an id from the content, timestamp and metadata of an experience
    pub fn derive(
        input: &Value,
        expected: Option<&Value>,
        timestamp: &Timestamp,
        metadata: &BTreeMap<String, Value>,
    ) -> Self {
        let material = json!({
            "input": input,
            "expected": expected,
            "timestamp": timestamp.to_rfc3339(),
            "metadata": metadata,
        });
        Self(ContentHash::of_value(&material).short_hex(16))
    }
}

impl fmt::Display for ExperienceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One observation submitted for learning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub id: ExperienceId,
    pub input: Value,
    pub expected_output: Option<Value>,
    pub actual_output: Option<Value>,
    /// Scalar feedback in [-1, 1]
    pub feedback: Option<f64>,
    pub paradigm: Option<Paradigm>,
    pub context: String,
    pub timestamp: Timestamp,
    pub importance: f64,
    pub metadata: BTreeMap<String, Value>,
}

impl Experience {
    /// Start building an experience around an input
    pub fn builder(input: impl Into<Value>) -> ExperienceBuilder {
        ExperienceBuilder::new(input.into())
    }

    /// Normalized dissimilarity between expected and actual output.
    ///
    /// Numbers compare by absolute difference, anything else is 0.0 on an
    /// exact match and 1.0 otherwise. `None` unless both sides are present.
    pub fn error(&self) -> Option<f64> {
        let expected = self.expected_output.as_ref()?;
        let actual = self.actual_output.as_ref()?;

        match (expected.as_f64(), actual.as_f64()) {
            (Some(e), Some(a)) => Some((e - a).abs()),
            _ if expected == actual => Some(0.0),
            _ => Some(1.0),
        }
    }

    /// Metadata lookup
    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Check the invariants every experience must satisfy
    pub fn validate(&self) -> Result<()> {
        if let Some(feedback) = self.feedback {
            if !feedback.is_finite() || !(-1.0..=1.0).contains(&feedback) {
                return Err(LearningError::InvalidExperience(format!(
                    "feedback must be within [-1, 1], got {}",
                    feedback
                )));
            }
        }
        if !self.importance.is_finite() || self.importance < 0.0 {
            return Err(LearningError::InvalidExperience(format!(
                "importance must be a non-negative number, got {}",
                self.importance
            )));
        }
        Ok(())
    }
}

/// Builder for [`Experience`]
#[derive(Debug, Clone)]
pub struct ExperienceBuilder {
    id: Option<ExperienceId>,
    input: Value,
    expected_output: Option<Value>,
    actual_output: Option<Value>,
    feedback: Option<f64>,
    paradigm: Option<Paradigm>,
    context: String,
    timestamp: Option<Timestamp>,
    importance: f64,
    metadata: BTreeMap<String, Value>,
}

impl ExperienceBuilder {
    fn new(input: Value) -> Self {
        Self {
            id: None,
            input,
            expected_output: None,
            actual_output: None,
            feedback: None,
            paradigm: None,
            context: "general".to_string(),
            timestamp: None,
            importance: 1.0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(ExperienceId(id.into()));
        self
    }

    pub fn expected(mut self, expected: impl Into<Value>) -> Self {
        self.expected_output = Some(expected.into());
        self
    }

    pub fn actual(mut self, actual: impl Into<Value>) -> Self {
        self.actual_output = Some(actual.into());
        self
    }

    pub fn feedback(mut self, feedback: f64) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn paradigm(mut self, paradigm: Paradigm) -> Self {
        self.paradigm = Some(paradigm);
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Build and validate the experience
    pub fn build(self) -> Result<Experience> {
        let timestamp = self.timestamp.unwrap_or_else(now);
        let id = self.id.unwrap_or_else(|| {
            ExperienceId::derive(
                &self.input,
                self.expected_output.as_ref(),
                &timestamp,
                &self.metadata,
            )
        });

        let experience = Experience {
            id,
            input: self.input,
            expected_output: self.expected_output,
            actual_output: self.actual_output,
            feedback: self.feedback,
            paradigm: self.paradigm,
            context: self.context,
            timestamp,
            importance: self.importance,
            metadata: self.metadata,
        };
        experience.validate()?;
        Ok(experience)
    }
}

/// Pattern identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternId(pub Uuid);

impl PatternId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PatternId {
    fn default() -> Self {
        Self::new()
    }
}

/// A confidence-scored condition → action rule distilled from experiences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub paradigm: Paradigm,
    pub description: String,
    pub conditions: Vec<String>,
    pub action: String,
    /// success_rate × saturation(usage_count), in [0, 1]
    pub confidence: f64,
    pub usage_count: u64,
    /// Rolling success rate in [0, 1]
    pub success_rate: f64,
    pub created_at: Timestamp,
    pub last_used: Timestamp,
    pub examples: VecDeque<String>,
}

impl Pattern {
    /// Create an unused pattern; call [`Pattern::record_use`] to exercise it
    pub fn new(
        paradigm: Paradigm,
        description: impl Into<String>,
        conditions: Vec<String>,
        action: impl Into<String>,
    ) -> Self {
        let created_at = now();
        Self {
            id: PatternId::new(),
            paradigm,
            description: description.into(),
            conditions,
            action: action.into(),
            confidence: 0.0,
            usage_count: 0,
            success_rate: 0.0,
            created_at,
            last_used: created_at,
            examples: VecDeque::new(),
        }
    }

    /// Confidence attainable with a given success rate and usage count
    pub fn confidence_for(success_rate: f64, usage_count: u64) -> f64 {
        let saturation = 1.0 - (-(usage_count as f64) / USAGE_SATURATION).exp();
        (success_rate.clamp(0.0, 1.0) * saturation).clamp(0.0, 1.0)
    }

    /// Record one exercise of the pattern with an outcome in [0, 1]
    pub fn record_use(&mut self, outcome: f64, example: Option<String>) {
        let outcome = outcome.clamp(0.0, 1.0);
        self.success_rate = if self.usage_count == 0 {
            outcome
        } else {
            ema(self.success_rate, outcome, SUCCESS_RATE_SMOOTHING)
        };
        self.usage_count += 1;
        self.last_used = now();

        if let Some(example) = example {
            self.examples.push_back(example);
            while self.examples.len() > PATTERN_EXAMPLE_LIMIT {
                self.examples.pop_front();
            }
        }

        self.confidence = Self::confidence_for(self.success_rate, self.usage_count);
    }
}
