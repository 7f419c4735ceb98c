//! Engine configuration
//!
//! Every tunable has a documented default and can be overridden at
//! construction, either through the `with_*` builders or by loading a TOML or
//! JSON file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{LearningError, Result, ResultExt};
use crate::learning::types::Paradigm;

/// Upper bound for the curiosity exploration window (100 years)
pub const MAX_EXPLORATION_WINDOW_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Main engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// EMA smoothing for the engine's rolling accuracy
    pub ema_smoothing: f64,

    /// Modules that receive broadcast experiences and default predictions
    pub active_paradigms: Vec<Paradigm>,

    /// Q-learning parameters
    pub reinforcement: ReinforcementConfig,

    /// Clustering and anomaly detection parameters
    pub unsupervised: UnsupervisedConfig,

    /// Novelty tracking parameters
    pub curiosity: CuriosityConfig,

    /// Experience ring and pattern retention
    pub retention: RetentionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ema_smoothing: 0.1,
            active_paradigms: Paradigm::MODULES.to_vec(),
            reinforcement: ReinforcementConfig::default(),
            unsupervised: UnsupervisedConfig::default(),
            curiosity: CuriosityConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the exploration rate
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.reinforcement.epsilon = epsilon;
        self
    }

    /// Seed the exploration RNG for reproducible runs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.reinforcement.seed = Some(seed);
        self
    }

    /// Set the clustering similarity threshold
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.unsupervised.similarity_threshold = threshold;
        self
    }

    /// Set the rolling accuracy smoothing
    pub fn with_ema_smoothing(mut self, smoothing: f64) -> Self {
        self.ema_smoothing = smoothing;
        self
    }

    /// Restrict the active modules
    pub fn with_active_paradigms(mut self, paradigms: impl IntoIterator<Item = Paradigm>) -> Self {
        self.active_paradigms = paradigms.into_iter().collect();
        self
    }

    /// Set the per-module pattern limit
    pub fn with_max_patterns(mut self, max: usize) -> Self {
        self.retention.max_patterns = max;
        self
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file; `.toml` files are parsed as TOML,
    /// everything else as JSON
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(LearningError::from)
            .with_context(|| format!("Reading config {}", path.display()))?;
        let config = if is_toml(path) {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        };
        config.with_context(|| format!("Loading config {}", path.display()))
    }

    /// Save configuration to a file, format chosen by extension
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_toml(path) {
            toml::to_string_pretty(self)
                .map_err(|e| LearningError::InvalidConfig(e.to_string()))?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, content)
            .map_err(LearningError::from)
            .with_context(|| format!("Writing config {}", path.display()))
    }

    /// Check every parameter is within its valid range
    pub fn validate(&self) -> Result<()> {
        let rl = &self.reinforcement;
        unit_interval("reinforcement.alpha", rl.alpha)?;
        unit_interval("reinforcement.gamma", rl.gamma)?;
        unit_interval("reinforcement.epsilon", rl.epsilon)?;

        let un = &self.unsupervised;
        unit_interval("unsupervised.similarity_threshold", un.similarity_threshold)?;
        unit_interval("unsupervised.prediction_floor", un.prediction_floor)?;
        if !un.anomaly_z_threshold.is_finite() || un.anomaly_z_threshold < 0.0 {
            return Err(LearningError::InvalidConfig(format!(
                "unsupervised.anomaly_z_threshold must be non-negative, got {}",
                un.anomaly_z_threshold
            )));
        }
        positive("unsupervised.frequency_window", un.frequency_window)?;
        positive("unsupervised.exemplar_window", un.exemplar_window)?;
        positive("unsupervised.max_clusters", un.max_clusters)?;

        let cu = &self.curiosity;
        unit_interval("curiosity.decay", cu.decay)?;
        positive("curiosity.max_tracked", cu.max_tracked)?;
        if cu.exploration_window_secs == 0
            || cu.exploration_window_secs > MAX_EXPLORATION_WINDOW_SECS
        {
            return Err(LearningError::InvalidConfig(format!(
                "curiosity.exploration_window_secs must be within 1..={}, got {}",
                MAX_EXPLORATION_WINDOW_SECS, cu.exploration_window_secs
            )));
        }

        let re = &self.retention;
        positive("retention.experience_capacity", re.experience_capacity)?;
        positive("retention.experience_retain", re.experience_retain)?;
        positive("retention.max_patterns", re.max_patterns)?;
        if re.experience_retain > re.experience_capacity {
            return Err(LearningError::InvalidConfig(format!(
                "retention.experience_retain ({}) exceeds experience_capacity ({})",
                re.experience_retain, re.experience_capacity
            )));
        }

        unit_interval("ema_smoothing", self.ema_smoothing)?;

        if let Some(p) = self.active_paradigms.iter().find(|p| !p.has_module()) {
            return Err(LearningError::InvalidConfig(format!(
                "no learning module exists for paradigm '{}'",
                p
            )));
        }
        Ok(())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("toml")
}

fn unit_interval(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(LearningError::InvalidConfig(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

fn positive(name: &str, value: usize) -> Result<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(LearningError::InvalidConfig(format!("{} must be positive", name)))
    }
}

/// Q-learning settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReinforcementConfig {
    /// Learning rate
    pub alpha: f64,

    /// Discount factor
    pub gamma: f64,

    /// Exploration rate for ε-greedy prediction
    pub epsilon: f64,

    /// Fixed RNG seed (entropy-seeded when absent)
    pub seed: Option<u64>,
}

impl Default for ReinforcementConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            gamma: 0.9,
            epsilon: 0.1,
            seed: None,
        }
    }
}

/// Clustering settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnsupervisedConfig {
    /// Jaccard similarity needed to join an existing cluster
    pub similarity_threshold: f64,

    /// Standard deviations below the mean frequency that mark a rare feature
    pub anomaly_z_threshold: f64,

    /// Number of recent experiences used for feature frequencies
    pub frequency_window: usize,

    /// Minimum similarity for a cluster prediction
    pub prediction_floor: f64,

    /// Exemplars compared during prediction
    pub exemplar_window: usize,

    /// Clusters kept before the least recently joined one is dropped
    pub max_clusters: usize,
}

impl Default for UnsupervisedConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            anomaly_z_threshold: 2.0,
            frequency_window: 100,
            prediction_floor: 0.3,
            exemplar_window: 5,
            max_clusters: 1_000,
        }
    }
}

/// Curiosity settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuriosityConfig {
    /// Geometric novelty decay per repeat sighting
    pub decay: f64,

    /// Window for counting recently novel inputs
    pub exploration_window_secs: u64,

    /// Novel inputs per window below which exploration is recommended
    pub exploration_budget: usize,

    /// Maximum distinct inputs tracked
    pub max_tracked: usize,
}

impl Default for CuriosityConfig {
    fn default() -> Self {
        Self {
            decay: 0.95,
            exploration_window_secs: 3600, // 1 hour
            exploration_budget: 10,
            max_tracked: 50_000,
        }
    }
}

/// Retention limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Ring size that triggers trimming
    pub experience_capacity: usize,

    /// Ring size after trimming
    pub experience_retain: usize,

    /// Patterns kept per module before LRU eviction
    pub max_patterns: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            experience_capacity: 10_000,
            experience_retain: 8_000,
            max_patterns: 1_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.reinforcement.alpha, 0.1);
        assert_eq!(config.reinforcement.gamma, 0.9);
        assert_eq!(config.reinforcement.epsilon, 0.1);
        assert_eq!(config.unsupervised.similarity_threshold, 0.7);
        assert_eq!(config.unsupervised.frequency_window, 100);
        assert_eq!(config.unsupervised.max_clusters, 1_000);
        assert_eq!(config.curiosity.decay, 0.95);
        assert_eq!(config.retention.experience_capacity, 10_000);
        assert_eq!(config.retention.experience_retain, 8_000);
        assert_eq!(config.active_paradigms.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::new()
            .with_epsilon(0.0)
            .with_seed(7)
            .with_active_paradigms([Paradigm::Supervised]);

        assert_eq!(config.reinforcement.epsilon, 0.0);
        assert_eq!(config.reinforcement.seed, Some(7));
        assert_eq!(config.active_paradigms, vec![Paradigm::Supervised]);
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        assert!(EngineConfig::new().with_epsilon(1.5).validate().is_err());
        assert!(EngineConfig::new().with_ema_smoothing(-0.1).validate().is_err());
        assert!(EngineConfig::new()
            .with_active_paradigms([Paradigm::FewShot])
            .validate()
            .is_err());

        let mut config = EngineConfig::new();
        config.retention.experience_retain = 20_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bounds_exploration_window() {
        let mut config = EngineConfig::new();
        config.curiosity.exploration_window_secs = MAX_EXPLORATION_WINDOW_SECS;
        assert!(config.validate().is_ok());

        config.curiosity.exploration_window_secs = 10_000_000_000_000;
        assert!(matches!(config.validate(), Err(LearningError::InvalidConfig(_))));

        config.curiosity.exploration_window_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_errors_name_the_path() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("absent.toml");
        let err = EngineConfig::from_file(&missing).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));

        let invalid = dir.path().join("bad.json");
        std::fs::write(&invalid, r#"{"ema_smoothing": 7.0}"#).unwrap();
        let err = EngineConfig::from_file(&invalid).unwrap_err();
        assert!(err.to_string().contains("bad.json"));
        assert!(err.to_string().contains("ema_smoothing"));
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            ema_smoothing = 0.2

            [reinforcement]
            epsilon = 0.0
            "#,
        )
        .unwrap();

        assert_eq!(config.ema_smoothing, 0.2);
        assert_eq!(config.reinforcement.epsilon, 0.0);
        assert_eq!(config.reinforcement.alpha, 0.1);
        assert_eq!(config.unsupervised, UnsupervisedConfig::default());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new().with_seed(42).with_max_patterns(50);

        let json_path = dir.path().join("engine.json");
        config.to_file(&json_path).unwrap();
        assert_eq!(EngineConfig::from_file(&json_path).unwrap(), config);

        let toml_path = dir.path().join("engine.toml");
        config.to_file(&toml_path).unwrap();
        assert_eq!(EngineConfig::from_file(&toml_path).unwrap(), config);
    }
}
