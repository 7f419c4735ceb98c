//! Adaptive Core - a multi-paradigm learning engine
//!
//! Adaptive Core learns from a stream of experiences with several classical,
//! inspectable paradigms side by side and answers predictions from each of
//! them.
//!
//! # Architecture
//!
//! 1. **Supervised** (`learning::supervised`): frequency-based Naive-Bayes classifier
//! 2. **Reinforcement** (`learning::reinforcement`): tabular ε-greedy Q-learning
//! 3. **Unsupervised** (`learning::unsupervised`): Jaccard clustering with anomaly detection
//! 4. **Meta** (`learning::meta`): strategy selection from observed performance
//! 5. **Curiosity** (`learning::curiosity`): novelty-based intrinsic reward
//!
//! The [`AdaptiveLearningEngine`] owns all of them, routes experiences by
//! paradigm tag and contains module failures.
//!
//! # Quick Start
//!
//! ```
//! use adaptive_core::{AdaptiveLearningEngine, EngineConfig, Experience, Paradigm};
//! use serde_json::json;
//!
//! let mut engine = AdaptiveLearningEngine::with_config(EngineConfig::new().with_epsilon(0.0))
//!     .unwrap();
//!
//! for _ in 0..3 {
//!     let experience = Experience::builder("cat")
//!         .expected("animal")
//!         .paradigm(Paradigm::Supervised)
//!         .build()
//!         .unwrap();
//!     engine.learn(experience).unwrap();
//! }
//!
//! let predictions = engine.predict(&json!("cat"), Some(&[Paradigm::Supervised]));
//! assert_eq!(predictions[&Paradigm::Supervised].value.as_deref(), Some("animal"));
//!
//! let status = engine.get_system_status();
//! println!("{} experiences, {} patterns", status.total_experiences, status.total_patterns);
//! ```
//!
//! # Concurrency
//!
//! The engine is synchronous and single-writer. Wrap it in a [`SharedEngine`]
//! to call it from several threads.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod learning;
pub mod telemetry;
pub mod types;

// Re-export commonly used types for convenience
pub use config::{
    CuriosityConfig, EngineConfig, ReinforcementConfig, RetentionConfig, UnsupervisedConfig,
};
pub use engine::{AdaptiveLearningEngine, LearnResult, ModuleOutcome, SharedEngine, StatusSnapshot};
pub use error::{LearningError, Result, ResultExt};
pub use learning::{
    Experience, ExperienceId, LearnDetail, LearningModule, ModulePerformance, Paradigm, Pattern,
    PatternId, Prediction, Strategy, StrategyStats,
};
pub use telemetry::init_tracing;
pub use types::{ContentHash, Timestamp};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_end_to_end_workflow() {
        let mut engine =
            AdaptiveLearningEngine::with_config(EngineConfig::new().with_epsilon(0.0).with_seed(3))
                .unwrap();

        let supervised = Experience::builder(json!({"colour": "red", "wheels": 4}))
            .expected("car")
            .paradigm(Paradigm::Supervised)
            .build()
            .unwrap();
        let reinforcement = Experience::builder("junction")
            .actual("turn_left")
            .feedback(1.0)
            .paradigm(Paradigm::Reinforcement)
            .build()
            .unwrap();
        let meta = Experience::builder("routing")
            .metadata("strategy_used", "exploitation")
            .metadata("performance", 0.85)
            .paradigm(Paradigm::Meta)
            .build()
            .unwrap();

        for experience in [supervised, reinforcement, meta] {
            let result = engine.learn(experience).unwrap();
            assert_eq!(result.learned().count(), 1);
        }

        let predictions = engine.predict(&json!("junction"), None);
        assert_eq!(
            predictions[&Paradigm::Reinforcement].value.as_deref(),
            Some("turn_left")
        );

        let status = engine.get_system_status();
        assert_eq!(status.total_experiences, 3);
        assert_eq!(status.strategies.len(), 1);
        assert_eq!(status.active_modules, 4);
    }
}
