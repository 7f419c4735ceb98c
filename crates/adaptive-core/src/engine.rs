//! Adaptive Learning Engine
//!
//! Owns the four learning modules and the curiosity tracker, routes
//! experiences to them and aggregates their answers. Module failures are
//! contained here: they become per-module outcomes and never reach the
//! caller. Only malformed experiences and bad configuration surface as
//! errors.

use crate::config::EngineConfig;
use crate::error::{LearningError, Result};
use crate::learning::{
    CuriosityExplorer, Experience, ExperienceBuffer, ExperienceId, LearnDetail, LearningModule,
    MetaLearningModule, ModulePerformance, Paradigm, Pattern, Prediction, ReinforcementModule,
    Strategy, StrategyStats, SupervisedModule, UnsupervisedModule,
};
use crate::types::{ema, now, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to an experience inside one module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModuleOutcome {
    /// The module learned from the experience
    Learned(LearnDetail),
    /// The experience lacked something the module needs
    Rejected { error: String },
    /// The module is inactive or failed internally
    Unavailable { reason: String },
}

impl ModuleOutcome {
    pub fn is_learned(&self) -> bool {
        matches!(self, ModuleOutcome::Learned(_))
    }
}

/// Result of [`AdaptiveLearningEngine::learn`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnResult {
    pub experience_id: ExperienceId,
    pub outcomes: BTreeMap<Paradigm, ModuleOutcome>,
    /// novelty × (1 − prior confidence)
    pub curiosity_reward: f64,
    /// Engine rolling accuracy after this experience
    pub performance: f64,
}

impl LearnResult {
    /// Paradigms that actually learned from the experience
    pub fn learned(&self) -> impl Iterator<Item = Paradigm> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_learned())
            .map(|(p, _)| *p)
    }
}

/// Point-in-time view of the whole engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub active_modules: usize,
    pub active_paradigms: Vec<Paradigm>,
    pub total_experiences: u64,
    /// Engine rolling accuracy
    pub performance: f64,
    pub modules: BTreeMap<Paradigm, ModulePerformance>,
    pub total_patterns: usize,
    pub curiosity_tracked: usize,
    pub exploring: bool,
    pub current_strategy: Strategy,
    pub strategies: Vec<StrategyStats>,
    pub generated_at: Timestamp,
}

/// Aggregate state owned by the engine
#[derive(Debug)]
struct EngineState {
    accuracy: f64,
    total_experiences: u64,
    /// Diagnostic only; never read by modules
    history: ExperienceBuffer<Experience>,
}

/// Coordinator over every learning paradigm
#[derive(Debug)]
pub struct AdaptiveLearningEngine {
    config: EngineConfig,
    supervised: SupervisedModule,
    reinforcement: ReinforcementModule,
    unsupervised: UnsupervisedModule,
    meta: MetaLearningModule,
    curiosity: CuriosityExplorer,
    state: EngineState,
    /// Module forced to fail, for exercising failure containment
    #[cfg(test)]
    failing: Option<Paradigm>,
}

impl Default for AdaptiveLearningEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveLearningEngine {
    /// Engine with default configuration
    pub fn new() -> Self {
        Self::build(EngineConfig::default())
    }

    /// Engine with a validated custom configuration
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: EngineConfig) -> Self {
        let retention = &config.retention;
        let smoothing = config.ema_smoothing;
        let engine = Self {
            supervised: SupervisedModule::new(retention, smoothing),
            reinforcement: ReinforcementModule::new(&config.reinforcement, retention, smoothing),
            unsupervised: UnsupervisedModule::new(&config.unsupervised, retention, smoothing),
            meta: MetaLearningModule::new(retention, smoothing),
            curiosity: CuriosityExplorer::new(&config.curiosity),
            state: EngineState {
                accuracy: 0.0,
                total_experiences: 0,
                history: ExperienceBuffer::new(
                    retention.experience_capacity,
                    retention.experience_retain,
                ),
            },
            config,
            #[cfg(test)]
            failing: None,
        };
        info!(
            active = ?engine.config.active_paradigms,
            "Adaptive learning engine initialized"
        );
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_active(&self, paradigm: Paradigm) -> bool {
        self.config.active_paradigms.contains(&paradigm)
    }

    fn module(&self, paradigm: Paradigm) -> Option<&dyn LearningModule> {
        match paradigm {
            Paradigm::Supervised => Some(&self.supervised),
            Paradigm::Reinforcement => Some(&self.reinforcement),
            Paradigm::Unsupervised => Some(&self.unsupervised),
            Paradigm::Meta => Some(&self.meta),
            Paradigm::FewShot | Paradigm::Continual | Paradigm::SelfSupervised => None,
        }
    }

    fn module_mut(&mut self, paradigm: Paradigm) -> Option<&mut dyn LearningModule> {
        match paradigm {
            Paradigm::Supervised => Some(&mut self.supervised),
            Paradigm::Reinforcement => Some(&mut self.reinforcement),
            Paradigm::Unsupervised => Some(&mut self.unsupervised),
            Paradigm::Meta => Some(&mut self.meta),
            Paradigm::FewShot | Paradigm::Continual | Paradigm::SelfSupervised => None,
        }
    }

    /// Modules an experience is routed to
    fn targets(&self, tag: Option<Paradigm>) -> Vec<Paradigm> {
        match tag {
            Some(
                p @ (Paradigm::Supervised
                | Paradigm::Reinforcement
                | Paradigm::Unsupervised
                | Paradigm::Meta),
            ) => vec![p],
            Some(Paradigm::FewShot | Paradigm::Continual | Paradigm::SelfSupervised) | None => {
                self.config.active_paradigms.clone()
            }
        }
    }

    /// Highest confidence any target already has for this input
    fn prior_confidence(&self, targets: &[Paradigm], input: &Value) -> f64 {
        targets
            .iter()
            .filter(|p| self.is_active(**p))
            .filter_map(|p| self.module(*p))
            .filter_map(|m| m.estimate(input).ok())
            .map(|p| p.confidence)
            .fold(0.0, f64::max)
    }

    fn learn_in(&mut self, paradigm: Paradigm, experience: &Experience) -> ModuleOutcome {
        if !self.is_active(paradigm) {
            return ModuleOutcome::Unavailable {
                reason: format!("{} module is not active", paradigm),
            };
        }
        #[cfg(test)]
        let fault = self.forced_fault(paradigm);
        #[cfg(not(test))]
        let fault: Option<LearningError> = None;

        let Some(module) = self.module_mut(paradigm) else {
            return ModuleOutcome::Unavailable {
                reason: format!("no module for {}", paradigm),
            };
        };

        let result = match fault {
            Some(e) => Err(e),
            None => module.learn(experience),
        };
        match result {
            Ok(detail) => ModuleOutcome::Learned(detail),
            Err(e) if e.is_rejection() => {
                debug!(paradigm = %paradigm, id = %experience.id, error = %e, "Experience rejected by module");
                ModuleOutcome::Rejected {
                    error: e.to_string(),
                }
            }
            Err(e) => {
                let e = LearningError::ModuleUnavailable {
                    paradigm,
                    reason: e.to_string(),
                };
                warn!(id = %experience.id, error = %e, "Module failed during learning");
                ModuleOutcome::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Learn from one experience.
    ///
    /// Errors only when the experience itself is malformed; per-module
    /// problems are reported in [`LearnResult::outcomes`].
    pub fn learn(&mut self, experience: Experience) -> Result<LearnResult> {
        experience.validate()?;

        let targets = self.targets(experience.paradigm);
        let prior_confidence = self.prior_confidence(&targets, &experience.input);

        let outcomes: BTreeMap<Paradigm, ModuleOutcome> = targets
            .iter()
            .map(|p| (*p, self.learn_in(*p, &experience)))
            .collect();

        let curiosity_reward = self.curiosity.reward(&experience.input, prior_confidence);

        if let Some(error) = experience.error() {
            let observation = 1.0 - error.min(1.0);
            self.state.accuracy = ema(self.state.accuracy, observation, self.config.ema_smoothing);
        }
        self.state.total_experiences += 1;

        let learned = outcomes.values().filter(|o| o.is_learned()).count();
        debug!(
            id = %experience.id,
            tag = ?experience.paradigm,
            learned,
            routed = outcomes.len(),
            curiosity_reward,
            "Experience processed"
        );

        let experience_id = experience.id.clone();
        self.state.history.push(experience);

        Ok(LearnResult {
            experience_id,
            outcomes,
            curiosity_reward,
            performance: self.state.accuracy,
        })
    }

    /// Ask the selected modules (default: every active one) for a prediction.
    ///
    /// Every requested paradigm gets an entry; inactive or failing modules
    /// answer with [`Prediction::none`].
    pub fn predict(
        &mut self,
        input: &Value,
        paradigms: Option<&[Paradigm]>,
    ) -> BTreeMap<Paradigm, Prediction> {
        let selected: Vec<Paradigm> = match paradigms {
            Some(subset) => subset.to_vec(),
            None => self.config.active_paradigms.clone(),
        };

        let mut predictions = BTreeMap::new();
        for paradigm in selected {
            let active = self.is_active(paradigm);
            #[cfg(test)]
            let fault = self.forced_fault(paradigm);
            #[cfg(not(test))]
            let fault: Option<LearningError> = None;

            let prediction = match self.module_mut(paradigm) {
                Some(module) if active => match fault {
                    Some(e) => Err(e),
                    None => module.predict(input),
                }
                .unwrap_or_else(|e| {
                    warn!(paradigm = %paradigm, error = %e, "Module failed during prediction");
                    Prediction::none()
                }),
                _ => Prediction::none(),
            };
            predictions.insert(paradigm, prediction);
        }
        predictions
    }

    /// Patterns learned by one module, or by all of them
    pub fn get_patterns(&self, paradigm: Option<Paradigm>) -> Vec<Pattern> {
        let selected: Vec<Paradigm> = match paradigm {
            Some(p) => vec![p],
            None => Paradigm::MODULES.to_vec(),
        };
        selected
            .into_iter()
            .filter_map(|p| self.module(p))
            .flat_map(|m| m.patterns().values().cloned())
            .collect()
    }

    pub fn get_system_status(&self) -> StatusSnapshot {
        let modules: BTreeMap<Paradigm, ModulePerformance> = Paradigm::MODULES
            .iter()
            .filter_map(|p| self.module(*p).map(|m| (*p, m.performance())))
            .collect();
        let total_patterns = modules.values().map(|m| m.pattern_count).sum();

        StatusSnapshot {
            active_modules: self.config.active_paradigms.len(),
            active_paradigms: self.config.active_paradigms.clone(),
            total_experiences: self.state.total_experiences,
            performance: self.state.accuracy,
            modules,
            total_patterns,
            curiosity_tracked: self.curiosity.tracked_count(),
            exploring: self.curiosity.should_explore(),
            current_strategy: self.meta.current_strategy(),
            strategies: self.meta.strategy_stats(),
            generated_at: now(),
        }
    }

    /// Most recent experiences, newest last
    pub fn recent_experiences(&self, n: usize) -> Vec<&Experience> {
        self.state.history.recent(n).collect()
    }

    pub fn supervised(&self) -> &SupervisedModule {
        &self.supervised
    }

    pub fn reinforcement(&self) -> &ReinforcementModule {
        &self.reinforcement
    }

    pub fn reinforcement_mut(&mut self) -> &mut ReinforcementModule {
        &mut self.reinforcement
    }

    pub fn unsupervised(&self) -> &UnsupervisedModule {
        &self.unsupervised
    }

    pub fn meta(&self) -> &MetaLearningModule {
        &self.meta
    }

    pub fn curiosity(&self) -> &CuriosityExplorer {
        &self.curiosity
    }

    /// Forget everything learned; configuration is kept
    pub fn reset(&mut self) {
        for paradigm in Paradigm::MODULES {
            if let Some(module) = self.module_mut(paradigm) {
                module.reset();
            }
        }
        self.curiosity.reset();
        self.state.accuracy = 0.0;
        self.state.total_experiences = 0;
        self.state.history.clear();
        info!("Adaptive learning engine reset");
    }
}

#[cfg(test)]
impl AdaptiveLearningEngine {
    /// Make every call into `paradigm`'s module fail internally
    fn fail_module(&mut self, paradigm: Paradigm) {
        self.failing = Some(paradigm);
    }

    fn forced_fault(&self, paradigm: Paradigm) -> Option<LearningError> {
        (self.failing == Some(paradigm))
            .then(|| LearningError::Io(std::io::Error::other("module state lost")))
    }
}

/// Engine behind a lock, for hosts that call it from several threads
#[derive(Debug, Clone, Default)]
pub struct SharedEngine {
    inner: Arc<Mutex<AdaptiveLearningEngine>>,
}

impl SharedEngine {
    pub fn new(engine: AdaptiveLearningEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn learn(&self, experience: Experience) -> Result<LearnResult> {
        self.inner.lock().learn(experience)
    }

    pub fn predict(
        &self,
        input: &Value,
        paradigms: Option<&[Paradigm]>,
    ) -> BTreeMap<Paradigm, Prediction> {
        self.inner.lock().predict(input, paradigms)
    }

    pub fn get_patterns(&self, paradigm: Option<Paradigm>) -> Vec<Pattern> {
        self.inner.lock().get_patterns(paradigm)
    }

    pub fn get_system_status(&self) -> StatusSnapshot {
        self.inner.lock().get_system_status()
    }

    pub fn reset(&self) {
        self.inner.lock().reset()
    }

    /// Run a closure with exclusive access to the engine
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut AdaptiveLearningEngine) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
