//! Supervised Module - frequency-based Naive-Bayes classifier
//!
//! Keeps, per class label, a feature → count table and a global
//! increment-only feature-weight table. Prediction scores every class with
//! add-one smoothing and normalizes the scores into a distribution.

use super::buffer::ExperienceBuffer;
use super::features::{extract_features, value_label};
use super::pattern_store::{PatternStore, Upsert};
use super::types::{Experience, Paradigm, Pattern};
use super::{LearnDetail, LearningModule, Prediction};
use crate::config::RetentionConfig;
use crate::error::{LearningError, Result};
use crate::types::ema;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// Features listed as conditions on a class pattern
const PATTERN_FEATURES: usize = 3;

/// Frequency-based classifier
#[derive(Debug)]
pub struct SupervisedModule {
    /// label → feature → count
    class_feature_counts: BTreeMap<String, HashMap<String, u64>>,
    /// label → total feature occurrences
    class_totals: BTreeMap<String, u64>,
    /// feature → accumulated importance
    feature_weights: HashMap<String, f64>,
    experiences: ExperienceBuffer<Experience>,
    patterns: PatternStore,
    accuracy: f64,
    smoothing: f64,
}

impl SupervisedModule {
    pub fn new(retention: &RetentionConfig, smoothing: f64) -> Self {
        Self {
            class_feature_counts: BTreeMap::new(),
            class_totals: BTreeMap::new(),
            feature_weights: HashMap::new(),
            experiences: ExperienceBuffer::new(
                retention.experience_capacity,
                retention.experience_retain,
            ),
            patterns: PatternStore::with_capacity(retention.max_patterns),
            accuracy: 0.0,
            smoothing,
        }
    }

    /// Normalized class distribution for an input.
    ///
    /// Scores are computed in log space so long inputs do not underflow.
    pub fn class_probabilities(&self, input: &Value) -> BTreeMap<String, f64> {
        let features = extract_features(input);

        let log_scores: Vec<(&String, f64)> = self
            .class_totals
            .iter()
            .map(|(label, &total)| {
                let counts = self.class_feature_counts.get(label);
                let denominator = total.max(1) as f64;
                let score = features
                    .iter()
                    .map(|f| {
                        let count = counts.and_then(|c| c.get(f)).copied().unwrap_or(0);
                        ((count + 1) as f64 / denominator).ln()
                    })
                    .sum::<f64>();
                (label, score)
            })
            .collect();

        let max = log_scores
            .iter()
            .map(|(_, s)| *s)
            .fold(f64::NEG_INFINITY, f64::max);
        let normalizer: f64 = log_scores.iter().map(|(_, s)| (s - max).exp()).sum();

        log_scores
            .into_iter()
            .map(|(label, s)| (label.clone(), (s - max).exp() / normalizer))
            .collect()
    }

    /// Known class labels, sorted
    pub fn classes(&self) -> impl Iterator<Item = &String> {
        self.class_totals.keys()
    }

    pub fn class_count(&self) -> usize {
        self.class_totals.len()
    }

    /// Accumulated importance of a feature across all classes
    pub fn feature_weight(&self, feature: &str) -> f64 {
        self.feature_weights.get(feature).copied().unwrap_or(0.0)
    }

    /// Most frequent features of a class, ties broken alphabetically
    fn top_features(&self, label: &str, n: usize) -> Vec<String> {
        let Some(counts) = self.class_feature_counts.get(label) else {
            return Vec::new();
        };
        let mut ranked: Vec<(&String, &u64)> = counts.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        ranked.into_iter().take(n).map(|(f, _)| f.clone()).collect()
    }

    fn record_counts(&mut self, label: &str, features: &BTreeSet<String>, importance: f64) {
        let counts = self.class_feature_counts.entry(label.to_string()).or_default();
        for feature in features {
            *counts.entry(feature.clone()).or_insert(0) += 1;
            *self.feature_weights.entry(feature.clone()).or_insert(0.0) += importance;
        }
        *self.class_totals.entry(label.to_string()).or_insert(0) += features.len() as u64;
    }
}

impl LearningModule for SupervisedModule {
    fn paradigm(&self) -> Paradigm {
        Paradigm::Supervised
    }

    fn learn(&mut self, experience: &Experience) -> Result<LearnDetail> {
        let expected = experience
            .expected_output
            .as_ref()
            .ok_or(LearningError::MissingRequiredField {
                paradigm: Paradigm::Supervised,
                field: "expected_output",
            })?;

        let label = value_label(expected);
        let features = extract_features(&experience.input);
        let new_class = !self.class_totals.contains_key(&label);

        let prior = self.estimate(&experience.input)?;
        let prior_correct = prior.value.as_deref() == Some(label.as_str());
        if prior.value.is_some() {
            let hit = if prior_correct { 1.0 } else { 0.0 };
            self.accuracy = ema(self.accuracy, hit, self.smoothing);
        }

        self.record_counts(&label, &features, experience.importance);
        self.experiences.push(experience.clone());

        let conditions: Vec<String> = self
            .top_features(&label, PATTERN_FEATURES)
            .into_iter()
            .map(|f| format!("has_feature:{}", f))
            .collect();
        let outcome = if new_class || prior_correct { 1.0 } else { 0.0 };
        let example = Some(value_label(&experience.input));
        let upsert = self
            .patterns
            .upsert(&format!("label:{}", label), outcome, example, || {
                Pattern::new(
                    Paradigm::Supervised,
                    format!("Inputs with [{}] are labelled '{}'", conditions.join(", "), label),
                    conditions.clone(),
                    label.clone(),
                )
            });

        if upsert == Upsert::Created {
            info!(label = %label, features = features.len(), "New class learned");
        } else {
            debug!(label = %label, prior_correct, "Supervised experience recorded");
        }

        Ok(LearnDetail::Supervised {
            label,
            features: features.len(),
            new_class,
            prior_correct,
        })
    }

    fn estimate(&self, input: &Value) -> Result<Prediction> {
        if self.class_totals.is_empty() {
            return Ok(Prediction::none());
        }

        let best = self
            .class_probabilities(input)
            .into_iter()
            .fold(None::<(String, f64)>, |best, (label, p)| match best {
                Some((_, best_p)) if best_p >= p => best,
                _ => Some((label, p)),
            });

        Ok(best
            .map(|(label, p)| Prediction::new(label, p))
            .unwrap_or_else(Prediction::none))
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
        self.class_feature_counts.clear();
        self.class_totals.clear();
        self.feature_weights.clear();
        self.experiences.clear();
        self.patterns.clear();
        self.accuracy = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn module() -> SupervisedModule {
        SupervisedModule::new(&RetentionConfig::default(), 0.1)
    }

    fn labelled(input: &str, label: &str) -> Experience {
        Experience::builder(input)
            .expected(label)
            .paradigm(Paradigm::Supervised)
            .build()
            .unwrap()
    }

    #[test]
    fn test_missing_expected_output_is_rejected() {
        let mut m = module();
        let exp = Experience::builder("cat").build().unwrap();
        let err = m.learn(&exp).unwrap_err();
        assert!(matches!(
            err,
            LearningError::MissingRequiredField {
                field: "expected_output",
                ..
            }
        ));
        assert_eq!(m.experience_count(), 0);
    }

    #[test]
    fn test_no_classes_predicts_none() {
        let m = module();
        assert_eq!(m.estimate(&json!("anything")).unwrap(), Prediction::none());
    }

    #[test]
    fn test_learns_to_separate_classes() {
        let mut m = module();
        for _ in 0..3 {
            m.learn(&labelled("furry cat meows", "animal")).unwrap();
            m.learn(&labelled("red car drives fast", "vehicle")).unwrap();
        }

        let p = m.estimate(&json!("the cat")).unwrap();
        assert_eq!(p.value.as_deref(), Some("animal"));
        assert!(p.confidence > 0.5);

        let p = m.estimate(&json!("fast car")).unwrap();
        assert_eq!(p.value.as_deref(), Some("vehicle"));
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let mut m = module();
        m.learn(&labelled("alpha beta", "x")).unwrap();
        m.learn(&labelled("gamma delta", "y")).unwrap();
        m.learn(&labelled("alpha epsilon", "z")).unwrap();

        let probs = m.class_probabilities(&json!("alpha gamma"));
        assert_eq!(probs.len(), 3);
        let sum: f64 = probs.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_one_pattern_per_label() {
        let mut m = module();
        m.learn(&labelled("cat", "animal")).unwrap();
        m.learn(&labelled("dog", "animal")).unwrap();
        m.learn(&labelled("car", "vehicle")).unwrap();

        assert_eq!(m.patterns().len(), 2);
        let animal = m.patterns().get("label:animal").unwrap();
        assert_eq!(animal.action, "animal");
        assert_eq!(animal.usage_count, 2);
        assert!(animal.conditions.iter().all(|c| c.starts_with("has_feature:")));
    }

    #[test]
    fn test_feature_weights_follow_importance() {
        let mut m = module();
        let exp = Experience::builder("heavy signal")
            .expected("x")
            .importance(2.5)
            .build()
            .unwrap();
        m.learn(&exp).unwrap();
        m.learn(&labelled("signal", "x")).unwrap();

        assert_eq!(m.feature_weight("signal"), 3.5);
        assert_eq!(m.feature_weight("heavy"), 2.5);
        assert_eq!(m.feature_weight("absent"), 0.0);
    }

    #[test]
    fn test_accuracy_tracks_prior_predictions() {
        let mut m = module();
        for _ in 0..5 {
            m.learn(&labelled("cat", "animal")).unwrap();
        }
        assert!(m.performance().accuracy > 0.0);
        assert_eq!(m.performance().experience_count, 5);

        m.reset();
        assert_eq!(m.class_count(), 0);
        assert_eq!(m.performance(), Default::default());
    }
}
