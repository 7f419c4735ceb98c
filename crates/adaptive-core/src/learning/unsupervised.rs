//! Unsupervised Module - similarity clustering with anomaly detection
//!
//! Inputs are reduced to feature sets and assigned to the cluster whose most
//! recent exemplar is most similar (Jaccard), provided the similarity clears
//! the configured threshold. Otherwise a new cluster is opened.
//!
//! The number of clusters is bounded; when full, the cluster joined least
//! recently is dropped to make room.
//!
//! Alongside clustering the module keeps a sliding window of recent feature
//! sets and feature-pair co-occurrence counts over that same window. An input is anomalous when
//! more than half of its features are rarer than `mean - z·σ` of the feature
//! frequencies in that window.

use super::buffer::ExperienceBuffer;
use super::features::{extract_features, jaccard, value_label};
use super::pattern_store::PatternStore;
use super::types::{Experience, Paradigm, Pattern};
use super::{LearnDetail, LearningModule, Prediction};
use crate::config::{RetentionConfig, UnsupervisedConfig};
use crate::error::Result;
use crate::types::{ema, mean_and_variance, now, ContentHash, Timestamp};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::{debug, info, warn};

/// Features per input considered for pair co-occurrence
const MAX_PAIR_FEATURES: usize = 64;

/// Features listed as pattern conditions
const PATTERN_FEATURES: usize = 5;

/// A group of similar inputs
#[derive(Debug, Clone)]
pub struct Cluster {
    pub id: usize,
    /// Most recent exemplars, newest last
    pub exemplars: VecDeque<BTreeSet<String>>,
    pub members: u64,
    pub created_at: Timestamp,
    /// Learn step at which the cluster last gained a member
    pub last_joined: u64,
}

impl Cluster {
    fn latest(&self) -> Option<&BTreeSet<String>> {
        self.exemplars.back()
    }

    /// Mean similarity to the last `window` exemplars
    fn mean_similarity(&self, features: &BTreeSet<String>, window: usize) -> f64 {
        let recent: Vec<f64> = self
            .exemplars
            .iter()
            .rev()
            .take(window)
            .map(|e| jaccard(features, e))
            .collect();
        if recent.is_empty() {
            return 0.0;
        }
        recent.iter().sum::<f64>() / recent.len() as f64
    }
}

/// Result of anomaly screening
#[derive(Debug, Clone, Default)]
struct AnomalyCheck {
    anomalous: bool,
    rare_features: Vec<String>,
}

/// Similarity clustering
#[derive(Debug)]
pub struct UnsupervisedModule {
    config: UnsupervisedConfig,
    clusters: BTreeMap<usize, Cluster>,
    next_cluster_id: usize,
    evicted_clusters: u64,
    /// Learn steps taken so far
    step: u64,
    co_occurrence: HashMap<(String, String), u64>,
    /// Feature sets of the most recent experiences, newest last
    window: VecDeque<BTreeSet<String>>,
    anomaly_count: u64,
    experiences: ExperienceBuffer<Experience>,
    patterns: PatternStore,
    accuracy: f64,
    smoothing: f64,
}

impl UnsupervisedModule {
    pub fn new(config: &UnsupervisedConfig, retention: &RetentionConfig, smoothing: f64) -> Self {
        Self {
            config: config.clone(),
            clusters: BTreeMap::new(),
            next_cluster_id: 0,
            evicted_clusters: 0,
            step: 0,
            co_occurrence: HashMap::new(),
            window: VecDeque::new(),
            anomaly_count: 0,
            experiences: ExperienceBuffer::new(
                retention.experience_capacity,
                retention.experience_retain,
            ),
            patterns: PatternStore::with_capacity(retention.max_patterns),
            accuracy: 0.0,
            smoothing,
        }
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn cluster(&self, id: usize) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    /// Clusters dropped to stay within `max_clusters`
    pub fn evicted_clusters(&self) -> u64 {
        self.evicted_clusters
    }

    pub fn anomaly_count(&self) -> u64 {
        self.anomaly_count
    }

    /// How often two features appeared in the same input, counted over the
    /// frequency window
    pub fn co_occurrence(&self, a: &str, b: &str) -> u64 {
        let key = if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        };
        self.co_occurrence.get(&key).copied().unwrap_or(0)
    }

    /// Most similar cluster by latest exemplar, ties to the lowest id
    fn closest_cluster(&self, features: &BTreeSet<String>) -> Option<(usize, f64)> {
        self.clusters
            .values()
            .filter_map(|c| c.latest().map(|e| (c.id, jaccard(features, e))))
            .fold(None, |best, (id, sim)| match best {
                Some((_, best_sim)) if best_sim >= sim => best,
                _ => Some((id, sim)),
            })
    }

    fn check_anomaly(&self, features: &BTreeSet<String>) -> AnomalyCheck {
        if features.is_empty() || self.window.is_empty() {
            return AnomalyCheck::default();
        }

        let mut frequencies: HashMap<&str, usize> = HashMap::new();
        for set in &self.window {
            for feature in set {
                *frequencies.entry(feature.as_str()).or_insert(0) += 1;
            }
        }

        let counts: Vec<f64> = frequencies.values().map(|&c| c as f64).collect();
        let Some((mean, variance)) = mean_and_variance(&counts) else {
            return AnomalyCheck::default();
        };
        let cutoff = mean - self.config.anomaly_z_threshold * variance.sqrt();

        let rare_features: Vec<String> = features
            .iter()
            .filter(|f| (frequencies.get(f.as_str()).copied().unwrap_or(0) as f64) < cutoff)
            .cloned()
            .collect();

        AnomalyCheck {
            anomalous: rare_features.len() * 2 > features.len(),
            rare_features,
        }
    }

    /// Add the input to the window, retiring the co-occurrences of sets
    /// that fall out of it
    fn push_window(&mut self, features: BTreeSet<String>) {
        for pair in feature_pairs(&features) {
            *self.co_occurrence.entry(pair).or_insert(0) += 1;
        }
        self.window.push_back(features);

        while self.window.len() > self.config.frequency_window {
            let Some(expired) = self.window.pop_front() else {
                break;
            };
            for pair in feature_pairs(&expired) {
                if let Some(count) = self.co_occurrence.get_mut(&pair) {
                    *count -= 1;
                    if *count == 0 {
                        self.co_occurrence.remove(&pair);
                    }
                }
            }
        }
    }

    fn open_cluster(&mut self, features: &BTreeSet<String>) -> usize {
        if self.clusters.len() >= self.config.max_clusters {
            self.evict_stalest_cluster();
        }

        let id = self.next_cluster_id;
        self.next_cluster_id += 1;
        let mut exemplars = VecDeque::new();
        exemplars.push_back(features.clone());
        self.clusters.insert(
            id,
            Cluster {
                id,
                exemplars,
                members: 1,
                created_at: now(),
                last_joined: self.step,
            },
        );
        id
    }

    fn join_cluster(&mut self, id: usize, features: &BTreeSet<String>) {
        let keep = self.config.exemplar_window.max(1);
        if let Some(cluster) = self.clusters.get_mut(&id) {
            cluster.exemplars.push_back(features.clone());
            while cluster.exemplars.len() > keep {
                cluster.exemplars.pop_front();
            }
            cluster.members += 1;
            cluster.last_joined = self.step;
        }
    }

    fn evict_stalest_cluster(&mut self) {
        let stalest = self
            .clusters
            .values()
            .min_by_key(|c| (c.last_joined, c.id))
            .map(|c| c.id);
        if let Some(cluster) = stalest.and_then(|id| self.clusters.remove(&id)) {
            self.evicted_clusters += 1;
            debug!(
                cluster_id = cluster.id,
                members = cluster.members,
                "Evicted least recently joined cluster"
            );
        }
    }
}

/// Sorted feature pairs of one input, capped at `MAX_PAIR_FEATURES` features
fn feature_pairs(features: &BTreeSet<String>) -> Vec<(String, String)> {
    let items: Vec<&String> = features.iter().take(MAX_PAIR_FEATURES).collect();
    let mut pairs = Vec::new();
    for (i, a) in items.iter().enumerate() {
        for b in &items[i + 1..] {
            pairs.push(((*a).clone(), (*b).clone()));
        }
    }
    pairs
}

fn feature_conditions<'a>(features: impl Iterator<Item = &'a String>) -> Vec<String> {
    features
        .take(PATTERN_FEATURES)
        .map(|f| format!("has_feature:{}", f))
        .collect()
}

impl LearningModule for UnsupervisedModule {
    fn paradigm(&self) -> Paradigm {
        Paradigm::Unsupervised
    }

    fn learn(&mut self, experience: &Experience) -> Result<LearnDetail> {
        self.step += 1;
        let features = extract_features(&experience.input);
        let anomaly = self.check_anomaly(&features);

        let closest = self.closest_cluster(&features);
        let similarity = closest.map(|(_, sim)| sim).unwrap_or(0.0);
        let joined = closest.filter(|(_, sim)| *sim > self.config.similarity_threshold);

        let (cluster_id, new_cluster) = match joined {
            Some((id, _)) => {
                self.join_cluster(id, &features);
                (id, false)
            }
            None => (self.open_cluster(&features), true),
        };

        let example = Some(value_label(&experience.input));
        let outcome = if new_cluster { 1.0 } else { similarity };
        self.patterns
            .upsert(&format!("cluster:{}", cluster_id), outcome, example.clone(), || {
                Pattern::new(
                    Paradigm::Unsupervised,
                    format!("Inputs resembling cluster {}", cluster_id),
                    feature_conditions(features.iter()),
                    format!("cluster_{}", cluster_id),
                )
            });

        if new_cluster {
            info!(cluster_id, features = features.len(), "New cluster opened");
        } else {
            debug!(cluster_id, similarity, "Input joined cluster");
        }

        if anomaly.anomalous {
            self.anomaly_count += 1;
            let signature = ContentHash::of_bytes(
                features.iter().cloned().collect::<Vec<_>>().join("|").as_bytes(),
            );
            self.patterns.upsert(
                &format!("anomaly:{}", signature.short_hex(16)),
                1.0,
                example,
                || {
                    Pattern::new(
                        Paradigm::Unsupervised,
                        format!(
                            "Rare feature combination ({} of {} features rare)",
                            anomaly.rare_features.len(),
                            features.len()
                        ),
                        feature_conditions(anomaly.rare_features.iter()),
                        "flag_anomaly",
                    )
                },
            );
            warn!(
                cluster_id,
                rare = anomaly.rare_features.len(),
                total = features.len(),
                "Anomalous input detected"
            );
        }

        self.accuracy = ema(self.accuracy, similarity, self.smoothing);
        self.experiences.push(experience.clone());
        self.push_window(features);

        Ok(LearnDetail::Unsupervised {
            cluster_id,
            new_cluster,
            similarity,
            anomaly: anomaly.anomalous,
        })
    }

    fn estimate(&self, input: &Value) -> Result<Prediction> {
        let features = extract_features(input);
        let window = self.config.exemplar_window.max(1);

        let best = self
            .clusters
            .values()
            .map(|c| (c.id, c.mean_similarity(&features, window)))
            .fold(None::<(usize, f64)>, |best, (id, sim)| match best {
                Some((_, best_sim)) if best_sim >= sim => best,
                _ => Some((id, sim)),
            });

        Ok(match best {
            Some((id, sim)) if sim >= self.config.prediction_floor => {
                Prediction::new(format!("cluster_{}", id), sim)
            }
            _ => Prediction::none(),
        })
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
        self.clusters.clear();
        self.next_cluster_id = 0;
        self.evicted_clusters = 0;
        self.step = 0;
        self.co_occurrence.clear();
        self.window.clear();
        self.anomaly_count = 0;
        self.experiences.clear();
        self.patterns.clear();
        self.accuracy = 0.0;
    }
}
