//! E2E tests for the learning engine
//!
//! Drives the four public operations the way a host would: learn, predict,
//! get_patterns and get_system_status.

use adaptive_core::{
    AdaptiveLearningEngine, EngineConfig, Experience, LearnDetail, ModuleOutcome, Paradigm,
    SharedEngine, Strategy,
};
use serde_json::json;

fn deterministic_engine() -> AdaptiveLearningEngine {
    AdaptiveLearningEngine::with_config(EngineConfig::new().with_epsilon(0.0).with_seed(11))
        .unwrap()
}

#[test]
fn e2e_supervised_cat_is_animal() {
    let mut engine = deterministic_engine();

    for _ in 0..3 {
        let exp = Experience::builder("cat")
            .expected("animal")
            .paradigm(Paradigm::Supervised)
            .build()
            .unwrap();
        engine.learn(exp).unwrap();
    }

    let predictions = engine.predict(&json!("cat"), None);
    let supervised = &predictions[&Paradigm::Supervised];
    assert_eq!(supervised.value.as_deref(), Some("animal"));
    assert!(supervised.confidence > 0.5);

    let patterns = engine.get_patterns(Some(Paradigm::Supervised));
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].action, "animal");
    assert_eq!(patterns[0].usage_count, 3);
}

#[test]
fn e2e_reinforcement_greedy_action() {
    let mut engine = deterministic_engine();

    let exp = Experience::builder("s1")
        .actual("left")
        .feedback(1.0)
        .paradigm(Paradigm::Reinforcement)
        .build()
        .unwrap();
    let result = engine.learn(exp).unwrap();

    match &result.outcomes[&Paradigm::Reinforcement] {
        ModuleOutcome::Learned(LearnDetail::Reinforcement { q_value, .. }) => {
            assert!((q_value - 0.1).abs() < 1e-12);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let predictions = engine.predict(&json!("s1"), Some(&[Paradigm::Reinforcement]));
    assert_eq!(
        predictions[&Paradigm::Reinforcement].value.as_deref(),
        Some("left")
    );
}

#[test]
fn e2e_reinforcement_without_feedback_is_rejected_not_fatal() {
    let mut engine = deterministic_engine();

    let exp = Experience::builder("s1")
        .actual("left")
        .paradigm(Paradigm::Reinforcement)
        .build()
        .unwrap();
    let result = engine.learn(exp).unwrap();

    match &result.outcomes[&Paradigm::Reinforcement] {
        ModuleOutcome::Rejected { error } => assert!(error.contains("feedback")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(engine.get_system_status().total_experiences, 1);
}

#[test]
fn e2e_unsupervised_repeat_joins_cluster() {
    let mut engine = deterministic_engine();
    let input = json!({"cpu": 0.9, "memory": 0.4, "disk": 0.1});

    let mut clusters = Vec::new();
    for _ in 0..2 {
        let exp = Experience::builder(input.clone())
            .paradigm(Paradigm::Unsupervised)
            .build()
            .unwrap();
        let result = engine.learn(exp).unwrap();
        match &result.outcomes[&Paradigm::Unsupervised] {
            ModuleOutcome::Learned(LearnDetail::Unsupervised { cluster_id, .. }) => {
                clusters.push(*cluster_id)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(clusters[0], clusters[1]);
    assert_eq!(engine.unsupervised().cluster_count(), 1);
}

#[test]
fn e2e_meta_recommends_consistent_strategy() {
    let mut engine = deterministic_engine();

    for _ in 0..5 {
        let exp = Experience::builder("optimisation")
            .metadata("strategy_used", "exploration")
            .metadata("performance", 0.9)
            .paradigm(Paradigm::Meta)
            .build()
            .unwrap();
        engine.learn(exp).unwrap();
    }

    let predictions = engine.predict(&json!("optimisation"), Some(&[Paradigm::Meta]));
    let meta = &predictions[&Paradigm::Meta];
    assert_eq!(meta.value.as_deref(), Some("exploration"));
    assert!(meta.confidence > 0.7);

    let status = engine.get_system_status();
    assert_eq!(status.current_strategy, Strategy::Balanced);
    assert_eq!(status.strategies[0].strategy, Strategy::Exploration);
    assert!(!engine.get_patterns(Some(Paradigm::Meta)).is_empty());
}

#[test]
fn e2e_fresh_engine_has_no_knowledge() {
    let mut engine = AdaptiveLearningEngine::new();
    let predictions = engine.predict(&json!({"anything": true}), None);

    assert_eq!(predictions.len(), Paradigm::MODULES.len());
    for (paradigm, prediction) in predictions {
        assert_eq!(prediction.confidence, 0.0, "{} should know nothing", paradigm);
    }

    let status = engine.get_system_status();
    assert_eq!(status.total_experiences, 0);
    assert_eq!(status.performance, 0.0);
    assert!(status.exploring);
}

#[test]
fn e2e_mixed_stream_builds_patterns_everywhere() {
    let mut engine = deterministic_engine();

    for i in 0..20 {
        let label = if i % 2 == 0 { "even" } else { "odd" };
        let supervised = Experience::builder(format!("number {} parity {}", i, label))
            .expected(label)
            .paradigm(Paradigm::Supervised)
            .build()
            .unwrap();
        let reinforcement = Experience::builder("lobby")
            .actual("wait")
            .feedback(1.0)
            .paradigm(Paradigm::Reinforcement)
            .build()
            .unwrap();
        let unsupervised = Experience::builder("steady background traffic")
            .paradigm(Paradigm::Unsupervised)
            .build()
            .unwrap();
        let meta = Experience::builder("batch")
            .metadata("strategy_used", "conservative")
            .metadata("performance", 0.95)
            .paradigm(Paradigm::Meta)
            .build()
            .unwrap();

        for exp in [supervised, reinforcement, unsupervised, meta] {
            engine.learn(exp).unwrap();
        }
    }

    for paradigm in Paradigm::MODULES {
        assert!(
            !engine.get_patterns(Some(paradigm)).is_empty(),
            "{} learned no patterns",
            paradigm
        );
    }

    let all = engine.get_patterns(None);
    let status = engine.get_system_status();
    assert_eq!(all.len(), status.total_patterns);
    assert_eq!(status.total_experiences, 80);
    assert!(all.iter().all(|p| (0.0..=1.0).contains(&p.confidence)));
}

#[test]
fn e2e_shared_engine_serializes_callers() {
    let shared = SharedEngine::new(deterministic_engine());

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let shared = shared.clone();
            std::thread::spawn(move || {
                for j in 0..10 {
                    let exp = Experience::builder(format!("worker{} item{}", i, j))
                        .paradigm(Paradigm::Unsupervised)
                        .build()
                        .unwrap();
                    shared.learn(exp).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let status = shared.get_system_status();
    assert_eq!(status.total_experiences, 80);
    assert_eq!(status.modules[&Paradigm::Unsupervised].experience_count, 80);

    shared.reset();
    assert_eq!(shared.get_system_status().total_experiences, 0);
}

#[test]
fn e2e_status_serializes_to_json() {
    let mut engine = deterministic_engine();
    let exp = Experience::builder("cat").expected("animal").build().unwrap();
    let result = engine.learn(exp).unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["outcomes"]["supervised"]["status"], "learned");
    assert_eq!(json["outcomes"]["reinforcement"]["status"], "rejected");

    let status = serde_json::to_value(engine.get_system_status()).unwrap();
    assert_eq!(status["current_strategy"], "balanced");
    assert_eq!(status["total_experiences"], 1);
}
