//! 认知循环端到端测试

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tl_cognitive::{
    AgentWeights, CognitiveConfig, CognitiveCycle, FnProcessor, Metadata, SimulatedProcessor,
    SubmitRequest, ThoughtKind, Thought, ThoughtQueue, ThoughtState, WeightLearner,
};
use tl_core::EventKind;

fn seeded_cycle() -> CognitiveCycle {
    let config = CognitiveConfig {
        rng_seed: Some(11),
        ..CognitiveConfig::default()
    };
    CognitiveCycle::from_config(config).unwrap()
}

#[test]
fn test_dequeue_order_by_score_then_insertion() {
    let now = Utc::now();
    let mut queue = ThoughtQueue::new();
    let cases = [(2, 0.5), (1, 1.0), (4, 1.0), (3, 0.0), (2, 1.0), (1, 1.0)];
    let mut ids = Vec::new();
    for (i, (priority, intensity)) in cases.iter().enumerate() {
        let thought = Thought::new_at("memory", format!("t{}", i), now)
            .with_priority(*priority)
            .with_intensity(*intensity);
        ids.push(queue.enqueue(thought).unwrap());
    }

    let mut order = Vec::new();
    let mut last_score = f64::INFINITY;
    while let Some(thought) = queue.dequeue_next_at(now) {
        assert!(thought.score() <= last_score);
        last_score = thought.score();
        order.push(thought.id);
    }
    // 4.0, 2.0, 三个 1.0 按插入顺序 (t0, t1, t5), 0.0
    assert_eq!(order, vec![ids[2], ids[4], ids[0], ids[1], ids[5], ids[3]]);
}

#[test]
fn test_short_ttl_expires_before_dequeue() {
    let t0 = Utc::now();
    let mut queue = ThoughtQueue::new();
    let a = queue
        .enqueue(Thought::new_at("memory", "short", t0).with_priority(9).with_ttl(Duration::from_secs(1)))
        .unwrap();
    let b = queue
        .enqueue(Thought::new_at("memory", "long", t0).with_ttl(Duration::from_secs(300)))
        .unwrap();

    let later = t0 + chrono::Duration::seconds(2);
    assert_eq!(queue.dequeue_next_at(later).map(|t| t.id), Some(b));
    assert_eq!(queue.find(a).map(|t| t.state), Some(ThoughtState::Expired));
    assert_eq!(queue.stats().total_expired, 1);
}

#[tokio::test]
async fn test_emotion_adjusts_priority_on_submit() {
    let cycle = seeded_cycle();
    let fear = cycle
        .submit(SubmitRequest::new("memory", "dark room").priority(1).emotion("medo"))
        .await
        .unwrap();
    let gratitude = cycle
        .submit(SubmitRequest::new("memory", "kind words").priority(1).emotion("gratidao"))
        .await
        .unwrap();

    assert_eq!(cycle.find(fear).await.unwrap().priority, 3);
    assert_eq!(cycle.find(gratitude).await.unwrap().priority, 0);
}

#[tokio::test]
async fn test_feedback_adjusts_priority_and_mean() {
    let cycle = seeded_cycle();
    let boosted = cycle
        .submit(SubmitRequest::new("insight", "a").priority(1))
        .await
        .unwrap();
    cycle.add_feedback(boosted, 0.9).await.unwrap();
    cycle.add_feedback(boosted, 0.9).await.unwrap();
    assert_eq!(cycle.find(boosted).await.unwrap().priority, 3);

    let averaged = cycle.submit(SubmitRequest::new("insight", "b")).await.unwrap();
    cycle.add_feedback(averaged, 0.8).await.unwrap();
    cycle.add_feedback(averaged, 0.4).await.unwrap();
    let thought = cycle.find(averaged).await.unwrap();
    assert!((thought.feedback_score - 0.6).abs() < 1e-9);
    assert_eq!(thought.feedback_count, 2);

    assert!(cycle.add_feedback(averaged, 1.5).await.is_err());
    assert!(cycle.add_feedback(uuid::Uuid::new_v4(), 0.5).await.is_err());
}

#[tokio::test]
async fn test_learner_update_properties() {
    let prior = AgentWeights::new([("a".to_string(), 0.5), ("b".to_string(), 0.5)].into_iter().collect()).unwrap();
    let learner = WeightLearner::new(prior.clone(), 0.7, Some(3));

    assert!(!learner.update(&HashMap::new()).await);
    assert_eq!(*learner.weights().await, prior);

    let counts: HashMap<String, u64> = [("a".to_string(), 8), ("b".to_string(), 2)].into_iter().collect();
    assert!(learner.update(&counts).await);
    let weights = learner.weights().await;
    assert!(weights.get("a").unwrap() > weights.get("b").unwrap());
    assert!((weights.total() - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_panicking_processor_is_contained() {
    let cycle = seeded_cycle();
    cycle
        .register_processor(
            ThoughtKind::Contradiction,
            Arc::new(FnProcessor::new("explodes", |_: &str, _: &Metadata| -> tl_core::Result<Value> {
                panic!("contradiction overflow")
            })),
        )
        .await;
    let mut events = cycle.subscribe_events();
    let id = cycle
        .submit(SubmitRequest::new("contradiction", "yes and no"))
        .await
        .unwrap();

    let summary = cycle.tick().await.expect("tick should produce a summary");
    assert_eq!(summary.thought_id, id);
    assert!(summary.result.is_error());

    let finished = cycle.find(id).await.unwrap();
    assert_eq!(finished.state, ThoughtState::Processed);
    assert!(finished.result.as_ref().is_some_and(|r| r.is_error()));
    assert!(cycle.pending().await.is_empty());
    assert!(cycle.tick().await.is_none());

    let kinds: Vec<EventKind> = std::iter::from_fn(|| events.try_recv().ok()).map(|e| e.kind).collect();
    assert!(kinds.contains(&EventKind::ProcessorFailed));
}

#[tokio::test]
async fn test_end_to_end_priority_order() {
    let cycle = seeded_cycle();
    for (kind, message) in [
        (ThoughtKind::Memory, "Memory processed successfully"),
        (ThoughtKind::Doubt, "Doubt analysed"),
        (ThoughtKind::Contradiction, "Contradiction analysed"),
    ] {
        cycle
            .register_processor(kind.clone(), Arc::new(SimulatedProcessor::new(kind.as_str(), message)))
            .await;
    }

    let ttl = Duration::from_secs(3600);
    cycle.submit(SubmitRequest::new("memory", "m").priority(1).ttl(ttl)).await.unwrap();
    cycle.submit(SubmitRequest::new("doubt", "d").priority(2).ttl(ttl)).await.unwrap();
    cycle.submit(SubmitRequest::new("contradiction", "c").priority(3).ttl(ttl)).await.unwrap();

    let mut order = Vec::new();
    for _ in 0..3 {
        order.push(cycle.tick().await.unwrap().kind);
    }
    assert_eq!(
        order,
        vec![ThoughtKind::Contradiction, ThoughtKind::Doubt, ThoughtKind::Memory]
    );
    assert!(cycle.is_empty().await);

    let history = cycle.history(10).await;
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|t| t.state == ThoughtState::Processed));

    let stats = cycle.stats().await;
    assert_eq!(stats.total_processed, 3);
    assert_eq!(stats.by_kind.get("doubt"), Some(&1));
}

#[tokio::test]
async fn test_expired_thoughts_are_swept_by_tick() {
    let cycle = seeded_cycle();
    let t0 = Utc::now();
    let id = cycle
        .submit_at(SubmitRequest::new("alert", "too late").ttl(Duration::from_secs(1)), t0)
        .await
        .unwrap();

    assert!(cycle.tick_at(t0 + chrono::Duration::seconds(5)).await.is_none());
    assert_eq!(cycle.find(id).await.unwrap().state, ThoughtState::Expired);
    let stats = cycle.stats().await;
    assert_eq!(stats.total_expired, 1);
    assert_eq!(stats.total_processed, 0);
}
