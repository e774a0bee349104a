//! Full-lifecycle integration tests over the public API.

use std::sync::Arc;

use sensei_memory::{
    ConversationalMessage, LifecycleSweeper, MemoryContext, MockBackend, PreferenceResolver,
    SearchHit, SweepReport, TurnWriter,
};

#[tokio::test]
async fn test_record_resolve_and_purge() {
    let backend = Arc::new(MockBackend::new());
    let ctx = MemoryContext::for_actor("mem-1", "alice");

    // A short conversation.
    let writer = TurnWriter::new(backend.clone());
    for (question, answer) in [
        ("甘口の日本酒が好きです", "それでは純米吟醸はいかがでしょう"),
        ("刺身に合うものは？", "淡麗辛口の吟醸酒が合います"),
    ] {
        let outcome = writer.persist_turn(&ctx, question, answer).await.unwrap();
        assert!(outcome.is_durable());
    }
    assert_eq!(backend.event_count(), 4);

    // The backend derives long-term records asynchronously; simulate that.
    backend.seed_record(&ctx.namespace("preferences"), "甘口の日本酒を好む");
    backend.set_long_term_hits(vec![SearchHit {
        content: "甘口の日本酒を好む".to_string(),
        score: Some(0.8),
        namespace: Some(ctx.namespace("preferences")),
    }]);
    backend.set_short_term_hits(vec![SearchHit {
        content: "刺身に合うものは？".to_string(),
        score: None,
        namespace: None,
    }]);

    let resolver = PreferenceResolver::new(backend.clone());
    let result = resolver.resolve_preferences(&ctx, "好み").await.unwrap();
    assert!(!result.partial);
    assert!(!result.is_empty());

    // Purge everything, then verify convergence.
    let sweeper = LifecycleSweeper::new(backend.clone());
    let mut report = SweepReport::default();
    sweeper.sweep_all("mem-1", &mut report).await.unwrap();
    assert_eq!(report.events_deleted, 4);
    assert_eq!(report.records_deleted, 1);
    assert!(report.errors.is_empty());

    let mut rerun = SweepReport::default();
    sweeper.sweep_all("mem-1", &mut rerun).await.unwrap();
    assert_eq!(rerun.events_deleted, 0);
    assert_eq!(rerun.records_deleted, 0);
}

#[tokio::test]
async fn test_sweep_passes_are_independent() {
    let backend = Arc::new(MockBackend::new());
    backend.seed_event(
        "alice",
        "s-1",
        vec![ConversationalMessage::user("こんにちは")],
    );
    backend.seed_record("/users/alice/facts", "初心者");

    let sweeper = LifecycleSweeper::new(backend.clone());

    // Long-term pass alone leaves short-term data untouched.
    let mut report = Default::default();
    sweeper.sweep_long_term("mem-1", &mut report).await.unwrap();
    assert_eq!(report.records_deleted, 1);
    assert_eq!(backend.event_count(), 1);

    let mut report = Default::default();
    sweeper
        .sweep_short_term("mem-1", &mut report)
        .await
        .unwrap();
    assert_eq!(report.events_deleted, 1);
    assert_eq!(backend.event_count(), 0);
}
