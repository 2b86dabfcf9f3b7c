//! Learning store and sweet-spot mining, end to end
//!
//! Exercises the on-disk attempt log across reopen, and the full
//! accept-enough-then-recommend flow through the engine.

mod common;

use calliope_core::{
    AttemptStore, ConnectionMode, ContentType, ContextKey, GenerationEngine, ItemId,
    ItemRequest, StaticPromptAssembler, SweetSpotAnalyzer,
};
use common::{create_test_store, single_evaluator_orchestrator, test_config, ScriptedClient, COMPLETE_TEXT};
use std::sync::Arc;
use tempfile::TempDir;

fn request() -> ItemRequest {
    ItemRequest {
        item_id: ItemId::new(),
        content_type: ContentType::new("description"),
        context: ContextKey::new("kitchen"),
    }
}

fn assembler() -> StaticPromptAssembler {
    StaticPromptAssembler::new("A ceramic pour-over coffee dripper with a ridged cone.")
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("attempts.db");

    let mut config = test_config();
    let orchestrator = single_evaluator_orchestrator(&mut config, 0.82);
    let client = Arc::new(ScriptedClient::new(vec![COMPLETE_TEXT]));
    let request = request();

    {
        let store = Arc::new(
            AttemptStore::open(ConnectionMode::Local(db_path.clone()))
                .await
                .unwrap(),
        );
        let engine = GenerationEngine::new(&config, client, orchestrator, Arc::clone(&store));
        let outcome = engine
            .generate_with_quality_gate(&request, &assembler())
            .await
            .unwrap();
        assert!(outcome.is_accepted());
    }

    // Fresh handle onto the same file sees the durable record
    let reopened = AttemptStore::open(ConnectionMode::Local(db_path)).await.unwrap();
    let history = reopened.attempts_for_item(request.item_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].accepted);
    assert_eq!(history[0].text, COMPLETE_TEXT);
    assert_eq!(reopened.count_attempts().await.unwrap(), 1);
}

#[tokio::test]
async fn test_recommendation_unlocks_after_enough_accepted_runs() {
    let mut config = test_config();
    config.learning.min_samples = 3;
    let orchestrator = single_evaluator_orchestrator(&mut config, 0.82);
    let store = create_test_store().await;
    let client = Arc::new(ScriptedClient::new(vec![COMPLETE_TEXT; 4]));

    let engine =
        GenerationEngine::new(&config, client.clone(), orchestrator, Arc::clone(&store));

    let content_type = ContentType::new("description");
    let context = ContextKey::new("kitchen");
    let analyzer = SweetSpotAnalyzer::new(Arc::clone(&store), 3);

    // Under-sampled bucket: mining yields nothing
    assert!(analyzer
        .recommend(&content_type, &context)
        .await
        .unwrap()
        .is_none());

    for _ in 0..3 {
        let outcome = engine
            .generate_with_quality_gate(&request(), &assembler())
            .await
            .unwrap();
        assert!(outcome.is_accepted());
    }

    let rec = analyzer
        .recommend(&content_type, &context)
        .await
        .unwrap()
        .expect("three accepted attempts should unlock the recommendation");
    assert_eq!(rec.sample_count, 3);
    assert!(rec.ranges.contains_key("temperature"));

    // All three accepted attempts used the base parameters, so the mined
    // range collapses onto them and the next run starts exactly there
    let outcome = engine
        .generate_with_quality_gate(&request(), &assembler())
        .await
        .unwrap();
    assert!(outcome.is_accepted());

    let calls = client.received();
    assert_eq!(calls.len(), 4);
    assert!((calls[3].temperature - 0.8).abs() < 1e-9);
    assert!((calls[3].repetition_penalty - 1.1).abs() < 1e-9);
    assert!((calls[3].novelty - 0.3).abs() < 1e-9);
}

#[tokio::test]
async fn test_buckets_do_not_share_recommendations() {
    let mut config = test_config();
    config.learning.min_samples = 2;
    let orchestrator = single_evaluator_orchestrator(&mut config, 0.82);
    let store = create_test_store().await;
    let client = Arc::new(ScriptedClient::new(vec![COMPLETE_TEXT; 2]));

    let engine = GenerationEngine::new(&config, client, orchestrator, Arc::clone(&store));

    for _ in 0..2 {
        let outcome = engine
            .generate_with_quality_gate(&request(), &assembler())
            .await
            .unwrap();
        assert!(outcome.is_accepted());
    }

    let content_type = ContentType::new("description");
    let analyzer = SweetSpotAnalyzer::new(Arc::clone(&store), 2);

    assert!(analyzer
        .recommend(&content_type, &ContextKey::new("kitchen"))
        .await
        .unwrap()
        .is_some());
    // Same content type, different bucket: still under-sampled
    assert!(analyzer
        .recommend(&content_type, &ContextKey::new("garage"))
        .await
        .unwrap()
        .is_none());
    assert!(analyzer
        .recommend(&content_type, &ContextKey::global())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_history_accumulates_across_runs() {
    let mut config = test_config();
    let orchestrator = single_evaluator_orchestrator(&mut config, 0.82);
    let store = create_test_store().await;
    let client = Arc::new(ScriptedClient::new(vec![COMPLETE_TEXT; 2]));

    let engine = GenerationEngine::new(&config, client, orchestrator, Arc::clone(&store));
    let request = request();

    for _ in 0..2 {
        engine
            .generate_with_quality_gate(&request, &assembler())
            .await
            .unwrap();
    }

    // The log is append-only: a rerun never replaces earlier records
    let history = store.attempts_for_item(request.item_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|a| a.accepted));
    assert!(history.iter().all(|a| a.attempt_index == 1));
}
