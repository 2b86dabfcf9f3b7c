//! Bounded batch pool behavior
//!
//! Concurrency limits, per-item isolation, and stop-flag draining over the
//! same scripted engine the single-item scenarios use.

mod common;

use calliope_core::{
    BatchRunner, CalliopeError, ContentType, ContextKey, GateOutcome, GenerationEngine, ItemId,
    ItemRequest, StaticPromptAssembler,
};
use common::{create_test_store, single_evaluator_orchestrator, test_config, ScriptedClient, COMPLETE_TEXT};
use std::sync::Arc;

fn request() -> ItemRequest {
    ItemRequest {
        item_id: ItemId::new(),
        content_type: ContentType::new("description"),
        context: ContextKey::new("kitchen"),
    }
}

async fn build_engine(responses: Vec<&str>, score: f64) -> Arc<GenerationEngine> {
    let mut config = test_config();
    let orchestrator = single_evaluator_orchestrator(&mut config, score);
    let store = create_test_store().await;
    let client = Arc::new(ScriptedClient::new(responses));
    Arc::new(GenerationEngine::new(
        &config,
        client,
        orchestrator,
        store,
    ))
}

#[tokio::test]
async fn test_batch_accepts_all_items() {
    let engine = build_engine(vec![COMPLETE_TEXT; 3], 0.82).await;
    let runner = BatchRunner::new(engine, 2);

    let requests: Vec<ItemRequest> = (0..3).map(|_| request()).collect();
    let ids: Vec<ItemId> = requests.iter().map(|r| r.item_id).collect();

    let assembler = Arc::new(StaticPromptAssembler::new("A ceramic pour-over dripper."));
    let (results, summary) = runner.run(requests, assembler).await;

    assert_eq!(summary.accepted, 3);
    assert_eq!(summary.exhausted, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(results.len(), 3);

    // Results preserve request order
    for (result, id) in results.iter().zip(ids) {
        assert_eq!(result.request.item_id, id);
        assert!(result.outcome.as_ref().unwrap().is_accepted());
    }
}

#[tokio::test]
async fn test_batch_isolates_item_failures() {
    let engine = build_engine(vec![COMPLETE_TEXT], 0.82).await;
    let runner = BatchRunner::new(engine, 2);

    let good = request();
    // No configured defaults for this content type; the item errors out
    // before ever reaching the generation service
    let bad = ItemRequest {
        item_id: ItemId::new(),
        content_type: ContentType::new("poster"),
        context: ContextKey::new("kitchen"),
    };
    let bad_id = bad.item_id;

    let assembler = Arc::new(StaticPromptAssembler::new("A ceramic pour-over dripper."));
    let (results, summary) = runner.run(vec![good, bad], assembler).await;

    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.failed, 1);

    for result in &results {
        if result.request.item_id == bad_id {
            assert!(matches!(
                result.outcome,
                Err(CalliopeError::UnknownContentType(_))
            ));
        } else {
            assert!(result.outcome.as_ref().unwrap().is_accepted());
        }
    }
}

#[tokio::test]
async fn test_batch_stop_drains_queued_items_as_cancelled() {
    let engine = build_engine(vec![COMPLETE_TEXT; 3], 0.82).await;
    let runner = BatchRunner::new(engine, 2);
    runner.request_stop();

    let requests: Vec<ItemRequest> = (0..3).map(|_| request()).collect();
    let assembler = Arc::new(StaticPromptAssembler::new("A ceramic pour-over dripper."));
    let (results, summary) = runner.run(requests, assembler).await;

    assert_eq!(summary.accepted, 0);
    assert_eq!(summary.failed, 3);
    for result in &results {
        assert!(matches!(
            result.outcome,
            Err(CalliopeError::Cancelled(_))
        ));
    }
}

#[tokio::test]
async fn test_batch_tallies_exhausted_separately() {
    let engine = build_engine(vec![COMPLETE_TEXT; 5], 0.30).await;
    let runner = BatchRunner::new(engine, 1);

    let assembler = Arc::new(StaticPromptAssembler::new("A ceramic pour-over dripper."));
    let (results, summary) = runner.run(vec![request()], assembler).await;

    assert_eq!(summary.accepted, 0);
    assert_eq!(summary.exhausted, 1);
    assert_eq!(summary.failed, 0);
    assert!(matches!(
        results[0].outcome,
        Ok(GateOutcome::Exhausted { attempts: 5, .. })
    ));
}
