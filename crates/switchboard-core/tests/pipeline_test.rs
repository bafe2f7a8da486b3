use std::collections::HashMap;

use switchboard_core::{FallbackPhase, Pipeline, SwitchboardConfig};
use switchboard_db::repo;
use switchboard_types::{
    CacheNamespace, CallId, Intent, IntentAction, SegmentKind, TriggerCriteria,
};

fn test_config(dir: &tempfile::TempDir) -> SwitchboardConfig {
    let mut config = SwitchboardConfig::default();
    config.db_path = dir
        .path()
        .join("pipeline.db")
        .to_str()
        .expect("utf-8 path")
        .to_string();
    config.audio_dir = dir
        .path()
        .join("audio")
        .to_str()
        .expect("utf-8 path")
        .to_string();
    config.max_fallback_count = 2;
    config.transfer_queue = "billing".to_string();
    config
}

fn seed_balance_intent(pipeline: &Pipeline) {
    let conn = pipeline.pool().get().expect("conn");
    repo::upsert_intent(
        &conn,
        &Intent {
            id: "balance".to_string(),
            agent_id: "agent-1".to_string(),
            action: IntentAction::Static {
                audio_key: Some("balance-audio".to_string()),
                text: None,
            },
            trigger: TriggerCriteria {
                keywords: vec!["balance".to_string()],
                utterance_examples: vec![],
            },
            confidence_threshold: 0.5,
            template_id: None,
            priority: 0,
            active: true,
        },
    )
    .expect("upsert intent");

    pipeline
        .store()
        .put(
            "balance-audio",
            "agent-1",
            CacheNamespace::Response,
            &[0x42; 10],
            500,
            0.0,
            None,
            true,
        )
        .expect("put");
}

fn seed_error_segment(pipeline: &Pipeline) {
    let conn = pipeline.pool().get().expect("conn");
    repo::publish_segment(
        &conn,
        "generic_error",
        "en-US",
        SegmentKind::Prefix,
        "Sorry, I did not catch that",
        "generic_error.pcm",
        250,
    )
    .expect("publish");
    std::fs::create_dir_all(pipeline.store().audio_dir()).expect("mkdir");
    std::fs::write(
        pipeline.store().audio_dir().join("generic_error.pcm"),
        [0xEE; 5],
    )
    .expect("write blob");
}

#[tokio::test]
async fn matched_utterance_plays_the_intent_audio() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (pipeline, _signals) = Pipeline::from_config(&test_config(&dir)).expect("pipeline");
    seed_balance_intent(&pipeline);

    let call = CallId::new();
    pipeline.start_call(call);
    let stream = pipeline
        .handle_utterance(call, "agent-1", "what is my balance", &HashMap::new(), "en-US")
        .await;

    assert_eq!(stream.pcm, vec![0x42; 10]);
    assert_eq!(pipeline.escalation().phase(call), FallbackPhase::Normal);
    pipeline.end_call(call);
}

#[tokio::test]
async fn repeated_unmatched_utterances_escalate_to_transfer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (pipeline, mut signals) = Pipeline::from_config(&test_config(&dir)).expect("pipeline");
    seed_balance_intent(&pipeline);
    seed_error_segment(&pipeline);

    let call = CallId::new();
    pipeline.start_call(call);

    let first = pipeline
        .handle_utterance(call, "agent-1", "pineapple", &HashMap::new(), "en-US")
        .await;
    assert_eq!(first.pcm, vec![0xEE; 5], "no match must play the error audio");
    assert_eq!(pipeline.escalation().phase(call), FallbackPhase::Degrading);

    let _second = pipeline
        .handle_utterance(call, "agent-1", "umbrella", &HashMap::new(), "en-US")
        .await;
    assert_eq!(pipeline.escalation().phase(call), FallbackPhase::Escalated);

    let signal = signals.try_recv().expect("transfer signal");
    assert_eq!(signal.call_id, call);
    assert_eq!(signal.transfer_queue, "billing");

    // Escalated calls skip classification entirely.
    let third = pipeline
        .handle_utterance(call, "agent-1", "what is my balance", &HashMap::new(), "en-US")
        .await;
    assert!(third.is_empty());
}

#[tokio::test]
async fn below_threshold_match_counts_as_a_fallback() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (pipeline, mut signals) = Pipeline::from_config(&test_config(&dir)).expect("pipeline");
    seed_error_segment(&pipeline);

    // A two-keyword intent with a high bar: matching only one keyword
    // classifies at 0.5, below the intent's own threshold.
    let conn = pipeline.pool().get().expect("conn");
    repo::upsert_intent(
        &conn,
        &Intent {
            id: "replace-card".to_string(),
            agent_id: "agent-1".to_string(),
            action: IntentAction::Static {
                audio_key: Some("replace-card-audio".to_string()),
                text: None,
            },
            trigger: TriggerCriteria {
                keywords: vec!["card".to_string(), "replacement".to_string()],
                utterance_examples: vec![],
            },
            confidence_threshold: 0.9,
            template_id: None,
            priority: 0,
            active: true,
        },
    )
    .expect("upsert intent");
    drop(conn);

    let call = CallId::new();
    pipeline.start_call(call);

    let first = pipeline
        .handle_utterance(call, "agent-1", "my card", &HashMap::new(), "en-US")
        .await;
    assert_eq!(
        first.pcm,
        vec![0xEE; 5],
        "a below-threshold match must play the error audio, not the intent's"
    );
    assert_eq!(pipeline.escalation().phase(call), FallbackPhase::Degrading);

    let _second = pipeline
        .handle_utterance(call, "agent-1", "the card again", &HashMap::new(), "en-US")
        .await;
    assert_eq!(pipeline.escalation().phase(call), FallbackPhase::Escalated);
    assert_eq!(signals.try_recv().expect("transfer signal").call_id, call);
}

#[tokio::test]
async fn confident_turn_resets_the_fallback_counter() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (pipeline, mut signals) = Pipeline::from_config(&test_config(&dir)).expect("pipeline");
    seed_balance_intent(&pipeline);
    seed_error_segment(&pipeline);

    let call = CallId::new();
    pipeline.start_call(call);

    pipeline
        .handle_utterance(call, "agent-1", "pineapple", &HashMap::new(), "en-US")
        .await;
    pipeline
        .handle_utterance(call, "agent-1", "my balance please", &HashMap::new(), "en-US")
        .await;
    pipeline
        .handle_utterance(call, "agent-1", "umbrella", &HashMap::new(), "en-US")
        .await;

    assert_eq!(pipeline.escalation().phase(call), FallbackPhase::Degrading);
    assert!(signals.try_recv().is_err(), "no transfer signal expected");
}

#[test]
fn unknown_provider_kind_fails_construction() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(&dir);
    config.provider.kind = "acoustic-modem".to_string();

    assert!(Pipeline::from_config(&config).is_err());
}
