//! Integration tests for the conductor
//!
//! Every collaborator is in memory; the AI capability replays scripted
//! thoughts and failures.

mod common;

use common::{FixedStrategy, Harness, ScriptedAi};
use sdk::errors::{AiError, EngineError, QualityBreach};
use sdk::session::SessionPhase;
use sdk::types::{
    CorrectionAction, FailureKind, MemoryKind, QualityAlert, Severity, Thought, SAFE_MODE_ACTION,
    SAFE_MODE_NOTE,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use somnus_engine::conductor::prompts;
use somnus_engine::conductor::{SessionConfig, SessionDuration, TurnContext, TurnStatus};
use somnus_engine::config::MetricThreshold;
use somnus_engine::message_bus::{EventPayload, EventType};
use somnus_engine::quality::QualityGate;

fn finished(reply: &str) -> Thought {
    Thought {
        goal_complete: true,
        ..Thought::new("goal reached", reply)
    }
}

async fn start(harness: &Harness, session_id: &str) {
    let config = SessionConfig::new(session_id, "u1").with_duration(SessionDuration::Short);
    harness
        .conductor
        .conduct_story_session(&config)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_session_start_sets_up_agenda() {
    let harness = Harness::new(ScriptedAi::new());
    let mut events = harness.bus.subscribe(EventType::All).await;

    let config = SessionConfig::new("s1", "u1")
        .with_duration(SessionDuration::Short)
        .with_theme("owls");
    let result = harness.conductor.conduct_story_session(&config).await.unwrap();

    assert_eq!(result.status, TurnStatus::Completed);
    assert_eq!(result.phase, SessionPhase::Onboarding);

    let state = harness.sessions.snapshot("s1").unwrap();
    assert_eq!(state.phase(), SessionPhase::Onboarding);
    assert_eq!(state.active_goals().len(), 3);
    assert_eq!(state.context_u64("totalBeats"), Some(3));
    assert_eq!(state.context_value("theme"), Some(&json!("owls")));

    assert_eq!(harness.traces.actions(), vec!["CONTINUE".to_string()]);
    assert_eq!(harness.memory.of_kind(MemoryKind::Episodic).len(), 1);

    let first = events.recv().await.unwrap();
    assert!(matches!(first.payload, EventPayload::SessionStarted { .. }));
    let second = events.recv().await.unwrap();
    assert!(matches!(second.payload, EventPayload::TurnCompleted { .. }));
}

#[tokio::test]
async fn test_resuming_keeps_phase_and_skips_session_started() {
    let harness = Harness::new(ScriptedAi::new());
    start(&harness, "s1").await;

    let mut events = harness.bus.subscribe(EventType::SessionStarted).await;
    let config = SessionConfig::new("s1", "u1").with_duration(SessionDuration::Long);
    let result = harness.conductor.conduct_story_session(&config).await.unwrap();

    assert_eq!(result.phase, SessionPhase::Onboarding);
    // The stored duration wins over the requested one
    let state = harness.sessions.snapshot("s1").unwrap();
    assert_eq!(state.context_value("duration"), Some(&json!("short")));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_turn_on_unknown_session_is_not_found() {
    let harness = Harness::new(ScriptedAi::new());

    let err = harness
        .conductor
        .process_turn("hello", &TurnContext::new("missing"))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::SessionNotFound(id) if id == "missing"));
    assert_eq!(harness.ai.thought_calls(), 0);
}

#[tokio::test]
async fn test_full_agenda_walk_ends_asleep() {
    let harness = Harness::new(ScriptedAi::new());
    start(&harness, "s1").await;
    let mut beats = harness.bus.subscribe(EventType::StoryBeatCompleted).await;
    let mut sleep = harness.bus.subscribe(EventType::SleepCueDetected).await;

    // Onboarding completes
    harness.ai.push_thought(Ok(finished("Let's hear about owls")));
    let result = harness
        .conductor
        .process_turn("owls please", &TurnContext::new("s1"))
        .await
        .unwrap();
    assert_eq!(result.phase, SessionPhase::Storytelling);

    // Three beats, the last one moves on to the wind-down
    for expected in 0..3u32 {
        let result = harness
            .conductor
            .process_turn("and then?", &TurnContext::new("s1"))
            .await
            .unwrap();
        let event = beats.recv().await.unwrap();
        match event.payload {
            EventPayload::StoryBeatCompleted {
                beat_index,
                total_beats,
                ..
            } => {
                assert_eq!(beat_index, expected);
                assert_eq!(total_beats, 3);
            }
            other => panic!("unexpected event {:?}", other),
        }
        let phase = if expected == 2 {
            SessionPhase::WindDown
        } else {
            SessionPhase::Storytelling
        };
        assert_eq!(result.phase, phase);
    }

    harness.ai.push_thought(Ok(finished("Breathe in... and out")));
    let result = harness
        .conductor
        .process_turn("okay", &TurnContext::new("s1"))
        .await
        .unwrap();

    assert_eq!(result.phase, SessionPhase::Asleep);
    assert!(harness.sessions.snapshot("s1").unwrap().active_goals().is_empty());
    let event = sleep.recv().await.unwrap();
    assert!(matches!(
        event.payload,
        EventPayload::SleepCueDetected { session_id: Some(ref id), .. } if id == "s1"
    ));
}

#[tokio::test]
async fn test_sleep_cue_skips_the_model() {
    let harness = Harness::new(ScriptedAi::new());
    start(&harness, "s1").await;
    let calls_before = harness.ai.thought_calls();
    let mut sleep = harness.bus.subscribe(EventType::SleepCueDetected).await;

    let result = harness
        .conductor
        .process_turn("I'm so sleepy", &TurnContext::new("s1").with_request_id("r-1"))
        .await
        .unwrap();

    assert_eq!(result.phase, SessionPhase::Asleep);
    assert_eq!(result.reply, prompts::asleep_reply());
    assert_eq!(result.trace.action, "SLEEP_CUE");
    assert_eq!(harness.ai.thought_calls(), calls_before);

    let event = sleep.recv().await.unwrap();
    assert_eq!(event.request_id.as_deref(), Some("r-1"));
    assert!(matches!(
        event.payload,
        EventPayload::SleepCueDetected {
            session_id: Some(_),
            user_id: Some(_),
        }
    ));

    // Later turns whisper back without a model call
    let result = harness
        .conductor
        .process_turn("tell me more", &TurnContext::new("s1"))
        .await
        .unwrap();
    assert_eq!(result.trace.action, "ASLEEP");
    assert_eq!(harness.ai.thought_calls(), calls_before);
}

#[tokio::test]
async fn test_negated_sleep_cue_keeps_the_story_going() {
    let harness = Harness::new(ScriptedAi::new());
    start(&harness, "s1").await;
    let calls_before = harness.ai.thought_calls();

    harness.ai.push_thought(Ok(Thought::new("protest", "Alright, one more story")));
    let result = harness
        .conductor
        .process_turn("I'm not sleepy! Tell me a story", &TurnContext::new("s1"))
        .await
        .unwrap();

    assert_ne!(result.phase, SessionPhase::Asleep);
    assert_ne!(result.trace.action, "SLEEP_CUE");
    assert_eq!(result.reply, "Alright, one more story");
    assert_eq!(harness.ai.thought_calls(), calls_before + 1);

    let result = harness
        .conductor
        .process_turn("tell me about dragons", &TurnContext::new("s1"))
        .await
        .unwrap();
    assert_ne!(result.trace.action, "ASLEEP");
    assert_eq!(harness.ai.thought_calls(), calls_before + 2);
}

#[tokio::test]
async fn test_critical_alert_from_model_enters_safe_mode_then_recovers() {
    let harness = Harness::new(ScriptedAi::new());
    start(&harness, "s1").await;
    let before = harness.ai.thought_calls();

    let breach = QualityBreach::new(QualityAlert {
        metric: "ERROR_RATE".to_string(),
        current_value: 0.2,
        threshold: 0.1,
        severity: Severity::Critical,
        timestamp: 0,
    });
    harness.ai.push_thought(Err(AiError::Quality(breach)));

    let result = harness
        .conductor
        .process_turn("and then?", &TurnContext::new("s1"))
        .await
        .unwrap();

    assert_eq!(result.status, TurnStatus::Degraded);
    assert_eq!(result.trace.action, SAFE_MODE_ACTION);
    assert!(result.trace.thought.starts_with("Quality Gate Breached"));
    assert_eq!(result.trace.contextual_notes.as_deref(), Some(SAFE_MODE_NOTE));
    assert_eq!(harness.ai.thought_calls() - before, 1);

    // The condition has cleared, so the next turn runs normally
    harness.ai.push_thought(Ok(Thought::new("calm again", "The owl flew home")));
    let result = harness
        .conductor
        .process_turn("and then?", &TurnContext::new("s1"))
        .await
        .unwrap();

    assert_eq!(result.status, TurnStatus::Completed);
    assert_ne!(result.trace.action, SAFE_MODE_ACTION);
    assert!(!result.trace.is_safe_mode());
    assert_eq!(result.reply, "The owl flew home");
}

#[tokio::test]
async fn test_quality_breach_enters_safe_mode() {
    let mut thresholds = BTreeMap::new();
    thresholds.insert("LATENCY_MS".to_string(), MetricThreshold::above(0.5, 1.0));
    let harness = Harness::build(
        ScriptedAi::new().with_delay(Duration::from_millis(20)),
        Arc::new(FixedStrategy::new(CorrectionAction::Retry)),
        QualityGate::new(thresholds),
    );
    let mut safe_mode = harness.bus.subscribe(EventType::SafeModeEntered).await;

    let config = SessionConfig::new("s1", "u1");
    let result = harness.conductor.conduct_story_session(&config).await.unwrap();

    assert_eq!(result.status, TurnStatus::Degraded);
    assert!(result.trace.is_safe_mode());
    assert_eq!(result.trace.action, SAFE_MODE_ACTION);
    assert!(result.trace.thought.starts_with("Quality Gate Breached"));
    let meta = result.trace.resilience_meta.as_ref().unwrap();
    assert_eq!(meta.failure_encountered, FailureKind::QualityBreach);
    assert_eq!(meta.correction_attempted, CorrectionAction::DegradeService);

    // A breach is never retried
    assert_eq!(harness.ai.thought_calls(), 1);
    assert!(safe_mode.recv().await.is_some());
}

#[tokio::test]
async fn test_schema_drift_self_corrects() {
    let harness = Harness::new(ScriptedAi::new());
    start(&harness, "s1").await;

    harness
        .ai
        .push_thought(Err(AiError::Schema("missing reply".to_string())));
    harness.ai.push_thought(Ok(Thought::new("fixed", "Here we go")));

    let result = harness
        .conductor
        .process_turn("a story please", &TurnContext::new("s1"))
        .await
        .unwrap();

    assert_eq!(result.status, TurnStatus::Completed);
    assert_eq!(result.reply, "Here we go");
    let meta = result.trace.resilience_meta.as_ref().unwrap();
    assert_eq!(meta.failure_encountered, FailureKind::SchemaDrift);
    assert_eq!(meta.correction_attempted, CorrectionAction::SelfCorrect);

    let requests = harness.ai.requests.lock().unwrap();
    let retry = requests.last().unwrap();
    assert!(retry.flag("strictSchema"));
}

#[tokio::test]
async fn test_transient_failures_exhaust_into_safe_mode() {
    let harness = Harness::build(
        ScriptedAi::new(),
        Arc::new(FixedStrategy::new(CorrectionAction::Retry)),
        QualityGate::default(),
    );
    start(&harness, "s1").await;
    let before = harness.ai.thought_calls();

    for _ in 0..5 {
        harness.ai.push_thought(Err(AiError::Timeout));
    }

    let result = harness
        .conductor
        .process_turn("and then?", &TurnContext::new("s1"))
        .await
        .unwrap();

    assert_eq!(result.status, TurnStatus::Degraded);
    assert!(result.trace.is_safe_mode());
    let meta = result.trace.resilience_meta.as_ref().unwrap();
    assert_eq!(meta.failure_encountered, FailureKind::NetworkTimeout);
    assert_eq!(meta.correction_attempted, CorrectionAction::DegradeService);
    // Default cap is three calls per turn
    assert_eq!(harness.ai.thought_calls() - before, 3);
}

#[tokio::test]
async fn test_abort_leaves_state_untouched() {
    let harness = Harness::build(
        ScriptedAi::new(),
        Arc::new(FixedStrategy::new(CorrectionAction::Abort)),
        QualityGate::default(),
    );
    start(&harness, "s1").await;
    let before = harness.sessions.snapshot("s1").unwrap();
    let writes = harness.sessions.writes.load(Ordering::SeqCst);

    harness
        .ai
        .push_thought(Err(AiError::Auth("bad key".to_string())));
    let result = harness
        .conductor
        .process_turn("owls please", &TurnContext::new("s1"))
        .await
        .unwrap();

    assert_eq!(result.status, TurnStatus::Failed);
    assert_eq!(result.trace.action, "ABORT");
    assert_eq!(result.reply, prompts::abort_reply());
    assert_eq!(result.phase, before.phase());
    assert_eq!(harness.sessions.snapshot("s1").unwrap(), before);
    assert_eq!(harness.sessions.writes.load(Ordering::SeqCst), writes);
    assert_eq!(harness.traces.actions().last().map(String::as_str), Some("ABORT"));
}

#[tokio::test]
async fn test_fallback_serves_phase_reply() {
    let harness = Harness::build(
        ScriptedAi::new(),
        Arc::new(FixedStrategy::new(CorrectionAction::Fallback)),
        QualityGate::default(),
    );
    start(&harness, "s1").await;

    harness
        .ai
        .push_thought(Err(AiError::Safety("blocked".to_string())));
    let result = harness
        .conductor
        .process_turn("something scary", &TurnContext::new("s1"))
        .await
        .unwrap();

    assert_eq!(result.status, TurnStatus::Degraded);
    assert_eq!(result.trace.action, "FALLBACK");
    assert_eq!(result.reply, prompts::fallback_reply(SessionPhase::Onboarding));
}

#[tokio::test]
async fn test_golden_moment_is_remembered_when_approved() {
    let harness = Harness::new(ScriptedAi::new());
    start(&harness, "s1").await;

    harness.ai.push_structured(Ok(json!({
        "approved": true,
        "reason": "warm and safe",
        "confidence": 0.95
    })));

    let verdict = harness
        .conductor
        .capture_golden_moment("s1", "She named the owl Professor Hoot", Some("t-9"))
        .await
        .unwrap();

    assert!(verdict.approved);
    let semantic = harness.memory.of_kind(MemoryKind::Semantic);
    assert_eq!(semantic.len(), 1);
    assert_eq!(semantic[0].metadata["goldenMoment"], json!(true));
    assert_eq!(semantic[0].metadata["traceId"], json!("t-9"));
}

#[tokio::test]
async fn test_suggestions_are_filtered_and_limited() {
    let harness = Harness::new(ScriptedAi::new());
    harness.memory.seed(
        "u1",
        "s0",
        MemoryKind::Semantic,
        "Loves owls",
        json!({}),
    );
    harness.ai.push_structured(Ok(json!({
        "suggestions": [
            {"title": "The Owl Library", "theme": "owls", "reasoning": "She loves owls", "confidence": 1.4},
            {"title": "No Reason", "theme": "cats", "reasoning": "", "confidence": 0.9},
            {"title": "Moon Boat", "theme": "sea", "reasoning": "Calm imagery", "confidence": 0.6}
        ]
    })));

    let context = somnus_engine::conductor::SuggestionContext {
        user_id: "u1".to_string(),
        limit: Some(5),
        ..Default::default()
    };
    let suggestions = harness.conductor.generate_suggestions(&context).await;

    let titles: Vec<_> = suggestions.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["The Owl Library", "Moon Boat"]);
    assert_eq!(suggestions[0].confidence, 1.0);

    let requests = harness.ai.requests.lock().unwrap();
    assert!(requests[0].user_prompt.contains("Loves owls"));
}
