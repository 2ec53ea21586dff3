//! Integration tests for the verification pipeline

mod common;

use common::{RecordingReview, ScriptedAi};
use sdk::errors::AiError;
use sdk::types::{VerifiableContent, VerificationStage};
use serde_json::json;
use std::sync::Arc;

use somnus_engine::config::Config;
use somnus_engine::verification::VerificationPipeline;

fn pipeline(ai: Arc<ScriptedAi>, review: Arc<RecordingReview>) -> VerificationPipeline {
    VerificationPipeline::new(ai, review, Config::default_config().verification)
}

fn moment(text: &str) -> VerifiableContent {
    VerifiableContent::new("golden_moment", json!({ "description": text }))
}

#[tokio::test]
async fn test_short_content_is_rejected_by_rule() {
    let ai = Arc::new(ScriptedAi::new());
    let review = Arc::new(RecordingReview::default());

    let result = pipeline(Arc::clone(&ai), Arc::clone(&review))
        .verify(&moment("123456789"))
        .await;

    assert!(!result.approved);
    assert_eq!(result.stage, VerificationStage::Rule);
    assert_eq!(ai.structured_calls(), 0);
    assert_eq!(review.len(), 0);
}

#[tokio::test]
async fn test_confident_model_approves() {
    let ai = Arc::new(ScriptedAi::new());
    ai.push_structured(Ok(json!({"approved": true, "reason": "lovely", "confidence": 0.95})));
    let review = Arc::new(RecordingReview::default());

    let result = pipeline(Arc::clone(&ai), Arc::clone(&review))
        .verify(&moment("He hugged the stuffed bear goodnight"))
        .await;

    assert!(result.approved);
    assert_eq!(result.stage, VerificationStage::Model);
    assert_eq!(result.confidence, 0.95);
    assert_eq!(review.len(), 0);
}

#[tokio::test]
async fn test_model_rejection_is_final() {
    let ai = Arc::new(ScriptedAi::new());
    ai.push_structured(Ok(json!({"approved": false, "reason": "scary", "confidence": 0.9})));
    let review = Arc::new(RecordingReview::default());

    let result = pipeline(ai, Arc::clone(&review))
        .verify(&moment("The monster under the bed roared"))
        .await;

    assert!(!result.approved);
    assert_eq!(result.stage, VerificationStage::Model);
    assert_eq!(review.len(), 0);
}

#[tokio::test]
async fn test_uncertain_approval_goes_to_human_review() {
    let ai = Arc::new(ScriptedAi::new());
    ai.push_structured(Ok(json!({"approved": true, "reason": "probably fine", "confidence": 0.6})));
    let review = Arc::new(RecordingReview::default());

    let result = pipeline(ai, Arc::clone(&review))
        .verify(&moment("She whispered a secret to the moon"))
        .await;

    assert!(!result.approved);
    assert_eq!(result.stage, VerificationStage::Human);
    assert_eq!(review.len(), 1);
    let items = review.items.lock().unwrap();
    assert_eq!(items[0].confidence, 0.6);
    assert_eq!(items[0].item.content_type, "golden_moment");
}

#[tokio::test]
async fn test_model_failure_escalates_with_zero_confidence() {
    let ai = Arc::new(ScriptedAi::new());
    ai.push_structured(Err(AiError::Timeout));
    let review = Arc::new(RecordingReview::default());

    let result = pipeline(ai, Arc::clone(&review))
        .verify(&moment("They counted sheep together"))
        .await;

    assert!(!result.approved);
    assert_eq!(result.stage, VerificationStage::Human);
    assert_eq!(result.confidence, 0.0);
    assert_eq!(review.len(), 1);
}
