//! Verification pipeline
//!
//! Three stages of increasing cost, run in order and short-circuiting on the
//! first decisive one:
//!
//! 1. **RULE**: deterministic checks (content type, length bounds). A failure
//!    rejects without touching the AI capability.
//! 2. **MODEL**: a structured `{approved, reason, confidence}` judgment.
//! 3. **HUMAN**: an approval below the acceptance threshold is never granted;
//!    it is enqueued for review and reported as `{approved: false, stage: HUMAN}`.

use sdk::capability::{AiCapability, HumanReviewSink, PromptRequest};
use sdk::helpers::clamp_unit;
use sdk::types::{ReviewItem, VerifiableContent, VerificationResult};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::conductor::prompts;
use crate::config::VerificationConfig;

/// Judgment returned by the MODEL stage
#[derive(Debug, Deserialize)]
struct ModelJudgment {
    approved: bool,
    #[serde(default)]
    reason: String,
    confidence: f64,
}

pub struct VerificationPipeline {
    ai: Arc<dyn AiCapability>,
    review: Arc<dyn HumanReviewSink>,
    config: VerificationConfig,
}

impl VerificationPipeline {
    pub fn new(
        ai: Arc<dyn AiCapability>,
        review: Arc<dyn HumanReviewSink>,
        config: VerificationConfig,
    ) -> Self {
        Self { ai, review, config }
    }

    /// Run the pipeline on one item
    ///
    /// Never fails: model errors escalate to human review with zero confidence.
    pub async fn verify(&self, content: &VerifiableContent) -> VerificationResult {
        if let Err(reason) = self.check_rules(content) {
            debug!(content_type = %content.content_type, "Rejected by rule: {}", reason);
            return VerificationResult::rejected_by_rule(reason);
        }

        let request = PromptRequest::new(
            prompts::verification_system_prompt(),
            prompts::verification_prompt(content),
        )
        .with_tier(self.config.tier);

        let judgment = match self
            .ai
            .generate_structured(&prompts::verification_schema(), &request)
            .await
        {
            Ok(value) => match serde_json::from_value::<ModelJudgment>(value) {
                Ok(judgment) => judgment,
                Err(e) => {
                    return self
                        .escalate(content, 0.0, format!("Unreadable model judgment: {}", e))
                        .await;
                }
            },
            Err(e) => {
                warn!("Model verification failed: {}", e);
                return self
                    .escalate(content, 0.0, format!("Model verification unavailable: {}", e))
                    .await;
            }
        };

        let confidence = clamp_unit(judgment.confidence);

        if !judgment.approved {
            info!(content_type = %content.content_type, "Rejected by model: {}", judgment.reason);
            return VerificationResult::decided_by_model(false, confidence, judgment.reason);
        }

        if confidence < self.config.acceptance_threshold {
            return self.escalate(content, confidence, judgment.reason).await;
        }

        VerificationResult::decided_by_model(true, confidence, judgment.reason)
    }

    /// Deterministic checks; returns the rejection reason
    fn check_rules(&self, content: &VerifiableContent) -> Result<(), String> {
        if content.content_type.trim().is_empty() {
            return Err("Content type is missing".to_string());
        }

        let text = content
            .primary_text()
            .ok_or_else(|| "Content has no text to verify".to_string())?;
        let length = text.trim().chars().count();

        if length < self.config.min_length {
            return Err(format!(
                "Content is too short ({} < {} characters)",
                length, self.config.min_length
            ));
        }
        if length > self.config.max_length {
            return Err(format!(
                "Content is too long ({} > {} characters)",
                length, self.config.max_length
            ));
        }

        Ok(())
    }

    async fn escalate(
        &self,
        content: &VerifiableContent,
        confidence: f64,
        reason: String,
    ) -> VerificationResult {
        let item = ReviewItem {
            item: content.clone(),
            reason: reason.clone(),
            confidence,
        };

        if let Err(e) = self.review.enqueue(item).await {
            warn!("Failed to enqueue item for human review: {}", e);
        } else {
            info!(
                content_type = %content.content_type,
                confidence = confidence,
                "Escalated to human review"
            );
        }

        VerificationResult::escalated(confidence, reason)
    }
}
