//! Default recovery policy
//!
//! A rule table over failure kinds, guarded by the attempt cap and the cost
//! ceiling. Once either is exhausted every failure degrades to the zero-cost
//! edge tier.

use async_trait::async_trait;
use sdk::types::{CorrectionAction, CorrectionPlan, FailureKind, ModelTier, ResilienceEvent};
use serde_json::json;
use tracing::debug;

use super::ResilienceStrategy;
use crate::config::ResilienceConfig;

/// Rule-based [`ResilienceStrategy`]
#[derive(Debug, Clone)]
pub struct DefaultResiliencePolicy {
    config: ResilienceConfig,
    primary_tier: ModelTier,
}

impl DefaultResiliencePolicy {
    pub fn new(config: ResilienceConfig, primary_tier: ModelTier) -> Self {
        Self {
            config,
            primary_tier,
        }
    }

    fn cost(&self, tier: ModelTier) -> f64 {
        self.config.tier_cost(tier)
    }

    fn degrade(&self) -> CorrectionPlan {
        CorrectionPlan::new(CorrectionAction::DegradeService, ModelTier::Edge, 0.0)
    }

    /// Plan for a failure kind, ignoring the attempt cap and the cost ceiling
    fn rule(&self, kind: FailureKind) -> CorrectionPlan {
        match kind {
            FailureKind::NetworkTimeout
            | FailureKind::ApiRateLimit
            | FailureKind::ApiServerError
            | FailureKind::Unknown => CorrectionPlan::new(
                CorrectionAction::Retry,
                self.primary_tier,
                self.cost(self.primary_tier),
            ),
            FailureKind::SchemaDrift => CorrectionPlan::new(
                CorrectionAction::SelfCorrect,
                self.primary_tier,
                self.cost(self.primary_tier),
            )
            .with_parameter("strictSchema", json!(true))
            .with_parameter("temperature", json!(0.0)),
            FailureKind::TokenLimit => CorrectionPlan::new(
                CorrectionAction::SelfCorrect,
                ModelTier::Pro,
                self.cost(ModelTier::Pro),
            )
            .with_parameter("truncateHistory", json!(true)),
            FailureKind::SafetyViolation => {
                CorrectionPlan::new(CorrectionAction::Fallback, ModelTier::Edge, 0.0)
            }
            FailureKind::ApiAuthError | FailureKind::ApiBadRequest => {
                CorrectionPlan::new(CorrectionAction::Abort, self.primary_tier, 0.0)
            }
            FailureKind::QualityBreach => self.degrade(),
        }
    }
}

#[async_trait]
impl ResilienceStrategy for DefaultResiliencePolicy {
    async fn plan(&self, event: &ResilienceEvent) -> CorrectionPlan {
        let ceiling = self.config.cost_ceiling_usd;
        let attempts_spent = event.attempt >= self.config.max_attempts;

        let plan = if attempts_spent || event.cost_so_far >= ceiling {
            self.degrade()
        } else {
            let candidate = self.rule(event.kind);
            // The next call must fit under the ceiling too
            if event.cost_so_far + candidate.estimated_cost > ceiling {
                self.degrade()
            } else {
                candidate
            }
        };

        debug!(
            kind = %event.kind,
            attempt = event.attempt,
            cost_so_far = event.cost_so_far,
            action = %plan.action,
            "Correction plan selected"
        );

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn policy() -> DefaultResiliencePolicy {
        DefaultResiliencePolicy::new(ResilienceConfig::default(), ModelTier::Flash)
    }

    fn event(kind: FailureKind, attempt: u32, cost_so_far: f64) -> ResilienceEvent {
        ResilienceEvent {
            kind,
            context: Value::Null,
            attempt,
            cost_so_far,
        }
    }

    #[tokio::test]
    async fn test_transient_failures_retry() {
        let plan = policy().plan(&event(FailureKind::ApiRateLimit, 1, 0.0)).await;
        assert_eq!(plan.action, CorrectionAction::Retry);
        assert_eq!(plan.model, ModelTier::Flash);
    }

    #[tokio::test]
    async fn test_schema_drift_self_corrects_strictly() {
        let plan = policy().plan(&event(FailureKind::SchemaDrift, 1, 0.0)).await;
        assert_eq!(plan.action, CorrectionAction::SelfCorrect);
        assert_eq!(plan.parameters["strictSchema"], json!(true));
        assert_eq!(plan.parameters["temperature"], json!(0.0));
    }

    #[tokio::test]
    async fn test_auth_errors_abort() {
        let plan = policy().plan(&event(FailureKind::ApiAuthError, 1, 0.0)).await;
        assert_eq!(plan.action, CorrectionAction::Abort);
    }

    #[tokio::test]
    async fn test_exhausted_budget_degrades_to_edge() {
        let plan = policy().plan(&event(FailureKind::NetworkTimeout, 1, 1.0)).await;
        assert_eq!(plan.action, CorrectionAction::DegradeService);
        assert_eq!(plan.model, ModelTier::Edge);
        assert_eq!(plan.estimated_cost, 0.0);

        let plan = policy().plan(&event(FailureKind::NetworkTimeout, 3, 0.0)).await;
        assert_eq!(plan.action, CorrectionAction::DegradeService);
    }

    #[tokio::test]
    async fn test_retry_that_would_cross_the_ceiling_degrades() {
        // 0.0496 spent, one more flash call (0.0005) would overshoot 0.05
        let plan = policy().plan(&event(FailureKind::ApiServerError, 1, 0.0496)).await;
        assert_eq!(plan.action, CorrectionAction::DegradeService);
        assert_eq!(plan.model, ModelTier::Edge);

        let plan = policy().plan(&event(FailureKind::ApiServerError, 1, 0.0490)).await;
        assert_eq!(plan.action, CorrectionAction::Retry);

        // Token limit escalates to pro, which costs 0.005
        let plan = policy().plan(&event(FailureKind::TokenLimit, 1, 0.046)).await;
        assert_eq!(plan.action, CorrectionAction::DegradeService);
    }

    #[tokio::test]
    async fn test_zero_cost_plans_ignore_the_remaining_budget() {
        let plan = policy().plan(&event(FailureKind::SafetyViolation, 1, 0.0499)).await;
        assert_eq!(plan.action, CorrectionAction::Fallback);
    }

    #[tokio::test]
    async fn test_quality_breach_degrades() {
        let plan = policy().plan(&event(FailureKind::QualityBreach, 1, 0.0)).await;
        assert_eq!(plan.action, CorrectionAction::DegradeService);
    }
}
