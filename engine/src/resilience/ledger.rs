//! Attempt and cost bookkeeping for one logical call chain

use sdk::types::{FailureKind, ResilienceEvent};
use serde_json::Value;
use std::time::Duration;

use crate::config::ResilienceConfig;

/// Running ledger of one retry chain
///
/// `attempt` only ever increases and `cost_so_far` never decreases; negative
/// or non-finite charges are ignored.
#[derive(Debug, Clone)]
pub struct RecoveryLedger {
    attempt: u32,
    cost_so_far: f64,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl RecoveryLedger {
    pub fn new(config: &ResilienceConfig) -> Self {
        Self {
            attempt: 1,
            cost_so_far: 0.0,
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Number of the attempt currently in flight, starting at 1
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn cost_so_far(&self) -> f64 {
        self.cost_so_far
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another model call is allowed in this chain
    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Record the estimated spend of one call
    pub fn charge(&mut self, cost: f64) {
        if cost.is_finite() && cost > 0.0 {
            self.cost_so_far += cost;
        }
    }

    /// Move on to the next attempt
    pub fn advance(&mut self) {
        self.attempt = self.attempt.saturating_add(1);
    }

    /// Build the event handed to the resilience strategy
    pub fn event(&self, kind: FailureKind, context: Value) -> ResilienceEvent {
        ResilienceEvent {
            kind,
            context,
            attempt: self.attempt,
            cost_so_far: self.cost_so_far,
        }
    }

    /// Exponential delay before the retry that follows the current attempt
    ///
    /// `base * 2^(attempt - 1)`, capped at the configured maximum.
    pub fn backoff_delay(&self) -> Duration {
        let exponent = self.attempt.saturating_sub(1).min(16);
        let delay = self.backoff_base.saturating_mul(1u32 << exponent);
        delay.min(self.backoff_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> ResilienceConfig {
        ResilienceConfig {
            max_attempts: 3,
            backoff_base_ms: 100,
            backoff_max_ms: 350,
            ..ResilienceConfig::default()
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_bounded() {
        let mut ledger = RecoveryLedger::new(&config());
        assert_eq!(ledger.backoff_delay(), Duration::from_millis(100));
        ledger.advance();
        assert_eq!(ledger.backoff_delay(), Duration::from_millis(200));
        ledger.advance();
        assert_eq!(ledger.backoff_delay(), Duration::from_millis(350));
    }

    #[test]
    fn test_attempt_cap() {
        let mut ledger = RecoveryLedger::new(&config());
        assert!(ledger.can_retry());
        ledger.advance();
        assert!(ledger.can_retry());
        ledger.advance();
        assert!(!ledger.can_retry());
        assert_eq!(ledger.attempt(), 3);
    }

    #[test]
    fn test_cost_never_decreases() {
        let mut ledger = RecoveryLedger::new(&config());
        ledger.charge(0.01);
        ledger.charge(-5.0);
        ledger.charge(f64::NAN);
        ledger.charge(0.02);
        assert!((ledger.cost_so_far() - 0.03).abs() < 1e-12);

        let event = ledger.event(FailureKind::ApiRateLimit, json!({"phase": "STORYTELLING"}));
        assert_eq!(event.attempt, 1);
        assert_eq!(event.cost_so_far, ledger.cost_so_far());
    }
}
