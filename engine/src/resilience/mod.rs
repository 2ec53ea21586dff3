//! Failure classification and recovery planning
//!
//! Every failure raised by the AI capability is classified into one of the
//! closed [`FailureKind`]s and handed to a [`ResilienceStrategy`], which
//! decides what to do next. The strategy is a replaceable port; the consumption
//! protocol (attempt counting, cost accumulation, plan execution) lives in the
//! conductor and in [`ledger::RecoveryLedger`].

use async_trait::async_trait;
use sdk::errors::AiError;
use sdk::types::{CorrectionPlan, FailureKind, ResilienceEvent};

pub mod ledger;
pub mod policy;

pub use ledger::RecoveryLedger;
pub use policy::DefaultResiliencePolicy;

/// Decides how to recover from a classified failure
#[async_trait]
pub trait ResilienceStrategy: Send + Sync {
    /// Produce a correction plan for the failure described by `event`
    async fn plan(&self, event: &ResilienceEvent) -> CorrectionPlan;
}

/// Classify an AI error by its shape
///
/// Typed variants map directly. Untyped `Other` errors fall back to message
/// heuristics so providers that only surface text are still classifiable.
pub fn classify(error: &AiError) -> FailureKind {
    match error {
        AiError::Timeout | AiError::Network(_) => FailureKind::NetworkTimeout,
        AiError::RateLimited => FailureKind::ApiRateLimit,
        AiError::Auth(_) => FailureKind::ApiAuthError,
        AiError::BadRequest(_) => FailureKind::ApiBadRequest,
        AiError::Server { .. } => FailureKind::ApiServerError,
        AiError::Schema(_) => FailureKind::SchemaDrift,
        AiError::Safety(_) => FailureKind::SafetyViolation,
        AiError::TokenLimit(_) => FailureKind::TokenLimit,
        AiError::Quality(_) => FailureKind::QualityBreach,
        AiError::Other(message) => classify_message(message),
    }
}

fn classify_message(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["timeout", "timed out", "connection reset", "econnreset"]) {
        FailureKind::NetworkTimeout
    } else if has(&["429", "rate limit", "quota", "resource_exhausted"]) {
        FailureKind::ApiRateLimit
    } else if has(&["401", "403", "unauthorized", "api key", "permission denied"]) {
        FailureKind::ApiAuthError
    } else if has(&["safety", "blocked"]) {
        FailureKind::SafetyViolation
    } else if has(&["token limit", "max_tokens", "max tokens", "context length", "too long"]) {
        FailureKind::TokenLimit
    } else if has(&["json", "schema", "parse"]) {
        FailureKind::SchemaDrift
    } else if has(&["500", "502", "503", "504", "internal", "unavailable"]) {
        FailureKind::ApiServerError
    } else if has(&["400", "invalid argument", "bad request"]) {
        FailureKind::ApiBadRequest
    } else {
        FailureKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::errors::QualityBreach;
    use sdk::types::{QualityAlert, Severity};

    #[test]
    fn test_typed_errors_classify_directly() {
        assert_eq!(classify(&AiError::Timeout), FailureKind::NetworkTimeout);
        assert_eq!(classify(&AiError::RateLimited), FailureKind::ApiRateLimit);
        assert_eq!(
            classify(&AiError::Auth("bad key".to_string())),
            FailureKind::ApiAuthError
        );
        assert_eq!(
            classify(&AiError::Server {
                status: 503,
                message: "overloaded".to_string()
            }),
            FailureKind::ApiServerError
        );
        assert_eq!(
            classify(&AiError::Schema("missing reply".to_string())),
            FailureKind::SchemaDrift
        );
        assert_eq!(
            classify(&AiError::TokenLimit("MAX_TOKENS".to_string())),
            FailureKind::TokenLimit
        );
    }

    #[test]
    fn test_quality_breach_classification() {
        let breach = QualityBreach::new(QualityAlert {
            metric: "LATENCY_MS".to_string(),
            current_value: 5000.0,
            threshold: 3000.0,
            severity: Severity::Critical,
            timestamp: 0,
        });
        assert_eq!(classify(&AiError::from(breach)), FailureKind::QualityBreach);
    }

    #[test]
    fn test_message_heuristics() {
        let kind = |m: &str| classify(&AiError::Other(m.to_string()));

        assert_eq!(kind("request timed out after 30s"), FailureKind::NetworkTimeout);
        assert_eq!(kind("RESOURCE_EXHAUSTED: quota"), FailureKind::ApiRateLimit);
        assert_eq!(kind("Unexpected token in JSON"), FailureKind::SchemaDrift);
        assert_eq!(kind("context length exceeded"), FailureKind::TokenLimit);
        assert_eq!(kind("could not parse response"), FailureKind::SchemaDrift);
        assert_eq!(kind("503 Service Unavailable"), FailureKind::ApiServerError);
        assert_eq!(kind("something odd"), FailureKind::Unknown);
    }
}
