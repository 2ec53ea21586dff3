//! Quality gate
//!
//! Stateless, synchronous evaluation of named metrics against two-tier
//! thresholds. Each metric has a `warn` and a `critical` threshold and a
//! breach direction:
//!
//! - **above**: breach when the value exceeds the threshold (latency, error rate)
//! - **below**: breach when the value falls under the threshold (completion rate)
//!
//! A WARNING alert is logged and handed back to the caller. A CRITICAL alert
//! is returned as a [`QualityBreach`] error, which is how quality enforcement
//! turns into a control-flow event. Unknown metrics are ignored so callers can
//! report metrics ahead of their configuration.

use sdk::errors::QualityBreach;
use sdk::helpers::now_millis;
use sdk::types::{QualityAlert, Severity};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::{default_metrics, Direction, MetricThreshold, QualityConfig};

/// Metric names reported by the engine
pub mod metrics {
    /// Wall-clock duration of one AI call
    pub const LATENCY_MS: &str = "LATENCY_MS";
    /// Share of failed AI calls
    pub const ERROR_RATE: &str = "ERROR_RATE";
    /// User completion rate
    pub const UCR: &str = "UCR";
    /// Mean time to human intervention, in minutes
    pub const MTTH: &str = "MTTH";
}

/// Threshold evaluator
#[derive(Debug, Clone)]
pub struct QualityGate {
    thresholds: BTreeMap<String, MetricThreshold>,
}

impl QualityGate {
    /// Create a gate from a threshold table
    pub fn new(thresholds: BTreeMap<String, MetricThreshold>) -> Self {
        Self { thresholds }
    }

    /// Create a gate from the `[quality]` config section
    pub fn from_config(config: &QualityConfig) -> Self {
        Self::new(config.metrics.clone())
    }

    /// Threshold row for a metric, if configured
    pub fn threshold(&self, metric: &str) -> Option<&MetricThreshold> {
        self.thresholds.get(metric)
    }

    /// Evaluate a metric value
    ///
    /// Returns `Ok(None)` when the value is within bounds or the metric is
    /// unknown, `Ok(Some(alert))` for a WARNING and `Err(QualityBreach)` for a
    /// CRITICAL alert. Critical is checked before warn; comparisons are strict.
    pub fn check_metric(&self, metric: &str, value: f64) -> Result<Option<QualityAlert>, QualityBreach> {
        let Some(threshold) = self.thresholds.get(metric) else {
            debug!("Ignoring unknown metric {}", metric);
            return Ok(None);
        };

        let breaches = |limit: f64| match threshold.direction {
            Direction::Above => value > limit,
            Direction::Below => value < limit,
        };

        if breaches(threshold.critical) {
            return Err(QualityBreach::new(QualityAlert {
                metric: metric.to_string(),
                current_value: value,
                threshold: threshold.critical,
                severity: Severity::Critical,
                timestamp: now_millis(),
            }));
        }

        if breaches(threshold.warn) {
            warn!(
                metric = metric,
                value = value,
                threshold = threshold.warn,
                "Quality metric crossed warning threshold"
            );
            return Ok(Some(QualityAlert {
                metric: metric.to_string(),
                current_value: value,
                threshold: threshold.warn,
                severity: Severity::Warning,
                timestamp: now_millis(),
            }));
        }

        Ok(None)
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(default_metrics())
    }
}
