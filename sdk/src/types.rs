//! Shared domain types
//!
//! Value types exchanged between the orchestration core and its collaborators.
//! Field names serialize in camelCase so stored records and logs keep the
//! vocabulary used by the rest of the product.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Trace action reserved for the degraded safe-mode pseudo-state
pub const SAFE_MODE_ACTION: &str = "SAFE_MODE";

/// Contextual note attached to every safe-mode trace
pub const SAFE_MODE_NOTE: &str = "Safe Mode active.";

// ---------------------------------------------------------------------------
// Reasoning traces
// ---------------------------------------------------------------------------

/// One decision step of the conductor
///
/// Traces are immutable once created and appended to the trace log for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningTrace {
    pub id: String,
    pub goals_considered: Vec<String>,
    pub conflict_detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts_identified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_off_made: Option<String>,
    pub thought: String,
    pub action: String,
    pub confidence: f64,
    /// Unix milliseconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contextual_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resilience_meta: Option<ResilienceMeta>,
}

impl ReasoningTrace {
    /// Whether this trace records a safe-mode degradation
    pub fn is_safe_mode(&self) -> bool {
        self.action == SAFE_MODE_ACTION
    }
}

/// Recovery bookkeeping attached to a trace produced after a failure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResilienceMeta {
    pub failure_encountered: FailureKind,
    pub correction_attempted: CorrectionAction,
    pub recovery_cost_usd: f64,
}

/// Structured output of one reasoning step, as returned by the AI capability
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Thought {
    pub thought: String,
    pub reply: String,
    #[serde(default = "default_thought_action")]
    pub action: String,
    #[serde(default)]
    pub goals_considered: Vec<String>,
    #[serde(default)]
    pub conflict_detected: bool,
    #[serde(default)]
    pub conflicts_identified: Option<String>,
    #[serde(default)]
    pub trade_off_made: Option<String>,
    #[serde(default = "default_thought_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub emotional_tone: Option<f64>,
    /// The model judged the current agenda goal as reached
    #[serde(default)]
    pub goal_complete: bool,
    #[serde(default)]
    pub contextual_notes: Option<String>,
}

fn default_thought_action() -> String {
    "CONTINUE".to_string()
}

fn default_thought_confidence() -> f64 {
    0.5
}

impl Thought {
    /// Create a thought with the given rationale and reply and neutral defaults
    pub fn new(thought: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            thought: thought.into(),
            reply: reply.into(),
            action: default_thought_action(),
            goals_considered: Vec::new(),
            conflict_detected: false,
            conflicts_identified: None,
            trade_off_made: None,
            confidence: default_thought_confidence(),
            emotional_tone: None,
            goal_complete: false,
            contextual_notes: None,
        }
    }
}

/// A proactive story suggestion with visible reasoning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: String,
    pub title: String,
    pub theme: String,
    pub reasoning: String,
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// Quality
// ---------------------------------------------------------------------------

/// Severity of a quality alert
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "WARNING"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Transient value produced when a metric crosses a threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualityAlert {
    pub metric: String,
    pub current_value: f64,
    pub threshold: f64,
    pub severity: Severity,
    /// Unix milliseconds
    pub timestamp: i64,
}

// ---------------------------------------------------------------------------
// Resilience
// ---------------------------------------------------------------------------

/// Closed set of failure kinds the resilience layer reasons about
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    NetworkTimeout,
    SchemaDrift,
    SafetyViolation,
    TokenLimit,
    ApiRateLimit,
    ApiAuthError,
    ApiServerError,
    ApiBadRequest,
    QualityBreach,
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NetworkTimeout => "NETWORK_TIMEOUT",
            FailureKind::SchemaDrift => "SCHEMA_DRIFT",
            FailureKind::SafetyViolation => "SAFETY_VIOLATION",
            FailureKind::TokenLimit => "TOKEN_LIMIT",
            FailureKind::ApiRateLimit => "API_RATE_LIMIT",
            FailureKind::ApiAuthError => "API_AUTH_ERROR",
            FailureKind::ApiServerError => "API_SERVER_ERROR",
            FailureKind::ApiBadRequest => "API_BAD_REQUEST",
            FailureKind::QualityBreach => "QUALITY_BREACH",
            FailureKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model tier a request is routed to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    #[default]
    Flash,
    Pro,
    /// Local execution with zero marginal cost
    Edge,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Flash => "flash",
            ModelTier::Pro => "pro",
            ModelTier::Edge => "edge",
        }
    }

    /// Whether calls on this tier carry no marginal cost
    pub fn is_zero_cost(&self) -> bool {
        matches!(self, ModelTier::Edge)
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModelTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flash" => Ok(ModelTier::Flash),
            "pro" => Ok(ModelTier::Pro),
            "edge" => Ok(ModelTier::Edge),
            other => Err(format!("unknown model tier '{other}'")),
        }
    }
}

/// Input to failure-recovery decision making
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResilienceEvent {
    pub kind: FailureKind,
    pub context: Value,
    /// Monotonically increasing within one logical call chain, starting at 1
    pub attempt: u32,
    /// Cumulative USD-equivalent spend of the chain; never decreases
    pub cost_so_far: f64,
}

/// Recovery action chosen by a resilience strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrectionAction {
    Retry,
    SelfCorrect,
    Fallback,
    Abort,
    DegradeService,
}

impl fmt::Display for CorrectionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CorrectionAction::Retry => "RETRY",
            CorrectionAction::SelfCorrect => "SELF_CORRECT",
            CorrectionAction::Fallback => "FALLBACK",
            CorrectionAction::Abort => "ABORT",
            CorrectionAction::DegradeService => "DEGRADE_SERVICE",
        };
        f.write_str(label)
    }
}

/// Decision returned by a resilience strategy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionPlan {
    pub action: CorrectionAction,
    pub model: ModelTier,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub estimated_cost: f64,
}

impl CorrectionPlan {
    pub fn new(action: CorrectionAction, model: ModelTier, estimated_cost: f64) -> Self {
        Self {
            action,
            model,
            parameters: Map::new(),
            estimated_cost,
        }
    }

    /// Add a parameter to the plan
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Stage of the verification pipeline that produced a decision
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStage {
    Rule,
    Model,
    Human,
}

impl fmt::Display for VerificationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationStage::Rule => write!(f, "RULE"),
            VerificationStage::Model => write!(f, "MODEL"),
            VerificationStage::Human => write!(f, "HUMAN"),
        }
    }
}

/// Content submitted for verification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableContent {
    /// Content type tag, e.g. `golden_moment`
    pub content_type: String,
    pub payload: Value,
    #[serde(default)]
    pub metadata: Value,
}

impl VerifiableContent {
    pub fn new(content_type: impl Into<String>, payload: Value) -> Self {
        Self {
            content_type: content_type.into(),
            payload,
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// The human-readable text the rules are applied to
    ///
    /// A string payload is used as-is; an object payload contributes its
    /// `description`, `text` or `content` field, in that order.
    pub fn primary_text(&self) -> Option<&str> {
        match &self.payload {
            Value::String(text) => Some(text.as_str()),
            Value::Object(map) => ["description", "text", "content"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str)),
            _ => None,
        }
    }
}

/// Outcome of the verification pipeline
///
/// A HUMAN-stage result is never approved: it records a pending escalation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub approved: bool,
    pub stage: VerificationStage,
    pub confidence: f64,
    pub reason: String,
}

impl VerificationResult {
    pub fn rejected_by_rule(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            stage: VerificationStage::Rule,
            confidence: 1.0,
            reason: reason.into(),
        }
    }

    pub fn decided_by_model(approved: bool, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            approved,
            stage: VerificationStage::Model,
            confidence,
            reason: reason.into(),
        }
    }

    pub fn escalated(confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            stage: VerificationStage::Human,
            confidence,
            reason: reason.into(),
        }
    }
}

/// Item handed to the human review sink
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub item: VerifiableContent,
    pub reason: String,
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// Kind of agent memory
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryKind {
    /// Raw, turn-level conversational record
    Episodic,
    /// Consolidated fact derived from episodic records
    Semantic,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Episodic => "EPISODIC",
            MemoryKind::Semantic => "SEMANTIC",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EPISODIC" => Some(MemoryKind::Episodic),
            "SEMANTIC" => Some(MemoryKind::Semantic),
            _ => None,
        }
    }
}

/// Scope a memory belongs to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryContext {
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl MemoryContext {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: Some(session_id.into()),
        }
    }

    /// A context spanning every session of a user
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: None,
        }
    }
}

/// A stored memory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    pub kind: MemoryKind,
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    /// Unix milliseconds
    pub created_at: i64,
}

impl MemoryRecord {
    /// Trace that produced this memory, if recorded
    pub fn trace_id(&self) -> Option<&str> {
        self.metadata.get("traceId").and_then(Value::as_str)
    }

    /// Conversational role recorded in the metadata, if any
    pub fn role(&self) -> Option<&str> {
        self.metadata.get("role").and_then(Value::as_str)
    }
}

/// Provenance link from a semantic fact back to the transcript
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceAnchor {
    pub session_id: String,
    /// Index into the episodic transcript at consolidation time
    pub transcript_offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// Durable long-term knowledge derived from episodic memory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SemanticFact {
    pub fact: String,
    pub confidence: f64,
    pub source_anchor: SourceAnchor,
}
