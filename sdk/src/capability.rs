//! Capability contracts
//!
//! The orchestration core never talks to a model provider, a database or a
//! review queue directly. It consumes the traits defined here, which are
//! injected at construction time. Every trait is object safe so the engine can
//! hold `Arc<dyn Trait>` handles and tests can substitute fixed implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{AiError, StoreError};
use crate::session::{SessionPatch, SessionState};
use crate::types::{
    MemoryContext, MemoryKind, MemoryRecord, ModelTier, ReasoningTrace, ReviewItem, Thought,
};

/// Prompt pair plus routing information for one AI call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    #[serde(default)]
    pub tier: ModelTier,
    /// Adjustments requested by a correction plan (e.g. `strictSchema`, `temperature`)
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl PromptRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            tier: ModelTier::default(),
            parameters: Map::new(),
        }
    }

    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Read a boolean parameter, defaulting to false
    pub fn flag(&self, key: &str) -> bool {
        self.parameters
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Generative model capability
///
/// All methods may fail; failures are expressed as [`AiError`] variants so the
/// resilience layer can classify them by shape.
#[async_trait]
pub trait AiCapability: Send + Sync {
    /// Produce one structured reasoning step
    async fn generate_thought(&self, request: &PromptRequest) -> Result<Thought, AiError>;

    /// Produce free text
    async fn generate_text(&self, request: &PromptRequest) -> Result<String, AiError>;

    /// Produce a JSON value conforming to `schema`
    async fn generate_structured(
        &self,
        schema: &Value,
        request: &PromptRequest,
    ) -> Result<Value, AiError>;
}

/// Keyed store of session state
#[async_trait]
pub trait SessionStateStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, StoreError>;

    /// Overwrite the stored state
    ///
    /// When the incoming state does not already descend from the stored one,
    /// the stored state is appended to the incoming history first.
    async fn set(&self, state: &SessionState) -> Result<(), StoreError>;

    /// Apply a partial update through the session setters
    async fn patch(&self, session_id: &str, patch: SessionPatch)
        -> Result<SessionState, StoreError>;

    /// Pop `steps` snapshots and persist the restored state
    async fn rollback(&self, session_id: &str, steps: usize) -> Result<SessionState, StoreError>;

    /// Remove the session; returns whether it existed
    async fn delete(&self, session_id: &str) -> Result<bool, StoreError>;
}

/// Episodic and semantic agent memory
#[async_trait]
pub trait AgentMemoryStore: Send + Sync {
    /// Store a memory and return its id
    async fn store(
        &self,
        content: &str,
        kind: MemoryKind,
        context: &MemoryContext,
        metadata: Value,
    ) -> Result<String, StoreError>;

    /// Retrieve up to `limit` memories in chronological order
    ///
    /// An empty `query` matches every memory in scope.
    async fn retrieve(
        &self,
        query: &str,
        context: &MemoryContext,
        kind: MemoryKind,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError>;
}

/// Destination for content that needs a human decision
#[async_trait]
pub trait HumanReviewSink: Send + Sync {
    async fn enqueue(&self, item: ReviewItem) -> Result<(), StoreError>;
}

/// Append-only audit log of reasoning traces
#[async_trait]
pub trait TraceLog: Send + Sync {
    async fn append(&self, session_id: &str, trace: &ReasoningTrace) -> Result<(), StoreError>;

    /// Most recent traces of a session, oldest first
    async fn list(&self, session_id: &str, limit: usize)
        -> Result<Vec<ReasoningTrace>, StoreError>;
}
