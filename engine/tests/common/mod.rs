//! Shared in-memory collaborators for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use sdk::capability::{
    AgentMemoryStore, AiCapability, HumanReviewSink, PromptRequest, SessionStateStore, TraceLog,
};
use sdk::errors::{AiError, StoreError};
use sdk::session::{SessionPatch, SessionState};
use sdk::types::{
    CorrectionAction, CorrectionPlan, MemoryContext, MemoryKind, MemoryRecord, ModelTier,
    ReasoningTrace, ResilienceEvent, ReviewItem, Thought,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use somnus_engine::conductor::{ConductorAgent, ConductorPorts, ConductorSettings};
use somnus_engine::message_bus::MessageBus;
use somnus_engine::quality::QualityGate;
use somnus_engine::resilience::{DefaultResiliencePolicy, ResilienceStrategy};

/// AI capability answering from scripted queues
///
/// Empty queues fall back to a neutral thought and an empty JSON object.
#[derive(Default)]
pub struct ScriptedAi {
    thoughts: Mutex<VecDeque<Result<Thought, AiError>>>,
    structured: Mutex<VecDeque<Result<Value, AiError>>>,
    delay: Option<Duration>,
    pub thought_calls: AtomicUsize,
    pub structured_calls: AtomicUsize,
    pub requests: Mutex<Vec<PromptRequest>>,
}

impl ScriptedAi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_thought(&self, thought: Result<Thought, AiError>) {
        self.thoughts.lock().unwrap().push_back(thought);
    }

    pub fn push_structured(&self, value: Result<Value, AiError>) {
        self.structured.lock().unwrap().push_back(value);
    }

    pub fn thought_calls(&self) -> usize {
        self.thought_calls.load(Ordering::SeqCst)
    }

    pub fn structured_calls(&self) -> usize {
        self.structured_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl AiCapability for ScriptedAi {
    async fn generate_thought(&self, request: &PromptRequest) -> Result<Thought, AiError> {
        self.thought_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.pause().await;
        let next = self.thoughts.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Thought::new("steady", "Once upon a time...")))
    }

    async fn generate_text(&self, request: &PromptRequest) -> Result<String, AiError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok("text".to_string())
    }

    async fn generate_structured(
        &self,
        _schema: &Value,
        request: &PromptRequest,
    ) -> Result<Value, AiError> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.pause().await;
        let next = self.structured.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(serde_json::json!({})))
    }
}

/// Session store over a map
#[derive(Default)]
pub struct InMemorySessions {
    states: Mutex<HashMap<String, SessionState>>,
    pub writes: AtomicUsize,
}

impl InMemorySessions {
    pub fn snapshot(&self, session_id: &str) -> Option<SessionState> {
        self.states.lock().unwrap().get(session_id).cloned()
    }

    pub fn insert(&self, state: SessionState) {
        self.states
            .lock()
            .unwrap()
            .insert(state.session_id.clone(), state);
    }
}

#[async_trait]
impl SessionStateStore for InMemorySessions {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        Ok(self.snapshot(session_id))
    }

    async fn set(&self, state: &SessionState) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut incoming = state.clone();
        if let Some(prior) = self.snapshot(&state.session_id) {
            incoming.absorb_prior(&prior);
        }
        self.insert(incoming);
        Ok(())
    }

    async fn patch(&self, session_id: &str, patch: SessionPatch) -> Result<SessionState, StoreError> {
        let mut states = self.states.lock().unwrap();
        let state = states
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        state.apply_patch(patch)?;
        Ok(state.clone())
    }

    async fn rollback(&self, session_id: &str, steps: usize) -> Result<SessionState, StoreError> {
        let mut states = self.states.lock().unwrap();
        let state = states
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        state.rollback(steps);
        Ok(state.clone())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.states.lock().unwrap().remove(session_id).is_some())
    }
}

/// Memory store over a vector, retrieval of the latest matches in insertion order
#[derive(Default)]
pub struct InMemoryMemory {
    pub records: Mutex<Vec<MemoryRecord>>,
    pub stores: AtomicUsize,
}

impl InMemoryMemory {
    pub fn seed(&self, user_id: &str, session_id: &str, kind: MemoryKind, content: &str, metadata: Value) {
        let mut records = self.records.lock().unwrap();
        let id = format!("m-{}", records.len());
        records.push(MemoryRecord {
            id,
            content: content.to_string(),
            kind,
            user_id: user_id.to_string(),
            session_id: Some(session_id.to_string()),
            metadata,
            created_at: 0,
        });
    }

    pub fn of_kind(&self, kind: MemoryKind) -> Vec<MemoryRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AgentMemoryStore for InMemoryMemory {
    async fn store(
        &self,
        content: &str,
        kind: MemoryKind,
        context: &MemoryContext,
        metadata: Value,
    ) -> Result<String, StoreError> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().unwrap();
        let id = format!("m-{}", records.len());
        records.push(MemoryRecord {
            id: id.clone(),
            content: content.to_string(),
            kind,
            user_id: context.user_id.clone(),
            session_id: context.session_id.clone(),
            metadata,
            created_at: 0,
        });
        Ok(id)
    }

    async fn retrieve(
        &self,
        query: &str,
        context: &MemoryContext,
        kind: MemoryKind,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let query = query.trim().to_lowercase();
        let matching: Vec<MemoryRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.kind == kind && r.user_id == context.user_id)
            .filter(|r| context.session_id.is_none() || r.session_id == context.session_id)
            .filter(|r| query.is_empty() || r.content.to_lowercase().contains(&query))
            .cloned()
            .collect();

        // Latest window, oldest first, as the SQLite store returns it
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.into_iter().skip(skip).collect())
    }
}

#[derive(Default)]
pub struct InMemoryTraces {
    pub traces: Mutex<Vec<(String, ReasoningTrace)>>,
}

impl InMemoryTraces {
    pub fn actions(&self) -> Vec<String> {
        self.traces
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.action.clone())
            .collect()
    }
}

#[async_trait]
impl TraceLog for InMemoryTraces {
    async fn append(&self, session_id: &str, trace: &ReasoningTrace) -> Result<(), StoreError> {
        self.traces
            .lock()
            .unwrap()
            .push((session_id.to_string(), trace.clone()));
        Ok(())
    }

    async fn list(&self, session_id: &str, limit: usize) -> Result<Vec<ReasoningTrace>, StoreError> {
        Ok(self
            .traces
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|(id, _)| id == session_id)
            .take(limit)
            .map(|(_, t)| t.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct RecordingReview {
    pub items: Mutex<Vec<ReviewItem>>,
}

impl RecordingReview {
    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }
}

#[async_trait]
impl HumanReviewSink for RecordingReview {
    async fn enqueue(&self, item: ReviewItem) -> Result<(), StoreError> {
        self.items.lock().unwrap().push(item);
        Ok(())
    }
}

/// Strategy answering every failure with the same action
pub struct FixedStrategy {
    pub action: CorrectionAction,
    pub calls: AtomicUsize,
}

impl FixedStrategy {
    pub fn new(action: CorrectionAction) -> Self {
        Self {
            action,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ResilienceStrategy for FixedStrategy {
    async fn plan(&self, _event: &ResilienceEvent) -> CorrectionPlan {
        self.calls.fetch_add(1, Ordering::SeqCst);
        CorrectionPlan::new(self.action, ModelTier::Flash, 0.0)
    }
}

/// A conductor wired to in-memory collaborators
pub struct Harness {
    pub ai: Arc<ScriptedAi>,
    pub sessions: Arc<InMemorySessions>,
    pub memory: Arc<InMemoryMemory>,
    pub traces: Arc<InMemoryTraces>,
    pub review: Arc<RecordingReview>,
    pub bus: Arc<MessageBus>,
    pub conductor: ConductorAgent,
}

impl Harness {
    pub fn new(ai: ScriptedAi) -> Self {
        let strategy = Arc::new(DefaultResiliencePolicy::new(
            ConductorSettings::default().resilience,
            ModelTier::Flash,
        ));
        Self::build(ai, strategy, QualityGate::default())
    }

    pub fn build(ai: ScriptedAi, strategy: Arc<dyn ResilienceStrategy>, quality: QualityGate) -> Self {
        let ai = Arc::new(ai);
        let sessions = Arc::new(InMemorySessions::default());
        let memory = Arc::new(InMemoryMemory::default());
        let traces = Arc::new(InMemoryTraces::default());
        let review = Arc::new(RecordingReview::default());
        let bus = Arc::new(MessageBus::new());

        let ports = ConductorPorts {
            ai: Arc::clone(&ai) as _,
            sessions: Arc::clone(&sessions) as _,
            memory: Arc::clone(&memory) as _,
            traces: Arc::clone(&traces) as _,
            review: Arc::clone(&review) as _,
        };

        let mut settings = ConductorSettings::default();
        settings.resilience.backoff_base_ms = 1;
        settings.resilience.backoff_max_ms = 2;

        let conductor = ConductorAgent::new(ports, strategy, Arc::clone(&bus), quality, settings)
            .expect("conductor");

        Self {
            ai,
            sessions,
            memory,
            traces,
            review,
            bus,
            conductor,
        }
    }
}
