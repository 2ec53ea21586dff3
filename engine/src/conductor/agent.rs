//! Conductor Agent
//!
//! Drives a bedtime session through its agenda, one reasoning step per turn:
//!
//! 1. Load the session state (turns of one session are serialised by the caller)
//! 2. Short-circuit sleeping sessions and sleep cues without a model call
//! 3. Classify the utterance and request a thought from the AI capability,
//!    each call bounded by a timeout and checked against the quality gate
//! 4. On failure, classify it, ask the resilience strategy for a plan and
//!    execute it (retry, self-correct, fallback, abort or degrade)
//! 5. Advance the agenda, capture episodic memory, persist, append the trace
//!    and publish lifecycle events
//!
//! AI-layer failures never surface as errors: every turn yields a reply and a
//! trace. Only a missing session or an unreachable store is reported as an
//! [`EngineError`].

use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use sdk::capability::{
    AgentMemoryStore, AiCapability, HumanReviewSink, PromptRequest, SessionStateStore, TraceLog,
};
use sdk::errors::{AiError, EngineError, QualityBreach};
use sdk::helpers::{clamp_unit, now_millis};
use sdk::session::{ActiveIntent, SessionPhase, SessionState};
use sdk::types::{
    CorrectionAction, FailureKind, MemoryContext, MemoryKind, ModelTier, ReasoningTrace,
    ResilienceMeta, Suggestion, Thought, VerifiableContent, VerificationResult, SAFE_MODE_ACTION,
    SAFE_MODE_NOTE,
};

use crate::config::{Config, ResilienceConfig, VerificationConfig};
use crate::message_bus::{Event, EventPayload, MessageBus};
use crate::quality::{metrics, QualityGate};
use crate::resilience::{classify, RecoveryLedger, ResilienceStrategy};
use crate::verification::VerificationPipeline;

use super::intent::IntentClassifier;
use super::planner::SessionPlanner;
use super::prompts;
use super::types::{
    SessionConfig, SessionDuration, SuggestionContext, TurnContext, TurnResult, TurnStatus,
};

/// Suggestions returned when the caller does not ask for a count
const DEFAULT_SUGGESTION_LIMIT: usize = 3;

/// Semantic memories consulted when the caller supplies none
const SUGGESTION_MEMORY_WINDOW: usize = 20;

/// Content type tag of golden moments
pub const GOLDEN_MOMENT: &str = "golden_moment";

/// Tunables of the conductor, taken from [`Config`]
#[derive(Debug, Clone)]
pub struct ConductorSettings {
    /// Tier of the first attempt of every reasoning step
    pub default_tier: ModelTier,
    /// Upper bound for a single model call
    pub request_timeout: Duration,
    pub resilience: ResilienceConfig,
    pub verification: VerificationConfig,
    /// Snapshots retained by newly created sessions
    pub history_limit: usize,
}

impl ConductorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_tier: config.llm.default_tier,
            request_timeout: Duration::from_secs(config.llm.request_timeout_secs),
            resilience: config.resilience.clone(),
            verification: config.verification.clone(),
            history_limit: config.memory.history_limit,
        }
    }
}

impl Default for ConductorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default_config())
    }
}

/// Collaborators the conductor consumes through their contracts
#[derive(Clone)]
pub struct ConductorPorts {
    pub ai: Arc<dyn AiCapability>,
    pub sessions: Arc<dyn SessionStateStore>,
    pub memory: Arc<dyn AgentMemoryStore>,
    pub traces: Arc<dyn TraceLog>,
    pub review: Arc<dyn HumanReviewSink>,
}

/// How a reasoning step ended
enum StepOutcome {
    Thought {
        thought: Thought,
        meta: Option<ResilienceMeta>,
    },
    Degraded(Degradation),
    Aborted {
        thought: String,
        meta: ResilienceMeta,
    },
}

/// Reply substituted for the model's
enum Degradation {
    Fallback {
        meta: ResilienceMeta,
    },
    SafeMode {
        thought: String,
        reason: String,
        meta: ResilienceMeta,
    },
}

/// Suggestion as returned by the model, before validation
#[derive(Debug, Deserialize)]
struct RawSuggestion {
    #[serde(default)]
    title: String,
    #[serde(default)]
    theme: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    confidence: f64,
}

pub struct ConductorAgent {
    ai: Arc<dyn AiCapability>,
    sessions: Arc<dyn SessionStateStore>,
    memory: Arc<dyn AgentMemoryStore>,
    traces: Arc<dyn TraceLog>,
    strategy: Arc<dyn ResilienceStrategy>,
    bus: Arc<MessageBus>,
    quality: QualityGate,
    intents: IntentClassifier,
    verifier: VerificationPipeline,
    settings: ConductorSettings,
}

impl ConductorAgent {
    /// Create a conductor
    ///
    /// # Errors
    ///
    /// Returns an error if the intent classifier cannot be built.
    pub fn new(
        ports: ConductorPorts,
        strategy: Arc<dyn ResilienceStrategy>,
        bus: Arc<MessageBus>,
        quality: QualityGate,
        settings: ConductorSettings,
    ) -> anyhow::Result<Self> {
        let verifier = VerificationPipeline::new(
            Arc::clone(&ports.ai),
            ports.review,
            settings.verification.clone(),
        );

        Ok(Self {
            ai: ports.ai,
            sessions: ports.sessions,
            memory: ports.memory,
            traces: ports.traces,
            strategy,
            bus,
            quality,
            intents: IntentClassifier::new()?,
            verifier,
            settings,
        })
    }

    /// The verification pipeline golden moments go through
    pub fn verification(&self) -> &VerificationPipeline {
        &self.verifier
    }

    /// Start a new session or resume an existing one and produce the opening reply
    pub async fn conduct_story_session(
        &self,
        config: &SessionConfig,
    ) -> Result<TurnResult, EngineError> {
        let session_id = config.session_id.as_str();
        let existing = self.load(session_id).await?;
        let stored_phase = existing
            .as_ref()
            .map_or(SessionPhase::Idle, SessionState::phase);
        let resumed = existing
            .as_ref()
            .is_some_and(|state| state.phase() != SessionPhase::Idle);

        let mut state = existing.unwrap_or_else(|| {
            SessionState::new(session_id, config.user_id.as_str())
                .with_history_limit(self.settings.history_limit)
        });

        if state.phase() == SessionPhase::Asleep {
            return Ok(self.asleep_turn(&state, None).await);
        }

        let duration = if resumed {
            duration_of(&state)
        } else {
            config.duration
        };
        let agenda = SessionPlanner::plan(duration);
        let mut events = Vec::new();

        if !resumed {
            if let Err(e) = state.transition_to(SessionPhase::Onboarding) {
                warn!(session_id, "Cannot start session: {}", e);
            }
            state.set_goals(agenda.iter().map(|item| item.goal.clone()).collect());
            state.set_context("agendaIndex", json!(0));
            state.set_context("storyBeat", json!(0));
            state.set_context("totalBeats", json!(SessionPlanner::story_beats(duration)));
            state.set_context("duration", json!(duration.as_str()));
            if let Some(theme) = &config.theme {
                state.set_context("theme", json!(theme));
            }
            if let Some(name) = &config.child_name {
                state.set_context("childName", json!(name));
            }
            events.push(EventPayload::SessionStarted {
                session_id: state.session_id.clone(),
                user_id: state.user_id.clone(),
            });

            info!(
                session_id,
                duration = duration.as_str(),
                minutes = SessionPlanner::estimated_minutes(&agenda),
                "Starting story session"
            );
        } else {
            info!(session_id, phase = %state.phase(), "Resuming story session");
        }

        let opening_config = SessionConfig {
            duration,
            ..config.clone()
        };
        let opening = prompts::session_opening_prompt(&opening_config, &agenda, resumed);
        let outcome = self.reason(session_id, |_| opening.clone()).await;

        let result = match outcome {
            StepOutcome::Thought { thought, meta } => {
                let trace = trace_from_thought(&thought, meta);
                if let Some(tone) = thought.emotional_tone {
                    state.set_emotional_tone(tone);
                }
                state.set_context("lastReply", json!(thought.reply));
                self.capture_episode(&state, None, &thought.reply, &trace.id).await;
                self.persist(&state).await;
                TurnResult {
                    reply: thought.reply,
                    trace,
                    status: TurnStatus::Completed,
                    phase: state.phase(),
                }
            }
            StepOutcome::Aborted { thought, meta } => {
                error!(session_id, "Session start aborted");
                return Ok(self
                    .aborted_turn(session_id, stored_phase, thought, meta, None)
                    .await);
            }
            StepOutcome::Degraded(degradation) => {
                let result = self.degraded_turn(&state, degradation, None).await;
                self.persist(&state).await;
                result
            }
        };

        self.append_trace(session_id, &result.trace).await;
        for payload in events {
            self.publish(None, payload).await;
        }
        self.publish_turn(session_id, &result.trace, None).await;

        Ok(result)
    }

    /// Process one user utterance
    pub async fn process_turn(
        &self,
        message: &str,
        context: &TurnContext,
    ) -> Result<TurnResult, EngineError> {
        let session_id = context.session_id.as_str();
        let request_id = context.request_id.as_deref();
        let mut state = self
            .load(session_id)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        if state.phase() == SessionPhase::Asleep {
            return Ok(self.asleep_turn(&state, request_id).await);
        }

        if self.intents.detect_sleep_cue(message) {
            return Ok(self.fall_asleep(state, message, request_id).await);
        }

        let stored_phase = state.phase();
        let intent = self.intents.classify(message);
        state.set_intent(intent.active_intent());
        debug!(session_id, intent = intent.as_str(), phase = %state.phase(), "Processing turn");

        let outcome = self
            .reason(session_id, |truncate| {
                prompts::turn_prompt(&state, message, intent, truncate)
            })
            .await;

        let (result, events) = match outcome {
            StepOutcome::Thought { thought, meta } => {
                let trace = trace_from_thought(&thought, meta);
                let events = advance(&mut state, &thought);
                self.capture_episode(&state, Some(message), &thought.reply, &trace.id)
                    .await;
                self.persist(&state).await;
                let result = TurnResult {
                    reply: thought.reply,
                    trace,
                    status: TurnStatus::Completed,
                    phase: state.phase(),
                };
                (result, events)
            }
            StepOutcome::Aborted { thought, meta } => {
                error!(session_id, "Turn aborted, session state left untouched");
                return Ok(self
                    .aborted_turn(session_id, stored_phase, thought, meta, request_id)
                    .await);
            }
            StepOutcome::Degraded(degradation) => {
                let result = self.degraded_turn(&state, degradation, request_id).await;
                self.persist(&state).await;
                (result, Vec::new())
            }
        };

        self.append_trace(session_id, &result.trace).await;
        for payload in events {
            self.publish(request_id, payload).await;
        }
        self.publish_turn(session_id, &result.trace, request_id).await;

        Ok(result)
    }

    /// Propose stories grounded in what is remembered about the user
    ///
    /// Entries without visible reasoning are dropped. AI failures yield an
    /// empty list.
    pub async fn generate_suggestions(&self, context: &SuggestionContext) -> Vec<Suggestion> {
        let limit = context.limit.unwrap_or(DEFAULT_SUGGESTION_LIMIT);
        if limit == 0 {
            return Vec::new();
        }

        let memories = if context.recent_memories.is_empty() {
            self.memory
                .retrieve(
                    "",
                    &MemoryContext::user(context.user_id.as_str()),
                    MemoryKind::Semantic,
                    SUGGESTION_MEMORY_WINDOW,
                )
                .await
                .unwrap_or_else(|e| {
                    warn!(user_id = %context.user_id, "Failed to load memories for suggestions: {}", e);
                    Vec::new()
                })
        } else {
            context.recent_memories.clone()
        };

        let request = PromptRequest::new(
            prompts::suggestions_system_prompt(),
            prompts::suggestions_prompt(&memories, limit),
        )
        .with_tier(self.settings.default_tier);

        match self
            .ai
            .generate_structured(&prompts::suggestions_schema(), &request)
            .await
        {
            Ok(response) => parse_suggestions(&response, limit),
            Err(e) => {
                warn!(user_id = %context.user_id, "Suggestion generation failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Verify a golden moment and keep it as a semantic memory when approved
    pub async fn capture_golden_moment(
        &self,
        session_id: &str,
        description: &str,
        trace_id: Option<&str>,
    ) -> Result<VerificationResult, EngineError> {
        let state = self
            .load(session_id)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        let metadata = json!({
            "sessionId": session_id,
            "traceId": trace_id,
            "phase": state.phase(),
        });
        let content = VerifiableContent::new(GOLDEN_MOMENT, json!({ "description": description }))
            .with_metadata(metadata);

        let verdict = self.verifier.verify(&content).await;
        if !verdict.approved {
            info!(session_id, stage = ?verdict.stage, "Golden moment not approved: {}", verdict.reason);
            return Ok(verdict);
        }

        let memory_metadata = json!({
            "goldenMoment": true,
            "traceId": trace_id,
            "confidence": verdict.confidence,
        });
        if let Err(e) = self
            .memory
            .store(
                description,
                MemoryKind::Semantic,
                &MemoryContext::new(state.user_id.as_str(), session_id),
                memory_metadata,
            )
            .await
        {
            warn!(session_id, "Failed to store golden moment: {}", e);
        }

        Ok(verdict)
    }

    /// One reasoning step with failure recovery
    ///
    /// `build_prompt` receives whether history should be truncated.
    async fn reason<F>(&self, session_id: &str, build_prompt: F) -> StepOutcome
    where
        F: Fn(bool) -> String,
    {
        let mut ledger = RecoveryLedger::new(&self.settings.resilience);
        let mut tier = self.settings.default_tier;
        let mut parameters = Map::new();
        let mut last_meta = None;

        loop {
            let request = PromptRequest::new(
                prompts::conductor_system_prompt(flag(&parameters, "strictSchema")),
                build_prompt(flag(&parameters, "truncateHistory")),
            )
            .with_tier(tier)
            .with_parameters(parameters.clone());

            ledger.charge(self.settings.resilience.tier_cost(tier));
            debug!(session_id, attempt = ledger.attempt(), tier = tier.as_str(), "Requesting thought");

            let started = Instant::now();
            let result = match timeout(self.settings.request_timeout, self.ai.generate_thought(&request)).await {
                Ok(result) => result,
                Err(_) => Err(AiError::Timeout),
            };

            let failure = match result {
                Ok(thought) => {
                    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                    match self.quality.check_metric(metrics::LATENCY_MS, latency_ms) {
                        Ok(_) => return StepOutcome::Thought { thought, meta: last_meta },
                        Err(breach) => AiError::Quality(breach),
                    }
                }
                Err(e) => e,
            };

            if let AiError::Quality(breach) = &failure {
                warn!(session_id, metric = %breach.alert.metric, "Quality gate breached, entering safe mode");
                return StepOutcome::Degraded(Degradation::SafeMode {
                    thought: breach_thought(breach),
                    reason: breach.to_string(),
                    meta: ResilienceMeta {
                        failure_encountered: FailureKind::QualityBreach,
                        correction_attempted: CorrectionAction::DegradeService,
                        recovery_cost_usd: ledger.cost_so_far(),
                    },
                });
            }

            let kind = classify(&failure);
            let event = ledger.event(
                kind,
                json!({
                    "error": failure.to_string(),
                    "tier": tier.as_str(),
                    "sessionId": session_id,
                }),
            );
            let plan = self.strategy.plan(&event).await;
            let meta = ResilienceMeta {
                failure_encountered: kind,
                correction_attempted: plan.action,
                recovery_cost_usd: ledger.cost_so_far(),
            };

            warn!(
                session_id,
                attempt = ledger.attempt(),
                kind = kind.as_str(),
                action = %plan.action,
                "Reasoning step failed: {}",
                failure
            );

            match plan.action {
                CorrectionAction::Retry | CorrectionAction::SelfCorrect if ledger.can_retry() => {
                    if plan.action == CorrectionAction::Retry {
                        tokio::time::sleep(ledger.backoff_delay()).await;
                    } else {
                        parameters.extend(plan.parameters);
                    }
                    ledger.advance();
                    tier = plan.model;
                    last_meta = Some(meta);
                }
                CorrectionAction::Retry | CorrectionAction::SelfCorrect => {
                    return StepOutcome::Degraded(Degradation::SafeMode {
                        thought: format!(
                            "Service degraded: {} persisted after {} attempts",
                            kind,
                            ledger.attempt()
                        ),
                        reason: format!("attempts exhausted after {}", kind),
                        meta: ResilienceMeta {
                            correction_attempted: CorrectionAction::DegradeService,
                            ..meta
                        },
                    });
                }
                CorrectionAction::Fallback => {
                    return StepOutcome::Degraded(Degradation::Fallback { meta });
                }
                CorrectionAction::Abort => {
                    return StepOutcome::Aborted {
                        thought: format!("Turn aborted after {}: {}", kind, failure),
                        meta,
                    };
                }
                CorrectionAction::DegradeService => {
                    return StepOutcome::Degraded(Degradation::SafeMode {
                        thought: format!("Service degraded after {}: {}", kind, failure),
                        reason: kind.as_str().to_string(),
                        meta,
                    });
                }
            }
        }
    }

    /// Result of a turn answered by a fallback or safe-mode reply
    async fn degraded_turn(
        &self,
        state: &SessionState,
        degradation: Degradation,
        request_id: Option<&str>,
    ) -> TurnResult {
        let phase = state.phase();

        let (reply, trace) = match degradation {
            Degradation::SafeMode {
                thought,
                reason,
                meta,
            } => {
                let trace = system_trace(
                    SAFE_MODE_ACTION,
                    thought,
                    0.0,
                    Some(SAFE_MODE_NOTE.to_string()),
                    Some(meta),
                );
                self.publish(
                    request_id,
                    EventPayload::SafeModeEntered {
                        session_id: state.session_id.clone(),
                        reason,
                    },
                )
                .await;
                (prompts::safe_mode_reply(phase), trace)
            }
            Degradation::Fallback { meta } => {
                let trace = system_trace(
                    "FALLBACK",
                    format!("Serving the precomputed reply after {}", meta.failure_encountered),
                    0.5,
                    Some("Fallback reply served.".to_string()),
                    Some(meta),
                );
                (prompts::fallback_reply(phase), trace)
            }
        };

        TurnResult {
            reply: reply.to_string(),
            trace,
            status: TurnStatus::Degraded,
            phase,
        }
    }

    /// Result of an aborted turn; the stored state is not touched
    async fn aborted_turn(
        &self,
        session_id: &str,
        stored_phase: SessionPhase,
        thought: String,
        meta: ResilienceMeta,
        request_id: Option<&str>,
    ) -> TurnResult {
        let trace = system_trace("ABORT", thought, 0.0, None, Some(meta));
        self.append_trace(session_id, &trace).await;
        self.publish_turn(session_id, &trace, request_id).await;

        TurnResult {
            reply: prompts::abort_reply().to_string(),
            trace,
            status: TurnStatus::Failed,
            phase: stored_phase,
        }
    }

    /// Whisper to a sleeping session without calling the model
    async fn asleep_turn(&self, state: &SessionState, request_id: Option<&str>) -> TurnResult {
        let trace = system_trace(
            "ASLEEP",
            "The child is asleep; answering with a whisper".to_string(),
            1.0,
            None,
            None,
        );
        self.append_trace(&state.session_id, &trace).await;
        self.publish_turn(&state.session_id, &trace, request_id).await;

        TurnResult {
            reply: prompts::asleep_reply().to_string(),
            trace,
            status: TurnStatus::Completed,
            phase: SessionPhase::Asleep,
        }
    }

    /// Move the session to ASLEEP after a sleep cue
    async fn fall_asleep(
        &self,
        mut state: SessionState,
        message: &str,
        request_id: Option<&str>,
    ) -> TurnResult {
        let session_id = state.session_id.clone();

        if let Err(e) = state.transition_to(SessionPhase::Asleep) {
            warn!(session_id = %session_id, "Cannot move session to sleep: {}", e);
        }
        state.set_intent(ActiveIntent::Idle);
        state.set_goals(Vec::new());

        let trace = system_trace(
            "SLEEP_CUE",
            "Sleep cue detected; ending the session gently".to_string(),
            1.0,
            None,
            None,
        );
        let reply = prompts::asleep_reply();

        info!(session_id = %session_id, "Sleep cue detected");

        self.capture_episode(&state, Some(message), reply, &trace.id)
            .await;
        self.persist(&state).await;
        self.append_trace(&session_id, &trace).await;
        self.publish(
            request_id,
            EventPayload::SleepCueDetected {
                session_id: Some(session_id.clone()),
                user_id: Some(state.user_id.clone()),
            },
        )
        .await;
        self.publish_turn(&session_id, &trace, request_id).await;

        TurnResult {
            reply: reply.to_string(),
            trace,
            status: TurnStatus::Completed,
            phase: SessionPhase::Asleep,
        }
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, EngineError> {
        self.sessions
            .get(session_id)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))
    }

    async fn persist(&self, state: &SessionState) {
        if let Err(e) = self.sessions.set(state).await {
            error!(session_id = %state.session_id, "Failed to persist session state: {}", e);
        }
    }

    async fn append_trace(&self, session_id: &str, trace: &ReasoningTrace) {
        if let Err(e) = self.traces.append(session_id, trace).await {
            error!(session_id, trace_id = %trace.id, "Failed to append trace: {}", e);
        }
    }

    /// Store the exchange as episodic memory, user line first
    async fn capture_episode(
        &self,
        state: &SessionState,
        message: Option<&str>,
        reply: &str,
        trace_id: &str,
    ) {
        let context = MemoryContext::new(state.user_id.as_str(), state.session_id.as_str());
        let lines = message
            .map(|m| ("user", m))
            .into_iter()
            .chain(std::iter::once(("assistant", reply)));

        for (role, content) in lines {
            let metadata = json!({ "traceId": trace_id, "role": role });
            if let Err(e) = self
                .memory
                .store(content, MemoryKind::Episodic, &context, metadata)
                .await
            {
                warn!(session_id = %state.session_id, role, "Failed to store episodic memory: {}", e);
            }
        }
    }

    async fn publish(&self, request_id: Option<&str>, payload: EventPayload) {
        let mut event = Event::new(payload);
        if let Some(request_id) = request_id {
            event = event.with_request_id(request_id);
        }
        self.bus.publish(event).await;
    }

    async fn publish_turn(&self, session_id: &str, trace: &ReasoningTrace, request_id: Option<&str>) {
        self.publish(
            request_id,
            EventPayload::TurnCompleted {
                session_id: session_id.to_string(),
                trace_id: trace.id.clone(),
                action: trace.action.clone(),
            },
        )
        .await;
    }
}

/// Apply a successful thought to the session and collect the events it raises
fn advance(state: &mut SessionState, thought: &Thought) -> Vec<EventPayload> {
    let mut events = Vec::new();

    if let Some(tone) = thought.emotional_tone {
        state.set_emotional_tone(tone);
    }
    state.set_context("lastReply", json!(thought.reply));

    match state.phase() {
        SessionPhase::Storytelling => {
            let duration = duration_of(state);
            let beat = state.context_u64("storyBeat").unwrap_or(0);
            let total = state
                .context_u64("totalBeats")
                .unwrap_or_else(|| u64::from(SessionPlanner::story_beats(duration)))
                .max(1);

            events.push(EventPayload::StoryBeatCompleted {
                session_id: state.session_id.clone(),
                beat_index: u32::try_from(beat).unwrap_or(u32::MAX),
                total_beats: u32::try_from(total).unwrap_or(u32::MAX),
            });
            state.set_context("storyBeat", json!(beat + 1));

            if beat + 1 >= total {
                advance_agenda(state, &mut events);
            }
        }
        SessionPhase::Onboarding | SessionPhase::Reflection | SessionPhase::WindDown
            if thought.goal_complete =>
        {
            advance_agenda(state, &mut events);
        }
        _ => {}
    }

    events
}

/// Move to the next agenda item, or to sleep once the agenda is exhausted
fn advance_agenda(state: &mut SessionState, events: &mut Vec<EventPayload>) {
    let agenda = SessionPlanner::plan(duration_of(state));
    let next = state
        .context_u64("agendaIndex")
        .map(|index| index as usize + 1)
        .unwrap_or(1);

    match agenda.get(next) {
        Some(item) => {
            if let Err(e) = state.transition_to(item.phase) {
                warn!(session_id = %state.session_id, "Agenda transition rejected: {}", e);
                return;
            }
            state.set_goals(agenda[next..].iter().map(|i| i.goal.clone()).collect());
            state.set_context("agendaIndex", json!(next));
            info!(session_id = %state.session_id, phase = %item.phase, "Agenda advanced");
        }
        None => {
            if let Err(e) = state.transition_to(SessionPhase::Asleep) {
                warn!(session_id = %state.session_id, "Cannot finish agenda: {}", e);
                return;
            }
            state.set_goals(Vec::new());
            info!(session_id = %state.session_id, "Agenda complete");
            events.push(EventPayload::SleepCueDetected {
                session_id: Some(state.session_id.clone()),
                user_id: Some(state.user_id.clone()),
            });
        }
    }
}

fn duration_of(state: &SessionState) -> SessionDuration {
    state
        .context_value("duration")
        .and_then(Value::as_str)
        .and_then(|d| d.parse().ok())
        .unwrap_or_default()
}

fn flag(parameters: &Map<String, Value>, key: &str) -> bool {
    parameters.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn breach_thought(breach: &QualityBreach) -> String {
    let alert = &breach.alert;
    format!(
        "Quality Gate Breached: {} at {:.2} crossed the critical threshold {:.2}",
        alert.metric, alert.current_value, alert.threshold
    )
}

fn trace_from_thought(thought: &Thought, meta: Option<ResilienceMeta>) -> ReasoningTrace {
    ReasoningTrace {
        id: Uuid::new_v4().to_string(),
        goals_considered: thought.goals_considered.clone(),
        conflict_detected: thought.conflict_detected,
        conflicts_identified: thought.conflicts_identified.clone(),
        trade_off_made: thought.trade_off_made.clone(),
        thought: thought.thought.clone(),
        action: thought.action.clone(),
        confidence: clamp_unit(thought.confidence),
        timestamp: now_millis(),
        contextual_notes: thought.contextual_notes.clone(),
        resilience_meta: meta,
    }
}

fn system_trace(
    action: &str,
    thought: String,
    confidence: f64,
    contextual_notes: Option<String>,
    meta: Option<ResilienceMeta>,
) -> ReasoningTrace {
    ReasoningTrace {
        id: Uuid::new_v4().to_string(),
        goals_considered: Vec::new(),
        conflict_detected: false,
        conflicts_identified: None,
        trade_off_made: None,
        thought,
        action: action.to_string(),
        confidence,
        timestamp: now_millis(),
        contextual_notes,
        resilience_meta: meta,
    }
}

/// Validate the model's suggestions; accepts `{suggestions: [...]}` or a bare array
fn parse_suggestions(response: &Value, limit: usize) -> Vec<Suggestion> {
    let items = response
        .get("suggestions")
        .unwrap_or(response)
        .as_array()
        .cloned()
        .unwrap_or_default();

    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<RawSuggestion>(item).ok())
        .filter(|raw| !raw.title.trim().is_empty() && !raw.reasoning.trim().is_empty())
        .take(limit)
        .map(|raw| Suggestion {
            id: Uuid::new_v4().to_string(),
            title: raw.title.trim().to_string(),
            theme: raw.theme.trim().to_string(),
            reasoning: raw.reasoning.trim().to_string(),
            confidence: clamp_unit(raw.confidence),
        })
        .collect()
}
