//! Session state with snapshot history
//!
//! A `SessionState` is mutated only through its setters. Each setter pushes a
//! snapshot of the pre-mutation state onto `history` before applying the
//! change, which is what makes `rollback` possible. History is bounded by a
//! retention cap; the oldest snapshots are evicted first.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

/// Default number of snapshots retained per session
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Phase of a bedtime session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    #[default]
    Idle,
    Onboarding,
    Storytelling,
    Reflection,
    WindDown,
    Asleep,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "IDLE",
            SessionPhase::Onboarding => "ONBOARDING",
            SessionPhase::Storytelling => "STORYTELLING",
            SessionPhase::Reflection => "REFLECTION",
            SessionPhase::WindDown => "WIND_DOWN",
            SessionPhase::Asleep => "ASLEEP",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`
    ///
    /// Staying put is always allowed and ASLEEP is reachable from any phase.
    /// Otherwise only the forward edges of
    /// IDLE → ONBOARDING → STORYTELLING → (REFLECTION →) WIND_DOWN → ASLEEP exist.
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;

        if self == next || next == Asleep {
            return true;
        }

        matches!(
            (self, next),
            (Idle, Onboarding)
                | (Onboarding, Storytelling)
                | (Storytelling, Reflection)
                | (Storytelling, WindDown)
                | (Reflection, WindDown)
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse conversational intent of the agent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActiveIntent {
    Listen,
    Interrupt,
    #[default]
    Idle,
}

/// Rejected phase transition
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Invalid phase transition {from} -> {to}")]
pub struct TransitionError {
    pub from: SessionPhase,
    pub to: SessionPhase,
}

/// Immutable copy of the top-level fields of a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub active_intent: ActiveIntent,
    pub emotional_tone: f64,
    pub active_goals: Vec<String>,
    pub context: Map<String, Value>,
}

/// Partial update applied through `SessionStateStore::patch`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    #[serde(default)]
    pub phase: Option<SessionPhase>,
    #[serde(default)]
    pub active_intent: Option<ActiveIntent>,
    #[serde(default)]
    pub emotional_tone: Option<f64>,
    #[serde(default)]
    pub active_goals: Option<Vec<String>>,
    /// Keys merged into the context bag
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

/// Per-session state owned by the conductor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: String,
    pub user_id: String,
    phase: SessionPhase,
    active_intent: ActiveIntent,
    emotional_tone: f64,
    active_goals: Vec<String>,
    context: Map<String, Value>,
    history: VecDeque<SessionSnapshot>,
    #[serde(default = "default_history_limit")]
    history_limit: usize,
    /// Number of recorded mutations net of rollbacks
    #[serde(default)]
    revision: u64,
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

impl SessionState {
    /// Create a fresh IDLE session
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            phase: SessionPhase::Idle,
            active_intent: ActiveIntent::Idle,
            emotional_tone: 0.5,
            active_goals: Vec::new(),
            context: Map::new(),
            history: VecDeque::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            revision: 0,
        }
    }

    /// Set the snapshot retention cap (at least one snapshot is kept)
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn active_intent(&self) -> ActiveIntent {
        self.active_intent
    }

    pub fn emotional_tone(&self) -> f64 {
        self.emotional_tone
    }

    pub fn active_goals(&self) -> &[String] {
        &self.active_goals
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    /// Read a context entry
    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    /// Read a context entry as an unsigned integer
    pub fn context_u64(&self, key: &str) -> Option<u64> {
        self.context.get(key).and_then(Value::as_u64)
    }

    pub fn history(&self) -> &VecDeque<SessionSnapshot> {
        &self.history
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Copy of the current top-level fields
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            active_intent: self.active_intent,
            emotional_tone: self.emotional_tone,
            active_goals: self.active_goals.clone(),
            context: self.context.clone(),
        }
    }

    fn push_snapshot(&mut self, snapshot: SessionSnapshot) {
        self.history.push_back(snapshot);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
        self.revision += 1;
    }

    fn record(&mut self) {
        let snapshot = self.snapshot();
        self.push_snapshot(snapshot);
    }

    fn restore(&mut self, snapshot: SessionSnapshot) {
        self.phase = snapshot.phase;
        self.active_intent = snapshot.active_intent;
        self.emotional_tone = snapshot.emotional_tone;
        self.active_goals = snapshot.active_goals;
        self.context = snapshot.context;
    }

    /// Move to another phase, validating the transition
    pub fn transition_to(&mut self, next: SessionPhase) -> Result<(), TransitionError> {
        if !self.phase.can_transition_to(next) {
            return Err(TransitionError {
                from: self.phase,
                to: next,
            });
        }
        if self.phase != next {
            self.record();
            self.phase = next;
        }
        Ok(())
    }

    pub fn set_intent(&mut self, intent: ActiveIntent) {
        if self.active_intent != intent {
            self.record();
            self.active_intent = intent;
        }
    }

    /// Set the emotional tone, clamped to [0, 1]
    pub fn set_emotional_tone(&mut self, tone: f64) {
        let tone = if tone.is_finite() {
            tone.clamp(0.0, 1.0)
        } else {
            self.emotional_tone
        };
        if (self.emotional_tone - tone).abs() > f64::EPSILON {
            self.record();
            self.emotional_tone = tone;
        }
    }

    pub fn set_goals(&mut self, goals: Vec<String>) {
        if self.active_goals != goals {
            self.record();
            self.active_goals = goals;
        }
    }

    pub fn set_context(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if self.context.get(&key) != Some(&value) {
            self.record();
            self.context.insert(key, value);
        }
    }

    pub fn remove_context(&mut self, key: &str) {
        if self.context.contains_key(key) {
            self.record();
            self.context.remove(key);
        }
    }

    /// Apply a partial update field by field
    ///
    /// The phase is validated first so a rejected patch leaves the state untouched.
    pub fn apply_patch(&mut self, patch: SessionPatch) -> Result<(), TransitionError> {
        if let Some(phase) = patch.phase {
            self.transition_to(phase)?;
        }
        if let Some(intent) = patch.active_intent {
            self.set_intent(intent);
        }
        if let Some(tone) = patch.emotional_tone {
            self.set_emotional_tone(tone);
        }
        if let Some(goals) = patch.active_goals {
            self.set_goals(goals);
        }
        if let Some(context) = patch.context {
            for (key, value) in context {
                self.set_context(key, value);
            }
        }
        Ok(())
    }

    /// Undo the last `steps` recorded mutations
    ///
    /// Rolling back further than the retained history restores the oldest
    /// retained snapshot. Returns the number of steps actually undone.
    pub fn rollback(&mut self, steps: usize) -> usize {
        let count = steps.min(self.history.len());
        let mut restored = None;
        for _ in 0..count {
            restored = self.history.pop_back();
        }
        if let Some(snapshot) = restored {
            self.restore(snapshot);
        }
        self.revision = self.revision.saturating_sub(count as u64);
        count
    }

    /// Record `prior` as history when this state replaces it wholesale
    ///
    /// States derived from `prior` through the setters already carry its
    /// snapshot in their history, so nothing is pushed for them. Anything else
    /// built independently gets the prior state pushed, however many
    /// mutations it went through.
    pub fn absorb_prior(&mut self, prior: &SessionState) {
        let prior_snapshot = prior.snapshot();
        if self.descends_from(prior, &prior_snapshot) {
            return;
        }
        if self.snapshot() == prior_snapshot {
            return;
        }
        self.history = prior.history.clone();
        self.revision = prior.revision;
        self.push_snapshot(prior_snapshot);
    }

    /// Whether this state was reached from `prior` through the setters
    ///
    /// A derived state's history is prior's retained history followed by
    /// prior's own snapshot at the slot matching prior's revision.
    fn descends_from(&self, prior: &SessionState, prior_snapshot: &SessionSnapshot) -> bool {
        if self.revision <= prior.revision {
            return false;
        }
        let newer = (self.revision - prior.revision) as usize;
        let Some(slot) = self.history.len().checked_sub(newer) else {
            return false;
        };
        if self.history.get(slot) != Some(prior_snapshot) {
            return false;
        }
        // Whatever of prior's own history is still retained must line up
        let kept = slot.min(prior.history.len());
        self.history
            .range(slot - kept..slot)
            .eq(prior.history.range(prior.history.len() - kept..))
    }
}
