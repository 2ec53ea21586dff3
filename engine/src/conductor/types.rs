//! Conductor request and result types

use sdk::session::SessionPhase;
use sdk::types::{MemoryRecord, ReasoningTrace};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Requested length of a bedtime session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionDuration {
    Short,
    #[default]
    Medium,
    Long,
}

impl SessionDuration {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionDuration::Short => "short",
            SessionDuration::Medium => "medium",
            SessionDuration::Long => "long",
        }
    }
}

impl fmt::Display for SessionDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "short" => Ok(SessionDuration::Short),
            "medium" => Ok(SessionDuration::Medium),
            "long" => Ok(SessionDuration::Long),
            other => Err(format!("unknown session duration '{other}'")),
        }
    }
}

/// Input to `conduct_story_session`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub session_id: String,
    pub user_id: String,
    #[serde(default)]
    pub duration: SessionDuration,
    /// Optional story theme requested up front
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub child_name: Option<String>,
}

impl SessionConfig {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            duration: SessionDuration::default(),
            theme: None,
            child_name: None,
        }
    }

    pub fn with_duration(mut self, duration: SessionDuration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }
}

/// Per-turn request context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnContext {
    pub session_id: String,
    /// Correlates bus events raised by this turn
    #[serde(default)]
    pub request_id: Option<String>,
}

impl TurnContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// How a turn ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnStatus {
    /// The model produced the reply
    Completed,
    /// A safe mode or fallback reply was substituted
    Degraded,
    /// The turn was aborted; state was left untouched
    Failed,
}

/// Result of a session start or a turn
///
/// Always carries a reply and a trace, even when degraded or failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    pub reply: String,
    pub trace: ReasoningTrace,
    pub status: TurnStatus,
    pub phase: SessionPhase,
}

/// Input to `generate_suggestions`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionContext {
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Recent memories to ground the suggestions in
    #[serde(default)]
    pub recent_memories: Vec<MemoryRecord>,
    #[serde(default)]
    pub limit: Option<usize>,
}
