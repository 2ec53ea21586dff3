//! Conductor System
//!
//! Orchestrates bedtime sessions: agenda planning, intent classification,
//! prompt construction and the reasoning loop with failure recovery.

pub mod agent;
pub mod intent;
pub mod planner;
pub mod prompts;
pub mod types;

pub use agent::{ConductorAgent, ConductorPorts, ConductorSettings, GOLDEN_MOMENT};
pub use intent::{Intent, IntentClassifier};
pub use planner::{AgendaItem, SessionPlanner};
pub use types::{
    SessionConfig, SessionDuration, SuggestionContext, TurnContext, TurnResult, TurnStatus,
};
