//! Somnus SDK
//!
//! Shared library providing the data model, error taxonomy and capability
//! contracts of the Somnus orchestration core. Collaborators (model providers,
//! stores, review queues) implement the traits in [`capability`]; the engine
//! consumes them through trait objects.

/// Capability contracts consumed by the engine
pub mod capability;

/// Error types and handling
pub mod errors;

/// Helper utilities
pub mod helpers;

/// Session state and phase machine
pub mod session;

/// Shared domain types
pub mod types;

// Re-export commonly used types
pub use capability::{
    AgentMemoryStore, AiCapability, HumanReviewSink, PromptRequest, SessionStateStore, TraceLog,
};
pub use errors::{AiError, EngineError, QualityBreach, SomnusErrorExt, StoreError};
pub use session::{
    ActiveIntent, SessionPatch, SessionPhase, SessionSnapshot, SessionState, TransitionError,
};
pub use types::{
    CorrectionAction, CorrectionPlan, FailureKind, MemoryContext, MemoryKind, MemoryRecord,
    ModelTier, QualityAlert, ReasoningTrace, ResilienceEvent, ResilienceMeta, ReviewItem,
    SemanticFact, Severity, SourceAnchor, Suggestion, Thought, VerifiableContent,
    VerificationResult, VerificationStage, SAFE_MODE_ACTION, SAFE_MODE_NOTE,
};
