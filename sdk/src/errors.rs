//! Error types and handling
//!
//! This module provides the error types shared by the Somnus engine and the
//! collaborators that implement its capability contracts. All errors implement
//! the `SomnusErrorExt` trait which provides user-friendly hints and indicates
//! whether errors are recoverable.
//!
//! # Error Categories
//!
//! - **AiError**: failures raised by the AI capability. Every variant maps onto
//!   exactly one failure kind so the resilience layer can classify it by shape.
//! - **QualityBreach**: the fatal form of a CRITICAL quality alert.
//! - **StoreError**: failures raised by session, memory, trace or review stores.
//! - **EngineError**: configuration and runtime errors of the engine itself.

use crate::session::TransitionError;
use crate::types::QualityAlert;
use thiserror::Error;

/// Trait for Somnus error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information.
pub trait SomnusErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain secrets,
    /// prompts or provider payloads.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors need a configuration change or manual intervention.
    fn is_recoverable(&self) -> bool;
}

/// A CRITICAL quality alert promoted to a control-flow event
#[derive(Debug, Clone, Error, PartialEq)]
#[error(
    "Quality gate breached: {} = {} (threshold {})",
    .alert.metric,
    .alert.current_value,
    .alert.threshold
)]
pub struct QualityBreach {
    /// The alert that caused the breach
    pub alert: QualityAlert,
}

impl QualityBreach {
    pub fn new(alert: QualityAlert) -> Self {
        Self { alert }
    }
}

/// Errors raised by the AI capability
#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Response did not match schema: {0}")]
    Schema(String),

    #[error("Content blocked by safety filter: {0}")]
    Safety(String),

    #[error("Token limit exceeded: {0}")]
    TokenLimit(String),

    #[error(transparent)]
    Quality(#[from] QualityBreach),

    #[error("AI error: {0}")]
    Other(String),
}

impl SomnusErrorExt for AiError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Timeout => "The storyteller took too long to answer. Try again",
            Self::Network(_) => "Network operation failed. Check your connection",
            Self::RateLimited => "Too many requests. Please wait a moment",
            Self::Auth(_) => "Model provider rejected the credentials. Check your API key",
            Self::BadRequest(_) => "The request was rejected by the model provider",
            Self::Server { .. } => "The model provider is having trouble. Try again shortly",
            Self::Schema(_) => "The model returned an unexpected answer",
            Self::Safety(_) => "The answer was withheld by a safety filter",
            Self::TokenLimit(_) => "The conversation is too long for the model",
            Self::Quality(_) => "Quality threshold breached. Safe mode engaged",
            Self::Other(_) => "The model provider returned an error",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Auth(_) | Self::BadRequest(_))
    }
}

/// Errors raised by persistence collaborators
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl SomnusErrorExt for StoreError {
    fn user_hint(&self) -> &str {
        match self {
            Self::NotFound(_) => "The requested record does not exist",
            Self::Serialization(_) => "Stored data could not be decoded",
            Self::Backend(_) => "Storage operation failed. Try again",
            Self::Transition(_) => "The session cannot move to that phase",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, SomnusErrorExt};
///
/// let error = EngineError::SessionNotFound("s-1".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(!error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // LLM provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    #[error("LLM call timed out")]
    LLMTimeout,

    // Session errors
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SomnusErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Database operation failed. Check the data directory",
            Self::LLMProvider(_) => "LLM provider unavailable. Check your API keys and network",
            Self::LLMTimeout => "LLM provider took too long to respond. Try again",
            Self::SessionNotFound(_) => "Start the session before sending turns",
            Self::InvalidArgument(_) => "Check the command arguments",
            Self::Network(_) => "Network operation failed. Check your connection",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Config(_) | Self::SessionNotFound(_) | Self::InvalidArgument(_)
        )
    }
}
