//! Somnus Engine Library
//!
//! Orchestration core for goal-directed bedtime story sessions. It is used by
//! both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Telemetry and Observability
pub mod telemetry;

/// Database persistence module
pub mod db;

/// Message bus for inter-component communication
pub mod message_bus;

/// LLM provider abstraction layer
pub mod llm;

/// Latency and quality thresholds
pub mod quality;

/// Failure classification and recovery planning
pub mod resilience;

/// Staged content verification
pub mod verification;

/// Episodic to semantic memory consolidation
pub mod memory;

/// Conductor orchestration module
pub mod conductor;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
