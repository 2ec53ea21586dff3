//! Episodic to semantic memory consolidation
//!
//! The summarizer condenses a bounded window of raw turn-level memories into
//! provenance-tagged facts. The consolidator decides when to run it, reacting
//! to session lifecycle events on the message bus.

use async_trait::async_trait;

pub mod consolidator;
pub mod summarizer;

pub use consolidator::{ConsolidationOutcome, SessionConsolidator};
pub use summarizer::MemorySummarizationService;

/// Anything able to consolidate one session's transcript
#[async_trait]
pub trait SessionSummarizer: Send + Sync {
    /// Consolidate the session and return the number of facts stored
    ///
    /// Failures are logged and absorbed; they never reach the caller.
    async fn summarize_session(&self, user_id: &str, session_id: &str) -> usize;
}
