//! Session consolidator
//!
//! Subscribes to `SleepCueDetected` and `StoryBeatCompleted` and triggers
//! summarization at session boundaries:
//!
//! - sleep cue: ids come from the payload, falling back to a session lookup
//! - story beat: only the final beat (`beat_index >= total_beats - 1`) triggers,
//!   with the user resolved through the session store
//!
//! Events are drained on a background task and every trigger runs on its own
//! spawned task, so publishing a turn's events never waits for consolidation.

use sdk::capability::SessionStateStore;
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::SessionSummarizer;
use crate::message_bus::{Event, EventPayload, EventType, MessageBus};

/// What handling an event led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolidationOutcome {
    /// Summarization ran and stored this many facts
    Summarized {
        user_id: String,
        session_id: String,
        facts: usize,
    },
    /// The event qualified but its identifiers could not be resolved
    Skipped(String),
    /// The event does not trigger consolidation
    Ignored,
}

pub struct SessionConsolidator {
    summarizer: Arc<dyn SessionSummarizer>,
    sessions: Arc<dyn SessionStateStore>,
}

impl SessionConsolidator {
    pub fn new(summarizer: Arc<dyn SessionSummarizer>, sessions: Arc<dyn SessionStateStore>) -> Self {
        Self {
            summarizer,
            sessions,
        }
    }

    /// Handle one event, running summarization inline when it triggers
    pub async fn handle_event(&self, event: &Event) -> ConsolidationOutcome {
        match &event.payload {
            EventPayload::SleepCueDetected {
                session_id,
                user_id,
            } => {
                self.on_sleep_cue(session_id.as_deref(), user_id.as_deref())
                    .await
            }
            EventPayload::StoryBeatCompleted {
                session_id,
                beat_index,
                total_beats,
            } => {
                if *beat_index < total_beats.saturating_sub(1) {
                    debug!(%session_id, beat_index, total_beats, "Story not finished yet");
                    return ConsolidationOutcome::Ignored;
                }
                match self.lookup_user(session_id).await {
                    Some(user_id) => self.run(user_id, session_id.clone()).await,
                    None => skip(format!("No session state for {}", session_id)),
                }
            }
            _ => ConsolidationOutcome::Ignored,
        }
    }

    async fn on_sleep_cue(&self, session_id: Option<&str>, user_id: Option<&str>) -> ConsolidationOutcome {
        let Some(session_id) = session_id else {
            return skip("Sleep cue without a session id".to_string());
        };

        let user_id = match user_id {
            Some(user_id) => Some(user_id.to_string()),
            None => self.lookup_user(session_id).await,
        };

        match user_id {
            Some(user_id) => self.run(user_id, session_id.to_string()).await,
            None => skip(format!("Cannot resolve user for session {}", session_id)),
        }
    }

    async fn lookup_user(&self, session_id: &str) -> Option<String> {
        match self.sessions.get(session_id).await {
            Ok(state) => state.map(|state| state.user_id),
            Err(e) => {
                warn!(session_id, "Session lookup failed: {}", e);
                None
            }
        }
    }

    async fn run(&self, user_id: String, session_id: String) -> ConsolidationOutcome {
        let facts = self.summarizer.summarize_session(&user_id, &session_id).await;
        info!(%user_id, %session_id, facts, "Session consolidation finished");
        ConsolidationOutcome::Summarized {
            user_id,
            session_id,
            facts,
        }
    }

    /// Subscribe to the lifecycle events and consolidate in the background
    ///
    /// The returned handle finishes once the bus is dropped and every
    /// consolidation already started has completed.
    pub async fn spawn(self: Arc<Self>, bus: &MessageBus) -> JoinHandle<()> {
        let mut sleep_cues = bus.subscribe(EventType::SleepCueDetected).await;
        let mut beats = bus.subscribe(EventType::StoryBeatCompleted).await;

        tokio::spawn(async move {
            let mut running = JoinSet::new();
            let mut sleep_open = true;
            let mut beats_open = true;

            while sleep_open || beats_open {
                let event = tokio::select! {
                    event = sleep_cues.recv(), if sleep_open => match event {
                        Some(event) => event,
                        None => {
                            sleep_open = false;
                            continue;
                        }
                    },
                    event = beats.recv(), if beats_open => match event {
                        Some(event) => event,
                        None => {
                            beats_open = false;
                            continue;
                        }
                    },
                    Some(_) = running.join_next(), if !running.is_empty() => continue,
                };

                let consolidator = Arc::clone(&self);
                running.spawn(async move {
                    consolidator.handle_event(&event).await;
                });
            }

            while running.join_next().await.is_some() {}
            debug!("Session consolidator stopped");
        })
    }
}

fn skip(reason: String) -> ConsolidationOutcome {
    warn!("Skipping consolidation: {}", reason);
    ConsolidationOutcome::Skipped(reason)
}
