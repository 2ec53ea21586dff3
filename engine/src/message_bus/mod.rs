//! Message Bus for inter-component communication
//!
//! The MessageBus provides a pub/sub pattern for components to communicate
//! without tight coupling. It uses bounded channels to prevent unbounded
//! memory growth and supports both specific event subscriptions and global
//! "All" subscriptions.
//!
//! Subscribers drain their receiver on their own task, so a handler never
//! runs on the publishing turn. `publish` only waits for channel capacity.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 100;

/// Event types that can be published on the message bus
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    /// A session was initialized
    SessionStarted,
    /// A turn finished (any status)
    TurnCompleted,
    /// A turn degraded into safe mode
    SafeModeEntered,
    /// The user signalled they are falling asleep
    SleepCueDetected,
    /// One story beat was told
    StoryBeatCompleted,
    /// Subscribe to all event types
    All,
}

/// Payload of an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventPayload {
    #[serde(rename_all = "camelCase")]
    SessionStarted { session_id: String, user_id: String },
    #[serde(rename_all = "camelCase")]
    TurnCompleted {
        session_id: String,
        trace_id: String,
        action: String,
    },
    #[serde(rename_all = "camelCase")]
    SafeModeEntered { session_id: String, reason: String },
    /// Identifiers are optional; consumers fall back to a session lookup
    #[serde(rename_all = "camelCase")]
    SleepCueDetected {
        session_id: Option<String>,
        user_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    StoryBeatCompleted {
        session_id: String,
        beat_index: u32,
        total_beats: u32,
    },
}

/// Envelope published on the message bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    /// Correlates events raised while serving one request
    pub request_id: Option<String>,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap a payload with a fresh event id
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id: None,
            payload,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self.payload {
            EventPayload::SessionStarted { .. } => EventType::SessionStarted,
            EventPayload::TurnCompleted { .. } => EventType::TurnCompleted,
            EventPayload::SafeModeEntered { .. } => EventType::SafeModeEntered,
            EventPayload::SleepCueDetected { .. } => EventType::SleepCueDetected,
            EventPayload::StoryBeatCompleted { .. } => EventType::StoryBeatCompleted,
        }
    }
}

/// Message bus for pub/sub communication between components
///
/// The MessageBus allows components to subscribe to specific event types
/// or all events, and publish events to all subscribers. It uses bounded
/// channels to prevent unbounded memory growth.
pub struct MessageBus {
    /// Map of event types to lists of subscribers
    /// Each subscriber gets a bounded channel with CHANNEL_BUFFER_SIZE capacity
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<Event>>>>>,
}

impl MessageBus {
    /// Create a new MessageBus
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type
    ///
    /// Returns a receiver that will receive events of the specified type.
    /// The channel is bounded with CHANNEL_BUFFER_SIZE capacity to prevent
    /// unbounded memory growth.
    ///
    /// # Arguments
    /// * `event_type` - The type of events to subscribe to, or EventType::All for all events
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event to all subscribers
    ///
    /// The event is sent to all subscribers of the specific event type,
    /// as well as all subscribers of EventType::All. Subscribers whose
    /// receiver was dropped are pruned.
    pub async fn publish(&self, event: Event) {
        let mut channels = self.channels.lock().await;
        let event_type = event.event_type();

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                let mut live = Vec::with_capacity(subscribers.len());
                for tx in subscribers.drain(..) {
                    if tx.send(event.clone()).await.is_ok() {
                        live.push(tx);
                    }
                }
                *subscribers = live;
            }
        }
    }

    /// Number of live subscribers for an event type
    pub async fn subscriber_count(&self, event_type: EventType) -> usize {
        let channels = self.channels.lock().await;
        channels
            .get(&event_type)
            .map(|subscribers| subscribers.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
