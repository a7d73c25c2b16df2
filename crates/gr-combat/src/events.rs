//! Push notifications for finished sessions.
//!
//! Delivery is best effort. A failing sink is logged and otherwise ignored.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;
use crate::session::CombatResult;

/// Channel name clients subscribe to.
pub const RESULT_EVENT: &str = "combat:result";

/// Payload of a `combat:result` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEvent {
    /// The finished session.
    pub session_id: SessionId,
    /// Its result.
    pub result: CombatResult,
}

/// Error returned by a sink that could not deliver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event delivery failed: {0}")]
pub struct SinkError(pub String);

/// Where result events go.
pub trait EventSink: Send + Sync {
    /// Deliver an event on `channel`.
    fn publish(&self, channel: &str, event: &ResultEvent) -> Result<(), SinkError>;
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _channel: &str, _event: &ResultEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps every event in memory, for tests and the CLI.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, ResultEvent)>>,
    failing: Mutex<bool>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// Events received so far.
    pub fn events(&self) -> Vec<(String, ResultEvent)> {
        self.events.lock().clone()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, channel: &str, event: &ResultEvent) -> Result<(), SinkError> {
        if *self.failing.lock() {
            return Err(SinkError("recording sink set to fail".to_string()));
        }
        self.events.lock().push((channel.to_string(), event.clone()));
        Ok(())
    }
}
