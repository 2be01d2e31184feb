//! Progress events
//!
//! In-process event bus for following a run from the outside (CLI progress
//! output, tests) without touching the orchestrator's state.
//!
//! The bus uses `tokio::sync::broadcast`. If no subscribers exist, events are
//! dropped immediately; lagging subscribers never block the emitter.
//!
//! # Example
//!
//! ```no_run
//! use libengage::events::{Event, EventBus};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(Event::CheckpointSaved {
//!     path: "/tmp/checkpoint.json".to_string(),
//!     records: 3,
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::orchestrator::RunState;
use crate::stats::RunStats;
use crate::types::ActionRecord;

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers. Never blocks or fails.
    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Events emitted by the orchestrator during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    StateChanged {
        from: RunState,
        to: RunState,
    },

    /// A record was appended to the session log
    ActionRecorded { record: ActionRecord },

    /// The run is sleeping; `batch` distinguishes batch pauses from action delays
    Paused { seconds: f64, batch: bool },

    CheckpointSaved { path: String, records: usize },

    /// The calendar day changed and counters were reset
    DayRolledOver { from: NaiveDate, to: NaiveDate },

    RunFinished {
        /// `completed` or `aborted`
        outcome: String,
        stats: RunStats,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionKind;
    use chrono::Utc;

    #[tokio::test]
    async fn test_event_emission_and_subscription() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        event_bus.emit(Event::StateChanged {
            from: RunState::Discovering,
            to: RunState::ActionPending,
        });

        match receiver.recv().await.unwrap() {
            Event::StateChanged { from, to } => {
                assert_eq!(from, RunState::Discovering);
                assert_eq!(to, RunState::ActionPending);
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        event_bus.emit(Event::ActionRecorded {
            record: ActionRecord::success("alice", ActionKind::Like, Utc::now()),
        });

        for receiver in [&mut receiver1, &mut receiver2] {
            match receiver.recv().await.unwrap() {
                Event::ActionRecorded { record } => assert_eq!(record.target_id, "alice"),
                other => panic!("Wrong event type received: {:?}", other),
            }
        }
    }

    #[test]
    fn test_no_subscribers() {
        let event_bus = EventBus::new(10);
        event_bus.emit(Event::Paused {
            seconds: 3.5,
            batch: false,
        });
        assert_eq!(event_bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::DayRolledOver {
            from: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            to: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"day_rolled_over\""));
        assert!(json.contains("2025-06-02"));
    }
}
