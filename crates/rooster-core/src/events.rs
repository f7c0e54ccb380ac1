//! Schedule notifications.
//!
//! The orchestrator publishes a [`ScheduleEvent`] after every state change.
//! Delivery is fire-and-forget over a `broadcast` channel: lagging or absent
//! receivers never hold up scheduling.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;

use rooster_types::AlarmId;

/// Events emitted by the [`ScheduleOrchestrator`](crate::ScheduleOrchestrator).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ScheduleEvent {
    /// A timer was armed for the alarm's next occurrence.
    Scheduled {
        id: AlarmId,
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
        approximate: bool,
    },
    /// The alarm was snoozed until `at`.
    Snoozed {
        id: AlarmId,
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
        remaining: u32,
    },
    /// The alarm's timer was cancelled.
    Cancelled { id: AlarmId },
    /// A one-shot alarm fired and was disabled.
    Finalized { id: AlarmId },
    /// Scheduling failed.
    Failed { id: AlarmId, error: String },
}

impl ScheduleEvent {
    pub fn id(&self) -> AlarmId {
        match self {
            Self::Scheduled { id, .. }
            | Self::Snoozed { id, .. }
            | Self::Cancelled { id }
            | Self::Finalized { id }
            | Self::Failed { id, .. } => *id,
        }
    }
}

/// Sender for schedule events.
pub type EventSender = broadcast::Sender<ScheduleEvent>;

/// Receiver for schedule events.
pub type EventReceiver = broadcast::Receiver<ScheduleEvent>;

/// Broadcasts schedule events to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn send(&self, event: ScheduleEvent) {
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[tokio::test]
    async fn test_dispatch_to_subscriber() {
        let dispatcher = EventDispatcher::default();
        let mut rx = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 1);

        dispatcher.send(ScheduleEvent::Cancelled { id: AlarmId(3) });
        let event = rx.recv().await.unwrap();
        assert_eq!(event, ScheduleEvent::Cancelled { id: AlarmId(3) });
        assert_eq!(event.id(), AlarmId(3));
    }

    #[test]
    fn test_send_without_subscribers() {
        let dispatcher = EventDispatcher::new(4);
        dispatcher.send(ScheduleEvent::Finalized { id: AlarmId(1) });
        assert_eq!(dispatcher.receiver_count(), 0);
    }

    #[test]
    fn test_event_json() {
        let event = ScheduleEvent::Scheduled {
            id: AlarmId(7),
            at: datetime!(2024-03-05 07:00 UTC),
            approximate: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"type":"scheduled","id":7,"at":"2024-03-05T07:00:00Z","approximate":false}"#
        );
    }
}
