//! Client event bus: tells renderers when merged insight state changes.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::insights::Section;

/// Overall sync indicator shown next to the dashboard content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// No content yet; a round is running or scheduled.
    Loading,
    /// Content is available (possibly stale while later rounds fail).
    Live,
    /// Every automatic retry came back empty; waiting for a manual retry.
    Failed,
}

/// Events emitted by the orchestrator. Every variant except `SectionFailed`
/// and `RetryScheduled` means the merged state may have changed and should be
/// re-rendered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InsightEvent {
    /// Today's persisted state was restored before any network call.
    Hydrated { sections: usize },
    /// A section arrived and was merged.
    SectionMerged { section: Section, attempt: u32 },
    /// A section attempt failed.
    SectionFailed {
        section: Section,
        attempt: u32,
        error: String,
    },
    /// A fetch round finished.
    RoundSettled { merged: usize, failed: usize },
    /// An empty round scheduled a whole-round retry.
    RetryScheduled { attempt: u32, delay_ms: u64 },
    /// The sync indicator changed.
    StatusChanged { status: SyncStatus },
    /// The calendar day changed; in-session state was discarded.
    RolledOver { from: String, to: String },
}

/// Broadcast-based event bus for insight state changes.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<InsightEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Send an event to all subscribers. Silently drops if no subscribers.
    pub fn send(&self, event: InsightEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InsightEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_send_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.send(InsightEvent::SectionMerged {
            section: Section::UsYouth,
            attempt: 1,
        });
        match rx.recv().await.unwrap() {
            InsightEvent::SectionMerged { section, attempt } => {
                assert_eq!(section, Section::UsYouth);
                assert_eq!(attempt, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_event_bus_no_subscribers_no_panic() {
        let bus = EventBus::new(4);
        bus.send(InsightEvent::RoundSettled { merged: 0, failed: 12 });
        // Late subscribers only see events sent after they joined.
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_serialization() {
        let event = InsightEvent::StatusChanged {
            status: SyncStatus::Live,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"status_changed","status":"live"}"#);

        let json = serde_json::to_string(&InsightEvent::SectionFailed {
            section: Section::GlobalDaily,
            attempt: 2,
            error: "timeout".into(),
        })
        .unwrap();
        assert!(json.contains(r#""section":"global_daily""#));
    }
}
