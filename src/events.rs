//! Progress events from the processing pipeline.
//!
//! The pipeline emits events via [`EventBus::emit`] and the CLI subscribes via
//! [`EventBus::subscribe`]. Built on [`tokio::sync::broadcast`] so
//! multiple listeners can react independently.

use tokio::sync::broadcast;

/// Events that flow through the system.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A chunk was rewritten and stored.
    ChunkModernized { position: usize, total: usize },
    /// A chunk failed or timed out and will be retried on the next run.
    ChunkFailed { position: usize, error: String },
    /// A segment was synthesized and written to disk.
    SegmentSynthesized { index: usize, total: usize },
    /// An edition was published.
    EditionPublished { id: i64, share_code: String },
}

/// A broadcast channel that any component can emit to or subscribe from.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all current subscribers.
    /// Returns the number of receivers that will see it.
    pub fn emit(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events. Returns a receiver that yields all
    /// future events (does not replay past ones).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(Event::ChunkModernized {
            position: 3,
            total: 10,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            Event::ChunkModernized {
                position: 3,
                total: 10
            }
        );
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(Event::ChunkFailed {
            position: 0,
            error: "timed out".to_string(),
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();

        match (e1, e2) {
            (Event::ChunkFailed { error: a, .. }, Event::ChunkFailed { error: b, .. }) => {
                assert_eq!(a, "timed out");
                assert_eq!(b, "timed out");
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn emit_without_subscribers_returns_zero() {
        let bus = EventBus::default();
        let count = bus.emit(Event::SegmentSynthesized { index: 0, total: 1 });
        assert_eq!(count, 0);
    }

    #[test]
    fn clones_share_a_channel() {
        let bus = EventBus::default();
        let _rx1 = bus.subscribe();
        let _rx2 = bus.clone().subscribe();

        let count = bus.emit(Event::EditionPublished {
            id: 1,
            share_code: "abcd1234".to_string(),
        });
        assert_eq!(count, 2);
    }
}
