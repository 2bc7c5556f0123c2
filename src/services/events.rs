//! Event system for evaluation lifecycle transitions
//!
//! Services emit one event per committed state change. Subscribers use them
//! for audit trails; nothing in the write path waits on a listener.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Which response shape an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Standard,
    Heuristic,
}

/// Events emitted by services
#[derive(Debug, Clone, PartialEq)]
pub enum SurveyEvent {
    AccessGranted {
        evaluator_id: i64,
        test_id: i64,
    },
    AccessUnlocked {
        evaluator_id: i64,
        test_id: i64,
    },
    AccessVisibilityChanged {
        evaluator_id: i64,
        test_id: i64,
        hidden: bool,
    },
    DraftSaved {
        evaluator_id: i64,
        test_id: i64,
        kind: ResponseKind,
        count: usize,
    },
    ResponsesFinalized {
        evaluator_id: i64,
        test_id: i64,
        kind: ResponseKind,
        count: usize,
    },
    CatalogSeeded {
        heuristics: usize,
        subprinciples: usize,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &SurveyEvent);
}

/// Event bus for broadcasting lifecycle events
pub struct EventBus {
    sender: broadcast::Sender<SurveyEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: SurveyEvent) {
        trace!(event = ?event, "Emitting survey event");
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<SurveyEvent> {
        self.sender.subscribe()
    }

    /// Forward events to a listener on a background task
    pub fn spawn_listener(&self, listener: Arc<dyn EventListener>) -> tokio::task::JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => listener.on_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Event listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener that writes every event to the tracing log
pub struct AuditLogListener;

impl EventListener for AuditLogListener {
    fn on_event(&self, event: &SurveyEvent) {
        tracing::info!(target: "usability_store::audit", event = ?event, "survey event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<SurveyEvent>>);

    impl EventListener for Recorder {
        fn on_event(&self, event: &SurveyEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new();
        bus.emit(SurveyEvent::AccessGranted { evaluator_id: 1, test_id: 1 });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(SurveyEvent::AccessUnlocked { evaluator_id: 1, test_id: 2 });
        assert_eq!(
            rx.recv().await.unwrap(),
            SurveyEvent::AccessUnlocked { evaluator_id: 1, test_id: 2 }
        );
    }

    #[tokio::test]
    async fn test_listener_task_forwards_events() {
        let bus = EventBus::new();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let handle = bus.spawn_listener(recorder.clone());

        bus.emit(SurveyEvent::CatalogSeeded { heuristics: 12, subprinciples: 71 });
        drop(bus);
        handle.await.unwrap();

        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }
}
