use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ExecutionId;

/// An engine event, stamped with the execution it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEvent {
    pub execution_id: ExecutionId,
    pub timestamp: DateTime<Utc>,
    pub kind: FlowEventKind,
}

impl FlowEvent {
    pub fn new(execution_id: &ExecutionId, kind: FlowEventKind) -> Self {
        Self {
            execution_id: execution_id.clone(),
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEventKind {
    /// Top-level invocation started with these call-site argument names.
    ExecutionStarted { arguments: Vec<String> },
    /// Top-level invocation finished.
    ExecutionFinished { succeeded: bool, elapsed_ms: u64 },
    /// Agent call attempt started (attempt 0 is the first call).
    AgentStarted { agent: String, attempt: usize },
    /// Agent call succeeded and its output was written.
    AgentSucceeded {
        agent: String,
        output_name: String,
        elapsed_ms: u64,
    },
    /// Agent call attempt failed.
    AgentFailed {
        agent: String,
        attempt: usize,
        error: String,
    },
    /// A recovery handler decided how to treat a failure.
    RecoveryDecided { agent: String, action: RecoveryAction },
    /// Loop body iteration started (1-indexed).
    LoopIteration { iteration: usize, max_iterations: usize },
    /// Loop stopped; `satisfied` is false when the cap was reached.
    LoopExited { iterations: usize, satisfied: bool },
    /// Conditional branch activated (index in declaration order).
    BranchActivated { branch: usize },
}

/// Recovery outcome, as reported in events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    Throw,
    Fallback,
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<FlowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: FlowEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<FlowEvent> {
        self.tx.subscribe()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.tx.receiver_count())
            .finish()
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
    async fn test_subscribers_receive_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let id = ExecutionId::new();

        bus.publish(FlowEvent::new(&id, FlowEventKind::BranchActivated { branch: 1 }));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.execution_id, id);
        assert_eq!(event.kind, FlowEventKind::BranchActivated { branch: 1 });
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(FlowEvent::new(
            &ExecutionId::new(),
            FlowEventKind::LoopExited {
                iterations: 5,
                satisfied: false,
            },
        ));
    }

    #[test]
    fn test_event_serialization() {
        let event = FlowEvent::new(
            &ExecutionId::new(),
            FlowEventKind::RecoveryDecided {
                agent: "writer".into(),
                action: RecoveryAction::Fallback,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["type"], "recovery_decided");
        assert_eq!(json["kind"]["action"], "fallback");
    }
}
