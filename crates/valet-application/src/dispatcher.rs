//! Operation dispatch with guaranteed terminal-state recording.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use valet_core::event_bus::OperationEventBus;
use valet_core::operation::{CallerIdentity, OperationHandler, OperationStatus};

/// The normalized result of one operation invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub success: bool,
    pub message: String,
}

impl DispatchOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Invokes operation handlers and records their lifecycle on the event bus.
///
/// No retries happen here: exactly one invocation per call, and every call
/// ends with the record in a terminal state.
pub struct OperationDispatcher {
    handlers: HashMap<String, Arc<dyn OperationHandler>>,
    bus: Arc<OperationEventBus>,
    operation_timeout: Duration,
}

impl OperationDispatcher {
    pub fn new(
        handlers: Vec<Arc<dyn OperationHandler>>,
        bus: Arc<OperationEventBus>,
        operation_timeout: Duration,
    ) -> Self {
        let handlers = handlers
            .into_iter()
            .map(|h| (h.name().to_string(), h))
            .collect();
        Self {
            handlers,
            bus,
            operation_timeout,
        }
    }

    /// Runs one operation against the record identified by `operation_id`.
    ///
    /// The record moves pending -> running -> success|failed; the outcome
    /// message lands in the record's `result`.
    pub async fn execute(
        &self,
        operation_id: &str,
        name: &str,
        params: &Map<String, Value>,
        caller: Option<&CallerIdentity>,
    ) -> DispatchOutcome {
        self.transition(operation_id, OperationStatus::Running, None);

        let outcome = match self.handlers.get(name) {
            None => DispatchOutcome::failed(format!("Operation '{name}' is not implemented")),
            Some(handler) if handler.requires_identity() && caller.is_none() => {
                DispatchOutcome::failed(format!(
                    "Operation '{name}' requires a signed-in user"
                ))
            }
            Some(handler) => {
                match tokio::time::timeout(self.operation_timeout, handler.call(params)).await {
                    Ok(Ok(message)) => DispatchOutcome::ok(message),
                    Ok(Err(message)) => DispatchOutcome::failed(message),
                    Err(_) => DispatchOutcome::failed(format!(
                        "Operation '{name}' timed out after {}s",
                        self.operation_timeout.as_secs()
                    )),
                }
            }
        };

        let status = if outcome.success {
            OperationStatus::Success
        } else {
            OperationStatus::Failed
        };
        self.transition(operation_id, status, Some(outcome.message.clone()));
        info!(
            target: "valet::dispatch",
            operation_id,
            name,
            success = outcome.success,
            "operation finished"
        );
        outcome
    }

    fn transition(&self, operation_id: &str, status: OperationStatus, result: Option<String>) {
        if let Err(err) = self.bus.update(operation_id, Some(status), result) {
            warn!(
                target: "valet::dispatch",
                operation_id,
                error = %err,
                "failed to record status transition"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubHandler {
        name: &'static str,
        result: Result<String, String>,
        needs_identity: bool,
    }

    #[async_trait]
    impl OperationHandler for StubHandler {
        fn name(&self) -> &str {
            self.name
        }

        fn requires_identity(&self) -> bool {
            self.needs_identity
        }

        async fn call(&self, _params: &Map<String, Value>) -> Result<String, String> {
            self.result.clone()
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl OperationHandler for SlowHandler {
        fn name(&self) -> &str {
            "slow_op"
        }

        async fn call(&self, _params: &Map<String, Value>) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("never".to_string())
        }
    }

    fn dispatcher_with(
        handlers: Vec<Arc<dyn OperationHandler>>,
        timeout: Duration,
    ) -> (Arc<OperationEventBus>, OperationDispatcher) {
        let bus = Arc::new(OperationEventBus::new());
        let dispatcher = OperationDispatcher::new(handlers, bus.clone(), timeout);
        (bus, dispatcher)
    }

    #[tokio::test]
    async fn test_success_records_terminal_state() {
        let (bus, dispatcher) = dispatcher_with(
            vec![Arc::new(StubHandler {
                name: "send_email",
                result: Ok("sent".to_string()),
                needs_identity: false,
            })],
            Duration::from_secs(5),
        );
        let record = bus.create("send_email", Map::new(), "s1");
        let outcome = dispatcher
            .execute(&record.id, "send_email", &Map::new(), None)
            .await;
        assert!(outcome.success);

        let stored = bus.find(&record.id).unwrap();
        assert_eq!(stored.status, OperationStatus::Success);
        assert_eq!(stored.result.as_deref(), Some("sent"));
        assert!(stored.started_at.is_some());
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_operation_fails_without_invocation() {
        let (bus, dispatcher) = dispatcher_with(vec![], Duration::from_secs(5));
        let record = bus.create("mystery", Map::new(), "s1");
        let outcome = dispatcher
            .execute(&record.id, "mystery", &Map::new(), None)
            .await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("not implemented"));
        assert_eq!(
            bus.find(&record.id).unwrap().status,
            OperationStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_missing_identity_fails_operation() {
        let (bus, dispatcher) = dispatcher_with(
            vec![Arc::new(StubHandler {
                name: "send_email",
                result: Ok("sent".to_string()),
                needs_identity: true,
            })],
            Duration::from_secs(5),
        );
        let record = bus.create("send_email", Map::new(), "s1");
        let outcome = dispatcher
            .execute(&record.id, "send_email", &Map::new(), None)
            .await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("signed-in user"));
    }

    #[tokio::test]
    async fn test_identity_present_invokes_handler() {
        let (bus, dispatcher) = dispatcher_with(
            vec![Arc::new(StubHandler {
                name: "send_email",
                result: Ok("sent".to_string()),
                needs_identity: true,
            })],
            Duration::from_secs(5),
        );
        let record = bus.create("send_email", Map::new(), "s1");
        let caller = CallerIdentity {
            user_id: "u1".to_string(),
        };
        let outcome = dispatcher
            .execute(&record.id, "send_email", &Map::new(), Some(&caller))
            .await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_timeout_marks_failed() {
        let (bus, dispatcher) = dispatcher_with(
            vec![Arc::new(SlowHandler)],
            Duration::from_millis(20),
        );
        let record = bus.create("slow_op", Map::new(), "s1");
        let outcome = dispatcher
            .execute(&record.id, "slow_op", &Map::new(), None)
            .await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("timed out"));
        assert_eq!(
            bus.find(&record.id).unwrap().status,
            OperationStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_failure_message_recorded_verbatim() {
        let (bus, dispatcher) = dispatcher_with(
            vec![Arc::new(StubHandler {
                name: "send_email",
                result: Err("SMTP auth failed".to_string()),
                needs_identity: false,
            })],
            Duration::from_secs(5),
        );
        let record = bus.create("send_email", Map::new(), "s1");
        let outcome = dispatcher
            .execute(&record.id, "send_email", &Map::new(), None)
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "SMTP auth failed");
        assert_eq!(
            bus.find(&record.id).unwrap().result.as_deref(),
            Some("SMTP auth failed")
        );
    }
}
