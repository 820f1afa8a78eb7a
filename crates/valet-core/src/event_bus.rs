//! In-memory per-session operation record store with fan-out pub/sub.
//!
//! The bus owns every [`OperationRecord`] for its process lifetime. All
//! mutations happen under one coarse lock held only for the in-memory change,
//! never across an await. Delivery to subscribers is best-effort: a full
//! subscriber queue drops the event rather than blocking the publisher, and
//! late joiners recover through the synthetic `initial_state` event.

use crate::error::{Result, ValetError};
use crate::operation::{OperationRecord, OperationStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Events published to session subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationEvent {
    /// Snapshot of every stored record, sent once on subscribe.
    InitialState { operations: Vec<OperationRecord> },
    /// A new record entered the store in `pending` state.
    OpCreated { operation: OperationRecord },
    /// A record changed status or result.
    OpUpdated { operation: OperationRecord },
    /// All records for the session were deleted ahead of a new query.
    OpsCleared,
}

/// Handle identifying one subscriber queue for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u64);

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<OperationEvent>,
}

#[derive(Default)]
struct BusState {
    records: HashMap<String, Vec<OperationRecord>>,
    subscribers: HashMap<String, Vec<Subscriber>>,
    next_subscriber_id: u64,
}

/// The per-session operation store and publish/subscribe fan-out.
pub struct OperationEventBus {
    state: Mutex<BusState>,
    queue_capacity: usize,
}

impl OperationEventBus {
    pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_QUEUE_CAPACITY)
    }

    /// `queue_capacity` bounds each subscriber queue; events beyond it drop.
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            queue_capacity,
        }
    }

    /// Inserts a new pending record and publishes `op_created`.
    pub fn create(
        &self,
        name: impl Into<String>,
        parameters: Map<String, Value>,
        session_id: &str,
    ) -> OperationRecord {
        let record = OperationRecord::new(name, parameters, session_id);
        let mut state = self.lock();
        state
            .records
            .entry(session_id.to_string())
            .or_default()
            .push(record.clone());
        publish(
            &mut state,
            session_id,
            OperationEvent::OpCreated {
                operation: record.clone(),
            },
        );
        record
    }

    /// Mutates a record in place and publishes `op_updated`.
    ///
    /// A `running` transition stamps `started_at`; terminal transitions stamp
    /// `completed_at`. A `cancel_requested` write latches the record's
    /// `cancel_requested` flag, which no later write clears. Terminal records
    /// accept no further writes: the stored record is returned untouched and
    /// no event is published.
    pub fn update(
        &self,
        operation_id: &str,
        status: Option<OperationStatus>,
        result: Option<String>,
    ) -> Result<OperationRecord> {
        let mut state = self.lock();
        let mut found: Option<(String, OperationRecord, bool)> = None;
        for (session_id, records) in state.records.iter_mut() {
            if let Some(record) = records.iter_mut().find(|r| r.id == operation_id) {
                if record.status.is_terminal() {
                    found = Some((session_id.clone(), record.clone(), false));
                    break;
                }
                let now = chrono::Utc::now().to_rfc3339();
                if let Some(status) = status {
                    record.status = status;
                    if status == OperationStatus::Running && record.started_at.is_none() {
                        record.started_at = Some(now.clone());
                    }
                    if status == OperationStatus::CancelRequested {
                        record.cancel_requested = true;
                    }
                    if status.is_terminal() {
                        record.completed_at = Some(now);
                    }
                }
                if let Some(result) = result {
                    record.result = Some(result);
                }
                found = Some((session_id.clone(), record.clone(), true));
                break;
            }
        }

        let (session_id, record, changed) =
            found.ok_or_else(|| ValetError::not_found("operation", operation_id))?;
        if changed {
            publish(
                &mut state,
                &session_id,
                OperationEvent::OpUpdated {
                    operation: record.clone(),
                },
            );
        }
        Ok(record)
    }

    /// Returns a snapshot of every record for a session, in creation order.
    pub fn records(&self, session_id: &str) -> Vec<OperationRecord> {
        self.lock()
            .records
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Looks a single record up by id across all sessions.
    pub fn find(&self, operation_id: &str) -> Option<OperationRecord> {
        self.lock()
            .records
            .values()
            .flatten()
            .find(|r| r.id == operation_id)
            .cloned()
    }

    /// True when any of the given operation ids has had `cancel_requested`
    /// posted to it, regardless of the status it has since moved to.
    pub fn cancel_requested(&self, operation_ids: &[String]) -> bool {
        let state = self.lock();
        state
            .records
            .values()
            .flatten()
            .any(|r| r.cancel_requested && operation_ids.contains(&r.id))
    }

    /// Deletes all records for a session and publishes `ops_cleared`.
    pub fn clear(&self, session_id: &str) {
        let mut state = self.lock();
        state.records.remove(session_id);
        publish(&mut state, session_id, OperationEvent::OpsCleared);
    }

    /// Registers a subscriber queue for a session.
    ///
    /// The queue first receives an `initial_state` snapshot, so a late-joining
    /// client reconstructs current state before incremental updates arrive.
    pub fn subscribe(
        &self,
        session_id: &str,
    ) -> (SubscriberId, mpsc::Receiver<OperationEvent>) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let mut state = self.lock();
        let snapshot = state
            .records
            .get(session_id)
            .cloned()
            .unwrap_or_default();
        // Capacity is at least 1, so the snapshot always fits a fresh queue.
        let _ = tx.try_send(OperationEvent::InitialState {
            operations: snapshot,
        });
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        state
            .subscribers
            .entry(session_id.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        (SubscriberId(id), rx)
    }

    /// Deregisters a subscriber queue.
    pub fn unsubscribe(&self, session_id: &str, subscriber: SubscriberId) {
        let mut state = self.lock();
        if let Some(subs) = state.subscribers.get_mut(session_id) {
            subs.retain(|s| s.id != subscriber.0);
            if subs.is_empty() {
                state.subscribers.remove(session_id);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusState> {
        // Lock poisoning only happens if a holder panicked; the state itself
        // stays consistent because mutations are single assignments.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for OperationEventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn publish(state: &mut BusState, session_id: &str, event: OperationEvent) {
    if let Some(subs) = state.subscribers.get_mut(session_id) {
        subs.retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => true,
            // Full queue: drop this event, keep the subscriber.
            Err(mpsc::error::TrySendError::Full(_)) => true,
            // Receiver gone: prune.
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if subs.is_empty() {
            state.subscribers.remove(session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::Receiver<OperationEvent>) -> Vec<OperationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_event_ordering() {
        let bus = OperationEventBus::new();
        let (_id, mut rx) = bus.subscribe("s1");

        let mut ids = Vec::new();
        for name in ["op_a", "op_b", "op_c"] {
            ids.push(bus.create(name, Map::new(), "s1").id);
        }
        for id in &ids {
            bus.update(id, Some(OperationStatus::Success), Some("done".into()))
                .unwrap();
        }

        let events = drain(&mut rx);
        assert_eq!(events.len(), 7);
        assert!(matches!(&events[0], OperationEvent::InitialState { operations } if operations.is_empty()));
        for (i, name) in ["op_a", "op_b", "op_c"].iter().enumerate() {
            match &events[1 + i] {
                OperationEvent::OpCreated { operation } => assert_eq!(&operation.name, name),
                other => panic!("expected op_created, got {:?}", other),
            }
        }
        for (i, id) in ids.iter().enumerate() {
            match &events[4 + i] {
                OperationEvent::OpUpdated { operation } => {
                    assert_eq!(&operation.id, id);
                    assert_eq!(operation.status, OperationStatus::Success);
                    assert!(operation.completed_at.is_some());
                }
                other => panic!("expected op_updated, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_initial_state_contains_existing_records() {
        let bus = OperationEventBus::new();
        bus.create("op1", Map::new(), "s1");
        bus.create("op2", Map::new(), "s1");

        let (_id, mut rx) = bus.subscribe("s1");
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            OperationEvent::InitialState { operations } => assert_eq!(operations.len(), 2),
            other => panic!("expected initial_state, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clear_before_requeue() {
        let bus = OperationEventBus::new();
        let record = bus.create("op", Map::new(), "s1");
        let (_id, mut rx) = bus.subscribe("s1");

        bus.clear("s1");

        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(OperationEvent::OpsCleared)));
        assert!(bus.records("s1").is_empty());
        assert!(bus.find(&record.id).is_none());

        // A later subscriber sees an empty snapshot.
        let (_id2, mut rx2) = bus.subscribe("s1");
        let events = drain(&mut rx2);
        assert!(matches!(&events[0], OperationEvent::InitialState { operations } if operations.is_empty()));
    }

    #[tokio::test]
    async fn test_fan_out_to_multiple_subscribers() {
        let bus = OperationEventBus::new();
        let (_a, mut rx_a) = bus.subscribe("s1");
        let (_b, mut rx_b) = bus.subscribe("s1");

        bus.create("op", Map::new(), "s1");

        assert_eq!(drain(&mut rx_a).len(), 2); // initial_state + op_created
        assert_eq!(drain(&mut rx_b).len(), 2);
    }

    #[tokio::test]
    async fn test_no_cross_session_delivery() {
        let bus = OperationEventBus::new();
        let (_a, mut rx_other) = bus.subscribe("other");

        bus.create("op", Map::new(), "s1");

        let events = drain(&mut rx_other);
        assert_eq!(events.len(), 1); // only its own initial_state
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let bus = OperationEventBus::with_capacity(2);
        let (_id, mut rx) = bus.subscribe("s1");

        for i in 0..10 {
            bus.create(format!("op{i}"), Map::new(), "s1");
        }

        // Queue held initial_state plus one created event; the rest dropped.
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        // Publisher side is unaffected: all records exist.
        assert_eq!(bus.records("s1").len(), 10);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = OperationEventBus::new();
        let (id, mut rx) = bus.subscribe("s1");
        drain(&mut rx);

        bus.unsubscribe("s1", id);
        bus.create("op", Map::new(), "s1");

        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_operation() {
        let bus = OperationEventBus::new();
        let err = bus
            .update("missing", Some(OperationStatus::Success), None)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_cancel_survives_terminal_write() {
        let bus = OperationEventBus::new();
        let record = bus.create("op", Map::new(), "s1");
        let ids = vec![record.id.clone()];

        bus.update(&record.id, Some(OperationStatus::Running), None)
            .unwrap();
        bus.update(&record.id, Some(OperationStatus::CancelRequested), None)
            .unwrap();
        // The dispatcher finishes the in-flight call and writes its outcome.
        bus.update(&record.id, Some(OperationStatus::Success), Some("done".into()))
            .unwrap();

        let stored = bus.find(&record.id).unwrap();
        assert_eq!(stored.status, OperationStatus::Success);
        assert!(bus.cancel_requested(&ids));
    }

    #[tokio::test]
    async fn test_terminal_record_rejects_further_writes() {
        let bus = OperationEventBus::new();
        let record = bus.create("op", Map::new(), "s1");
        let (_id, mut rx) = bus.subscribe("s1");
        bus.update(&record.id, Some(OperationStatus::Failed), Some("boom".into()))
            .unwrap();

        let late = bus
            .update(&record.id, Some(OperationStatus::Running), Some("late".into()))
            .unwrap();
        assert_eq!(late.status, OperationStatus::Failed);
        assert_eq!(late.result.as_deref(), Some("boom"));

        let stored = bus.find(&record.id).unwrap();
        assert_eq!(stored.status, OperationStatus::Failed);
        assert_eq!(stored.result.as_deref(), Some("boom"));

        // Only the first update published: initial_state + op_updated.
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_requested_detection() {
        let bus = OperationEventBus::new();
        let a = bus.create("a", Map::new(), "s1");
        let b = bus.create("b", Map::new(), "s1");
        let ids = vec![a.id.clone(), b.id.clone()];

        assert!(!bus.cancel_requested(&ids));
        bus.update(&b.id, Some(OperationStatus::CancelRequested), None)
            .unwrap();
        assert!(bus.cancel_requested(&ids));
    }
}
