//! Top-level per-query workflow state machine.

use crate::classifier::{Classification, Classifier};
use crate::executor::{AgenticExecutor, QueuedOperation};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};
use valet_core::event_bus::OperationEventBus;
use valet_core::memory::MemoryStore;
use valet_core::operation::{CallerIdentity, OperationRegistry};
use valet_core::profile::ProfileRepository;
use valet_core::session::{Session, SessionRepository, TurnRole};
use valet_core::Result;

const GENERIC_FAILURE: &str = "I could not process that request. Please try again.";
const SNAPSHOT_FACTS: usize = 10;

/// What the caller gets back from `submit`, before any background execution.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum QueryOutcome {
    Direct {
        session_id: String,
        display_response: String,
    },
    Agentic {
        session_id: String,
        operations: Vec<QueuedOperationInfo>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct QueuedOperationInfo {
    pub id: String,
    pub name: String,
    pub parameters: Map<String, Value>,
}

/// Workflow states for one query. A fresh machine runs per submission; the
/// only cross-query state is session history and the per-session bus records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkflowState {
    Received,
    Classifying,
    DirectResponding,
    AgenticQueued,
    AgenticRunning,
    Completed,
    Errored,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::Received => "received",
            WorkflowState::Classifying => "classifying",
            WorkflowState::DirectResponding => "direct_responding",
            WorkflowState::AgenticQueued => "agentic_queued",
            WorkflowState::AgenticRunning => "agentic_running",
            WorkflowState::Completed => "completed",
            WorkflowState::Errored => "errored",
        };
        f.write_str(name)
    }
}

pub struct WorkflowOrchestrator {
    sessions: Arc<dyn SessionRepository>,
    profiles: Arc<dyn ProfileRepository>,
    memory: Arc<dyn MemoryStore>,
    registry: Arc<OperationRegistry>,
    bus: Arc<OperationEventBus>,
    classifier: Arc<Classifier>,
    executor: Arc<AgenticExecutor>,
}

impl WorkflowOrchestrator {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        profiles: Arc<dyn ProfileRepository>,
        memory: Arc<dyn MemoryStore>,
        registry: Arc<OperationRegistry>,
        bus: Arc<OperationEventBus>,
        classifier: Arc<Classifier>,
        executor: Arc<AgenticExecutor>,
    ) -> Self {
        Self {
            sessions,
            profiles,
            memory,
            registry,
            bus,
            classifier,
            executor,
        }
    }

    /// Handles one incoming query end to end.
    ///
    /// Direct mode resolves before returning; agentic mode returns as soon as
    /// the operations are queued, with execution and the synthesized turn
    /// happening on a background task observable through the event bus.
    pub async fn submit(
        &self,
        query: &str,
        session_id: Option<String>,
        attachment_text: Option<String>,
    ) -> Result<QueryOutcome> {
        let session_id =
            session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.trace(&session_id, WorkflowState::Received);

        // Stale records from the previous turn must never appear next to the
        // new batch.
        self.bus.clear(&session_id);

        let mut session = match self.sessions.find_by_id(&session_id).await? {
            Some(session) => session,
            None => Session::new(session_id.clone()),
        };
        let history = session.turns.clone();
        session.push_turn(TurnRole::User, query);
        self.sessions.save(&session).await?;

        let profile = match self.profiles.load().await {
            Ok(profile) => profile,
            Err(err) => {
                warn!(target: "valet::workflow", error = %err, "profile load failed");
                None
            }
        };
        let caller = profile.as_ref().map(|p| CallerIdentity {
            user_id: p.user_id.clone(),
        });
        let snapshot = self.profile_snapshot(profile.as_ref()).await;

        self.trace(&session_id, WorkflowState::Classifying);
        let classification = match self
            .classifier
            .classify(
                query,
                attachment_text.as_deref(),
                &history,
                &self.registry,
                &snapshot,
            )
            .await
        {
            Ok(classification) => classification,
            Err(err) => {
                error!(
                    target: "valet::workflow",
                    session_id,
                    error = %err,
                    "classification failed"
                );
                self.trace(&session_id, WorkflowState::Errored);
                session.push_turn(TurnRole::Assistant, GENERIC_FAILURE);
                self.sessions.save(&session).await?;
                return Ok(QueryOutcome::Direct {
                    session_id,
                    display_response: GENERIC_FAILURE.to_string(),
                });
            }
        };

        match classification {
            Classification::Direct { display_response } => {
                self.trace(&session_id, WorkflowState::DirectResponding);
                session.push_turn(TurnRole::Assistant, &display_response);
                self.sessions.save(&session).await?;
                self.trace(&session_id, WorkflowState::Completed);
                Ok(QueryOutcome::Direct {
                    session_id,
                    display_response,
                })
            }
            Classification::Agentic {
                operations,
                user_summary,
            } => {
                self.trace(&session_id, WorkflowState::AgenticQueued);
                let mut batch = Vec::with_capacity(operations.len());
                let mut infos = Vec::with_capacity(operations.len());
                for request in operations {
                    let record = self.bus.create(
                        &request.name,
                        request.parameters.clone(),
                        &session_id,
                    );
                    infos.push(QueuedOperationInfo {
                        id: record.id.clone(),
                        name: record.name.clone(),
                        parameters: record.parameters.clone(),
                    });
                    batch.push(QueuedOperation {
                        operation_id: record.id,
                        request,
                    });
                }

                self.spawn_agentic_run(session_id.clone(), batch, user_summary, caller);
                Ok(QueryOutcome::Agentic {
                    session_id,
                    operations: infos,
                })
            }
        }
    }

    fn spawn_agentic_run(
        &self,
        session_id: String,
        batch: Vec<QueuedOperation>,
        user_summary: String,
        caller: Option<CallerIdentity>,
    ) {
        let executor = self.executor.clone();
        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            debug!(
                target: "valet::workflow",
                session_id,
                state = %WorkflowState::AgenticRunning,
                operations = batch.len(),
            );
            let final_text = executor
                .run(&batch, &user_summary, &session_id, caller.as_ref())
                .await;

            match sessions.find_by_id(&session_id).await {
                Ok(Some(mut session)) => {
                    session.push_turn(TurnRole::Assistant, &final_text);
                    if let Err(err) = sessions.save(&session).await {
                        error!(
                            target: "valet::workflow",
                            session_id,
                            error = %err,
                            "failed to persist synthesized turn"
                        );
                    }
                }
                Ok(None) => {
                    warn!(target: "valet::workflow", session_id, "session vanished mid-run");
                }
                Err(err) => {
                    error!(target: "valet::workflow", session_id, error = %err, "session load failed");
                }
            }
            debug!(
                target: "valet::workflow",
                session_id,
                state = %WorkflowState::Completed,
            );
        });
    }

    /// Profile snapshot for the classifier, with recent durable facts folded in.
    async fn profile_snapshot(&self, profile: Option<&valet_core::profile::UserProfile>) -> String {
        let mut snapshot = profile
            .map(|p| p.render_snapshot())
            .unwrap_or_else(|| "(no profile data)".to_string());
        match self.memory.recent_facts(SNAPSHOT_FACTS).await {
            Ok(facts) if !facts.is_empty() => {
                snapshot.push_str("\nKnown facts:");
                for fact in facts {
                    snapshot.push_str("\n- ");
                    snapshot.push_str(&fact.fact);
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!(target: "valet::workflow", error = %err, "memory read failed");
            }
        }
        snapshot
    }

    fn trace(&self, session_id: &str, state: WorkflowState) {
        debug!(target: "valet::workflow", session_id, state = %state);
    }
}
