//! End-to-end workflow tests with stub handlers and scripted backends.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use valet_application::{
    AgenticExecutor, Classifier, OperationDispatcher, PromptEngine, QueryOutcome,
    WorkflowOrchestrator,
};
use valet_core::event_bus::OperationEventBus;
use valet_core::memory::{DurableFact, MemoryStore, NoOpMemoryStore};
use valet_core::operation::{
    OperationDefinition, OperationHandler, OperationRegistry, OperationStatus,
};
use valet_core::profile::{ProfileRepository, UserProfile};
use valet_core::session::{Session, SessionRepository, TurnRole};
use valet_core::Result;
use valet_interaction::{BackendError, ChatBackend, ChatMessage, FallbackChain};

struct InMemorySessions {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessions {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl SessionRepository for InMemorySessions {
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.lock().unwrap().get(session_id).cloned())
    }

    async fn save(&self, session: &Session) -> Result<()> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.sessions.lock().unwrap().remove(session_id);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Session>> {
        Ok(self.sessions.lock().unwrap().values().cloned().collect())
    }
}

struct FixedProfile(Option<UserProfile>);

#[async_trait]
impl ProfileRepository for FixedProfile {
    async fn load(&self) -> Result<Option<UserProfile>> {
        Ok(self.0.clone())
    }

    async fn save(&self, _profile: &UserProfile) -> Result<()> {
        Ok(())
    }
}

struct RecordingMemory {
    facts: Mutex<Vec<DurableFact>>,
}

#[async_trait]
impl MemoryStore for RecordingMemory {
    async fn record_fact(&self, fact: DurableFact) -> std::result::Result<(), String> {
        self.facts.lock().unwrap().push(fact);
        Ok(())
    }

    async fn recent_facts(&self, _limit: usize) -> std::result::Result<Vec<DurableFact>, String> {
        Ok(self.facts.lock().unwrap().clone())
    }
}

/// Backend that always returns the same text and records what it was asked.
struct ScriptedBackend {
    reply: std::result::Result<String, ()>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: Err(()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> String {
        self.seen.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
    ) -> std::result::Result<String, BackendError> {
        if let Some(last) = messages.last() {
            self.seen.lock().unwrap().push(last.content.clone());
        }
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(()) => Err(BackendError::Auth("invalid key".to_string())),
        }
    }
}

struct StubHandler {
    name: &'static str,
    result: std::result::Result<String, String>,
}

#[async_trait]
impl OperationHandler for StubHandler {
    fn name(&self) -> &str {
        self.name
    }

    async fn call(
        &self,
        _params: &Map<String, Value>,
    ) -> std::result::Result<String, String> {
        self.result.clone()
    }
}

fn test_registry() -> Arc<OperationRegistry> {
    Arc::new(
        OperationRegistry::new(vec![
            OperationDefinition {
                name: "run_command".into(),
                description: "Run a shell command".into(),
                required_parameters: vec!["command".into()],
                optional_parameters: vec![],
            },
            OperationDefinition {
                name: "create_report".into(),
                description: "Generate a report document".into(),
                required_parameters: vec!["path".into()],
                optional_parameters: vec![],
            },
            OperationDefinition {
                name: "send_mail".into(),
                description: "Send an email".into(),
                required_parameters: vec!["to".into(), "message".into()],
                optional_parameters: vec!["subject".into()],
            },
        ])
        .unwrap(),
    )
}

struct Harness {
    orchestrator: WorkflowOrchestrator,
    bus: Arc<OperationEventBus>,
    sessions: Arc<InMemorySessions>,
}

fn build_harness(
    classifier_backend: Arc<ScriptedBackend>,
    synthesizer_backend: Arc<ScriptedBackend>,
    handlers: Vec<Arc<dyn OperationHandler>>,
    memory: Arc<dyn MemoryStore>,
) -> Harness {
    let registry = test_registry();
    let bus = Arc::new(OperationEventBus::new());
    let prompts = Arc::new(PromptEngine::new().unwrap());
    let sessions = InMemorySessions::new();

    let classifier = Arc::new(Classifier::new(
        prompts.clone(),
        Arc::new(FallbackChain::new(
            "classifier",
            vec![classifier_backend],
        )),
        Arc::new(FallbackChain::new("summarizer", vec![])),
        12,
        6000,
    ));
    let dispatcher = Arc::new(OperationDispatcher::new(
        handlers,
        bus.clone(),
        Duration::from_secs(5),
    ));
    let executor = Arc::new(AgenticExecutor::new(
        registry.clone(),
        dispatcher,
        bus.clone(),
        Arc::new(FallbackChain::new(
            "synthesizer",
            vec![synthesizer_backend],
        )),
        prompts,
        memory.clone(),
    ));
    let orchestrator = WorkflowOrchestrator::new(
        sessions.clone(),
        Arc::new(FixedProfile(Some(UserProfile {
            user_id: "u1".into(),
            name: "Dana".into(),
            timezone: None,
            preferences: vec![],
        }))),
        memory,
        registry,
        bus.clone(),
        classifier,
        executor,
    );
    Harness {
        orchestrator,
        bus,
        sessions,
    }
}

async fn wait_for_assistant_turn(sessions: &Arc<InMemorySessions>, session_id: &str) -> Session {
    for _ in 0..200 {
        if let Some(session) = sessions.find_by_id(session_id).await.unwrap() {
            if session
                .turns
                .iter()
                .any(|t| t.role == TurnRole::Assistant)
            {
                return session;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("assistant turn never appeared for session {session_id}");
}

#[tokio::test]
async fn test_rename_file_scenario() {
    let classify = ScriptedBackend::replying(
        r#"{"operations": [{"name": "run_command", "parameters": {"command": "mv notes.txt archive.txt"}}], "user_summary": "rename notes.txt to archive.txt"}"#,
    );
    let synthesize = ScriptedBackend::replying(
        r#"{"response": "Done, notes.txt is now archive.txt.", "extracted_fact": null}"#,
    );
    let harness = build_harness(
        classify,
        synthesize.clone(),
        vec![Arc::new(StubHandler {
            name: "run_command",
            result: Ok("renamed notes.txt to archive.txt".to_string()),
        })],
        Arc::new(NoOpMemoryStore),
    );

    let outcome = harness
        .orchestrator
        .submit("rename notes.txt to archive.txt", None, None)
        .await
        .unwrap();
    let (session_id, op_ids) = match outcome {
        QueryOutcome::Agentic {
            session_id,
            operations,
        } => {
            assert_eq!(operations.len(), 1);
            assert_eq!(operations[0].name, "run_command");
            (session_id, operations)
        }
        other => panic!("expected Agentic, got {other:?}"),
    };

    let session = wait_for_assistant_turn(&harness.sessions, &session_id).await;
    let reply = &session.turns.last().unwrap().content;
    assert_eq!(reply, "Done, notes.txt is now archive.txt.");

    let record = harness.bus.find(&op_ids[0].id).unwrap();
    assert_eq!(record.status, OperationStatus::Success);

    // The synthesizer saw the success-marked transcript.
    assert!(synthesize
        .last_prompt()
        .contains("\u{2713} run_command: renamed notes.txt to archive.txt"));
}

#[tokio::test]
async fn test_failed_email_acknowledged() {
    let classify = ScriptedBackend::replying(
        r#"{"operations": [
            {"name": "create_report", "parameters": {"path": "q3.pdf"}},
            {"name": "send_mail", "parameters": {"to": "bob@x.com", "message": "see attached"}}
        ], "user_summary": "email the quarterly report to bob"}"#,
    );
    let synthesize = ScriptedBackend::replying(
        r#"{"response": "I created the report but could not send the email: SMTP auth failed."}"#,
    );
    let harness = build_harness(
        classify,
        synthesize.clone(),
        vec![
            Arc::new(StubHandler {
                name: "create_report",
                result: Ok("report written to q3.pdf".to_string()),
            }),
            Arc::new(StubHandler {
                name: "send_mail",
                result: Err("SMTP auth failed".to_string()),
            }),
        ],
        Arc::new(NoOpMemoryStore),
    );

    let outcome = harness
        .orchestrator
        .submit("email the quarterly report to bob@x.com", None, None)
        .await
        .unwrap();
    let session_id = match outcome {
        QueryOutcome::Agentic { session_id, .. } => session_id,
        other => panic!("expected Agentic, got {other:?}"),
    };

    let session = wait_for_assistant_turn(&harness.sessions, &session_id).await;
    assert!(session
        .turns
        .last()
        .unwrap()
        .content
        .contains("could not send"));

    let prompt = synthesize.last_prompt();
    assert!(prompt.contains("\u{2713} create_report: report written to q3.pdf"));
    assert!(prompt.contains("\u{2717} send_mail: SMTP auth failed"));

    // One failure never aborts the batch: both records are terminal.
    let records = harness.bus.records(&session_id);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, OperationStatus::Success);
    assert_eq!(records[1].status, OperationStatus::Failed);
}

#[tokio::test]
async fn test_dispatch_isolation_across_batch() {
    let classify = ScriptedBackend::replying(
        r#"{"operations": [
            {"name": "run_command", "parameters": {"command": "a"}},
            {"name": "unknown_op", "parameters": {}},
            {"name": "create_report", "parameters": {"path": "out.pdf"}}
        ], "user_summary": "do three things"}"#,
    );
    let synthesize = ScriptedBackend::replying(r#"{"response": "Two of three succeeded."}"#);
    let harness = build_harness(
        classify,
        synthesize.clone(),
        vec![
            Arc::new(StubHandler {
                name: "run_command",
                result: Ok("ran".to_string()),
            }),
            Arc::new(StubHandler {
                name: "create_report",
                result: Ok("created".to_string()),
            }),
        ],
        Arc::new(NoOpMemoryStore),
    );

    let outcome = harness
        .orchestrator
        .submit("do three things", None, None)
        .await
        .unwrap();
    let session_id = match outcome {
        QueryOutcome::Agentic { session_id, .. } => session_id,
        other => panic!("expected Agentic, got {other:?}"),
    };
    wait_for_assistant_turn(&harness.sessions, &session_id).await;

    let records = harness.bus.records(&session_id);
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].status, OperationStatus::Success);
    assert_eq!(records[1].status, OperationStatus::Failed);
    assert_eq!(records[2].status, OperationStatus::Success);

    // Transcript has one line per operation, middle one failed.
    let prompt = synthesize.last_prompt();
    assert!(prompt.contains("\u{2713} run_command"));
    assert!(prompt.contains("\u{2717} unknown_op"));
    assert!(prompt.contains("\u{2713} create_report"));
}

#[tokio::test]
async fn test_second_query_clears_previous_records() {
    let classify = ScriptedBackend::replying(
        r#"{"operations": [], "display_response": "Nothing to do."}"#,
    );
    let synthesize = ScriptedBackend::replying("unused");
    let harness = build_harness(
        classify,
        synthesize,
        vec![],
        Arc::new(NoOpMemoryStore),
    );

    // Seed stale pending records as if a prior batch were still in flight.
    harness.bus.create("run_command", Map::new(), "s1");
    harness.bus.create("send_mail", Map::new(), "s1");
    assert_eq!(harness.bus.records("s1").len(), 2);

    let outcome = harness
        .orchestrator
        .submit("never mind", Some("s1".to_string()), None)
        .await
        .unwrap();
    assert!(matches!(outcome, QueryOutcome::Direct { .. }));
    assert!(harness.bus.records("s1").is_empty());
}

#[tokio::test]
async fn test_classification_failure_degrades_to_generic_message() {
    let classify = ScriptedBackend::failing();
    let synthesize = ScriptedBackend::replying("unused");
    let harness = build_harness(classify, synthesize, vec![], Arc::new(NoOpMemoryStore));

    let outcome = harness
        .orchestrator
        .submit("hello", Some("s1".to_string()), None)
        .await
        .unwrap();
    match outcome {
        QueryOutcome::Direct {
            display_response, ..
        } => {
            assert!(display_response.contains("could not process"));
            // Raw backend detail never reaches the user.
            assert!(!display_response.contains("invalid key"));
        }
        other => panic!("expected Direct, got {other:?}"),
    }
    let session = harness.sessions.find_by_id("s1").await.unwrap().unwrap();
    assert_eq!(session.turns.len(), 2);
}

#[tokio::test]
async fn test_extracted_fact_reaches_memory() {
    let classify = ScriptedBackend::replying(
        r#"{"operations": [{"name": "run_command", "parameters": {"command": "date"}}], "user_summary": "what time is it in Berlin"}"#,
    );
    let synthesize = ScriptedBackend::replying(
        r#"{"response": "It is 3pm in Berlin.", "extracted_fact": "user cares about Berlin time"}"#,
    );
    let memory = Arc::new(RecordingMemory {
        facts: Mutex::new(Vec::new()),
    });
    let harness = build_harness(
        classify,
        synthesize,
        vec![Arc::new(StubHandler {
            name: "run_command",
            result: Ok("Tue 15:00".to_string()),
        })],
        memory.clone(),
    );

    let outcome = harness
        .orchestrator
        .submit("what time is it in Berlin", None, None)
        .await
        .unwrap();
    let session_id = match outcome {
        QueryOutcome::Agentic { session_id, .. } => session_id,
        other => panic!("expected Agentic, got {other:?}"),
    };
    wait_for_assistant_turn(&harness.sessions, &session_id).await;

    let facts = memory.facts.lock().unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].fact, "user cares about Berlin time");
    assert_eq!(facts[0].session_id, session_id);
}
