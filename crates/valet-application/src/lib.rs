//! Query classification, operation dispatch, and workflow orchestration.

pub mod classifier;
pub mod dispatcher;
pub mod executor;
pub mod orchestrator;
pub mod prompts;

pub use classifier::{Classification, Classifier};
pub use dispatcher::{DispatchOutcome, OperationDispatcher};
pub use executor::{AgenticExecutor, QueuedOperation};
pub use orchestrator::{QueryOutcome, QueuedOperationInfo, WorkflowOrchestrator};
pub use prompts::PromptEngine;
