//! Execution trait for operation handlers.

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Executes one named operation.
///
/// Handlers receive normalized parameters (aliases already applied, unknown
/// keys dropped) and return a human-readable success or failure message.
/// The dispatcher owns timeouts, identity checks, and record transitions;
/// handlers only do the work.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// The operation name this handler serves.
    fn name(&self) -> &str;

    /// Whether this operation needs a resolved caller identity.
    fn requires_identity(&self) -> bool {
        false
    }

    async fn call(&self, params: &Map<String, Value>) -> Result<String, String>;
}
