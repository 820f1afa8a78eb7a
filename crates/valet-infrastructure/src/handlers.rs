//! Built-in operation handlers.
//!
//! All file handlers resolve paths inside the configured workspace root and
//! reject anything that would escape it. `run_command` runs with the
//! workspace root as its working directory and caps captured output.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use valet_core::operation::{OperationDefinition, OperationHandler};

/// Captured stdout/stderr is truncated beyond this many bytes.
const MAX_CAPTURED_OUTPUT: usize = 16 * 1024;
/// read_file refuses files larger than this.
const MAX_READ_BYTES: u64 = 256 * 1024;

/// Definitions for the handlers in this module, merged into the registry
/// alongside the operations from config.
pub fn built_in_definitions() -> Vec<OperationDefinition> {
    vec![
        OperationDefinition {
            name: "run_command".into(),
            description: "Run a shell command in the workspace".into(),
            required_parameters: vec!["command".into()],
            optional_parameters: vec![],
        },
        OperationDefinition {
            name: "create_file".into(),
            description: "Create a new file in the workspace".into(),
            required_parameters: vec!["path".into()],
            optional_parameters: vec!["content".into()],
        },
        OperationDefinition {
            name: "read_file".into(),
            description: "Read a file from the workspace".into(),
            required_parameters: vec!["path".into()],
            optional_parameters: vec![],
        },
        OperationDefinition {
            name: "append_file".into(),
            description: "Append text to a file in the workspace".into(),
            required_parameters: vec!["path".into(), "content".into()],
            optional_parameters: vec![],
        },
    ]
}

/// The handlers in this module, rooted at the given workspace directory.
pub fn built_in_handlers(workspace_root: impl Into<PathBuf>) -> Vec<Arc<dyn OperationHandler>> {
    let root: PathBuf = workspace_root.into();
    vec![
        Arc::new(RunCommandHandler::new(root.clone())),
        Arc::new(CreateFileHandler::new(root.clone())),
        Arc::new(ReadFileHandler::new(root.clone())),
        Arc::new(AppendFileHandler::new(root)),
    ]
}

fn require_str<'a>(params: &'a Map<String, Value>, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Parameter '{key}' must be a string"))
}

/// Joins a relative path onto the workspace root, rejecting absolute paths
/// and parent traversal.
fn resolve_in_workspace(root: &Path, relative: &str) -> Result<PathBuf, String> {
    let candidate = Path::new(relative);
    if candidate.is_absolute() {
        return Err(format!("Path '{relative}' must be relative to the workspace"));
    }
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(format!("Path '{relative}' escapes the workspace")),
        }
    }
    Ok(root.join(candidate))
}

fn truncate_output(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= MAX_CAPTURED_OUTPUT {
        text.into_owned()
    } else {
        let mut cut = MAX_CAPTURED_OUTPUT;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}\n... (output truncated)", &text[..cut])
    }
}

pub struct RunCommandHandler {
    workspace_root: PathBuf,
}

impl RunCommandHandler {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl OperationHandler for RunCommandHandler {
    fn name(&self) -> &str {
        "run_command"
    }

    async fn call(&self, params: &Map<String, Value>) -> Result<String, String> {
        let command = require_str(params, "command")?;
        tokio::fs::create_dir_all(&self.workspace_root)
            .await
            .map_err(|e| format!("Failed to prepare workspace: {e}"))?;
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workspace_root)
            .output()
            .await
            .map_err(|e| format!("Failed to spawn command: {e}"))?;

        let stdout = truncate_output(&output.stdout);
        let stderr = truncate_output(&output.stderr);
        if output.status.success() {
            if stdout.trim().is_empty() {
                Ok("Command completed with no output".to_string())
            } else {
                Ok(stdout)
            }
        } else {
            let exit_code = output.status.code().unwrap_or(-1);
            Err(format!(
                "Command exited with code {exit_code}: {}",
                stderr.trim()
            ))
        }
    }
}

pub struct CreateFileHandler {
    workspace_root: PathBuf,
}

impl CreateFileHandler {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl OperationHandler for CreateFileHandler {
    fn name(&self) -> &str {
        "create_file"
    }

    async fn call(&self, params: &Map<String, Value>) -> Result<String, String> {
        let relative = require_str(params, "path")?;
        let content = params
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let path = resolve_in_workspace(&self.workspace_root, relative)?;
        if path.exists() {
            return Err(format!("File '{relative}' already exists"));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("Failed to create parent directory: {e}"))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| format!("Failed to write '{relative}': {e}"))?;
        Ok(format!("Created '{relative}' ({} bytes)", content.len()))
    }
}

pub struct ReadFileHandler {
    workspace_root: PathBuf,
}

impl ReadFileHandler {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl OperationHandler for ReadFileHandler {
    fn name(&self) -> &str {
        "read_file"
    }

    async fn call(&self, params: &Map<String, Value>) -> Result<String, String> {
        let relative = require_str(params, "path")?;
        let path = resolve_in_workspace(&self.workspace_root, relative)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| format!("File '{relative}' not found"))?;
        if metadata.len() > MAX_READ_BYTES {
            return Err(format!(
                "File '{relative}' is too large to read ({} bytes)",
                metadata.len()
            ));
        }
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("Failed to read '{relative}': {e}"))
    }
}

pub struct AppendFileHandler {
    workspace_root: PathBuf,
}

impl AppendFileHandler {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl OperationHandler for AppendFileHandler {
    fn name(&self) -> &str {
        "append_file"
    }

    async fn call(&self, params: &Map<String, Value>) -> Result<String, String> {
        use tokio::io::AsyncWriteExt;

        let relative = require_str(params, "path")?;
        let content = require_str(params, "content")?;
        let path = resolve_in_workspace(&self.workspace_root, relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("Failed to create parent directory: {e}"))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| format!("Failed to open '{relative}': {e}"))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| format!("Failed to append to '{relative}': {e}"))?;
        Ok(format!(
            "Appended {} bytes to '{relative}'",
            content.len()
        ))
    }
}
