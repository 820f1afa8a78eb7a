//! Append-only JSONL memory store.
//!
//! One JSON object per line. Appends never rewrite the file, so a crashed
//! write loses at most the line being written.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use valet_core::memory::{DurableFact, MemoryStore};

pub struct FileMemoryStore {
    memory_path: PathBuf,
}

impl FileMemoryStore {
    pub fn new(memory_path: impl Into<PathBuf>) -> Self {
        Self {
            memory_path: memory_path.into(),
        }
    }
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    async fn record_fact(&self, fact: DurableFact) -> Result<(), String> {
        if let Some(parent) = self.memory_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("Failed to create memory directory: {e}"))?;
        }
        let mut line = serde_json::to_string(&fact)
            .map_err(|e| format!("Failed to serialize fact: {e}"))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.memory_path)
            .await
            .map_err(|e| format!("Failed to open memory file: {e}"))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| format!("Failed to append fact: {e}"))?;
        Ok(())
    }

    async fn recent_facts(&self, limit: usize) -> Result<Vec<DurableFact>, String> {
        if !self.memory_path.exists() {
            return Ok(vec![]);
        }
        let raw = tokio::fs::read_to_string(&self.memory_path)
            .await
            .map_err(|e| format!("Failed to read memory file: {e}"))?;
        let facts: Vec<DurableFact> = raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        let start = facts.len().saturating_sub(limit);
        Ok(facts[start..].to_vec())
    }
}
