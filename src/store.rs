//! Program store - persistence of saved block sequences
//!
//! A saved program is an ordered list of flat `{type, color}` records (the
//! block tree flattened in pre-order) plus its creation time. Saving the same
//! sequence twice in a row returns the record already stored.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::block::Block;
use crate::{CentoError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramRecord {
    #[serde(rename = "type")]
    pub block_type: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedProgram {
    pub id: Uuid,
    pub blocks: Vec<ProgramRecord>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl SavedProgram {
    fn new(blocks: Vec<ProgramRecord>) -> Self {
        Self {
            id: Uuid::new_v4(),
            blocks,
            created_at: Utc::now(),
        }
    }
}

/// Flatten a block tree into store records, parents before children
pub fn flatten(blocks: &[Block]) -> Vec<ProgramRecord> {
    let mut records = Vec::new();
    push_records(blocks, &mut records);
    records
}

fn push_records(blocks: &[Block], records: &mut Vec<ProgramRecord>) {
    for block in blocks {
        records.push(ProgramRecord {
            block_type: block.action.clone(),
            color: block.kind.color().to_string(),
        });
        push_records(&block.children, records);
    }
}

#[async_trait]
pub trait ProgramStore: Send + Sync {
    /// Persist `blocks`; a repeat of the latest save returns the existing record
    async fn save(&self, blocks: &[Block]) -> Result<SavedProgram>;

    async fn load(&self, id: Uuid) -> Result<SavedProgram>;

    /// All saved programs, oldest first
    async fn list(&self) -> Result<Vec<SavedProgram>>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    programs: Mutex<Vec<SavedProgram>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgramStore for MemoryStore {
    async fn save(&self, blocks: &[Block]) -> Result<SavedProgram> {
        let records = flatten(blocks);
        let mut programs = self.programs.lock().await;
        if let Some(latest) = programs.last() {
            if latest.blocks == records {
                debug!("Program unchanged since {}, not saving again", latest.id);
                return Ok(latest.clone());
            }
        }
        let saved = SavedProgram::new(records);
        programs.push(saved.clone());
        Ok(saved)
    }

    async fn load(&self, id: Uuid) -> Result<SavedProgram> {
        let programs = self.programs.lock().await;
        programs
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| CentoError::NotFound(format!("program {}", id)))
    }

    async fn list(&self) -> Result<Vec<SavedProgram>> {
        Ok(self.programs.lock().await.clone())
    }
}

/// One JSON file per program in a directory
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    async fn read_program(path: &Path) -> Result<SavedProgram> {
        let contents = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&contents)
            .map_err(|e| CentoError::Store(format!("Corrupt program file {}: {}", path.display(), e)))
    }
}

#[async_trait]
impl ProgramStore for JsonFileStore {
    async fn save(&self, blocks: &[Block]) -> Result<SavedProgram> {
        let _guard = self.write_lock.lock().await;
        let records = flatten(blocks);

        if let Some(latest) = self.list().await?.pop() {
            if latest.blocks == records {
                debug!("Program unchanged since {}, not saving again", latest.id);
                return Ok(latest);
            }
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let saved = SavedProgram::new(records);
        let path = self.file_for(saved.id);
        tokio::fs::write(&path, serde_json::to_vec_pretty(&saved)?).await?;
        info!("Saved program {} ({} blocks) to {}", saved.id, saved.blocks.len(), path.display());
        Ok(saved)
    }

    async fn load(&self, id: Uuid) -> Result<SavedProgram> {
        let path = self.file_for(id);
        if !tokio::fs::try_exists(&path).await? {
            return Err(CentoError::NotFound(format!("program {}", id)));
        }
        Self::read_program(&path).await
    }

    async fn list(&self) -> Result<Vec<SavedProgram>> {
        if !tokio::fs::try_exists(&self.dir).await? {
            return Ok(Vec::new());
        }
        let mut programs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                programs.push(Self::read_program(&path).await?);
            }
        }
        programs.sort_by_key(|p| p.created_at);
        Ok(programs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Gesture, WheelMotion};

    fn sample() -> Vec<Block> {
        vec![
            Block::wheel(WheelMotion::MoveForward),
            Block::repeat(2, vec![Block::arm(Gesture::Hi), Block::delay(1.0)]),
        ]
    }

    #[test]
    fn test_flatten_preorder() {
        let records = flatten(&sample());
        let types: Vec<&str> = records.iter().map(|r| r.block_type.as_str()).collect();
        assert_eq!(types, vec!["MoveForward", "Repeat", "Hi", "Delay"]);
        assert_eq!(records[0].color, "blue");
        assert_eq!(records[2].color, "purple");
        assert_eq!(records[3].color, "amber");
    }

    #[test]
    fn test_record_json_shape() {
        let saved = SavedProgram::new(flatten(&[Block::arm(Gesture::Home)]));
        let json = serde_json::to_value(&saved).unwrap();
        assert_eq!(json["blocks"][0]["type"], "Home");
        assert!(json.get("createdAt").is_some());
    }

    #[tokio::test]
    async fn test_memory_store_idempotent_save() {
        let store = MemoryStore::new();
        let first = store.save(&sample()).await.unwrap();
        let again = store.save(&sample()).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(store.list().await.unwrap().len(), 1);

        let other = store.save(&[Block::delay(2.0)]).await.unwrap();
        assert_ne!(other.id, first.id);
        assert_eq!(store.load(first.id).await.unwrap(), first);
        assert!(matches!(store.load(Uuid::new_v4()).await, Err(CentoError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_json_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("programs"));
        assert!(store.list().await.unwrap().is_empty());

        let first = store.save(&sample()).await.unwrap();
        let again = store.save(&sample()).await.unwrap();
        assert_eq!(first.id, again.id);

        let second = store.save(&[Block::arm(Gesture::Namaste)]).await.unwrap();
        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].id, second.id);
        assert_eq!(store.load(first.id).await.unwrap().blocks, flatten(&sample()));
    }
}
