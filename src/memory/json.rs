use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::{MemoryStore, MemoryUpdate, UserMemory};
use crate::error::StorageResult;

/// Single-document JSON store.
///
/// Every user id maps to the same file. Writes go to a sibling temp file and
/// are renamed into place; `update` holds an in-process lock for the whole
/// read-modify-write. Other processes writing the same file are not excluded.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> StorageResult<UserMemory> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(UserMemory::default()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(UserMemory::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, memory: &UserMemory) -> StorageResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(memory)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for JsonFileStore {
    async fn load(&self, user_id: &str) -> StorageResult<UserMemory> {
        debug!(user_id = %user_id, path = %self.path.display(), "Loading user memory");
        self.read().await
    }

    async fn save(&self, user_id: &str, memory: &UserMemory) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        debug!(user_id = %user_id, path = %self.path.display(), "Saving user memory");
        self.write(memory).await
    }

    async fn update(&self, user_id: &str, apply: MemoryUpdate) -> StorageResult<UserMemory> {
        let _guard = self.lock.lock().await;
        let mut memory = self.read().await?;
        apply(&mut memory);
        debug!(user_id = %user_id, "Updating user memory");
        self.write(&memory).await?;
        Ok(memory)
    }
}
