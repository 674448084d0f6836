//! JSON-file backed score store.

use crate::{ScoreStore, StoreError};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tokio::sync::Mutex;

/// Stores scores as a single JSON object mapping user id to best score.
///
/// The whole map lives under one lock and the file is rewritten inside the
/// critical section, so conditional updates cannot race each other. Users
/// are provisioned either by seeding the file or via [`FsStore::register`];
/// lookups for anyone else fail with `NotFound`.
pub struct FsStore {
    path: PathBuf,
    scores: Mutex<HashMap<String, u32>>,
}

impl FsStore {
    /// Opens a score file. A missing file starts an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let scores = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("score file {} does not exist yet", path.display());
                HashMap::new()
            }
            Err(err) => return Err(StoreError::Unavailable(err)),
        };
        Ok(FsStore {
            path,
            scores: Mutex::new(scores),
        })
    }

    /// Creates (or resets) the record for a user.
    pub async fn register(&self, user_id: &str, best: u32) -> Result<(), StoreError> {
        let mut scores = self.scores.lock().await;
        scores.insert(user_id.to_string(), best);
        Self::flush(&self.path, &scores).await
    }

    async fn flush(path: &Path, scores: &HashMap<String, u32>) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(scores)?;
        tokio::fs::write(path, data)
            .await
            .map_err(StoreError::Unavailable)
    }
}

#[async_trait]
impl ScoreStore for FsStore {
    async fn best_score(&self, user_id: &str) -> Result<u32, StoreError> {
        self.scores
            .lock()
            .await
            .get(user_id)
            .copied()
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))
    }

    async fn set_best_if_greater(&self, user_id: &str, candidate: u32) -> Result<bool, StoreError> {
        let mut scores = self.scores.lock().await;
        let best = *scores
            .get(user_id)
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;
        if candidate <= best {
            return Ok(false);
        }
        scores.insert(user_id.to_string(), candidate);
        if let Err(err) = Self::flush(&self.path, &scores).await {
            // keep memory consistent with what is actually on disk
            scores.insert(user_id.to_string(), best);
            return Err(err);
        }
        Ok(true)
    }

    async fn force_best(&self, user_id: &str, value: u32) -> Result<(), StoreError> {
        let mut scores = self.scores.lock().await;
        let best = *scores
            .get(user_id)
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;
        scores.insert(user_id.to_string(), value);
        if let Err(err) = Self::flush(&self.path, &scores).await {
            scores.insert(user_id.to_string(), best);
            return Err(err);
        }
        Ok(())
    }
}
