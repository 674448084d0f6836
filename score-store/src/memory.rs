use crate::{ScoreStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// In-memory score store for local runs and tests. All operations happen
/// under one lock, which makes the conditional update atomic.
pub struct MemoryStore {
    scores: Mutex<HashMap<String, u32>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            scores: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        MemoryStore {
            scores: Mutex::new(users.into_iter().map(|(id, s)| (id.into(), s)).collect()),
        }
    }

    pub async fn insert_user(&self, user_id: &str, best: u32) {
        self.scores.lock().await.insert(user_id.to_string(), best);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScoreStore for MemoryStore {
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
        let best = scores
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;
        if candidate > *best {
            *best = candidate;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn force_best(&self, user_id: &str, value: u32) -> Result<(), StoreError> {
        let mut scores = self.scores.lock().await;
        let best = scores
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;
        *best = value;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn best_score_is_monotonic() {
        let store = MemoryStore::with_users(vec![("ann@example.edu", 0)]);
        assert!(store.set_best_if_greater("ann@example.edu", 50).await.unwrap());
        assert!(!store.set_best_if_greater("ann@example.edu", 40).await.unwrap());
        assert_eq!(store.best_score("ann@example.edu").await.unwrap(), 50);
        assert!(store.set_best_if_greater("ann@example.edu", 60).await.unwrap());
        assert_eq!(store.best_score("ann@example.edu").await.unwrap(), 60);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let store = MemoryStore::new();
        let err = store.best_score("nobody@example.edu").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn force_best_overwrites() {
        let store = MemoryStore::with_users(vec![("ann@example.edu", 87)]);
        store.force_best("ann@example.edu", 0).await.unwrap();
        assert_eq!(store.best_score("ann@example.edu").await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_updates_keep_the_maximum() {
        let store = Arc::new(MemoryStore::with_users(vec![("ann@example.edu", 0)]));
        let mut handles = Vec::new();
        for candidate in 1..=32u32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .set_best_if_greater("ann@example.edu", candidate * 3)
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.best_score("ann@example.edu").await.unwrap(), 96);
    }
}
