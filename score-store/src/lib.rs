//! Persists each user's best score under monotonic-max update.

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The user id is not known to the store.
    #[error("user `{0}` not found")]
    NotFound(String),
    /// The backend cannot be reached or persisted to.
    #[error("score store unavailable")]
    Unavailable(#[source] std::io::Error),
    /// The persisted data cannot be decoded.
    #[error("score data is corrupted")]
    Corrupt(#[from] serde_json::Error),
}

/// Persistence boundary for best scores.
///
/// `set_best_if_greater` must be atomic with respect to concurrent callers
/// for the same user: two simultaneous submissions must not race to a
/// lower persisted value.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Returns the stored best score.
    async fn best_score(&self, user_id: &str) -> Result<u32, StoreError>;

    /// Raises the stored best to `candidate` if it is greater.
    /// Returns whether the stored value changed.
    async fn set_best_if_greater(&self, user_id: &str, candidate: u32) -> Result<bool, StoreError>;

    /// Overwrites the stored best unconditionally.
    async fn force_best(&self, user_id: &str, value: u32) -> Result<(), StoreError>;
}
