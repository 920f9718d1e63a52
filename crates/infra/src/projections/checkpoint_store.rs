//! Projection checkpoint persistence.
//!
//! A checkpoint is the last global sequence a projection has fully applied.
//! It enables:
//! - Resume after restart (workers continue after their checkpoint)
//! - At-least-once delivery (an uncheckpointed batch is simply read again)
//! - Deterministic rebuilds (reset to 0 and replay from the start of the log)

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::read_model::StoreError;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Last applied sequence for a projection (`0` when it never ran).
    async fn load(&self, projection: &str) -> Result<u64, StoreError>;

    async fn save(&self, projection: &str, sequence: u64) -> Result<(), StoreError>;

    /// Forget a projection's progress (rebuild support).
    async fn reset(&self, projection: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> CheckpointStore for Arc<S>
where
    S: CheckpointStore + ?Sized,
{
    async fn load(&self, projection: &str) -> Result<u64, StoreError> {
        (**self).load(projection).await
    }

    async fn save(&self, projection: &str, sequence: u64) -> Result<(), StoreError> {
        (**self).save(projection, sequence).await
    }

    async fn reset(&self, projection: &str) -> Result<(), StoreError> {
        (**self).reset(projection).await
    }
}

/// In-memory checkpoint store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<HashMap<String, u64>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, projection: &str) -> Result<u64, StoreError> {
        let map = self.checkpoints.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(projection).copied().unwrap_or(0))
    }

    async fn save(&self, projection: &str, sequence: u64) -> Result<(), StoreError> {
        let mut map = self.checkpoints.write().map_err(|_| StoreError::Poisoned)?;
        map.insert(projection.to_string(), sequence);
        Ok(())
    }

    async fn reset(&self, projection: &str) -> Result<(), StoreError> {
        let mut map = self.checkpoints.write().map_err(|_| StoreError::Poisoned)?;
        map.remove(projection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checkpoints_are_tracked_per_projection() {
        let store = InMemoryCheckpointStore::new();
        assert_eq!(store.load("audit").await.unwrap(), 0);

        store.save("audit", 12).await.unwrap();
        store.save("status", 4).await.unwrap();
        assert_eq!(store.load("audit").await.unwrap(), 12);
        assert_eq!(store.load("status").await.unwrap(), 4);

        store.reset("audit").await.unwrap();
        assert_eq!(store.load("audit").await.unwrap(), 0);
        assert_eq!(store.load("status").await.unwrap(), 4);
    }
}
