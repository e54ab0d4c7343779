use std::sync::Arc;

use anyhow::Result;
use memories_core::{InMemoryStore, Memories, ObjectStore, S3Store, StoreConfig};

#[derive(Clone)]
pub struct AppState {
    pub memories: Memories,
}

impl AppState {
    pub async fn new(config: &StoreConfig) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(config).await?);

        Ok(Self::with_store(store, config))
    }

    /// Keeps uploads in process memory and serves them under `/media`.
    pub fn in_memory(config: &StoreConfig) -> Self {
        Self::with_store(Arc::new(InMemoryStore::new("/media")), config)
    }

    pub fn with_store(store: Arc<dyn ObjectStore>, config: &StoreConfig) -> Self {
        Self {
            memories: Memories::new(store, config),
        }
    }
}
