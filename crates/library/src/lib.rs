//! Record and collection catalog: persistence, record ingestion and the
//! collection mutations that keep generated metadata current.

mod collections;
mod ingest;
mod store;

use std::path::Path;
use std::sync::Arc;

use metadata::{AlbumMetadataGenerator, CollectionMetadataAggregator, JsonModel};

pub use collections::AddOutcome;
pub use ingest::NewRecord;
pub use store::{open_or_create_db, CatalogStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct Catalog {
    store: CatalogStore,
    albums: AlbumMetadataGenerator,
    collections: CollectionMetadataAggregator,
}

impl Catalog {
    pub fn new(store: CatalogStore, model: Arc<dyn JsonModel>) -> Self {
        Self {
            store,
            albums: AlbumMetadataGenerator::new(Arc::clone(&model)),
            collections: CollectionMetadataAggregator::new(model),
        }
    }

    pub fn open(path: &Path, model: Arc<dyn JsonModel>) -> Result<Self, CatalogError> {
        Ok(Self::new(CatalogStore::open(path)?, model))
    }
}

fn required_field(value: &str, field: &str) -> Result<String, CatalogError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(CatalogError::Validation(format!("{} is required", field)))
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use metadata::{ChatMessage, ChatRole, EnrichmentError, JsonModel};
    use parking_lot::Mutex;
    use serde_json::Value;
    use tempfile::TempDir;

    use crate::Catalog;

    /// Replays queued replies; once the queue is empty every request fails
    /// the way an exhausted retry loop does.
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Value>>,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }

        /// User message of the most recent request.
        pub fn last_user_prompt(&self) -> Option<String> {
            self.prompts.lock().last().cloned()
        }

        pub fn failing() -> Arc<Self> {
            Self::new(Vec::new())
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JsonModel for ScriptedModel {
        async fn request(&self, messages: Vec<ChatMessage>) -> Result<Value, EnrichmentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(user) = messages.iter().find(|m| m.role == ChatRole::User) {
                self.prompts.lock().push(user.content.clone());
            }
            match self.replies.lock().pop_front() {
                Some(reply) => Ok(reply),
                None => Err(EnrichmentError::Exhausted {
                    attempts: 3,
                    source: Box::new(EnrichmentError::Status {
                        status: 503,
                        body: "unavailable".to_string(),
                    }),
                }),
            }
        }
    }

    pub fn catalog(model: Arc<ScriptedModel>) -> (TempDir, Catalog) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(&dir.path().join("catalog.redb"), model).unwrap();
        (dir, catalog)
    }
}
