//! Conversation store implementations for Dealroom.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use std::sync::Arc;

use dealroom_config::StoreConfig;
use dealroom_core::ConversationStore;
use dealroom_core::error::StoreError;
use tracing::info;

/// Open the configured backend.
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn ConversationStore>, StoreError> {
    match config.backend.as_str() {
        "memory" => {
            info!("Using in-memory conversation store; history is lost on exit");
            Ok(Arc::new(InMemoryStore::new()))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(SqliteStore::new(&config.database_path()).await?)),
        other => Err(StoreError::Storage(format!(
            "Unsupported store backend: {other}"
        ))),
    }
}
