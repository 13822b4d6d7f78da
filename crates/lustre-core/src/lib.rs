//! All backend logic independent of how the app is run.
//!
//! The product catalog lives wherever the operator exports it. Lustre stores
//! only config and the persisted index in its own app data directory (see
//! [app_data]). Requests read an immutable [`IndexSnapshot`] that a rebuild
//! replaces wholesale.

pub mod app_data;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod context;
pub mod embed;
pub mod filter;
pub mod generation;
pub mod index;
pub mod ollama;
pub mod persist;
pub mod prompt;
pub mod retriever;
pub mod snapshot;
pub mod store;
pub mod telemetry;
pub mod text;
pub mod watcher;

#[cfg(test)]
pub(crate) mod test_support;

pub use app_data::app_data_dir;
pub use catalog::{CatalogError, CatalogSnapshot, CatalogSource, JsonCatalogSource, ProductRecord};
pub use chat::{
    ChatError, ChatOrchestrator, ChatRequest, ChatResponse, ProductSummary, Status,
    FALLBACK_MESSAGE,
};
pub use config::{load_config, load_config_from, set_catalog_path, Config, ConfigError};
pub use context::{ContextBuilder, NO_MATCHES};
pub use embed::{EmbedError, Embedder};
pub use filter::{filter, FilterConstraints};
pub use generation::{
    CompletionBackend, DecodingParams, Generation, GenerationClient, GenerationFailure,
    GenerationMetrics,
};
pub use index::{build_snapshot, load_persisted, rebuild, IndexError, RebuildReport};
pub use ollama::{OllamaClient, OllamaError};
pub use persist::PersistError;
pub use prompt::{ConversationTurn, PromptComposer, Role};
pub use retriever::{RetrievalResult, RetrieveError, Retriever};
pub use snapshot::{IndexSnapshot, SnapshotHandle};
pub use store::{StoreError, VectorIndex};
pub use watcher::{watch_catalog, WatchError};
