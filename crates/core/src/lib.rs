pub mod embeddings;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod models;
pub mod policy;
pub mod retrieval;
pub mod stores;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use embeddings::OpenAiEmbedder;
pub use error::{IngestError, ProviderError, RetrieveError, StoreError};
pub use feed::{ChangeFeedProcessor, FeedCanceller, FeedHandle, FeedReport};
pub use ingest::{ReconcileReport, SweepController};
pub use models::{BlogPost, EmbeddingConfig, RetrievalOptions, ScoredPost};
pub use policy::{EmbeddingAction, VersionPolicy};
pub use retrieval::{format_context, RetrievalEngine};
pub use stores::MongoStore;
pub use traits::{DocumentStore, EmbeddingProvider, InsertStream};
