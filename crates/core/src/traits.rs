use crate::error::{ProviderError, StoreError};
use crate::models::{BlogPost, ScoredPost};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of newly inserted posts, in notification order. An `Err` item is
/// terminal: the underlying subscription is no longer usable and the consumer
/// must surface it rather than keep polling.
pub type InsertStream = BoxStream<'static, Result<BlogPost, StoreError>>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<BlogPost>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<BlogPost>, StoreError>;

    /// Writes a post's embedding and its model tag, leaving every other
    /// field untouched.
    async fn update_embedding(
        &self,
        id: &str,
        embedding: &[f32],
        model: &str,
    ) -> Result<(), StoreError>;

    /// Subscribes to insert notifications. Non-insert change events are
    /// filtered out by the implementation.
    async fn insert_stream(&self) -> Result<InsertStream, StoreError>;

    /// Nearest-neighbour search over stored embeddings. `candidate_pool` is
    /// the wider set examined internally before the top `limit` hits are
    /// returned, ranked by descending score.
    async fn similarity_search(
        &self,
        query_vector: &[f32],
        candidate_pool: usize,
        limit: usize,
    ) -> Result<Vec<ScoredPost>, StoreError>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier written next to each vector this provider produces.
    fn model(&self) -> &str;

    /// Output dimensions. Must be stable for the lifetime of an index.
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}
