use crate::error::RetrieveError;
use crate::models::{RetrievalOptions, ScoredPost};
use crate::traits::{DocumentStore, EmbeddingProvider};
use std::sync::Arc;
use tracing::debug;

/// Answers similarity queries against whatever state ingestion has produced.
/// Holds no locks across store or provider calls, so it is safe to call from
/// any number of concurrent requests.
pub struct RetrievalEngine<S, P> {
    store: Arc<S>,
    provider: Arc<P>,
    options: RetrievalOptions,
}

impl<S, P> RetrievalEngine<S, P>
where
    S: DocumentStore,
    P: EmbeddingProvider,
{
    pub fn new(store: Arc<S>, provider: Arc<P>, options: RetrievalOptions) -> Self {
        Self {
            store,
            provider,
            options,
        }
    }

    /// Retrieves with the configured default limit and threshold.
    pub async fn retrieve_default(&self, query: &str) -> Result<Vec<ScoredPost>, RetrieveError> {
        self.retrieve(query, self.options.limit, self.options.threshold)
            .await
    }

    /// Ranked, threshold-filtered retrieval.
    ///
    /// An empty result is a valid outcome, not an error; callers degrade to
    /// answering without context. A threshold of zero or below disables
    /// filtering. Thresholds are calibrated against one model's score
    /// distribution, which is why this takes the threshold per call instead
    /// of baking in a constant.
    pub async fn retrieve(
        &self,
        query: &str,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<ScoredPost>, RetrieveError> {
        if query.trim().is_empty() {
            return Err(RetrieveError::EmptyQuery);
        }

        let query_vector = self.provider.embed(query).await?;

        // Over-fetch the candidate pool to improve recall over naive top-k.
        let pool = limit
            .saturating_mul(self.options.candidate_multiplier)
            .max(limit);
        let candidates = self
            .store
            .similarity_search(&query_vector, pool, limit)
            .await?;
        let candidate_count = candidates.len();

        let mut results: Vec<ScoredPost> = candidates
            .into_iter()
            .filter(|candidate| candidate.score >= threshold)
            .collect();
        results.sort_by(|left, right| right.score.total_cmp(&left.score));
        results.truncate(limit);

        debug!(
            candidate_count,
            returned = results.len(),
            threshold,
            "retrieval complete"
        );
        Ok(results)
    }
}

/// Joins retrieval hits into the prompt-ready context block the answering
/// layer consumes.
pub fn format_context(results: &[ScoredPost]) -> String {
    results
        .iter()
        .map(|hit| {
            format!(
                "Title: {}\nContent: {}\nCreated: {}",
                hit.post.title,
                hit.post.body,
                hit.post.created_at.to_rfc3339()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}
