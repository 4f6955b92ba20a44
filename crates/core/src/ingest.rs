use crate::error::{IngestError, StoreError};
use crate::models::BlogPost;
use crate::policy::{EmbeddingAction, VersionPolicy};
use crate::traits::{DocumentStore, EmbeddingProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one reconciliation sweep. `failures` pairs each failed post id
/// with the error that stopped it, so callers can assert on failures instead
/// of grepping logs.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub created: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<(String, String)>,
}

impl ReconcileReport {
    pub fn writes(&self) -> usize {
        self.created + self.migrated
    }
}

pub(crate) async fn embed_post<S, P>(
    store: &S,
    provider: &P,
    post: &BlogPost,
) -> Result<(), IngestError>
where
    S: DocumentStore,
    P: EmbeddingProvider,
{
    let vector = provider.embed(&post.embedding_input()).await?;
    store
        .update_embedding(&post.id, &vector, provider.model())
        .await?;
    Ok(())
}

/// One-shot reconciliation pass over the whole collection, run at process
/// start and safe to re-run at any time.
pub struct SweepController<S, P> {
    store: Arc<S>,
    provider: Arc<P>,
    policy: VersionPolicy,
}

impl<S, P> SweepController<S, P>
where
    S: DocumentStore,
    P: EmbeddingProvider,
{
    pub fn new(store: Arc<S>, provider: Arc<P>, policy: VersionPolicy) -> Self {
        Self {
            store,
            provider,
            policy,
        }
    }

    /// Walks the collection once and brings every embedding up to the active
    /// model. A failure on one post is recorded and the sweep moves on to
    /// the next. Re-running against an already-current collection performs
    /// zero writes.
    pub async fn reconcile(&self) -> Result<ReconcileReport, StoreError> {
        let posts = self.store.find_all().await?;
        info!(post_count = posts.len(), "reconciling embeddings");

        let mut report = ReconcileReport::default();
        for post in posts {
            match self.policy.classify(&post) {
                EmbeddingAction::Skip => report.skipped += 1,
                action => {
                    match embed_post(self.store.as_ref(), self.provider.as_ref(), &post).await {
                        Ok(()) => {
                            if action == EmbeddingAction::Create {
                                report.created += 1;
                            } else {
                                report.migrated += 1;
                            }
                        }
                        Err(error) => {
                            warn!(post_id = %post.id, %error, "failed to embed post");
                            report.failed += 1;
                            report.failures.push((post.id.clone(), error.to_string()));
                        }
                    }
                }
            }
        }

        info!(
            created = report.created,
            migrated = report.migrated,
            skipped = report.skipped,
            failed = report.failed,
            "reconcile complete"
        );
        Ok(report)
    }
}
