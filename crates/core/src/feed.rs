use crate::error::StoreError;
use crate::ingest::embed_post;
use crate::models::BlogPost;
use crate::policy::{EmbeddingAction, VersionPolicy};
use crate::traits::{DocumentStore, EmbeddingProvider};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Counters for one feed subscription, returned when the task stops.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedReport {
    pub embedded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Long-lived consumer of the store's insert notifications.
///
/// Each new post is classified and embedded one at a time. Per-post failures
/// are logged and consumption continues; a terminal error on the stream
/// itself ends the subscription and is surfaced through the handle so the
/// owning process can decide whether to resubscribe.
pub struct ChangeFeedProcessor<S, P> {
    store: Arc<S>,
    provider: Arc<P>,
    policy: VersionPolicy,
}

impl<S, P> ChangeFeedProcessor<S, P>
where
    S: DocumentStore + 'static,
    P: EmbeddingProvider + 'static,
{
    pub fn new(store: Arc<S>, provider: Arc<P>, policy: VersionPolicy) -> Self {
        Self {
            store,
            provider,
            policy,
        }
    }

    /// Subscribes to the insert stream and spawns the consumer task.
    /// Consuming `self` makes a second subscription from the same processor
    /// unrepresentable.
    pub fn start(self) -> FeedHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        FeedHandle {
            shutdown: Arc::new(shutdown_tx),
            task,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<FeedReport, StoreError> {
        let mut inserts = self.store.insert_stream().await?;
        info!("change feed active");

        let mut report = FeedReport::default();
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!(
                        embedded = report.embedded,
                        failed = report.failed,
                        "change feed cancelled"
                    );
                    return Ok(report);
                }
                item = inserts.next() => match item {
                    Some(Ok(post)) => self.process(post, &mut report).await,
                    Some(Err(error)) => {
                        return Err(StoreError::StreamTerminated(error.to_string()));
                    }
                    None => {
                        return Err(StoreError::StreamTerminated(
                            "insert stream ended".to_string(),
                        ));
                    }
                },
            }
        }
    }

    async fn process(&self, post: BlogPost, report: &mut FeedReport) {
        // New posts always classify as Create; going through the policy keeps
        // both ingestion paths on the same decision.
        if self.policy.classify(&post) == EmbeddingAction::Skip {
            report.skipped += 1;
            return;
        }

        match embed_post(self.store.as_ref(), self.provider.as_ref(), &post).await {
            Ok(()) => {
                info!(post_id = %post.id, title = %post.title, "embedded new post");
                report.embedded += 1;
            }
            Err(error) => {
                warn!(post_id = %post.id, %error, "failed to embed new post");
                report.failed += 1;
            }
        }
    }
}

/// Cancellable subscription to the change feed.
pub struct FeedHandle {
    shutdown: Arc<watch::Sender<bool>>,
    task: JoinHandle<Result<FeedReport, StoreError>>,
}

impl FeedHandle {
    /// Stops consumption after any in-flight post completes.
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }

    /// A detached trigger for cancelling from another task.
    pub fn canceller(&self) -> FeedCanceller {
        FeedCanceller {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Waits for the consumer task and returns its outcome.
    pub async fn join(self) -> Result<FeedReport, StoreError> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(error) => Err(StoreError::StreamTerminated(format!(
                "feed task aborted: {error}"
            ))),
        }
    }
}

#[derive(Clone)]
pub struct FeedCanceller {
    shutdown: Arc<watch::Sender<bool>>,
}

impl FeedCanceller {
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }
}
