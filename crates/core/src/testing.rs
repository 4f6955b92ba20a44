use crate::error::{ProviderError, StoreError};
use crate::models::{BlogPost, ScoredPost};
use crate::traits::{DocumentStore, EmbeddingProvider, InsertStream};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Mutex;

pub fn post(id: &str, embedding: Option<Vec<f32>>, model: Option<&str>) -> BlogPost {
    BlogPost {
        id: id.to_string(),
        title: format!("post {id}"),
        body: "body".to_string(),
        source: None,
        created_at: Utc::now(),
        updated_at: None,
        embedding,
        embedding_model: model.map(str::to_string),
    }
}

pub fn hit(id: &str, score: f64) -> ScoredPost {
    ScoredPost {
        post: post(id, None, None),
        score,
    }
}

/// In-memory stand-in for the document store. Records every embedding write
/// and the parameters of the last similarity search.
#[derive(Default)]
pub struct InMemoryStore {
    posts: Mutex<Vec<BlogPost>>,
    writes: Mutex<Vec<String>>,
    feed_items: Mutex<Vec<Result<BlogPost, StoreError>>>,
    endless_feed: bool,
    search_hits: Vec<ScoredPost>,
    last_search: Mutex<Option<(usize, usize)>>,
    fail_update_for: Vec<String>,
}

impl InMemoryStore {
    pub fn with_posts(posts: Vec<BlogPost>) -> Self {
        Self {
            posts: Mutex::new(posts),
            ..Self::default()
        }
    }

    /// `endless` keeps the stream open after the scripted items, the way a
    /// live subscription behaves between inserts.
    pub fn with_feed(items: Vec<Result<BlogPost, StoreError>>, endless: bool) -> Self {
        Self {
            feed_items: Mutex::new(items),
            endless_feed: endless,
            ..Self::default()
        }
    }

    pub fn with_hits(hits: Vec<ScoredPost>) -> Self {
        Self {
            search_hits: hits,
            ..Self::default()
        }
    }

    pub fn failing_updates(mut self, ids: &[&str]) -> Self {
        self.fail_update_for = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().expect("lock poisoned").len()
    }

    pub fn written_ids(&self) -> Vec<String> {
        self.writes.lock().expect("lock poisoned").clone()
    }

    pub fn snapshot(&self) -> Vec<BlogPost> {
        self.posts.lock().expect("lock poisoned").clone()
    }

    pub fn last_search(&self) -> Option<(usize, usize)> {
        *self.last_search.lock().expect("lock poisoned")
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn find_all(&self) -> Result<Vec<BlogPost>, StoreError> {
        Ok(self.snapshot())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<BlogPost>, StoreError> {
        Ok(self
            .posts
            .lock()
            .expect("lock poisoned")
            .iter()
            .find(|post| post.id == id)
            .cloned())
    }

    async fn update_embedding(
        &self,
        id: &str,
        embedding: &[f32],
        model: &str,
    ) -> Result<(), StoreError> {
        if self.fail_update_for.iter().any(|target| target == id) {
            return Err(StoreError::InvalidDocument(format!(
                "scripted write failure for {id}"
            )));
        }

        self.writes
            .lock()
            .expect("lock poisoned")
            .push(id.to_string());

        let mut posts = self.posts.lock().expect("lock poisoned");
        if let Some(post) = posts.iter_mut().find(|post| post.id == id) {
            post.embedding = Some(embedding.to_vec());
            post.embedding_model = Some(model.to_string());
        }
        Ok(())
    }

    async fn insert_stream(&self) -> Result<InsertStream, StoreError> {
        let items = std::mem::take(&mut *self.feed_items.lock().expect("lock poisoned"));
        let scripted = stream::iter(items);
        if self.endless_feed {
            Ok(scripted.chain(stream::pending()).boxed())
        } else {
            Ok(scripted.boxed())
        }
    }

    async fn similarity_search(
        &self,
        _query_vector: &[f32],
        candidate_pool: usize,
        limit: usize,
    ) -> Result<Vec<ScoredPost>, StoreError> {
        *self.last_search.lock().expect("lock poisoned") = Some((candidate_pool, limit));
        let mut hits = self.search_hits.clone();
        hits.truncate(limit);
        Ok(hits)
    }
}

/// Deterministic provider. Fails for any input containing one of the
/// configured needles; otherwise returns a constant vector of the configured
/// dimensions.
pub struct ScriptedProvider {
    model: String,
    dimensions: usize,
    fail_for: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            model: "text-embedding-3-large".to_string(),
            dimensions,
            fail_for: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_for(mut self, needle: &str) -> Self {
        self.fail_for.push(needle.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("lock poisoned").len()
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedProvider {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls
            .lock()
            .expect("lock poisoned")
            .push(text.to_string());

        if self.fail_for.iter().any(|needle| text.contains(needle)) {
            return Err(ProviderError::Api {
                status: 500,
                details: "scripted failure".to_string(),
            });
        }
        Ok(vec![0.5; self.dimensions])
    }
}
