use crate::error::StoreError;
use crate::models::{BlogPost, ScoredPost};
use crate::traits::{DocumentStore, InsertStream};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, Document};
use mongodb::change_stream::event::OperationType;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use std::time::Duration;
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MongoDB adapter over the posts collection, with Atlas `$vectorSearch`
/// backing the similarity queries and a change stream backing the insert
/// feed.
pub struct MongoStore {
    collection: Collection<Document>,
    vector_index: String,
}

impl MongoStore {
    pub async fn connect(
        url: &str,
        database: &str,
        collection: &str,
        vector_index: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(url).await?;
        options.connect_timeout = Some(CONNECT_TIMEOUT);
        options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);

        let client = Client::with_options(options)?;
        let posts = client.database(database).collection::<Document>(collection);
        info!(database, collection, "connected to document store");

        Ok(Self::new(posts, vector_index))
    }

    pub fn new(collection: Collection<Document>, vector_index: impl Into<String>) -> Self {
        Self {
            collection,
            vector_index: vector_index.into(),
        }
    }

    pub fn vector_index(&self) -> &str {
        &self.vector_index
    }

    /// Checks the collection's search indexes for the configured vector
    /// index. The index must be declared with the same dimensions the
    /// embedding provider produces.
    pub async fn vector_index_exists(&self) -> Result<bool, StoreError> {
        let pipeline = vec![doc! { "$listSearchIndexes": {} }];
        let mut cursor = self.collection.aggregate(pipeline).await?;

        while let Some(index) = cursor.try_next().await? {
            if index.get_str("name") == Ok(self.vector_index.as_str()) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn find_all(&self) -> Result<Vec<BlogPost>, StoreError> {
        let mut cursor = self.collection.find(doc! {}).await?;

        let mut posts = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            match post_from_document(&document) {
                Ok(post) => posts.push(post),
                Err(error) => warn!(%error, "skipping malformed post document"),
            }
        }
        Ok(posts)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<BlogPost>, StoreError> {
        let object_id = parse_object_id(id)?;
        let document = self.collection.find_one(doc! { "_id": object_id }).await?;
        document.map(|doc| post_from_document(&doc)).transpose()
    }

    async fn update_embedding(
        &self,
        id: &str,
        embedding: &[f32],
        model: &str,
    ) -> Result<(), StoreError> {
        let object_id = parse_object_id(id)?;
        let values = embedding
            .iter()
            .map(|value| Bson::Double(f64::from(*value)))
            .collect::<Vec<_>>();

        self.collection
            .update_one(
                doc! { "_id": object_id },
                doc! { "$set": { "embedding": values, "embeddingModel": model } },
            )
            .await?;
        Ok(())
    }

    async fn insert_stream(&self) -> Result<InsertStream, StoreError> {
        let events = self.collection.watch().await?;

        let inserts = events.filter_map(|event| async move {
            match event {
                Ok(event) if event.operation_type == OperationType::Insert => {
                    let document = event.full_document?;
                    match post_from_document(&document) {
                        Ok(post) => Some(Ok(post)),
                        Err(error) => {
                            warn!(%error, "skipping malformed insert event");
                            None
                        }
                    }
                }
                Ok(_) => None,
                Err(error) => Some(Err(StoreError::Database(error))),
            }
        });

        Ok(inserts.boxed())
    }

    async fn similarity_search(
        &self,
        query_vector: &[f32],
        candidate_pool: usize,
        limit: usize,
    ) -> Result<Vec<ScoredPost>, StoreError> {
        let vector = query_vector
            .iter()
            .map(|value| Bson::Double(f64::from(*value)))
            .collect::<Vec<_>>();

        // The embedding itself is not projected back; results only need the
        // content fields and the search score.
        let pipeline = vec![
            doc! {
                "$vectorSearch": {
                    "index": &self.vector_index,
                    "path": "embedding",
                    "queryVector": vector,
                    "numCandidates": candidate_pool as i64,
                    "limit": limit as i64,
                }
            },
            doc! {
                "$project": {
                    "_id": 1,
                    "title": 1,
                    "body": 1,
                    "source": 1,
                    "createdAt": 1,
                    "updatedAt": 1,
                    "embeddingModel": 1,
                    "score": { "$meta": "vectorSearchScore" },
                }
            },
        ];

        let mut cursor = self.collection.aggregate(pipeline).await?;
        let mut results = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            let score = document.get_f64("score").unwrap_or(0.0);
            match post_from_document(&document) {
                Ok(post) => results.push(ScoredPost { post, score }),
                Err(error) => warn!(%error, "skipping malformed search hit"),
            }
        }
        Ok(results)
    }
}

fn parse_object_id(id: &str) -> Result<ObjectId, StoreError> {
    ObjectId::parse_str(id)
        .map_err(|error| StoreError::InvalidDocument(format!("bad post id {id}: {error}")))
}

fn post_from_document(document: &Document) -> Result<BlogPost, StoreError> {
    let id = match document.get("_id") {
        Some(Bson::ObjectId(object_id)) => object_id.to_hex(),
        Some(other) => other.to_string(),
        None => {
            return Err(StoreError::InvalidDocument(
                "post document missing _id".to_string(),
            ))
        }
    };

    let title = document.get_str("title").unwrap_or_default().to_string();
    let body = document.get_str("body").unwrap_or_default().to_string();
    let source = document.get_str("source").ok().map(str::to_string);

    let created_at = bson_datetime(document.get("createdAt")).unwrap_or_else(Utc::now);
    let updated_at = bson_datetime(document.get("updatedAt"));

    let embedding = document.get_array("embedding").ok().map(|values| {
        values
            .iter()
            .filter_map(bson_number)
            .collect::<Vec<f32>>()
    });
    let embedding_model = document.get_str("embeddingModel").ok().map(str::to_string);

    Ok(BlogPost {
        id,
        title,
        body,
        source,
        created_at,
        updated_at,
        embedding,
        embedding_model,
    })
}

fn bson_number(value: &Bson) -> Option<f32> {
    match value {
        Bson::Double(value) => Some(*value as f32),
        Bson::Int32(value) => Some(*value as f32),
        Bson::Int64(value) => Some(*value as f32),
        _ => None,
    }
}

fn bson_datetime(value: Option<&Bson>) -> Option<DateTime<Utc>> {
    match value {
        Some(Bson::DateTime(datetime)) => {
            DateTime::from_timestamp_millis(datetime.timestamp_millis())
        }
        Some(Bson::String(raw)) => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc)),
        _ => None,
    }
}
