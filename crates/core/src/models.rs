use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: String,
    pub title: String,
    pub body: String,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub embedding: Option<Vec<f32>>,
    /// Model that produced `embedding`. `None` on posts written before the
    /// tag existed; their generation is inferred from the vector length.
    pub embedding_model: Option<String>,
}

impl BlogPost {
    /// Text fed to the embedding provider. Both ingestion paths must embed
    /// the same input for a given post.
    pub fn embedding_input(&self) -> String {
        format!("{} {}", self.title, self.body)
    }
}

/// A retrieval hit. The score is store-defined (higher = more similar) and
/// never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredPost {
    pub post: BlogPost,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimensions: usize,
    /// Output dimensions of superseded model generations still present on
    /// legacy posts.
    pub superseded_dimensions: Vec<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-large".to_string(),
            dimensions: 3072,
            superseded_dimensions: vec![1536],
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    pub limit: usize,
    pub threshold: f64,
    /// The candidate pool handed to the store is `limit` times this factor.
    pub candidate_multiplier: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            threshold: 0.3,
            candidate_multiplier: 40,
        }
    }
}
