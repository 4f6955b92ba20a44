use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding api returned {status}: {details}")]
    Api { status: u16, details: String },

    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("change stream terminated: {0}")]
    StreamTerminated(String),
}

/// Failure while embedding a single document. Contained at the document
/// boundary by both ingestion paths; never aborts sibling processing.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("query embedding failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("similarity search failed: {0}")]
    Store(#[from] StoreError),
}
