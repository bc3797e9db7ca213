//! LLM-backed metadata generation for records and collections.

mod album;
mod collection;
mod llm;
mod retry;

pub use album::{AlbumMetadata, AlbumMetadataGenerator, MAX_TAG_CHARS};
pub use collection::{
    describe_record, top_tags, CollectionMetadata, CollectionMetadataAggregator, TOP_TAGS,
};
pub use llm::{
    parse_json_payload, ChatMessage, ChatRole, ChatTransport, JsonModel, LlmClient, LlmSettings,
    OpenAiTransport,
};
pub use retry::{retry, retry_when, RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};

#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("llm api key is not configured")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion had no content")]
    EmptyCompletion,
    #[error("completion is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("collection has no records")]
    EmptyCollection,
    #[error("metadata generation failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<EnrichmentError>,
    },
}

impl EnrichmentError {
    /// Whether another attempt could succeed. Configuration problems and
    /// client errors other than timeouts and rate limits are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            EnrichmentError::MissingApiKey | EnrichmentError::EmptyCollection => false,
            EnrichmentError::Status { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            EnrichmentError::Exhausted { .. } => false,
            _ => true,
        }
    }
}
