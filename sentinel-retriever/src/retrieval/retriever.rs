//! Text-to-image and image-to-image retrieval.
//!
//! A query is embedded with the [`FeatureExtractor`], searched against the
//! configured collection with the configured metric, and every raw match is
//! reshaped into a [`SearchHit`].
//!
//! ```text
//! SearchQuery ─► FeatureExtractor ─► vector
//!             ─► VectorStore::search ─► RawMatch ─► SearchHit
//! ```

use crate::defaults::RetrieverConfig;
use crate::storage::milvus::MilvusClient;
use crate::storage::{RawMatch, SearchRequest, VectorStore};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::DynamicImage;
use sentinel_embed::{EmbedError, FeatureExtractor};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type Result<T> = std::result::Result<T, RetrieveError>;

#[derive(Debug, thiserror::Error)]
pub enum RetrieveError {
    /// The query cannot be searched (wrong type, empty text, empty image)
    #[error("Invalid search query: {message}")]
    InvalidQuery { message: String },

    /// A raw match lacks a field every hit needs
    #[error("Malformed search result: {message}")]
    MalformedMatch { message: String },

    #[error("Embedding failed: {source}")]
    Embedding {
        #[from]
        source: EmbedError,
    },

    #[error("Vector store error: {source}")]
    Store {
        #[from]
        source: anyhow::Error,
    },
}

impl RetrieveError {
    pub fn invalid_query<S: Into<String>>(message: S) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    pub fn is_invalid_query(&self) -> bool {
        matches!(self, Self::InvalidQuery { .. })
    }
}

/// A search hit; the caption is the dataset's ground truth caption and the
/// similarity is reported by the vector store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub caption: String,
    pub similarity: f32,
    pub filename: String,
}

impl SearchHit {
    fn from_match(raw: &RawMatch) -> Result<Self> {
        let filename = raw
            .field_str("filename")
            .ok_or_else(|| RetrieveError::MalformedMatch {
                message: format!("match {:?} has no 'filename' field", raw.id),
            })?
            .to_string();
        let caption = match raw.field_str("caption") {
            Some(caption) => caption.to_string(),
            None => {
                warn!("Match for {} has no caption", filename);
                String::new()
            }
        };
        Ok(Self {
            caption,
            similarity: raw.distance,
            filename,
        })
    }
}

/// What to search for
#[derive(Debug, Clone)]
pub enum SearchQuery {
    Text(String),
    Image(DynamicImage),
}

impl SearchQuery {
    /// Interpret a JSON value as a query: a string is a text query and
    /// `{"image": "<base64>"}` is an image query. Anything else is rejected.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(text) => Ok(Self::Text(text.clone())),
            Value::Object(map) => match map.get("image") {
                Some(Value::String(encoded)) => Self::from_base64(encoded),
                _ => Err(invalid_type(value)),
            },
            _ => Err(invalid_type(value)),
        }
    }

    /// Decode a base64 image payload into an image query.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        decode_image(encoded).map(Self::Image)
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Text(text) if text.trim().is_empty() => {
                Err(RetrieveError::invalid_query("the text query is empty"))
            }
            Self::Image(image) if image.width() == 0 || image.height() == 0 => {
                Err(RetrieveError::invalid_query("the image query has no pixels"))
            }
            _ => Ok(()),
        }
    }
}

/// Decode a base64 image (a `data:` URL prefix is accepted).
pub fn decode_image(encoded: &str) -> Result<DynamicImage> {
    let payload = match encoded.split_once(";base64,") {
        Some((_, data)) => data,
        None => encoded,
    };
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| RetrieveError::invalid_query(format!("image is not valid base64: {e}")))?;
    image::load_from_memory(&bytes)
        .map_err(|e| RetrieveError::invalid_query(format!("image could not be decoded: {e}")))
}

fn invalid_type(value: &Value) -> RetrieveError {
    let kind = match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object without an 'image' string",
    };
    RetrieveError::invalid_query(format!(
        "The search query must be either a string or an image, got {kind}"
    ))
}

/// Embeds queries and searches them against one collection
pub struct MultimodalRetriever {
    extractor: Arc<dyn FeatureExtractor>,
    store: Arc<dyn VectorStore>,
    config: RetrieverConfig,
}

impl MultimodalRetriever {
    pub fn new(
        extractor: Arc<dyn FeatureExtractor>,
        store: Arc<dyn VectorStore>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            extractor,
            store,
            config,
        }
    }

    /// Build a retriever backed by the Milvus instance named in `config`.
    pub fn connect(extractor: Arc<dyn FeatureExtractor>, config: RetrieverConfig) -> Result<Self> {
        let store = MilvusClient::from_config(&config)?;
        Ok(Self::new(extractor, Arc::new(store), config))
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Search for `query`, returning at most `top_k` hits (the configured
    /// default when `None`) in the store's order, best first.
    pub async fn search_hits(
        &self,
        query: &SearchQuery,
        top_k: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        query.validate()?;
        let limit = top_k.unwrap_or(self.config.top_k);
        if limit == 0 {
            return Err(RetrieveError::invalid_query("top_k must be at least 1"));
        }

        debug!("Embedding {} query (limit {})", query.kind(), limit);
        let vector = match query {
            SearchQuery::Text(text) => self.extractor.embed_text(text).await?,
            SearchQuery::Image(image) => self.extractor.embed_image(image).await?,
        };

        let matches = self
            .store
            .search(SearchRequest {
                collection_name: self.config.collection_name.clone(),
                vector,
                output_fields: self.config.output_fields.clone(),
                limit,
                metric: self.config.metric,
            })
            .await?;

        let hits = matches
            .iter()
            .map(SearchHit::from_match)
            .collect::<Result<Vec<_>>>()?;
        info!("Returning {} hits", hits.len());
        Ok(hits)
    }

    /// [`SearchQuery::from_json`] followed by [`Self::search_hits`].
    pub async fn search_json(&self, query: &Value, top_k: Option<usize>) -> Result<Vec<SearchHit>> {
        let query = SearchQuery::from_json(query)?;
        self.search_hits(&query, top_k).await
    }

    /// Release the database connection.
    pub async fn close(self) -> Result<()> {
        self.store.close().await?;
        Ok(())
    }
}
