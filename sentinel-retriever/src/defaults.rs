//! Process-wide defaults and the retriever configuration.
//!
//! Connection settings come from the environment with the fallbacks below:
//!
//! | variable | default |
//! |---|---|
//! | `MILVUS_URI` | `http://localhost:19530` |
//! | `MILVUS_DB_NAME` | `default` |
//! | `MILVUS_COLLECTION_NAME` | `mm_retrieval_collection` |
//! | `MILVUS_TOKEN` | unset |

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use sentinel_embed::VECTOR_FIELD_DIM;

pub const MILVUS_URI_ENV: &str = "MILVUS_URI";
pub const MILVUS_DB_NAME_ENV: &str = "MILVUS_DB_NAME";
pub const MILVUS_COLLECTION_NAME_ENV: &str = "MILVUS_COLLECTION_NAME";
pub const MILVUS_TOKEN_ENV: &str = "MILVUS_TOKEN";

pub const DEFAULT_MILVUS_URI: &str = "http://localhost:19530";
pub const DEFAULT_MILVUS_DB_NAME: &str = "default";
pub const DEFAULT_COLLECTION_NAME: &str = "mm_retrieval_collection";
pub const DEFAULT_VECTOR_FIELD_NAME: &str = "embedding";
pub const DEFAULT_METRIC: Metric = Metric::Cosine;
pub const DEFAULT_FIELDS: &[&str] = &["filename", "caption"];
pub const DEFAULT_TOP_K: usize = 20;

/// Similarity metric used by the collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Metric {
    /// Cosine similarity; higher scores are more similar
    #[default]
    Cosine,
    /// Inner product
    Ip,
    /// Euclidean distance; lower scores are more similar
    L2,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "COSINE",
            Metric::Ip => "IP",
            Metric::L2 => "L2",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn env_or(name: &str, fallback: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

pub fn milvus_uri() -> String {
    env_or(MILVUS_URI_ENV, DEFAULT_MILVUS_URI)
}

pub fn milvus_db_name() -> String {
    env_or(MILVUS_DB_NAME_ENV, DEFAULT_MILVUS_DB_NAME)
}

pub fn milvus_collection_name() -> String {
    env_or(MILVUS_COLLECTION_NAME_ENV, DEFAULT_COLLECTION_NAME)
}

pub fn milvus_token() -> Option<String> {
    std::env::var(MILVUS_TOKEN_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn default_output_fields() -> Vec<String> {
    DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect()
}

/// Everything the retriever needs to reach and query its collection
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
#[builder(setter(into))]
pub struct RetrieverConfig {
    /// Milvus endpoint, e.g. `http://localhost:19530`
    #[builder(default = "DEFAULT_MILVUS_URI.to_string()")]
    pub db_uri: String,
    #[builder(default = "DEFAULT_MILVUS_DB_NAME.to_string()")]
    pub db_name: String,
    /// Bearer token (`user:password` or an API key)
    #[builder(default)]
    pub token: Option<String>,
    #[builder(default = "DEFAULT_COLLECTION_NAME.to_string()")]
    pub collection_name: String,
    /// Number of hits returned when the caller does not ask for a count
    #[builder(default = "DEFAULT_TOP_K")]
    pub top_k: usize,
    /// Entity fields returned with every match
    #[builder(default = "default_output_fields()")]
    pub output_fields: Vec<String>,
    #[builder(default = "DEFAULT_METRIC")]
    pub metric: Metric,
}

impl RetrieverConfig {
    pub fn builder() -> RetrieverConfigBuilder {
        RetrieverConfigBuilder::default()
    }

    /// Build a configuration from `MILVUS_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            db_uri: milvus_uri(),
            db_name: milvus_db_name(),
            token: milvus_token(),
            collection_name: milvus_collection_name(),
            ..Self::default()
        }
    }

    /// Set the default result count (builder style)
    pub fn with_top_k(self, top_k: usize) -> Self {
        Self { top_k, ..self }
    }

    pub fn with_collection<S: Into<String>>(self, collection_name: S) -> Self {
        Self {
            collection_name: collection_name.into(),
            ..self
        }
    }
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        RetrieverConfigBuilder::default()
            .build()
            .expect("all RetrieverConfig fields have defaults")
    }
}
