//! Vector store abstraction.
//!
//! The retriever and the indexer only talk to [`VectorStore`]; the Milvus
//! REST client in [`milvus`] is the production implementation and tests plug
//! in in-memory stores.
//!
//! ```text
//! MultimodalRetriever ─┐
//!                      ├─ VectorStore ── MilvusClient (REST v2)
//! DatasetIndexer ──────┘
//! ```

use crate::defaults::Metric;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

pub mod milvus;

/// Parameters of one top-k similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub collection_name: String,
    pub vector: Vec<f32>,
    pub output_fields: Vec<String>,
    pub limit: usize,
    pub metric: Metric,
}

/// One row returned by a similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct RawMatch {
    /// Primary key of the matched entity, when the store reports it
    pub id: Option<Value>,
    /// Score under the search metric; a similarity for COSINE
    pub distance: f32,
    /// Requested output fields
    pub entity: Map<String, Value>,
}

impl RawMatch {
    /// String value of an entity field
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.entity.get(name).and_then(Value::as_str)
    }
}

/// A row to insert: the vector plus the metadata returned at search time.
/// `embedding` is the collection's vector field
/// ([`DEFAULT_VECTOR_FIELD_NAME`](crate::defaults::DEFAULT_VECTOR_FIELD_NAME)).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub embedding: Vec<f32>,
    pub filename: String,
    pub caption: String,
}

/// Collection-level vector operations. See module docs for the architecture.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Top-k search; results are ordered best first
    async fn search(&self, request: SearchRequest) -> Result<Vec<RawMatch>>;

    async fn has_collection(&self, collection_name: &str) -> Result<bool>;

    /// Create a collection with an auto-id primary key and a float vector field
    async fn create_collection(
        &self,
        collection_name: &str,
        dimension: usize,
        metric: Metric,
    ) -> Result<()>;

    async fn drop_collection(&self, collection_name: &str) -> Result<()>;

    /// Insert entities and return how many were written
    async fn insert(&self, collection_name: &str, entities: Vec<Entity>) -> Result<usize>;

    async fn row_count(&self, collection_name: &str) -> Result<u64>;

    /// Release the connection; later calls fail
    async fn close(&self) -> Result<()>;
}
