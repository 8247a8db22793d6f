//! Milvus backend speaking the REST v2 API (`/v2/vectordb/...`).
//!
//! Every call is a JSON `POST`; Milvus answers `{"code": 0, "data": ...}` on
//! success and a non-zero code with a `message` otherwise.

use super::{Entity, RawMatch, SearchRequest, VectorStore};
use crate::defaults::{DEFAULT_VECTOR_FIELD_NAME, Metric, RetrieverConfig};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct MilvusResponse {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Milvus client bound to one database
pub struct MilvusClient {
    http: Client,
    base_url: String,
    db_name: String,
    token: Option<String>,
    closed: AtomicBool,
}

impl std::fmt::Debug for MilvusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MilvusClient")
            .field("base_url", &self.base_url)
            .field("db_name", &self.db_name)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl MilvusClient {
    pub fn new(uri: &str, db_name: &str, token: Option<String>) -> Result<Self> {
        let base_url = uri.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            bail!("Milvus URI must start with http:// or https://, got '{uri}'");
        }
        let http = Client::builder()
            .build()
            .context("failed to build HTTP client")?;

        info!("Connecting to Milvus at {} (db: {})", base_url, db_name);
        Ok(Self {
            http,
            base_url,
            db_name: db_name.to_string(),
            token,
            closed: AtomicBool::new(false),
        })
    }

    pub fn from_config(config: &RetrieverConfig) -> Result<Self> {
        Self::new(&config.db_uri, &config.db_name, config.token.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, path: &str, mut body: Value) -> Result<Value> {
        if self.closed.load(Ordering::Acquire) {
            bail!("Milvus client is closed");
        }
        if let Value::Object(map) = &mut body {
            map.insert("dbName".to_string(), Value::String(self.db_name.clone()));
        }

        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        let mut request = self.http.post(&url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        let status = response.status();
        let parsed: MilvusResponse = response
            .json()
            .await
            .with_context(|| format!("invalid response from {url} (HTTP {status})"))?;

        // REST v1 used 200 for success, v2 uses 0
        if parsed.code != 0 && parsed.code != 200 {
            return Err(anyhow!(
                "Milvus error {} on {}: {}",
                parsed.code,
                path,
                parsed.message.unwrap_or_default()
            ));
        }
        Ok(parsed.data)
    }
}

/// Split a flattened search row into score, id and entity fields.
pub(crate) fn split_row(mut row: Map<String, Value>) -> Result<RawMatch> {
    let distance = row
        .remove("distance")
        .and_then(|d| d.as_f64())
        .ok_or_else(|| anyhow!("search result row without a numeric distance"))?;
    let id = row.remove("id");
    Ok(RawMatch {
        id,
        distance: distance as f32,
        entity: row,
    })
}

#[async_trait]
impl VectorStore for MilvusClient {
    async fn search(&self, request: SearchRequest) -> Result<Vec<RawMatch>> {
        let body = json!({
            "collectionName": request.collection_name,
            "data": [request.vector],
            "annsField": DEFAULT_VECTOR_FIELD_NAME,
            "limit": request.limit,
            "outputFields": request.output_fields,
            "searchParams": { "metricType": request.metric.as_str() },
        });
        let data = self.post("/v2/vectordb/entities/search", body).await?;

        let rows: Vec<Map<String, Value>> =
            serde_json::from_value(data).context("search data is not a list of rows")?;
        rows.into_iter().map(split_row).collect()
    }

    async fn has_collection(&self, collection_name: &str) -> Result<bool> {
        let data = self
            .post(
                "/v2/vectordb/collections/has",
                json!({ "collectionName": collection_name }),
            )
            .await?;
        Ok(data.get("has").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn create_collection(
        &self,
        collection_name: &str,
        dimension: usize,
        metric: Metric,
    ) -> Result<()> {
        // Quick setup: auto-id primary key, dynamic fields for filename/caption
        self.post(
            "/v2/vectordb/collections/create",
            json!({
                "collectionName": collection_name,
                "dimension": dimension,
                "metricType": metric.as_str(),
                "idType": "Int64",
                "autoID": true,
                "primaryFieldName": "id",
                "vectorFieldName": DEFAULT_VECTOR_FIELD_NAME,
            }),
        )
        .await?;
        info!("Created collection {} ({}d, {})", collection_name, dimension, metric);
        Ok(())
    }

    async fn drop_collection(&self, collection_name: &str) -> Result<()> {
        self.post(
            "/v2/vectordb/collections/drop",
            json!({ "collectionName": collection_name }),
        )
        .await?;
        info!("Dropped collection {}", collection_name);
        Ok(())
    }

    async fn insert(&self, collection_name: &str, entities: Vec<Entity>) -> Result<usize> {
        if entities.is_empty() {
            return Ok(0);
        }
        let submitted = entities.len();
        let data = self
            .post(
                "/v2/vectordb/entities/insert",
                json!({ "collectionName": collection_name, "data": entities }),
            )
            .await?;
        let inserted = data
            .get("insertCount")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(submitted);
        debug!("Inserted {} entities into {}", inserted, collection_name);
        Ok(inserted)
    }

    async fn row_count(&self, collection_name: &str) -> Result<u64> {
        let data = self
            .post(
                "/v2/vectordb/collections/get_stats",
                json!({ "collectionName": collection_name }),
            )
            .await?;
        data.get("rowCount")
            .and_then(|v| v.as_u64().or_else(|| v.as_str()?.parse().ok()))
            .ok_or_else(|| anyhow!("collection stats without rowCount"))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Closed Milvus client for {}", self.base_url);
        }
        Ok(())
    }
}
