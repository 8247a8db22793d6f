use std::{net::SocketAddr, str::FromStr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, State},
    response::{Html, IntoResponse},
    routing::{get, post},
};
use sentinel_embed::{ExtractorConfig, FastEmbedExtractor};
use sentinel_retriever::{
    defaults::RetrieverConfig,
    retrieval::{MultimodalRetriever, SearchHit, SearchQuery, decode_image},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    UiConfig,
    crop::{CropBox, prepare_query_image},
    error::UiError,
};

/// Which sidebar button triggered a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTrigger {
    TextToImage,
    ImageToImage,
}

impl FromStr for SearchTrigger {
    type Err = UiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text-to-image" => Ok(Self::TextToImage),
            "image-to-image" => Ok(Self::ImageToImage),
            other => Err(UiError::InvalidSearchType(other.to_string())),
        }
    }
}

/// Largest accepted request body. Image uploads arrive base64-encoded, about
/// 4/3 of the file size.
pub const MAX_REQUEST_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
pub struct SearchForm {
    /// Query sentence (text-to-image)
    #[serde(default)]
    pub query: Option<String>,
    /// Base64 upload (image-to-image)
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub crop: Option<CropBox>,
    #[serde(default)]
    pub show_captions: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultCell {
    pub image_url: String,
    pub similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub columns: Vec<Vec<ResultCell>>,
}

/// Distribute hits over `columns` columns: hit `i` lands in column `i % columns`.
pub fn result_columns(
    hits: &[SearchHit],
    columns: usize,
    show_captions: bool,
) -> Vec<Vec<ResultCell>> {
    let columns = columns.max(1);
    let mut grid = vec![Vec::new(); columns];
    for (i, hit) in hits.iter().enumerate() {
        grid[i % columns].push(ResultCell {
            image_url: format!("/images/{}", hit.filename.trim_start_matches('/')),
            similarity: hit.similarity,
            caption: show_captions.then(|| hit.caption.clone()),
        });
    }
    grid
}

#[derive(Clone)]
pub struct AppState {
    pub retriever: Arc<MultimodalRetriever>,
    pub top_k: usize,
    pub columns: usize,
}

impl AppState {
    pub fn new(retriever: MultimodalRetriever, top_k: usize, columns: usize) -> Self {
        Self {
            retriever: Arc::new(retriever),
            top_k,
            columns,
        }
    }
}

pub fn app_router(state: AppState, dataset_root: &std::path::Path) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/search/{trigger}", post(search))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .nest_service("/images", ServeDir::new(dataset_root))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Load the models, connect to Milvus and serve until Ctrl-C.
pub async fn run_server(config: UiConfig) -> anyhow::Result<()> {
    let extractor_config = ExtractorConfig::builder()
        .cache_dir(config.model_dir.clone())
        .build()?;
    let extractor = FastEmbedExtractor::create(extractor_config).await?;
    let retriever = MultimodalRetriever::connect(
        Arc::new(extractor),
        RetrieverConfig::from_env().with_top_k(config.top_k),
    )?;

    let state = AppState::new(retriever, config.top_k, config.columns);
    let retriever = state.retriever.clone();
    let app = app_router(state, &config.dataset_root);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for sentinel-ui server")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("sentinel-ui listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    retriever.store().close().await?;
    info!("sentinel-ui stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn index() -> impl IntoResponse {
    Html(include_str!("../ui/index.html"))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status":"ok","service":"sentinel-ui"}))
}

async fn search(
    Path(trigger): Path<String>,
    State(state): State<AppState>,
    Json(form): Json<SearchForm>,
) -> Result<Json<SearchResponse>, UiError> {
    let trigger: SearchTrigger = trigger.parse()?;
    let query = match trigger {
        SearchTrigger::TextToImage => SearchQuery::Text(form.query.unwrap_or_default()),
        SearchTrigger::ImageToImage => {
            let encoded = form
                .image
                .ok_or_else(|| UiError::bad_request("No query image uploaded"))?;
            let uploaded = decode_image(&encoded)?;
            let crop = form.crop;
            let cropped =
                tokio::task::spawn_blocking(move || prepare_query_image(&uploaded, crop))
                    .await
                    .map_err(|e| UiError::bad_request(format!("image processing failed: {e}")))??;
            SearchQuery::Image(cropped)
        }
    };

    info!("{:?} search", trigger);
    let hits = state.retriever.search_hits(&query, Some(state.top_k)).await?;
    let columns = result_columns(&hits, state.columns, form.show_captions);
    Ok(Json(SearchResponse { hits, columns }))
}
