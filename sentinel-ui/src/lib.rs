//! # sentinel-ui
//!
//! Browser front-end for multimodal retrieval. The server loads the
//! embedding models and connects to Milvus once at start-up, then serves a
//! single page with two searches:
//!
//! - **Text-to-image**: a query sentence is embedded with the text model.
//! - **Image-to-image**: an uploaded image is resized to 370px wide, cropped
//!   to the selected region and embedded with the vision model.
//!
//! Results are laid out in five columns; captions are shown on demand.
//!
//! ## Routes
//!
//! | route | purpose |
//! |---|---|
//! | `GET /` | the page |
//! | `GET /health` | liveness |
//! | `POST /api/search/{trigger}` | `text-to-image` or `image-to-image` (bodies up to 25 MiB) |
//! | `GET /images/...` | dataset images |
//!
//! ## Quick Start
//!
//! ```bash
//! sentinel-retriever index ./flickr8k
//! sentinel-ui --dataset ./flickr8k
//! ```

pub mod crop;
pub mod error;
pub mod server;

pub use error::UiError;
pub use server::{AppState, MAX_REQUEST_BYTES, app_router, run_server};

use std::path::PathBuf;

/// Number of hits requested per search.
pub const UI_TOP_K: usize = 30;

/// Number of result columns.
pub const UI_COLUMNS: usize = 5;

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub host: String,
    pub port: u16,
    /// Dataset root; stored filenames are relative to it
    pub dataset_root: PathBuf,
    pub model_dir: PathBuf,
    pub top_k: usize,
    pub columns: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
            dataset_root: PathBuf::from("."),
            model_dir: sentinel_embed::config::default_cache_dir(),
            top_k: UI_TOP_K,
            columns: UI_COLUMNS,
        }
    }
}
