//! # sentinel-embed
//!
//! Multimodal feature extraction for the SENTINEL retrieval workspace. Images
//! and text are embedded into one vector space by a pair of local ONNX models
//! run through FastEmbed, so a text query can be compared against image
//! vectors (and images against images) with cosine similarity.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sentinel_embed::{ExtractorConfig, FastEmbedExtractor, FeatureExtractor};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let extractor = FastEmbedExtractor::create(ExtractorConfig::nomic_v15("models")).await?;
//!
//! let query = extractor.embed_text("a dog running on the beach").await?;
//! let image = image::open("dog.jpg")?;
//! let vector = extractor.embed_image(&image).await?;
//!
//! println!("{} / {} dimensions", query.len(), vector.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: model pair configuration
//! - [`provider`]: the [`FeatureExtractor`] trait and the FastEmbed implementation
//! - [`downloader`]: pre-fetching model files from HuggingFace Hub
//! - [`error`]: error types and result handling

pub mod config;
pub mod downloader;
pub mod error;
pub mod provider;

pub use config::{ExtractorConfig, ExtractorConfigBuilder};
pub use downloader::{DownloadReport, ModelDownloader, download_and_report};
pub use error::{EmbedError, Result};
pub use provider::{
    EmbeddingResult, FastEmbedExtractor, FeatureExtractor, cosine_similarity, l2_normalize,
};

/// Dimension of the vectors produced by the default model pair.
pub const VECTOR_FIELD_DIM: usize = 768;
