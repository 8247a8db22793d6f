//! sentinel-retriever: multimodal image retrieval over a vector database
//!
//! This crate loads a captioned image dataset, writes image embeddings into a
//! Milvus collection and answers text-to-image and image-to-image queries
//! against it.
//!
//! ## Key Modules
//!
//! - **[`dataset`]**: Flickr-style image folder plus `captions.txt` loader
//! - **[`defaults`]**: environment-backed connection settings and search defaults
//! - **[`retrieval`]**: the retriever and the dataset indexer
//! - **[`storage`]**: vector store abstraction with the Milvus REST client
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sentinel_embed::{ExtractorConfig, FastEmbedExtractor};
//! use sentinel_retriever::defaults::RetrieverConfig;
//! use sentinel_retriever::retrieval::{MultimodalRetriever, SearchQuery};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let extractor = FastEmbedExtractor::create(ExtractorConfig::default()).await?;
//! let retriever = MultimodalRetriever::connect(Arc::new(extractor), RetrieverConfig::from_env())?;
//!
//! let query = SearchQuery::Text("two dogs playing in the snow".to_string());
//! for hit in retriever.search_hits(&query, Some(5)).await? {
//!     println!("{:.3} {} {}", hit.similarity, hit.filename, hit.caption);
//! }
//! retriever.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! FlickrDataset → DatasetIndexer → FeatureExtractor → VectorStore (Milvus)
//!                                         ↑                 ↓
//!                   SearchQuery → MultimodalRetriever ← RawMatch → SearchHit
//! ```

pub mod dataset;
pub mod defaults;
pub mod retrieval;
pub mod storage;
