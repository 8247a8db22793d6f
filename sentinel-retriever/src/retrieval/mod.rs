pub mod indexer;
pub mod retriever;

pub use indexer::{DatasetIndexer, IndexingStats};
pub use retriever::{MultimodalRetriever, RetrieveError, SearchHit, SearchQuery, decode_image};
