//! Error types for feature extraction and model downloads

use std::path::PathBuf;

/// Result type for feature extraction operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for everything that can go wrong while loading a model,
/// embedding images or text, or fetching model files from the hub.
///
/// # Error Categories
///
/// - **Configuration Errors**: unknown model codes, dimension mismatches
/// - **Initialization Errors**: a model that cannot be loaded
/// - **Runtime Errors**: failures during embedding generation or image encoding
/// - **IO Errors**: file system access issues
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// A model file expected on disk is missing
    #[error("Model file not found: {path}")]
    ModelFileNotFound { path: PathBuf },

    /// The configuration names a model that no backend knows about
    #[error("Unsupported model: {model}")]
    UnsupportedModel { model: String },

    /// The model identifier is not a valid hub repository id
    #[error("Invalid model identifier '{model}': expected <owner>/<name>")]
    InvalidModelId { model: String },

    /// Error when model configuration is invalid
    #[error("Invalid model configuration: {message}")]
    InvalidConfig { message: String },

    /// The named model could not be loaded
    #[error("Could not load model {model}. Error: {source}")]
    ModelLoad {
        model: String,
        #[source]
        source: anyhow::Error,
    },

    /// The model failed while running inference on a batch
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: anyhow::Error,
    },

    /// An input image could not be re-encoded for the model
    #[error("Image encoding failed: {source}")]
    ImageEncoding {
        #[from]
        source: image::ImageError,
    },

    /// Hub download failures
    #[error("Model download failed: {source}")]
    Download {
        #[from]
        source: hf_hub::api::tokio::ApiError,
    },

    /// IO errors when reading model files
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },
}

impl EmbedError {
    /// Wrap a loader failure together with the name of the model that failed.
    pub fn model_load<S: Into<String>>(model: S, source: anyhow::Error) -> Self {
        Self::ModelLoad {
            model: model.into(),
            source,
        }
    }

    /// Wrap an inference failure reported by the embedding backend.
    pub fn embedding_gen(source: anyhow::Error) -> Self {
        Self::EmbeddingGeneration { source }
    }

    /// Create an invalid configuration error with a custom message.
    ///
    /// Used for configuration validation failures such as a vision and a
    /// text model that do not share an embedding dimension.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn unsupported_model<S: Into<String>>(model: S) -> Self {
        Self::UnsupportedModel {
            model: model.into(),
        }
    }
}
