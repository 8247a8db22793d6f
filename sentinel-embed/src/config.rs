//! Configuration for multimodal embedding models

use crate::error::{EmbedError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hub id of the default vision model.
pub const DEFAULT_VISION_MODEL: &str = "nomic-ai/nomic-embed-vision-v1.5";

/// Hub id of the text model that shares the default vision model's space.
pub const DEFAULT_TEXT_MODEL: &str = "nomic-ai/nomic-embed-text-v1.5";

/// Nomic text models expect task prefixes; queries use this one.
pub const NOMIC_QUERY_PREFIX: &str = "search_query: ";

/// Environment variable overriding the model cache directory.
pub const MODEL_DIR_ENV: &str = "SENTINEL_MODEL_DIR";

/// Configuration for a vision/text model pair producing comparable embeddings.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
#[builder(setter(into))]
pub struct ExtractorConfig {
    /// Directory where downloaded model files are cached
    #[builder(default = "default_cache_dir()")]
    pub cache_dir: PathBuf,
    /// Hub id of the image model (e.g., "nomic-ai/nomic-embed-vision-v1.5")
    #[builder(default = "DEFAULT_VISION_MODEL.to_string()")]
    pub vision_model: String,
    /// Hub id of the text model aligned with `vision_model`
    #[builder(default = "DEFAULT_TEXT_MODEL.to_string()")]
    pub text_model: String,
    /// Prefix prepended to every text before embedding
    #[builder(default = "Some(NOMIC_QUERY_PREFIX.to_string())")]
    pub query_prefix: Option<String>,
    /// Maximum batch size for embedding generation
    #[builder(default = "16")]
    pub batch_size: usize,
    /// Whether to show download progress bars when models are fetched
    #[builder(default = "false")]
    pub show_download_progress: bool,
}

/// Model cache directory: `$SENTINEL_MODEL_DIR` or `./models`.
pub fn default_cache_dir() -> PathBuf {
    std::env::var_os(MODEL_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("models"))
}

impl ExtractorConfig {
    pub fn builder() -> ExtractorConfigBuilder {
        ExtractorConfigBuilder::default()
    }

    /// The default Nomic v1.5 vision/text pair cached under `cache_dir`.
    pub fn nomic_v15<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set or clear the text prefix (builder style)
    pub fn with_query_prefix(self, query_prefix: Option<String>) -> Self {
        Self {
            query_prefix,
            ..self
        }
    }

    /// Human readable name used in logs and error messages.
    pub fn model_name(&self) -> String {
        format!("{} + {}", self.vision_model, self.text_model)
    }

    /// Apply the configured prefix to a text input.
    pub fn prefixed(&self, text: &str) -> String {
        match &self.query_prefix {
            Some(prefix) if !text.starts_with(prefix.as_str()) => format!("{prefix}{text}"),
            _ => text.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be at least 1"));
        }
        if self.vision_model.trim().is_empty() || self.text_model.trim().is_empty() {
            return Err(EmbedError::invalid_config(
                "both a vision model and a text model are required",
            ));
        }
        Ok(())
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfigBuilder::default()
            .build()
            .expect("all ExtractorConfig fields have defaults")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_builder_defaults() {
        let config = ExtractorConfig::builder().build().unwrap();

        assert_eq!(config.vision_model, DEFAULT_VISION_MODEL);
        assert_eq!(config.text_model, DEFAULT_TEXT_MODEL);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.query_prefix.as_deref(), Some(NOMIC_QUERY_PREFIX));
        assert!(!config.show_download_progress);
    }

    #[test]
    fn test_nomic_preset_uses_cache_dir() {
        let temp_dir = tempdir().unwrap();
        let config = ExtractorConfig::nomic_v15(temp_dir.path());

        assert_eq!(config.cache_dir, temp_dir.path());
        assert_eq!(config.vision_model, DEFAULT_VISION_MODEL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = ExtractorConfig::default()
            .with_batch_size(4)
            .with_query_prefix(None);

        assert_eq!(config.batch_size, 4);
        assert_eq!(config.prefixed("a dog"), "a dog");
    }

    #[test]
    fn test_prefix_applied_once() {
        let config = ExtractorConfig::default();

        assert_eq!(config.prefixed("a dog"), "search_query: a dog");
        assert_eq!(
            config.prefixed("search_query: a dog"),
            "search_query: a dog"
        );
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = ExtractorConfig::default().with_batch_size(0);
        assert!(matches!(
            config.validate(),
            Err(EmbedError::InvalidConfig { .. })
        ));
    }
}
