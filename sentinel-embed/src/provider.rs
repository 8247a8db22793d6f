//! Feature extractor implementations

use crate::config::ExtractorConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{ImageEmbedding, ImageInitOptions, TextEmbedding, TextInitOptions};
use fnv::FnvHasher;
use image::{DynamicImage, ImageFormat};
use std::collections::HashMap;
use std::hash::Hasher;
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Result of embedding generation
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input
    pub embeddings: Vec<Vec<f32>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result; the dimension is inferred from the
    /// first vector and is 0 for an empty result.
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// Take the single embedding out of a one-input result.
    pub fn into_single(self) -> Result<Vec<f32>> {
        self.embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_config("No embedding generated for input"))
    }
}

/// Capability shared by every multimodal embedding backend: images and texts
/// are mapped into the same vector space so they can be compared by cosine
/// similarity.
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    /// Generate one embedding per image
    async fn embed_images(&self, images: &[DynamicImage]) -> Result<EmbeddingResult>;

    /// Generate one embedding per text
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Embed a single image
    async fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        self.embed_images(std::slice::from_ref(image))
            .await?
            .into_single()
    }

    /// Embed a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_texts(&[text.to_string()]).await?.into_single()
    }

    /// Dimension of the vectors produced by this extractor
    fn embedding_dimension(&self) -> usize;

    /// Name/identifier of this extractor
    fn provider_name(&self) -> &str;
}

/// Loaded vision and text sessions plus their shared dimension
#[derive(Clone)]
struct LoadedModels {
    vision: Arc<Mutex<ImageEmbedding>>,
    text: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

/// Global cache for loaded model pairs to avoid reloading
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, LoadedModels>>> = OnceLock::new();

fn model_cache() -> MutexGuard<'static, HashMap<String, LoadedModels>> {
    MODEL_CACHE
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// fastembed-based extractor running ONNX vision and text models locally
#[derive(Clone)]
pub struct FastEmbedExtractor {
    config: ExtractorConfig,
    models: Option<LoadedModels>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedExtractor")
            .field("config", &self.config)
            .field("loaded", &self.models.is_some())
            .field("dimension", &self.dimension)
            .finish()
    }
}

/// Look up a fastembed vision model by its hub id.
pub fn resolve_vision_model(code: &str) -> Result<(fastembed::ImageEmbeddingModel, usize)> {
    ImageEmbedding::list_supported_models()
        .into_iter()
        .find(|info| info.model_code.eq_ignore_ascii_case(code))
        .map(|info| (info.model, info.dim))
        .ok_or_else(|| EmbedError::unsupported_model(code))
}

/// Look up a fastembed text model by its hub id.
pub fn resolve_text_model(code: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    TextEmbedding::list_supported_models()
        .into_iter()
        .find(|info| info.model_code.eq_ignore_ascii_case(code))
        .map(|info| (info.model, info.dim))
        .ok_or_else(|| EmbedError::unsupported_model(code))
}

impl FastEmbedExtractor {
    /// Creates an extractor that still has to be initialized.
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
            models: None,
            dimension: crate::VECTOR_FIELD_DIM,
        }
    }

    /// Creates and initializes an extractor in one step.
    pub async fn create(config: ExtractorConfig) -> Result<Self> {
        let mut extractor = Self::new(config);
        extractor.initialize().await?;
        Ok(extractor)
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Downloads (if needed) and loads both models, reusing a cached pair
    /// when the same configuration was loaded before.
    pub async fn initialize(&mut self) -> Result<()> {
        self.config.validate()?;
        tracing::info!("Initializing extractor for {}", self.config.model_name());

        let (vision_model, vision_dim) = resolve_vision_model(&self.config.vision_model)?;
        let (text_model, text_dim) = resolve_text_model(&self.config.text_model)?;
        if vision_dim != text_dim {
            return Err(EmbedError::invalid_config(format!(
                "{} produces {vision_dim}-d vectors but {} produces {text_dim}-d vectors",
                self.config.vision_model, self.config.text_model
            )));
        }

        let cache_key = self.create_cache_key();
        if let Some(cached) = model_cache().get(&cache_key).cloned() {
            tracing::info!("Using cached models for {}", self.config.model_name());
            self.dimension = cached.dimension;
            self.models = Some(cached);
            return Ok(());
        }

        let config = self.config.clone();
        let (vision, text) = tokio::task::spawn_blocking(
            move || -> Result<(ImageEmbedding, TextEmbedding)> {
                tracing::info!(
                    "Loading models into {} (ONNX Runtime default execution provider)",
                    config.cache_dir.display()
                );

                let vision = ImageEmbedding::try_new(
                    ImageInitOptions::new(vision_model)
                        .with_cache_dir(config.cache_dir.clone())
                        .with_show_download_progress(config.show_download_progress),
                )
                .map_err(|e| EmbedError::model_load(&config.vision_model, e))?;

                let text = TextEmbedding::try_new(
                    TextInitOptions::new(text_model)
                        .with_cache_dir(config.cache_dir.clone())
                        .with_show_download_progress(config.show_download_progress),
                )
                .map_err(|e| EmbedError::model_load(&config.text_model, e))?;

                Ok((vision, text))
            },
        )
        .await??;

        let loaded = LoadedModels {
            vision: Arc::new(Mutex::new(vision)),
            text: Arc::new(Mutex::new(text)),
            dimension: vision_dim,
        };
        model_cache().insert(cache_key, loaded.clone());

        tracing::info!(
            "Models loaded successfully. Dimension: {}",
            loaded.dimension
        );
        self.dimension = loaded.dimension;
        self.models = Some(loaded);
        Ok(())
    }

    /// Create a cache key based on the model configuration
    fn create_cache_key(&self) -> String {
        let config_json = serde_json::to_string(&self.config).unwrap_or_default();

        let mut hasher = FnvHasher::default();
        hasher.write(b"v1:");
        hasher.write(config_json.as_bytes());

        format!("v1:{:x}", hasher.finish())
    }

    fn loaded(&self) -> Result<&LoadedModels> {
        self.models.as_ref().ok_or_else(|| {
            EmbedError::invalid_config("Models not initialized. Call initialize() first.")
        })
    }

    /// Clears the global model cache.
    pub fn clear_cache() {
        model_cache().clear();
        tracing::info!("Model cache cleared");
    }

    /// Returns the number of cached model pairs.
    pub fn cache_size() -> usize {
        model_cache().len()
    }

    fn check_dimensions(&self, embeddings: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
        embeddings
            .into_iter()
            .map(|embedding| {
                if embedding.len() != self.dimension {
                    return Err(EmbedError::invalid_config(format!(
                        "expected dimension {}, got {}",
                        self.dimension,
                        embedding.len()
                    )));
                }
                Ok(l2_normalize(embedding))
            })
            .collect()
    }
}

/// Scale a vector to unit length; zero vectors are returned unchanged.
pub fn l2_normalize(mut embedding: Vec<f32>) -> Vec<f32> {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut embedding {
            *value /= norm;
        }
    }
    embedding
}

/// Cosine similarity of two vectors of equal length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

#[async_trait]
impl FeatureExtractor for FastEmbedExtractor {
    async fn embed_images(&self, images: &[DynamicImage]) -> Result<EmbeddingResult> {
        if images.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }
        let models = self.loaded()?;

        tracing::debug!("Generating embeddings for {} images", images.len());
        let mut all_embeddings = Vec::with_capacity(images.len());

        for chunk in images.chunks(self.config.batch_size) {
            let chunk = chunk.to_vec();
            let vision = Arc::clone(&models.vision);

            let batch = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let encoded = chunk
                    .iter()
                    .map(encode_png)
                    .collect::<Result<Vec<_>>>()?;
                let slices: Vec<&[u8]> = encoded.iter().map(Vec::as_slice).collect();

                let mut model = lock(&vision);
                model
                    .embed_bytes(&slices, None)
                    .map_err(EmbedError::embedding_gen)
            })
            .await??;

            all_embeddings.extend(self.check_dimensions(batch)?);
        }

        Ok(EmbeddingResult::new(all_embeddings))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }
        let models = self.loaded()?;

        tracing::debug!("Generating embeddings for {} texts", texts.len());
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.config.batch_size) {
            let chunk: Vec<String> = chunk.iter().map(|t| self.config.prefixed(t)).collect();
            let text = Arc::clone(&models.text);

            let batch = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut model = lock(&text);
                model
                    .embed(chunk, None)
                    .map_err(EmbedError::embedding_gen)
            })
            .await??;

            all_embeddings.extend(self.check_dimensions(batch)?);
        }

        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_TEXT_MODEL, DEFAULT_VISION_MODEL};
    use image::{Rgb, RgbImage};

    #[test]
    fn test_embedding_result() {
        let result = EmbeddingResult::new(vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]]);

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 3);
        assert!(!result.is_empty());
        assert!(EmbeddingResult::new(vec![]).into_single().is_err());
    }

    #[test]
    fn test_default_models_resolve_to_768() {
        let (_, vision_dim) = resolve_vision_model(DEFAULT_VISION_MODEL).unwrap();
        let (_, text_dim) = resolve_text_model(DEFAULT_TEXT_MODEL).unwrap();

        assert_eq!(vision_dim, 768);
        assert_eq!(text_dim, 768);
    }

    #[test]
    fn test_unknown_model_is_rejected() {
        let err = resolve_vision_model("jinaai/does-not-exist").unwrap_err();
        assert!(matches!(err, EmbedError::UnsupportedModel { .. }));
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_encode_png_roundtrips_dimensions() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(7, 5, Rgb([10, 20, 30])));
        let bytes = encode_png(&image).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();

        assert_eq!((decoded.width(), decoded.height()), (7, 5));
    }

    #[tokio::test]
    async fn test_uninitialized_extractor_errors() {
        let extractor = FastEmbedExtractor::new(ExtractorConfig::default());

        assert_eq!(extractor.provider_name(), "fastembed");
        assert_eq!(extractor.embedding_dimension(), 768);
        let err = extractor.embed_text("a dog").await.unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));
        // Empty input short-circuits before the model is needed
        assert!(extractor.embed_texts(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_initialize_rejects_mismatched_pair() {
        let config = ExtractorConfig::builder()
            .text_model("sentence-transformers/all-MiniLM-L6-v2")
            .build()
            .unwrap();
        let err = FastEmbedExtractor::create(config).await.unwrap_err();

        assert!(matches!(err, EmbedError::InvalidConfig { .. }));
    }

    #[test]
    fn test_cache_key_generation() {
        let key1 = FastEmbedExtractor::new(ExtractorConfig::default()).create_cache_key();
        let key2 = FastEmbedExtractor::new(ExtractorConfig::default()).create_cache_key();
        let key3 = FastEmbedExtractor::new(ExtractorConfig::default().with_batch_size(2))
            .create_cache_key();

        assert_eq!(key1, key2, "Same config should produce same cache key");
        assert!(key1.starts_with("v1:"));
        assert_ne!(key1, key3);
    }

    #[tokio::test]
    // Downloads the real Nomic models: cargo test -p sentinel-embed -- --ignored
    #[ignore]
    async fn test_nomic_image_and_text_share_space() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let extractor =
            FastEmbedExtractor::create(ExtractorConfig::nomic_v15(temp_dir.path())).await?;
        assert_eq!(FastEmbedExtractor::cache_size(), 1);

        let red = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([220, 10, 10])));
        let image_embedding = extractor.embed_image(&red).await?;
        let texts = extractor
            .embed_texts(&["a red square".to_string(), "a tax form".to_string()])
            .await?;

        assert_eq!(image_embedding.len(), 768);
        assert_eq!(texts.dimension, 768);
        let related = cosine_similarity(&image_embedding, &texts.embeddings[0]);
        let unrelated = cosine_similarity(&image_embedding, &texts.embeddings[1]);
        assert!(related > unrelated, "{related} <= {unrelated}");

        FastEmbedExtractor::clear_cache();
        Ok(())
    }
}
