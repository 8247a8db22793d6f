//! Fill a collection from a captioned image dataset.
//!
//! Each captioned image becomes one entity `{embedding, filename, caption}`
//! where `filename` is the path relative to the dataset root and `caption` is
//! the image's longest caption.

use crate::dataset::{DatasetError, FlickrDataset, ImageRecord};
use crate::defaults::DEFAULT_METRIC;
use crate::storage::{Entity, VectorStore};
use anyhow::{Context, Result, bail};
use image::DynamicImage;
use sentinel_embed::FeatureExtractor;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexingStats {
    pub indexed: usize,
    pub skipped: usize,
}

pub struct DatasetIndexer {
    extractor: Arc<dyn FeatureExtractor>,
    store: Arc<dyn VectorStore>,
    collection_name: String,
}

impl DatasetIndexer {
    pub fn new(
        extractor: Arc<dyn FeatureExtractor>,
        store: Arc<dyn VectorStore>,
        collection_name: impl Into<String>,
    ) -> Self {
        Self {
            extractor,
            store,
            collection_name: collection_name.into(),
        }
    }

    /// Embed and insert every captioned image of `dataset`.
    ///
    /// With `recreate`, an existing collection is dropped first. A missing
    /// collection is created with the extractor's dimension.
    pub async fn index(
        &self,
        dataset: &FlickrDataset,
        batch_size: usize,
        recreate: bool,
    ) -> Result<IndexingStats> {
        if batch_size == 0 {
            bail!("batch size must be at least 1");
        }
        self.prepare_collection(recreate).await?;

        info!(
            "Indexing {} images from {} into {}",
            dataset.len(),
            dataset.root().display(),
            self.collection_name
        );

        let mut stats = IndexingStats::default();
        let mut batch: Vec<(ImageRecord, DynamicImage)> = Vec::with_capacity(batch_size);
        for item in dataset {
            let record = match item {
                Ok(record) => record,
                Err(DatasetError::MissingCaptions { filename }) => {
                    warn!("Skipping {}: no captions", filename);
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match load_image(&record).await {
                Ok(image) => batch.push((record, image)),
                Err(e) => {
                    warn!("Skipping {}: {:#}", record.relative_path, e);
                    stats.skipped += 1;
                    continue;
                }
            }

            if batch.len() == batch_size {
                stats.indexed += self.flush(std::mem::take(&mut batch)).await?;
            }
        }
        if !batch.is_empty() {
            stats.indexed += self.flush(batch).await?;
        }

        info!(
            "Indexed {} images into {} ({} skipped)",
            stats.indexed, self.collection_name, stats.skipped
        );
        Ok(stats)
    }

    async fn prepare_collection(&self, recreate: bool) -> Result<()> {
        let exists = self.store.has_collection(&self.collection_name).await?;
        if exists && recreate {
            self.store.drop_collection(&self.collection_name).await?;
        }
        if !exists || recreate {
            self.store
                .create_collection(
                    &self.collection_name,
                    self.extractor.embedding_dimension(),
                    DEFAULT_METRIC,
                )
                .await?;
        }
        Ok(())
    }

    async fn flush(&self, batch: Vec<(ImageRecord, DynamicImage)>) -> Result<usize> {
        let (records, images): (Vec<_>, Vec<_>) = batch.into_iter().unzip();
        let embeddings = self.extractor.embed_images(&images).await?;
        if embeddings.len() != records.len() {
            bail!(
                "extractor returned {} embeddings for {} images",
                embeddings.len(),
                records.len()
            );
        }

        let entities = records
            .into_iter()
            .zip(embeddings.embeddings)
            .map(|(record, embedding)| Entity {
                embedding,
                filename: record.relative_path,
                caption: record.best_caption,
            })
            .collect::<Vec<_>>();
        debug!("Inserting batch of {}", entities.len());
        self.store.insert(&self.collection_name, entities).await
    }
}

async fn load_image(record: &ImageRecord) -> Result<DynamicImage> {
    let path = record.image_path.clone();
    tokio::task::spawn_blocking(move || {
        image::open(&path).with_context(|| format!("cannot read {}", path.display()))
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::Metric;
    use crate::storage::{RawMatch, SearchRequest};
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use sentinel_embed::EmbeddingResult;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct WidthExtractor;

    #[async_trait]
    impl FeatureExtractor for WidthExtractor {
        async fn embed_images(
            &self,
            images: &[DynamicImage],
        ) -> sentinel_embed::Result<EmbeddingResult> {
            Ok(EmbeddingResult::new(
                images
                    .iter()
                    .map(|i| vec![i.width() as f32, i.height() as f32, 0.0])
                    .collect(),
            ))
        }

        async fn embed_texts(&self, texts: &[String]) -> sentinel_embed::Result<EmbeddingResult> {
            Ok(EmbeddingResult::new(vec![vec![0.0; 3]; texts.len()]))
        }

        fn embedding_dimension(&self) -> usize {
            3
        }

        fn provider_name(&self) -> &str {
            "width"
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        exists: Mutex<bool>,
        calls: Mutex<Vec<String>>,
        rows: Mutex<Vec<Entity>>,
    }

    #[async_trait]
    impl VectorStore for MemoryStore {
        async fn search(&self, _: SearchRequest) -> anyhow::Result<Vec<RawMatch>> {
            Ok(Vec::new())
        }

        async fn has_collection(&self, _: &str) -> anyhow::Result<bool> {
            Ok(*self.exists.lock().unwrap())
        }

        async fn create_collection(
            &self,
            name: &str,
            dimension: usize,
            metric: Metric,
        ) -> anyhow::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("create {name} {dimension} {metric}"));
            *self.exists.lock().unwrap() = true;
            Ok(())
        }

        async fn drop_collection(&self, name: &str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("drop {name}"));
            self.rows.lock().unwrap().clear();
            *self.exists.lock().unwrap() = false;
            Ok(())
        }

        async fn insert(&self, _: &str, entities: Vec<Entity>) -> anyhow::Result<usize> {
            let n = entities.len();
            self.calls.lock().unwrap().push(format!("insert {n}"));
            self.rows.lock().unwrap().extend(entities);
            Ok(n)
        }

        async fn row_count(&self, _: &str) -> anyhow::Result<u64> {
            Ok(self.rows.lock().unwrap().len() as u64)
        }

        async fn close(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn write_jpeg(path: &std::path::Path, width: u32, height: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(width, height, Rgb([200, 10, 10]))
            .save(path)
            .unwrap();
    }

    /// a.jpg (2 captions), b.jpg (1 caption), c.jpg (none), d.jpg (not a JPEG)
    fn dataset_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_jpeg(&dir.path().join("images/a.jpg"), 4, 2);
        write_jpeg(&dir.path().join("images/b.jpg"), 6, 3);
        write_jpeg(&dir.path().join("images/c.jpg"), 8, 4);
        fs::write(dir.path().join("images/d.jpg"), b"not a jpeg").unwrap();
        fs::write(
            dir.path().join("captions.txt"),
            "a.jpg,a dog\na.jpg,a brown dog runs\nb.jpg,a red square\nd.jpg,broken\n",
        )
        .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_index_inserts_captioned_images() {
        let dir = dataset_dir();
        let dataset = FlickrDataset::open(dir.path()).unwrap();
        let store = Arc::new(MemoryStore::default());
        let indexer = DatasetIndexer::new(Arc::new(WidthExtractor), store.clone(), "test");

        let stats = indexer.index(&dataset, 8, false).await.unwrap();

        assert_eq!(stats, IndexingStats { indexed: 2, skipped: 2 });
        let rows = store.rows.lock().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].filename, "images/a.jpg");
        assert_eq!(rows[0].caption, "a brown dog runs");
        assert_eq!(rows[0].embedding, vec![4.0, 2.0, 0.0]);
        assert_eq!(rows[1].filename, "images/b.jpg");
        assert_eq!(rows[1].caption, "a red square");
    }

    #[tokio::test]
    async fn test_index_batches_and_creates_collection() {
        let dir = dataset_dir();
        let dataset = FlickrDataset::open(dir.path()).unwrap();
        let store = Arc::new(MemoryStore::default());
        let indexer = DatasetIndexer::new(Arc::new(WidthExtractor), store.clone(), "test");

        indexer.index(&dataset, 1, false).await.unwrap();

        let calls = store.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["create test 3 COSINE", "insert 1", "insert 1"]);
    }

    #[tokio::test]
    async fn test_recreate_drops_existing_collection() {
        let dir = dataset_dir();
        let dataset = FlickrDataset::open(dir.path()).unwrap();
        let store = Arc::new(MemoryStore::default());
        let indexer = DatasetIndexer::new(Arc::new(WidthExtractor), store.clone(), "test");

        indexer.index(&dataset, 8, false).await.unwrap();
        indexer.index(&dataset, 8, true).await.unwrap();

        assert_eq!(store.row_count("test").await.unwrap(), 2);
        let calls = store.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "create test 3 COSINE",
                "insert 2",
                "drop test",
                "create test 3 COSINE",
                "insert 2"
            ]
        );
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_rejected() {
        let dir = dataset_dir();
        let dataset = FlickrDataset::open(dir.path()).unwrap();
        let indexer = DatasetIndexer::new(
            Arc::new(WidthExtractor),
            Arc::new(MemoryStore::default()),
            "test",
        );

        assert!(indexer.index(&dataset, 0, false).await.is_err());
    }
}
