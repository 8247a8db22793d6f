//! Dataset → indexer → retriever with an in-memory cosine store.

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use sentinel_embed::{EmbeddingResult, FeatureExtractor, cosine_similarity, l2_normalize};
use sentinel_retriever::dataset::FlickrDataset;
use sentinel_retriever::defaults::{Metric, RetrieverConfig};
use sentinel_retriever::retrieval::{DatasetIndexer, MultimodalRetriever, SearchQuery};
use sentinel_retriever::storage::{Entity, RawMatch, SearchRequest, VectorStore};
use serde_json::{Map, Value, json};
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Embeds images by mean colour and texts by colour words
struct ColourExtractor;

fn colour_of(image: &DynamicImage) -> Vec<f32> {
    let rgb = image.to_rgb8();
    let n = (rgb.width() * rgb.height()).max(1) as f32;
    let mut sum = [0f32; 3];
    for pixel in rgb.pixels() {
        for (channel, value) in sum.iter_mut().zip(pixel.0) {
            *channel += value as f32;
        }
    }
    l2_normalize(sum.map(|c| c / n).to_vec())
}

#[async_trait]
impl FeatureExtractor for ColourExtractor {
    async fn embed_images(
        &self,
        images: &[DynamicImage],
    ) -> sentinel_embed::Result<EmbeddingResult> {
        Ok(EmbeddingResult::new(images.iter().map(colour_of).collect()))
    }

    async fn embed_texts(&self, texts: &[String]) -> sentinel_embed::Result<EmbeddingResult> {
        let vectors = texts
            .iter()
            .map(|text| {
                l2_normalize(vec![
                    text.contains("red") as u8 as f32,
                    text.contains("green") as u8 as f32,
                    text.contains("blue") as u8 as f32,
                ])
            })
            .collect();
        Ok(EmbeddingResult::new(vectors))
    }

    fn embedding_dimension(&self) -> usize {
        3
    }

    fn provider_name(&self) -> &str {
        "colour"
    }
}

#[derive(Default)]
struct CosineStore {
    rows: Mutex<Vec<Entity>>,
}

#[async_trait]
impl VectorStore for CosineStore {
    async fn search(&self, request: SearchRequest) -> anyhow::Result<Vec<RawMatch>> {
        let rows = self.rows.lock().unwrap();
        let mut scored: Vec<(f32, &Entity)> = rows
            .iter()
            .map(|row| (cosine_similarity(&request.vector, &row.embedding), row))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(request.limit)
            .map(|(distance, row)| {
                let mut entity = Map::new();
                for field in &request.output_fields {
                    match field.as_str() {
                        "filename" => entity.insert(field.clone(), json!(row.filename)),
                        "caption" => entity.insert(field.clone(), json!(row.caption)),
                        _ => None,
                    };
                }
                RawMatch {
                    id: None,
                    distance,
                    entity,
                }
            })
            .collect())
    }

    async fn has_collection(&self, _: &str) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn create_collection(&self, _: &str, _: usize, _: Metric) -> anyhow::Result<()> {
        Ok(())
    }

    async fn drop_collection(&self, _: &str) -> anyhow::Result<()> {
        self.rows.lock().unwrap().clear();
        Ok(())
    }

    async fn insert(&self, _: &str, entities: Vec<Entity>) -> anyhow::Result<usize> {
        let n = entities.len();
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

fn colour_dataset() -> TempDir {
    let dir = TempDir::new().unwrap();
    let images = dir.path().join("Images");
    fs::create_dir_all(&images).unwrap();
    for (name, colour) in [
        ("red.jpg", [250, 5, 5]),
        ("green.jpg", [5, 250, 5]),
        ("blue.jpg", [5, 5, 250]),
    ] {
        RgbImage::from_pixel(16, 16, Rgb(colour))
            .save(images.join(name))
            .unwrap();
    }
    fs::write(
        dir.path().join("captions.txt"),
        "image,caption\n\
         red.jpg,a red square\n\
         red.jpg,a bright red square on nothing\n\
         green.jpg,a green square\n\
         blue.jpg,a blue square\n",
    )
    .unwrap();
    dir
}

async fn indexed_retriever(dir: &TempDir) -> (MultimodalRetriever, Arc<CosineStore>) {
    let dataset = FlickrDataset::open(dir.path()).unwrap();
    let extractor: Arc<dyn FeatureExtractor> = Arc::new(ColourExtractor);
    let store = Arc::new(CosineStore::default());
    let config = RetrieverConfig::default();

    let stats = DatasetIndexer::new(extractor.clone(), store.clone(), &config.collection_name)
        .index(&dataset, 2, false)
        .await
        .unwrap();
    assert_eq!(stats.indexed, 3);
    assert_eq!(stats.skipped, 0);

    (MultimodalRetriever::new(extractor, store.clone(), config), store)
}

#[tokio::test]
async fn test_text_to_image_finds_matching_colour() {
    let dir = colour_dataset();
    let (retriever, _) = indexed_retriever(&dir).await;

    let hits = retriever
        .search_json(&Value::String("something blue".to_string()), Some(1))
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].filename, "Images/blue.jpg");
    assert_eq!(hits[0].caption, "a blue square");
}

#[tokio::test]
async fn test_image_to_image_ranks_self_first() {
    let dir = colour_dataset();
    let (retriever, _) = indexed_retriever(&dir).await;

    let query = image::open(dir.path().join("Images/red.jpg")).unwrap();
    let hits = retriever
        .search_hits(&SearchQuery::Image(query), None)
        .await
        .unwrap();

    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].filename, "Images/red.jpg");
    assert_eq!(hits[0].caption, "a bright red square on nothing");
    assert!(hits[0].similarity > 0.99);
    assert!(hits[0].similarity >= hits[1].similarity);
    assert!(hits[1].similarity >= hits[2].similarity);
}

#[tokio::test]
async fn test_invalid_query_leaves_results_untouched() {
    let dir = colour_dataset();
    let (retriever, store) = indexed_retriever(&dir).await;

    let err = retriever.search_json(&json!(12), None).await.unwrap_err();
    assert!(err.is_invalid_query());
    assert_eq!(store.row_count("any").await.unwrap(), 3);
}
