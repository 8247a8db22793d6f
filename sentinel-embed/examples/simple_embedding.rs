//! Embeds one text and one image with the default Nomic pair and compares them

use image::{DynamicImage, Rgb, RgbImage};
use sentinel_embed::{ExtractorConfig, FastEmbedExtractor, FeatureExtractor, cosine_similarity};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = ExtractorConfig::default().with_batch_size(2);
    println!("Loading {}", config.model_name());
    let extractor = FastEmbedExtractor::create(config).await?;
    println!("Dimension: {}", extractor.embedding_dimension());

    let sky = DynamicImage::ImageRgb8(RgbImage::from_pixel(128, 128, Rgb([90, 160, 235])));
    let image_vector = extractor.embed_image(&sky).await?;

    for text in ["a clear blue sky", "a plate of spaghetti"] {
        let text_vector = extractor.embed_text(text).await?;
        println!(
            "{text:<24} similarity {:.3}",
            cosine_similarity(&image_vector, &text_vector)
        );
    }

    Ok(())
}
