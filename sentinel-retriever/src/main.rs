use clap::{Args as ClapArgs, Parser, Subcommand};
use sentinel_embed::{ExtractorConfig, FastEmbedExtractor, FeatureExtractor};
use sentinel_retriever::{
    dataset::FlickrDataset,
    defaults::{
        DEFAULT_COLLECTION_NAME, DEFAULT_MILVUS_DB_NAME, DEFAULT_MILVUS_URI, DEFAULT_TOP_K,
        MILVUS_COLLECTION_NAME_ENV, MILVUS_DB_NAME_ENV, MILVUS_TOKEN_ENV, MILVUS_URI_ENV,
        RetrieverConfig,
    },
    retrieval::{DatasetIndexer, MultimodalRetriever, SearchHit, SearchQuery},
    storage::{VectorStore, milvus::MilvusClient},
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// A CLI tool to index a captioned image dataset into Milvus and search it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    milvus: MilvusArgs,

    /// Directory holding the embedding models
    #[arg(long, env = "SENTINEL_MODEL_DIR", default_value = "models")]
    model_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ClapArgs, Debug)]
struct MilvusArgs {
    /// Milvus endpoint
    #[arg(long, env = MILVUS_URI_ENV, default_value = DEFAULT_MILVUS_URI)]
    uri: String,
    /// Milvus database
    #[arg(long, env = MILVUS_DB_NAME_ENV, default_value = DEFAULT_MILVUS_DB_NAME)]
    db_name: String,
    /// Collection holding the image vectors
    #[arg(long, env = MILVUS_COLLECTION_NAME_ENV, default_value = DEFAULT_COLLECTION_NAME)]
    collection: String,
    /// Bearer token for authenticated deployments
    #[arg(long, env = MILVUS_TOKEN_ENV, hide_env_values = true)]
    token: Option<String>,
}

impl MilvusArgs {
    fn config(&self) -> RetrieverConfig {
        RetrieverConfig {
            db_uri: self.uri.clone(),
            db_name: self.db_name.clone(),
            token: self.token.clone(),
            collection_name: self.collection.clone(),
            ..RetrieverConfig::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show dataset statistics without touching the database
    Inspect {
        /// Dataset root containing captions.txt
        root: PathBuf,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Embed every captioned image and insert it into the collection
    Index {
        /// Dataset root containing captions.txt
        root: PathBuf,
        /// Images embedded per model call
        #[arg(short, long, default_value_t = 16)]
        batch_size: usize,
        /// Drop and recreate the collection first
        #[arg(long)]
        recreate: bool,
    },
    /// Search the collection with a text or an image query
    Search {
        /// Text query
        #[arg(long, conflicts_with = "image", required_unless_present = "image")]
        text: Option<String>,
        /// Image file to use as the query
        #[arg(long)]
        image: Option<PathBuf>,
        /// Maximum number of results
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show collection statistics
    Stats,
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct DatasetStats {
    root: PathBuf,
    images: usize,
    caption_entries: usize,
    uncaptioned: Vec<String>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn load_extractor(model_dir: PathBuf) -> anyhow::Result<Arc<dyn FeatureExtractor>> {
    let config = ExtractorConfig::builder()
        .cache_dir(model_dir)
        .show_download_progress(true)
        .build()?;
    Ok(Arc::new(FastEmbedExtractor::create(config).await?))
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Inspect { root, format } => {
            let dataset = FlickrDataset::open(&root)?;
            let stats = DatasetStats {
                root,
                images: dataset.len(),
                caption_entries: dataset.caption_entries(),
                uncaptioned: dataset.uncaptioned(),
            };

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Summary => {
                    println!("Dataset: {}", stats.root.display());
                    println!("  Images: {}", stats.images);
                    println!("  Captioned file names: {}", stats.caption_entries);
                    println!("  Images without captions: {}", stats.uncaptioned.len());
                    for filename in stats.uncaptioned.iter().take(10) {
                        println!("    {filename}");
                    }
                }
            }
            Ok(())
        }
        Commands::Index {
            root,
            batch_size,
            recreate,
        } => {
            let dataset = FlickrDataset::open(&root)?;
            let extractor = load_extractor(args.model_dir).await?;
            let config = args.milvus.config();
            let store = Arc::new(MilvusClient::from_config(&config)?);

            let indexer = DatasetIndexer::new(extractor, store.clone(), &config.collection_name);
            let stats = indexer.index(&dataset, batch_size, recreate).await?;
            store.close().await?;

            println!(
                "Indexed {} images into {} ({} skipped)",
                stats.indexed, config.collection_name, stats.skipped
            );
            Ok(())
        }
        Commands::Search {
            text,
            image,
            top_k,
            format,
        } => {
            let query = match (text, image) {
                (Some(text), _) => SearchQuery::Text(text),
                (None, Some(path)) => SearchQuery::Image(image::open(&path)?),
                (None, None) => anyhow::bail!("either --text or --image is required"),
            };
            let extractor = load_extractor(args.model_dir).await?;
            let retriever = MultimodalRetriever::connect(extractor, args.milvus.config())?;

            let hits = retriever.search_hits(&query, Some(top_k)).await;
            retriever.close().await?;
            print_hits(&hits?, &format)
        }
        Commands::Stats => {
            let config = args.milvus.config();
            let store = MilvusClient::from_config(&config)?;
            if !store.has_collection(&config.collection_name).await? {
                println!("Collection {} does not exist", config.collection_name);
            } else {
                let rows = store.row_count(&config.collection_name).await?;
                println!("Collection: {}", config.collection_name);
                println!("  Database: {} ({})", config.db_name, config.db_uri);
                println!("  Rows: {rows}");
            }
            store.close().await?;
            Ok(())
        }
    }
}

fn print_hits(hits: &[SearchHit], format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(hits)?),
        OutputFormat::Summary => {
            println!("Found {} hits:", hits.len());
            for (rank, hit) in hits.iter().enumerate() {
                println!(
                    "  {:>2}. {:.4} | {} | {}",
                    rank + 1,
                    hit.similarity,
                    hit.filename,
                    hit.caption
                );
            }
        }
    }
    Ok(())
}
