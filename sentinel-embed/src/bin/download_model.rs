use clap::Parser;
use sentinel_embed::config::default_cache_dir;
use sentinel_embed::{ModelDownloader, download_and_report};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Download a pretrained model into the local model cache.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The name of the model to download (e.g. nomic-ai/nomic-embed-vision-v1.5)
    model_name: String,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let cache_dir: PathBuf = default_cache_dir();

    let downloader = match ModelDownloader::new(&cache_dir, true) {
        Ok(downloader) => downloader,
        Err(e) => {
            println!("Could not download model {}. Error: {e}", args.model_name);
            return;
        }
    };

    let mut stdout = std::io::stdout();
    if let Err(e) = download_and_report(&downloader, &args.model_name, &mut stdout).await {
        eprintln!("Error: {e}");
    }
}
