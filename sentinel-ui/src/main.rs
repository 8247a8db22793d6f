use clap::Parser;
use sentinel_ui::{UI_COLUMNS, UI_TOP_K, UiConfig, run_server};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// SENTINEL multimodal retrieval web UI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Dataset root holding the indexed images
    #[arg(short, long, env = "SENTINEL_DATASET_ROOT", default_value = ".")]
    dataset: PathBuf,

    #[arg(long, env = "SENTINEL_UI_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, env = "SENTINEL_UI_PORT", default_value_t = 8501)]
    port: u16,

    /// Directory holding the embedding models
    #[arg(long, env = "SENTINEL_MODEL_DIR", default_value = "models")]
    model_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();
    run_server(UiConfig {
        host: args.host,
        port: args.port,
        dataset_root: args.dataset,
        model_dir: args.model_dir,
        top_k: UI_TOP_K,
        columns: UI_COLUMNS,
    })
    .await
}
