//! HuggingFace model downloading functionality

use crate::error::{EmbedError, Result};
use hf_hub::api::tokio::{Api, ApiBuilder, ApiRepo};
use std::io::Write;
use std::path::{Path, PathBuf};

/// The single ONNX graph fastembed loads from a hub repository.
const MODEL_FILE: &str = "onnx/model.onnx";
/// External weights of graphs larger than 2 GB.
const MODEL_DATA_FILE: &str = "onnx/model.onnx_data";

/// Summary of a completed download
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadReport {
    pub model_id: String,
    pub files: Vec<PathBuf>,
}

/// Downloads models from HuggingFace Hub into the local model cache
pub struct ModelDownloader {
    api: Api,
    cache_dir: PathBuf,
}

impl ModelDownloader {
    /// Create a downloader that stores files under `cache_dir`, the same
    /// directory the extractor loads models from.
    pub fn new<P: AsRef<Path>>(cache_dir: P, show_progress: bool) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir.clone())
            .with_progress(show_progress)
            .build()?;
        Ok(Self { api, cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Fetch every runtime file of `model_id` that is not cached yet.
    ///
    /// # Errors
    /// - [`EmbedError::InvalidModelId`] when the id is not `<owner>/<name>`
    /// - network or hub errors (repository not found, authentication, ...)
    /// - file system errors when writing the cache
    pub async fn ensure_model(&self, model_id: &str) -> Result<DownloadReport> {
        validate_model_id(model_id)?;
        tokio::fs::create_dir_all(&self.cache_dir).await?;

        tracing::info!("Downloading model {} into {}", model_id, self.cache_dir.display());
        let repo = self.api.model(model_id.to_string());
        let files = self.download_model_files(&repo, model_id).await?;

        tracing::info!("Model {} downloaded successfully ({} files)", model_id, files.len());
        Ok(DownloadReport {
            model_id: model_id.to_string(),
            files,
        })
    }

    /// Download the model graph and the configs listed by the repository
    async fn download_model_files(&self, repo: &ApiRepo, model_id: &str) -> Result<Vec<PathBuf>> {
        let info = repo.info().await?;
        let wanted: Vec<String> = info
            .siblings
            .into_iter()
            .map(|sibling| sibling.rfilename)
            .filter(|name| is_runtime_file(name))
            .collect();

        if !wanted.iter().any(|name| name == MODEL_FILE) {
            return Err(EmbedError::ModelFileNotFound {
                path: PathBuf::from(model_id).join(MODEL_FILE),
            });
        }

        let mut files = Vec::with_capacity(wanted.len());
        for remote_path in &wanted {
            tracing::debug!("Fetching {}", remote_path);
            files.push(repo.get(remote_path).await?);
        }
        Ok(files)
    }
}

/// Whether a repository file is needed at inference time: the default graph,
/// its external data and the top-level tokenizer/preprocessor configs.
/// Quantized and fp16 variants next to the graph are left on the hub.
fn is_runtime_file(name: &str) -> bool {
    name == MODEL_FILE
        || name == MODEL_DATA_FILE
        || (!name.contains('/') && name.ends_with(".json"))
}

/// Hub ids look like `owner/name`; both parts use `[A-Za-z0-9._-]`.
pub fn validate_model_id(model_id: &str) -> Result<()> {
    let valid_part = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    };
    match model_id.split_once('/') {
        Some((owner, name)) if valid_part(owner) && valid_part(name) => Ok(()),
        _ => Err(EmbedError::InvalidModelId {
            model: model_id.to_string(),
        }),
    }
}

/// Download `model_id` and report the outcome on `out`.
///
/// Failures are reported, not returned: only a broken `out` is an error.
pub async fn download_and_report<W: Write>(
    downloader: &ModelDownloader,
    model_id: &str,
    out: &mut W,
) -> std::io::Result<()> {
    writeln!(out, "Downloading model: {model_id}")?;
    match downloader.ensure_model(model_id).await {
        Ok(report) => {
            writeln!(
                out,
                "Model {model_id} downloaded successfully ({} files).",
                report.files.len()
            )
        }
        Err(e) => {
            tracing::warn!("Download of {} failed: {}", model_id, e);
            writeln!(out, "Could not download model {model_id}. Error: {e}")
        }
    }
}
