//! Captioned image dataset loader (Flickr8k/Flickr30k layout).
//!
//! A dataset root holds JPEG files anywhere below it plus a `captions.txt`
//! file with one `filename,caption` row per caption:
//!
//! ```text
//! root/
//! ├── captions.txt
//! └── images/
//!     ├── 1000268201_693b08cb0e.jpg
//!     └── ...
//! ```
//!
//! Every row is data; a Flickr8k `image,caption` header simply becomes the
//! captions of a file called `image`, which never matches a real JPEG.
//!
//! Iteration is restartable: [`FlickrDataset::iter`] returns a fresh
//! iterator over all images every time it is called.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the caption file expected at the dataset root.
pub const CAPTIONS_FILE: &str = "captions.txt";

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

pub type Result<T> = std::result::Result<T, DatasetError>;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Dataset root not found: {path}")]
    RootNotFound { path: PathBuf },

    #[error("Caption file not found: {path}")]
    CaptionFileMissing { path: PathBuf },

    #[error("Malformed caption file {path} at line {line}: {message}")]
    MalformedCaptions {
        path: PathBuf,
        line: u64,
        message: String,
    },

    /// An image exists on disk but no caption row names it
    #[error("No captions found for image {filename}")]
    MissingCaptions { filename: String },

    #[error("Failed to walk dataset directory: {source}")]
    Walk {
        #[from]
        source: ignore::Error,
    },
}

/// One image together with its captions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecord {
    /// Path of the image file (root joined with the relative path)
    pub image_path: PathBuf,
    /// Path relative to the dataset root, `/`-separated
    pub relative_path: String,
    pub captions: Vec<String>,
    /// Longest caption by character count
    pub best_caption: String,
}

impl fmt::Display for ImageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.image_path.display(), self.captions)
    }
}

/// Longest caption by character count; the first one wins ties.
pub fn best_caption(captions: &[String]) -> Option<&str> {
    let mut best: Option<&str> = None;
    for caption in captions {
        match best {
            Some(current) if caption.chars().count() <= current.chars().count() => {}
            _ => best = Some(caption),
        }
    }
    best
}

/// Captioned image dataset rooted at a directory
#[derive(Debug, Clone)]
pub struct FlickrDataset {
    root: PathBuf,
    image_paths: Vec<PathBuf>,
    captions: HashMap<String, Vec<String>>,
}

impl FlickrDataset {
    /// Enumerate images under `root` and parse `root/captions.txt`.
    ///
    /// # Errors
    /// - [`DatasetError::RootNotFound`] if `root` is not a directory
    /// - [`DatasetError::CaptionFileMissing`] if the caption file is absent
    /// - [`DatasetError::MalformedCaptions`] for invalid CSV or a row with
    ///   fewer than two columns
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(DatasetError::RootNotFound { path: root });
        }

        let image_paths = find_images(&root)?;
        let captions = load_captions(&root.join(CAPTIONS_FILE))?;

        info!(
            "Loaded dataset {}: {} images, {} captioned filenames",
            root.display(),
            image_paths.len(),
            captions.len()
        );
        Ok(Self {
            root,
            image_paths,
            captions,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of images found under the root
    pub fn len(&self) -> usize {
        self.image_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_paths.is_empty()
    }

    /// Captions recorded for a file name; empty when there are none.
    pub fn captions_for(&self, filename: &str) -> &[String] {
        self.captions
            .get(filename)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of distinct file names in the caption file
    pub fn caption_entries(&self) -> usize {
        self.captions.len()
    }

    /// Image file names that have no caption row.
    pub fn uncaptioned(&self) -> Vec<String> {
        self.image_paths
            .iter()
            .filter_map(|path| file_name(path))
            .filter(|name| self.captions_for(name).is_empty())
            .collect()
    }

    /// A fresh iterator over every image, in enumeration order.
    pub fn iter(&self) -> DatasetIter<'_> {
        DatasetIter {
            dataset: self,
            index: 0,
        }
    }

    fn record(&self, image_path: &Path) -> Result<ImageRecord> {
        let filename = file_name(image_path).unwrap_or_default();
        let captions = self.captions_for(&filename).to_vec();
        let best = best_caption(&captions)
            .map(str::to_string)
            .ok_or(DatasetError::MissingCaptions { filename })?;

        Ok(ImageRecord {
            image_path: image_path.to_path_buf(),
            relative_path: relative_path(&self.root, image_path),
            captions,
            best_caption: best,
        })
    }
}

impl<'a> IntoIterator for &'a FlickrDataset {
    type Item = Result<ImageRecord>;
    type IntoIter = DatasetIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Single pass over a dataset. Yields exactly `len()` items; an image
/// without captions yields [`DatasetError::MissingCaptions`] in its slot.
pub struct DatasetIter<'a> {
    dataset: &'a FlickrDataset,
    index: usize,
}

impl Iterator for DatasetIter<'_> {
    type Item = Result<ImageRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.dataset.image_paths.get(self.index)?;
        self.index += 1;
        Some(self.dataset.record(path))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.dataset.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for DatasetIter<'_> {}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// All JPEG files below `root`, sorted by path.
fn find_images(root: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .build()
    {
        let entry = entry?;
        let is_file = entry.file_type().is_some_and(|ft| ft.is_file());
        if is_file && is_image(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    debug!("Found {} images under {}", paths.len(), root.display());
    Ok(paths)
}

/// Parse `filename,caption` rows into filename -> captions (file order).
fn load_captions(path: &Path) -> Result<HashMap<String, Vec<String>>> {
    if !path.is_file() {
        return Err(DatasetError::CaptionFileMissing {
            path: path.to_path_buf(),
        });
    }

    let malformed = |line: u64, message: String| DatasetError::MalformedCaptions {
        path: path.to_path_buf(),
        line,
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| malformed(0, e.to_string()))?;

    let mut captions: HashMap<String, Vec<String>> = HashMap::new();
    for record in reader.records() {
        let record = record.map_err(|e| {
            let line = e.position().map(|p| p.line()).unwrap_or(0);
            malformed(line, e.to_string())
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        match (record.get(0), record.get(1)) {
            (Some(filename), Some(caption)) => captions
                .entry(filename.to_string())
                .or_default()
                .push(caption.to_string()),
            _ => {
                return Err(malformed(
                    line,
                    format!("expected 2 columns, found {}", record.len()),
                ));
            }
        }
    }

    Ok(captions)
}
