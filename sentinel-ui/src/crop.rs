//! Query image preparation: resize to the sidebar width, then crop the
//! region of interest.

use image::DynamicImage;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::error::UiError;

/// Width (px) uploaded images are resized to before cropping.
pub const QUERY_IMAGE_WIDTH: u32 = 370;
/// Tallest accepted resized image, in multiples of [`QUERY_IMAGE_WIDTH`].
pub const MAX_HEIGHT_TO_WIDTH: u32 = 10;

/// Margin of the default crop box from the top-left corner.
const DEFAULT_BOX_OFFSET: u32 = 10;
/// Total width/height the default box gives up relative to the image.
const DEFAULT_BOX_SHRINK: u32 = 30;

/// Region of interest in resized-image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl CropBox {
    /// Box offered before the user adjusts it: `(10, 10, w - 30, h - 30)`.
    pub fn default_for(width: u32, height: u32) -> Self {
        Self {
            left: DEFAULT_BOX_OFFSET,
            top: DEFAULT_BOX_OFFSET,
            width: width.saturating_sub(DEFAULT_BOX_SHRINK),
            height: height.saturating_sub(DEFAULT_BOX_SHRINK),
        }
    }

    /// Shrink the box so it lies inside a `width` x `height` image.
    pub fn clamp_to(self, width: u32, height: u32) -> Self {
        let left = self.left.min(width);
        let top = self.top.min(height);
        Self {
            left,
            top,
            width: self.width.min(width - left),
            height: self.height.min(height - top),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Height of `image` once resized to `target_width` (truncated, at least 1).
pub fn scaled_height(image: &DynamicImage, target_width: u32) -> u32 {
    let height = (target_width as f64 / image.width() as f64 * image.height() as f64) as u32;
    height.max(1)
}

/// Resize to `target_width`, keeping the aspect ratio (height truncated).
pub fn resize_to_width(image: &DynamicImage, target_width: u32) -> DynamicImage {
    if image.width() == 0 {
        return image.clone();
    }
    let height = scaled_height(image, target_width);
    image.resize_exact(target_width, height, FilterType::Triangle)
}

/// Resize an uploaded image to [`QUERY_IMAGE_WIDTH`] and crop it with `crop`
/// (clamped to the image) or the default box.
///
/// Images taller than [`MAX_HEIGHT_TO_WIDTH`] times their width are rejected
/// before the resize buffer is allocated.
pub fn prepare_query_image(
    image: &DynamicImage,
    crop: Option<CropBox>,
) -> Result<DynamicImage, UiError> {
    if image.width() > 0 {
        let height = scaled_height(image, QUERY_IMAGE_WIDTH);
        if height > QUERY_IMAGE_WIDTH * MAX_HEIGHT_TO_WIDTH {
            return Err(UiError::bad_request(format!(
                "Query image is too tall: {}x{} would resize to {}x{}",
                image.width(),
                image.height(),
                QUERY_IMAGE_WIDTH,
                height
            )));
        }
    }

    let resized = resize_to_width(image, QUERY_IMAGE_WIDTH);
    let (width, height) = (resized.width(), resized.height());
    let region = crop
        .unwrap_or_else(|| CropBox::default_for(width, height))
        .clamp_to(width, height);
    Ok(resized.crop_imm(region.left, region.top, region.width, region.height))
}
