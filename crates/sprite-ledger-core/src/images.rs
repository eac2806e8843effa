use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageFormat, ImageReader, RgbaImage};

use crate::error::Result;

/// Decode/resample capability used by the packer.
///
/// Implementations must return an `edge x edge` RGBA image from `load_cell`.
pub trait ImageSource {
    /// Loads the image at `path` normalized to a square of `edge` pixels.
    fn load_cell(&self, path: &Path, edge: u32) -> Result<RgbaImage>;
    /// Pixel size of the image at `path` without normalizing it.
    fn dimensions(&self, path: &Path) -> Result<(u32, u32)>;
}

/// Reads images from disk with the `image` crate and resamples with Lanczos3.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileImageSource;

impl ImageSource for FileImageSource {
    fn load_cell(&self, path: &Path, edge: u32) -> Result<RgbaImage> {
        let rgba = ImageReader::open(path)?
            .with_guessed_format()?
            .decode()?
            .to_rgba8();
        if rgba.dimensions() == (edge, edge) {
            return Ok(rgba);
        }
        Ok(imageops::resize(&rgba, edge, edge, FilterType::Lanczos3))
    }

    fn dimensions(&self, path: &Path) -> Result<(u32, u32)> {
        Ok(image::image_dimensions(path)?)
    }
}

/// Writes a page canvas as PNG.
pub fn save_png(rgba: &RgbaImage, path: &Path) -> Result<()> {
    rgba.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
