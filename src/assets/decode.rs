use std::path::Path;

use anyhow::Context as _;

use crate::foundation::core::Canvas;
use crate::foundation::error::{ReelError, ReelResult};

/// An in-memory decoded bitmap.
///
/// Immutable once loaded. Pixel data stays in the decoder's native layout (8/16-bit, luma/rgb,
/// with or without alpha) until [`crate::Rasterizer`] normalises it.
#[derive(Clone, Debug)]
pub struct SourceImage {
    image: image::DynamicImage,
}

impl SourceImage {
    /// Wrap an already decoded image.
    pub fn new(image: image::DynamicImage) -> Self {
        Self { image }
    }

    /// Build from straight-alpha RGBA8 bytes, row-major and tightly packed.
    pub fn from_rgba8(width: u32, height: u32, rgba: Vec<u8>) -> ReelResult<Self> {
        let len = rgba.len();
        let buf = image::RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
            ReelError::validation(format!(
                "rgba8 data of {len} bytes does not fit {width}x{height}"
            ))
        })?;
        Ok(Self::new(image::DynamicImage::ImageRgba8(buf)))
    }

    /// Native width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Native height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Native size, or `None` for a degenerate 0-sized image.
    pub fn native_canvas(&self) -> Option<Canvas> {
        Canvas::new(self.width(), self.height()).ok()
    }

    /// Borrow the decoded image.
    pub fn as_dynamic(&self) -> &image::DynamicImage {
        &self.image
    }
}

impl From<image::DynamicImage> for SourceImage {
    fn from(image: image::DynamicImage) -> Self {
        Self::new(image)
    }
}

/// Capability that turns a file into a [`SourceImage`].
///
/// The encoding core never names a concrete decoder; drivers pick one.
pub trait ImageDecoder: Send + Sync {
    /// Read and decode the image at `path`.
    fn decode_path(&self, path: &Path) -> ReelResult<SourceImage>;
}

/// [`ImageDecoder`] backed by the `image` crate (format sniffed from content, not extension).
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageCrateDecoder;

impl ImageDecoder for ImageCrateDecoder {
    fn decode_path(&self, path: &Path) -> ReelResult<SourceImage> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read image '{}'", path.display()))?;
        let img =
            decode_image(&bytes).with_context(|| format!("decode image '{}'", path.display()))?;
        Ok(img)
    }
}

/// Decode encoded image bytes (PNG, JPEG, ...) into a [`SourceImage`].
pub fn decode_image(bytes: &[u8]) -> ReelResult<SourceImage> {
    let img = image::load_from_memory(bytes).context("decode image from memory")?;
    Ok(SourceImage::new(img))
}

/// Decode every path in order, dropping the ones that fail.
///
/// Failures are logged at `warn` and never abort the batch.
pub fn load_images<D, P>(decoder: &D, paths: &[P]) -> Vec<SourceImage>
where
    D: ImageDecoder + ?Sized,
    P: AsRef<Path>,
{
    paths
        .iter()
        .filter_map(|p| {
            let p = p.as_ref();
            match decoder.decode_path(p) {
                Ok(img) => Some(img),
                Err(e) => {
                    let error = format!("{e:#}");
                    tracing::warn!(path = %p.display(), %error, "dropping unreadable image");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/assets/decode.rs"]
mod tests;
