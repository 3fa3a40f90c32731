use std::borrow::Cow;

use image::imageops::FilterType;

use crate::assets::decode::SourceImage;
use crate::foundation::core::{Canvas, PixelFormat};
use crate::foundation::error::{RasterizeError, ReelError, ReelResult};
use crate::foundation::math::over_opaque;

/// Raw, uncompressed frame in a fixed [`PixelFormat`].
///
/// Rows are `stride` bytes apart; bytes past `width * bytes_per_pixel` in a row are padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap existing bytes, checking that the layout is consistent.
    pub fn from_raw(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> ReelResult<Self> {
        format.validate()?;
        let row = (width as usize) * format.bytes_per_pixel();
        if width == 0 || height == 0 {
            return Err(ReelError::validation("pixel buffer must be at least 1x1"));
        }
        if stride < row {
            return Err(ReelError::validation(format!(
                "stride {stride} is smaller than row size {row}"
            )));
        }
        if data.len() != stride * (height as usize) {
            return Err(ReelError::validation(format!(
                "pixel buffer holds {} bytes, expected {}",
                data.len(),
                stride * (height as usize)
            )));
        }
        Ok(Self {
            width,
            height,
            stride,
            format,
            data,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Size as a [`Canvas`].
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    /// Bytes per row including padding.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Pixel layout of `data`.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw bytes, rows `stride` apart.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes per row without padding.
    pub fn row_bytes(&self) -> usize {
        (self.width as usize) * self.format.bytes_per_pixel()
    }

    /// Iterate rows without their padding.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        let row = self.row_bytes();
        self.data.chunks_exact(self.stride).map(move |r| &r[..row])
    }

    /// Tightly packed pixel bytes; borrows when there is no row padding.
    pub fn packed(&self) -> Cow<'_, [u8]> {
        if self.stride == self.row_bytes() {
            return Cow::Borrowed(&self.data);
        }
        let mut out = Vec::with_capacity(self.row_bytes() * self.height as usize);
        for row in self.rows() {
            out.extend_from_slice(row);
        }
        Cow::Owned(out)
    }
}

/// Converts decoded images into encoder-ready [`PixelBuffer`]s.
///
/// Holds only immutable configuration, so one instance can serve many threads at once.
#[derive(Clone, Debug)]
pub struct Rasterizer {
    format: PixelFormat,
    background: [u8; 3],
    filter: FilterType,
    row_alignment: usize,
}

impl Rasterizer {
    /// Create a rasterizer producing `format`.
    pub fn new(format: PixelFormat) -> ReelResult<Self> {
        format.validate()?;
        Ok(Self {
            format,
            background: [0, 0, 0],
            filter: FilterType::Triangle,
            row_alignment: 1,
        })
    }

    /// Opaque colour that transparent source pixels are flattened onto (RGB).
    pub fn with_background(mut self, rgb: [u8; 3]) -> Self {
        self.background = rgb;
        self
    }

    /// Resampling filter used when the source size differs from the target.
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    /// Pad rows so the stride is a multiple of `align` bytes.
    pub fn with_row_alignment(mut self, align: usize) -> ReelResult<Self> {
        if align == 0 {
            return Err(ReelError::validation("row alignment must be >= 1"));
        }
        self.row_alignment = align;
        Ok(self)
    }

    /// Pixel format this rasterizer produces.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Draw `image` into a fresh `width x height` buffer, stretching as needed.
    ///
    /// Colour is normalised to 8-bit RGB and alpha is flattened so every pixel is opaque.
    pub fn rasterize(
        &self,
        image: &SourceImage,
        width: u32,
        height: u32,
    ) -> Result<PixelBuffer, RasterizeError> {
        if width == 0 || height == 0 {
            return Err(RasterizeError::BufferAllocationFailed(format!(
                "target size {width}x{height} is empty"
            )));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(RasterizeError::DecodeFailed(format!(
                "source image is {}x{}",
                image.width(),
                image.height()
            )));
        }

        let bpp = self.format.bytes_per_pixel();
        let stride = (width as usize)
            .checked_mul(bpp)
            .and_then(|row| row.checked_next_multiple_of(self.row_alignment))
            .ok_or_else(|| {
                RasterizeError::BufferAllocationFailed(format!(
                    "row size overflows for width {width}"
                ))
            })?;
        let len = stride.checked_mul(height as usize).ok_or_else(|| {
            RasterizeError::BufferAllocationFailed(format!(
                "buffer size overflows for {width}x{height}"
            ))
        })?;

        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| RasterizeError::BufferAllocationFailed(format!("{len} bytes: {e}")))?;
        data.resize(len, 0);

        let mut rgba = image.as_dynamic().to_rgba8();
        if rgba.dimensions() != (width, height) {
            rgba = image::imageops::resize(&rgba, width, height, self.filter);
        }

        let [ao, ro, go, bo] = self.format.channel_offsets();
        let [bg_r, bg_g, bg_b] = self.background;
        for (dst_row, src_row) in data
            .chunks_exact_mut(stride)
            .zip(rgba.as_raw().chunks_exact(width as usize * 4))
        {
            for (d, s) in dst_row.chunks_exact_mut(bpp).zip(src_row.chunks_exact(4)) {
                let a = s[3];
                d[ao] = 255;
                d[ro] = over_opaque(s[0], a, bg_r);
                d[go] = over_opaque(s[1], a, bg_g);
                d[bo] = over_opaque(s[2], a, bg_b);
            }
        }

        Ok(PixelBuffer {
            width,
            height,
            stride,
            format: self.format,
            data,
        })
    }
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self {
            format: PixelFormat::ARGB32,
            background: [0, 0, 0],
            filter: FilterType::Triangle,
            row_alignment: 1,
        }
    }
}

/// Rasterize with the default ARGB32 / black-background configuration.
pub fn rasterize(
    image: &SourceImage,
    width: u32,
    height: u32,
) -> Result<PixelBuffer, RasterizeError> {
    Rasterizer::default().rasterize(image, width, height)
}

#[cfg(test)]
#[path = "../../tests/unit/assets/raster.rs"]
mod tests;
