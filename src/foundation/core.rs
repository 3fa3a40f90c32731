use std::cmp::Ordering;

use crate::foundation::error::{ReelError, ReelResult};

/// 0-based position on the output frame grid (units of `1 / fps` seconds).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

impl FrameIndex {
    /// Advance by `frames` using saturating arithmetic.
    pub fn advance(self, frames: u32) -> Self {
        Self(self.0.saturating_add(u64::from(frames)))
    }
}

/// Integer frames-per-second, always `>= 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Fps(u32);

impl Fps {
    /// 30 fps.
    pub const DEFAULT: Self = Self(30);

    /// Create a validated FPS value.
    pub fn new(fps: u32) -> ReelResult<Self> {
        if fps == 0 {
            return Err(ReelError::validation("fps must be > 0"));
        }
        Ok(Self(fps))
    }

    /// Frames per second.
    pub fn get(self) -> u32 {
        self.0
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        1.0 / f64::from(self.0)
    }

    /// Convert a frame count to seconds.
    pub fn frames_to_secs(self, frames: u64) -> f64 {
        (frames as f64) / f64::from(self.0)
    }
}

impl TryFrom<u32> for Fps {
    type Error = ReelError;

    fn try_from(v: u32) -> ReelResult<Self> {
        Self::new(v)
    }
}

impl From<Fps> for u32 {
    fn from(v: Fps) -> Self {
        v.0
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Create a validated canvas with both sides `>= 1`.
    pub fn new(width: u32, height: u32) -> ReelResult<Self> {
        if width == 0 || height == 0 {
            return Err(ReelError::validation(format!(
                "canvas must be at least 1x1, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }
}

impl std::fmt::Display for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Rational presentation time `value / timescale` seconds.
///
/// Equality and ordering compare the rational value, so `5/10 == 1/2`.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct FrameTimestamp {
    /// Numerator in units of `1 / timescale` seconds.
    pub value: u64,
    /// Ticks per second, must be non-zero.
    pub timescale: u32,
}

impl FrameTimestamp {
    /// Time zero.
    pub const ZERO: Self = Self {
        value: 0,
        timescale: 1,
    };

    /// Create a validated timestamp.
    pub fn new(value: u64, timescale: u32) -> ReelResult<Self> {
        if timescale == 0 {
            return Err(ReelError::validation("timestamp timescale must be > 0"));
        }
        Ok(Self { value, timescale })
    }

    /// Timestamp of `idx` on the `fps` frame grid, i.e. `idx / fps`.
    pub fn from_frame(idx: FrameIndex, fps: Fps) -> Self {
        Self {
            value: idx.0,
            timescale: fps.get(),
        }
    }

    /// Value in seconds (lossy).
    pub fn as_secs_f64(self) -> f64 {
        (self.value as f64) / f64::from(self.timescale)
    }

    /// Nearest slot on the `fps` frame grid (round half up).
    pub fn to_frame_slot(self, fps: Fps) -> u64 {
        let num = u128::from(self.value) * u128::from(fps.get());
        let den = u128::from(self.timescale);
        ((num + den / 2) / den) as u64
    }

    fn cross(self, other: Self) -> (u128, u128) {
        (
            u128::from(self.value) * u128::from(other.timescale),
            u128::from(other.value) * u128::from(self.timescale),
        )
    }
}

impl PartialEq for FrameTimestamp {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = self.cross(*other);
        a == b
    }
}

impl Eq for FrameTimestamp {}

impl PartialOrd for FrameTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrameTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = self.cross(*other);
        a.cmp(&b)
    }
}

impl std::fmt::Display for FrameTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}s", self.value, self.timescale)
    }
}

/// Byte order of the four 8-bit channels in one pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    /// Alpha, red, green, blue.
    Argb,
    /// Red, green, blue, alpha.
    Rgba,
    /// Blue, green, red, alpha.
    Bgra,
}

/// Alpha semantics of the pixel format.
///
/// Output video carries no alpha, so only "skip" variants exist: the alpha byte is written as
/// `0xff` and ignored by the encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlphaInfo {
    /// Ignored alpha byte before the colour channels.
    NoneSkipFirst,
    /// Ignored alpha byte after the colour channels.
    NoneSkipLast,
}

/// Raw pixel layout shared by the rasterizer and the encoding session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PixelFormat {
    /// Bits per channel. Only 8 is supported.
    pub bits_per_component: u8,
    /// Channel byte order.
    pub order: ChannelOrder,
    /// Alpha handling.
    pub alpha: AlphaInfo,
}

impl PixelFormat {
    /// 32-bit ARGB, alpha skipped (the default encoder input format).
    pub const ARGB32: Self = Self {
        bits_per_component: 8,
        order: ChannelOrder::Argb,
        alpha: AlphaInfo::NoneSkipFirst,
    };

    /// 32-bit RGBA, alpha skipped.
    pub const RGBA32: Self = Self {
        bits_per_component: 8,
        order: ChannelOrder::Rgba,
        alpha: AlphaInfo::NoneSkipLast,
    };

    /// 32-bit BGRA, alpha skipped.
    pub const BGRA32: Self = Self {
        bits_per_component: 8,
        order: ChannelOrder::Bgra,
        alpha: AlphaInfo::NoneSkipLast,
    };

    /// Check that the format is 8-bit and the alpha position matches the channel order.
    pub fn validate(&self) -> ReelResult<()> {
        if self.bits_per_component != 8 {
            return Err(ReelError::validation(format!(
                "unsupported bits per component: {}",
                self.bits_per_component
            )));
        }
        let alpha_first = matches!(self.order, ChannelOrder::Argb);
        let skip_first = matches!(self.alpha, AlphaInfo::NoneSkipFirst);
        if alpha_first != skip_first {
            return Err(ReelError::validation(format!(
                "alpha {:?} does not match channel order {:?}",
                self.alpha, self.order
            )));
        }
        Ok(())
    }

    /// Bytes per pixel (always 4).
    pub fn bytes_per_pixel(&self) -> usize {
        4 * usize::from(self.bits_per_component / 8)
    }

    /// Byte offsets of (alpha, red, green, blue) within one pixel.
    pub fn channel_offsets(&self) -> [usize; 4] {
        match self.order {
            ChannelOrder::Argb => [0, 1, 2, 3],
            ChannelOrder::Rgba => [3, 0, 1, 2],
            ChannelOrder::Bgra => [3, 2, 1, 0],
        }
    }

    /// Matching ffmpeg `rawvideo` pixel format name.
    pub fn ffmpeg_pix_fmt(&self) -> &'static str {
        match self.order {
            ChannelOrder::Argb => "argb",
            ChannelOrder::Rgba => "rgba",
            ChannelOrder::Bgra => "bgra",
        }
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        Self::ARGB32
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
