//! Reelmaker turns an ordered list of still images into a single MP4 video.
//!
//! Each image is rasterized into a fixed-format [`PixelBuffer`], stamped with a presentation
//! time of `frame_index / fps`, and appended to a [`VideoEncodingSession`] that owns the
//! encoder for the lifetime of the job. [`MovieWriter::make_movie`] composes the two.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod assets;
mod foundation;

/// Encoding sessions and encoder backends.
pub mod encode;
/// Driving algorithm: images in, one movie out.
pub mod movie;

pub use crate::assets::decode::{
    ImageCrateDecoder, ImageDecoder, SourceImage, decode_image, load_images,
};
pub use crate::assets::raster::{PixelBuffer, Rasterizer, rasterize};
pub use crate::foundation::core::{
    AlphaInfo, Canvas, ChannelOrder, Fps, FrameIndex, FrameTimestamp, PixelFormat,
};
pub use crate::foundation::error::{
    AppendError, OpenError, RasterizeError, ReelError, ReelResult,
};

pub use crate::encode::backend::{EncoderBackend, InMemoryBackend, InMemoryRecord};
pub use crate::encode::ffmpeg::{
    FfmpegBackend, FfmpegBackendOpts, ensure_parent_dir, is_ffmpeg_on_path, is_tool_on_path,
    probe_duration_secs,
};
pub use crate::encode::session::{
    EncodeSummary, EncodingSession, EncodingTarget, FinalizeStatus, SessionOpts, SessionState,
    VideoEncodingSession,
};
pub use crate::movie::{FrameClock, MovieSettings, MovieWriter, frame_timestamps};
