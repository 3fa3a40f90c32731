use std::path::Path;

use crate::assets::decode::SourceImage;
use crate::assets::raster::Rasterizer;
use crate::encode::session::{
    EncodeSummary, EncodingSession, EncodingTarget, FinalizeStatus, VideoEncodingSession,
};
use crate::foundation::core::{Canvas, Fps, FrameIndex, FrameTimestamp, PixelFormat};
use crate::foundation::error::{OpenError, ReelError, ReelResult};

/// Job-level knobs supplied by the driver.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MovieSettings {
    /// Output width; `0` takes the first image's width.
    pub width: u32,
    /// Output height; `0` takes the first image's height.
    pub height: u32,
    /// Output frame rate.
    pub fps: Fps,
    /// Consecutive frames each image occupies.
    pub frames_per_image: u32,
    /// Pixel layout handed to the encoder.
    pub format: PixelFormat,
}

impl MovieSettings {
    /// Check the repeat count and pixel format.
    pub fn validate(&self) -> ReelResult<()> {
        if self.frames_per_image == 0 {
            return Err(ReelError::validation("frames per image must be > 0"));
        }
        self.format.validate()
    }

    /// Canvas for this job, filling unspecified sides from `first`.
    pub fn resolve_canvas(&self, first: &SourceImage) -> ReelResult<Canvas> {
        let width = if self.width == 0 {
            first.width()
        } else {
            self.width
        };
        let height = if self.height == 0 {
            first.height()
        } else {
            self.height
        };
        Canvas::new(width, height)
    }
}

impl Default for MovieSettings {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            fps: Fps::DEFAULT,
            frames_per_image: 1,
            format: PixelFormat::default(),
        }
    }
}

/// Running frame counter: each image starts at `index / fps` and advances it by the repeat count.
#[derive(Clone, Copy, Debug)]
pub struct FrameClock {
    next: FrameIndex,
    fps: Fps,
    repeat: u32,
}

impl FrameClock {
    /// Clock at frame 0 advancing `repeat` frames per image.
    pub fn new(fps: Fps, repeat: u32) -> Self {
        Self {
            next: FrameIndex(0),
            fps,
            repeat,
        }
    }

    /// Presentation time of the next image.
    pub fn current(&self) -> FrameTimestamp {
        FrameTimestamp::from_frame(self.next, self.fps)
    }

    /// Move past the current image.
    pub fn advance(&mut self) {
        self.next = self.next.advance(self.repeat);
    }

    /// Frame index of the next image.
    pub fn frame_index(&self) -> FrameIndex {
        self.next
    }
}

/// Presentation timestamps for `count` images plus the closing end time.
pub fn frame_timestamps(
    count: usize,
    fps: Fps,
    repeat: u32,
) -> (Vec<FrameTimestamp>, FrameTimestamp) {
    let mut clock = FrameClock::new(fps, repeat);
    let stamps = (0..count)
        .map(|_| {
            let at = clock.current();
            clock.advance();
            at
        })
        .collect();
    (stamps, clock.current())
}

/// Drives rasterization and encoding for one job.
#[derive(Clone, Debug)]
pub struct MovieWriter {
    settings: MovieSettings,
    rasterizer: Rasterizer,
}

impl MovieWriter {
    /// Validate `settings` and build the matching rasterizer.
    pub fn new(settings: MovieSettings) -> ReelResult<Self> {
        settings.validate()?;
        let rasterizer = Rasterizer::new(settings.format)?;
        Ok(Self {
            settings,
            rasterizer,
        })
    }

    /// Replace the rasterizer (e.g. a different background or filter). Its format must match.
    pub fn with_rasterizer(mut self, rasterizer: Rasterizer) -> ReelResult<Self> {
        if rasterizer.format() != self.settings.format {
            return Err(ReelError::validation(
                "rasterizer format does not match movie settings",
            ));
        }
        self.rasterizer = rasterizer;
        Ok(self)
    }

    /// Job settings.
    pub fn settings(&self) -> &MovieSettings {
        &self.settings
    }

    /// Encode `images` into an MP4 at `out_path` with the system `ffmpeg`.
    pub fn make_movie(
        &self,
        images: &[SourceImage],
        out_path: &Path,
    ) -> ReelResult<EncodeSummary> {
        self.make_movie_with(images, out_path, VideoEncodingSession::open_mp4)
    }

    /// Encode `images` through whatever session `open` produces.
    ///
    /// An empty list fails with [`ReelError::NoInputImages`] before `open` is called. The first
    /// failing image aborts the job; the session is dropped without being finalized.
    #[tracing::instrument(
        skip(self, images, open),
        fields(images = images.len(), out = %out_path.display())
    )]
    pub fn make_movie_with<S, F>(
        &self,
        images: &[SourceImage],
        out_path: &Path,
        open: F,
    ) -> ReelResult<EncodeSummary>
    where
        S: EncodingSession,
        F: FnOnce(EncodingTarget) -> Result<S, OpenError>,
    {
        let Some(first) = images.first() else {
            return Err(ReelError::NoInputImages);
        };
        let canvas = self.settings.resolve_canvas(first)?;
        let target = EncodingTarget::new(canvas, self.settings.fps, out_path)
            .with_format(self.settings.format);

        tracing::debug!(
            size = %canvas,
            fps = self.settings.fps.get(),
            fpi = self.settings.frames_per_image,
            "opening session"
        );
        let mut session = open(target)?;

        let mut clock = FrameClock::new(self.settings.fps, self.settings.frames_per_image);
        for (i, image) in images.iter().enumerate() {
            let buffer = self
                .rasterizer
                .rasterize(image, canvas.width, canvas.height)?;
            let at = clock.current();
            session
                .append(buffer, at)
                .map_err(|source| ReelError::Append { frame: i, source })?;
            clock.advance();
        }

        let end = clock.current();
        match session.finalize(end) {
            FinalizeStatus::Completed(summary) => Ok(summary),
            FinalizeStatus::Failed(reason) => Err(ReelError::Finalize(reason)),
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/movie/movie.rs"]
mod tests;
