use std::path::PathBuf;
use std::time::Duration;

/// Crate-wide result alias.
pub type ReelResult<T> = Result<T, ReelError>;

/// Top-level error surfaced to the driver. Every stage failure lands here as a single typed value.
#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    /// The driver supplied an empty image list.
    #[error("no input images")]
    NoInputImages,

    /// Invalid configuration value.
    #[error("validation error: {0}")]
    Validation(String),

    /// Converting a source image into a pixel buffer failed.
    #[error("rasterize error: {0}")]
    Rasterize(#[from] RasterizeError),

    /// The encoder/muxer could not be opened.
    #[error("open error: {0}")]
    Open(#[from] OpenError),

    /// Appending the frame for image `frame` (0-based input position) failed.
    #[error("append error at image {frame}: {source}")]
    Append {
        /// Position of the image in the input list.
        frame: usize,
        /// Underlying append failure.
        #[source]
        source: AppendError,
    },

    /// The encoder backend failed while writing or closing the container.
    #[error("encode error: {0}")]
    Encode(String),

    /// The encoder reported a non-success final status.
    #[error("finalize error: {0}")]
    Finalize(String),

    /// Anything else, with context.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelError {
    /// Build a [`ReelError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ReelError::Encode`].
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Build a [`ReelError::Finalize`].
    pub fn finalize(msg: impl Into<String>) -> Self {
        Self::Finalize(msg.into())
    }

    /// Name of the pipeline stage that failed, for driver-side reporting.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::NoInputImages | Self::Validation(_) => "input",
            Self::Rasterize(_) => "rasterize",
            Self::Open(_) => "open",
            Self::Append { .. } => "append",
            Self::Encode(_) => "encode",
            Self::Finalize(_) => "finalize",
            Self::Other(_) => "other",
        }
    }
}

/// Failure turning a [`crate::SourceImage`] into a [`crate::PixelBuffer`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RasterizeError {
    /// The source image has no drawable representation.
    #[error("decode failed: {0}")]
    DecodeFailed(String),

    /// The destination buffer could not be allocated.
    #[error("buffer allocation failed: {0}")]
    BufferAllocationFailed(String),
}

/// Failure opening an encoding session.
#[derive(thiserror::Error, Debug)]
pub enum OpenError {
    /// The output path cannot be created or overwritten.
    #[error("destination '{}' is not writable: {reason}", path.display())]
    DestinationUnwritable {
        /// Requested destination.
        path: PathBuf,
        /// OS-level reason.
        reason: String,
    },

    /// No codec/container configuration satisfies the target.
    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),
}

/// Failure appending one frame to a started session.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AppendError {
    /// The encoder input queue stayed full for longer than the configured wait.
    #[error("encoder not ready after {waited:?}")]
    NotReady {
        /// How long the append waited before giving up.
        waited: Duration,
    },

    /// The encoder declined the sample.
    #[error("sample rejected: {0}")]
    Rejected(String),
}

impl AppendError {
    /// Build an [`AppendError::Rejected`].
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
